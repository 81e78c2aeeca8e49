// Copyright 2026, The Android Open Source Project
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! End-to-end behavior of the call supervisor, with process termination replaced by a fake that
//! records the reason and unwinds.

use anyhow::{anyhow, Result};
use call_supervisor::{CallSupervisor, CrashReason, Error, SupervisorConfig, Terminator};
use nix::unistd::Pid;
use rpc_substrate::{ThreadCallingIdentity, ThreadState};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

const PEER: Pid = Pid::from_raw(500);
const STRANGER: Pid = Pid::from_raw(999);
const SLACK: Duration = Duration::from_secs(1);

#[derive(Default)]
struct FakeTerminator {
    terminations: Mutex<Vec<(CrashReason, Option<Pid>)>>,
}

impl FakeTerminator {
    fn terminations(&self) -> Vec<(CrashReason, Option<Pid>)> {
        self.terminations.lock().unwrap().clone()
    }
}

impl Terminator for FakeTerminator {
    fn terminate(&self, reason: &CrashReason, peer: Option<Pid>) -> ! {
        self.terminations.lock().unwrap().push((reason.clone(), peer));
        panic!("terminated because {reason}");
    }
}

/// Blocks work until the test opens it.
#[derive(Default)]
struct Gate {
    open: Mutex<bool>,
    opened: Condvar,
}

impl Gate {
    fn wait(&self) {
        let open = self.open.lock().unwrap();
        let _open = self.opened.wait_while(open, |open| !*open).unwrap();
    }

    fn open(&self) {
        *self.open.lock().unwrap() = true;
        self.opened.notify_all();
    }
}

fn supervisor(regular_ms: u64, crash_ms: u64) -> (Arc<CallSupervisor>, Arc<FakeTerminator>) {
    let terminator = Arc::new(FakeTerminator::default());
    let supervisor = CallSupervisor::with_hooks(
        SupervisorConfig::new(regular_ms, crash_ms, 8),
        Arc::new(ThreadCallingIdentity),
        terminator.clone(),
    )
    .unwrap();
    (Arc::new(supervisor), terminator)
}

fn expect_termination<R>(f: impl FnOnce() -> R) {
    assert!(panic::catch_unwind(AssertUnwindSafe(f)).is_err(), "expected the crash path");
}

fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        thread::sleep(Duration::from_millis(5));
    }
}

/// Starts a call with the default value 0 from `pid` whose work is held by `gate`.
fn spawn_gated_call(
    supervisor: &Arc<CallSupervisor>,
    gate: &Arc<Gate>,
    pid: Pid,
    tag: &str,
    started: &Arc<AtomicUsize>,
) -> JoinHandle<i32> {
    let supervisor = supervisor.clone();
    let gate = gate.clone();
    let started = started.clone();
    let tag = tag.to_owned();
    thread::spawn(move || {
        ThreadState::with_calling_pid(pid, || {
            supervisor.call_with_default(
                &tag,
                move || {
                    started.fetch_add(1, Ordering::SeqCst);
                    gate.wait();
                    Ok(1)
                },
                0,
            )
        })
    })
}

#[test]
fn call_with_default_returns_result_of_work() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    assert_eq!(supervisor.call_with_default("tag", || Ok(Some("value")), None), Some("value"));
    assert!(terminator.terminations().is_empty());
}

#[test]
fn call_with_default_returns_default_value_on_timeout() {
    let (supervisor, terminator) = supervisor(200, 2000);
    let gate = Arc::new(Gate::default());

    let start = Instant::now();
    let result = {
        let gate = gate.clone();
        supervisor.call_with_default(
            "hung",
            move || {
                gate.wait();
                Ok(7)
            },
            -1,
        )
    };

    assert_eq!(result, -1);
    assert!(start.elapsed() >= Duration::from_millis(200));
    assert!(start.elapsed() < Duration::from_millis(200) + SLACK);
    assert!(terminator.terminations().is_empty());
    gate.open();
}

#[test]
fn call_with_default_swallows_errors() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    assert_eq!(supervisor.call_with_default("tag", || Err(anyhow!("broken")), 3), 3);
    let remote =
        || -> Result<i32> { Err(rpc_substrate::Error::RemoteTransport("gone".to_owned()).into()) };
    assert_eq!(supervisor.call_with_default("tag", remote, 4), 4);
    assert_eq!(supervisor.call_with_default("tag", || -> Result<i32> { panic!("oops") }, 5), 5);
    assert!(terminator.terminations().is_empty());
}

#[test]
fn call_with_timeout_returns_result_of_work() {
    let (supervisor, _) = supervisor(1000, 2000);
    let none: Option<i32> = None;
    let result = supervisor.call_with_timeout("tag", move || Ok(none), Duration::from_secs(1));
    assert_eq!(result, Ok(None));
}

#[test]
fn call_with_timeout_retries_transient_errors() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    let attempts = Arc::new(AtomicUsize::new(0));
    let work = {
        let attempts = attempts.clone();
        move || match attempts.fetch_add(1, Ordering::SeqCst) {
            0 | 1 => Err(anyhow!("transient")),
            _ => Ok("done"),
        }
    };

    assert_eq!(supervisor.call_with_timeout("tag", work, Duration::from_secs(2)), Ok("done"));
    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(terminator.terminations().is_empty());
}

#[test]
fn call_with_timeout_gives_up_after_budget() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    let timeout = Duration::from_millis(300);

    let start = Instant::now();
    let work = || -> Result<()> { Err(anyhow!("nope")) };
    let result = supervisor.call_with_timeout("flaky", work, timeout);

    assert_eq!(result, Err(Error::Timeout { tag: "flaky".to_owned(), timeout }));
    assert!(start.elapsed() >= timeout);
    assert!(start.elapsed() < timeout + SLACK);
    assert!(terminator.terminations().is_empty());
}

#[test]
fn call_with_timeout_times_out_on_hung_work() {
    let (supervisor, _) = supervisor(1000, 2000);
    let gate = Arc::new(Gate::default());
    let work = {
        let gate = gate.clone();
        move || {
            gate.wait();
            Ok(())
        }
    };

    let result = supervisor.call_with_timeout("hung", work, Duration::from_millis(200));

    assert!(matches!(result, Err(Error::Timeout { .. })));
    gate.open();
}

#[test]
fn call_with_timeout_crashes_on_remote_transport_error() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    supervisor.update_peer_pid(PEER);
    let attempts = Arc::new(AtomicUsize::new(0));
    let work = {
        let attempts = attempts.clone();
        move || -> Result<i32> {
            match attempts.fetch_add(1, Ordering::SeqCst) {
                0 => Err(rpc_substrate::Error::RemoteTransport("peer died".to_owned()).into()),
                _ => Ok(1),
            }
        }
    };

    expect_termination(|| supervisor.call_with_timeout("remote", work, Duration::from_secs(2)));

    assert_eq!(attempts.load(Ordering::SeqCst), 1);
    assert_eq!(
        terminator.terminations(),
        vec![(CrashReason::RemoteTransport("remote".to_owned()), Some(PEER))]
    );
}

#[test]
fn call_with_crash_on_timeout_returns_result_of_work() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    assert_eq!(supervisor.call_with_crash_on_timeout("tag", || Ok(11)), 11);
    assert!(terminator.terminations().is_empty());
}

#[test]
fn call_with_crash_on_timeout_crashes_when_budget_is_used_up() {
    let (supervisor, terminator) = supervisor(1000, 300);
    supervisor.update_peer_pid(PEER);
    let gate = Arc::new(Gate::default());
    let work = {
        let gate = gate.clone();
        move || {
            gate.wait();
            Ok(())
        }
    };

    let start = Instant::now();
    expect_termination(|| supervisor.call_with_crash_on_timeout("stuck", work));

    assert!(start.elapsed() >= Duration::from_millis(300));
    assert_eq!(
        terminator.terminations(),
        vec![(CrashReason::Timeout("stuck".to_owned()), Some(PEER))]
    );
    gate.open();
}

#[test]
fn call_with_crash_on_timeout_crashes_on_remote_transport_error() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    let work =
        || -> Result<()> { Err(rpc_substrate::Error::RemoteTransport("x".to_owned()).into()) };

    expect_termination(|| supervisor.call_with_crash_on_timeout("remote", work));

    assert_eq!(
        terminator.terminations(),
        vec![(CrashReason::RemoteTransport("remote".to_owned()), None)]
    );
}

#[test]
fn fire_and_forget_does_not_block() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    let gate = Arc::new(Gate::default());
    let (done, done_rx) = mpsc::channel();

    let start = Instant::now();
    {
        let gate = gate.clone();
        supervisor.fire_and_forget("one-way", move || {
            gate.wait();
            done.send(()).unwrap();
            Ok(())
        });
    }
    assert!(start.elapsed() < Duration::from_millis(500));

    gate.open();
    done_rx.recv_timeout(Duration::from_secs(5)).unwrap();
    supervisor.fire_and_forget("one-way", || Err(anyhow!("ignored")));
    assert!(terminator.terminations().is_empty());
}

#[test]
fn fire_and_forget_keeps_circular_call_counted_until_done() {
    let (supervisor, _) = supervisor(2000, 4000);
    supervisor.update_peer_pid(PEER);
    let gate = Arc::new(Gate::default());

    ThreadState::with_calling_pid(PEER, || {
        let gate = gate.clone();
        supervisor.fire_and_forget("one-way", move || {
            gate.wait();
            Ok(())
        });
    });
    assert_eq!(supervisor.circular_calls("one-way"), 1);

    gate.open();
    wait_until("one-way call to be uncounted", || supervisor.circular_calls("one-way") == 0);
    assert_eq!(supervisor.total_circular_calls(), 0);
}

#[test]
fn sixth_circular_call_for_a_tag_crashes_before_dispatch() {
    let (supervisor, terminator) = supervisor(10_000, 20_000);
    supervisor.update_peer_pid(PEER);
    let gate = Arc::new(Gate::default());
    let started = Arc::new(AtomicUsize::new(0));

    let calls: Vec<_> =
        (0..5).map(|_| spawn_gated_call(&supervisor, &gate, PEER, "X", &started)).collect();
    wait_until("five calls in flight", || supervisor.circular_calls("X") == 5);

    let sixth_invoked = Arc::new(AtomicBool::new(false));
    expect_termination(|| {
        let sixth_invoked = sixth_invoked.clone();
        ThreadState::with_calling_pid(PEER, || {
            supervisor.call_with_default(
                "X",
                move || {
                    sixth_invoked.store(true, Ordering::SeqCst);
                    Ok(1)
                },
                0,
            )
        })
    });

    assert!(!sixth_invoked.load(Ordering::SeqCst));
    assert_eq!(
        terminator.terminations(),
        vec![(CrashReason::CircularCallsPerTag { tag: "X".to_owned(), count: 6 }, Some(PEER))]
    );

    gate.open();
    for call in calls {
        assert_eq!(call.join().unwrap(), 1);
    }
    assert_eq!(supervisor.total_circular_calls(), 0);
}

#[test]
fn five_circular_calls_for_a_tag_are_allowed() {
    let (supervisor, terminator) = supervisor(10_000, 20_000);
    supervisor.update_peer_pid(PEER);
    let gate = Arc::new(Gate::default());
    let started = Arc::new(AtomicUsize::new(0));

    let calls: Vec<_> =
        (0..5).map(|_| spawn_gated_call(&supervisor, &gate, PEER, "X", &started)).collect();
    wait_until("five calls started", || started.load(Ordering::SeqCst) == 5);

    gate.open();
    for call in calls {
        assert_eq!(call.join().unwrap(), 1);
    }
    assert!(terminator.terminations().is_empty());
}

#[test]
fn calls_from_other_processes_are_never_counted() {
    let (supervisor, terminator) = supervisor(10_000, 20_000);
    supervisor.update_peer_pid(PEER);
    let gate = Arc::new(Gate::default());
    let started = Arc::new(AtomicUsize::new(0));

    let calls: Vec<_> =
        (0..6).map(|_| spawn_gated_call(&supervisor, &gate, STRANGER, "X", &started)).collect();
    wait_until("six calls started", || started.load(Ordering::SeqCst) == 6);
    assert_eq!(supervisor.circular_calls("X"), 0);

    gate.open();
    for call in calls {
        assert_eq!(call.join().unwrap(), 1);
    }
    assert!(terminator.terminations().is_empty());
}

#[test]
fn eleventh_circular_call_overall_crashes() {
    let (supervisor, terminator) = supervisor(10_000, 20_000);
    supervisor.update_peer_pid(PEER);
    let gate = Arc::new(Gate::default());
    let started = Arc::new(AtomicUsize::new(0));

    let calls: Vec<_> = (0..10)
        .map(|i| spawn_gated_call(&supervisor, &gate, PEER, &format!("tag{}", i % 4), &started))
        .collect();
    wait_until("ten calls in flight", || supervisor.total_circular_calls() == 10);

    expect_termination(|| {
        ThreadState::with_calling_pid(PEER, || supervisor.call_with_default("other", || Ok(1), 0))
    });
    assert_eq!(
        terminator.terminations(),
        vec![(CrashReason::CircularCallsTotal { count: 11 }, Some(PEER))]
    );

    gate.open();
    for call in calls {
        assert_eq!(call.join().unwrap(), 1);
    }
}

#[test]
fn peer_pid_update_moves_accounting_to_the_new_process() {
    let (supervisor, _) = supervisor(10_000, 20_000);
    supervisor.update_peer_pid(PEER);
    supervisor.update_peer_pid(STRANGER);
    assert_eq!(supervisor.peer_pid(), Some(STRANGER));

    let gate = Arc::new(Gate::default());
    let started = Arc::new(AtomicUsize::new(0));
    let old_peer = spawn_gated_call(&supervisor, &gate, PEER, "X", &started);
    let new_peer = spawn_gated_call(&supervisor, &gate, STRANGER, "X", &started);
    wait_until("both calls started", || started.load(Ordering::SeqCst) == 2);
    assert_eq!(supervisor.circular_calls("X"), 1);

    gate.open();
    assert_eq!(old_peer.join().unwrap(), 1);
    assert_eq!(new_peer.join().unwrap(), 1);
}

#[test]
fn crash_fetches_the_peer_stack() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    let asked = Arc::new(AtomicBool::new(false));
    {
        let asked = asked.clone();
        supervisor.register_diagnostics_provider(move || {
            asked.store(true, Ordering::SeqCst);
            Ok("peer stack".to_owned())
        });
    }

    expect_termination(|| supervisor.crash(CrashReason::Requested("test".to_owned())));

    assert!(asked.load(Ordering::SeqCst));
    assert_eq!(terminator.terminations(), vec![(CrashReason::Requested("test".to_owned()), None)]);
}

#[test]
fn crash_asks_a_failing_peer_for_its_stack_once() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    let requests = Arc::new(AtomicUsize::new(0));
    {
        let requests = requests.clone();
        supervisor.register_diagnostics_provider(move || -> Result<String> {
            requests.fetch_add(1, Ordering::SeqCst);
            Err(anyhow!("peer refused"))
        });
    }

    let start = Instant::now();
    expect_termination(|| supervisor.crash(CrashReason::Requested("refusing peer".to_owned())));

    assert_eq!(requests.load(Ordering::SeqCst), 1);
    assert!(start.elapsed() < call_supervisor::PEER_STACK_TIMEOUT);
    assert_eq!(terminator.terminations().len(), 1);
}

#[test]
fn crash_does_not_wait_forever_for_the_peer_stack() {
    let (supervisor, terminator) = supervisor(1000, 2000);
    let gate = Arc::new(Gate::default());
    {
        let gate = gate.clone();
        supervisor.register_diagnostics_provider(move || {
            gate.wait();
            Ok(String::new())
        });
    }

    let start = Instant::now();
    expect_termination(|| supervisor.crash(CrashReason::Requested("hung peer".to_owned())));

    assert!(start.elapsed() >= call_supervisor::PEER_STACK_TIMEOUT);
    // Formatting the local backtrace is part of the crash path and can be slow.
    assert!(start.elapsed() < call_supervisor::PEER_STACK_TIMEOUT + 3 * SLACK);
    assert_eq!(terminator.terminations().len(), 1);
    gate.open();
}

#[test]
fn dump_reports_state() -> Result<()> {
    let (supervisor, _) = supervisor(10_000, 20_000);
    supervisor.update_peer_pid(PEER);
    let gate = Arc::new(Gate::default());
    let started = Arc::new(AtomicUsize::new(0));
    let call = spawn_gated_call(&supervisor, &gate, PEER, "X", &started);
    wait_until("call in flight", || supervisor.circular_calls("X") == 1);

    let mut out = Vec::new();
    supervisor.dump(&mut out)?;
    let dump = String::from_utf8(out)?;

    assert!(dump.contains("PeerPid: 500"), "{dump}");
    assert!(dump.contains("CallerTag: X, CircularCalls: 1"), "{dump}");
    assert!(dump.contains("RegularCallTimeout: 10s"), "{dump}");
    assert!(dump.contains("ThreadPoolSize: 8"), "{dump}");

    gate.open();
    assert_eq!(call.join().unwrap(), 1);
    Ok(())
}
