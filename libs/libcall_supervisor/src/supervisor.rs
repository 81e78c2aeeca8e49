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

use crate::config::SupervisorConfig;
use crate::error::{CrashReason, Error};
use crate::pool::{Pending, WorkerPool};
use crate::terminator::{ProcessTerminator, Terminator};
use crate::tracker::{CircularCallTracker, TrackedCall};
use anyhow::{Context, Result};
use log::{debug, error, warn};
use nix::unistd::Pid;
use rpc_substrate::{CallingIdentity, ThreadCallingIdentity};
use std::backtrace::Backtrace;
use std::io::{self, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

/// How long the crash path waits for the peer's stack.
pub const PEER_STACK_TIMEOUT: Duration = Duration::from_secs(2);

type StackTracer = Arc<dyn Fn() -> Result<String> + Send + Sync>;

/// Dispatches calls into the peer process under timeout, retry and circular call supervision.
///
/// Circular call accounting only applies to calls whose immediate caller is the peer process
/// registered with [`CallSupervisor::update_peer_pid`]; ordinary clients are never counted.
pub struct CallSupervisor {
    config: SupervisorConfig,
    pool: WorkerPool,
    tracker: Arc<CircularCallTracker>,
    state: Mutex<State>,
    one_way_calls: Sender<OneWayCall>,
    identity: Arc<dyn CallingIdentity>,
    terminator: Arc<dyn Terminator>,
}

#[derive(Default)]
struct State {
    peer_pid: Option<Pid>,
    peer_stack_tracer: Option<StackTracer>,
}

struct OneWayCall {
    tag: String,
    deadline: Instant,
    pending: Pending<()>,
    _tracking: Option<TrackedCall>,
}

enum Attempt<T> {
    Done(T),
    RemoteFailure(anyhow::Error),
    TimedOut,
}

impl CallSupervisor {
    /// Creates a supervisor that identifies callers through the substrate's thread state and
    /// kills processes with signals.
    pub fn new(config: SupervisorConfig) -> Result<Self> {
        Self::with_hooks(config, Arc::new(ThreadCallingIdentity), Arc::new(ProcessTerminator))
    }

    /// Creates a supervisor with custom caller identification and termination.
    pub fn with_hooks(
        config: SupervisorConfig,
        identity: Arc<dyn CallingIdentity>,
        terminator: Arc<dyn Terminator>,
    ) -> Result<Self> {
        let pool = WorkerPool::new("peer-binder", config.thread_pool_size())?;
        let (one_way_calls, receiver) = mpsc::channel();
        thread::Builder::new()
            .name("peer-one-way".to_owned())
            .spawn(move || watch_one_way_calls(receiver))
            .context("Failed to spawn the one-way call watcher")?;
        Ok(Self {
            config,
            pool,
            tracker: Arc::default(),
            state: Mutex::default(),
            one_way_calls,
            identity,
            terminator,
        })
    }

    /// The configuration this supervisor was created with.
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Runs `work` with the regular timeout and returns `default_value` if it times out or
    /// fails for any reason.
    ///
    /// Callers cannot tell a failure from a result equal to `default_value`; use this only when
    /// the default is an acceptable answer.
    pub fn call_with_default<T, F>(&self, tag: &str, work: F, default_value: T) -> T
    where
        F: FnOnce() -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        debug!("Received call_with_default for caller tag: {tag}");
        let _tracking = self.start_tracking(tag);
        let timeout = self.config.regular_call_timeout();
        match self.pool.submit(work).wait(timeout) {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!("Call threw an exception ({e:#}). Returning default value for caller tag: {tag}");
                default_value
            }
            Err(RecvTimeoutError::Timeout) => {
                warn!("Call timed out after {timeout:?}. Returning default value for caller tag: {tag}");
                default_value
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!("Call was interrupted. Returning default value for caller tag: {tag}");
                default_value
            }
        }
    }

    /// Runs `work`, retrying failures until `timeout` has elapsed.
    ///
    /// A remote transport failure is never retried: it kills both processes.
    pub fn call_with_timeout<T, F>(&self, tag: &str, work: F, timeout: Duration) -> Result<T, Error>
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        debug!("Received call_with_timeout for caller tag: {tag}");
        let _tracking = self.start_tracking(tag);
        match self.run_with_retries(tag, Arc::new(work), timeout) {
            Attempt::Done(value) => Ok(value),
            Attempt::RemoteFailure(e) => {
                error!("Call received remote exception ({e:#}), crashing");
                self.crash(CrashReason::RemoteTransport(tag.to_owned()))
            }
            Attempt::TimedOut => {
                warn!("Call timed out. Returning timeout error for caller tag: {tag}");
                Err(Error::Timeout { tag: tag.to_owned(), timeout })
            }
        }
    }

    /// Runs `work` like [`CallSupervisor::call_with_timeout`] with the crash call budget, but
    /// kills both processes instead of returning when the budget runs out.
    pub fn call_with_crash_on_timeout<T, F>(&self, tag: &str, work: F) -> T
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        debug!("Received call_with_crash_on_timeout for caller tag: {tag}");
        let _tracking = self.start_tracking(tag);
        match self.run_with_retries(tag, Arc::new(work), self.config.crash_call_timeout()) {
            Attempt::Done(value) => value,
            Attempt::RemoteFailure(e) => {
                error!("Call received remote exception ({e:#}), crashing");
                self.crash(CrashReason::RemoteTransport(tag.to_owned()))
            }
            Attempt::TimedOut => {
                error!("Call timed out for caller tag: {tag}, crashing");
                self.crash(CrashReason::Timeout(tag.to_owned()))
            }
        }
    }

    /// Queues `work` without waiting for it. Failures and timeouts are only logged.
    pub fn fire_and_forget<F>(&self, tag: &str, work: F)
    where
        F: FnOnce() -> Result<()> + Send + 'static,
    {
        debug!("Received fire_and_forget for caller tag: {tag}");
        let tracking = self.start_tracking(tag);
        let call = OneWayCall {
            tag: tag.to_owned(),
            deadline: Instant::now() + self.config.regular_call_timeout(),
            pending: self.pool.submit(work),
            _tracking: tracking,
        };
        if self.one_way_calls.send(call).is_err() {
            error!("One-way call watcher is gone, result for caller tag {tag} will not be checked");
        }
    }

    /// Records the pid of the peer process after it (re)connected.
    pub fn update_peer_pid(&self, pid: Pid) {
        self.lock_state().peer_pid = Some(pid);
    }

    /// The last pid passed to [`CallSupervisor::update_peer_pid`].
    pub fn peer_pid(&self) -> Option<Pid> {
        self.lock_state().peer_pid
    }

    /// Registers the call used to fetch the peer's stack when crashing.
    pub fn register_diagnostics_provider<F>(&self, provider: F)
    where
        F: Fn() -> Result<String> + Send + Sync + 'static,
    {
        self.lock_state().peer_stack_tracer = Some(Arc::new(provider));
    }

    /// Number of in-flight circular calls for `tag`.
    pub fn circular_calls(&self, tag: &str) -> usize {
        self.tracker.count(tag)
    }

    /// Number of in-flight circular calls across all tags.
    pub fn total_circular_calls(&self) -> usize {
        self.tracker.total()
    }

    /// Kills the peer process and this process.
    ///
    /// Logs `reason`, the local stack and, if a diagnostics provider is registered, the peer's
    /// stack fetched within [`PEER_STACK_TIMEOUT`].
    pub fn crash(&self, reason: CrashReason) -> ! {
        error!("****Crashing this process and the peer process because {reason}****");
        error!("Local stack-\n{}", Backtrace::force_capture());

        let (tracer, peer_pid) = {
            let state = self.lock_state();
            (state.peer_stack_tracer.clone(), state.peer_pid)
        };
        if let Some(tracer) = tracer {
            error!("Peer stack-");
            match self.pool.submit(move || tracer()).wait(PEER_STACK_TIMEOUT) {
                Ok(Ok(stack)) => error!("{stack}"),
                Ok(Err(e)) => error!("Failed to get the peer stack: {e:#}"),
                Err(RecvTimeoutError::Timeout) => {
                    error!("Didn't receive the peer stack within {PEER_STACK_TIMEOUT:?}")
                }
                Err(RecvTimeoutError::Disconnected) => error!("Peer stack request was dropped"),
            }
        }

        self.terminator.terminate(&reason, peer_pid)
    }

    /// Writes the supervisor state for bug reports.
    pub fn dump(&self, writer: &mut dyn Write) -> io::Result<()> {
        writeln!(writer, "***CallSupervisor dump***")?;
        match self.peer_pid() {
            Some(pid) => writeln!(writer, "  PeerPid: {pid}")?,
            None => writeln!(writer, "  PeerPid: unknown")?,
        }
        let entries = self.tracker.snapshot();
        writeln!(writer, "  CallerTracker size: {}", entries.len())?;
        for (i, (tag, count)) in entries.iter().enumerate() {
            writeln!(writer, "    entry: {i}, CallerTag: {tag}, CircularCalls: {count}")?;
        }
        writeln!(writer, "  TotalCircularCalls: {}", self.tracker.total())?;
        writeln!(writer, "  RegularCallTimeout: {:?}", self.config.regular_call_timeout())?;
        writeln!(writer, "  CrashCallTimeout: {:?}", self.config.crash_call_timeout())?;
        writeln!(writer, "  ThreadPoolSize: {}", self.pool.size())?;
        writeln!(
            writer,
            "  ThreadPoolSizeFromOverlay: {}",
            self.config.requested_thread_pool_size()
        )
    }

    /// Counts the call if it comes from the peer, crashing when a circular call cap is hit.
    fn start_tracking(&self, tag: &str) -> Option<TrackedCall> {
        let peer_pid = self.lock_state().peer_pid?;
        if self.identity.calling_pid() != peer_pid {
            return None;
        }
        match self.tracker.enter(tag) {
            Ok(tracking) => Some(tracking),
            Err(reason) => self.crash(reason),
        }
    }

    /// Submits `work` until it succeeds, fails on the transport level or `budget` is used up.
    fn run_with_retries<T, F>(&self, tag: &str, work: Arc<F>, budget: Duration) -> Attempt<T>
    where
        F: Fn() -> Result<T> + Send + Sync + 'static,
        T: Send + 'static,
    {
        let start = Instant::now();
        let mut remaining = budget;
        while !remaining.is_zero() {
            let work = Arc::clone(&work);
            match self.pool.submit(move || work()).wait(remaining) {
                Ok(Ok(value)) => return Attempt::Done(value),
                Ok(Err(e)) if is_remote_transport(&e) => return Attempt::RemoteFailure(e),
                Ok(Err(e)) => warn!("Call for {tag} received an execution error: {e:#}"),
                Err(RecvTimeoutError::Timeout) => return Attempt::TimedOut,
                Err(RecvTimeoutError::Disconnected) => warn!("Call for {tag} was interrupted"),
            }
            remaining = budget.saturating_sub(start.elapsed());
            if !remaining.is_zero() {
                warn!("Call for {tag} would be retried with remaining time {remaining:?}");
            }
        }
        Attempt::TimedOut
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn is_remote_transport(error: &anyhow::Error) -> bool {
    error.chain().any(|cause| {
        cause
            .downcast_ref::<rpc_substrate::Error>()
            .is_some_and(rpc_substrate::Error::is_remote_transport)
    })
}

/// Waits for one-way calls in submission order. All calls share the regular timeout, so their
/// deadlines are ordered too.
fn watch_one_way_calls(calls: Receiver<OneWayCall>) {
    for call in calls {
        let remaining = call.deadline.saturating_duration_since(Instant::now());
        match call.pending.wait(remaining) {
            Ok(Ok(())) => debug!("One-way call for caller tag {} completed", call.tag),
            Ok(Err(e)) => {
                error!("Exception while running one-way call for caller tag {}: {e:#}", call.tag)
            }
            Err(RecvTimeoutError::Timeout) => {
                error!("One-way call for caller tag {} timed out", call.tag)
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!("One-way call for caller tag {} was dropped", call.tag)
            }
        }
    }
    debug!("One-way call watcher exiting");
}
