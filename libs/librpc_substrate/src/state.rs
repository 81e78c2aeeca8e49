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

use nix::unistd::Pid;
use std::cell::Cell;

thread_local! {
    static CALLING_PID: Cell<Option<Pid>> = const { Cell::new(None) };
}

/// Static utility functions to manage per-thread transaction state.
pub struct ThreadState;

impl ThreadState {
    /// Returns the pid of the process whose call this thread is currently serving, or the pid of
    /// this process if the thread isn't serving a call.
    pub fn get_calling_pid() -> Pid {
        CALLING_PID.with(|pid| pid.get()).unwrap_or_else(Pid::this)
    }

    /// Runs `f` as if serving a call made by `pid`. Transports call this around dispatch; the
    /// previous identity is restored afterwards, also when `f` unwinds.
    pub fn with_calling_pid<R>(pid: Pid, f: impl FnOnce() -> R) -> R {
        struct Restore(Option<Pid>);
        impl Drop for Restore {
            fn drop(&mut self) {
                CALLING_PID.with(|pid| pid.set(self.0));
            }
        }

        let _restore = Restore(CALLING_PID.with(|cur| cur.replace(Some(pid))));
        f()
    }
}

/// Source of the identity of the process on the other end of the current call.
pub trait CallingIdentity: Send + Sync {
    /// Returns the pid of the immediate caller.
    fn calling_pid(&self) -> Pid;
}

/// [`CallingIdentity`] backed by [`ThreadState`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadCallingIdentity;

impl CallingIdentity for ThreadCallingIdentity {
    fn calling_pid(&self) -> Pid {
        ThreadState::get_calling_pid()
    }
}
