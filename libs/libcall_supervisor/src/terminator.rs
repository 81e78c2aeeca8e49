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

use crate::error::CrashReason;
use log::error;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;

/// Exit code used when this process terminates itself.
pub const EXIT_FLAG: i32 = 10;

/// The last step of the crash path: kill the peer, then this process.
pub trait Terminator: Send + Sync {
    /// Kills `peer` when known, then the current process. Must not return.
    fn terminate(&self, reason: &CrashReason, peer: Option<Pid>) -> !;
}

/// [`Terminator`] that sends `SIGKILL` to both processes.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessTerminator;

impl Terminator for ProcessTerminator {
    fn terminate(&self, reason: &CrashReason, peer: Option<Pid>) -> ! {
        if let Some(peer) = peer {
            error!("Killing peer process with PID {peer}");
            if let Err(e) = kill(peer, Signal::SIGKILL) {
                error!("Failed to kill peer process {peer}: {e}");
            }
        }
        let this = Pid::this();
        error!("Killing this process with PID {this} because {reason}");
        if let Err(e) = kill(this, Signal::SIGKILL) {
            error!("Failed to kill this process: {e}");
        }
        std::process::exit(EXIT_FLAG)
    }
}
