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

//! Supervision of calls into a cooperating peer process.
//!
//! [`CallSupervisor`] runs units of work that may block on a slow or hung peer on a bounded
//! worker pool, bounds how long callers wait for them, retries transient failures and detects
//! runaway circular calls between this process and the peer. When the two processes are judged
//! to be stuck, both are killed: a loud, fast failure is preferred to a silent hang.
//!
//! Work that times out is abandoned, not cancelled. It keeps its worker thread until it returns
//! and its result is discarded.

mod config;
mod error;
mod pool;
mod supervisor;
mod terminator;
mod tracker;

pub use config::{SupervisorConfig, MAX_THREAD_POOL_SIZE, MIN_THREAD_POOL_SIZE};
pub use error::{CrashReason, Error};
pub use supervisor::{CallSupervisor, PEER_STACK_TIMEOUT};
pub use terminator::{ProcessTerminator, Terminator, EXIT_FLAG};
pub use tracker::{MAX_CIRCULAR_CALLS_PER_CALLER, MAX_CIRCULAR_CALL_TOTAL};
