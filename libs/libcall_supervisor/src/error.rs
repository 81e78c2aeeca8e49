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

use std::time::Duration;
use thiserror::Error;

/// Failures surfaced to callers of [`CallSupervisor`](crate::CallSupervisor).
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The time budget elapsed without a successful result.
    #[error("call for {tag} timed out after {timeout:?}")]
    Timeout {
        /// Tag of the call site.
        tag: String,
        /// The budget that was exhausted.
        timeout: Duration,
    },
}

/// Why both processes are being killed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CrashReason {
    /// The peer reported a transport-level failure.
    #[error("remote exception for {0}")]
    RemoteTransport(String),

    /// A crash-on-timeout call did not complete within its budget.
    #[error("timeout exception for {0}")]
    Timeout(String),

    /// Too many circular calls are in flight for one tag.
    #[error("max circular calls for {tag} ({count})")]
    CircularCallsPerTag {
        /// Tag of the call site.
        tag: String,
        /// In-flight count including the rejected call.
        count: usize,
    },

    /// Too many circular calls are in flight overall.
    #[error("max circular calls overall ({count})")]
    CircularCallsTotal {
        /// In-flight count including the rejected call.
        count: usize,
    },

    /// Explicit request by the owner of the supervisor.
    #[error("{0}")]
    Requested(String),
}
