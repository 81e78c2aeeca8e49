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

use log::info;
use std::time::Duration;

/// Upper bound for the worker pool size.
pub const MAX_THREAD_POOL_SIZE: usize = 16;
/// Lower bound for the worker pool size.
pub const MIN_THREAD_POOL_SIZE: usize = 2;

const DEFAULT_REGULAR_CALL_TIMEOUT_MS: u64 = 5000;
const DEFAULT_CRASH_CALL_TIMEOUT_MS: u64 = 9000;
const DEFAULT_THREAD_POOL_SIZE: usize = 8;

/// Timeouts and pool sizing consumed by [`CallSupervisor`](crate::CallSupervisor).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SupervisorConfig {
    regular_call_timeout: Duration,
    crash_call_timeout: Duration,
    thread_pool_size: usize,
    requested_thread_pool_size: usize,
}

impl SupervisorConfig {
    /// Builds a configuration from the values provided by the device overlay. The pool size is
    /// clamped to `MIN_THREAD_POOL_SIZE..=MAX_THREAD_POOL_SIZE`.
    pub fn new(
        regular_call_timeout_ms: u64,
        crash_call_timeout_ms: u64,
        thread_pool_size: usize,
    ) -> Self {
        let config = Self {
            regular_call_timeout: Duration::from_millis(regular_call_timeout_ms),
            crash_call_timeout: Duration::from_millis(crash_call_timeout_ms),
            thread_pool_size: thread_pool_size.clamp(MIN_THREAD_POOL_SIZE, MAX_THREAD_POOL_SIZE),
            requested_thread_pool_size: thread_pool_size,
        };
        info!(
            "RegularCallTimeoutMs: {}, CrashCallTimeoutMs: {}, ThreadPoolSizeFromOverlay: {}, \
             ThreadPoolSize: {}",
            regular_call_timeout_ms,
            crash_call_timeout_ms,
            thread_pool_size,
            config.thread_pool_size
        );
        config
    }

    /// How long a regular call may take before it is abandoned.
    pub fn regular_call_timeout(&self) -> Duration {
        self.regular_call_timeout
    }

    /// Budget after which a crash-on-timeout call kills both processes.
    pub fn crash_call_timeout(&self) -> Duration {
        self.crash_call_timeout
    }

    /// Effective number of worker threads.
    pub fn thread_pool_size(&self) -> usize {
        self.thread_pool_size
    }

    /// Pool size as requested, before clamping.
    pub fn requested_thread_pool_size(&self) -> usize {
        self.requested_thread_pool_size
    }
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::new(
            DEFAULT_REGULAR_CALL_TIMEOUT_MS,
            DEFAULT_CRASH_CALL_TIMEOUT_MS,
            DEFAULT_THREAD_POOL_SIZE,
        )
    }
}
