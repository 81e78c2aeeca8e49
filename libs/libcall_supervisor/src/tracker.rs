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

//! Accounting of calls that re-enter this process from the peer.
//!
//! The peer is not expected to call back into this process while one of our calls into it is
//! pending, but it may have to. A chain such as
//!
//! 1. this process calls the peer,
//! 2. the peer calls a client library,
//! 3. the library calls this process,
//! 4. this process calls the peer again,
//!
//! can loop forever. Every call entered on behalf of the peer is counted per tag and overall,
//! and crossing either cap means the two processes are stuck.

use crate::error::CrashReason;
use log::{error, warn};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Maximum number of in-flight circular calls for a single tag.
pub const MAX_CIRCULAR_CALLS_PER_CALLER: usize = 5;
/// Maximum number of in-flight circular calls across all tags.
pub const MAX_CIRCULAR_CALL_TOTAL: usize = 10;

#[derive(Debug, Default)]
pub(crate) struct CircularCallTracker {
    inner: Mutex<TrackerInner>,
}

#[derive(Debug, Default)]
struct TrackerInner {
    per_tag: BTreeMap<String, usize>,
    total: usize,
}

impl CircularCallTracker {
    /// Counts a call entering under `tag`. The returned guard uncounts it when dropped.
    ///
    /// Fails without counting anything when either cap would be exceeded.
    pub fn enter(self: &Arc<Self>, tag: &str) -> Result<TrackedCall, CrashReason> {
        let mut inner = self.lock();
        let for_tag = inner.per_tag.get(tag).copied().unwrap_or(0);
        warn!(
            "Possible circular call for {tag}. Current circular calls are {for_tag}. \
             Total circular calls are {}.",
            inner.total
        );
        if for_tag + 1 > MAX_CIRCULAR_CALLS_PER_CALLER {
            error!(
                "Current circular calls for {tag} is {} which is more than the limit {}",
                for_tag + 1,
                MAX_CIRCULAR_CALLS_PER_CALLER
            );
            return Err(CrashReason::CircularCallsPerTag {
                tag: tag.to_owned(),
                count: for_tag + 1,
            });
        }
        if inner.total + 1 > MAX_CIRCULAR_CALL_TOTAL {
            error!(
                "Total circular calls is {} which is more than the limit {}",
                inner.total + 1,
                MAX_CIRCULAR_CALL_TOTAL
            );
            return Err(CrashReason::CircularCallsTotal { count: inner.total + 1 });
        }
        *inner.per_tag.entry(tag.to_owned()).or_default() += 1;
        inner.total += 1;
        Ok(TrackedCall { tracker: Arc::clone(self), tag: tag.to_owned() })
    }

    fn exit(&self, tag: &str) {
        let mut inner = self.lock();
        let for_tag = inner.per_tag.get(tag).copied().unwrap_or(0);
        if for_tag == 0 || inner.total == 0 {
            error!(
                "WTF: current circular calls for {tag} is {for_tag} (total {}) which is unexpected",
                inner.total
            );
        }
        match for_tag {
            0 | 1 => {
                inner.per_tag.remove(tag);
            }
            n => {
                inner.per_tag.insert(tag.to_owned(), n - 1);
            }
        }
        inner.total = inner.total.saturating_sub(1);
    }

    pub fn count(&self, tag: &str) -> usize {
        self.lock().per_tag.get(tag).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.lock().total
    }

    /// Copy of the per-tag counters, ordered by tag.
    pub fn snapshot(&self) -> Vec<(String, usize)> {
        self.lock().per_tag.iter().map(|(tag, count)| (tag.clone(), *count)).collect()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A counted in-flight circular call.
#[derive(Debug)]
pub(crate) struct TrackedCall {
    tracker: Arc<CircularCallTracker>,
    tag: String,
}

impl Drop for TrackedCall {
    fn drop(&mut self) {
        self.tracker.exit(&self.tag);
    }
}
