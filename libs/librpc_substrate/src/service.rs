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

use crate::binder::Strong;
use crate::error::Result;

/// Service lookup.
pub trait ServiceManager<I: ?Sized>: Send + Sync {
    /// Blocks until the service called `name` is available and returns it.
    ///
    /// Implementations may give up and return [`Error::NameNotFound`](crate::Error::NameNotFound)
    /// instead of blocking forever.
    fn wait_for_interface(&self, name: &str) -> Result<Strong<I>>;
}
