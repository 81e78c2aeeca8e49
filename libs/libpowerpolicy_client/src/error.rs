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

use thiserror::Error;

/// Reasons a connection attempt to the power policy daemon failed.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The daemon could not be found.
    #[error("failed to get car power policy daemon: {0}")]
    ServiceNotFound(rpc_substrate::Error),

    /// The death recipient could not be linked to the daemon.
    #[error("linking to death recipient failed: {0}")]
    LinkToDeath(rpc_substrate::Error),

    /// The daemon rejected the change callback.
    #[error("register power policy change callback failed: {0}")]
    Register(rpc_substrate::Error),
}
