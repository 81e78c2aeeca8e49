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

/// Failures reported by the RPC substrate.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// The transaction failed on the transport level. Callers must treat this as fatal for the
    /// peer and never retry it.
    #[error("remote transport failure: {0}")]
    RemoteTransport(String),

    /// The remote object is no longer alive.
    #[error("remote object is dead")]
    DeadObject,

    /// No service is registered under the given name.
    #[error("service {0} not found")]
    NameNotFound(String),

    /// The death recipient was never linked to the object.
    #[error("death recipient is not linked")]
    NotLinked,

    /// The remote side rejected the request.
    #[error("{0}")]
    Failed(String),
}

impl Error {
    /// Returns true for the transport-level failure kind that must not be retried.
    pub fn is_remote_transport(&self) -> bool {
        matches!(self, Error::RemoteTransport(_))
    }
}

/// A specialized [`Result`](std::result::Result) for substrate operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;
