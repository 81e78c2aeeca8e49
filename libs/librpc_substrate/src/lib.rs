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

//! The binder-style RPC contract the car service clients are written against.
//!
//! A transport has to provide three primitives: a blocking service lookup
//! ([`ServiceManager::wait_for_interface`]), method invocation whose failures are reported as
//! [`Error`] (with [`Error::RemoteTransport`] as the distinguished fatal kind), and death
//! notifications ([`IBinder::link_to_death`]) whose cancellation completes asynchronously.
//!
//! [`LocalBinder`] and [`LocalServiceManager`] implement the contract for objects living in the
//! same process.

mod binder;
mod error;
mod local;
mod service;
mod state;

pub use crate::binder::{DeathRecipient, IBinder, Interface, SpIBinder, Strong};
pub use crate::error::{Error, Result};
pub use crate::local::{LocalBinder, LocalServiceManager};
pub use crate::service::ServiceManager;
pub use crate::state::{CallingIdentity, ThreadCallingIdentity, ThreadState};
