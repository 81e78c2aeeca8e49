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

//! Client side of the car power policy daemon.
//!
//! [`PowerPolicyClientBase`] keeps a connection to the daemon and forwards policy changes to a
//! [`PowerPolicyClient`]. To react to policy changes:
//!
//! 1. Implement [`PowerPolicyClient::components_of_interest`] to list the components to watch.
//! 2. Implement [`PowerPolicyClient::on_policy_changed`].
//! 3. Check whether the component of interest is enabled or disabled with [`has_component`].
//!
//! ```ignore
//! fn on_policy_changed(&self, policy: &CarPowerPolicy) {
//!     if has_component(&policy.enabled_components, PowerComponent::Audio) {
//!         // Do something when AUDIO is enabled.
//!     } else if has_component(&policy.disabled_components, PowerComponent::Audio) {
//!         // Do something when AUDIO is disabled.
//!     }
//! }
//! ```

mod aidl;
mod client;
mod error;
mod policy;

pub use aidl::{ICarPowerPolicyChangeCallback, ICarPowerPolicyServer};
pub use client::{
    ConnectionState, PowerPolicyClient, PowerPolicyClientBase, POWER_POLICY_SERVER_INTERFACE,
};
pub use error::Error;
pub use policy::{
    has_component, CarPowerPolicy, CarPowerPolicyFilter, PowerComponent,
    MINIMUM_CUSTOM_COMPONENT_VALUE,
};
