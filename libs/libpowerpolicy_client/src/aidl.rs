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

//! Interfaces exchanged with the car power policy daemon.

use crate::policy::{CarPowerPolicy, CarPowerPolicyFilter};
use rpc_substrate::{Interface, Result};
use std::sync::Arc;

/// The daemon side.
pub trait ICarPowerPolicyServer: Interface {
    /// Subscribes `callback` to changes of the components listed in `filter`.
    fn register_power_policy_change_callback(
        &self,
        callback: &Arc<dyn ICarPowerPolicyChangeCallback>,
        filter: &CarPowerPolicyFilter,
    ) -> Result<()>;

    fn unregister_power_policy_change_callback(
        &self,
        callback: &Arc<dyn ICarPowerPolicyChangeCallback>,
    ) -> Result<()>;
}

/// Implemented by clients to receive policy changes.
pub trait ICarPowerPolicyChangeCallback: Send + Sync {
    fn on_policy_changed(&self, policy: &CarPowerPolicy) -> Result<()>;
}
