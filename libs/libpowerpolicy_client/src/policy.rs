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

/// Hardware components controlled by power policies.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(i32)]
pub enum PowerComponent {
    Audio = 1,
    Media = 2,
    Display = 3,
    Bluetooth = 4,
    Wifi = 5,
    Cellular = 6,
    Ethernet = 7,
    Projection = 8,
    Nfc = 9,
    Input = 10,
    VoiceInteraction = 11,
    VisualInteraction = 12,
    TrustedDeviceDetection = 13,
    Location = 14,
    Microphone = 15,
    Cpu = 16,
}

/// Custom (OEM defined) components are numbered from this value.
pub const MINIMUM_CUSTOM_COMPONENT_VALUE: i32 = 1000;

/// A power policy as applied by the daemon.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CarPowerPolicy {
    pub policy_id: String,
    pub enabled_components: Vec<PowerComponent>,
    pub disabled_components: Vec<PowerComponent>,
    pub enabled_custom_components: Vec<i32>,
    pub disabled_custom_components: Vec<i32>,
}

/// Components a client wants to hear about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CarPowerPolicyFilter {
    pub components: Vec<PowerComponent>,
    pub custom_components: Vec<i32>,
}

impl CarPowerPolicyFilter {
    /// Returns true if `policy` enables or disables any component of this filter.
    pub fn matches(&self, policy: &CarPowerPolicy) -> bool {
        self.components.iter().any(|c| {
            has_component(&policy.enabled_components, *c)
                || has_component(&policy.disabled_components, *c)
        }) || self.custom_components.iter().any(|c| {
            policy.enabled_custom_components.contains(c)
                || policy.disabled_custom_components.contains(c)
        })
    }
}

/// Tests if `components` has `component`.
pub fn has_component(components: &[PowerComponent], component: PowerComponent) -> bool {
    components.contains(&component)
}
