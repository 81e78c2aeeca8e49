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

use crate::error::Result;
use std::fmt::{self, Debug, Formatter};
use std::sync::Arc;

/// Shared handle to a (possibly remote) object.
pub type SpIBinder = Arc<dyn IBinder>;

/// Strong reference to a typed interface.
pub type Strong<I> = Arc<I>;

/// Operations available on every remote object handle.
pub trait IBinder: Send + Sync {
    /// Returns false once the hosting process is gone.
    fn is_binder_alive(&self) -> bool;

    /// Registers `recipient` to be notified when the object dies.
    ///
    /// When the object dies, [`DeathRecipient::binder_died`] is invoked on an arbitrary thread,
    /// followed by [`DeathRecipient::unlinked`].
    fn link_to_death(&self, recipient: &Arc<DeathRecipient>) -> Result<()>;

    /// Removes a previously linked `recipient`.
    ///
    /// Returning `Ok` only means the request was accepted; the unlink is complete once
    /// [`DeathRecipient::unlinked`] has been invoked, possibly on another thread.
    fn unlink_to_death(&self, recipient: &Arc<DeathRecipient>) -> Result<()>;
}

/// A typed interface backed by an [`IBinder`].
pub trait Interface: Send + Sync {
    /// Returns the binder object behind this interface.
    fn as_binder(&self) -> SpIBinder;
}

type Callback = Box<dyn Fn() + Send + Sync + 'static>;

/// Death notification registration.
///
/// Recipients are identified by address, so the same `Arc` must be passed to
/// [`IBinder::link_to_death`] and [`IBinder::unlink_to_death`].
pub struct DeathRecipient {
    on_died: Callback,
    on_unlinked: Option<Callback>,
}

impl DeathRecipient {
    /// Create a new death recipient that will call the given callback when its associated object
    /// dies.
    pub fn new<F>(callback: F) -> DeathRecipient
    where
        F: Fn() + Send + Sync + 'static,
    {
        DeathRecipient { on_died: Box::new(callback), on_unlinked: None }
    }

    /// Sets the callback invoked once the recipient is no longer linked, either because
    /// [`IBinder::unlink_to_death`] completed or because the death was delivered.
    pub fn with_on_unlinked<F>(mut self, callback: F) -> DeathRecipient
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.on_unlinked = Some(Box::new(callback));
        self
    }

    /// Invoked by the transport when the linked object dies.
    pub fn binder_died(&self) {
        (self.on_died)();
    }

    /// Invoked by the transport when the link is gone.
    pub fn unlinked(&self) {
        if let Some(on_unlinked) = &self.on_unlinked {
            on_unlinked();
        }
    }
}

impl Debug for DeathRecipient {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathRecipient")
            .field("has_on_unlinked", &self.on_unlinked.is_some())
            .finish_non_exhaustive()
    }
}
