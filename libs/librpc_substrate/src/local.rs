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

//! In-process implementation of the substrate.

use crate::binder::{DeathRecipient, IBinder, Strong};
use crate::error::{Error, Result};
use crate::service::ServiceManager;
use log::{debug, info};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;

/// A binder object hosted by this process.
///
/// Death and unlink notifications are delivered on freshly spawned threads, never on the thread
/// that triggered them.
#[derive(Debug, Default)]
pub struct LocalBinder {
    inner: Mutex<LocalBinderInner>,
}

#[derive(Debug)]
struct LocalBinderInner {
    alive: bool,
    recipients: Vec<Arc<DeathRecipient>>,
}

impl Default for LocalBinderInner {
    fn default() -> Self {
        Self { alive: true, recipients: Vec::new() }
    }
}

impl LocalBinder {
    pub fn new() -> Arc<LocalBinder> {
        Arc::new(LocalBinder::default())
    }

    /// Marks the object dead and notifies every linked recipient. Calling it again is a no-op.
    pub fn kill(&self) {
        let recipients = {
            let mut inner = self.lock();
            if !inner.alive {
                return;
            }
            inner.alive = false;
            std::mem::take(&mut inner.recipients)
        };
        info!("Local binder died, notifying {} recipient(s)", recipients.len());
        thread::spawn(move || {
            for recipient in recipients {
                recipient.binder_died();
                recipient.unlinked();
            }
        });
    }

    /// Number of currently linked death recipients.
    pub fn linked_recipient_count(&self) -> usize {
        self.lock().recipients.len()
    }

    fn lock(&self) -> MutexGuard<'_, LocalBinderInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl IBinder for LocalBinder {
    fn is_binder_alive(&self) -> bool {
        self.lock().alive
    }

    fn link_to_death(&self, recipient: &Arc<DeathRecipient>) -> Result<()> {
        let mut inner = self.lock();
        if !inner.alive {
            return Err(Error::DeadObject);
        }
        if !inner.recipients.iter().any(|r| Arc::ptr_eq(r, recipient)) {
            inner.recipients.push(Arc::clone(recipient));
        }
        Ok(())
    }

    fn unlink_to_death(&self, recipient: &Arc<DeathRecipient>) -> Result<()> {
        {
            let mut inner = self.lock();
            if !inner.alive {
                return Err(Error::DeadObject);
            }
            let index = inner
                .recipients
                .iter()
                .position(|r| Arc::ptr_eq(r, recipient))
                .ok_or(Error::NotLinked)?;
            inner.recipients.remove(index);
        }
        let recipient = Arc::clone(recipient);
        thread::spawn(move || recipient.unlinked());
        Ok(())
    }
}

/// Name to interface registry for services living in this process.
pub struct LocalServiceManager<I: ?Sized> {
    services: Mutex<HashMap<String, Strong<I>>>,
    registered: Condvar,
    wait_timeout: Option<Duration>,
    lookups: AtomicUsize,
}

impl<I: ?Sized> Default for LocalServiceManager<I> {
    fn default() -> Self {
        Self {
            services: Mutex::new(HashMap::new()),
            registered: Condvar::new(),
            wait_timeout: None,
            lookups: AtomicUsize::new(0),
        }
    }
}

impl<I: ?Sized> LocalServiceManager<I> {
    /// Creates a registry whose lookups block until the service shows up.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry whose lookups give up after `timeout`.
    pub fn with_wait_timeout(timeout: Duration) -> Self {
        Self { wait_timeout: Some(timeout), ..Self::default() }
    }

    /// Registers `service` under `name`, replacing any earlier registration, and wakes up
    /// blocked lookups.
    pub fn add_service(&self, name: &str, service: Strong<I>) {
        self.lock().insert(name.to_owned(), service);
        self.registered.notify_all();
    }

    pub fn remove_service(&self, name: &str) -> Option<Strong<I>> {
        self.lock().remove(name)
    }

    /// Number of lookups performed so far.
    pub fn lookup_count(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Strong<I>>> {
        self.services.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<I: ?Sized + Send + Sync> ServiceManager<I> for LocalServiceManager<I> {
    fn wait_for_interface(&self, name: &str) -> Result<Strong<I>> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        let services = self.lock();
        let services = match self.wait_timeout {
            Some(timeout) => {
                self.registered
                    .wait_timeout_while(services, timeout, |s| !s.contains_key(name))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .registered
                .wait_while(services, |s| !s.contains_key(name))
                .unwrap_or_else(PoisonError::into_inner),
        };
        match services.get(name) {
            Some(service) => Ok(Arc::clone(service)),
            None => {
                debug!("Gave up waiting for {name}");
                Err(Error::NameNotFound(name.to_owned()))
            }
        }
    }
}
