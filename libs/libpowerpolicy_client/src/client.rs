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

use crate::aidl::{ICarPowerPolicyChangeCallback, ICarPowerPolicyServer};
use crate::error::Error;
use crate::policy::{CarPowerPolicy, CarPowerPolicyFilter, PowerComponent};
use log::{error, info, warn};
use rpc_substrate::{DeathRecipient, ServiceManager, Strong};
use scopeguard::defer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, Weak};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

/// Name the power policy daemon is registered under.
pub const POWER_POLICY_SERVER_INTERFACE: &str =
    "android.frameworks.automotive.powerpolicy.ICarPowerPolicyServer/default";

const POWER_POLICY_DAEMON_FIND_MARGINAL_TIME: Duration = Duration::from_millis(500);

/// Where the connection to the daemon stands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Hooks supplied by the concrete client.
///
/// Hooks run on internal threads and must not call [`PowerPolicyClientBase::init`] or
/// [`PowerPolicyClientBase::release`], except `on_init_failed` which may call `release`.
pub trait PowerPolicyClient: Send + Sync + 'static {
    /// Components whose state changes should be delivered.
    fn components_of_interest(&self) -> Vec<PowerComponent>;

    /// Custom components whose state changes should be delivered.
    fn custom_components_of_interest(&self) -> Vec<i32> {
        Vec::new()
    }

    /// Called with every policy change that touches a component of interest.
    fn on_policy_changed(&self, policy: &CarPowerPolicy);

    /// Called on the connection thread when connecting failed.
    fn on_init_failed(&self) {}

    /// Called after every connection state transition. `state` is what
    /// [`PowerPolicyClientBase::connection_state`] reports at that point.
    fn on_connection_state_changed(&self, _state: ConnectionState) {}
}

/// Maintains a connection to the car power policy daemon on behalf of a [`PowerPolicyClient`].
///
/// The connection is made on a background thread by [`init`](Self::init). When the daemon dies,
/// the connection is released and made again. Dropping the base releases the connection.
pub struct PowerPolicyClientBase<C: PowerPolicyClient> {
    inner: Arc<Inner<C>>,
}

impl<C: PowerPolicyClient> PowerPolicyClientBase<C> {
    /// Wraps `client`. The daemon is looked up through `service_manager` once
    /// [`init`](Self::init) is called.
    pub fn new(
        client: C,
        service_manager: Arc<dyn ServiceManager<dyn ICarPowerPolicyServer>>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                client: Arc::new(client),
                service_manager,
                lifecycle: Mutex::new(()),
                state: Mutex::new(State::default()),
                unlinked: Condvar::new(),
                connecting: AtomicBool::new(false),
                closed: AtomicBool::new(false),
            }),
        }
    }

    /// Starts connecting to the daemon in the background. Does nothing while a connection
    /// attempt is running or a connection is established.
    pub fn init(&self) {
        self.inner.init();
    }

    /// Disconnects from the daemon, waiting for the connection thread to finish first.
    pub fn release(&self) {
        self.inner.release();
    }

    /// Releases the current connection and makes a new one.
    pub fn handle_binder_death(&self) {
        self.inner.handle_binder_death();
    }

    /// Current state of the connection to the daemon.
    pub fn connection_state(&self) -> ConnectionState {
        self.inner.connection_state()
    }

    /// The wrapped client.
    pub fn client(&self) -> &C {
        &self.inner.client
    }
}

impl<C: PowerPolicyClient> Drop for PowerPolicyClientBase<C> {
    fn drop(&mut self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        self.inner.release();
    }
}

struct Inner<C: PowerPolicyClient> {
    client: Arc<C>,
    service_manager: Arc<dyn ServiceManager<dyn ICarPowerPolicyServer>>,
    /// Serializes `init` and `release`.
    lifecycle: Mutex<()>,
    state: Mutex<State>,
    /// Signalled when a death recipient has been unlinked.
    unlinked: Condvar,
    connecting: AtomicBool,
    closed: AtomicBool,
}

#[derive(Default)]
struct State {
    connection_thread: Option<JoinHandle<()>>,
    /// Id of the latest connection thread. Kept after the handle is taken for joining.
    connection_thread_id: Option<ThreadId>,
    policy_server: Option<Strong<dyn ICarPowerPolicyServer>>,
    policy_change_callback: Option<Arc<dyn ICarPowerPolicyChangeCallback>>,
    death_recipient: Option<Arc<DeathRecipient>>,
    death_recipient_linked: bool,
    /// Incremented for every death recipient, so that late unlink notifications of an earlier
    /// connection are ignored.
    link_generation: u64,
    disconnecting: bool,
}

/// Forwards policy changes from the daemon to the client.
struct PolicyChangeForwarder<C: PowerPolicyClient> {
    client: Arc<C>,
}

impl<C: PowerPolicyClient> ICarPowerPolicyChangeCallback for PolicyChangeForwarder<C> {
    fn on_policy_changed(&self, policy: &CarPowerPolicy) -> rpc_substrate::Result<()> {
        self.client.on_policy_changed(policy);
        Ok(())
    }
}

impl<C: PowerPolicyClient> Inner<C> {
    fn init(self: &Arc<Self>) {
        if self.is_connection_thread() {
            error!("Cannot init from the connection thread");
            return;
        }
        let _lifecycle = lock(&self.lifecycle);
        {
            let mut state = self.lock_state();
            if self.connecting.load(Ordering::SeqCst) {
                warn!("Connecting in progress");
                return;
            }
            if state.policy_server.is_some() {
                warn!("Already connected");
                return;
            }
            self.connecting.store(true, Ordering::SeqCst);
            // A previous attempt has finished its work once `connecting` is cleared.
            if let Some(previous) = state.connection_thread.take() {
                if previous.join().is_err() {
                    error!("Previous connection thread panicked");
                }
            }
        }
        self.notify_state(ConnectionState::Connecting);

        let mut state = self.lock_state();
        let inner = Arc::clone(self);
        match thread::Builder::new()
            .name("powerpolicy-connect".to_owned())
            .spawn(move || inner.run_connection())
        {
            Ok(handle) => {
                state.connection_thread_id = Some(handle.thread().id());
                state.connection_thread = Some(handle);
            }
            Err(e) => {
                error!("Failed to spawn the connection thread: {e}");
                self.connecting.store(false, Ordering::SeqCst);
                drop(state);
                self.notify_state(ConnectionState::Disconnected);
            }
        }
    }

    fn release(&self) {
        if self.is_connection_thread() {
            error!("Cannot release from callback, deadlock would happen");
            return;
        }
        let _lifecycle = lock(&self.lifecycle);
        self.connecting.store(false, Ordering::SeqCst);
        let connection_thread = self.lock_state().connection_thread.take();
        if let Some(connection_thread) = connection_thread {
            if connection_thread.join().is_err() {
                error!("Connection thread panicked");
            }
        }

        let (server, callback, recipient) = {
            let mut state = self.lock_state();
            let Some(server) = state.policy_server.clone() else {
                return;
            };
            if state.disconnecting {
                return;
            }
            state.disconnecting = true;
            (server, state.policy_change_callback.clone(), state.death_recipient.clone())
        };
        self.notify_state(ConnectionState::Disconnecting);

        let binder = server.as_binder();
        if binder.is_binder_alive() {
            if let Some(callback) = &callback {
                if let Err(e) = server.unregister_power_policy_change_callback(callback) {
                    error!("Unregister power policy change callback failed: {e}");
                }
            }
            if let Some(recipient) = &recipient {
                match binder.unlink_to_death(recipient) {
                    Ok(()) => {
                        let state = self.lock_state();
                        let _state = self
                            .unlinked
                            .wait_while(state, |s| s.death_recipient_linked)
                            .unwrap_or_else(PoisonError::into_inner);
                    }
                    Err(e) => warn!("Unlinking from death recipient failed: {e}"),
                }
            }
        }

        {
            let mut state = self.lock_state();
            state.policy_server = None;
            state.policy_change_callback = None;
            state.death_recipient = None;
            state.death_recipient_linked = false;
            state.disconnecting = false;
        }
        info!("Released connection to power policy daemon");
        self.notify_state(ConnectionState::Disconnected);
    }

    fn handle_binder_death(self: &Arc<Self>) {
        info!("Power policy daemon died, reconnecting");
        self.release();
        if self.closed.load(Ordering::SeqCst) {
            return;
        }
        self.init();
    }

    fn connection_state(&self) -> ConnectionState {
        let state = self.lock_state();
        if state.disconnecting {
            ConnectionState::Disconnecting
        } else if self.connecting.load(Ordering::SeqCst) {
            ConnectionState::Connecting
        } else if state.policy_server.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    fn run_connection(self: Arc<Self>) {
        defer! {
            self.connecting.store(false, Ordering::SeqCst);
        }
        match self.connect_to_daemon() {
            Ok(()) => {
                self.connecting.store(false, Ordering::SeqCst);
                self.notify_state(ConnectionState::Connected);
            }
            Err(e) => {
                warn!("Connecting to car power policy daemon failed: {e}");
                self.notify_state(ConnectionState::Disconnected);
                self.client.on_init_failed();
            }
        }
    }

    fn connect_to_daemon(self: &Arc<Self>) -> Result<(), Error> {
        let start = Instant::now();
        let server = self
            .service_manager
            .wait_for_interface(POWER_POLICY_SERVER_INTERFACE)
            .map_err(Error::ServiceNotFound)?;
        let elapsed = start.elapsed();
        if elapsed > POWER_POLICY_DAEMON_FIND_MARGINAL_TIME {
            warn!("Finding power policy daemon took too long({} ms)", elapsed.as_millis());
        }

        let binder = server.as_binder();
        let (recipient, generation) = {
            let mut state = self.lock_state();
            state.link_generation += 1;
            state.death_recipient_linked = true;
            let generation = state.link_generation;
            (Arc::new(self.new_death_recipient(generation)), generation)
        };
        if let Err(e) = binder.link_to_death(&recipient) {
            self.mark_unlinked(generation);
            return Err(Error::LinkToDeath(e));
        }

        let callback: Arc<dyn ICarPowerPolicyChangeCallback> =
            Arc::new(PolicyChangeForwarder { client: Arc::clone(&self.client) });
        let filter = CarPowerPolicyFilter {
            components: self.client.components_of_interest(),
            custom_components: self.client.custom_components_of_interest(),
        };
        if let Err(e) = server.register_power_policy_change_callback(&callback, &filter) {
            if let Err(unlink_error) = binder.unlink_to_death(&recipient) {
                warn!("Unlinking from death recipient failed: {unlink_error}");
                self.mark_unlinked(generation);
            }
            return Err(Error::Register(e));
        }

        let mut state = self.lock_state();
        state.policy_server = Some(server);
        state.policy_change_callback = Some(callback);
        state.death_recipient = Some(recipient);
        info!("Connected to power policy daemon");
        Ok(())
    }

    fn new_death_recipient(self: &Arc<Self>, generation: u64) -> DeathRecipient {
        let on_died: Weak<Self> = Arc::downgrade(self);
        let on_unlinked: Weak<Self> = Arc::downgrade(self);
        DeathRecipient::new(move || {
            if let Some(inner) = on_died.upgrade() {
                inner.handle_binder_death();
            }
        })
        .with_on_unlinked(move || {
            if let Some(inner) = on_unlinked.upgrade() {
                info!("Power policy death recipient unlinked");
                inner.mark_unlinked(generation);
            }
        })
    }

    fn mark_unlinked(&self, generation: u64) {
        let mut state = self.lock_state();
        if state.link_generation == generation {
            state.death_recipient_linked = false;
        }
        drop(state);
        self.unlinked.notify_all();
    }

    fn is_connection_thread(&self) -> bool {
        self.lock_state().connection_thread_id == Some(thread::current().id())
    }

    fn notify_state(&self, state: ConnectionState) {
        self.client.on_connection_state_changed(state);
    }

    fn lock_state(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
