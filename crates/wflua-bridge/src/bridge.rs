use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::ffi::c_void;
use std::rc::{Rc, Weak};

use tracing::{debug, error, warn};
use wflua_core::{Emitters, ObjectId, SignalListener, SignalPayload};

use crate::connection::{Connection, SignalCallback};
use crate::lifetime::{
    DestructionSink, LifetimeCallback, LifetimeError, LifetimeSubscription, LifetimeTracker,
    TRACKER_KEY, TrackerSlot,
};
use crate::registry::{Registry, RegistryError};

/// Counters describing the bridge's current bookkeeping.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Emitters with at least one signal subscription.
    pub emitters: usize,
    pub connections: usize,
    /// Installed lifetime trackers.
    pub trackers: usize,
    pub lifetime_subscriptions: usize,
}

impl BridgeStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

struct PendingDeath {
    emitter: ObjectId,
    subscribers: Vec<LifetimeSubscription>,
}

struct Shared {
    host: Rc<dyn Emitters>,
    registry: RefCell<Registry>,
    trackers: RefCell<HashMap<ObjectId, Weak<LifetimeTracker>>>,
    dispatch_depth: Cell<usize>,
    pending: RefCell<VecDeque<PendingDeath>>,
    dying: RefCell<HashSet<ObjectId>>,
    this: Weak<Shared>,
}

/// Multiplexes host signals and emitter destruction into foreign callbacks.
///
/// Cheap to clone; all clones share one registry. Every method must be called
/// on the compositor thread, and none of them holds an internal borrow while
/// a foreign callback runs, so callbacks may call straight back in.
#[derive(Clone)]
pub struct Bridge {
    shared: Rc<Shared>,
}

struct DispatchGuard<'a>(&'a Cell<usize>);

impl<'a> DispatchGuard<'a> {
    fn enter(depth: &'a Cell<usize>) -> Self {
        depth.set(depth.get() + 1);
        Self(depth)
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.0.set(self.0.get() - 1);
    }
}

impl Bridge {
    pub fn new(host: Rc<dyn Emitters>) -> Self {
        let shared = Rc::new_cyclic(|this| Shared {
            host,
            registry: RefCell::new(Registry::new()),
            trackers: RefCell::new(HashMap::new()),
            dispatch_depth: Cell::new(0),
            pending: RefCell::new(VecDeque::new()),
            dying: RefCell::new(HashSet::new()),
            this: this.clone(),
        });
        Self { shared }
    }

    /// Allocate a detached connection.
    ///
    /// # Safety
    ///
    /// See [`Connection::new`].
    pub unsafe fn create_connection(
        &self,
        callback: SignalCallback,
        data1: *mut c_void,
        data2: *mut c_void,
    ) -> Rc<Connection> {
        // SAFETY: forwarded to the caller.
        let conn = unsafe { Connection::new(callback, data1, data2) };
        debug!("Created {conn:?}");
        conn
    }

    /// Destroy a connection, unsubscribing it first if it is attached.
    ///
    /// Memory is released once the last in-flight dispatch lets go of it.
    pub fn destroy_connection(&self, conn: Rc<Connection>) {
        if let Some(emitter) = conn.emitter() {
            self.unsubscribe(emitter, &conn);
        }
        conn.mark_destroyed();
        debug!("Destroyed {conn:?}");
    }

    /// Subscribe `conn` to `signal` on `emitter`.
    ///
    /// Programming errors are logged and leave every table untouched.
    pub fn subscribe(&self, emitter: ObjectId, signal: &str, conn: &Rc<Connection>) {
        if let Err(err) = self.try_subscribe(emitter, signal, conn) {
            error!(%emitter, signal, "{err}");
        }
    }

    fn try_subscribe(
        &self,
        emitter: ObjectId,
        signal: &str,
        conn: &Rc<Connection>,
    ) -> Result<(), RegistryError> {
        let shared = &self.shared;
        if shared.is_dying(emitter) {
            return Err(RegistryError::EmitterDying { emitter });
        }

        let insertion = shared.registry.borrow_mut().insert(emitter, signal, conn)?;

        if insertion.first_for_emitter && shared.ensure_tracker(emitter).is_none() {
            let _ = shared.registry.borrow_mut().remove(emitter, conn);
            warn!(%emitter, "Emitter cannot carry custom data; subscription dropped");
            return Ok(());
        }

        if insertion.first_for_signal {
            let listener = shared.listener(emitter, Rc::clone(&insertion.signal));
            match shared.host.connect_signal(emitter, signal, listener) {
                Some(id) => shared.registry.borrow_mut().set_listener(emitter, signal, id),
                None => warn!(%emitter, signal, "Host refused signal listener"),
            }
        }

        debug!(%emitter, signal, "Subscribed {conn:?}");
        Ok(())
    }

    /// Unsubscribe `conn` from `emitter`.
    pub fn unsubscribe(&self, emitter: ObjectId, conn: &Rc<Connection>) {
        let shared = &self.shared;
        if shared.is_dying(emitter) {
            error!(%emitter, "{}", RegistryError::EmitterDying { emitter });
            return;
        }

        let removal = match shared.registry.borrow_mut().remove(emitter, conn) {
            Ok(removal) => removal,
            Err(err) => {
                error!(%emitter, "{err}");
                return;
            }
        };

        if let Some(id) = removal.listener {
            shared.host.disconnect_signal(emitter, id);
        }
        if removal.emitter_emptied {
            shared.release_tracker_if_idle(emitter);
        }
        debug!(%emitter, signal = &*removal.signal, "Unsubscribed {conn:?}");
    }

    /// Detach every connection of `emitter` without treating it as destroyed.
    ///
    /// Lifetime subscriptions stay in place.
    pub fn unsubscribe_all(&self, emitter: ObjectId) {
        let shared = &self.shared;
        if shared.is_dying(emitter) {
            error!(%emitter, "{}", RegistryError::EmitterDying { emitter });
            return;
        }

        let Some(purge) = shared.registry.borrow_mut().purge(emitter) else {
            debug!(%emitter, "Nothing to unsubscribe");
            return;
        };
        for id in &purge.listeners {
            shared.host.disconnect_signal(emitter, *id);
        }
        shared.release_tracker_if_idle(emitter);
        debug!(%emitter, "Unsubscribed {} connections", purge.connections.len());
    }

    /// Register `(callback, data)` to fire once when `emitter` is destroyed.
    ///
    /// # Safety
    ///
    /// `callback` must be sound to call with `emitter` and `data` until it
    /// fires or is unsubscribed.
    pub unsafe fn lifetime_subscribe(
        &self,
        emitter: ObjectId,
        callback: LifetimeCallback,
        data: *mut c_void,
    ) {
        let shared = &self.shared;
        if shared.is_dying(emitter) {
            error!(%emitter, "{}", LifetimeError::EmitterDying { emitter });
            return;
        }
        let Some(tracker) = shared.ensure_tracker(emitter) else {
            warn!(%emitter, "Emitter cannot carry custom data; lifetime subscription dropped");
            return;
        };
        tracker.add(callback, data);
        debug!(%emitter, "Lifetime subscribed ({} total)", tracker.len());
    }

    /// Remove the most recent registration of `callback` on `emitter`.
    pub fn lifetime_unsubscribe(&self, emitter: ObjectId, callback: LifetimeCallback) {
        if let Err(err) = self.shared.try_lifetime_unsubscribe(emitter, callback) {
            error!(%emitter, "{err}");
        }
    }

    /// Deliver an emission of `signal` on `emitter` to its connections.
    ///
    /// Connections are invoked in subscription order from a snapshot taken
    /// up front; an entry is skipped if its connection was unsubscribed (or
    /// re-subscribed) by an earlier callback.
    pub fn dispatch(&self, emitter: ObjectId, signal: &str, payload: SignalPayload) {
        let shared = &self.shared;
        let snapshot = shared.registry.borrow().snapshot(emitter, signal);
        if snapshot.is_empty() {
            return;
        }

        {
            let _guard = DispatchGuard::enter(&shared.dispatch_depth);
            for (conn, generation) in &snapshot {
                if conn.is_live(*generation) {
                    conn.invoke(payload);
                }
            }
        }
        drop(snapshot);

        if shared.dispatch_depth.get() == 0 {
            shared.drain_pending();
        }
    }

    pub fn stats(&self) -> BridgeStats {
        let shared = &self.shared;
        let registry = shared.registry.borrow();
        let trackers: Vec<Rc<LifetimeTracker>> = shared
            .trackers
            .borrow()
            .values()
            .filter_map(Weak::upgrade)
            .collect();
        BridgeStats {
            emitters: registry.emitter_count(),
            connections: registry.connection_count(),
            trackers: trackers.len(),
            lifetime_subscriptions: trackers.iter().map(|t| t.len()).sum(),
        }
    }

    /// Whether a lifetime tracker sits on `emitter`.
    pub fn has_tracker(&self, emitter: ObjectId) -> bool {
        self.shared.tracker(emitter).is_some()
    }

    pub fn lifetime_subscription_count(&self, emitter: ObjectId) -> usize {
        self.shared.tracker(emitter).map_or(0, |t| t.len())
    }

    pub fn is_subscribed(&self, emitter: ObjectId) -> bool {
        self.shared.registry.borrow().contains(emitter)
    }

    /// Connections of `(emitter, signal)` in fan-out order.
    pub fn connections(&self, emitter: ObjectId, signal: &str) -> Vec<Rc<Connection>> {
        self.shared.registry.borrow().connections(emitter, signal)
    }

    pub fn signals(&self, emitter: ObjectId) -> Vec<String> {
        self.shared
            .registry
            .borrow()
            .signals(emitter)
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    /// Tear everything down.
    ///
    /// The registry is expected to be empty by now; leftovers are logged and
    /// removed from the host. Returns what was left over.
    pub fn shutdown(&self) -> BridgeStats {
        let shared = &self.shared;
        let residue = self.stats();

        let drained = shared.registry.borrow_mut().drain();
        if !drained.is_empty() {
            error!(
                "Registry not empty at teardown: {} connections on {} emitters",
                residue.connections, residue.emitters
            );
        }
        for (emitter, purge) in drained {
            for id in purge.listeners {
                shared.host.disconnect_signal(emitter, id);
            }
        }

        let trackers: Vec<ObjectId> = shared.trackers.borrow().keys().copied().collect();
        for emitter in trackers {
            if let Some(tracker) = shared.tracker(emitter).filter(|t| !t.is_empty()) {
                error!(%emitter, "{} lifetime subscriptions left at teardown", tracker.len());
            }
            shared.uninstall_tracker(emitter);
        }

        let pending = shared.pending.borrow_mut().drain(..).count();
        if pending > 0 {
            error!("{pending} lifetime notifications still queued at teardown");
        }

        residue
    }
}

impl Shared {
    fn is_dying(&self, emitter: ObjectId) -> bool {
        self.dying.borrow().contains(&emitter)
    }

    fn tracker(&self, emitter: ObjectId) -> Option<Rc<LifetimeTracker>> {
        self.trackers.borrow().get(&emitter).and_then(Weak::upgrade)
    }

    fn sink(&self) -> Weak<dyn DestructionSink> {
        self.this.clone()
    }

    /// The host listener for `(emitter, signal)`. It holds the bridge weakly.
    fn listener(&self, emitter: ObjectId, signal: Rc<str>) -> SignalListener {
        let this = self.this.clone();
        Rc::new(move |payload| {
            if let Some(shared) = this.upgrade() {
                Bridge { shared }.dispatch(emitter, &signal, payload);
            }
        })
    }

    /// Return the tracker on `emitter`, installing one if absent.
    fn ensure_tracker(&self, emitter: ObjectId) -> Option<Rc<LifetimeTracker>> {
        if let Some(tracker) = self.tracker(emitter) {
            return Some(tracker);
        }

        let tracker = LifetimeTracker::new(emitter, self.sink());
        self.host.store_data(
            emitter,
            TRACKER_KEY,
            Box::new(TrackerSlot(Rc::clone(&tracker))),
        );
        if !self.host.has_data(emitter, TRACKER_KEY) {
            tracker.disarm();
            return None;
        }

        self.trackers
            .borrow_mut()
            .insert(emitter, Rc::downgrade(&tracker));
        debug!(%emitter, "Installed lifetime tracker");
        Some(tracker)
    }

    /// Uninstall the tracker on `emitter` unless something still needs it.
    fn release_tracker_if_idle(&self, emitter: ObjectId) {
        if self.registry.borrow().contains(emitter) {
            return;
        }
        match self.tracker(emitter) {
            Some(tracker) if !tracker.is_empty() => {}
            _ => self.uninstall_tracker(emitter),
        }
    }

    fn uninstall_tracker(&self, emitter: ObjectId) {
        self.trackers.borrow_mut().remove(&emitter);
        let Some(slot) = self.host.release_data(emitter, TRACKER_KEY) else {
            return;
        };
        match slot.downcast::<TrackerSlot>() {
            Ok(slot) => {
                slot.0.disarm();
                debug!(%emitter, "Uninstalled lifetime tracker");
            }
            Err(_) => error!(%emitter, "Foreign data stored under the tracker key"),
        }
    }

    fn try_lifetime_unsubscribe(
        &self,
        emitter: ObjectId,
        callback: LifetimeCallback,
    ) -> Result<(), LifetimeError> {
        if self.is_dying(emitter) {
            return Err(LifetimeError::EmitterDying { emitter });
        }
        let tracker = self
            .tracker(emitter)
            .ok_or(LifetimeError::NoTracker { emitter })?;
        tracker.remove(callback)?;
        drop(tracker);

        self.release_tracker_if_idle(emitter);
        debug!(%emitter, "Lifetime unsubscribed");
        Ok(())
    }

    fn fire_lifetime(&self, emitter: ObjectId, subscribers: Vec<LifetimeSubscription>) {
        for subscription in &subscribers {
            subscription.fire(emitter);
        }
        self.dying.borrow_mut().remove(&emitter);
    }

    fn drain_pending(&self) {
        loop {
            let next = self.pending.borrow_mut().pop_front();
            let Some(death) = next else {
                break;
            };
            self.fire_lifetime(death.emitter, death.subscribers);
        }
    }
}

impl DestructionSink for Shared {
    fn emitter_destroyed(&self, emitter: ObjectId, subscribers: Vec<LifetimeSubscription>) {
        self.trackers.borrow_mut().remove(&emitter);
        self.dying.borrow_mut().insert(emitter);

        // The host tears down the listeners of a destroyed object itself.
        let purged = self.registry.borrow_mut().purge(emitter);
        if let Some(purge) = purged {
            debug!(%emitter, "Purged {} connections of destroyed emitter", purge.connections.len());
        }

        if self.dispatch_depth.get() > 0 {
            debug!(%emitter, "Emitter destroyed mid-dispatch; deferring lifetime callbacks");
            self.pending
                .borrow_mut()
                .push_back(PendingDeath { emitter, subscribers });
        } else {
            self.fire_lifetime(emitter, subscribers);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wflua_core::{HeadlessCompositor, ObjectData, SignalSource};

    unsafe extern "C" fn noop(_p: *mut c_void, _d1: *mut c_void, _d2: *mut c_void) {}

    unsafe extern "C" fn on_death(_emitter: *mut c_void, data: *mut c_void) {
        let fired = unsafe { &*data.cast::<Cell<u32>>() };
        fired.set(fired.get() + 1);
    }

    fn setup() -> (Rc<HeadlessCompositor>, Bridge, ObjectId) {
        let host = Rc::new(HeadlessCompositor::new());
        let view = host.add_view("foot", "shell", None);
        let bridge = Bridge::new(Rc::clone(&host) as Rc<dyn Emitters>);
        (host, bridge, view)
    }

    #[test]
    fn test_one_host_listener_per_signal() {
        let (host, bridge, view) = setup();
        let a = unsafe { bridge.create_connection(noop, std::ptr::null_mut(), std::ptr::null_mut()) };
        let b = unsafe { bridge.create_connection(noop, std::ptr::null_mut(), std::ptr::null_mut()) };

        bridge.subscribe(view, "s", &a);
        bridge.subscribe(view, "s", &b);
        assert_eq!(host.signal_listener_count(view, "s"), 1);

        bridge.unsubscribe(view, &a);
        assert_eq!(host.signal_listener_count(view, "s"), 1);
        bridge.unsubscribe(view, &b);
        assert_eq!(host.signal_listener_count(view, "s"), 0);
        assert!(!host.has_data(view, TRACKER_KEY));
    }

    #[test]
    fn test_tracker_survives_for_lifetime_subscribers() {
        let (host, bridge, view) = setup();
        let fired = Cell::new(0u32);
        let data = std::ptr::from_ref(&fired).cast_mut().cast();
        let conn = unsafe { bridge.create_connection(noop, std::ptr::null_mut(), std::ptr::null_mut()) };

        bridge.subscribe(view, "s", &conn);
        unsafe { bridge.lifetime_subscribe(view, on_death, data) };
        bridge.unsubscribe(view, &conn);
        assert!(host.has_data(view, TRACKER_KEY));

        bridge.lifetime_unsubscribe(view, on_death);
        assert!(!host.has_data(view, TRACKER_KEY));
        assert!(bridge.stats().is_empty());
        assert_eq!(fired.get(), 0);
    }

    #[test]
    fn test_unsubscribe_all_keeps_lifetime_subscribers() {
        let (host, bridge, view) = setup();
        let fired = Cell::new(0u32);
        let data = std::ptr::from_ref(&fired).cast_mut().cast();
        let a = unsafe { bridge.create_connection(noop, std::ptr::null_mut(), std::ptr::null_mut()) };
        let b = unsafe { bridge.create_connection(noop, std::ptr::null_mut(), std::ptr::null_mut()) };

        bridge.subscribe(view, "s", &a);
        bridge.subscribe(view, "t", &b);
        unsafe { bridge.lifetime_subscribe(view, on_death, data) };

        bridge.unsubscribe_all(view);
        assert_eq!(host.listener_count(view), 0);
        assert!(!bridge.is_subscribed(view));
        assert!(bridge.has_tracker(view));

        host.destroy(view);
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn test_subscribe_on_unknown_object_is_dropped() {
        let (host, bridge, view) = setup();
        host.destroy(view);
        let conn = unsafe { bridge.create_connection(noop, std::ptr::null_mut(), std::ptr::null_mut()) };
        bridge.subscribe(view, "s", &conn);
        assert!(!bridge.is_subscribed(view));
        assert!(!conn.is_attached());
    }

    #[test]
    fn test_shutdown_reports_and_clears_residue() {
        let (host, bridge, view) = setup();
        let conn = unsafe { bridge.create_connection(noop, std::ptr::null_mut(), std::ptr::null_mut()) };
        bridge.subscribe(view, "s", &conn);

        let residue = bridge.shutdown();
        assert_eq!(residue.connections, 1);
        assert_eq!(residue.trackers, 1);
        assert!(bridge.stats().is_empty());
        assert!(!host.has_data(view, TRACKER_KEY));
        assert_eq!(host.listener_count(view), 0);

        let id = host.connect_signal(view, "s", Rc::new(|_| {}));
        assert!(id.is_some());
    }
}
