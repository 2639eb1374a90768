//! The subscription index.
//!
//! `emitter -> signal -> [connection]`, insertion ordered at every level.
//! The registry is pure bookkeeping: it never talks to the host. Operations
//! report what changed so the bridge can connect or disconnect host listeners
//! and install or uninstall lifetime trackers.

use std::rc::Rc;

use indexmap::IndexMap;
use thiserror::Error;
use wflua_core::{ListenerId, ObjectId};

use crate::connection::Connection;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    #[error("Subscribed to signal more than once!")]
    DuplicateSubscription { emitter: ObjectId, signal: String },

    #[error("Connection is already subscribed to another signal!")]
    AlreadyBound { emitter: ObjectId, signal: String },

    #[error("Unsubscribed from non-subscribed object!")]
    ObjectNotSubscribed { emitter: ObjectId },

    #[error("Unsubscribed from non-subscribed signal!")]
    SignalNotSubscribed { emitter: ObjectId },

    #[error("Signal subscription change on a dying object!")]
    EmitterDying { emitter: ObjectId },

    #[error("Connection was destroyed!")]
    Destroyed,
}

#[derive(Debug, Default)]
struct SignalEntry {
    connections: Vec<Rc<Connection>>,
    listener: Option<ListenerId>,
}

#[derive(Debug, Default)]
struct EmitterEntry {
    signals: IndexMap<Rc<str>, SignalEntry>,
}

/// What a successful [`Registry::insert`] changed.
#[derive(Debug, Clone)]
pub struct Insertion {
    /// The emitter had no entry before.
    pub first_for_emitter: bool,
    /// The `(emitter, signal)` collection was created by this insert.
    pub first_for_signal: bool,
    /// Interned signal name.
    pub signal: Rc<str>,
    pub generation: u64,
}

/// What a successful [`Registry::remove`] changed.
#[derive(Debug, Clone)]
pub struct Removal {
    pub signal: Rc<str>,
    /// Set when the `(emitter, signal)` collection became empty and had a
    /// host listener that now needs disconnecting.
    pub listener: Option<ListenerId>,
    /// The emitter has no entry left.
    pub emitter_emptied: bool,
}

/// Everything [`Registry::purge`] took out.
#[derive(Debug, Default)]
pub struct Purge {
    pub connections: Vec<Rc<Connection>>,
    pub listeners: Vec<ListenerId>,
}

/// One dispatch snapshot entry.
pub type SnapshotEntry = (Rc<Connection>, u64);

#[derive(Debug, Default)]
pub struct Registry {
    emitters: IndexMap<ObjectId, EmitterEntry>,
    next_generation: u64,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `conn` to `(emitter, signal)` and attach it.
    pub fn insert(
        &mut self,
        emitter: ObjectId,
        signal: &str,
        conn: &Rc<Connection>,
    ) -> Result<Insertion, RegistryError> {
        if conn.state() == crate::ConnectionState::Destroyed {
            return Err(RegistryError::Destroyed);
        }
        if let Some(binding) = conn.binding() {
            return Err(if binding.emitter == emitter && &*binding.signal == signal {
                RegistryError::DuplicateSubscription {
                    emitter,
                    signal: signal.to_string(),
                }
            } else {
                RegistryError::AlreadyBound {
                    emitter: binding.emitter,
                    signal: binding.signal.to_string(),
                }
            });
        }

        let first_for_emitter = !self.emitters.contains_key(&emitter);
        let entry = self.emitters.entry(emitter).or_default();

        let (signal, first_for_signal) = match entry.signals.get_key_value(signal) {
            Some((key, _)) => (Rc::clone(key), false),
            None => (Rc::<str>::from(signal), true),
        };

        self.next_generation += 1;
        let generation = self.next_generation;

        entry
            .signals
            .entry(Rc::clone(&signal))
            .or_default()
            .connections
            .push(Rc::clone(conn));
        conn.attach(emitter, Rc::clone(&signal), generation);

        Ok(Insertion {
            first_for_emitter,
            first_for_signal,
            signal,
            generation,
        })
    }

    /// Record the host listener serving `(emitter, signal)`.
    pub fn set_listener(&mut self, emitter: ObjectId, signal: &str, listener: ListenerId) {
        if let Some(entry) = self
            .emitters
            .get_mut(&emitter)
            .and_then(|e| e.signals.get_mut(signal))
        {
            entry.listener = Some(listener);
        }
    }

    /// Detach `conn` from `emitter`.
    pub fn remove(
        &mut self,
        emitter: ObjectId,
        conn: &Rc<Connection>,
    ) -> Result<Removal, RegistryError> {
        let Some(binding) = conn.binding() else {
            return Err(if self.emitters.contains_key(&emitter) {
                RegistryError::SignalNotSubscribed { emitter }
            } else {
                RegistryError::ObjectNotSubscribed { emitter }
            });
        };
        if binding.emitter != emitter {
            return Err(RegistryError::ObjectNotSubscribed { emitter });
        }

        let entry = self
            .emitters
            .get_mut(&emitter)
            .ok_or(RegistryError::ObjectNotSubscribed { emitter })?;
        let signal_entry = entry
            .signals
            .get_mut(&binding.signal)
            .ok_or(RegistryError::SignalNotSubscribed { emitter })?;
        let pos = signal_entry
            .connections
            .iter()
            .position(|c| Rc::ptr_eq(c, conn))
            .ok_or(RegistryError::SignalNotSubscribed { emitter })?;

        signal_entry.connections.remove(pos);
        conn.detach();

        let listener = if signal_entry.connections.is_empty() {
            entry
                .signals
                .shift_remove(&binding.signal)
                .and_then(|s| s.listener)
        } else {
            None
        };

        let emitter_emptied = entry.signals.is_empty();
        if emitter_emptied {
            self.emitters.shift_remove(&emitter);
        }

        Ok(Removal {
            signal: binding.signal,
            listener,
            emitter_emptied,
        })
    }

    /// Drop every entry of `emitter`, leaving its connections inert.
    ///
    /// Returns `None` if the emitter had no entry.
    pub fn purge(&mut self, emitter: ObjectId) -> Option<Purge> {
        let entry = self.emitters.shift_remove(&emitter)?;
        let mut purge = Purge::default();

        for (_, signal) in entry.signals {
            for conn in &signal.connections {
                conn.detach();
            }
            purge.connections.extend(signal.connections);
            purge.listeners.extend(signal.listener);
        }

        Some(purge)
    }

    /// Purge every emitter.
    pub fn drain(&mut self) -> Vec<(ObjectId, Purge)> {
        let emitters: Vec<ObjectId> = self.emitters.keys().copied().collect();
        emitters
            .into_iter()
            .filter_map(|e| self.purge(e).map(|p| (e, p)))
            .collect()
    }

    /// The connections of `(emitter, signal)` with their current generation.
    pub fn snapshot(&self, emitter: ObjectId, signal: &str) -> Vec<SnapshotEntry> {
        self.emitters
            .get(&emitter)
            .and_then(|e| e.signals.get(signal))
            .map(|s| {
                s.connections
                    .iter()
                    .filter_map(|c| c.binding().map(|b| (Rc::clone(c), b.generation)))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn contains(&self, emitter: ObjectId) -> bool {
        self.emitters.contains_key(&emitter)
    }

    pub fn is_empty(&self) -> bool {
        self.emitters.is_empty()
    }

    pub fn emitter_count(&self) -> usize {
        self.emitters.len()
    }

    /// Every emitter with an entry, in first-subscription order.
    pub fn emitters(&self) -> Vec<ObjectId> {
        self.emitters.keys().copied().collect()
    }

    pub fn connection_count(&self) -> usize {
        self.emitters
            .values()
            .flat_map(|e| e.signals.values())
            .map(|s| s.connections.len())
            .sum()
    }

    /// Signal names with at least one connection on `emitter`.
    pub fn signals(&self, emitter: ObjectId) -> Vec<Rc<str>> {
        self.emitters
            .get(&emitter)
            .map(|e| e.signals.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn connections(&self, emitter: ObjectId, signal: &str) -> Vec<Rc<Connection>> {
        self.emitters
            .get(&emitter)
            .and_then(|e| e.signals.get(signal))
            .map(|s| s.connections.clone())
            .unwrap_or_default()
    }

    pub fn listener(&self, emitter: ObjectId, signal: &str) -> Option<ListenerId> {
        self.emitters
            .get(&emitter)
            .and_then(|e| e.signals.get(signal))
            .and_then(|s| s.listener)
    }
}

#[cfg(test)]
mod tests {
    use std::ffi::c_void;

    use super::*;
    use crate::ConnectionState;

    unsafe extern "C" fn noop(_p: *mut c_void, _d1: *mut c_void, _d2: *mut c_void) {}

    fn conn() -> Rc<Connection> {
        unsafe { Connection::new(noop, std::ptr::null_mut(), std::ptr::null_mut()) }
    }

    const E: ObjectId = ObjectId(0x1000);
    const F: ObjectId = ObjectId(0x1040);

    #[test]
    fn test_insert_reports_firsts() {
        let mut registry = Registry::new();
        let (a, b, c) = (conn(), conn(), conn());

        let first = registry.insert(E, "s", &a).unwrap();
        assert!(first.first_for_emitter && first.first_for_signal);

        let second = registry.insert(E, "s", &b).unwrap();
        assert!(!second.first_for_emitter && !second.first_for_signal);
        assert!(Rc::ptr_eq(&first.signal, &second.signal));

        let third = registry.insert(E, "t", &c).unwrap();
        assert!(!third.first_for_emitter && third.first_for_signal);

        assert!(third.generation > second.generation);
        assert_eq!(registry.connection_count(), 3);
    }

    #[test]
    fn test_duplicate_is_rejected_and_state_unchanged() {
        let mut registry = Registry::new();
        let a = conn();
        registry.insert(E, "mapped", &a).unwrap();

        let err = registry.insert(E, "mapped", &a).unwrap_err();
        assert_eq!(err.to_string(), "Subscribed to signal more than once!");
        assert_eq!(registry.connections(E, "mapped").len(), 1);
    }

    #[test]
    fn test_second_binding_is_rejected() {
        let mut registry = Registry::new();
        let a = conn();
        registry.insert(E, "s", &a).unwrap();

        let err = registry.insert(F, "s", &a).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyBound { emitter, .. } if emitter == E));
        let err = registry.insert(E, "t", &a).unwrap_err();
        assert!(matches!(err, RegistryError::AlreadyBound { .. }));
        assert!(!registry.contains(F));
        assert!(registry.signals(E).iter().all(|s| &**s == "s"));
    }

    #[test]
    fn test_remove_round_trip() {
        let mut registry = Registry::new();
        let a = conn();
        registry.insert(E, "s", &a).unwrap();
        registry.set_listener(E, "s", ListenerId(9));

        let removal = registry.remove(E, &a).unwrap();
        assert_eq!(removal.listener, Some(ListenerId(9)));
        assert!(removal.emitter_emptied);
        assert!(registry.is_empty());
        assert_eq!(a.state(), ConnectionState::Inert);
    }

    #[test]
    fn test_remove_keeps_listener_while_shared() {
        let mut registry = Registry::new();
        let (a, b) = (conn(), conn());
        registry.insert(E, "s", &a).unwrap();
        registry.insert(E, "s", &b).unwrap();
        registry.set_listener(E, "s", ListenerId(1));

        let removal = registry.remove(E, &a).unwrap();
        assert_eq!(removal.listener, None);
        assert!(!removal.emitter_emptied);
        assert_eq!(registry.listener(E, "s"), Some(ListenerId(1)));
    }

    #[test]
    fn test_remove_errors() {
        let mut registry = Registry::new();
        let (a, b) = (conn(), conn());

        let err = registry.remove(E, &a).unwrap_err();
        assert_eq!(err.to_string(), "Unsubscribed from non-subscribed object!");

        registry.insert(E, "s", &b).unwrap();
        let err = registry.remove(E, &a).unwrap_err();
        assert_eq!(err.to_string(), "Unsubscribed from non-subscribed signal!");

        let err = registry.remove(F, &b).unwrap_err();
        assert!(matches!(err, RegistryError::ObjectNotSubscribed { .. }));
        assert!(b.is_attached());
    }

    #[test]
    fn test_purge_leaves_connections_inert() {
        let mut registry = Registry::new();
        let (a, b) = (conn(), conn());
        registry.insert(E, "s", &a).unwrap();
        registry.insert(E, "t", &b).unwrap();
        registry.set_listener(E, "s", ListenerId(1));
        registry.set_listener(E, "t", ListenerId(2));

        let purge = registry.purge(E).unwrap();
        assert_eq!(purge.connections.len(), 2);
        assert_eq!(purge.listeners, vec![ListenerId(1), ListenerId(2)]);
        assert!(!registry.contains(E));
        assert_eq!(a.state(), ConnectionState::Inert);
        assert_eq!(b.state(), ConnectionState::Inert);
        assert!(registry.purge(E).is_none());
    }

    #[test]
    fn test_snapshot_preserves_order() {
        let mut registry = Registry::new();
        let conns: Vec<_> = (0..4).map(|_| conn()).collect();
        for c in &conns {
            registry.insert(E, "s", c).unwrap();
        }
        let snapshot = registry.snapshot(E, "s");
        for (c, (snap, generation)) in conns.iter().zip(&snapshot) {
            assert!(Rc::ptr_eq(c, snap));
            assert!(c.is_live(*generation));
        }
    }

    #[test]
    fn test_destroyed_connection_cannot_subscribe() {
        let mut registry = Registry::new();
        let a = conn();
        a.mark_destroyed();
        assert_eq!(registry.insert(E, "s", &a).unwrap_err(), RegistryError::Destroyed);
    }
}
