//! Lifetime tracking.
//!
//! A [`LifetimeTracker`] rides in an emitter's custom data slot. When the host
//! destroys the emitter it drops the slot, the tracker's `Drop` runs, and the
//! bridge is told which emitter died and who wanted to know.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::rc::{Rc, Weak};

use thiserror::Error;
use wflua_core::ObjectId;

/// `void (*)(void *emitter, void *data)`
pub type LifetimeCallback = unsafe extern "C" fn(emitter: *mut c_void, data: *mut c_void);

/// Custom data key the tracker is stored under.
pub const TRACKER_KEY: &str = "wflua::lifetime-tracker";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifetimeError {
    #[error("Unsubscribed from lifetime of an untracked object!")]
    NoTracker { emitter: ObjectId },

    #[error("Lifetime callback not registered!")]
    NotRegistered { emitter: ObjectId },

    #[error("Lifetime subscription on a dying object!")]
    EmitterDying { emitter: ObjectId },
}

/// One `(callback, data)` pair.
#[derive(Debug, Clone, Copy)]
pub struct LifetimeSubscription {
    pub callback: LifetimeCallback,
    pub data: *mut c_void,
}

impl LifetimeSubscription {
    pub(crate) fn fire(&self, emitter: ObjectId) {
        // SAFETY: the caller of `Bridge::lifetime_subscribe` vouched for the
        // callback and its data until it fires or is unsubscribed.
        unsafe { (self.callback)(emitter.as_ptr(), self.data) }
    }
}

/// Receives destruction notices from trackers.
pub(crate) trait DestructionSink {
    fn emitter_destroyed(&self, emitter: ObjectId, subscribers: Vec<LifetimeSubscription>);
}

/// The boxed value actually parked in the custom data slot.
pub(crate) struct TrackerSlot(pub Rc<LifetimeTracker>);

pub struct LifetimeTracker {
    emitter: ObjectId,
    subscribers: RefCell<Vec<LifetimeSubscription>>,
    armed: Cell<bool>,
    sink: Weak<dyn DestructionSink>,
}

impl LifetimeTracker {
    pub(crate) fn new(emitter: ObjectId, sink: Weak<dyn DestructionSink>) -> Rc<Self> {
        Rc::new(Self {
            emitter,
            subscribers: RefCell::new(Vec::new()),
            armed: Cell::new(true),
            sink,
        })
    }

    pub fn emitter(&self) -> ObjectId {
        self.emitter
    }

    pub(crate) fn add(&self, callback: LifetimeCallback, data: *mut c_void) {
        self.subscribers
            .borrow_mut()
            .push(LifetimeSubscription { callback, data });
    }

    /// Remove the most recently added entry with this callback.
    pub(crate) fn remove(
        &self,
        callback: LifetimeCallback,
    ) -> Result<LifetimeSubscription, LifetimeError> {
        let mut subscribers = self.subscribers.borrow_mut();
        let pos = subscribers
            .iter()
            .rposition(|s| std::ptr::fn_addr_eq(s.callback, callback))
            .ok_or(LifetimeError::NotRegistered {
                emitter: self.emitter,
            })?;
        Ok(subscribers.remove(pos))
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Data words of the current subscribers, in registration order.
    pub fn subscriber_data(&self) -> Vec<*mut c_void> {
        self.subscribers.borrow().iter().map(|s| s.data).collect()
    }

    /// Drop without notifying anyone.
    pub(crate) fn disarm(&self) {
        self.armed.set(false);
    }
}

impl Drop for LifetimeTracker {
    fn drop(&mut self) {
        if !self.armed.get() {
            return;
        }

        let subscribers = self.subscribers.take();
        match self.sink.upgrade() {
            Some(sink) => sink.emitter_destroyed(self.emitter, subscribers),
            None => tracing::debug!(
                "Tracker for {} dropped after its bridge; {} callbacks skipped",
                self.emitter,
                subscribers.len()
            ),
        }
    }
}
