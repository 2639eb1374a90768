//! Signal connections.
//!
//! A [`Connection`] is one handler binding: a C callback plus two opaque
//! user-data words. The foreign runtime owns it through a raw handle obtained
//! from [`Connection::into_handle`]; the registry and any dispatch in flight
//! hold their own `Rc` clones, so the memory outlives a destroy issued from
//! inside the connection's own callback.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::fmt;
use std::rc::Rc;

use wflua_core::{ObjectId, SignalPayload};

/// `void (*)(void *signal_data, void *data1, void *data2)`
pub type SignalCallback =
    unsafe extern "C" fn(signal_data: *mut c_void, data1: *mut c_void, data2: *mut c_void);

/// Lifecycle of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Created, never subscribed.
    Detached,
    /// In the registry; fires on its signal.
    Attached,
    /// Unsubscribed, or its emitter died. Valid, may be subscribed again.
    Inert,
    /// Destroyed through the owning handle.
    Destroyed,
}

/// Where an attached connection lives in the registry.
#[derive(Debug, Clone)]
pub(crate) struct Binding {
    pub emitter: ObjectId,
    pub signal: Rc<str>,
    /// Drawn fresh on every attach; dispatch snapshots compare against it.
    pub generation: u64,
}

pub struct Connection {
    callback: SignalCallback,
    data1: *mut c_void,
    data2: *mut c_void,
    state: Cell<ConnectionState>,
    binding: RefCell<Option<Binding>>,
}

impl Connection {
    /// Create a detached connection.
    ///
    /// # Safety
    ///
    /// `callback` must be sound to call with any payload of the signals this
    /// connection gets subscribed to, together with `data1` and `data2`, for
    /// as long as the connection is attached.
    pub unsafe fn new(callback: SignalCallback, data1: *mut c_void, data2: *mut c_void) -> Rc<Self> {
        Rc::new(Self {
            callback,
            data1,
            data2,
            state: Cell::new(ConnectionState::Detached),
            binding: RefCell::new(None),
        })
    }

    pub fn state(&self) -> ConnectionState {
        self.state.get()
    }

    pub fn is_attached(&self) -> bool {
        self.state.get() == ConnectionState::Attached
    }

    /// The emitter this connection is attached to.
    pub fn emitter(&self) -> Option<ObjectId> {
        self.binding.borrow().as_ref().map(|b| b.emitter)
    }

    /// The signal this connection is attached to.
    pub fn signal(&self) -> Option<Rc<str>> {
        self.binding.borrow().as_ref().map(|b| Rc::clone(&b.signal))
    }

    pub fn data1(&self) -> *mut c_void {
        self.data1
    }

    pub fn data2(&self) -> *mut c_void {
        self.data2
    }

    pub(crate) fn binding(&self) -> Option<Binding> {
        self.binding.borrow().clone()
    }

    pub(crate) fn attach(&self, emitter: ObjectId, signal: Rc<str>, generation: u64) {
        *self.binding.borrow_mut() = Some(Binding {
            emitter,
            signal,
            generation,
        });
        self.state.set(ConnectionState::Attached);
    }

    pub(crate) fn detach(&self) {
        self.binding.borrow_mut().take();
        if self.state.get() != ConnectionState::Destroyed {
            self.state.set(ConnectionState::Inert);
        }
    }

    pub(crate) fn mark_destroyed(&self) {
        self.binding.borrow_mut().take();
        self.state.set(ConnectionState::Destroyed);
    }

    /// Whether a dispatch snapshot entry taken at `generation` may still fire.
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        self.is_attached()
            && self
                .binding
                .borrow()
                .as_ref()
                .is_some_and(|b| b.generation == generation)
    }

    pub(crate) fn invoke(&self, payload: SignalPayload) {
        // SAFETY: the contract of `Connection::new` covers attached connections,
        // and only live snapshot entries are invoked.
        unsafe { (self.callback)(payload, self.data1, self.data2) }
    }

    /// Hand ownership of one strong reference to the foreign side.
    pub fn into_handle(this: Rc<Self>) -> *mut Connection {
        Rc::into_raw(this).cast_mut()
    }

    /// Reclaim the reference given away by [`Connection::into_handle`].
    ///
    /// # Safety
    ///
    /// `handle` must come from `into_handle` and not have been reclaimed yet.
    pub unsafe fn from_handle(handle: *mut Connection) -> Rc<Self> {
        // SAFETY: upheld by the caller.
        unsafe { Rc::from_raw(handle.cast_const()) }
    }

    /// A new strong reference through a handle the foreign side keeps owning.
    ///
    /// # Safety
    ///
    /// `handle` must come from `into_handle` and not have been reclaimed yet.
    pub unsafe fn clone_from_handle(handle: *mut Connection) -> Rc<Self> {
        let ptr = handle.cast_const();
        // SAFETY: upheld by the caller; the handle's own reference stays in place.
        unsafe {
            Rc::increment_strong_count(ptr);
            Rc::from_raw(ptr)
        }
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("addr", &std::ptr::from_ref(self))
            .field("state", &self.state.get())
            .field("binding", &self.binding.borrow())
            .finish()
    }
}
