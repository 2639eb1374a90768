//! Capability traits a compositor host implements.
//!
//! The bridge only ever needs two things from an emitter: a custom data slot
//! to park its lifetime tracker in, and the ability to connect a listener to
//! a named signal. Those are [`ObjectData`] and [`SignalSource`]. Everything
//! scripts can query or change about views, outputs and the core is split into
//! the accessor traits gathered under [`Compositor`].
//!
//! All methods take `&self` and are called on the compositor thread only.
//! Implementations must not hold internal borrows while calling back into a
//! listener or while dropping data released from a slot.

use std::any::Any;
use std::ffi::c_void;
use std::rc::Rc;

use crate::error::OptionError;
use crate::geometry::{Dimensions, Geometry, InputEventProcessingMode, PlainActivatorData, Pointf};
use crate::object::ObjectId;

/// Opaque signal payload, borrowed for the duration of one emission.
pub type SignalPayload = *mut c_void;

/// A host-level signal listener.
pub type SignalListener = Rc<dyn Fn(SignalPayload)>;

/// Handle of a listener connected through [`SignalSource::connect_signal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub u64);

/// Per-object custom data slots.
///
/// Data stored here is owned by the object and dropped when the object is
/// destroyed. That drop is the hook the lifetime tracker relies on.
pub trait ObjectData {
    /// Store `data` under `key`, replacing (and dropping) any previous value.
    fn store_data(&self, object: ObjectId, key: &'static str, data: Box<dyn Any>);

    /// Take the value stored under `key` out of the slot without dropping it.
    fn release_data(&self, object: ObjectId, key: &'static str) -> Option<Box<dyn Any>>;

    fn has_data(&self, object: ObjectId, key: &'static str) -> bool;
}

/// Named signals.
pub trait SignalSource {
    /// Connect `listener` to `signal` on `object`.
    ///
    /// Returns `None` if the object cannot be connected to.
    fn connect_signal(
        &self,
        object: ObjectId,
        signal: &str,
        listener: SignalListener,
    ) -> Option<ListenerId>;

    /// Disconnect a listener. Unknown ids are ignored.
    fn disconnect_signal(&self, object: ObjectId, listener: ListenerId);
}

/// Everything the bridge needs from emitters.
pub trait Emitters: ObjectData + SignalSource {}

impl<T: ObjectData + SignalSource + ?Sized> Emitters for T {}

/// Typed access to signal payloads.
pub trait SignalPayloads {
    fn signaled_view(&self, payload: SignalPayload) -> Option<ObjectId>;
    fn signaled_output(&self, payload: SignalPayload) -> Option<ObjectId>;

    /// The raw `wlr_event_keyboard_key` carried by a keyboard signal.
    fn signaled_keyboard_key_event(&self, payload: SignalPayload) -> *mut c_void;
    fn set_signaled_keyboard_key_mode(&self, payload: SignalPayload, mode: InputEventProcessingMode);
}

pub trait ViewApi {
    fn view_to_string(&self, view: ObjectId) -> String;
    fn view_title(&self, view: ObjectId) -> String;
    fn view_app_id(&self, view: ObjectId) -> String;
    fn view_wm_geometry(&self, view: ObjectId) -> Geometry;
    fn view_output_geometry(&self, view: ObjectId) -> Geometry;
    fn view_bounding_box(&self, view: ObjectId) -> Geometry;
    fn view_output(&self, view: ObjectId) -> Option<ObjectId>;
    fn view_set_geometry(&self, view: ObjectId, geometry: Geometry);
}

pub trait OutputApi {
    fn output_to_string(&self, output: ObjectId) -> String;
    fn output_screen_size(&self, output: ObjectId) -> Dimensions;
    fn output_relative_geometry(&self, output: ObjectId) -> Geometry;
    fn output_layout_geometry(&self, output: ObjectId) -> Geometry;
    fn output_ensure_pointer(&self, output: ObjectId, center: bool);
    fn output_cursor_position(&self, output: ObjectId) -> Pointf;
    fn output_call_plugin_plain(
        &self,
        output: ObjectId,
        activator: &str,
        data: &PlainActivatorData,
    ) -> bool;
    fn output_top_view(&self, output: ObjectId) -> Option<ObjectId>;
    fn output_active_view(&self, output: ObjectId) -> Option<ObjectId>;
    fn output_focus_view(&self, output: ObjectId, view: Option<ObjectId>, raise: bool);
    fn output_ensure_visible(&self, output: ObjectId, view: ObjectId) -> bool;
    fn output_workarea(&self, output: ObjectId) -> Geometry;
}

pub trait CoreApi {
    /// The compositor core singleton.
    fn core(&self) -> ObjectId;
    fn core_to_string(&self, core: ObjectId) -> String;
    /// The raw `wlr_seat`.
    fn current_seat(&self, core: ObjectId) -> *mut c_void;
    fn set_cursor(&self, core: ObjectId, name: &str);
    fn unhide_cursor(&self, core: ObjectId);
    fn hide_cursor(&self, core: ObjectId);
    fn warp_cursor(&self, core: ObjectId, position: Pointf);
    fn core_cursor_position(&self, core: ObjectId) -> Pointf;
    fn cursor_focus_view(&self, core: ObjectId) -> Option<ObjectId>;
    fn touch_focus_view(&self, core: ObjectId) -> Option<ObjectId>;
    fn view_at(&self, core: ObjectId, point: Pointf) -> Option<ObjectId>;
    fn set_active_view(&self, core: ObjectId, view: Option<ObjectId>);
    fn core_focus_view(&self, core: ObjectId, view: Option<ObjectId>);
    fn focus_output(&self, core: ObjectId, output: Option<ObjectId>);
    fn active_output(&self, core: ObjectId) -> Option<ObjectId>;
    fn move_view_to_output(
        &self,
        core: ObjectId,
        view: ObjectId,
        output: ObjectId,
        reconfigure: bool,
    );
    fn wayland_display(&self, core: ObjectId) -> String;
    fn xwayland_display(&self, core: ObjectId) -> String;
    /// Spawn `command`; returns the child pid.
    fn run(&self, core: ObjectId, command: &str) -> i32;
    fn shutdown(&self, core: ObjectId);
    fn output_layout(&self, core: ObjectId) -> ObjectId;
    /// The raw `wl_event_loop`.
    fn event_loop(&self, core: ObjectId) -> *mut c_void;
}

pub trait LayoutApi {
    fn output_at(&self, layout: ObjectId, x: i32, y: i32) -> Option<ObjectId>;
    /// The output closest to `origin`, and the closest point on it.
    fn output_coords_at(&self, layout: ObjectId, origin: Pointf) -> (Option<ObjectId>, Pointf);
    fn num_outputs(&self, layout: ObjectId) -> u32;
    /// The output after `prev` in layout order, wrapping around. `None` yields the first.
    fn next_output(&self, layout: ObjectId, prev: Option<ObjectId>) -> Option<ObjectId>;
    fn find_output(&self, layout: ObjectId, name: &str) -> Option<ObjectId>;
}

/// Options, set from their string form.
pub trait ConfigStore {
    fn set_option_str(&self, section: &str, option: &str, value: &str) -> Result<(), OptionError>;
}

/// The scriptable compositor surface.
pub trait Compositor: SignalPayloads + ViewApi + OutputApi + CoreApi + LayoutApi + ConfigStore {}

impl<T> Compositor for T where
    T: SignalPayloads + ViewApi + OutputApi + CoreApi + LayoutApi + ConfigStore + ?Sized
{
}

/// A complete host.
pub trait Host: Emitters + Compositor {}

impl<T: Emitters + Compositor + ?Sized> Host for T {}
