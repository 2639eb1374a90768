//! The host shim's function table.
//!
//! The C++ side of the plugin fills a [`HostVTable`] with entry points into
//! Wayfire and hands it over in `plugin_init`. [`ForeignHost`] adapts the table
//! to the host traits the bridge and the Lua runtime are written against.
//!
//! Ownership rules of the table:
//!
//! - `store_data` takes ownership of `data` and calls `release(data)` when the
//!   object drops the slot (or the object is destroyed). `release_data` hands
//!   ownership back without calling `release`.
//! - `connect_signal` returns a non-zero listener id and takes ownership of
//!   `user`, calling `release(user)` once the connection is gone, whether it
//!   was disconnected or died with its object.
//! - Returned strings are borrowed and copied before the next call.
//!
//! Entries may be null; calls through a missing entry return a neutral value.

use std::any::Any;
use std::ffi::{CStr, CString, c_char, c_void};
use std::rc::Rc;

use tracing::warn;
use wflua_core::{
    ConfigStore, CoreApi, Dimensions, ErrorCode, Geometry, InputEventProcessingMode, LayoutApi,
    ListenerId, ObjectData, ObjectId, OptionError, OutputApi, PlainActivatorData, Pointf,
    SignalListener, SignalPayload, SignalPayloads, SignalSource, ViewApi, opt_ptr,
};

/// `void (*)(void *data)`
pub type ReleaseFn = unsafe extern "C" fn(data: *mut c_void);

/// `void (*)(void *signal_data, void *user)`
pub type HostSignalFn = unsafe extern "C" fn(signal_data: *mut c_void, user: *mut c_void);

type ObjFn = unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void);
type ObjBoolFn = unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void, flag: bool);
type ObjStrFn = unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void) -> *const c_char;
type ObjObjFn = unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void) -> *mut c_void;
type ObjGeoFn = unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void) -> Geometry;
type ObjPointFn = unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void) -> Pointf;
type ObjArgFn = unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void, arg: *mut c_void);
type ObjArgRetFn =
    unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void, arg: *mut c_void) -> *mut c_void;
type CtxObjFn = unsafe extern "C" fn(ctx: *mut c_void) -> *mut c_void;

/// Function table provided by the host shim.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct HostVTable {
    /// Passed back as the first argument of every entry.
    pub ctx: *mut c_void,

    pub store_data: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            object: *mut c_void,
            key: *const c_char,
            data: *mut c_void,
            release: ReleaseFn,
        ),
    >,
    pub release_data: Option<
        unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void, key: *const c_char) -> *mut c_void,
    >,
    pub has_data: Option<
        unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void, key: *const c_char) -> bool,
    >,
    pub connect_signal: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            object: *mut c_void,
            signal: *const c_char,
            callback: HostSignalFn,
            user: *mut c_void,
            release: ReleaseFn,
        ) -> u64,
    >,
    pub disconnect_signal:
        Option<unsafe extern "C" fn(ctx: *mut c_void, object: *mut c_void, listener: u64)>,

    pub signaled_view: Option<ObjObjFn>,
    pub signaled_output: Option<ObjObjFn>,
    pub signaled_keyboard_key_event: Option<ObjObjFn>,
    pub set_signaled_keyboard_key_mode: Option<
        unsafe extern "C" fn(ctx: *mut c_void, signal_data: *mut c_void, mode: InputEventProcessingMode),
    >,

    /// Returns an [`ErrorCode`] discriminant.
    pub set_option_str: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            section: *const c_char,
            option: *const c_char,
            value: *const c_char,
        ) -> i32,
    >,

    pub view_to_string: Option<ObjStrFn>,
    pub view_title: Option<ObjStrFn>,
    pub view_app_id: Option<ObjStrFn>,
    pub view_wm_geometry: Option<ObjGeoFn>,
    pub view_output_geometry: Option<ObjGeoFn>,
    pub view_bounding_box: Option<ObjGeoFn>,
    pub view_output: Option<ObjObjFn>,
    pub view_set_geometry:
        Option<unsafe extern "C" fn(ctx: *mut c_void, view: *mut c_void, geometry: Geometry)>,

    pub output_to_string: Option<ObjStrFn>,
    pub output_screen_size:
        Option<unsafe extern "C" fn(ctx: *mut c_void, output: *mut c_void) -> Dimensions>,
    pub output_relative_geometry: Option<ObjGeoFn>,
    pub output_layout_geometry: Option<ObjGeoFn>,
    pub output_ensure_pointer: Option<ObjBoolFn>,
    pub output_cursor_position: Option<ObjPointFn>,
    pub output_call_plugin_plain: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            output: *mut c_void,
            activator: *const c_char,
            data: *const PlainActivatorData,
        ) -> bool,
    >,
    pub output_top_view: Option<ObjObjFn>,
    pub output_active_view: Option<ObjObjFn>,
    pub output_focus_view: Option<
        unsafe extern "C" fn(ctx: *mut c_void, output: *mut c_void, view: *mut c_void, raise: bool),
    >,
    pub output_ensure_visible:
        Option<unsafe extern "C" fn(ctx: *mut c_void, output: *mut c_void, view: *mut c_void) -> bool>,
    pub output_workarea: Option<ObjGeoFn>,

    pub core: Option<CtxObjFn>,
    pub core_to_string: Option<ObjStrFn>,
    pub core_current_seat: Option<ObjObjFn>,
    pub core_set_cursor:
        Option<unsafe extern "C" fn(ctx: *mut c_void, core: *mut c_void, name: *const c_char)>,
    pub core_unhide_cursor: Option<ObjFn>,
    pub core_hide_cursor: Option<ObjFn>,
    pub core_warp_cursor:
        Option<unsafe extern "C" fn(ctx: *mut c_void, core: *mut c_void, position: Pointf)>,
    pub core_cursor_position: Option<ObjPointFn>,
    pub core_cursor_focus_view: Option<ObjObjFn>,
    pub core_touch_focus_view: Option<ObjObjFn>,
    pub core_view_at: Option<
        unsafe extern "C" fn(ctx: *mut c_void, core: *mut c_void, point: Pointf) -> *mut c_void,
    >,
    pub core_set_active_view: Option<ObjArgFn>,
    pub core_focus_view: Option<ObjArgFn>,
    pub core_focus_output: Option<ObjArgFn>,
    pub core_active_output: Option<ObjObjFn>,
    pub core_move_view_to_output: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            core: *mut c_void,
            view: *mut c_void,
            output: *mut c_void,
            reconfigure: bool,
        ),
    >,
    pub core_wayland_display: Option<ObjStrFn>,
    pub core_xwayland_display: Option<ObjStrFn>,
    pub core_run:
        Option<unsafe extern "C" fn(ctx: *mut c_void, core: *mut c_void, command: *const c_char) -> i32>,
    pub core_shutdown: Option<ObjFn>,
    pub core_output_layout: Option<ObjObjFn>,
    pub core_event_loop: Option<ObjObjFn>,

    pub layout_output_at: Option<
        unsafe extern "C" fn(ctx: *mut c_void, layout: *mut c_void, x: i32, y: i32) -> *mut c_void,
    >,
    pub layout_output_coords_at: Option<
        unsafe extern "C" fn(
            ctx: *mut c_void,
            layout: *mut c_void,
            origin: Pointf,
            closest: *mut Pointf,
        ) -> *mut c_void,
    >,
    pub layout_num_outputs:
        Option<unsafe extern "C" fn(ctx: *mut c_void, layout: *mut c_void) -> u32>,
    pub layout_next_output: Option<ObjArgRetFn>,
    pub layout_find_output: Option<
        unsafe extern "C" fn(ctx: *mut c_void, layout: *mut c_void, name: *const c_char) -> *mut c_void,
    >,
}

macro_rules! vcall {
    ($self:ident . $entry:ident ( $($arg:expr),* $(,)? )) => {
        match $self.vtable.$entry {
            // SAFETY: the shim vouches for every entry it fills in, called
            // with its own ctx and live objects.
            Some(entry) => Some(unsafe { entry($self.vtable.ctx, $($arg),*) }),
            None => {
                missing(stringify!($entry));
                None
            }
        }
    };
}

fn missing(entry: &str) {
    warn!(target: "wflua::host", "Host vtable has no `{entry}` entry");
}

/// Copy a borrowed C string. Null yields an empty string.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
unsafe fn copy_str(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return String::new();
    }
    // SAFETY: forwarded to the caller.
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// `s` up to its first NUL.
pub(crate) fn c_string(s: &str) -> CString {
    let head = s.split('\0').next().unwrap_or_default();
    CString::new(head).unwrap_or_default()
}

unsafe extern "C" fn release_any(data: *mut c_void) {
    // SAFETY: produced by `Box::into_raw` in `store_data`.
    drop(unsafe { Box::from_raw(data.cast::<Box<dyn Any>>()) });
}

unsafe extern "C" fn release_listener(user: *mut c_void) {
    // SAFETY: produced by `Box::into_raw` in `connect_signal`.
    drop(unsafe { Box::from_raw(user.cast::<SignalListener>()) });
}

unsafe extern "C" fn listener_trampoline(signal_data: *mut c_void, user: *mut c_void) {
    // Cloned first: the listener may be disconnected and released by the call.
    // SAFETY: `user` is a listener box the shim has not released yet.
    let listener = Rc::clone(unsafe { &*user.cast::<SignalListener>() });
    (*listener)(signal_data);
}

fn error_from_code(code: i32, section: &str, option: &str, value: &str) -> Result<(), OptionError> {
    match code {
        c if c == ErrorCode::Ok as i32 => Ok(()),
        c if c == ErrorCode::InvalidOptionSection as i32 => Err(OptionError::InvalidSection {
            section: section.to_string(),
        }),
        c if c == ErrorCode::InvalidOption as i32 => Err(OptionError::InvalidOption {
            section: section.to_string(),
            option: option.to_string(),
        }),
        _ => Err(OptionError::InvalidValue {
            section: section.to_string(),
            option: option.to_string(),
            value: value.to_string(),
        }),
    }
}

/// A host reached through a [`HostVTable`].
pub struct ForeignHost {
    vtable: HostVTable,
}

impl ForeignHost {
    pub fn new(vtable: HostVTable) -> Self {
        Self { vtable }
    }

    fn string(&self, value: Option<*const c_char>) -> String {
        // SAFETY: vtable strings are NUL-terminated and valid until the next call.
        value.map(|p| unsafe { copy_str(p) }).unwrap_or_default()
    }
}

impl ObjectData for ForeignHost {
    fn store_data(&self, object: ObjectId, key: &'static str, data: Box<dyn Any>) {
        let key = c_string(key);
        let Some(store) = self.vtable.store_data else {
            missing("store_data");
            return;
        };
        let data = Box::into_raw(Box::new(data)).cast::<c_void>();
        // SAFETY: the shim takes ownership of `data` and releases it through `release_any`.
        unsafe { store(self.vtable.ctx, object.as_ptr(), key.as_ptr(), data, release_any) }
    }

    fn release_data(&self, object: ObjectId, key: &'static str) -> Option<Box<dyn Any>> {
        let key = c_string(key);
        let data = vcall!(self.release_data(object.as_ptr(), key.as_ptr()))?;
        if data.is_null() {
            return None;
        }
        // SAFETY: the shim hands back a pointer produced in `store_data`.
        Some(*unsafe { Box::from_raw(data.cast::<Box<dyn Any>>()) })
    }

    fn has_data(&self, object: ObjectId, key: &'static str) -> bool {
        let key = c_string(key);
        vcall!(self.has_data(object.as_ptr(), key.as_ptr())).unwrap_or(false)
    }
}

impl SignalSource for ForeignHost {
    fn connect_signal(
        &self,
        object: ObjectId,
        signal: &str,
        listener: SignalListener,
    ) -> Option<ListenerId> {
        let Some(connect) = self.vtable.connect_signal else {
            missing("connect_signal");
            return None;
        };
        let signal = c_string(signal);
        let user = Box::into_raw(Box::new(listener)).cast::<c_void>();
        // SAFETY: the shim owns `user` from here on and frees it through `release_listener`.
        let id = unsafe {
            connect(
                self.vtable.ctx,
                object.as_ptr(),
                signal.as_ptr(),
                listener_trampoline,
                user,
                release_listener,
            )
        };
        (id != 0).then_some(ListenerId(id))
    }

    fn disconnect_signal(&self, object: ObjectId, listener: ListenerId) {
        vcall!(self.disconnect_signal(object.as_ptr(), listener.0));
    }
}

impl SignalPayloads for ForeignHost {
    fn signaled_view(&self, payload: SignalPayload) -> Option<ObjectId> {
        vcall!(self.signaled_view(payload)).and_then(|p| ObjectId::from_ptr(p))
    }

    fn signaled_output(&self, payload: SignalPayload) -> Option<ObjectId> {
        vcall!(self.signaled_output(payload)).and_then(|p| ObjectId::from_ptr(p))
    }

    fn signaled_keyboard_key_event(&self, payload: SignalPayload) -> *mut c_void {
        vcall!(self.signaled_keyboard_key_event(payload)).unwrap_or(std::ptr::null_mut())
    }

    fn set_signaled_keyboard_key_mode(&self, payload: SignalPayload, mode: InputEventProcessingMode) {
        vcall!(self.set_signaled_keyboard_key_mode(payload, mode));
    }
}

impl ConfigStore for ForeignHost {
    fn set_option_str(&self, section: &str, option: &str, value: &str) -> Result<(), OptionError> {
        let (s, o, v) = (c_string(section), c_string(option), c_string(value));
        let code = vcall!(self.set_option_str(s.as_ptr(), o.as_ptr(), v.as_ptr()))
            .unwrap_or(ErrorCode::InvalidOptionSection as i32);
        error_from_code(code, section, option, value)
    }
}

impl ViewApi for ForeignHost {
    fn view_to_string(&self, view: ObjectId) -> String {
        self.string(vcall!(self.view_to_string(view.as_ptr())))
    }

    fn view_title(&self, view: ObjectId) -> String {
        self.string(vcall!(self.view_title(view.as_ptr())))
    }

    fn view_app_id(&self, view: ObjectId) -> String {
        self.string(vcall!(self.view_app_id(view.as_ptr())))
    }

    fn view_wm_geometry(&self, view: ObjectId) -> Geometry {
        vcall!(self.view_wm_geometry(view.as_ptr())).unwrap_or_default()
    }

    fn view_output_geometry(&self, view: ObjectId) -> Geometry {
        vcall!(self.view_output_geometry(view.as_ptr())).unwrap_or_default()
    }

    fn view_bounding_box(&self, view: ObjectId) -> Geometry {
        vcall!(self.view_bounding_box(view.as_ptr())).unwrap_or_default()
    }

    fn view_output(&self, view: ObjectId) -> Option<ObjectId> {
        vcall!(self.view_output(view.as_ptr())).and_then(|p| ObjectId::from_ptr(p))
    }

    fn view_set_geometry(&self, view: ObjectId, geometry: Geometry) {
        vcall!(self.view_set_geometry(view.as_ptr(), geometry));
    }
}

impl OutputApi for ForeignHost {
    fn output_to_string(&self, output: ObjectId) -> String {
        self.string(vcall!(self.output_to_string(output.as_ptr())))
    }

    fn output_screen_size(&self, output: ObjectId) -> Dimensions {
        vcall!(self.output_screen_size(output.as_ptr())).unwrap_or_default()
    }

    fn output_relative_geometry(&self, output: ObjectId) -> Geometry {
        vcall!(self.output_relative_geometry(output.as_ptr())).unwrap_or_default()
    }

    fn output_layout_geometry(&self, output: ObjectId) -> Geometry {
        vcall!(self.output_layout_geometry(output.as_ptr())).unwrap_or_default()
    }

    fn output_ensure_pointer(&self, output: ObjectId, center: bool) {
        vcall!(self.output_ensure_pointer(output.as_ptr(), center));
    }

    fn output_cursor_position(&self, output: ObjectId) -> Pointf {
        vcall!(self.output_cursor_position(output.as_ptr())).unwrap_or_default()
    }

    fn output_call_plugin_plain(
        &self,
        output: ObjectId,
        activator: &str,
        data: &PlainActivatorData,
    ) -> bool {
        let activator = c_string(activator);
        vcall!(self.output_call_plugin_plain(output.as_ptr(), activator.as_ptr(), data)).unwrap_or(false)
    }

    fn output_top_view(&self, output: ObjectId) -> Option<ObjectId> {
        vcall!(self.output_top_view(output.as_ptr())).and_then(|p| ObjectId::from_ptr(p))
    }

    fn output_active_view(&self, output: ObjectId) -> Option<ObjectId> {
        vcall!(self.output_active_view(output.as_ptr())).and_then(|p| ObjectId::from_ptr(p))
    }

    fn output_focus_view(&self, output: ObjectId, view: Option<ObjectId>, raise: bool) {
        vcall!(self.output_focus_view(output.as_ptr(), opt_ptr(view), raise));
    }

    fn output_ensure_visible(&self, output: ObjectId, view: ObjectId) -> bool {
        vcall!(self.output_ensure_visible(output.as_ptr(), view.as_ptr())).unwrap_or(false)
    }

    fn output_workarea(&self, output: ObjectId) -> Geometry {
        vcall!(self.output_workarea(output.as_ptr())).unwrap_or_default()
    }
}

impl CoreApi for ForeignHost {
    fn core(&self) -> ObjectId {
        vcall!(self.core())
            .and_then(|p| ObjectId::from_ptr(p))
            .unwrap_or(ObjectId(0))
    }

    fn core_to_string(&self, core: ObjectId) -> String {
        self.string(vcall!(self.core_to_string(core.as_ptr())))
    }

    fn current_seat(&self, core: ObjectId) -> *mut c_void {
        vcall!(self.core_current_seat(core.as_ptr())).unwrap_or(std::ptr::null_mut())
    }

    fn set_cursor(&self, core: ObjectId, name: &str) {
        let name = c_string(name);
        vcall!(self.core_set_cursor(core.as_ptr(), name.as_ptr()));
    }

    fn unhide_cursor(&self, core: ObjectId) {
        vcall!(self.core_unhide_cursor(core.as_ptr()));
    }

    fn hide_cursor(&self, core: ObjectId) {
        vcall!(self.core_hide_cursor(core.as_ptr()));
    }

    fn warp_cursor(&self, core: ObjectId, position: Pointf) {
        vcall!(self.core_warp_cursor(core.as_ptr(), position));
    }

    fn core_cursor_position(&self, core: ObjectId) -> Pointf {
        vcall!(self.core_cursor_position(core.as_ptr())).unwrap_or_default()
    }

    fn cursor_focus_view(&self, core: ObjectId) -> Option<ObjectId> {
        vcall!(self.core_cursor_focus_view(core.as_ptr())).and_then(|p| ObjectId::from_ptr(p))
    }

    fn touch_focus_view(&self, core: ObjectId) -> Option<ObjectId> {
        vcall!(self.core_touch_focus_view(core.as_ptr())).and_then(|p| ObjectId::from_ptr(p))
    }

    fn view_at(&self, core: ObjectId, point: Pointf) -> Option<ObjectId> {
        vcall!(self.core_view_at(core.as_ptr(), point)).and_then(|p| ObjectId::from_ptr(p))
    }

    fn set_active_view(&self, core: ObjectId, view: Option<ObjectId>) {
        vcall!(self.core_set_active_view(core.as_ptr(), opt_ptr(view)));
    }

    fn core_focus_view(&self, core: ObjectId, view: Option<ObjectId>) {
        vcall!(self.core_focus_view(core.as_ptr(), opt_ptr(view)));
    }

    fn focus_output(&self, core: ObjectId, output: Option<ObjectId>) {
        vcall!(self.core_focus_output(core.as_ptr(), opt_ptr(output)));
    }

    fn active_output(&self, core: ObjectId) -> Option<ObjectId> {
        vcall!(self.core_active_output(core.as_ptr())).and_then(|p| ObjectId::from_ptr(p))
    }

    fn move_view_to_output(
        &self,
        core: ObjectId,
        view: ObjectId,
        output: ObjectId,
        reconfigure: bool,
    ) {
        vcall!(self.core_move_view_to_output(
            core.as_ptr(),
            view.as_ptr(),
            output.as_ptr(),
            reconfigure
        ));
    }

    fn wayland_display(&self, core: ObjectId) -> String {
        self.string(vcall!(self.core_wayland_display(core.as_ptr())))
    }

    fn xwayland_display(&self, core: ObjectId) -> String {
        self.string(vcall!(self.core_xwayland_display(core.as_ptr())))
    }

    fn run(&self, core: ObjectId, command: &str) -> i32 {
        let command = c_string(command);
        vcall!(self.core_run(core.as_ptr(), command.as_ptr())).unwrap_or(-1)
    }

    fn shutdown(&self, core: ObjectId) {
        vcall!(self.core_shutdown(core.as_ptr()));
    }

    fn output_layout(&self, core: ObjectId) -> ObjectId {
        vcall!(self.core_output_layout(core.as_ptr()))
            .and_then(|p| ObjectId::from_ptr(p))
            .unwrap_or(ObjectId(0))
    }

    fn event_loop(&self, core: ObjectId) -> *mut c_void {
        vcall!(self.core_event_loop(core.as_ptr())).unwrap_or(std::ptr::null_mut())
    }
}

impl LayoutApi for ForeignHost {
    fn output_at(&self, layout: ObjectId, x: i32, y: i32) -> Option<ObjectId> {
        vcall!(self.layout_output_at(layout.as_ptr(), x, y)).and_then(|p| ObjectId::from_ptr(p))
    }

    fn output_coords_at(&self, layout: ObjectId, origin: Pointf) -> (Option<ObjectId>, Pointf) {
        let mut closest = origin;
        let output = vcall!(self.layout_output_coords_at(layout.as_ptr(), origin, &mut closest))
            .and_then(|p| ObjectId::from_ptr(p));
        (output, closest)
    }

    fn num_outputs(&self, layout: ObjectId) -> u32 {
        vcall!(self.layout_num_outputs(layout.as_ptr())).unwrap_or(0)
    }

    fn next_output(&self, layout: ObjectId, prev: Option<ObjectId>) -> Option<ObjectId> {
        vcall!(self.layout_next_output(layout.as_ptr(), opt_ptr(prev))).and_then(|p| ObjectId::from_ptr(p))
    }

    fn find_output(&self, layout: ObjectId, name: &str) -> Option<ObjectId> {
        let name = c_string(name);
        vcall!(self.layout_find_output(layout.as_ptr(), name.as_ptr())).and_then(|p| ObjectId::from_ptr(p))
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::collections::HashMap;

    use super::*;

    // A minimal shim: one object with a data slot and signal table, kept in
    // a thread-local so the C callbacks can reach it.
    #[derive(Default)]
    struct Shim {
        data: HashMap<String, (usize, ReleaseFn)>,
        listeners: Vec<(u64, usize, HostSignalFn, ReleaseFn)>,
        next: u64,
    }

    thread_local! {
        static SHIM: RefCell<Shim> = RefCell::new(Shim::default());
    }

    unsafe extern "C" fn store(
        _ctx: *mut c_void,
        _object: *mut c_void,
        key: *const c_char,
        data: *mut c_void,
        release: ReleaseFn,
    ) {
        let key = unsafe { copy_str(key) };
        let old = SHIM.with_borrow_mut(|s| s.data.insert(key, (data.expose_provenance(), release)));
        if let Some((old, release)) = old {
            unsafe { release(std::ptr::with_exposed_provenance_mut(old)) };
        }
    }

    unsafe extern "C" fn release(
        _ctx: *mut c_void,
        _object: *mut c_void,
        key: *const c_char,
    ) -> *mut c_void {
        let key = unsafe { copy_str(key) };
        SHIM.with_borrow_mut(|s| s.data.remove(&key))
            .map_or(std::ptr::null_mut(), |(p, _)| std::ptr::with_exposed_provenance_mut(p))
    }

    unsafe extern "C" fn has(_ctx: *mut c_void, _object: *mut c_void, key: *const c_char) -> bool {
        let key = unsafe { copy_str(key) };
        SHIM.with_borrow(|s| s.data.contains_key(&key))
    }

    unsafe extern "C" fn connect(
        _ctx: *mut c_void,
        _object: *mut c_void,
        _signal: *const c_char,
        callback: HostSignalFn,
        user: *mut c_void,
        release: ReleaseFn,
    ) -> u64 {
        SHIM.with_borrow_mut(|s| {
            s.next += 1;
            s.listeners.push((s.next, user.expose_provenance(), callback, release));
            s.next
        })
    }

    unsafe extern "C" fn disconnect(_ctx: *mut c_void, _object: *mut c_void, id: u64) {
        let removed = SHIM.with_borrow_mut(|s| {
            let pos = s.listeners.iter().position(|l| l.0 == id)?;
            Some(s.listeners.remove(pos))
        });
        if let Some((_, user, _, release)) = removed {
            unsafe { release(std::ptr::with_exposed_provenance_mut(user)) };
        }
    }

    unsafe extern "C" fn title(_ctx: *mut c_void, _view: *mut c_void) -> *const c_char {
        c"Terminal".as_ptr()
    }

    fn emit_all(payload: *mut c_void) {
        let listeners: Vec<_> = SHIM.with_borrow(|s| s.listeners.iter().map(|l| (l.1, l.2)).collect());
        for (user, callback) in listeners {
            unsafe { callback(payload, std::ptr::with_exposed_provenance_mut(user)) };
        }
    }

    fn vtable() -> HostVTable {
        // SAFETY: every field is a nullable pointer or an `Option` of a fn pointer.
        let mut vtable: HostVTable = unsafe { std::mem::zeroed() };
        vtable.store_data = Some(store);
        vtable.release_data = Some(release);
        vtable.has_data = Some(has);
        vtable.connect_signal = Some(connect);
        vtable.disconnect_signal = Some(disconnect);
        vtable.view_title = Some(title);
        vtable
    }

    #[test]
    fn test_data_slot_round_trip() {
        let host = ForeignHost::new(vtable());
        let object = ObjectId(0x1000);
        host.store_data(object, "key", Box::new(42u32));
        assert!(host.has_data(object, "key"));

        let data = host.release_data(object, "key").unwrap();
        assert_eq!(*data.downcast::<u32>().unwrap(), 42);
        assert!(!host.has_data(object, "key"));
    }

    #[test]
    fn test_listener_called_and_released() {
        let host = ForeignHost::new(vtable());
        let hits = Rc::new(std::cell::Cell::new(0usize));
        let counter = Rc::clone(&hits);
        let listener: SignalListener = Rc::new(move |payload: SignalPayload| counter.set(counter.get() + payload.addr()));

        let id = host.connect_signal(ObjectId(0x1000), "mapped", listener).unwrap();
        emit_all(std::ptr::without_provenance_mut(3));
        assert_eq!(hits.get(), 3);
        assert_eq!(Rc::strong_count(&hits), 2);

        host.disconnect_signal(ObjectId(0x1000), id);
        assert_eq!(Rc::strong_count(&hits), 1);
    }

    #[test]
    fn test_strings_are_copied() {
        let host = ForeignHost::new(vtable());
        assert_eq!(host.view_title(ObjectId(0x1000)), "Terminal");
    }

    #[test]
    fn test_missing_entries_are_neutral() {
        // SAFETY: see `vtable`.
        let host = ForeignHost::new(unsafe { std::mem::zeroed() });
        assert_eq!(host.view_app_id(ObjectId(0x1000)), "");
        assert_eq!(host.view_output(ObjectId(0x1000)), None);
        assert_eq!(host.run(ObjectId(0x1000), "true"), -1);
        assert!(host.connect_signal(ObjectId(0x1000), "s", Rc::new(|_: SignalPayload| {})).is_none());
        assert_eq!(
            host.set_option_str("core", "x", "1"),
            Err(OptionError::InvalidSection {
                section: "core".into()
            })
        );
    }

    #[test]
    fn test_error_codes_map_back() {
        assert_eq!(error_from_code(0, "a", "b", "c"), Ok(()));
        assert!(matches!(
            error_from_code(ErrorCode::InvalidOption as i32, "a", "b", "c"),
            Err(OptionError::InvalidOption { .. })
        ));
        assert!(matches!(
            error_from_code(ErrorCode::InvalidOptionValue as i32, "a", "b", "c"),
            Err(OptionError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_c_string_truncates_at_nul() {
        assert_eq!(c_string("view\0tail").as_bytes(), b"view");
    }
}
