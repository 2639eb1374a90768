//! `wf_get_core` and the `wf_Core_*` accessors.

use std::ffi::{c_char, c_int, c_void};
use std::ptr;

use tracing::error;
use wflua_core::{ObjectId, Pointf, opt_ptr};

use super::strings::scratch;
use super::{input, with_object};
use crate::plugin::with_plugin;

/// The compositor core singleton.
#[unsafe(no_mangle)]
pub extern "C" fn wf_get_core() -> *mut c_void {
    with_plugin("wf_get_core", ptr::null_mut(), |plugin| {
        plugin.host().core().as_ptr()
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_to_string(core: *mut c_void) -> *const c_char {
    with_object("wf_Core_to_string", core, ptr::null(), |plugin, core| {
        scratch(&plugin.host().core_to_string(core))
    })
}

/// The raw `wlr_seat`.
#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_current_seat(core: *mut c_void) -> *mut c_void {
    with_object("wf_Core_get_current_seat", core, ptr::null_mut(), |plugin, core| {
        plugin.host().current_seat(core)
    })
}

/// # Safety
///
/// `name` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_Core_set_cursor(core: *mut c_void, name: *const c_char) {
    // SAFETY: upheld by the caller.
    let Some(name) = (unsafe { input(name) }) else {
        error!("wf_Core_set_cursor: null cursor name");
        return;
    };
    with_object("wf_Core_set_cursor", core, (), |plugin, core| {
        plugin.host().set_cursor(core, &name);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_unhide_cursor(core: *mut c_void) {
    with_object("wf_Core_unhide_cursor", core, (), |plugin, core| {
        plugin.host().unhide_cursor(core);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_hide_cursor(core: *mut c_void) {
    with_object("wf_Core_hide_cursor", core, (), |plugin, core| {
        plugin.host().hide_cursor(core);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_warp_cursor(core: *mut c_void, position: Pointf) {
    with_object("wf_Core_warp_cursor", core, (), |plugin, core| {
        plugin.host().warp_cursor(core, position);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_cursor_position(core: *mut c_void) -> Pointf {
    with_object("wf_Core_get_cursor_position", core, Pointf::default(), |plugin, core| {
        plugin.host().core_cursor_position(core)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_cursor_focus_view(core: *mut c_void) -> *mut c_void {
    with_object("wf_Core_get_cursor_focus_view", core, ptr::null_mut(), |plugin, core| {
        opt_ptr(plugin.host().cursor_focus_view(core))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_touch_focus_view(core: *mut c_void) -> *mut c_void {
    with_object("wf_Core_get_touch_focus_view", core, ptr::null_mut(), |plugin, core| {
        opt_ptr(plugin.host().touch_focus_view(core))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_view_at(core: *mut c_void, point: Pointf) -> *mut c_void {
    with_object("wf_Core_get_view_at", core, ptr::null_mut(), |plugin, core| {
        opt_ptr(plugin.host().view_at(core, point))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_set_active_view(core: *mut c_void, view: *mut c_void) {
    with_object("wf_Core_set_active_view", core, (), |plugin, core| {
        plugin.host().set_active_view(core, ObjectId::from_ptr(view));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_focus_view(core: *mut c_void, view: *mut c_void) {
    with_object("wf_Core_focus_view", core, (), |plugin, core| {
        plugin.host().core_focus_view(core, ObjectId::from_ptr(view));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_focus_output(core: *mut c_void, output: *mut c_void) {
    with_object("wf_Core_focus_output", core, (), |plugin, core| {
        plugin.host().focus_output(core, ObjectId::from_ptr(output));
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_active_output(core: *mut c_void) -> *mut c_void {
    with_object("wf_Core_get_active_output", core, ptr::null_mut(), |plugin, core| {
        opt_ptr(plugin.host().active_output(core))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_move_view_to_output(
    core: *mut c_void,
    view: *mut c_void,
    output: *mut c_void,
    reconfigure: bool,
) {
    let (Some(view), Some(output)) = (ObjectId::from_ptr(view), ObjectId::from_ptr(output)) else {
        error!("wf_Core_move_view_to_output: null view or output");
        return;
    };
    with_object("wf_Core_move_view_to_output", core, (), |plugin, core| {
        plugin.host().move_view_to_output(core, view, output, reconfigure);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_wayland_display(core: *mut c_void) -> *const c_char {
    with_object("wf_Core_get_wayland_display", core, ptr::null(), |plugin, core| {
        scratch(&plugin.host().wayland_display(core))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_xwayland_display(core: *mut c_void) -> *const c_char {
    with_object("wf_Core_get_xwayland_display", core, ptr::null(), |plugin, core| {
        scratch(&plugin.host().xwayland_display(core))
    })
}

/// Spawn `command`. Returns the child pid, or -1.
///
/// # Safety
///
/// `command` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_Core_run(core: *mut c_void, command: *const c_char) -> c_int {
    // SAFETY: upheld by the caller.
    let Some(command) = (unsafe { input(command) }) else {
        error!("wf_Core_run: null command");
        return -1;
    };
    with_object("wf_Core_run", core, -1, |plugin, core| {
        plugin.host().run(core, &command)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_shutdown(core: *mut c_void) {
    with_object("wf_Core_shutdown", core, (), |plugin, core| {
        plugin.host().shutdown(core);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_output_layout(core: *mut c_void) -> *mut c_void {
    with_object("wf_Core_get_output_layout", core, ptr::null_mut(), |plugin, core| {
        plugin.host().output_layout(core).as_ptr()
    })
}

/// The raw `wl_event_loop`.
#[unsafe(no_mangle)]
pub extern "C" fn wf_Core_get_event_loop(core: *mut c_void) -> *mut c_void {
    with_object("wf_Core_get_event_loop", core, ptr::null_mut(), |plugin, core| {
        plugin.host().event_loop(core)
    })
}
