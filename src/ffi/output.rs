//! `wf_Output_*` accessors.

use std::ffi::{c_char, c_void};
use std::ptr;

use tracing::error;
use wflua_core::{Dimensions, Geometry, ObjectId, PlainActivatorData, Pointf, opt_ptr};

use super::strings::scratch;
use super::{input, with_object};

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_to_string(output: *mut c_void) -> *const c_char {
    with_object("wf_Output_to_string", output, ptr::null(), |plugin, output| {
        scratch(&plugin.host().output_to_string(output))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_get_screen_size(output: *mut c_void) -> Dimensions {
    with_object("wf_Output_get_screen_size", output, Dimensions::default(), |plugin, output| {
        plugin.host().output_screen_size(output)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_get_relative_geometry(output: *mut c_void) -> Geometry {
    with_object("wf_Output_get_relative_geometry", output, Geometry::default(), |plugin, output| {
        plugin.host().output_relative_geometry(output)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_get_layout_geometry(output: *mut c_void) -> Geometry {
    with_object("wf_Output_get_layout_geometry", output, Geometry::default(), |plugin, output| {
        plugin.host().output_layout_geometry(output)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_ensure_pointer(output: *mut c_void, center: bool) {
    with_object("wf_Output_ensure_pointer", output, (), |plugin, output| {
        plugin.host().output_ensure_pointer(output, center);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_get_cursor_position(output: *mut c_void) -> Pointf {
    with_object("wf_Output_get_cursor_position", output, Pointf::default(), |plugin, output| {
        plugin.host().output_cursor_position(output)
    })
}

/// Trigger the activator binding named `activator` on `output`.
///
/// # Safety
///
/// `activator` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_Output_call_plugin_plain(
    output: *mut c_void,
    activator: *const c_char,
    data: PlainActivatorData,
) -> bool {
    // SAFETY: upheld by the caller.
    let Some(activator) = (unsafe { input(activator) }) else {
        error!("wf_Output_call_plugin_plain: null activator");
        return false;
    };
    with_object("wf_Output_call_plugin_plain", output, false, |plugin, output| {
        plugin.host().output_call_plugin_plain(output, &activator, &data)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_get_top_view(output: *mut c_void) -> *mut c_void {
    with_object("wf_Output_get_top_view", output, ptr::null_mut(), |plugin, output| {
        opt_ptr(plugin.host().output_top_view(output))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_get_active_view(output: *mut c_void) -> *mut c_void {
    with_object("wf_Output_get_active_view", output, ptr::null_mut(), |plugin, output| {
        opt_ptr(plugin.host().output_active_view(output))
    })
}

/// Focus `view` on `output`. A null view clears the focus.
#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_focus_view(output: *mut c_void, view: *mut c_void, raise: bool) {
    with_object("wf_Output_focus_view", output, (), |plugin, output| {
        plugin
            .host()
            .output_focus_view(output, ObjectId::from_ptr(view), raise);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_ensure_visible(output: *mut c_void, view: *mut c_void) -> bool {
    let Some(view) = ObjectId::from_ptr(view) else {
        error!("wf_Output_ensure_visible: null view");
        return false;
    };
    with_object("wf_Output_ensure_visible", output, false, |plugin, output| {
        plugin.host().output_ensure_visible(output, view)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_Output_get_workarea(output: *mut c_void) -> Geometry {
    with_object("wf_Output_get_workarea", output, Geometry::default(), |plugin, output| {
        plugin.host().output_workarea(output)
    })
}
