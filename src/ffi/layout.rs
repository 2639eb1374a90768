//! `wf_OutputLayout_*` queries.

use std::ffi::{c_char, c_int, c_uint, c_void};
use std::ptr;

use tracing::error;
use wflua_core::{ObjectId, Pointf, opt_ptr};

use super::{input, with_object};

#[unsafe(no_mangle)]
pub extern "C" fn wf_OutputLayout_get_output_at(
    layout: *mut c_void,
    x: c_int,
    y: c_int,
) -> *mut c_void {
    with_object("wf_OutputLayout_get_output_at", layout, ptr::null_mut(), |plugin, layout| {
        opt_ptr(plugin.host().output_at(layout, x, y))
    })
}

/// The output closest to `origin`. The closest point on it is written to
/// `closest` unless that is null.
///
/// # Safety
///
/// `closest` must be null or valid for a write of one `wf_Pointf`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_OutputLayout_get_output_coords_at(
    layout: *mut c_void,
    origin: Pointf,
    closest: *mut Pointf,
) -> *mut c_void {
    with_object(
        "wf_OutputLayout_get_output_coords_at",
        layout,
        ptr::null_mut(),
        |plugin, layout| {
            let (output, point) = plugin.host().output_coords_at(layout, origin);
            if !closest.is_null() {
                // SAFETY: upheld by the caller.
                unsafe { closest.write(point) };
            }
            opt_ptr(output)
        },
    )
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_OutputLayout_get_num_outputs(layout: *mut c_void) -> c_uint {
    with_object("wf_OutputLayout_get_num_outputs", layout, 0, |plugin, layout| {
        plugin.host().num_outputs(layout)
    })
}

/// Iterate outputs: a null `prev` yields the first one.
#[unsafe(no_mangle)]
pub extern "C" fn wf_OutputLayout_get_next_output(
    layout: *mut c_void,
    prev: *mut c_void,
) -> *mut c_void {
    with_object("wf_OutputLayout_get_next_output", layout, ptr::null_mut(), |plugin, layout| {
        opt_ptr(plugin.host().next_output(layout, ObjectId::from_ptr(prev)))
    })
}

/// # Safety
///
/// `name` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_OutputLayout_find_output(
    layout: *mut c_void,
    name: *const c_char,
) -> *mut c_void {
    // SAFETY: upheld by the caller.
    let Some(name) = (unsafe { input(name) }) else {
        error!("wf_OutputLayout_find_output: null name");
        return ptr::null_mut();
    };
    with_object("wf_OutputLayout_find_output", layout, ptr::null_mut(), |plugin, layout| {
        opt_ptr(plugin.host().find_output(layout, &name))
    })
}
