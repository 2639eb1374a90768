//! `wf_View_*` accessors.

use std::ffi::{c_char, c_void};
use std::ptr;

use wflua_core::{Geometry, opt_ptr};

use super::strings::scratch;
use super::with_object;

#[unsafe(no_mangle)]
pub extern "C" fn wf_View_to_string(view: *mut c_void) -> *const c_char {
    with_object("wf_View_to_string", view, ptr::null(), |plugin, view| {
        scratch(&plugin.host().view_to_string(view))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_View_get_title(view: *mut c_void) -> *const c_char {
    with_object("wf_View_get_title", view, ptr::null(), |plugin, view| {
        scratch(&plugin.host().view_title(view))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_View_get_app_id(view: *mut c_void) -> *const c_char {
    with_object("wf_View_get_app_id", view, ptr::null(), |plugin, view| {
        scratch(&plugin.host().view_app_id(view))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_View_get_wm_geometry(view: *mut c_void) -> Geometry {
    with_object("wf_View_get_wm_geometry", view, Geometry::default(), |plugin, view| {
        plugin.host().view_wm_geometry(view)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_View_get_output_geometry(view: *mut c_void) -> Geometry {
    with_object("wf_View_get_output_geometry", view, Geometry::default(), |plugin, view| {
        plugin.host().view_output_geometry(view)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_View_get_bounding_box(view: *mut c_void) -> Geometry {
    with_object("wf_View_get_bounding_box", view, Geometry::default(), |plugin, view| {
        plugin.host().view_bounding_box(view)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_View_get_output(view: *mut c_void) -> *mut c_void {
    with_object("wf_View_get_output", view, ptr::null_mut(), |plugin, view| {
        opt_ptr(plugin.host().view_output(view))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_View_set_geometry(view: *mut c_void, geometry: Geometry) {
    with_object("wf_View_set_geometry", view, (), |plugin, view| {
        plugin.host().view_set_geometry(view, geometry);
    });
}
