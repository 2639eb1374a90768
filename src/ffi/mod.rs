//! The flat C ABI scripts reach the compositor through.
//!
//! Every function validates its pointers, logs programming errors at error
//! level and returns a neutral value instead of failing. Strings handed out
//! live in one scratch buffer; see [`strings`].

#![allow(non_snake_case)]

use std::ffi::{CStr, c_char, c_void};

use tracing::error;
use wflua_core::ObjectId;

use crate::plugin::{Plugin, with_plugin};

pub mod config;
pub mod compositor;
pub mod entry;
pub mod layout;
pub mod lifetime;
pub mod output;
pub mod signals;
pub mod strings;
pub mod view;

/// Run `f` with the installed plugin and the non-null object `ptr`.
pub(crate) fn with_object<R>(
    caller: &str,
    ptr: *mut c_void,
    default: R,
    f: impl FnOnce(&Plugin, ObjectId) -> R,
) -> R {
    let Some(object) = ObjectId::from_ptr(ptr) else {
        error!("{caller}: null object");
        return default;
    };
    with_plugin(caller, default, |plugin| f(plugin, object))
}

/// Copy an inbound C string. Null yields `None`.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string.
pub(crate) unsafe fn input(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        return None;
    }
    // SAFETY: forwarded to the caller.
    Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
}
