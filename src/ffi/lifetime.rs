//! Destruction notifications.

use std::ffi::c_void;

use tracing::error;
use wflua_bridge::LifetimeCallback;

use super::with_object;

/// Run `callback(object, data)` once, when `object` is destroyed.
///
/// # Safety
///
/// `callback` must be sound to call with `object` and `data` until it fires
/// or is unsubscribed.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_lifetime_subscribe(
    object: *mut c_void,
    callback: Option<LifetimeCallback>,
    data: *mut c_void,
) {
    let Some(callback) = callback else {
        error!("wf_lifetime_subscribe: null callback");
        return;
    };
    with_object("wf_lifetime_subscribe", object, (), |plugin, object| {
        // SAFETY: forwarded to the caller.
        unsafe { plugin.bridge().lifetime_subscribe(object, callback, data) }
    });
}

/// Drop the most recent registration of `callback` on `object`.
#[unsafe(no_mangle)]
pub extern "C" fn wf_lifetime_unsubscribe(object: *mut c_void, callback: Option<LifetimeCallback>) {
    let Some(callback) = callback else {
        error!("wf_lifetime_unsubscribe: null callback");
        return;
    };
    with_object("wf_lifetime_unsubscribe", object, (), |plugin, object| {
        plugin.bridge().lifetime_unsubscribe(object, callback);
    });
}
