//! Connections, subscriptions and signal payloads.

use std::ffi::{c_char, c_void};
use std::ptr;

use tracing::error;
use wflua_bridge::{Connection, SignalCallback};
use wflua_core::{InputEventProcessingMode, opt_ptr};

use super::{input, with_object};
use crate::plugin::{self, with_plugin};

/// Allocate a detached connection. Returns null if `callback` is null.
///
/// # Safety
///
/// `callback` must be sound to call with the payload of every signal the
/// connection is subscribed to, and with `data1` and `data2`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_create_signal_connection(
    callback: Option<SignalCallback>,
    data1: *mut c_void,
    data2: *mut c_void,
) -> *mut Connection {
    let Some(callback) = callback else {
        error!("wf_create_signal_connection: null callback");
        return ptr::null_mut();
    };
    with_plugin("wf_create_signal_connection", ptr::null_mut(), |plugin| {
        // SAFETY: forwarded to the caller.
        let conn = unsafe { plugin.bridge().create_connection(callback, data1, data2) };
        Connection::into_handle(conn)
    })
}

/// Unsubscribe `conn` if needed and release the caller's handle.
///
/// # Safety
///
/// `conn` must be null or a handle from [`wf_create_signal_connection`]
/// that has not been destroyed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_destroy_signal_connection(conn: *mut Connection) {
    if conn.is_null() {
        error!("wf_destroy_signal_connection: null connection");
        return;
    }
    // SAFETY: upheld by the caller.
    let conn = unsafe { Connection::from_handle(conn) };
    match plugin::current() {
        Some(plugin) => plugin.bridge().destroy_connection(conn),
        // The bridge is gone, so nothing can still hold the connection.
        None => drop(conn),
    }
}

/// Subscribe `conn` to `signal` on `emitter`.
///
/// # Safety
///
/// `signal` must be null or a NUL-terminated string. `conn` must be null or
/// a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_signal_subscribe(
    emitter: *mut c_void,
    signal: *const c_char,
    conn: *mut Connection,
) {
    // SAFETY: upheld by the caller.
    let Some(signal) = (unsafe { input(signal) }) else {
        error!("wf_signal_subscribe: null signal name");
        return;
    };
    if conn.is_null() {
        error!("wf_signal_subscribe: null connection");
        return;
    }
    with_object("wf_signal_subscribe", emitter, (), |plugin, emitter| {
        // SAFETY: upheld by the caller.
        let conn = unsafe { Connection::clone_from_handle(conn) };
        plugin.bridge().subscribe(emitter, &signal, &conn);
    });
}

/// Unsubscribe `conn` from `emitter`.
///
/// # Safety
///
/// `conn` must be null or a live handle.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_signal_unsubscribe(emitter: *mut c_void, conn: *mut Connection) {
    if conn.is_null() {
        error!("wf_signal_unsubscribe: null connection");
        return;
    }
    with_object("wf_signal_unsubscribe", emitter, (), |plugin, emitter| {
        // SAFETY: upheld by the caller.
        let conn = unsafe { Connection::clone_from_handle(conn) };
        plugin.bridge().unsubscribe(emitter, &conn);
    });
}

/// Detach every connection subscribed on `emitter`. They stay valid, inert.
#[unsafe(no_mangle)]
pub extern "C" fn wf_signal_unsubscribe_all(emitter: *mut c_void) {
    with_object("wf_signal_unsubscribe_all", emitter, (), |plugin, emitter| {
        plugin.bridge().unsubscribe_all(emitter);
    });
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_get_signaled_view(sig_data: *mut c_void) -> *mut c_void {
    with_plugin("wf_get_signaled_view", ptr::null_mut(), |plugin| {
        opt_ptr(plugin.host().signaled_view(sig_data))
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_get_signaled_output(sig_data: *mut c_void) -> *mut c_void {
    with_plugin("wf_get_signaled_output", ptr::null_mut(), |plugin| {
        opt_ptr(plugin.host().signaled_output(sig_data))
    })
}

/// The raw `wlr_event_keyboard_key` of a key signal.
#[unsafe(no_mangle)]
pub extern "C" fn wf_get_signaled_keyboard_key_event(sig_data: *mut c_void) -> *mut c_void {
    with_plugin("wf_get_signaled_keyboard_key_event", ptr::null_mut(), |plugin| {
        plugin.host().signaled_keyboard_key_event(sig_data)
    })
}

#[unsafe(no_mangle)]
pub extern "C" fn wf_set_signaled_keyboard_key_mode(
    sig_data: *mut c_void,
    mode: InputEventProcessingMode,
) {
    with_plugin("wf_set_signaled_keyboard_key_mode", (), |plugin| {
        plugin.host().set_signaled_keyboard_key_mode(sig_data, mode);
    });
}
