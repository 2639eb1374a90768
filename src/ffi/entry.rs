//! Plugin entry points, as declared in `include/wflua.h`.
//!
//! Wayfire never calls into this library directly. The C++ shim exports
//! `newInstance` and `getWayfireVersion`, owns the `wf::plugin_interface_t`
//! object and fills a [`HostVTable`]; its `init`/`fini` land in
//! [`plugin_init`] and [`plugin_fini`]. Shims that would rather hold a plain
//! C struct can use [`wflua_instance_new`] instead.

use std::ffi::c_void;
use std::ptr;
use std::rc::Rc;

use tracing::{error, warn};
use wflua_lua::RuntimeConfig;

use crate::host_vtable::{ForeignHost, HostVTable};
use crate::plugin::{self, Plugin};

/// The Wayfire plugin ABI version this library targets.
///
/// Taken from `WAYFIRE_API_ABI_VERSION` at build time when set.
pub const WAYFIRE_API_ABI_VERSION: u32 = match option_env!("WAYFIRE_API_ABI_VERSION") {
    Some(raw) => parse_version(raw),
    None => DEFAULT_ABI_VERSION,
};

const DEFAULT_ABI_VERSION: u32 = 2023_09_29;

/// Parse a decimal version, ignoring `_` separators and a trailing `u`.
/// Anything else falls back to the default.
const fn parse_version(raw: &str) -> u32 {
    let bytes = raw.as_bytes();
    let mut value: u32 = 0;
    let mut digits = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b @ b'0'..=b'9' => {
                value = match value.checked_mul(10) {
                    Some(v) => match v.checked_add((b - b'0') as u32) {
                        Some(v) => v,
                        None => return DEFAULT_ABI_VERSION,
                    },
                    None => return DEFAULT_ABI_VERSION,
                };
                digits += 1;
            }
            b'_' => {}
            b'u' | b'U' if i + 1 == bytes.len() => {}
            _ => return DEFAULT_ABI_VERSION,
        }
        i += 1;
    }
    if digits == 0 { DEFAULT_ABI_VERSION } else { value }
}

pub type InstanceFn = unsafe extern "C" fn(instance: *mut PluginInstance);

/// A heap-held plugin instance for the shim.
///
/// This is a C struct, not a `wf::plugin_interface_t`: the shim calls `init`
/// and `fini` itself from its own plugin object.
#[repr(C)]
pub struct PluginInstance {
    pub init: InstanceFn,
    pub fini: InstanceFn,
    /// Set by the shim before `init`.
    pub host: *const HostVTable,
    /// Result of `plugin_init`, owned by the instance until `fini`.
    pub state: *mut c_void,
}

unsafe extern "C" fn instance_init(instance: *mut PluginInstance) {
    // SAFETY: the shim passes the instance it got from `wflua_instance_new`.
    let Some(instance) = (unsafe { instance.as_mut() }) else {
        error!("init called on a null plugin instance");
        return;
    };
    if !instance.state.is_null() {
        warn!("Plugin instance initialized twice");
        // SAFETY: `state` came from `plugin_init` and was not released.
        unsafe { plugin_fini(instance.state) };
    }
    // SAFETY: the shim keeps the vtable alive for the `plugin_init` call.
    instance.state = unsafe { plugin_init(instance.host) };
}

unsafe extern "C" fn instance_fini(instance: *mut PluginInstance) {
    // SAFETY: as in `instance_init`.
    let Some(instance) = (unsafe { instance.as_mut() }) else {
        error!("fini called on a null plugin instance");
        return;
    };
    let state = std::mem::replace(&mut instance.state, ptr::null_mut());
    // SAFETY: `state` came from `plugin_init` and was not released.
    unsafe { plugin_fini(state) };
}

#[unsafe(no_mangle)]
pub extern "C" fn wflua_instance_new() -> *mut PluginInstance {
    Box::into_raw(Box::new(PluginInstance {
        init: instance_init,
        fini: instance_fini,
        host: ptr::null(),
        state: ptr::null_mut(),
    }))
}

/// The ABI version the shim should report from `getWayfireVersion`.
#[unsafe(no_mangle)]
pub extern "C" fn wflua_abi_version() -> u32 {
    WAYFIRE_API_ABI_VERSION
}

/// Free an instance from [`wflua_instance_new`], tearing it down if still
/// running.
///
/// # Safety
///
/// `instance` must be null or come from `wflua_instance_new` and not be freed
/// yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wflua_instance_free(instance: *mut PluginInstance) {
    if instance.is_null() {
        return;
    }
    // SAFETY: upheld by the caller.
    let instance = unsafe { Box::from_raw(instance) };
    if !instance.state.is_null() {
        // SAFETY: `state` came from `plugin_init` and was not released.
        unsafe { plugin_fini(instance.state) };
    }
}

/// Bootstrap the plugin over the shim's vtable. Returns the opaque state
/// to pass to [`plugin_fini`], or null if `host` is null.
///
/// # Safety
///
/// `host` must be null or point to a filled vtable. The table is copied; its
/// entries must stay callable until `plugin_fini`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn plugin_init(host: *const HostVTable) -> *mut c_void {
    plugin::init_logging();

    // SAFETY: upheld by the caller.
    let Some(vtable) = (unsafe { host.as_ref() }).copied() else {
        error!("plugin_init: null host vtable");
        return ptr::null_mut();
    };

    let config = RuntimeConfig::load().unwrap_or_else(|err| {
        error!("Failed to load wflua config, using defaults: {err}");
        RuntimeConfig::default()
    });

    let plugin = plugin::init(Rc::new(ForeignHost::new(vtable)), config);
    Rc::into_raw(plugin).cast_mut().cast()
}

/// Tear down the plugin started by [`plugin_init`].
///
/// # Safety
///
/// `state` must be null or a value returned by `plugin_init` that was not
/// passed here before.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn plugin_fini(state: *mut c_void) {
    if state.is_null() {
        return;
    }
    // SAFETY: upheld by the caller.
    let plugin = unsafe { Rc::from_raw(state.cast_const().cast::<Plugin>()) };
    let installed = plugin::current().is_some_and(|current| Rc::ptr_eq(&current, &plugin));
    if installed {
        plugin::fini();
    } else {
        warn!("plugin_fini called for an instance that is no longer installed");
    }
}
