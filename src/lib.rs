//! wflua - Lua scripting for the Wayfire compositor.
//!
//! The library is loaded by Wayfire through a thin C++ shim, which exports
//! Wayfire's plugin symbols and hands over a [`HostVTable`] of entry points
//! into the compositor (see `include/wflua.h`). [`plugin`] bootstraps the
//! signal bridge and the Lua runtime over it, and [`ffi`] exposes the flat
//! `wf_*` C ABI that foreign runtimes call.
//!
//! The same plugin can be driven in-process against
//! [`HeadlessCompositor`](wflua_core::HeadlessCompositor), which is what the
//! `wflua` binary and the tests do.

pub mod ffi;
pub mod host_vtable;
pub mod plugin;

pub use host_vtable::{ForeignHost, HostVTable};
pub use plugin::{Plugin, fini, init, init_logging};

pub use wflua_bridge::{Bridge, BridgeStats, Connection, ConnectionState};
pub use wflua_core::{ErrorCode, HeadlessCompositor, ObjectId};
pub use wflua_lua::{LuaRuntime, RuntimeConfig};
