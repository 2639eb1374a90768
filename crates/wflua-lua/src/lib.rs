//! Lua runtime for wflua.
//!
//! [`LuaRuntime`] owns the interpreter, installs the `wf` script API on top of
//! a [`Bridge`](wflua_bridge::Bridge) and a [`Host`](wflua_core::Host), and
//! runs the entrypoint script described by a [`RuntimeConfig`].

pub mod config;
mod error;
mod lua;

pub use config::{RuntimeConfig, RuntimeConfigBuilder};
pub use error::{RuntimeError, RuntimeResult};
pub use lua::LuaRuntime;
