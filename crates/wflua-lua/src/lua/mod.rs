//! Lua scripting runtime.

mod bindings;
mod handlers;
mod runtime;

pub use runtime::LuaRuntime;
