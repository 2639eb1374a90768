//! Lua runtime implementation.

use std::path::{Path, PathBuf};
use std::rc::Rc;

use mlua::{Lua, Table};
use tracing::{debug, info};
use wflua_bridge::Bridge;
use wflua_core::{Host, ObjectId};

use crate::config::RuntimeConfig;
use crate::error::{RuntimeError, RuntimeResult};

use super::bindings;
use super::handlers::{CONNECTIONS_KEY, LifetimeHub};

/// The script interpreter with the `wf` API installed.
///
/// Dropping the runtime releases everything the scripts still hold: lifetime
/// registrations first, then (as the interpreter closes) every connection.
pub struct LuaRuntime {
    /// The main Lua state.
    lua: Lua,

    bridge: Bridge,

    /// Lua-side lifetime fan-out.
    hub: Rc<LifetimeHub>,

    config: RuntimeConfig,
}

impl LuaRuntime {
    /// Create a runtime and install the `wf` API.
    pub fn new(bridge: Bridge, host: Rc<dyn Host>, config: RuntimeConfig) -> RuntimeResult<Self> {
        let lua = Lua::new();
        let hub = LifetimeHub::new(bridge.clone());
        let runtime = Self {
            lua,
            bridge,
            hub,
            config,
        };
        runtime.init_api(&host)?;
        runtime.prepend_package_path()?;
        Ok(runtime)
    }

    fn init_api(&self, host: &Rc<dyn Host>) -> RuntimeResult<()> {
        let connections = self.lua.create_table()?;
        connections.set_metatable(Some(self.lua.create_table_from([("__mode", "v")])?))?;
        self.lua
            .set_named_registry_value(CONNECTIONS_KEY, connections)?;

        let wf = bindings::create_wf_api(&self.lua, &self.bridge, host, &self.hub)?;
        self.lua.globals().set("wf", wf)?;
        Ok(())
    }

    fn prepend_package_path(&self) -> RuntimeResult<()> {
        let package: Table = self.lua.globals().get("package")?;
        let current: String = package.get("path")?;
        let path = format!("{}{current}", self.config.package_path_prefix());
        debug!(target: "wflua::lua", "package.path = {path}");
        package.set("path", path)?;
        Ok(())
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn lua(&self) -> &Lua {
        &self.lua
    }

    /// Resolve and run the entrypoint script.
    ///
    /// Returns the path that ran, or `None` if scripting is disabled.
    pub fn run_entrypoint(&self) -> RuntimeResult<Option<PathBuf>> {
        if !self.config.enabled {
            info!(target: "wflua::lua", "Scripting disabled; entrypoint skipped");
            return Ok(None);
        }

        let path = self.config.resolve_entrypoint()?;
        info!(target: "wflua::lua", "Running {}", path.display());
        self.run_file(&path)?;
        info!(target: "wflua::lua", "Entrypoint done");
        Ok(Some(path))
    }

    /// Load and run a script file.
    pub fn run_file(&self, path: &Path) -> RuntimeResult<()> {
        let code = std::fs::read_to_string(path)?;
        self.exec(&code, &path.display().to_string())
    }

    /// Run a chunk of Lua source.
    pub fn exec(&self, code: &str, name: &str) -> RuntimeResult<()> {
        self.lua
            .load(code)
            .set_name(format!("@{name}"))
            .exec()
            .map_err(|e| RuntimeError::LoadError {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Compile `code` without running it.
    pub fn check(code: &str, name: &str) -> RuntimeResult<()> {
        Lua::new()
            .load(code)
            .set_name(format!("@{name}"))
            .into_function()
            .map(drop)
            .map_err(|e| RuntimeError::LoadError {
                name: name.to_string(),
                message: e.to_string(),
            })
    }

    /// Run a full garbage collection cycle.
    pub fn collect_garbage(&self) -> RuntimeResult<()> {
        self.lua.gc_collect()?;
        Ok(())
    }

    /// Number of Lua functions waiting on `object`'s destruction.
    pub fn lifetime_subscriptions(&self, object: ObjectId) -> usize {
        self.hub.len(object)
    }

    /// Number of `wf.on` connections kept alive by the runtime.
    pub fn pinned_connections(&self) -> usize {
        self.hub.pinned()
    }
}

impl Drop for LuaRuntime {
    fn drop(&mut self) {
        self.hub.clear();
        debug!(target: "wflua::lua", "Closing interpreter");
    }
}
