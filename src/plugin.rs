//! The plugin singleton and its process-wide slot.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use wflua_bridge::{Bridge, BridgeStats};
use wflua_core::{Emitters, Host};
use wflua_lua::{LuaRuntime, RuntimeConfig};

/// Environment variable holding the log filter.
pub const LOG_ENV: &str = "WFLUA_LOG";

thread_local! {
    static PLUGIN: RefCell<Option<Rc<Plugin>>> = const { RefCell::new(None) };
}

/// Everything one loaded instance of the plugin owns.
pub struct Plugin {
    host: Rc<dyn Host>,
    bridge: Bridge,
    runtime: RefCell<Option<LuaRuntime>>,
    script_error: RefCell<Option<String>>,
}

impl Plugin {
    pub fn host(&self) -> &Rc<dyn Host> {
        &self.host
    }

    pub fn bridge(&self) -> &Bridge {
        &self.bridge
    }

    /// The entrypoint failure, if the last start failed.
    pub fn script_error(&self) -> Option<String> {
        self.script_error.borrow().clone()
    }

    pub fn has_runtime(&self) -> bool {
        self.runtime.borrow().is_some()
    }

    /// Start the interpreter and run the entrypoint.
    ///
    /// A failing script is logged and its interpreter replaced by a fresh one,
    /// so the plugin keeps running with an empty script state.
    fn start(&self, config: RuntimeConfig) {
        let runtime = match LuaRuntime::new(self.bridge.clone(), Rc::clone(&self.host), config.clone())
        {
            Ok(runtime) => runtime,
            Err(err) => {
                error!("Failed to create Lua runtime: {err}");
                *self.script_error.borrow_mut() = Some(err.to_string());
                return;
            }
        };

        let runtime = match runtime.run_entrypoint() {
            Ok(_) => runtime,
            Err(err) => {
                error!("Failed to run init file: {err}");
                *self.script_error.borrow_mut() = Some(err.to_string());
                drop(runtime);
                match LuaRuntime::new(self.bridge.clone(), Rc::clone(&self.host), config) {
                    Ok(fresh) => fresh,
                    Err(err) => {
                        error!("Failed to recreate Lua runtime: {err}");
                        return;
                    }
                }
            }
        };
        *self.runtime.borrow_mut() = Some(runtime);
    }

    /// Drop the interpreter, then tear the bridge down. Returns the residue.
    fn stop(&self) -> BridgeStats {
        let runtime = self.runtime.borrow_mut().take();
        drop(runtime);

        let residue = self.bridge.shutdown();
        if !residue.is_empty() {
            error!("Bridge state left at teardown: {residue:?}");
        }
        residue
    }
}

/// Install a plugin over `host` and run the entrypoint.
///
/// The plugin is recorded in the slot before the script runs, so facade calls
/// made by the script find it. A plugin already in the slot is torn down first.
pub fn init<H: Host + 'static>(host: Rc<H>, config: RuntimeConfig) -> Rc<Plugin> {
    if let Some(previous) = PLUGIN.with_borrow_mut(Option::take) {
        warn!("wflua initialized twice; tearing down the previous instance");
        previous.stop();
    }

    info!("wflua {} starting", env!("CARGO_PKG_VERSION"));
    let emitters: Rc<dyn Emitters> = host.clone();
    let plugin = Rc::new(Plugin {
        host,
        bridge: Bridge::new(emitters),
        runtime: RefCell::new(None),
        script_error: RefCell::new(None),
    });
    PLUGIN.with_borrow_mut(|slot| *slot = Some(Rc::clone(&plugin)));

    plugin.start(config);
    info!("wflua ready");
    plugin
}

/// Tear down the installed plugin. Returns the bridge residue, or `None` if
/// nothing was installed.
pub fn fini() -> Option<BridgeStats> {
    let plugin = PLUGIN.with_borrow_mut(Option::take)?;
    info!("wflua shutting down");
    Some(plugin.stop())
}

/// The installed plugin.
pub fn current() -> Option<Rc<Plugin>> {
    PLUGIN.with_borrow(Clone::clone)
}

/// Run `f` against the installed plugin, or log and return `default`.
///
/// The slot is not borrowed while `f` runs.
pub(crate) fn with_plugin<R>(caller: &str, default: R, f: impl FnOnce(&Plugin) -> R) -> R {
    match current() {
        Some(plugin) => f(&plugin),
        None => {
            error!("{caller} called while wflua is not initialized");
            default
        }
    }
}

/// Install the global log subscriber. A subscriber installed earlier wins.
pub fn init_logging() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
