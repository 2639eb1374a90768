//! Signal and lifetime handlers backed by Lua functions.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ffi::c_void;
use std::rc::Rc;

use mlua::{
    AnyUserData, Function, Integer, LightUserData, Lua, MetaMethod, Table, UserData,
    UserDataMethods, WeakLua,
};
use tracing::{debug, error};
use wflua_bridge::{Bridge, Connection, ConnectionState, LifetimeError};
use wflua_core::ObjectId;

/// Registry table from handler key to connection userdata, with weak values.
pub(crate) const CONNECTIONS_KEY: &str = "wflua.connections";

/// Convert a light userdata argument into an object id.
pub(crate) fn object(ud: LightUserData) -> mlua::Result<ObjectId> {
    ObjectId::from_ptr(ud.0).ok_or_else(|| mlua::Error::runtime("null object"))
}

pub(crate) fn light(object: Option<ObjectId>) -> Option<LightUserData> {
    object.map(|o| LightUserData(o.as_ptr()))
}

fn state_name(state: ConnectionState) -> &'static str {
    match state {
        ConnectionState::Detached => "detached",
        ConnectionState::Attached => "attached",
        ConnectionState::Inert => "inert",
        ConnectionState::Destroyed => "destroyed",
    }
}

/// The connection's data1. Its address keys the userdata in
/// [`CONNECTIONS_KEY`]; the callback itself is the userdata's user value.
struct LuaSignalHandler {
    lua: WeakLua,
}

fn handler_key(handler: *const c_void) -> Integer {
    handler.addr() as Integer
}

/// Look up the connection owning `handler` and its callback.
fn handler_callback(
    lua: &Lua,
    handler: *const c_void,
) -> mlua::Result<Option<(AnyUserData, Function)>> {
    let connections: Table = lua.named_registry_value(CONNECTIONS_KEY)?;
    let Some(ud) = connections.raw_get::<Option<AnyUserData>>(handler_key(handler))? else {
        return Ok(None);
    };
    let callback: Function = ud.user_value()?;
    Ok(Some((ud, callback)))
}

unsafe extern "C" fn lua_signal_trampoline(
    payload: *mut c_void,
    data1: *mut c_void,
    _data2: *mut c_void,
) {
    // SAFETY: data1 is the handler box of a `LuaConnection` whose connection
    // is still attached, which implies the box is alive.
    let handler = unsafe { &*data1.cast::<LuaSignalHandler>() };
    let Some(lua) = handler.lua.try_upgrade() else {
        return;
    };
    // The userdata is held until the call returns, so the handler box
    // outlives the call even if the script destroys this connection.
    let result = handler_callback(&lua, data1).and_then(|found| match found {
        Some((_ud, callback)) => callback.call::<()>(LightUserData(payload)),
        // Finalizing; the connection goes with it.
        None => Ok(()),
    });
    if let Err(err) = result {
        error!(target: "wflua::lua", "Signal handler failed: {err}");
    }
}

/// A connection owned by a script.
///
/// Dropping it (explicitly or through garbage collection) destroys the
/// underlying connection.
pub(crate) struct LuaConnection {
    bridge: Bridge,
    hub: Rc<LifetimeHub>,
    conn: Option<Rc<Connection>>,
    // The connection's data1; freed in `Drop`.
    handler: *mut LuaSignalHandler,
}

impl LuaConnection {
    /// Create the userdata for a connection calling `callback`.
    pub(crate) fn create(
        lua: &Lua,
        bridge: Bridge,
        hub: Rc<LifetimeHub>,
        callback: Function,
    ) -> mlua::Result<AnyUserData> {
        let handler = Box::into_raw(Box::new(LuaSignalHandler { lua: lua.weak() }));
        // SAFETY: the handler is owned by the userdata and the connection is
        // destroyed in `Drop` before the handler is freed.
        let conn = unsafe {
            bridge.create_connection(lua_signal_trampoline, handler.cast(), std::ptr::null_mut())
        };
        let ud = lua.create_userdata(Self {
            bridge,
            hub,
            conn: Some(conn),
            handler,
        })?;
        // Not a registry reference: a callback capturing its own connection
        // must stay collectable.
        ud.set_user_value(callback)?;
        let connections: Table = lua.named_registry_value(CONNECTIONS_KEY)?;
        connections.raw_set(handler_key(handler.cast_const().cast()), ud.clone())?;
        Ok(ud)
    }

    fn live(&self) -> Option<&Rc<Connection>> {
        if self.conn.is_none() {
            error!(target: "wflua::lua", "Connection was destroyed!");
        }
        self.conn.as_ref()
    }

    pub(crate) fn subscribe(&self, emitter: ObjectId, signal: &str) {
        if let Some(conn) = self.live() {
            self.bridge.subscribe(emitter, signal, conn);
        }
    }

    pub(crate) fn unsubscribe(&self, emitter: ObjectId) {
        if let Some(conn) = self.live() {
            self.bridge.unsubscribe(emitter, conn);
        }
    }

    pub(crate) fn destroy(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.bridge.destroy_connection(conn);
        }
    }

    pub(crate) fn state(&self) -> ConnectionState {
        self.conn
            .as_ref()
            .map_or(ConnectionState::Destroyed, |c| c.state())
    }
}

impl Drop for LuaConnection {
    fn drop(&mut self) {
        self.destroy();
        // SAFETY: allocated with `Box::into_raw` in `create`; the connection
        // can no longer fire.
        drop(unsafe { Box::from_raw(self.handler) });
    }
}

impl UserData for LuaConnection {
    fn add_methods<M: UserDataMethods<Self>>(methods: &mut M) {
        methods.add_method(
            "subscribe",
            |_, this, (emitter, signal): (LightUserData, String)| {
                this.subscribe(object(emitter)?, &signal);
                Ok(())
            },
        );

        methods.add_function(
            "unsubscribe",
            |_, (ud, emitter): (AnyUserData, LightUserData)| {
                let (hub, state) = {
                    let this = ud.borrow::<LuaConnection>()?;
                    this.unsubscribe(object(emitter)?);
                    (Rc::clone(&this.hub), this.state())
                };
                if state != ConnectionState::Attached {
                    hub.unpin(&ud);
                }
                Ok(())
            },
        );

        methods.add_function("destroy", |_, ud: AnyUserData| {
            let hub = {
                let mut this = ud.borrow_mut::<LuaConnection>()?;
                this.destroy();
                Rc::clone(&this.hub)
            };
            hub.unpin(&ud);
            Ok(())
        });

        methods.add_method("state", |_, this, ()| Ok(state_name(this.state())));

        methods.add_method("emitter", |_, this, ()| {
            Ok(light(this.conn.as_ref().and_then(|c| c.emitter())))
        });

        methods.add_method("signal", |_, this, ()| {
            Ok(this
                .conn
                .as_ref()
                .and_then(|c| c.signal())
                .map(|s| s.to_string()))
        });

        methods.add_meta_method(MetaMethod::ToString, |_, this, ()| {
            Ok(format!("wf.connection ({})", state_name(this.state())))
        });
    }
}

fn same_function(a: &Function, b: &Function) -> bool {
    a.to_pointer() == b.to_pointer()
}

/// What the runtime keeps for one object until it dies.
#[derive(Default)]
struct Watch {
    /// `wf.lifetime_subscribe` functions, in registration order.
    callbacks: Vec<Function>,
    /// `wf.on` connections attached to the object.
    pinned: Vec<AnyUserData>,
}

impl Watch {
    fn is_empty(&self) -> bool {
        self.callbacks.is_empty() && self.pinned.is_empty()
    }
}

/// Lua-side fan-out of lifetime notifications.
///
/// Each object gets at most one bridge registration, whatever the number of
/// Lua functions waiting on it. The same registration drops the `wf.on`
/// connections bound to the object when it dies.
pub(crate) struct LifetimeHub {
    bridge: Bridge,
    watches: RefCell<HashMap<ObjectId, Watch>>,
}

unsafe extern "C" fn lua_lifetime_trampoline(emitter: *mut c_void, data: *mut c_void) {
    // SAFETY: data is the hub of a live runtime; the runtime unregisters every
    // object before the hub is dropped.
    let hub = unsafe { &*data.cast::<LifetimeHub>() };
    if let Some(emitter) = ObjectId::from_ptr(emitter) {
        hub.fire(emitter);
    }
}

impl LifetimeHub {
    pub(crate) fn new(bridge: Bridge) -> Rc<Self> {
        Rc::new(Self {
            bridge,
            watches: RefCell::new(HashMap::new()),
        })
    }

    fn data(&self) -> *mut c_void {
        std::ptr::from_ref(self).cast_mut().cast()
    }

    /// Make sure the bridge reports `emitter`'s death. False if it refused.
    fn watch(&self, emitter: ObjectId) -> bool {
        if self.watches.borrow().contains_key(&emitter) {
            return true;
        }
        let before = self.bridge.lifetime_subscription_count(emitter);
        // SAFETY: the trampoline only dereferences the hub, which outlives
        // the registration.
        unsafe {
            self.bridge
                .lifetime_subscribe(emitter, lua_lifetime_trampoline, self.data());
        }
        if self.bridge.lifetime_subscription_count(emitter) == before {
            return false;
        }
        self.watches.borrow_mut().insert(emitter, Watch::default());
        true
    }

    fn unwatch_if_empty(&self, emitter: ObjectId) {
        let emptied = {
            let mut watches = self.watches.borrow_mut();
            match watches.get(&emitter) {
                Some(watch) if watch.is_empty() => watches.remove(&emitter),
                _ => None,
            }
        };
        if emptied.is_some() {
            self.bridge
                .lifetime_unsubscribe(emitter, lua_lifetime_trampoline);
        }
    }

    pub(crate) fn subscribe(&self, emitter: ObjectId, callback: Function) {
        if !self.watch(emitter) {
            return;
        }
        if let Some(watch) = self.watches.borrow_mut().get_mut(&emitter) {
            watch.callbacks.push(callback);
        }
        debug!(target: "wflua::lua", %emitter, "Lua lifetime subscription added");
    }

    /// Remove the most recently added function equal to `callback`.
    pub(crate) fn unsubscribe(&self, emitter: ObjectId, callback: &Function) {
        {
            let mut watches = self.watches.borrow_mut();
            let Some(list) = watches
                .get_mut(&emitter)
                .map(|w| &mut w.callbacks)
                .filter(|list| !list.is_empty())
            else {
                error!(target: "wflua::lua", %emitter, "{}", LifetimeError::NoTracker { emitter });
                return;
            };
            let Some(pos) = list.iter().rposition(|f| same_function(f, callback)) else {
                error!(target: "wflua::lua", %emitter, "{}", LifetimeError::NotRegistered { emitter });
                return;
            };
            list.remove(pos);
        }
        self.unwatch_if_empty(emitter);
    }

    /// Keep `ud` alive while it stays attached to `emitter`.
    pub(crate) fn pin(&self, emitter: ObjectId, ud: &AnyUserData) {
        if !self.watch(emitter) {
            return;
        }
        if let Some(watch) = self.watches.borrow_mut().get_mut(&emitter) {
            watch.pinned.push(ud.clone());
        }
    }

    /// Release `ud` wherever it is pinned.
    pub(crate) fn unpin(&self, ud: &AnyUserData) {
        let target = ud.to_pointer();
        let emptied: Vec<ObjectId> = {
            let mut watches = self.watches.borrow_mut();
            watches
                .iter_mut()
                .filter_map(|(&emitter, watch)| {
                    let before = watch.pinned.len();
                    watch.pinned.retain(|p| p.to_pointer() != target);
                    (watch.pinned.len() != before && watch.is_empty()).then_some(emitter)
                })
                .collect()
        };
        for emitter in emptied {
            self.unwatch_if_empty(emitter);
        }
    }

    /// Release every connection pinned to `emitter`.
    pub(crate) fn unpin_all(&self, emitter: ObjectId) {
        let released = self
            .watches
            .borrow_mut()
            .get_mut(&emitter)
            .map(|watch| std::mem::take(&mut watch.pinned));
        if released.is_some() {
            self.unwatch_if_empty(emitter);
        }
    }

    fn fire(&self, emitter: ObjectId) {
        let Some(watch) = self.watches.borrow_mut().remove(&emitter) else {
            return;
        };
        drop(watch.pinned);
        for callback in watch.callbacks {
            if let Err(err) = callback.call::<()>(LightUserData(emitter.as_ptr())) {
                error!(target: "wflua::lua", %emitter, "Lifetime handler failed: {err}");
            }
        }
    }

    pub(crate) fn len(&self, emitter: ObjectId) -> usize {
        self.watches
            .borrow()
            .get(&emitter)
            .map_or(0, |w| w.callbacks.len())
    }

    /// Number of `wf.on` connections currently pinned.
    pub(crate) fn pinned(&self) -> usize {
        self.watches.borrow().values().map(|w| w.pinned.len()).sum()
    }

    /// Drop every bridge registration and every pin.
    pub(crate) fn clear(&self) {
        let emitters: Vec<ObjectId> = self
            .watches
            .borrow_mut()
            .drain()
            .map(|(e, _)| e)
            .collect();
        for emitter in emitters {
            self.bridge
                .lifetime_unsubscribe(emitter, lua_lifetime_trampoline);
        }
    }
}
