//! Rust-to-Lua bindings for the `wf` API.

use std::rc::Rc;

use mlua::{Function, LightUserData, Lua, LuaSerdeExt, Table, Value as LuaValue};
use wflua_bridge::{Bridge, ConnectionState};
use wflua_core::{
    ErrorCode, Geometry, Host, InputEventProcessingMode, ObjectId, PlainActivatorData, Pointf,
};

use super::handlers::{LifetimeHub, LuaConnection, light, object};
use crate::error::RuntimeResult;

/// Create the top-level `wf` table.
pub fn create_wf_api(
    lua: &Lua,
    bridge: &Bridge,
    host: &Rc<dyn Host>,
    hub: &Rc<LifetimeHub>,
) -> RuntimeResult<Table> {
    let wf = lua.create_table()?;
    wf.set("version", env!("CARGO_PKG_VERSION"))?;
    wf.set("log", create_log_api(lua)?)?;

    // wf.set_option(section, option, value) -> true | false, code
    let store = Rc::clone(host);
    let set_option = lua.create_function(
        move |_, (section, option, value): (String, String, LuaValue)| {
            let value = match value {
                LuaValue::String(s) => s.to_string_lossy(),
                LuaValue::Boolean(b) => b.to_string(),
                LuaValue::Integer(i) => i.to_string(),
                LuaValue::Number(n) => n.to_string(),
                other => {
                    return Err(mlua::Error::runtime(format!(
                        "option value must be a string, number or boolean, got {}",
                        other.type_name()
                    )));
                }
            };
            Ok(match store.set_option_str(&section, &option, &value) {
                Ok(()) => (true, None),
                Err(err) => (false, Some(ErrorCode::from(&err).name())),
            })
        },
    )?;
    wf.set("set_option", set_option)?;

    // wf.connection(fn) -> connection
    let (b, h) = (bridge.clone(), Rc::clone(hub));
    let connection = lua.create_function(move |lua, callback: Function| {
        LuaConnection::create(lua, b.clone(), Rc::clone(&h), callback)
    })?;
    wf.set("connection", connection)?;

    // wf.on(emitter, signal, fn) -> connection, kept alive while attached
    let (b, h) = (bridge.clone(), Rc::clone(hub));
    let on = lua.create_function(
        move |lua, (emitter, signal, callback): (LightUserData, String, Function)| {
            let emitter = object(emitter)?;
            let ud = LuaConnection::create(lua, b.clone(), Rc::clone(&h), callback)?;
            let attached = {
                let conn = ud.borrow::<LuaConnection>()?;
                conn.subscribe(emitter, &signal);
                conn.state() == ConnectionState::Attached
            };
            if attached {
                h.pin(emitter, &ud);
            }
            Ok(ud)
        },
    )?;
    wf.set("on", on)?;

    let (b, h) = (bridge.clone(), Rc::clone(hub));
    let unsubscribe_all = lua.create_function(move |_, emitter: LightUserData| {
        let emitter = object(emitter)?;
        b.unsubscribe_all(emitter);
        h.unpin_all(emitter);
        Ok(())
    })?;
    wf.set("unsubscribe_all", unsubscribe_all)?;

    let h = Rc::clone(hub);
    let lifetime_subscribe =
        lua.create_function(move |_, (target, callback): (LightUserData, Function)| {
            h.subscribe(object(target)?, callback);
            Ok(())
        })?;
    wf.set("lifetime_subscribe", lifetime_subscribe)?;

    let h = Rc::clone(hub);
    let lifetime_unsubscribe =
        lua.create_function(move |_, (target, callback): (LightUserData, Function)| {
            h.unsubscribe(object(target)?, &callback);
            Ok(())
        })?;
    wf.set("lifetime_unsubscribe", lifetime_unsubscribe)?;

    let h = Rc::clone(host);
    let signaled_view = lua.create_function(move |_, payload: LightUserData| {
        Ok(light(h.signaled_view(payload.0)))
    })?;
    wf.set("signaled_view", signaled_view)?;

    let h = Rc::clone(host);
    let signaled_output = lua.create_function(move |_, payload: LightUserData| {
        Ok(light(h.signaled_output(payload.0)))
    })?;
    wf.set("signaled_output", signaled_output)?;

    let h = Rc::clone(host);
    let key_event = lua.create_function(move |_, payload: LightUserData| {
        let event = h.signaled_keyboard_key_event(payload.0);
        Ok((!event.is_null()).then_some(LightUserData(event)))
    })?;
    wf.set("signaled_keyboard_key_event", key_event)?;

    let h = Rc::clone(host);
    let key_mode = lua.create_function(move |lua, (payload, mode): (LightUserData, LuaValue)| {
        let mode: InputEventProcessingMode = lua.from_value(mode)?;
        h.set_signaled_keyboard_key_mode(payload.0, mode);
        Ok(())
    })?;
    wf.set("set_signaled_keyboard_key_mode", key_mode)?;

    wf.set("view", create_view_api(lua, host)?)?;
    wf.set("output", create_output_api(lua, host)?)?;
    wf.set("core", create_core_api(lua, host)?)?;
    wf.set("layout", create_layout_api(lua, host)?)?;

    Ok(wf)
}

/// Create the `wf.log` namespace.
fn create_log_api(lua: &Lua) -> RuntimeResult<Table> {
    let log = lua.create_table()?;

    let error = lua.create_function(|_, msg: String| {
        tracing::error!(target: "wflua::script", "{}", msg);
        Ok(())
    })?;
    log.set("error", error)?;

    let warn = lua.create_function(|_, msg: String| {
        tracing::warn!(target: "wflua::script", "{}", msg);
        Ok(())
    })?;
    log.set("warn", warn)?;

    let info = lua.create_function(|_, msg: String| {
        tracing::info!(target: "wflua::script", "{}", msg);
        Ok(())
    })?;
    log.set("info", info)?;

    let debug = lua.create_function(|_, msg: String| {
        tracing::debug!(target: "wflua::script", "{}", msg);
        Ok(())
    })?;
    log.set("debug", debug)?;

    Ok(log)
}

/// Create the `wf.view` namespace.
pub fn create_view_api(lua: &Lua, host: &Rc<dyn Host>) -> RuntimeResult<Table> {
    let view = lua.create_table()?;

    let h = Rc::clone(host);
    let to_string =
        lua.create_function(move |_, v: LightUserData| Ok(h.view_to_string(object(v)?)))?;
    view.set("to_string", to_string)?;

    let h = Rc::clone(host);
    let title = lua.create_function(move |_, v: LightUserData| Ok(h.view_title(object(v)?)))?;
    view.set("title", title)?;

    let h = Rc::clone(host);
    let app_id = lua.create_function(move |_, v: LightUserData| Ok(h.view_app_id(object(v)?)))?;
    view.set("app_id", app_id)?;

    let h = Rc::clone(host);
    let wm_geometry = lua.create_function(move |lua, v: LightUserData| {
        lua.to_value(&h.view_wm_geometry(object(v)?))
    })?;
    view.set("wm_geometry", wm_geometry)?;

    let h = Rc::clone(host);
    let output_geometry = lua.create_function(move |lua, v: LightUserData| {
        lua.to_value(&h.view_output_geometry(object(v)?))
    })?;
    view.set("output_geometry", output_geometry)?;

    let h = Rc::clone(host);
    let bounding_box = lua.create_function(move |lua, v: LightUserData| {
        lua.to_value(&h.view_bounding_box(object(v)?))
    })?;
    view.set("bounding_box", bounding_box)?;

    let h = Rc::clone(host);
    let output =
        lua.create_function(move |_, v: LightUserData| Ok(light(h.view_output(object(v)?))))?;
    view.set("output", output)?;

    let h = Rc::clone(host);
    let set_geometry =
        lua.create_function(move |lua, (v, geo): (LightUserData, LuaValue)| {
            let geo: Geometry = lua.from_value(geo)?;
            h.view_set_geometry(object(v)?, geo);
            Ok(())
        })?;
    view.set("set_geometry", set_geometry)?;

    Ok(view)
}

/// Create the `wf.output` namespace.
pub fn create_output_api(lua: &Lua, host: &Rc<dyn Host>) -> RuntimeResult<Table> {
    let output = lua.create_table()?;

    let h = Rc::clone(host);
    let to_string =
        lua.create_function(move |_, o: LightUserData| Ok(h.output_to_string(object(o)?)))?;
    output.set("to_string", to_string)?;

    let h = Rc::clone(host);
    let screen_size = lua.create_function(move |lua, o: LightUserData| {
        lua.to_value(&h.output_screen_size(object(o)?))
    })?;
    output.set("screen_size", screen_size)?;

    let h = Rc::clone(host);
    let relative_geometry = lua.create_function(move |lua, o: LightUserData| {
        lua.to_value(&h.output_relative_geometry(object(o)?))
    })?;
    output.set("relative_geometry", relative_geometry)?;

    let h = Rc::clone(host);
    let layout_geometry = lua.create_function(move |lua, o: LightUserData| {
        lua.to_value(&h.output_layout_geometry(object(o)?))
    })?;
    output.set("layout_geometry", layout_geometry)?;

    let h = Rc::clone(host);
    let workarea = lua.create_function(move |lua, o: LightUserData| {
        lua.to_value(&h.output_workarea(object(o)?))
    })?;
    output.set("workarea", workarea)?;

    let h = Rc::clone(host);
    let ensure_pointer =
        lua.create_function(move |_, (o, center): (LightUserData, Option<bool>)| {
            h.output_ensure_pointer(object(o)?, center.unwrap_or(false));
            Ok(())
        })?;
    output.set("ensure_pointer", ensure_pointer)?;

    let h = Rc::clone(host);
    let cursor_position = lua.create_function(move |lua, o: LightUserData| {
        lua.to_value(&h.output_cursor_position(object(o)?))
    })?;
    output.set("cursor_position", cursor_position)?;

    // wf.output.call_plugin_plain(o, activator, {source = "plugin", activation_data = 0}?)
    let h = Rc::clone(host);
    let call_plugin_plain = lua.create_function(
        move |lua, (o, activator, data): (LightUserData, String, Option<LuaValue>)| {
            let data: PlainActivatorData = match data {
                Some(value) => lua.from_value(value)?,
                None => PlainActivatorData::default(),
            };
            Ok(h.output_call_plugin_plain(object(o)?, &activator, &data))
        },
    )?;
    output.set("call_plugin_plain", call_plugin_plain)?;

    let h = Rc::clone(host);
    let top_view = lua
        .create_function(move |_, o: LightUserData| Ok(light(h.output_top_view(object(o)?))))?;
    output.set("top_view", top_view)?;

    let h = Rc::clone(host);
    let active_view = lua.create_function(move |_, o: LightUserData| {
        Ok(light(h.output_active_view(object(o)?)))
    })?;
    output.set("active_view", active_view)?;

    let h = Rc::clone(host);
    let focus_view = lua.create_function(
        move |_, (o, v, raise): (LightUserData, Option<LightUserData>, Option<bool>)| {
            h.output_focus_view(object(o)?, optional(v), raise.unwrap_or(false));
            Ok(())
        },
    )?;
    output.set("focus_view", focus_view)?;

    let h = Rc::clone(host);
    let ensure_visible =
        lua.create_function(move |_, (o, v): (LightUserData, LightUserData)| {
            Ok(h.output_ensure_visible(object(o)?, object(v)?))
        })?;
    output.set("ensure_visible", ensure_visible)?;

    Ok(output)
}

fn optional(ud: Option<LightUserData>) -> Option<ObjectId> {
    ud.and_then(|ud| ObjectId::from_ptr(ud.0))
}

/// Create the `wf.core` namespace. Functions act on the core singleton.
pub fn create_core_api(lua: &Lua, host: &Rc<dyn Host>) -> RuntimeResult<Table> {
    let core = lua.create_table()?;

    let h = Rc::clone(host);
    let get = lua.create_function(move |_, ()| Ok(LightUserData(h.core().as_ptr())))?;
    core.set("get", get)?;

    let h = Rc::clone(host);
    let to_string = lua.create_function(move |_, ()| Ok(h.core_to_string(h.core())))?;
    core.set("to_string", to_string)?;

    let h = Rc::clone(host);
    let current_seat = lua.create_function(move |_, ()| {
        let seat = h.current_seat(h.core());
        Ok((!seat.is_null()).then_some(LightUserData(seat)))
    })?;
    core.set("current_seat", current_seat)?;

    let h = Rc::clone(host);
    let set_cursor = lua.create_function(move |_, name: String| {
        h.set_cursor(h.core(), &name);
        Ok(())
    })?;
    core.set("set_cursor", set_cursor)?;

    let h = Rc::clone(host);
    let unhide_cursor = lua.create_function(move |_, ()| {
        h.unhide_cursor(h.core());
        Ok(())
    })?;
    core.set("unhide_cursor", unhide_cursor)?;

    let h = Rc::clone(host);
    let hide_cursor = lua.create_function(move |_, ()| {
        h.hide_cursor(h.core());
        Ok(())
    })?;
    core.set("hide_cursor", hide_cursor)?;

    let h = Rc::clone(host);
    let warp_cursor = lua.create_function(move |lua, point: LuaValue| {
        let point: Pointf = lua.from_value(point)?;
        h.warp_cursor(h.core(), point);
        Ok(())
    })?;
    core.set("warp_cursor", warp_cursor)?;

    let h = Rc::clone(host);
    let cursor_position =
        lua.create_function(move |lua, ()| lua.to_value(&h.core_cursor_position(h.core())))?;
    core.set("cursor_position", cursor_position)?;

    let h = Rc::clone(host);
    let cursor_focus_view =
        lua.create_function(move |_, ()| Ok(light(h.cursor_focus_view(h.core()))))?;
    core.set("cursor_focus_view", cursor_focus_view)?;

    let h = Rc::clone(host);
    let touch_focus_view =
        lua.create_function(move |_, ()| Ok(light(h.touch_focus_view(h.core()))))?;
    core.set("touch_focus_view", touch_focus_view)?;

    let h = Rc::clone(host);
    let view_at = lua.create_function(move |lua, point: LuaValue| {
        let point: Pointf = lua.from_value(point)?;
        Ok(light(h.view_at(h.core(), point)))
    })?;
    core.set("view_at", view_at)?;

    let h = Rc::clone(host);
    let set_active_view = lua.create_function(move |_, v: Option<LightUserData>| {
        h.set_active_view(h.core(), optional(v));
        Ok(())
    })?;
    core.set("set_active_view", set_active_view)?;

    let h = Rc::clone(host);
    let focus_view = lua.create_function(move |_, v: Option<LightUserData>| {
        h.core_focus_view(h.core(), optional(v));
        Ok(())
    })?;
    core.set("focus_view", focus_view)?;

    let h = Rc::clone(host);
    let focus_output = lua.create_function(move |_, o: Option<LightUserData>| {
        h.focus_output(h.core(), optional(o));
        Ok(())
    })?;
    core.set("focus_output", focus_output)?;

    let h = Rc::clone(host);
    let active_output = lua.create_function(move |_, ()| Ok(light(h.active_output(h.core()))))?;
    core.set("active_output", active_output)?;

    let h = Rc::clone(host);
    let move_view_to_output = lua.create_function(
        move |_, (v, o, reconfigure): (LightUserData, LightUserData, Option<bool>)| {
            h.move_view_to_output(h.core(), object(v)?, object(o)?, reconfigure.unwrap_or(true));
            Ok(())
        },
    )?;
    core.set("move_view_to_output", move_view_to_output)?;

    let h = Rc::clone(host);
    let wayland_display = lua.create_function(move |_, ()| Ok(h.wayland_display(h.core())))?;
    core.set("wayland_display", wayland_display)?;

    let h = Rc::clone(host);
    let xwayland_display = lua.create_function(move |_, ()| Ok(h.xwayland_display(h.core())))?;
    core.set("xwayland_display", xwayland_display)?;

    let h = Rc::clone(host);
    let run = lua.create_function(move |_, command: String| Ok(h.run(h.core(), &command)))?;
    core.set("run", run)?;

    let h = Rc::clone(host);
    let shutdown = lua.create_function(move |_, ()| {
        h.shutdown(h.core());
        Ok(())
    })?;
    core.set("shutdown", shutdown)?;

    let h = Rc::clone(host);
    let output_layout =
        lua.create_function(move |_, ()| Ok(LightUserData(h.output_layout(h.core()).as_ptr())))?;
    core.set("output_layout", output_layout)?;

    let h = Rc::clone(host);
    let event_loop = lua.create_function(move |_, ()| {
        let event_loop = h.event_loop(h.core());
        Ok((!event_loop.is_null()).then_some(LightUserData(event_loop)))
    })?;
    core.set("event_loop", event_loop)?;

    Ok(core)
}

/// Create the `wf.layout` namespace. Functions act on the core's output layout.
pub fn create_layout_api(lua: &Lua, host: &Rc<dyn Host>) -> RuntimeResult<Table> {
    let layout = lua.create_table()?;

    let h = Rc::clone(host);
    let output_at = lua.create_function(move |_, (x, y): (i32, i32)| {
        let layout = h.output_layout(h.core());
        Ok(light(h.output_at(layout, x, y)))
    })?;
    layout.set("output_at", output_at)?;

    // wf.layout.output_coords_at(point) -> output, closest
    let h = Rc::clone(host);
    let output_coords_at = lua.create_function(move |lua, origin: LuaValue| {
        let origin: Pointf = lua.from_value(origin)?;
        let (output, closest) = h.output_coords_at(h.output_layout(h.core()), origin);
        Ok((light(output), lua.to_value(&closest)?))
    })?;
    layout.set("output_coords_at", output_coords_at)?;

    let h = Rc::clone(host);
    let num_outputs =
        lua.create_function(move |_, ()| Ok(h.num_outputs(h.output_layout(h.core()))))?;
    layout.set("num_outputs", num_outputs)?;

    let h = Rc::clone(host);
    let next_output = lua.create_function(move |_, prev: Option<LightUserData>| {
        Ok(light(h.next_output(h.output_layout(h.core()), optional(prev))))
    })?;
    layout.set("next_output", next_output)?;

    let h = Rc::clone(host);
    let find_output = lua.create_function(move |_, name: String| {
        Ok(light(h.find_output(h.output_layout(h.core()), &name)))
    })?;
    layout.set("find_output", find_output)?;

    // wf.layout.outputs() -> { output, ... } in layout order
    let h = Rc::clone(host);
    let outputs = lua.create_function(move |lua, ()| {
        let layout = h.output_layout(h.core());
        let list = lua.create_table()?;
        let count = h.num_outputs(layout);
        let mut current = None;
        for i in 1..=count {
            current = h.next_output(layout, current);
            let Some(output) = current else { break };
            list.raw_set(i, LightUserData(output.as_ptr()))?;
        }
        Ok(list)
    })?;
    layout.set("outputs", outputs)?;

    Ok(layout)
}
