//! Script-level tests for the `wf` API against the headless compositor.

use std::rc::Rc;
use std::sync::{Arc, Mutex};

use mlua::{LightUserData, Table};
use wflua_bridge::Bridge;
use wflua_core::{Dimensions, Geometry, HeadlessCompositor, ObjectId, OptionValue, SignalData};
use wflua_lua::{LuaRuntime, RuntimeConfig, RuntimeError};

struct Fixture {
    host: Rc<HeadlessCompositor>,
    bridge: Bridge,
    runtime: LuaRuntime,
    output: ObjectId,
    view: ObjectId,
}

impl Fixture {
    fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    fn with_config(config: RuntimeConfig) -> Self {
        let host = Rc::new(HeadlessCompositor::new());
        let output = host.add_output("HEADLESS-1", Dimensions::new(1920, 1080));
        let view = host.add_view("foot", "Terminal", Some(output));
        let bridge = Bridge::new(host.clone());
        let runtime = LuaRuntime::new(bridge.clone(), host.clone(), config).unwrap();

        let globals = runtime.lua().globals();
        globals.set("view", LightUserData(view.as_ptr())).unwrap();
        globals.set("output", LightUserData(output.as_ptr())).unwrap();

        Self {
            host,
            bridge,
            runtime,
            output,
            view,
        }
    }

    fn run(&self, code: &str) {
        self.runtime.exec(code, "test").unwrap();
    }

    fn eval<T: mlua::FromLua>(&self, expr: &str) -> T {
        self.runtime
            .lua()
            .load(format!("return {expr}"))
            .eval()
            .unwrap()
    }

    fn emit_view(&self, signal: &str) {
        let data = SignalData::view(self.view).with_output(self.output);
        self.host.emit_data(self.view, signal, &data);
    }
}

#[derive(Clone, Default)]
struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl LogCapture {
    fn capture<R>(&self, f: impl FnOnce() -> R) -> R {
        let writer = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .with_max_level(tracing::Level::ERROR)
            .finish();
        tracing::subscriber::with_default(subscriber, f)
    }

    fn count(&self, needle: &str) -> usize {
        String::from_utf8_lossy(&self.0.lock().unwrap())
            .matches(needle)
            .count()
    }
}

#[test]
fn test_version_is_exposed() {
    let fx = Fixture::new();
    let version: String = fx.eval("wf.version");
    assert_eq!(version, env!("CARGO_PKG_VERSION"));
}

#[test]
fn test_on_delivers_payload_accessors() {
    let fx = Fixture::new();
    fx.run(
        r#"
        seen = {}
        wf.on(view, "title-changed", function(data)
            local v = wf.signaled_view(data)
            table.insert(seen, wf.view.title(v) .. "@" .. wf.output.to_string(wf.signaled_output(data)))
        end)
        "#,
    );

    fx.emit_view("title-changed");
    fx.emit_view("title-changed");

    let seen: Table = fx.eval("seen");
    assert_eq!(seen.raw_len(), 2);
    let first: String = seen.get(1).unwrap();
    assert!(first.starts_with("Terminal@output HEADLESS-1"));
    assert_eq!(fx.bridge.connections(fx.view, "title-changed").len(), 1);
}

#[test]
fn test_connections_fire_in_subscription_order() {
    let fx = Fixture::new();
    fx.run(
        r#"
        order = {}
        a = wf.connection(function() table.insert(order, "a") end)
        b = wf.connection(function() table.insert(order, "b") end)
        a:subscribe(view, "s")
        b:subscribe(view, "s")
        "#,
    );

    fx.emit_view("s");
    let order: String = fx.eval("table.concat(order, ',')");
    assert_eq!(order, "a,b");
    let state: String = fx.eval("a:state()");
    assert_eq!(state, "attached");
}

#[test]
fn test_unsubscribe_in_handler_skips_later_connection() {
    let fx = Fixture::new();
    fx.run(
        r#"
        order = {}
        b = wf.connection(function() table.insert(order, "b") end)
        a = wf.connection(function()
            table.insert(order, "a")
            b:unsubscribe(view)
        end)
        a:subscribe(view, "s")
        b:subscribe(view, "s")
        "#,
    );

    fx.emit_view("s");
    fx.emit_view("s");
    let order: String = fx.eval("table.concat(order, ',')");
    assert_eq!(order, "a,a");
    let state: String = fx.eval("b:state()");
    assert_eq!(state, "inert");
}

#[test]
fn test_destroy_own_connection_in_handler() {
    let fx = Fixture::new();
    fx.run(
        r#"
        count = 0
        conn = wf.on(view, "s", function()
            count = count + 1
            conn:destroy()
        end)
        "#,
    );

    fx.emit_view("s");
    fx.emit_view("s");
    let count: i64 = fx.eval("count");
    assert_eq!(count, 1);
    let state: String = fx.eval("conn:state()");
    assert_eq!(state, "destroyed");
    assert!(fx.bridge.stats().is_empty());
}

#[test]
fn test_handler_errors_are_logged_not_propagated() {
    let fx = Fixture::new();
    let logs = LogCapture::default();
    fx.run(
        r#"
        reached = false
        wf.on(view, "s", function() error("boom") end)
        wf.on(view, "s", function() reached = true end)
        "#,
    );

    logs.capture(|| fx.emit_view("s"));
    assert_eq!(logs.count("Signal handler failed"), 1);
    assert!(logs.count("boom") >= 1);
    let reached: bool = fx.eval("reached");
    assert!(reached);
}

#[test]
fn test_duplicate_subscribe_from_lua() {
    let fx = Fixture::new();
    let logs = LogCapture::default();
    logs.capture(|| {
        fx.run(
            r#"
            count = 0
            c = wf.connection(function() count = count + 1 end)
            c:subscribe(view, "mapped")
            c:subscribe(view, "mapped")
            "#,
        )
    });

    fx.emit_view("mapped");
    assert_eq!(logs.count("Subscribed to signal more than once!"), 1);
    let count: i64 = fx.eval("count");
    assert_eq!(count, 1);
}

#[test]
fn test_destroyed_connection_use_is_logged() {
    let fx = Fixture::new();
    let logs = LogCapture::default();
    logs.capture(|| {
        fx.run(
            r#"
            c = wf.connection(function() end)
            c:destroy()
            c:subscribe(view, "s")
            c:destroy()
            "#,
        )
    });
    assert_eq!(logs.count("Connection was destroyed!"), 1);
    assert!(fx.bridge.connections(fx.view, "s").is_empty());
}

#[test]
fn test_collected_connection_is_destroyed() {
    let fx = Fixture::new();
    fx.run(
        r#"
        do
            local c = wf.connection(function() end)
            c:subscribe(view, "s")
        end
        "#,
    );
    assert_eq!(fx.bridge.connections(fx.view, "s").len(), 1);

    fx.runtime.collect_garbage().unwrap();
    fx.runtime.collect_garbage().unwrap();
    assert!(fx.bridge.connections(fx.view, "s").is_empty());
    assert!(!fx.bridge.has_tracker(fx.view));
}

#[test]
fn test_on_connections_survive_collection() {
    let fx = Fixture::new();
    fx.run(r#"wf.on(view, "s", function() end)"#);
    fx.runtime.collect_garbage().unwrap();
    assert_eq!(fx.bridge.connections(fx.view, "s").len(), 1);
}

#[test]
fn test_on_connections_released_when_emitter_dies() {
    let fx = Fixture::new();
    for _ in 0..50 {
        let v = fx.host.add_view("popup", "Popup", Some(fx.output));
        fx.runtime
            .lua()
            .globals()
            .set("v", LightUserData(v.as_ptr()))
            .unwrap();
        fx.run(r#"wf.on(v, "title-changed", function() end)"#);
        assert_eq!(fx.runtime.pinned_connections(), 1);
        assert!(fx.host.destroy(v));
        assert_eq!(fx.runtime.pinned_connections(), 0);
    }

    fx.runtime.collect_garbage().unwrap();
    fx.runtime.collect_garbage().unwrap();
    assert!(fx.bridge.stats().is_empty());
}

#[test]
fn test_unsubscribe_all_releases_on_connections() {
    let fx = Fixture::new();
    fx.run(
        r#"
        c = wf.on(view, "s", function() end)
        wf.on(view, "t", function() end)
        wf.unsubscribe_all(view)
        "#,
    );
    assert_eq!(fx.runtime.pinned_connections(), 0);
    let state: String = fx.eval("c:state()");
    assert_eq!(state, "inert");
    assert!(!fx.bridge.has_tracker(fx.view));

    fx.run("c = nil");
    fx.runtime.collect_garbage().unwrap();
    fx.runtime.collect_garbage().unwrap();
    assert!(fx.bridge.stats().is_empty());
}

#[test]
fn test_unsubscribe_releases_on_connection() {
    let fx = Fixture::new();
    let logs = LogCapture::default();
    logs.capture(|| {
        fx.run(
            r#"
            a = wf.on(view, "s", function() end)
            b = wf.on(view, "t", function() end)
            a:unsubscribe(view)
            b:unsubscribe(output)
            "#,
        )
    });
    assert_eq!(logs.count("Unsubscribed from non-subscribed object!"), 1);
    assert_eq!(fx.runtime.pinned_connections(), 1);
    let states: String = fx.eval("a:state() .. ',' .. b:state()");
    assert_eq!(states, "inert,attached");

    fx.run("b:destroy()");
    assert_eq!(fx.runtime.pinned_connections(), 0);
    assert!(!fx.bridge.has_tracker(fx.view));
}

#[test]
fn test_self_capturing_handler_is_collected() {
    let fx = Fixture::new();
    fx.run(
        r#"
        do
            local c
            c = wf.connection(function() c:unsubscribe(view) end)
            c:subscribe(view, "s")
        end
        "#,
    );
    assert_eq!(fx.bridge.connections(fx.view, "s").len(), 1);

    fx.runtime.collect_garbage().unwrap();
    fx.runtime.collect_garbage().unwrap();
    assert!(fx.bridge.connections(fx.view, "s").is_empty());
    assert!(fx.bridge.stats().is_empty());
}

#[test]
fn test_self_capturing_handler_fires_while_referenced() {
    let fx = Fixture::new();
    fx.run(
        r#"
        fired = 0
        keep = wf.connection(function()
            fired = fired + 1
            keep:unsubscribe(view)
        end)
        keep:subscribe(view, "s")
        "#,
    );
    fx.runtime.collect_garbage().unwrap();

    fx.emit_view("s");
    fx.emit_view("s");
    let fired: i64 = fx.eval("fired");
    assert_eq!(fired, 1);
    let state: String = fx.eval("keep:state()");
    assert_eq!(state, "inert");
}

#[test]
fn test_lifetime_callbacks_fire_in_order_on_destroy() {
    let fx = Fixture::new();
    fx.run(
        r#"
        fired = {}
        wf.on(view, "s", function() table.insert(fired, "signal") end)
        wf.lifetime_subscribe(view, function(obj)
            table.insert(fired, "first")
            assert(obj == view)
        end)
        wf.lifetime_subscribe(view, function() table.insert(fired, "second") end)
        "#,
    );
    assert_eq!(fx.bridge.lifetime_subscription_count(fx.view), 1);
    assert_eq!(fx.runtime.lifetime_subscriptions(fx.view), 2);

    assert!(fx.host.destroy(fx.view));

    let fired: String = fx.eval("table.concat(fired, ',')");
    assert_eq!(fired, "first,second");
    assert!(!fx.bridge.has_tracker(fx.view));
    assert!(!fx.bridge.is_subscribed(fx.view));
    assert_eq!(fx.runtime.lifetime_subscriptions(fx.view), 0);
}

#[test]
fn test_lifetime_unsubscribe_removes_latest_equal_function() {
    let fx = Fixture::new();
    fx.run(
        r#"
        fired = 0
        function bump() fired = fired + 1 end
        wf.lifetime_subscribe(view, bump)
        wf.lifetime_subscribe(view, bump)
        wf.lifetime_unsubscribe(view, bump)
        "#,
    );
    assert_eq!(fx.runtime.lifetime_subscriptions(fx.view), 1);
    fx.host.destroy(fx.view);
    let fired: i64 = fx.eval("fired");
    assert_eq!(fired, 1);
}

#[test]
fn test_lifetime_round_trip_uninstalls_tracker() {
    let fx = Fixture::new();
    fx.run(
        r#"
        local function f() end
        wf.lifetime_subscribe(view, f)
        wf.lifetime_unsubscribe(view, f)
        "#,
    );
    assert!(!fx.bridge.has_tracker(fx.view));
    assert!(fx.bridge.stats().is_empty());
}

#[test]
fn test_lifetime_unsubscribe_errors_are_logged() {
    let fx = Fixture::new();
    let logs = LogCapture::default();
    logs.capture(|| {
        fx.run(
            r#"
            wf.lifetime_unsubscribe(view, function() end)
            wf.lifetime_subscribe(view, function() end)
            wf.lifetime_unsubscribe(view, print)
            "#,
        )
    });
    assert_eq!(logs.count("Unsubscribed from lifetime of an untracked object!"), 1);
    assert_eq!(logs.count("Lifetime callback not registered!"), 1);
}

#[test]
fn test_unsubscribe_all_makes_connections_inert() {
    let fx = Fixture::new();
    fx.run(
        r#"
        a = wf.connection(function() end)
        b = wf.connection(function() end)
        a:subscribe(view, "s")
        b:subscribe(view, "t")
        wf.unsubscribe_all(view)
        "#,
    );
    let states: String = fx.eval("a:state() .. ',' .. b:state()");
    assert_eq!(states, "inert,inert");
    assert!(!fx.bridge.has_tracker(fx.view));
}

#[test]
fn test_set_option_results() {
    let fx = Fixture::new();
    fx.run(
        r#"
        ok = wf.set_option("core", "preferred_decoration_mode", "server")
        _, no_section = wf.set_option("nope", "x", "1")
        _, no_option = wf.set_option("core", "nope", "1")
        _, bad_value = wf.set_option("core", "vwidth", "wide")
        numeric = wf.set_option("core", "vheight", 4)
        "#,
    );

    let ok: bool = fx.eval("ok");
    assert!(ok);
    let codes: String = fx.eval("no_section .. ',' .. no_option .. ',' .. bad_value");
    assert_eq!(
        codes,
        "invalid_option_section,invalid_option,invalid_option_value"
    );
    let numeric: bool = fx.eval("numeric");
    assert!(numeric);
    assert_eq!(
        fx.host.option("core", "preferred_decoration_mode"),
        Some(OptionValue::String("server".into()))
    );
    assert_eq!(fx.host.option("core", "vheight"), Some(OptionValue::Int(4)));
}

#[test]
fn test_view_and_output_accessors() {
    let fx = Fixture::new();
    fx.run(
        r#"
        wf.view.set_geometry(view, { x = 10, y = 20, width = 300, height = 200 })
        geo = wf.view.wm_geometry(view)
        size = wf.output.screen_size(wf.view.output(view))
        app = wf.view.app_id(view)
        "#,
    );

    let geo: Table = fx.eval("geo");
    assert_eq!(geo.get::<i32>("x").unwrap(), 10);
    assert_eq!(geo.get::<i32>("width").unwrap(), 300);
    let width: i32 = fx.eval("size.width");
    assert_eq!(width, 1920);
    let app: String = fx.eval("app");
    assert_eq!(app, "foot");
}

#[test]
fn test_core_and_layout_accessors() {
    let fx = Fixture::new();
    fx.host.add_output("HEADLESS-2", Dimensions::new(1280, 1024));
    fx.run(
        r#"
        pid = wf.core.run("foot --server")
        wf.core.warp_cursor({ x = 2000.5, y = 10 })
        count = wf.layout.num_outputs()
        second = wf.layout.find_output("HEADLESS-2")
        at = wf.layout.output_at(2000, 10)
        outputs = wf.layout.outputs()
        wf.core.hide_cursor()
        "#,
    );

    let pid: i32 = fx.eval("pid");
    assert!(pid > 0);
    assert_eq!(fx.host.commands().len(), 1);
    let count: u32 = fx.eval("count");
    assert_eq!(count, 2);
    let same: bool = fx.eval("second == at");
    assert!(same);
    let listed: usize = fx.eval("#outputs");
    assert_eq!(listed, 2);
    assert!(fx.host.cursor_hidden());
    assert_eq!(fx.host.cursor().x, 2000.5);
}

#[test]
fn test_missing_object_is_a_script_error() {
    let fx = Fixture::new();
    let err = fx
        .runtime
        .exec("wf.view.title(wf.core.touch_focus_view())", "test")
        .unwrap_err();
    assert!(matches!(err, RuntimeError::LoadError { .. }));
}

#[test]
fn test_set_geometry_requires_full_table() {
    let fx = Fixture::new();
    let err = fx
        .runtime
        .exec("wf.view.set_geometry(view, { x = 1 })", "geo")
        .unwrap_err();
    assert!(err.to_string().contains("geo"));
    assert_eq!(
        fx.eval::<Table>("wf.view.wm_geometry(view)").get::<i32>("x").unwrap(),
        Geometry::default().x
    );
}

#[test]
fn test_entrypoint_and_runtime_path() {
    let work = tempfile::tempdir().unwrap();
    let runtime_dir = tempfile::tempdir().unwrap();
    std::fs::write(
        runtime_dir.path().join("helper.lua"),
        "return { greet = function() return 'hi' end }",
    )
    .unwrap();
    std::fs::write(
        work.path().join("init.lua"),
        "greeting = require('helper').greet()",
    )
    .unwrap();

    let config = RuntimeConfig::builder()
        .working_dir(Some(work.path().to_path_buf()))
        .runtime_dir(runtime_dir.path())
        .build()
        .unwrap();
    let fx = Fixture::with_config(config);

    let ran = fx.runtime.run_entrypoint().unwrap();
    assert_eq!(ran, Some(work.path().join("init.lua")));
    let greeting: String = fx.eval("greeting");
    assert_eq!(greeting, "hi");
}

#[test]
fn test_missing_entrypoint() {
    let work = tempfile::tempdir().unwrap();
    let config = RuntimeConfig::builder()
        .working_dir(Some(work.path().to_path_buf()))
        .build()
        .unwrap();
    let fx = Fixture::with_config(config);
    let err = fx.runtime.run_entrypoint().unwrap_err();
    assert!(matches!(err, RuntimeError::NoEntrypoint { .. }));
}

#[test]
fn test_disabled_runtime_skips_entrypoint() {
    let config = RuntimeConfig::builder().enabled(false).build().unwrap();
    let fx = Fixture::with_config(config);
    assert_eq!(fx.runtime.run_entrypoint().unwrap(), None);
}

#[test]
fn test_check_reports_syntax_errors() {
    assert!(LuaRuntime::check("local x = 1", "ok.lua").is_ok());
    let err = LuaRuntime::check("local = ", "bad.lua").unwrap_err();
    assert!(err.to_string().contains("bad.lua"));
}

#[test]
fn test_dropping_runtime_releases_everything() {
    let Fixture {
        host,
        bridge,
        runtime,
        view,
        ..
    } = Fixture::new();
    runtime
        .exec(
            r#"
            wf.on(view, "a", function() end)
            keep = wf.connection(function() end)
            keep:subscribe(view, "b")
            wf.lifetime_subscribe(view, function() end)
            "#,
            "test",
        )
        .unwrap();
    assert!(!bridge.stats().is_empty());

    drop(runtime);

    assert!(bridge.stats().is_empty());
    assert_eq!(host.listener_count(view), 0);
    assert!(bridge.shutdown().is_empty());
}
