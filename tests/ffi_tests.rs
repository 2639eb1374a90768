//! The `wf_*` C ABI, driven in-process against the headless compositor.

use std::cell::RefCell;
use std::ffi::{CStr, CString, c_char, c_void};
use std::ptr;
use std::rc::Rc;

use wflua::ffi::config::wf_set_option_str;
use wflua::ffi::compositor::{wf_Core_get_output_layout, wf_Core_run, wf_get_core};
use wflua::ffi::layout::{
    wf_OutputLayout_find_output, wf_OutputLayout_get_next_output,
    wf_OutputLayout_get_num_outputs, wf_OutputLayout_get_output_coords_at,
};
use wflua::ffi::lifetime::{wf_lifetime_subscribe, wf_lifetime_unsubscribe};
use wflua::ffi::output::wf_Output_get_screen_size;
use wflua::ffi::signals::{
    wf_create_signal_connection, wf_destroy_signal_connection, wf_get_signaled_view,
    wf_signal_subscribe, wf_signal_unsubscribe, wf_signal_unsubscribe_all,
};
use wflua::ffi::view::{wf_View_get_app_id, wf_View_get_title, wf_View_get_wm_geometry};
use wflua::{Connection, ConnectionState, ErrorCode, HeadlessCompositor, ObjectId, RuntimeConfig};
use wflua_core::{Dimensions, OptionValue, Pointf, SignalData};

thread_local! {
    static FIRED: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
    static VIEWS: RefCell<Vec<*mut c_void>> = const { RefCell::new(Vec::new()) };
}

unsafe extern "C" fn record(_signal_data: *mut c_void, data1: *mut c_void, _data2: *mut c_void) {
    FIRED.with_borrow_mut(|fired| fired.push(data1.addr()));
}

unsafe extern "C" fn record_view(signal_data: *mut c_void, _data1: *mut c_void, _data2: *mut c_void) {
    let view = wf_get_signaled_view(signal_data);
    VIEWS.with_borrow_mut(|views| views.push(view));
}

unsafe extern "C" fn record_death(emitter: *mut c_void, data: *mut c_void) {
    FIRED.with_borrow_mut(|fired| fired.push(data.addr()));
    VIEWS.with_borrow_mut(|views| views.push(emitter));
}

fn fired() -> Vec<usize> {
    FIRED.with_borrow_mut(std::mem::take)
}

fn tag(n: usize) -> *mut c_void {
    ptr::without_provenance_mut(n)
}

struct Fixture {
    host: Rc<HeadlessCompositor>,
    output: ObjectId,
    view: ObjectId,
}

impl Fixture {
    fn new() -> Self {
        let host = Rc::new(HeadlessCompositor::new());
        let output = host.add_output("HEADLESS-1", Dimensions::new(1920, 1080));
        let view = host.add_view("foot", "Terminal", Some(output));
        let config = RuntimeConfig {
            enabled: false,
            ..RuntimeConfig::default()
        };
        wflua::init(Rc::clone(&host), config);
        Self { host, output, view }
    }

    fn emit(&self, signal: &str) {
        let data = SignalData::view(self.view).with_output(self.output);
        self.host.emit_data(self.view, signal, &data);
    }
}

impl Drop for Fixture {
    fn drop(&mut self) {
        wflua::fini();
    }
}

fn c(s: &str) -> CString {
    CString::new(s).unwrap()
}

fn read(p: *const c_char) -> String {
    assert!(!p.is_null());
    unsafe { CStr::from_ptr(p) }.to_str().unwrap().to_string()
}

fn connect(emitter: ObjectId, signal: &str, n: usize) -> *mut Connection {
    let signal = c(signal);
    unsafe {
        let conn = wf_create_signal_connection(Some(record), tag(n), ptr::null_mut());
        assert!(!conn.is_null());
        wf_signal_subscribe(emitter.as_ptr(), signal.as_ptr(), conn);
        conn
    }
}

#[test]
fn test_set_option_error_codes() {
    let fx = Fixture::new();
    let set = |section: &str, option: &str, value: &str| {
        let (s, o, v) = (c(section), c(option), c(value));
        unsafe { wf_set_option_str(s.as_ptr(), o.as_ptr(), v.as_ptr()) }
    };

    assert_eq!(set("core", "vheight", "4"), ErrorCode::Ok);
    assert_eq!(fx.host.option("core", "vheight"), Some(OptionValue::Int(4)));
    assert_eq!(set("core", "vwidth", "wide"), ErrorCode::InvalidOptionValue);
    assert_eq!(fx.host.option("core", "vwidth"), Some(OptionValue::Int(3)));
    assert_eq!(set("nope", "vwidth", "3"), ErrorCode::InvalidOptionSection);
    assert_eq!(set("core", "nope", "3"), ErrorCode::InvalidOption);

    let section = c("core");
    let code = unsafe { wf_set_option_str(section.as_ptr(), ptr::null(), ptr::null()) };
    assert_eq!(code, ErrorCode::InvalidOption);
}

#[test]
fn test_fan_out_in_subscription_order() {
    let fx = Fixture::new();
    let conns: Vec<_> = (1..=3).map(|n| connect(fx.view, "title-changed", n)).collect();

    fx.emit("title-changed");
    assert_eq!(fired(), vec![1, 2, 3]);

    unsafe { wf_signal_unsubscribe(fx.view.as_ptr(), conns[1]) };
    assert_eq!(unsafe { (*conns[1]).state() }, ConnectionState::Inert);
    fx.emit("title-changed");
    assert_eq!(fired(), vec![1, 3]);

    fx.emit("app-id-changed");
    assert!(fired().is_empty());

    for conn in conns {
        unsafe { wf_destroy_signal_connection(conn) };
    }
    assert_eq!(fx.host.listener_count(fx.view), 0);
}

#[test]
fn test_payload_extractors_in_callback() {
    let fx = Fixture::new();
    let signal = c("geometry-changed");
    let conn = unsafe { wf_create_signal_connection(Some(record_view), ptr::null_mut(), ptr::null_mut()) };
    unsafe { wf_signal_subscribe(fx.view.as_ptr(), signal.as_ptr(), conn) };

    fx.emit("geometry-changed");
    let views = VIEWS.with_borrow_mut(std::mem::take);
    assert_eq!(views, vec![fx.view.as_ptr()]);

    unsafe { wf_destroy_signal_connection(conn) };
}

#[test]
fn test_unsubscribe_all_leaves_connections_inert() {
    let fx = Fixture::new();
    let a = connect(fx.view, "title-changed", 1);
    let b = connect(fx.view, "app-id-changed", 2);

    wf_signal_unsubscribe_all(fx.view.as_ptr());
    fx.emit("title-changed");
    fx.emit("app-id-changed");
    assert!(fired().is_empty());

    unsafe {
        assert_eq!((*a).state(), ConnectionState::Inert);
        assert_eq!((*b).state(), ConnectionState::Inert);
        let signal = c("title-changed");
        wf_signal_subscribe(fx.view.as_ptr(), signal.as_ptr(), a);
    }
    fx.emit("title-changed");
    assert_eq!(fired(), vec![1]);

    unsafe {
        wf_destroy_signal_connection(a);
        wf_destroy_signal_connection(b);
    }
}

#[test]
fn test_lifetime_callbacks_fire_on_destroy() {
    let fx = Fixture::new();
    let conn = connect(fx.view, "title-changed", 9);
    unsafe {
        wf_lifetime_subscribe(fx.view.as_ptr(), Some(record_death), tag(1));
        wf_lifetime_subscribe(fx.view.as_ptr(), Some(record_death), tag(2));
    }

    assert!(fx.host.destroy(fx.view));
    assert_eq!(fired(), vec![1, 2]);
    let emitters = VIEWS.with_borrow_mut(std::mem::take);
    assert_eq!(emitters, vec![fx.view.as_ptr(), fx.view.as_ptr()]);
    assert_eq!(unsafe { (*conn).state() }, ConnectionState::Inert);

    unsafe { wf_destroy_signal_connection(conn) };
}

#[test]
fn test_lifetime_unsubscribe_stops_notification() {
    let fx = Fixture::new();
    unsafe { wf_lifetime_subscribe(fx.view.as_ptr(), Some(record_death), tag(1)) };
    wf_lifetime_unsubscribe(fx.view.as_ptr(), Some(record_death));

    let plugin = wflua::plugin::current().unwrap();
    assert!(plugin.bridge().stats().is_empty());

    fx.host.destroy(fx.view);
    assert!(fired().is_empty());
}

#[test]
fn test_string_survives_non_string_calls() {
    let fx = Fixture::new();
    let title = wf_View_get_title(fx.view.as_ptr());
    let geometry = wf_View_get_wm_geometry(fx.view.as_ptr());
    assert_eq!(geometry.width, 640);
    assert_eq!(read(title), "Terminal");

    let app_id = wf_View_get_app_id(fx.view.as_ptr());
    assert_eq!(read(app_id), "foot");
}

#[test]
fn test_core_and_layout_queries() {
    let fx = Fixture::new();
    let second = fx.host.add_output("HEADLESS-2", Dimensions::new(1280, 720));

    let core = wf_get_core();
    assert!(!core.is_null());
    let layout = wf_Core_get_output_layout(core);
    assert_eq!(wf_OutputLayout_get_num_outputs(layout), 2);

    let first = wf_OutputLayout_get_next_output(layout, ptr::null_mut());
    assert_eq!(first, fx.output.as_ptr());
    assert_eq!(wf_OutputLayout_get_next_output(layout, first), second.as_ptr());

    let name = c("HEADLESS-2");
    assert_eq!(unsafe { wf_OutputLayout_find_output(layout, name.as_ptr()) }, second.as_ptr());

    let mut closest = Pointf::default();
    let output = unsafe {
        wf_OutputLayout_get_output_coords_at(layout, Pointf::new(-50.0, 20.0), &mut closest)
    };
    assert_eq!(output, fx.output.as_ptr());
    assert_eq!(closest, Pointf::new(0.0, 20.0));

    let size = wf_Output_get_screen_size(second.as_ptr());
    assert_eq!((size.width, size.height), (1280, 720));

    let command = c("foot --server");
    let pid = unsafe { wf_Core_run(core, command.as_ptr()) };
    assert!(pid > 0);
    assert_eq!(fx.host.commands()[0].command, "foot --server");
}

#[test]
fn test_null_objects_return_neutral_values() {
    let _fx = Fixture::new();
    assert!(wf_View_get_title(ptr::null_mut()).is_null());
    assert_eq!(wf_View_get_wm_geometry(ptr::null_mut()), Default::default());
    assert!(unsafe { wf_create_signal_connection(None, ptr::null_mut(), ptr::null_mut()) }.is_null());

    let signal = c("title-changed");
    unsafe { wf_signal_subscribe(ptr::null_mut(), signal.as_ptr(), ptr::null_mut()) };
    unsafe { wf_destroy_signal_connection(ptr::null_mut()) };
}

#[test]
fn test_calls_before_init_are_neutral() {
    assert!(wf_get_core().is_null());
    assert!(
        unsafe { wf_create_signal_connection(Some(record), ptr::null_mut(), ptr::null_mut()) }
            .is_null()
    );
    let (s, o, v) = (c("core"), c("vwidth"), c("4"));
    let code = unsafe { wf_set_option_str(s.as_ptr(), o.as_ptr(), v.as_ptr()) };
    assert_eq!(code, ErrorCode::InvalidOptionSection);
}

#[test]
fn test_fini_reports_leaked_connections() {
    let host = Rc::new(HeadlessCompositor::new());
    let output = host.add_output("HEADLESS-1", Dimensions::new(800, 600));
    let config = RuntimeConfig {
        enabled: false,
        ..RuntimeConfig::default()
    };
    wflua::init(Rc::clone(&host), config);

    let conn = connect(output, "view-mapped", 1);
    let residue = wflua::fini().unwrap();
    assert_eq!(residue.connections, 1);
    assert_eq!(host.listener_count(output), 0);

    // The bridge is gone; destroying the handle only releases it.
    unsafe { wf_destroy_signal_connection(conn) };
    assert!(wflua::fini().is_none());
}
