//! An in-memory compositor.
//!
//! [`HeadlessCompositor`] implements every host trait without a display. It
//! keeps a small scene (outputs side by side, views stacked per output, one
//! cursor) and a custom data slot set plus a signal listener list per object,
//! so emitter destruction behaves the way it does in Wayfire: the object's
//! custom data is dropped, and with it any lifetime tracker parked there.
//!
//! Object ids are synthetic addresses. Nothing ever dereferences them.

mod compositor;
mod signal;

pub use signal::{KeyboardKeyEvent, SignalData};

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::config::{Config, OptionValue};
use crate::geometry::{Dimensions, Geometry, PlainActivatorData, Pointf};
use crate::host::{ListenerId, ObjectData, SignalListener, SignalPayload, SignalSource};
use crate::object::ObjectId;

const FIRST_OBJECT_ID: usize = 0x1000;
const OBJECT_ID_STRIDE: usize = 0x40;
const DEFAULT_VIEW_SIZE: Dimensions = Dimensions {
    width: 640,
    height: 480,
};

/// A recorded `run` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub pid: i32,
    pub command: String,
}

/// A recorded `call_plugin_plain` call.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginCall {
    pub output: ObjectId,
    pub activator: String,
    pub data: PlainActivatorData,
}

/// A recorded emission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Emission {
    pub object: ObjectId,
    pub signal: String,
    /// How many listeners were connected when the emission started.
    pub listeners: usize,
}

struct Listener {
    id: ListenerId,
    signal: Rc<str>,
    callback: SignalListener,
}

#[derive(Default)]
struct Record {
    data: HashMap<&'static str, Box<dyn Any>>,
    listeners: Vec<Listener>,
}

#[derive(Debug, Clone)]
struct ViewState {
    app_id: String,
    title: String,
    /// Output-local.
    geometry: Geometry,
    output: Option<ObjectId>,
}

#[derive(Debug, Clone)]
struct OutputState {
    name: String,
    /// Layout coordinates.
    geometry: Geometry,
    active_view: Option<ObjectId>,
}

struct State {
    next_id: usize,
    next_listener: u64,
    next_pid: i32,
    core: ObjectId,
    layout: ObjectId,
    objects: HashMap<ObjectId, Record>,
    /// Stacking order, bottom first.
    views: IndexMap<ObjectId, ViewState>,
    outputs: IndexMap<ObjectId, OutputState>,
    active_output: Option<ObjectId>,
    cursor: Pointf,
    cursor_hidden: bool,
    cursor_name: String,
    commands: Vec<Command>,
    plugin_calls: Vec<PluginCall>,
    emissions: Vec<Emission>,
    shutdown: bool,
}

impl State {
    fn allocate(&mut self) -> ObjectId {
        let id = ObjectId(self.next_id);
        self.next_id += OBJECT_ID_STRIDE;
        self.objects.insert(id, Record::default());
        id
    }

    fn view(&self, view: ObjectId) -> Option<&ViewState> {
        let state = self.views.get(&view);
        if state.is_none() {
            debug!("Query on unknown view {view}");
        }
        state
    }

    fn output(&self, output: ObjectId) -> Option<&OutputState> {
        let state = self.outputs.get(&output);
        if state.is_none() {
            debug!("Query on unknown output {output}");
        }
        state
    }

    fn view_layout_geometry(&self, view: &ViewState) -> Geometry {
        let origin = view
            .output
            .and_then(|o| self.outputs.get(&o))
            .map_or(Geometry::default(), |o| o.geometry);
        Geometry {
            x: view.geometry.x + origin.x,
            y: view.geometry.y + origin.y,
            ..view.geometry
        }
    }

    fn output_containing(&self, point: Pointf) -> Option<ObjectId> {
        self.outputs
            .iter()
            .find(|(_, o)| o.geometry.contains(point))
            .map(|(id, _)| *id)
    }

    fn view_at(&self, point: Pointf) -> Option<ObjectId> {
        self.views
            .iter()
            .rev()
            .find(|(_, v)| v.output.is_some() && self.view_layout_geometry(v).contains(point))
            .map(|(id, _)| *id)
    }

    fn top_view(&self, output: ObjectId) -> Option<ObjectId> {
        self.views
            .iter()
            .rev()
            .find(|(_, v)| v.output == Some(output))
            .map(|(id, _)| *id)
    }

    fn raise(&mut self, view: ObjectId) {
        if let Some(state) = self.views.shift_remove(&view) {
            self.views.insert(view, state);
        }
    }

    fn focus(&mut self, view: Option<ObjectId>, raise: bool) {
        let Some(view) = view else {
            if let Some(output) = self.active_output.and_then(|o| self.outputs.get_mut(&o)) {
                output.active_view = None;
            }
            return;
        };
        let Some(output) = self.views.get(&view).and_then(|v| v.output) else {
            debug!("Cannot focus unmapped view {view}");
            return;
        };
        if let Some(state) = self.outputs.get_mut(&output) {
            state.active_view = Some(view);
        }
        self.active_output = Some(output);
        if raise {
            self.raise(view);
        }
    }

    fn forget(&mut self, object: ObjectId) {
        if self.views.shift_remove(&object).is_some() {
            for output in self.outputs.values_mut() {
                if output.active_view == Some(object) {
                    output.active_view = None;
                }
            }
        }

        if self.outputs.shift_remove(&object).is_some() {
            for view in self.views.values_mut() {
                if view.output == Some(object) {
                    view.output = None;
                }
            }
            if self.active_output == Some(object) {
                self.active_output = self.outputs.keys().next().copied();
            }
        }
    }
}

/// In-memory compositor host.
pub struct HeadlessCompositor {
    state: RefCell<State>,
    config: RefCell<Config>,
}

impl Default for HeadlessCompositor {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessCompositor {
    /// A compositor with no outputs and the stock option set.
    pub fn new() -> Self {
        Self::with_config(Config::wayfire_defaults())
    }

    pub fn with_config(config: Config) -> Self {
        let mut state = State {
            next_id: FIRST_OBJECT_ID,
            next_listener: 1,
            next_pid: 1000,
            core: ObjectId(0),
            layout: ObjectId(0),
            objects: HashMap::new(),
            views: IndexMap::new(),
            outputs: IndexMap::new(),
            active_output: None,
            cursor: Pointf::default(),
            cursor_hidden: false,
            cursor_name: "default".to_string(),
            commands: Vec::new(),
            plugin_calls: Vec::new(),
            emissions: Vec::new(),
            shutdown: false,
        };
        state.core = state.allocate();
        state.layout = state.allocate();

        Self {
            state: RefCell::new(state),
            config: RefCell::new(config),
        }
    }

    /// Add an output to the right of the existing ones.
    pub fn add_output(&self, name: &str, size: Dimensions) -> ObjectId {
        let mut state = self.state.borrow_mut();
        let x = state
            .outputs
            .values()
            .map(|o| o.geometry.x + o.geometry.width)
            .max()
            .unwrap_or(0);
        let id = state.allocate();
        state.outputs.insert(
            id,
            OutputState {
                name: name.to_string(),
                geometry: Geometry::new(x, 0, size.width, size.height),
                active_view: None,
            },
        );
        if state.active_output.is_none() {
            state.active_output = Some(id);
        }
        debug!("Added output {name} at {id}");
        id
    }

    /// Map a view on top of `output`, or of the active output when `None`.
    pub fn add_view(&self, app_id: &str, title: &str, output: Option<ObjectId>) -> ObjectId {
        let mut state = self.state.borrow_mut();
        let output = output
            .filter(|o| state.outputs.contains_key(o))
            .or(state.active_output);
        let id = state.allocate();
        state.views.insert(
            id,
            ViewState {
                app_id: app_id.to_string(),
                title: title.to_string(),
                geometry: Geometry::new(0, 0, DEFAULT_VIEW_SIZE.width, DEFAULT_VIEW_SIZE.height),
                output,
            },
        );
        debug!("Added view {app_id} at {id}");
        id
    }

    /// Emit `signal` on `object`.
    ///
    /// Listeners connected at the start of the emission are called in
    /// connection order. A listener disconnected by an earlier one is skipped.
    pub fn emit(&self, object: ObjectId, signal: &str, payload: SignalPayload) {
        let snapshot: Vec<(ListenerId, SignalListener)> = {
            let mut state = self.state.borrow_mut();
            let Some(record) = state.objects.get(&object) else {
                debug!("Emit of {signal} on dead object {object}");
                return;
            };
            let snapshot: Vec<_> = record
                .listeners
                .iter()
                .filter(|l| &*l.signal == signal)
                .map(|l| (l.id, Rc::clone(&l.callback)))
                .collect();
            state.emissions.push(Emission {
                object,
                signal: signal.to_string(),
                listeners: snapshot.len(),
            });
            snapshot
        };

        for (id, callback) in snapshot {
            let connected = self
                .state
                .borrow()
                .objects
                .get(&object)
                .is_some_and(|r| r.listeners.iter().any(|l| l.id == id));
            if connected {
                callback(payload);
            }
        }
    }

    /// Emit with a [`SignalData`] payload.
    pub fn emit_data(&self, object: ObjectId, signal: &str, data: &SignalData) {
        self.emit(object, signal, data.as_payload());
    }

    /// Destroy an object.
    ///
    /// Its custom data is dropped after the object has been removed from the
    /// scene, with no internal borrow held, so drop hooks may call back in.
    pub fn destroy(&self, object: ObjectId) -> bool {
        let record = {
            let mut state = self.state.borrow_mut();
            if object == state.core || object == state.layout {
                debug!("Refusing to destroy the core or the layout");
                return false;
            }
            let Some(record) = state.objects.remove(&object) else {
                return false;
            };
            state.forget(object);
            record
        };
        debug!("Destroying object {object}");

        let Record { data, listeners } = record;
        drop(data);
        drop(listeners);
        true
    }

    pub fn is_alive(&self, object: ObjectId) -> bool {
        self.state.borrow().objects.contains_key(&object)
    }

    pub fn listener_count(&self, object: ObjectId) -> usize {
        self.state
            .borrow()
            .objects
            .get(&object)
            .map_or(0, |r| r.listeners.len())
    }

    pub fn signal_listener_count(&self, object: ObjectId, signal: &str) -> usize {
        self.state.borrow().objects.get(&object).map_or(0, |r| {
            r.listeners.iter().filter(|l| &*l.signal == signal).count()
        })
    }

    pub fn core_id(&self) -> ObjectId {
        self.state.borrow().core
    }

    pub fn layout_id(&self) -> ObjectId {
        self.state.borrow().layout
    }

    /// Views in stacking order, bottom first.
    pub fn views(&self) -> Vec<ObjectId> {
        self.state.borrow().views.keys().copied().collect()
    }

    pub fn outputs(&self) -> Vec<ObjectId> {
        self.state.borrow().outputs.keys().copied().collect()
    }

    pub fn cursor(&self) -> Pointf {
        self.state.borrow().cursor
    }

    pub fn cursor_hidden(&self) -> bool {
        self.state.borrow().cursor_hidden
    }

    pub fn cursor_name(&self) -> String {
        self.state.borrow().cursor_name.clone()
    }

    pub fn commands(&self) -> Vec<Command> {
        self.state.borrow().commands.clone()
    }

    pub fn plugin_calls(&self) -> Vec<PluginCall> {
        self.state.borrow().plugin_calls.clone()
    }

    pub fn emissions(&self) -> Vec<Emission> {
        self.state.borrow().emissions.clone()
    }

    pub fn shutdown_requested(&self) -> bool {
        self.state.borrow().shutdown
    }

    pub fn option(&self, section: &str, option: &str) -> Option<OptionValue> {
        self.config.borrow().get(section, option).cloned()
    }

    /// Replace the option set.
    pub fn set_config(&self, config: Config) {
        *self.config.borrow_mut() = config;
    }
}

impl ObjectData for HeadlessCompositor {
    fn store_data(&self, object: ObjectId, key: &'static str, data: Box<dyn Any>) {
        let previous = {
            let mut state = self.state.borrow_mut();
            let Some(record) = state.objects.get_mut(&object) else {
                debug!("Store on dead object {object}");
                return;
            };
            record.data.insert(key, data)
        };
        // Dropped here, outside the borrow.
        drop(previous);
    }

    fn release_data(&self, object: ObjectId, key: &'static str) -> Option<Box<dyn Any>> {
        self.state
            .borrow_mut()
            .objects
            .get_mut(&object)
            .and_then(|r| r.data.remove(key))
    }

    fn has_data(&self, object: ObjectId, key: &'static str) -> bool {
        self.state
            .borrow()
            .objects
            .get(&object)
            .is_some_and(|r| r.data.contains_key(key))
    }
}

impl SignalSource for HeadlessCompositor {
    fn connect_signal(
        &self,
        object: ObjectId,
        signal: &str,
        listener: SignalListener,
    ) -> Option<ListenerId> {
        let mut state = self.state.borrow_mut();
        let id = ListenerId(state.next_listener);
        let record = state.objects.get_mut(&object)?;
        record.listeners.push(Listener {
            id,
            signal: Rc::from(signal),
            callback: listener,
        });
        state.next_listener += 1;
        Some(id)
    }

    fn disconnect_signal(&self, object: ObjectId, listener: ListenerId) {
        let removed = {
            let mut state = self.state.borrow_mut();
            let Some(record) = state.objects.get_mut(&object) else {
                return;
            };
            let pos = record.listeners.iter().position(|l| l.id == listener);
            pos.map(|pos| record.listeners.remove(pos))
        };
        drop(removed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct DropFlag(Rc<Cell<bool>>);

    impl Drop for DropFlag {
        fn drop(&mut self) {
            self.0.set(true);
        }
    }

    #[test]
    fn test_ids_are_distinct_and_nonzero() {
        let host = HeadlessCompositor::new();
        let output = host.add_output("HDMI-A-1", Dimensions::new(1920, 1080));
        let view = host.add_view("foot", "shell", None);
        assert_ne!(host.core_id(), host.layout_id());
        assert_ne!(output, view);
        assert!(output.addr() >= FIRST_OBJECT_ID);
    }

    #[test]
    fn test_outputs_placed_side_by_side() {
        let host = HeadlessCompositor::new();
        host.add_output("A", Dimensions::new(1920, 1080));
        let b = host.add_output("B", Dimensions::new(1280, 1024));
        let state = host.state.borrow();
        assert_eq!(state.outputs[&b].geometry, Geometry::new(1920, 0, 1280, 1024));
    }

    #[test]
    fn test_destroy_drops_custom_data() {
        let host = HeadlessCompositor::new();
        let view = host.add_view("foot", "shell", None);
        let dropped = Rc::new(Cell::new(false));
        host.store_data(view, "flag", Box::new(DropFlag(Rc::clone(&dropped))));

        assert!(host.destroy(view));
        assert!(dropped.get());
        assert!(!host.is_alive(view));
        assert!(!host.destroy(view));
    }

    #[test]
    fn test_release_data_does_not_drop() {
        let host = HeadlessCompositor::new();
        let view = host.add_view("foot", "shell", None);
        let dropped = Rc::new(Cell::new(false));
        host.store_data(view, "flag", Box::new(DropFlag(Rc::clone(&dropped))));

        let released = host.release_data(view, "flag");
        assert!(released.is_some());
        assert!(!dropped.get());
        assert!(!host.has_data(view, "flag"));
    }

    #[test]
    fn test_emit_skips_listener_disconnected_mid_emission() {
        let host = Rc::new(HeadlessCompositor::new());
        let view = host.add_view("foot", "shell", None);
        let hits = Rc::new(Cell::new(0));
        let second = Rc::new(Cell::new(None));

        let h = Rc::clone(&host);
        let s = Rc::clone(&second);
        host.connect_signal(
            view,
            "mapped",
            Rc::new(move |_| {
                if let Some(id) = s.get() {
                    h.disconnect_signal(view, id);
                }
            }),
        );
        let counter = Rc::clone(&hits);
        let id = host.connect_signal(view, "mapped", Rc::new(move |_| counter.set(counter.get() + 1)));
        second.set(id);

        host.emit(view, "mapped", std::ptr::null_mut());
        assert_eq!(hits.get(), 0);
        assert_eq!(host.listener_count(view), 1);
    }

    #[test]
    fn test_connect_on_dead_object_fails() {
        let host = HeadlessCompositor::new();
        let view = host.add_view("foot", "shell", None);
        host.destroy(view);
        assert!(host.connect_signal(view, "x", Rc::new(|_| {})).is_none());
    }

    #[test]
    fn test_core_cannot_be_destroyed() {
        let host = HeadlessCompositor::new();
        assert!(!host.destroy(host.core_id()));
        assert!(host.is_alive(host.core_id()));
    }
}
