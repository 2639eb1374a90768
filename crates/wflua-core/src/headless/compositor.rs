use std::ffi::c_void;

use tracing::debug;

use super::{Command, HeadlessCompositor, PluginCall, SignalData};
use crate::config::OptionValue;
use crate::error::OptionError;
use crate::geometry::{Dimensions, Geometry, InputEventProcessingMode, PlainActivatorData, Pointf};
use crate::host::{
    ConfigStore, CoreApi, LayoutApi, OutputApi, SignalPayload, SignalPayloads, ViewApi,
};
use crate::object::ObjectId;

fn with_payload<R>(payload: SignalPayload, f: impl FnOnce(&SignalData) -> Option<R>) -> Option<R> {
    // SAFETY: every payload this host hands out comes from `SignalData::as_payload`
    // and is only read while the emission that carries it is running.
    unsafe { SignalData::from_payload(payload) }.and_then(f)
}

impl SignalPayloads for HeadlessCompositor {
    fn signaled_view(&self, data: SignalPayload) -> Option<ObjectId> {
        with_payload(data, |d| d.view)
    }

    fn signaled_output(&self, data: SignalPayload) -> Option<ObjectId> {
        with_payload(data, |d| d.output)
    }

    fn signaled_keyboard_key_event(&self, data: SignalPayload) -> *mut c_void {
        with_payload(data, |d| {
            d.key_event
                .as_ref()
                .map(|ev| std::ptr::from_ref(ev).cast_mut().cast())
        })
        .unwrap_or(std::ptr::null_mut())
    }

    fn set_signaled_keyboard_key_mode(&self, data: SignalPayload, mode: InputEventProcessingMode) {
        with_payload(data, |d| {
            d.keyboard_mode.set(mode);
            Some(())
        });
    }
}

impl ViewApi for HeadlessCompositor {
    fn view_to_string(&self, view: ObjectId) -> String {
        let state = self.state.borrow();
        match state.view(view) {
            Some(v) => format!("view {view} ({})", v.app_id),
            None => format!("view {view} (dead)"),
        }
    }

    fn view_title(&self, view: ObjectId) -> String {
        self.state
            .borrow()
            .view(view)
            .map(|v| v.title.clone())
            .unwrap_or_default()
    }

    fn view_app_id(&self, view: ObjectId) -> String {
        self.state
            .borrow()
            .view(view)
            .map(|v| v.app_id.clone())
            .unwrap_or_default()
    }

    fn view_wm_geometry(&self, view: ObjectId) -> Geometry {
        self.state
            .borrow()
            .view(view)
            .map(|v| v.geometry)
            .unwrap_or_default()
    }

    fn view_output_geometry(&self, view: ObjectId) -> Geometry {
        self.view_wm_geometry(view)
    }

    fn view_bounding_box(&self, view: ObjectId) -> Geometry {
        let state = self.state.borrow();
        state
            .view(view)
            .map(|v| state.view_layout_geometry(v))
            .unwrap_or_default()
    }

    fn view_output(&self, view: ObjectId) -> Option<ObjectId> {
        self.state.borrow().view(view).and_then(|v| v.output)
    }

    fn view_set_geometry(&self, view: ObjectId, geometry: Geometry) {
        if let Some(v) = self.state.borrow_mut().views.get_mut(&view) {
            v.geometry = geometry;
        }
    }
}

impl OutputApi for HeadlessCompositor {
    fn output_to_string(&self, output: ObjectId) -> String {
        let state = self.state.borrow();
        match state.output(output) {
            Some(o) => format!("output {} ({output})", o.name),
            None => format!("output {output} (dead)"),
        }
    }

    fn output_screen_size(&self, output: ObjectId) -> Dimensions {
        self.state
            .borrow()
            .output(output)
            .map(|o| o.geometry.dimensions())
            .unwrap_or_default()
    }

    fn output_relative_geometry(&self, output: ObjectId) -> Geometry {
        let size = self.output_screen_size(output);
        Geometry::new(0, 0, size.width, size.height)
    }

    fn output_layout_geometry(&self, output: ObjectId) -> Geometry {
        self.state
            .borrow()
            .output(output)
            .map(|o| o.geometry)
            .unwrap_or_default()
    }

    fn output_ensure_pointer(&self, output: ObjectId, center: bool) {
        let mut state = self.state.borrow_mut();
        let Some(geometry) = state.output(output).map(|o| o.geometry) else {
            return;
        };
        if center {
            state.cursor = Pointf::new(
                f64::from(geometry.x) + f64::from(geometry.width) / 2.0,
                f64::from(geometry.y) + f64::from(geometry.height) / 2.0,
            );
        } else if !geometry.contains(state.cursor) {
            state.cursor = geometry.clamp(state.cursor);
        }
    }

    fn output_cursor_position(&self, output: ObjectId) -> Pointf {
        let state = self.state.borrow();
        let origin = state.output(output).map(|o| o.geometry).unwrap_or_default();
        Pointf::new(
            state.cursor.x - f64::from(origin.x),
            state.cursor.y - f64::from(origin.y),
        )
    }

    fn output_call_plugin_plain(
        &self,
        output: ObjectId,
        activator: &str,
        data: &PlainActivatorData,
    ) -> bool {
        if activator.is_empty() {
            return false;
        }
        let mut state = self.state.borrow_mut();
        if !state.outputs.contains_key(&output) {
            return false;
        }
        state.plugin_calls.push(PluginCall {
            output,
            activator: activator.to_string(),
            data: *data,
        });
        true
    }

    fn output_top_view(&self, output: ObjectId) -> Option<ObjectId> {
        self.state.borrow().top_view(output)
    }

    fn output_active_view(&self, output: ObjectId) -> Option<ObjectId> {
        self.state.borrow().output(output).and_then(|o| o.active_view)
    }

    fn output_focus_view(&self, output: ObjectId, view: Option<ObjectId>, raise: bool) {
        let mut state = self.state.borrow_mut();
        match view {
            Some(v) if state.views.get(&v).and_then(|s| s.output) != Some(output) => {
                debug!("View {v} is not on output {output}");
            }
            Some(_) => state.focus(view, raise),
            None => {
                if let Some(o) = state.outputs.get_mut(&output) {
                    o.active_view = None;
                }
            }
        }
    }

    fn output_ensure_visible(&self, output: ObjectId, view: ObjectId) -> bool {
        let mut state = self.state.borrow_mut();
        let Some(size) = state.outputs.get(&output).map(|o| o.geometry.dimensions()) else {
            return false;
        };
        let Some(v) = state.views.get_mut(&view).filter(|v| v.output == Some(output)) else {
            return false;
        };
        let x = v.geometry.x.clamp(0, (size.width - v.geometry.width).max(0));
        let y = v.geometry.y.clamp(0, (size.height - v.geometry.height).max(0));
        let moved = (x, y) != (v.geometry.x, v.geometry.y);
        v.geometry.x = x;
        v.geometry.y = y;
        moved
    }

    fn output_workarea(&self, output: ObjectId) -> Geometry {
        self.output_relative_geometry(output)
    }
}

impl CoreApi for HeadlessCompositor {
    fn core(&self) -> ObjectId {
        self.state.borrow().core
    }

    fn core_to_string(&self, core: ObjectId) -> String {
        format!("core {core}")
    }

    fn current_seat(&self, _core: ObjectId) -> *mut c_void {
        std::ptr::null_mut()
    }

    fn set_cursor(&self, _core: ObjectId, name: &str) {
        self.state.borrow_mut().cursor_name = name.to_string();
    }

    fn unhide_cursor(&self, _core: ObjectId) {
        self.state.borrow_mut().cursor_hidden = false;
    }

    fn hide_cursor(&self, _core: ObjectId) {
        self.state.borrow_mut().cursor_hidden = true;
    }

    fn warp_cursor(&self, _core: ObjectId, position: Pointf) {
        self.state.borrow_mut().cursor = position;
    }

    fn core_cursor_position(&self, _core: ObjectId) -> Pointf {
        self.state.borrow().cursor
    }

    fn cursor_focus_view(&self, _core: ObjectId) -> Option<ObjectId> {
        let state = self.state.borrow();
        state.view_at(state.cursor)
    }

    fn touch_focus_view(&self, _core: ObjectId) -> Option<ObjectId> {
        None
    }

    fn view_at(&self, _core: ObjectId, point: Pointf) -> Option<ObjectId> {
        self.state.borrow().view_at(point)
    }

    fn set_active_view(&self, _core: ObjectId, view: Option<ObjectId>) {
        self.state.borrow_mut().focus(view, false);
    }

    fn core_focus_view(&self, _core: ObjectId, view: Option<ObjectId>) {
        self.state.borrow_mut().focus(view, true);
    }

    fn focus_output(&self, _core: ObjectId, output: Option<ObjectId>) {
        let mut state = self.state.borrow_mut();
        if let Some(o) = output.filter(|o| state.outputs.contains_key(o)) {
            state.active_output = Some(o);
        }
    }

    fn active_output(&self, _core: ObjectId) -> Option<ObjectId> {
        self.state.borrow().active_output
    }

    fn move_view_to_output(
        &self,
        _core: ObjectId,
        view: ObjectId,
        output: ObjectId,
        reconfigure: bool,
    ) {
        let mut state = self.state.borrow_mut();
        let Some(size) = state.outputs.get(&output).map(|o| o.geometry.dimensions()) else {
            return;
        };
        let Some(v) = state.views.get_mut(&view) else {
            return;
        };
        v.output = Some(output);
        if reconfigure {
            v.geometry.width = v.geometry.width.min(size.width);
            v.geometry.height = v.geometry.height.min(size.height);
            v.geometry.x = v.geometry.x.clamp(0, size.width - v.geometry.width);
            v.geometry.y = v.geometry.y.clamp(0, size.height - v.geometry.height);
        }
        for o in state.outputs.values_mut() {
            if o.active_view == Some(view) {
                o.active_view = None;
            }
        }
    }

    fn wayland_display(&self, _core: ObjectId) -> String {
        "wayland-1".to_string()
    }

    fn xwayland_display(&self, _core: ObjectId) -> String {
        match self.option("core", "xwayland") {
            Some(OptionValue::Bool(false)) => String::new(),
            _ => ":1".to_string(),
        }
    }

    fn run(&self, _core: ObjectId, command: &str) -> i32 {
        let mut state = self.state.borrow_mut();
        let pid = state.next_pid;
        state.next_pid += 1;
        state.commands.push(Command {
            pid,
            command: command.to_string(),
        });
        pid
    }

    fn shutdown(&self, _core: ObjectId) {
        self.state.borrow_mut().shutdown = true;
    }

    fn output_layout(&self, _core: ObjectId) -> ObjectId {
        self.state.borrow().layout
    }

    fn event_loop(&self, _core: ObjectId) -> *mut c_void {
        std::ptr::null_mut()
    }
}

impl LayoutApi for HeadlessCompositor {
    fn output_at(&self, _layout: ObjectId, x: i32, y: i32) -> Option<ObjectId> {
        self.state
            .borrow()
            .output_containing(Pointf::new(f64::from(x), f64::from(y)))
    }

    fn output_coords_at(&self, _layout: ObjectId, origin: Pointf) -> (Option<ObjectId>, Pointf) {
        let state = self.state.borrow();
        if let Some(output) = state.output_containing(origin) {
            return (Some(output), origin);
        }

        state
            .outputs
            .iter()
            .map(|(id, o)| {
                let closest = o.geometry.clamp(origin);
                (*id, closest, closest.distance_squared(origin))
            })
            .min_by(|a, b| a.2.total_cmp(&b.2))
            .map_or((None, origin), |(id, closest, _)| (Some(id), closest))
    }

    fn num_outputs(&self, _layout: ObjectId) -> u32 {
        u32::try_from(self.state.borrow().outputs.len()).unwrap_or(u32::MAX)
    }

    fn next_output(&self, _layout: ObjectId, prev: Option<ObjectId>) -> Option<ObjectId> {
        let state = self.state.borrow();
        let first = state.outputs.keys().next().copied();
        let Some(prev) = prev else {
            return first;
        };
        match state.outputs.get_index_of(&prev) {
            Some(index) => state
                .outputs
                .get_index(index + 1)
                .map(|(id, _)| *id)
                .or(first),
            None => first,
        }
    }

    fn find_output(&self, _layout: ObjectId, name: &str) -> Option<ObjectId> {
        self.state
            .borrow()
            .outputs
            .iter()
            .find(|(_, o)| o.name == name)
            .map(|(id, _)| *id)
    }
}

impl ConfigStore for HeadlessCompositor {
    fn set_option_str(&self, section: &str, option: &str, value: &str) -> Result<(), OptionError> {
        self.config.borrow_mut().set_option_str(section, option, value)
    }
}
