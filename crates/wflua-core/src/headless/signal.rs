use std::cell::Cell;
use std::ffi::c_void;

use crate::geometry::InputEventProcessingMode;
use crate::host::SignalPayload;
use crate::object::ObjectId;

/// Layout-compatible stand-in for `wlr_event_keyboard_key`.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyboardKeyEvent {
    pub time_msec: u32,
    pub keycode: u32,
    pub update_state: bool,
    /// 0 released, 1 pressed.
    pub state: u32,
}

/// Payload of signals emitted by the headless compositor.
///
/// Borrowed for the duration of [`HeadlessCompositor::emit`](super::HeadlessCompositor::emit);
/// handlers receive it as an opaque pointer.
#[derive(Debug, Default)]
pub struct SignalData {
    pub view: Option<ObjectId>,
    pub output: Option<ObjectId>,
    pub key_event: Option<KeyboardKeyEvent>,
    pub keyboard_mode: Cell<InputEventProcessingMode>,
}

impl SignalData {
    pub fn view(view: ObjectId) -> Self {
        Self {
            view: Some(view),
            ..Self::default()
        }
    }

    pub fn output(output: ObjectId) -> Self {
        Self {
            output: Some(output),
            ..Self::default()
        }
    }

    pub fn with_output(mut self, output: ObjectId) -> Self {
        self.output = Some(output);
        self
    }

    pub fn key(event: KeyboardKeyEvent) -> Self {
        Self {
            key_event: Some(event),
            ..Self::default()
        }
    }

    /// The opaque pointer handed to listeners.
    pub fn as_payload(&self) -> SignalPayload {
        std::ptr::from_ref(self).cast_mut().cast::<c_void>()
    }

    /// Recover the payload from an opaque pointer.
    ///
    /// # Safety
    ///
    /// `payload` must be null or come from [`SignalData::as_payload`] on a
    /// value that is still alive.
    pub(crate) unsafe fn from_payload<'a>(payload: SignalPayload) -> Option<&'a SignalData> {
        // SAFETY: upheld by the caller.
        unsafe { payload.cast::<SignalData>().as_ref() }
    }
}
