//! The scratch string buffer.
//!
//! Every `const char *` returned by the facade points into one buffer that
//! is overwritten by the next call returning a string. Callers copy.

use std::cell::RefCell;
use std::ffi::{CString, c_char};

use crate::host_vtable::c_string;

thread_local! {
    static SCRATCH: RefCell<CString> = RefCell::new(CString::default());
}

/// Replace the scratch buffer with `value` (cut at its first NUL).
pub(crate) fn scratch(value: &str) -> *const c_char {
    let value = c_string(value);
    SCRATCH.with_borrow_mut(|buf| {
        *buf = value;
        buf.as_ptr()
    })
}
