//! Option setting and script logging.

use std::ffi::{c_char, c_int};

use tracing::{debug, error, info, trace, warn};
use wflua_core::{ErrorCode, OptionError};

use super::input;
use crate::plugin::with_plugin;

/// Set `section/option` from its string form.
///
/// Failures are returned as codes and are not logged as errors.
///
/// # Safety
///
/// Each argument must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wf_set_option_str(
    section: *const c_char,
    option: *const c_char,
    value: *const c_char,
) -> ErrorCode {
    // SAFETY: upheld by the caller.
    let (section, option, value) = unsafe { (input(section), input(option), input(value)) };
    let Some(section) = section else {
        return ErrorCode::InvalidOptionSection;
    };
    let Some(option) = option else {
        return ErrorCode::InvalidOption;
    };
    let Some(value) = value else {
        return ErrorCode::InvalidOptionValue;
    };

    let result = with_plugin(
        "wf_set_option_str",
        Err(OptionError::InvalidSection {
            section: section.clone(),
        }),
        |plugin| plugin.host().set_option_str(&section, &option, &value),
    );
    debug!(%section, %option, %value, "set_option_str: {result:?}");
    ErrorCode::from(result)
}

/// Log `msg` from a script. Levels: 0 error, 1 warn, 2 info, 3 debug, 4+ trace.
///
/// # Safety
///
/// `msg` must be null or a NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn wflua_log(level: c_int, msg: *const c_char) {
    // SAFETY: upheld by the caller.
    let Some(msg) = (unsafe { input(msg) }) else {
        return;
    };
    match level {
        i32::MIN..=0 => error!(target: "wflua::script", "{msg}"),
        1 => warn!(target: "wflua::script", "{msg}"),
        2 => info!(target: "wflua::script", "{msg}"),
        3 => debug!(target: "wflua::script", "{msg}"),
        _ => trace!(target: "wflua::script", "{msg}"),
    }
}
