//! Core types and host capability traits for wflua.
//!
//! This crate describes what the bridge needs from a compositor without
//! depending on one: object identity, the plain-old-data geometry types that
//! cross the C ABI, the compositor's option model, and the capability traits
//! a host implements. It also ships [`HeadlessCompositor`], an in-memory host
//! used by the tests and by the `wflua` command-line runner.

pub mod config;
mod error;
mod geometry;
pub mod headless;
mod host;
mod object;

pub use config::{Config, ConfigOption, ConfigSection, OptionKind, OptionValue};
pub use error::{ConfigError, ErrorCode, OptionError};
pub use geometry::{
    ActivatorSource, Dimensions, Geometry, InputEventProcessingMode, PlainActivatorData, Pointf,
};
pub use headless::{HeadlessCompositor, SignalData};
pub use host::{
    Compositor, ConfigStore, CoreApi, Emitters, Host, LayoutApi, ListenerId, ObjectData,
    OutputApi, SignalListener, SignalPayload, SignalPayloads, SignalSource, ViewApi,
};
pub use object::{ObjectId, opt_ptr};
