// THEORY:
// This file is the main entry point for the `posture_vision` library crate.
// It follows the standard Rust convention of using `lib.rs` to define the public
// API that will be exposed to external consumers (like the `posture_link` daemon
// and the `posture_tester` replay tool).
//
// The primary goal is to export the `PosturePipeline`, the concurrent `Engine`
// and their associated data structures (`EngineConfig`, `PostureReport`,
// `PostureUpdate`, etc.) as the clean, high-level interface for the engine. The
// signal-processing layers live in `core_modules`, each one a small, testable
// stage of the per-frame flow:
//
//   landmarks + mask -> features & curvature -> smoother -> classifier -> alert

pub mod config;
pub mod core_modules;
pub mod error;
pub mod messages;
pub mod pipeline;
pub mod runtime;
pub mod source;

pub use config::EngineConfig;
pub use error::{ChannelError, ConfigError, SourceError};
pub use messages::{AlertPayload, InboundMessage, PostureUpdate};
pub use pipeline::{PosturePipeline, PostureReport};
pub use runtime::{
    AlertSink, CalibrationTrigger, Engine, EngineContext, InboundSource, PostureSnapshot, Shutdown, UpdateSink,
};
pub use source::{FrameSource, JsonlFrameSource};
