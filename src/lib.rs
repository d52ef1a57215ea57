//! Bootstrap shim for image-based runtimes.
//!
//! `image-launcher <SEGMENT> [ARGS]...` loads a kernel image segment, hands
//! it to an execution engine together with the original arguments, and exits
//! with whatever status the engine produced.

pub mod cli;
pub mod config;
pub mod engine;
pub mod launcher;
pub mod logging;
pub mod segment;
pub mod status;

pub use config::{EngineCommand, LaunchRequest, LauncherConfig};
pub use engine::{CommandEngine, Engine, EngineError};
pub use launcher::{LaunchError, Launcher};
pub use segment::{AcquireError, FileSource, ImageSegment, LoadError, SegmentSource};
