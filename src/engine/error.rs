//! Error taxonomy: rich diagnostics off the realtime thread, a `Copy`
//! status code on it.

use thiserror::Error;

use crate::engine::descriptor::UnitDescriptor;

/// Configuration-path failures reported by an engine. These run off the
/// realtime thread, so they may carry allocated context.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("no component matched descriptor {0:?}")]
    ComponentNotFound(UnitDescriptor),
    #[error("unit handle is no longer valid")]
    BadHandle,
    #[error("operation is not supported by this unit")]
    Unsupported,
    #[error("bus {bus} is out of range ({count} buses)")]
    InvalidBus { bus: u32, count: u32 },
    #[error("could not open {path}: {source}")]
    FileOpen {
        path: std::path::PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("preset data is malformed: {0}")]
    BadPresetData(String),
}

/// Graph topology errors raised by the façade before anything reaches the
/// engine.
#[derive(Debug, Error)]
pub enum GraphError {
    #[error("destination bus {bus} out of range (unit has {count} input buses)")]
    BusOutOfRange { bus: u32, count: u32 },
    #[error("tap has no source node; call set_source first")]
    NoSource,
    #[error("file player has no file loaded; call set_file first")]
    NoFile,
    #[error("input node is already feeding a connection")]
    ReaderInUse,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Status for the pull-render path. `Copy`, allocation-free, and never
/// converted into a panic: realtime callbacks report it and move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RenderError {
    #[error("no render source registered on the pulled bus")]
    NoSource,
    #[error("the pulled unit handle is not valid")]
    InvalidUnit,
}
