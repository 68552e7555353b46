//! The opaque platform collaborator behind every node.
//!
//! Everything a node does ultimately delegates here: instantiating units
//! from descriptors, registering pull-render sources on input buses,
//! parameters, transport and event scheduling. The façade never talks to
//! platform APIs directly; it talks to an [`AudioEngine`] implementation.

/// Unit identity: descriptors, handles, parameters, scopes.
pub mod descriptor;
/// Error taxonomy shared by engines and the graph façade.
pub mod error;
/// Pure-Rust reference engine used by tests, benches and offline rendering.
pub mod software;

use std::path::{Path, PathBuf};

pub use descriptor::{param, subtype, ParameterId, Scope, UnitDescriptor, UnitId, UnitType};
pub use error::{EngineError, GraphError, RenderError};
pub use software::SoftwareEngine;

/// Flags exchanged with a render call.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RenderFlags {
    /// Set by a producer when the rendered buffer contains only silence.
    pub output_is_silence: bool,
}

/// Position of a render or capture call on the engine's timeline.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub struct Timestamp {
    /// Sample-frame position of the first frame in the call.
    pub sample_time: f64,
    /// Host clock value, used for deferred playback starts.
    pub host_time: u64,
}

/// How many times a scheduled file region repeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopCount {
    Times(u32),
    Forever,
}

/// A decoded audio file, as reported by the engine's decoder.
#[derive(Debug, Clone, PartialEq)]
pub struct FileInfo {
    pub path: PathBuf,
    pub frames: u64,
}

/// One region of a decoded file scheduled for playback.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FileRegion {
    pub start_frame: u64,
    pub frames: u64,
    pub loops: LoopCount,
    /// `None` starts immediately; `Some` defers until the host clock
    /// reaches the given value.
    pub start_host_time: Option<u64>,
}

/// A pull-render callback registered on a consumer's input bus.
///
/// Invoked on the realtime thread; implementations must not block for
/// unbounded time, allocate on the failure path, or panic.
pub trait RenderSource: Send {
    fn pull(
        &mut self,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError>;
}

/// Receives hardware-captured audio on the capture thread.
pub trait CaptureSink: Send {
    fn deliver(&mut self, timestamp: &Timestamp, data: &BufferList);
}

use crate::buffer::BufferList;

/// The platform audio engine, treated as opaque by the graph layer.
///
/// Kind-specific operations (metering, MIDI, file scheduling, capture)
/// default to [`EngineError::Unsupported`] so engines only implement what
/// their units can do.
pub trait AudioEngine: Send + Sync {
    /// Resolve and initialize a unit for `descriptor`.
    fn instantiate(&self, descriptor: &UnitDescriptor) -> Result<UnitId, EngineError>;

    /// Release a unit. Called exactly once per instantiated unit, from the
    /// owning node's drop path.
    fn dispose(&self, unit: UnitId);

    /// Pull `frames` frames from `unit`'s output `bus` into `data`.
    fn render(
        &self,
        unit: UnitId,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        bus: u32,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError>;

    /// Register (or clear, with `None`) the render source pulled by
    /// `unit`'s input `bus`. Re-registering overwrites the prior source.
    fn set_render_source(
        &self,
        unit: UnitId,
        bus: u32,
        source: Option<Box<dyn RenderSource>>,
    ) -> Result<(), EngineError>;

    fn set_parameter(
        &self,
        unit: UnitId,
        parameter: ParameterId,
        scope: Scope,
        bus: u32,
        value: f32,
    ) -> Result<(), EngineError>;

    fn get_parameter(
        &self,
        unit: UnitId,
        parameter: ParameterId,
        scope: Scope,
        bus: u32,
    ) -> Result<f32, EngineError>;

    fn input_bus_count(&self, unit: UnitId) -> u32;

    fn output_bus_count(&self, unit: UnitId) -> u32;

    fn set_input_bus_count(&self, unit: UnitId, count: u32) -> Result<(), EngineError>;

    fn set_output_bus_count(&self, unit: UnitId, count: u32) -> Result<(), EngineError>;

    /// Transition the unit into its running state. Idempotent.
    fn start(&self, unit: UnitId) -> Result<(), EngineError>;

    /// Transition the unit out of its running state. Idempotent and safe
    /// to call from drop paths.
    fn stop(&self, unit: UnitId) -> Result<(), EngineError>;

    /// Reset the unit's render state without touching its configuration.
    fn reset(&self, unit: UnitId);

    /// Opaque configuration blob for preset save.
    fn class_data(&self, unit: UnitId) -> Result<Vec<u8>, EngineError>;

    /// Restore an opaque configuration blob captured by
    /// [`AudioEngine::class_data`].
    fn set_class_data(&self, unit: UnitId, data: &[u8]) -> Result<(), EngineError>;

    fn set_metering(
        &self,
        _unit: UnitId,
        _scope: Scope,
        _bus: u32,
        _enabled: bool,
    ) -> Result<(), EngineError> {
        Err(EngineError::Unsupported)
    }

    /// Schedule a channel-voice MIDI message `frame_offset` frames into the
    /// unit's next render.
    fn schedule_midi(
        &self,
        _unit: UnitId,
        _status: u8,
        _data1: u8,
        _data2: u8,
        _frame_offset: u32,
    ) -> Result<(), EngineError> {
        Err(EngineError::Unsupported)
    }

    /// Open and decode an audio file for a file-player unit.
    fn load_audio_file(&self, _unit: UnitId, _path: &Path) -> Result<FileInfo, EngineError> {
        Err(EngineError::Unsupported)
    }

    fn schedule_region(&self, _unit: UnitId, _region: FileRegion) -> Result<(), EngineError> {
        Err(EngineError::Unsupported)
    }

    /// Drop any scheduled region and halt playback.
    fn clear_schedule(&self, _unit: UnitId) -> Result<(), EngineError> {
        Err(EngineError::Unsupported)
    }

    /// Load sample files into an instrument unit's voice table.
    fn load_voices(&self, _unit: UnitId, _paths: &[PathBuf]) -> Result<(), EngineError> {
        Err(EngineError::Unsupported)
    }

    /// Register (or clear) the sink receiving hardware-captured audio from
    /// an input unit.
    fn set_capture_sink(
        &self,
        _unit: UnitId,
        _sink: Option<Box<dyn CaptureSink>>,
    ) -> Result<(), EngineError> {
        Err(EngineError::Unsupported)
    }
}
