//! The file player node: decoded-file playback scheduled by region.

use std::ops::Deref;
use std::path::Path;
use std::sync::Arc;

use log::debug;

use crate::engine::descriptor::{subtype, UnitDescriptor, UnitType};
use crate::engine::{AudioEngine, EngineError, FileInfo, FileRegion, GraphError, LoopCount};
use crate::graph::node::{AudioUnit, UnitRef};

/// Wraps the file player unit. Load a file with [`FilePlayer::set_file`],
/// then schedule playback; the unit renders the scheduled region when it is
/// pulled and silence otherwise.
pub struct FilePlayer {
    unit: AudioUnit,
    file: Option<FileInfo>,
    length: u64,
}

impl FilePlayer {
    pub fn new(engine: Arc<dyn AudioEngine>) -> Result<Self, EngineError> {
        let unit = AudioUnit::new(
            engine,
            UnitDescriptor::new(UnitType::Generator, subtype::FILE_PLAYER),
        )?;
        Ok(Self {
            unit,
            file: None,
            length: 0,
        })
    }

    /// Open and decode `path`. On success the playback length resets to the
    /// full file; on failure the previously loaded file, if any, stays in
    /// effect.
    pub fn set_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), EngineError> {
        let info = self
            .unit
            .engine()
            .load_audio_file(self.unit.handle.id(), path.as_ref())?;
        debug!("loaded {} ({} frames)", info.path.display(), info.frames);
        self.length = info.frames;
        self.file = Some(info);
        Ok(())
    }

    /// Playback length in frames, initially the full file.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Trim playback to the first `frames` frames of the file.
    pub fn set_length(&mut self, frames: u64) {
        self.length = frames;
    }

    /// Schedule a single play-through. `start_host_time` of `None` starts
    /// on the next pull; `Some` defers until the host clock reaches the
    /// given value.
    pub fn play(&self, start_host_time: Option<u64>) -> Result<(), GraphError> {
        self.schedule(LoopCount::Times(1), start_host_time)
    }

    /// Schedule playback that repeats. [`LoopCount::Times(n)`] plays the
    /// region `n` times in total; [`LoopCount::Forever`] repeats until
    /// stopped.
    pub fn play_looped(
        &self,
        loops: LoopCount,
        start_host_time: Option<u64>,
    ) -> Result<(), GraphError> {
        self.schedule(loops, start_host_time)
    }

    fn schedule(&self, loops: LoopCount, start_host_time: Option<u64>) -> Result<(), GraphError> {
        if self.file.is_none() {
            return Err(GraphError::NoFile);
        }
        let region = FileRegion {
            start_frame: 0,
            frames: self.length,
            loops,
            start_host_time,
        };
        self.unit
            .engine()
            .schedule_region(self.unit.handle.id(), region)?;
        Ok(())
    }

    /// Drop the schedule and reset render state. The loaded file is kept,
    /// so playback can be rescheduled without decoding again.
    pub fn stop(&self) -> Result<(), EngineError> {
        self.unit.engine().clear_schedule(self.unit.handle.id())?;
        self.unit.reset();
        Ok(())
    }
}

impl Deref for FilePlayer {
    type Target = AudioUnit;

    fn deref(&self) -> &AudioUnit {
        &self.unit
    }
}

impl UnitRef for FilePlayer {
    fn unit(&self) -> &AudioUnit {
        &self.unit
    }
}
