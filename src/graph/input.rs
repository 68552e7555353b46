//! The hardware input node.
//!
//! Capture and render run on different threads with independent clocks, so
//! the two sides meet in a ring buffer: the engine's capture thread writes
//! each delivered buffer into the producer half, and the render source
//! handed to the downstream connection drains the consumer half. A render
//! that finds the ring empty repeats the last captured buffer instead of
//! failing the pull.

use std::ops::Deref;
use std::sync::Arc;

use crate::buffer::BufferList;
use crate::engine::descriptor::{subtype, UnitDescriptor, UnitType};
use crate::engine::{
    AudioEngine, CaptureSink, EngineError, GraphError, RenderError, RenderFlags, RenderSource,
    Timestamp,
};
use crate::graph::node::{AudioUnit, UnitRef};
use crate::ring::{ring_buffer, RingReader, RingWriter};
use crate::{DEFAULT_CHANNELS, DEFAULT_FRAMES, DEFAULT_RING_SLOTS};

/// Capture half: every hardware delivery becomes one ring slot, filled in
/// place and then published.
struct RingCapture {
    writer: RingWriter,
}

impl CaptureSink for RingCapture {
    fn deliver(&mut self, _timestamp: &Timestamp, data: &BufferList) {
        self.writer.write_head().copy_from(data);
        self.writer.advance_write_head();
    }
}

/// Render half: drains the ring on each pull, holding on to the newest
/// buffer so an underrun repeats sound instead of going silent.
struct RingPull {
    reader: RingReader,
    last: BufferList,
    primed: bool,
}

impl RenderSource for RingPull {
    fn pull(
        &mut self,
        flags: &mut RenderFlags,
        _timestamp: &Timestamp,
        _frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError> {
        if self.reader.read_into(&mut self.last) {
            self.primed = true;
        }
        data.silence();
        if self.primed {
            data.copy_from(&self.last);
        } else {
            flags.output_is_silence = true;
        }
        Ok(())
    }
}

/// Wraps the hardware input unit. While started, captured audio flows into
/// the ring; connecting hands the ring's single consumer half to exactly
/// one downstream bus.
pub struct InputUnit {
    unit: AudioUnit,
    pull: Option<RingPull>,
}

impl InputUnit {
    pub fn new(engine: Arc<dyn AudioEngine>) -> Result<Self, EngineError> {
        let unit = AudioUnit::new(
            engine,
            UnitDescriptor::new(UnitType::Output, subtype::HARDWARE_INPUT),
        )?;
        let (writer, reader) = ring_buffer(DEFAULT_RING_SLOTS, DEFAULT_CHANNELS, DEFAULT_FRAMES);
        unit.engine()
            .set_capture_sink(unit.handle.id(), Some(Box::new(RingCapture { writer })))?;
        Ok(Self {
            unit,
            pull: Some(RingPull {
                reader,
                last: BufferList::new(DEFAULT_CHANNELS, DEFAULT_FRAMES),
                primed: false,
            }),
        })
    }

    /// Feed captured audio into `destination`'s input `destination_bus`.
    ///
    /// The ring has one consumer half, so an input node feeds exactly one
    /// connection; a second connect fails with [`GraphError::ReaderInUse`].
    pub fn connect_to<U: UnitRef>(
        &mut self,
        destination: &U,
        destination_bus: u32,
    ) -> Result<(), GraphError> {
        let destination = destination.unit();
        let count = destination.input_bus_count();
        if destination_bus >= count {
            return Err(GraphError::BusOutOfRange {
                bus: destination_bus,
                count,
            });
        }
        let pull = self.pull.take().ok_or(GraphError::ReaderInUse)?;
        destination
            .handle
            .set_render_source(destination_bus, Some(Box::new(pull)))?;
        Ok(())
    }

    /// Connect to `destination`'s bus 0.
    pub fn connect<U: UnitRef>(&mut self, destination: &U) -> Result<(), GraphError> {
        self.connect_to(destination, 0)
    }

    /// Pull captured audio directly, without a downstream connection.
    pub fn render(
        &mut self,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError> {
        let pull = self.pull.as_mut().ok_or(RenderError::NoSource)?;
        pull.pull(flags, timestamp, frames, data)
    }

    /// Begin capturing. Idempotent.
    pub fn start(&self) -> Result<(), EngineError> {
        self.unit.engine().start(self.unit.handle.id())
    }

    /// Stop capturing. Idempotent; already-captured buffers stay readable.
    pub fn stop(&self) -> Result<(), EngineError> {
        self.unit.engine().stop(self.unit.handle.id())
    }
}

impl Drop for InputUnit {
    fn drop(&mut self) {
        let _ = self.stop();
    }
}

impl Deref for InputUnit {
    type Target = AudioUnit;

    fn deref(&self) -> &AudioUnit {
        &self.unit
    }
}
