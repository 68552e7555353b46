//! The sampler node: an instrument unit with a loadable voice table,
//! played over a channel-voice MIDI surface.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::engine::descriptor::{param, subtype, Scope, UnitDescriptor, UnitType};
use crate::engine::{AudioEngine, EngineError};
use crate::graph::node::{AudioUnit, UnitRef};
use crate::io::midi;

/// Wraps the instrument unit. All note and controller methods schedule on
/// the sampler's current MIDI channel with a zero frame offset, landing at
/// the start of the unit's next render.
pub struct Sampler {
    unit: AudioUnit,
    channel: u8,
}

impl Sampler {
    pub fn new(engine: Arc<dyn AudioEngine>) -> Result<Self, EngineError> {
        let unit = AudioUnit::new(
            engine,
            UnitDescriptor::new(UnitType::MusicDevice, subtype::SAMPLER),
        )?;
        Ok(Self { unit, channel: 0 })
    }

    /// Load a single sample as the whole voice table.
    pub fn set_sample<P: AsRef<Path>>(&self, path: P) -> Result<(), EngineError> {
        self.set_samples(&[path.as_ref().to_path_buf()])
    }

    /// Replace the voice table with `paths`. Fails without touching the
    /// table if any file is missing.
    pub fn set_samples(&self, paths: &[PathBuf]) -> Result<(), EngineError> {
        self.unit.engine().load_voices(self.unit.handle.id(), paths)
    }

    /// Schedule a raw channel-voice message on the current channel.
    pub fn midi_event(&self, command: u8, data1: u8, data2: u8) -> Result<(), EngineError> {
        self.unit.engine().schedule_midi(
            self.unit.handle.id(),
            midi::status_byte(command, self.channel),
            data1,
            data2,
            0,
        )
    }

    pub fn midi_note_on(&self, note: u8, velocity: u8) -> Result<(), EngineError> {
        self.midi_event(midi::NOTE_ON, note, velocity)
    }

    pub fn midi_note_off(&self, note: u8, velocity: u8) -> Result<(), EngineError> {
        self.midi_event(midi::NOTE_OFF, note, velocity)
    }

    /// Select a bank via the MSB/LSB controller pair.
    pub fn set_bank(&self, msb: u8, lsb: u8) -> Result<(), EngineError> {
        self.midi_event(midi::CONTROL_CHANGE, midi::BANK_MSB_CONTROL, msb)?;
        self.midi_event(midi::CONTROL_CHANGE, midi::BANK_LSB_CONTROL, lsb)
    }

    pub fn set_program(&self, program: u8) -> Result<(), EngineError> {
        self.midi_event(midi::PROGRAM_CHANGE, program, 0)
    }

    /// Channel used by every subsequent message. Values above 15 wrap.
    pub fn set_channel(&mut self, channel: u8) {
        self.channel = channel & 0x0F;
    }

    pub fn channel(&self) -> u8 {
        self.channel
    }

    /// The instrument's master gain.
    pub fn set_volume(&self, volume: f32) -> Result<(), EngineError> {
        self.unit
            .set_parameter(param::device::VOLUME, Scope::Global, volume, 0)
    }
}

impl Deref for Sampler {
    type Target = AudioUnit;

    fn deref(&self) -> &AudioUnit {
        &self.unit
    }
}

impl UnitRef for Sampler {
    fn unit(&self) -> &AudioUnit {
        &self.unit
    }
}
