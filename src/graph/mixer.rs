//! The multichannel mixer node: per-bus volume and pan, a master volume,
//! and optional peak metering.

use std::ops::Deref;
use std::sync::Arc;

use crate::engine::descriptor::{param, subtype, Scope, UnitDescriptor, UnitType};
use crate::engine::{AudioEngine, EngineError};
use crate::graph::node::{AudioUnit, UnitRef};

/// Wraps the multichannel mixer unit. Every input bus is summed into one
/// stereo output after per-bus volume and pan; the master volume applies
/// last.
pub struct Mixer {
    unit: AudioUnit,
}

impl Mixer {
    pub fn new(engine: Arc<dyn AudioEngine>) -> Result<Self, EngineError> {
        let unit = AudioUnit::new(
            engine,
            UnitDescriptor::new(UnitType::Mixer, subtype::MULTICHANNEL_MIXER),
        )?;
        Ok(Self { unit })
    }

    /// Linear gain applied to one input bus before summing.
    pub fn set_input_volume(&self, bus: u32, volume: f32) -> Result<(), EngineError> {
        self.unit
            .set_parameter(param::mixer::INPUT_VOLUME, Scope::Input, volume, bus)
    }

    /// Stereo pan for one input bus, -1 (hard left) to 1 (hard right).
    pub fn set_pan(&self, bus: u32, pan: f32) -> Result<(), EngineError> {
        self.unit
            .set_parameter(param::mixer::PAN, Scope::Input, pan, bus)
    }

    /// Master gain applied after summing.
    pub fn set_output_volume(&self, volume: f32) -> Result<(), EngineError> {
        self.unit
            .set_parameter(param::mixer::OUTPUT_VOLUME, Scope::Output, volume, 0)
    }

    pub fn enable_input_metering(&self, bus: u32) -> Result<(), EngineError> {
        self.unit
            .engine()
            .set_metering(self.unit.handle.id(), Scope::Input, bus, true)
    }

    pub fn disable_input_metering(&self, bus: u32) -> Result<(), EngineError> {
        self.unit
            .engine()
            .set_metering(self.unit.handle.id(), Scope::Input, bus, false)
    }

    pub fn enable_output_metering(&self) -> Result<(), EngineError> {
        self.unit
            .engine()
            .set_metering(self.unit.handle.id(), Scope::Output, 0, true)
    }

    pub fn disable_output_metering(&self) -> Result<(), EngineError> {
        self.unit
            .engine()
            .set_metering(self.unit.handle.id(), Scope::Output, 0, false)
    }

    /// Post-mix level of one input bus, in decibels.
    ///
    /// Only meaningful after [`Mixer::enable_input_metering`] for that bus;
    /// before that the engine reports a stale value rather than failing.
    pub fn input_level(&self, bus: u32) -> Result<f32, EngineError> {
        self.unit
            .get_parameter(param::mixer::POST_AVERAGE_POWER, Scope::Input, bus)
    }

    /// Post-mix output level in decibels; same staleness caveat as
    /// [`Mixer::input_level`].
    pub fn output_level(&self) -> Result<f32, EngineError> {
        self.unit
            .get_parameter(param::mixer::POST_AVERAGE_POWER, Scope::Output, 0)
    }
}

impl Deref for Mixer {
    type Target = AudioUnit;

    fn deref(&self) -> &AudioUnit {
        &self.unit
    }
}

impl UnitRef for Mixer {
    fn unit(&self) -> &AudioUnit {
        &self.unit
    }
}
