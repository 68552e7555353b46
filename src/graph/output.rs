//! The hardware output node: the terminal sink whose start/stop drives the
//! whole pull graph.

use std::ops::Deref;
use std::sync::Arc;

use log::info;

use crate::engine::descriptor::{subtype, UnitDescriptor, UnitType};
use crate::engine::{AudioEngine, EngineError};
use crate::graph::node::{AudioUnit, UnitRef};

/// Wraps the hardware output unit. While started, the engine's realtime
/// thread pulls this node's input bus once per callback, which recursively
/// pulls everything connected upstream.
pub struct OutputUnit {
    unit: AudioUnit,
}

impl OutputUnit {
    pub fn new(engine: Arc<dyn AudioEngine>) -> Result<Self, EngineError> {
        let unit = AudioUnit::new(
            engine,
            UnitDescriptor::new(UnitType::Output, subtype::HARDWARE_OUTPUT),
        )?;
        Ok(Self { unit })
    }

    /// Begin pulling. Idempotent: starting a running output is a no-op.
    pub fn start(&self) -> Result<(), EngineError> {
        self.unit.engine().start(self.unit.handle.id())?;
        info!("output {:?} started", self.unit.handle.id());
        Ok(())
    }

    /// Stop pulling. Idempotent, and safe to call on a never-started unit.
    pub fn stop(&self) -> Result<(), EngineError> {
        self.unit.engine().stop(self.unit.handle.id())
    }
}

impl Drop for OutputUnit {
    fn drop(&mut self) {
        // Halt the realtime pull before the inner node disposes the unit,
        // so no callback runs against a dying graph.
        let _ = self.stop();
    }
}

impl Deref for OutputUnit {
    type Target = AudioUnit;

    fn deref(&self) -> &AudioUnit {
        &self.unit
    }
}

impl UnitRef for OutputUnit {
    fn unit(&self) -> &AudioUnit {
        &self.unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::SoftwareEngine;

    #[test]
    fn start_and_stop_are_idempotent() {
        let engine = Arc::new(SoftwareEngine::new());
        let output = OutputUnit::new(engine.clone()).unwrap();
        let id = output.unit.handle.id();

        assert!(!engine.is_running(id));
        output.start().unwrap();
        output.start().unwrap();
        assert!(engine.is_running(id));
        output.stop().unwrap();
        output.stop().unwrap();
        assert!(!engine.is_running(id));
    }

    #[test]
    fn running_output_drives_the_pull_graph() {
        let engine = Arc::new(SoftwareEngine::new());
        let source = AudioUnit::new(
            engine.clone(),
            UnitDescriptor::new(UnitType::Generator, subtype::RAMP_GENERATOR),
        )
        .unwrap();
        let output = OutputUnit::new(engine.clone()).unwrap();
        source.connect(&output).unwrap();

        assert!(engine.pump(4).is_err());
        output.start().unwrap();
        let data = engine.pump(4).unwrap();
        assert_eq!(data.channel(0), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn dropping_a_running_output_stops_and_disposes_it() {
        let engine = Arc::new(SoftwareEngine::new());
        let id;
        {
            let output = OutputUnit::new(engine.clone()).unwrap();
            output.start().unwrap();
            id = output.unit.handle.id();
            assert!(engine.is_running(id));
        }
        assert!(!engine.exists(id));
        assert!(engine.pump(4).is_err());
    }
}
