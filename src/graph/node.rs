//! The base node: one opaque engine unit plus the connect/render protocol.

use std::sync::{Arc, Weak};

use log::debug;

use crate::buffer::BufferList;
use crate::engine::{
    AudioEngine, EngineError, GraphError, ParameterId, RenderError, RenderFlags, RenderSource,
    Scope, Timestamp, UnitDescriptor, UnitId,
};

/// Reference-counted guard around an instantiated unit. The unit is
/// disposed exactly once, when the last holder drops. Render callbacks keep
/// a clone, so a producer stays alive for as long as any consumer's bus
/// still pulls it.
///
/// The guard holds the engine weakly: nodes carry the strong reference, so
/// callbacks parked inside an engine never keep that engine alive. Every
/// use upgrades and checks liveness first.
pub(crate) struct UnitGuard {
    engine: Weak<dyn AudioEngine>,
    id: UnitId,
}

impl Drop for UnitGuard {
    fn drop(&mut self) {
        if let Some(engine) = self.engine.upgrade() {
            engine.dispose(self.id);
        }
    }
}

#[derive(Clone)]
pub(crate) struct UnitHandle(Arc<UnitGuard>);

impl UnitHandle {
    pub(crate) fn id(&self) -> UnitId {
        self.0.id
    }

    pub(crate) fn render(
        &self,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        bus: u32,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError> {
        let Some(engine) = self.0.engine.upgrade() else {
            return Err(RenderError::InvalidUnit);
        };
        engine.render(self.0.id, flags, timestamp, bus, frames, data)
    }

    pub(crate) fn set_render_source(
        &self,
        bus: u32,
        source: Option<Box<dyn RenderSource>>,
    ) -> Result<(), EngineError> {
        let engine = self.0.engine.upgrade().ok_or(EngineError::BadHandle)?;
        engine.set_render_source(self.0.id, bus, source)
    }
}

/// Pulls a producer unit's output bus. This is what `connect_to` installs
/// on the consumer side.
pub(crate) struct UnitPull {
    handle: UnitHandle,
    source_bus: u32,
}

impl RenderSource for UnitPull {
    fn pull(
        &mut self,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError> {
        self.handle.render(flags, timestamp, self.source_bus, frames, data)
    }
}

/// Anything that exposes a base [`AudioUnit`]: the node itself and every
/// variant. Lets connection targets be spelled uniformly.
pub trait UnitRef {
    fn unit(&self) -> &AudioUnit;
}

/// A node in the audio graph, wrapping exactly one opaque processing unit.
///
/// There is deliberately no `Clone` impl: duplicating a node re-resolves a
/// fresh unit from the descriptor (see [`AudioUnit::try_clone`]) and does
/// not carry connections or render state.
pub struct AudioUnit {
    descriptor: UnitDescriptor,
    engine: Arc<dyn AudioEngine>,
    pub(crate) handle: UnitHandle,
}

impl AudioUnit {
    /// Instantiate the unit described by `descriptor`. Fails if the engine
    /// cannot resolve or initialize it; the node is not constructed in that
    /// case, so there is no unusable half-built state to check for.
    pub fn new(
        engine: Arc<dyn AudioEngine>,
        descriptor: UnitDescriptor,
    ) -> Result<Self, EngineError> {
        let id = engine.instantiate(&descriptor)?;
        let handle = UnitHandle(Arc::new(UnitGuard {
            engine: Arc::downgrade(&engine),
            id,
        }));
        Ok(Self {
            descriptor,
            engine,
            handle,
        })
    }

    pub fn descriptor(&self) -> UnitDescriptor {
        self.descriptor
    }

    /// The engine's handle for the wrapped unit, for callers that need to
    /// address it through engine-level APIs directly.
    pub fn unit_id(&self) -> UnitId {
        self.handle.id()
    }

    /// Re-resolve a fresh unit from this node's descriptor.
    ///
    /// The duplicate shares nothing with the original: no connections, no
    /// render state, no parameter values.
    pub fn try_clone(&self) -> Result<AudioUnit, EngineError> {
        AudioUnit::new(self.engine.clone(), self.descriptor)
    }

    /// Register this node as the render source pulled by `destination`'s
    /// input `destination_bus`, feeding from this node's `source_bus`.
    /// Reconnecting overwrites whatever was registered on that bus before.
    ///
    /// Fails with [`GraphError::BusOutOfRange`] when `destination_bus` is
    /// not below the destination's current input-bus count; nothing is
    /// installed in that case.
    pub fn connect_to<U: UnitRef>(
        &self,
        destination: &U,
        destination_bus: u32,
        source_bus: u32,
    ) -> Result<(), GraphError> {
        let destination = destination.unit();
        let count = destination.input_bus_count();
        if destination_bus >= count {
            return Err(GraphError::BusOutOfRange {
                bus: destination_bus,
                count,
            });
        }
        let pull = UnitPull {
            handle: self.handle.clone(),
            source_bus,
        };
        destination
            .handle
            .set_render_source(destination_bus, Some(Box::new(pull)))?;
        debug!(
            "connected {:?} bus {source_bus} -> {:?} bus {destination_bus}",
            self.handle.id(),
            destination.handle.id()
        );
        Ok(())
    }

    /// Connect with the default buses (source 0 into destination 0).
    pub fn connect<U: UnitRef>(&self, destination: &U) -> Result<(), GraphError> {
        self.connect_to(destination, 0, 0)
    }

    /// Route this node into a tap; the tap forwards to its own destination
    /// once [`crate::graph::Tap::connect_to`] is called.
    pub fn connect_to_tap(&self, tap: &mut crate::graph::Tap) {
        tap.set_source(self);
    }

    /// Pull `frames` frames from this node's output `bus` into `data`.
    /// This is the operation every connection ultimately chains to.
    pub fn render(
        &self,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        bus: u32,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError> {
        self.handle.render(flags, timestamp, bus, frames, data)
    }

    /// Direct pass-through to the unit; no buffering, no validation beyond
    /// what the engine enforces.
    pub fn set_parameter(
        &self,
        parameter: ParameterId,
        scope: Scope,
        value: f32,
        bus: u32,
    ) -> Result<(), EngineError> {
        self.engine
            .set_parameter(self.handle.id(), parameter, scope, bus, value)
    }

    pub fn get_parameter(
        &self,
        parameter: ParameterId,
        scope: Scope,
        bus: u32,
    ) -> Result<f32, EngineError> {
        self.engine.get_parameter(self.handle.id(), parameter, scope, bus)
    }

    pub fn reset(&self) {
        self.engine.reset(self.handle.id());
    }

    pub fn input_bus_count(&self) -> u32 {
        self.engine.input_bus_count(self.handle.id())
    }

    pub fn output_bus_count(&self) -> u32 {
        self.engine.output_bus_count(self.handle.id())
    }

    /// Reconfigure the unit's input-bus topology. Call before establishing
    /// connections that reference the new bus indices.
    pub fn set_input_bus_count(&self, count: u32) -> Result<(), EngineError> {
        self.engine.set_input_bus_count(self.handle.id(), count)
    }

    pub fn set_output_bus_count(&self, count: u32) -> Result<(), EngineError> {
        self.engine.set_output_bus_count(self.handle.id(), count)
    }

    pub(crate) fn engine(&self) -> &Arc<dyn AudioEngine> {
        &self.engine
    }
}

impl UnitRef for AudioUnit {
    fn unit(&self) -> &AudioUnit {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::descriptor::{subtype, UnitType};
    use crate::engine::SoftwareEngine;

    fn engine() -> Arc<SoftwareEngine> {
        Arc::new(SoftwareEngine::new())
    }

    fn ramp(engine: &Arc<SoftwareEngine>) -> AudioUnit {
        AudioUnit::new(
            engine.clone(),
            UnitDescriptor::new(UnitType::Generator, subtype::RAMP_GENERATOR),
        )
        .unwrap()
    }

    fn passthrough(engine: &Arc<SoftwareEngine>) -> AudioUnit {
        AudioUnit::new(
            engine.clone(),
            UnitDescriptor::new(UnitType::Effect, subtype::PASSTHROUGH),
        )
        .unwrap()
    }

    #[test]
    fn construction_fails_for_unknown_descriptor() {
        let descriptor =
            UnitDescriptor::new(UnitType::Effect, crate::engine::descriptor::four_cc(b"zzzz"));
        assert!(AudioUnit::new(engine(), descriptor).is_err());
    }

    #[test]
    fn connect_chains_render_pulls() {
        let engine = engine();
        let source = ramp(&engine);
        let effect = passthrough(&engine);
        source.connect(&effect).unwrap();

        let mut data = BufferList::new(2, 4);
        let mut flags = RenderFlags::default();
        effect
            .render(&mut flags, &Timestamp::default(), 0, 4, &mut data)
            .unwrap();
        assert_eq!(data.channel(0), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn out_of_range_bus_fails_and_installs_nothing() {
        let engine = engine();
        let source = ramp(&engine);
        let effect = passthrough(&engine);

        let err = source.connect_to(&effect, 5, 0).unwrap_err();
        assert!(matches!(err, GraphError::BusOutOfRange { bus: 5, count: 1 }));

        // Render is unchanged: nothing feeds the effect.
        let mut data = BufferList::new(2, 4);
        let mut flags = RenderFlags::default();
        effect
            .render(&mut flags, &Timestamp::default(), 0, 4, &mut data)
            .unwrap();
        assert!(flags.output_is_silence);
        assert!(data.channel(0).iter().all(|&s| s == 0.0));
    }

    #[test]
    fn reconnecting_overwrites_the_prior_registration() {
        let engine = engine();
        let ramp_node = ramp(&engine);
        let level = AudioUnit::new(
            engine.clone(),
            UnitDescriptor::new(UnitType::Generator, subtype::LEVEL_GENERATOR),
        )
        .unwrap();
        level
            .set_parameter(crate::engine::param::generator::LEVEL, Scope::Global, 0.25, 0)
            .unwrap();
        let effect = passthrough(&engine);

        ramp_node.connect(&effect).unwrap();
        level.connect(&effect).unwrap();

        let mut data = BufferList::new(2, 4);
        let mut flags = RenderFlags::default();
        effect
            .render(&mut flags, &Timestamp::default(), 0, 4, &mut data)
            .unwrap();
        assert_eq!(data.channel(0), &[0.25; 4]);
    }

    #[test]
    fn try_clone_resolves_a_fresh_unit_without_connections() {
        let engine = engine();
        let source = ramp(&engine);
        let effect = passthrough(&engine);
        source.connect(&effect).unwrap();

        let copy = effect.try_clone().unwrap();
        assert_eq!(copy.descriptor(), effect.descriptor());

        // The duplicate has no upstream connection.
        let mut data = BufferList::new(2, 4);
        let mut flags = RenderFlags::default();
        copy.render(&mut flags, &Timestamp::default(), 0, 4, &mut data)
            .unwrap();
        assert!(flags.output_is_silence);
    }

    #[test]
    fn producer_outlives_its_node_while_connected() {
        let engine = engine();
        let effect = passthrough(&engine);
        let source_id;
        {
            let source = ramp(&engine);
            source_id = source.handle.id();
            source.connect(&effect).unwrap();
        }
        // The node is gone, but the connection's handle keeps the unit
        // alive and pulling.
        assert!(engine.exists(source_id));
        let mut data = BufferList::new(2, 4);
        let mut flags = RenderFlags::default();
        effect
            .render(&mut flags, &Timestamp::default(), 0, 4, &mut data)
            .unwrap();
        assert_eq!(data.channel(0), &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn dropping_the_node_disposes_the_unit() {
        let engine = engine();
        let id;
        {
            let source = ramp(&engine);
            id = source.handle.id();
        }
        assert!(!engine.exists(id));
    }
}
