//! Transparent sample interception.
//!
//! A tap splices between a source node and a destination node: the
//! destination pulls the tap, the tap pulls the source, and on every
//! successful pull it snapshots the rendered samples for the UI thread.
//! Audio passes through unchanged. The snapshot lock is held only for the
//! bounded copy, never across the upstream render.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::buffer::BufferList;
use crate::engine::{
    EngineError, GraphError, RenderError, RenderFlags, RenderSource, Timestamp,
};
use crate::graph::node::{AudioUnit, UnitHandle, UnitRef};
use crate::DEFAULT_CHANNELS;

/// Screen-space polyline, one point per tracked sample.
pub type Waveform = Vec<(f32, f32)>;

/// Reusable destination for [`Tap::get_samples`]; the vectors are cleared
/// and refilled so repeated reads do not reallocate.
#[derive(Debug, Default, Clone)]
pub struct TapSamples {
    pub left: Vec<f32>,
    pub right: Vec<f32>,
}

struct TapShared {
    tracked: Mutex<BufferList>,
}

fn lock(tracked: &Mutex<BufferList>) -> MutexGuard<'_, BufferList> {
    tracked.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// The render source installed on the destination's bus: renders the
/// source, then snapshots on success. A failed upstream render leaves the
/// previous snapshot intact.
struct TapRender {
    handle: UnitHandle,
    source_bus: u32,
    shared: Arc<TapShared>,
}

impl RenderSource for TapRender {
    fn pull(
        &mut self,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError> {
        self.handle
            .render(flags, timestamp, self.source_bus, frames, data)?;
        let mut tracked = lock(&self.shared.tracked);
        tracked.resize_frames(frames);
        tracked.copy_from(data);
        Ok(())
    }
}

/// Intercepts samples flowing between two nodes.
///
/// Wire it with [`AudioUnit::connect_to_tap`] (or [`Tap::set_source`]) and
/// then [`Tap::connect_to`]; until both ends exist the destination keeps
/// rendering whatever it was connected to before.
pub struct Tap {
    shared: Arc<TapShared>,
    source: Option<UnitHandle>,
    destination: Option<(UnitHandle, u32)>,
}

impl Default for Tap {
    fn default() -> Self {
        Self::new()
    }
}

impl Tap {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TapShared {
                tracked: Mutex::new(BufferList::new(DEFAULT_CHANNELS, 0)),
            }),
            source: None,
            destination: None,
        }
    }

    /// Set the node whose output this tap intercepts.
    pub fn set_source(&mut self, source: &AudioUnit) {
        self.source = Some(source.handle.clone());
    }

    /// Install the tap on `destination`'s input `destination_bus`, pulling
    /// the source's `source_bus`. Requires a source; replaces whatever the
    /// destination bus was pulling before.
    pub fn connect_to<U: UnitRef>(
        &mut self,
        destination: &U,
        destination_bus: u32,
        source_bus: u32,
    ) -> Result<(), GraphError> {
        let handle = self.source.clone().ok_or(GraphError::NoSource)?;
        let destination = destination.unit();
        let count = destination.input_bus_count();
        if destination_bus >= count {
            return Err(GraphError::BusOutOfRange {
                bus: destination_bus,
                count,
            });
        }
        let render = TapRender {
            handle,
            source_bus,
            shared: self.shared.clone(),
        };
        destination
            .handle
            .set_render_source(destination_bus, Some(Box::new(render)))?;
        self.destination = Some((destination.handle.clone(), destination_bus));
        Ok(())
    }

    /// Connect with the default buses (source 0 into destination 0).
    pub fn connect<U: UnitRef>(&mut self, destination: &U) -> Result<(), GraphError> {
        self.connect_to(destination, 0, 0)
    }

    /// Remove the tap's render source from the destination bus. The bus is
    /// left unconnected; the last snapshot stays readable.
    pub fn disconnect(&mut self) -> Result<(), EngineError> {
        if let Some((handle, bus)) = self.destination.take() {
            handle.set_render_source(bus, None)?;
        }
        Ok(())
    }

    /// Copy the most recent snapshot into `out`. The copy is bounded by the
    /// tracked buffer size; this never waits on a render in progress longer
    /// than the render's own snapshot copy.
    pub fn get_samples(&self, out: &mut TapSamples) {
        let tracked = lock(&self.shared.tracked);
        out.left.clear();
        out.right.clear();
        if tracked.channels() == 0 {
            return;
        }
        out.left.extend_from_slice(tracked.channel(0));
        let right = if tracked.channels() > 1 { 1 } else { 0 };
        out.right.extend_from_slice(tracked.channel(right));
    }

    /// The left channel's snapshot as a polyline scaled to `width` by
    /// `height`: sample 1.0 maps to y = 0, sample -1.0 to y = `height`.
    pub fn get_left_waveform(&self, width: f32, height: f32) -> Waveform {
        let tracked = lock(&self.shared.tracked);
        if tracked.channels() == 0 {
            return Waveform::new();
        }
        scale_to_polyline(tracked.channel(0), width, height)
    }

    pub fn get_right_waveform(&self, width: f32, height: f32) -> Waveform {
        let tracked = lock(&self.shared.tracked);
        if tracked.channels() == 0 {
            return Waveform::new();
        }
        let right = if tracked.channels() > 1 { 1 } else { 0 };
        scale_to_polyline(tracked.channel(right), width, height)
    }

    /// Both channels scaled in one lock acquisition.
    pub fn get_stereo_waveform(&self, width: f32, height: f32) -> (Waveform, Waveform) {
        let tracked = lock(&self.shared.tracked);
        if tracked.channels() == 0 {
            return (Waveform::new(), Waveform::new());
        }
        let right = if tracked.channels() > 1 { 1 } else { 0 };
        (
            scale_to_polyline(tracked.channel(0), width, height),
            scale_to_polyline(tracked.channel(right), width, height),
        )
    }
}

impl Drop for Tap {
    fn drop(&mut self) {
        let _ = self.disconnect();
    }
}

fn scale_to_polyline(samples: &[f32], width: f32, height: f32) -> Waveform {
    let n = samples.len();
    samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let x = i as f32 * width / n as f32;
            let y = (1.0 - (s + 1.0) / 2.0) * height;
            (x, y)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::descriptor::{param, subtype, Scope, UnitDescriptor, UnitType};
    use crate::engine::{AudioEngine, SoftwareEngine};

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

    fn level(engine: &Arc<SoftwareEngine>, value: f32) -> AudioUnit {
        let unit = AudioUnit::new(
            engine.clone(),
            UnitDescriptor::new(UnitType::Generator, subtype::LEVEL_GENERATOR),
        )
        .unwrap();
        unit.set_parameter(param::generator::LEVEL, Scope::Global, value, 0)
            .unwrap();
        unit
    }

    fn render(unit: &AudioUnit, frames: usize) -> BufferList {
        let mut data = BufferList::new(2, frames);
        let mut flags = RenderFlags::default();
        unit.render(&mut flags, &Timestamp::default(), 0, frames, &mut data)
            .unwrap();
        data
    }

    #[test]
    fn connect_without_a_source_fails() {
        let engine = engine();
        let effect = passthrough(&engine);
        let mut tap = Tap::new();
        assert!(matches!(tap.connect(&effect), Err(GraphError::NoSource)));
    }

    #[test]
    fn audio_passes_through_unchanged_and_is_snapshotted() {
        let engine = engine();
        let source = ramp(&engine);
        let effect = passthrough(&engine);
        let mut tap = Tap::new();
        source.connect_to_tap(&mut tap);
        tap.connect(&effect).unwrap();

        let data = render(&effect, 4);
        assert_eq!(data.channel(0), &[0.0, 1.0, 2.0, 3.0]);

        let mut samples = TapSamples::default();
        tap.get_samples(&mut samples);
        assert_eq!(samples.left, &[0.0, 1.0, 2.0, 3.0]);
        assert_eq!(samples.right, &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn failed_renders_keep_the_previous_snapshot() {
        let engine = engine();
        let source = ramp(&engine);
        let source_id = source.handle.id();
        let effect = passthrough(&engine);
        let mut tap = Tap::new();
        source.connect_to_tap(&mut tap);
        tap.connect(&effect).unwrap();
        render(&effect, 4);

        // Yank the source out from under the tap; the pull now fails and
        // the snapshot must not change.
        engine.dispose(source_id);
        let mut data = BufferList::new(2, 4);
        let mut flags = RenderFlags::default();
        assert_eq!(
            effect.render(&mut flags, &Timestamp::default(), 0, 4, &mut data),
            Err(RenderError::InvalidUnit)
        );
        let mut samples = TapSamples::default();
        tap.get_samples(&mut samples);
        assert_eq!(samples.left, &[0.0, 1.0, 2.0, 3.0]);
    }

    #[test]
    fn disconnect_unhooks_the_destination_bus() {
        let engine = engine();
        let source = level(&engine, 0.5);
        let effect = passthrough(&engine);
        let mut tap = Tap::new();
        source.connect_to_tap(&mut tap);
        tap.connect(&effect).unwrap();
        render(&effect, 4);

        tap.disconnect().unwrap();
        let mut data = BufferList::new(2, 4);
        let mut flags = RenderFlags::default();
        effect
            .render(&mut flags, &Timestamp::default(), 0, 4, &mut data)
            .unwrap();
        assert!(flags.output_is_silence);

        // The last snapshot survives disconnection.
        let mut samples = TapSamples::default();
        tap.get_samples(&mut samples);
        assert_eq!(samples.left, &[0.5; 4]);
    }

    #[test]
    fn waveform_maps_full_scale_to_the_view_edges() {
        let engine = engine();
        let effect = passthrough(&engine);

        let top = level(&engine, 1.0);
        let mut tap = Tap::new();
        top.connect_to_tap(&mut tap);
        tap.connect(&effect).unwrap();
        render(&effect, 4);
        for &(_, y) in &tap.get_left_waveform(100.0, 60.0) {
            assert_eq!(y, 0.0);
        }

        let bottom = level(&engine, -1.0);
        bottom.connect_to_tap(&mut tap);
        tap.connect(&effect).unwrap();
        render(&effect, 4);
        let wave = tap.get_right_waveform(100.0, 60.0);
        for &(_, y) in &wave {
            assert_eq!(y, 60.0);
        }
        // Samples spread evenly across the width.
        assert_eq!(wave[0].0, 0.0);
        assert_eq!(wave[1].0, 25.0);
        assert_eq!(wave[3].0, 75.0);
    }

    #[test]
    fn silence_maps_to_the_vertical_midpoint() {
        let engine = engine();
        let source = level(&engine, 0.0);
        let effect = passthrough(&engine);
        let mut tap = Tap::new();
        source.connect_to_tap(&mut tap);
        tap.connect(&effect).unwrap();
        render(&effect, 4);

        let (left, right) = tap.get_stereo_waveform(100.0, 60.0);
        assert!(left.iter().all(|&(_, y)| y == 30.0));
        assert!(right.iter().all(|&(_, y)| y == 30.0));
    }

    #[test]
    fn concurrent_reads_never_see_a_torn_buffer() {
        let engine = engine();
        let source = ramp(&engine);
        let effect = passthrough(&engine);
        let mut tap = Tap::new();
        source.connect_to_tap(&mut tap);
        tap.connect(&effect).unwrap();

        let renderer = std::thread::spawn(move || {
            let mut data = BufferList::new(2, 64);
            let mut flags = RenderFlags::default();
            for _ in 0..1000 {
                effect
                    .render(&mut flags, &Timestamp::default(), 0, 64, &mut data)
                    .unwrap();
            }
        });

        // Each rendered buffer is a strict +1 ramp, so any mix of two
        // renders in one snapshot shows up as a discontinuity.
        let mut samples = TapSamples::default();
        for _ in 0..1000 {
            tap.get_samples(&mut samples);
            for pair in samples.left.windows(2) {
                assert_eq!(pair[1] - pair[0], 1.0);
            }
        }
        renderer.join().unwrap();
    }
}
