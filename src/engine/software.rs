//! A pure-Rust reference engine.
//!
//! Stands in for the platform host so graphs can be built, rendered and
//! tested offline: deterministic generator units, a summing mixer with
//! peak metering, passthrough effects, output/input units with a
//! `pump`/`feed_input` harness simulating the realtime and hardware
//! threads, a sampler that records scheduled MIDI, and a file player whose
//! "decoder" only checks that the file exists.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::buffer::BufferList;
use crate::engine::descriptor::{param, subtype, ParameterId, Scope, UnitDescriptor, UnitId, UnitType};
use crate::engine::error::{EngineError, RenderError};
use crate::engine::{
    AudioEngine, CaptureSink, FileInfo, FileRegion, LoopCount, RenderFlags, RenderSource, Timestamp,
};
use crate::DEFAULT_CHANNELS;

/// A channel-voice message recorded by a sampler unit, for inspection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MidiRecord {
    pub status: u8,
    pub data1: u8,
    pub data2: u8,
    pub frame_offset: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behavior {
    RampGenerator,
    LevelGenerator,
    Mixer,
    Passthrough,
    Output,
    Input,
    Sampler,
    FilePlayer,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct ParamSnapshot {
    parameter: u32,
    scope: Scope,
    bus: u32,
    value: f32,
}

struct Meter {
    scope: Scope,
    bus: u32,
    enabled: bool,
    peak: f32,
}

struct Schedule {
    region: FileRegion,
    position: u64,
    plays_done: u32,
}

struct UnitState {
    behavior: Behavior,
    running: bool,
    inputs: Vec<Option<Box<dyn RenderSource>>>,
    output_buses: u32,
    params: Vec<ParamSnapshot>,
    meters: Vec<Meter>,
    capture: Option<Box<dyn CaptureSink>>,
    scratch: BufferList,
    phase: u64,
    midi: Vec<MidiRecord>,
    file: Option<FileInfo>,
    schedule: Option<Schedule>,
    voices: Vec<PathBuf>,
}

impl UnitState {
    fn new(behavior: Behavior, input_buses: usize) -> Self {
        Self {
            behavior,
            running: false,
            inputs: (0..input_buses).map(|_| None).collect(),
            output_buses: 1,
            params: Vec::new(),
            meters: Vec::new(),
            capture: None,
            scratch: BufferList::new(DEFAULT_CHANNELS, 0),
            phase: 0,
            midi: Vec::new(),
            file: None,
            schedule: None,
            voices: Vec::new(),
        }
    }

    fn param(&self, parameter: ParameterId, scope: Scope, bus: u32) -> Option<f32> {
        self.params
            .iter()
            .find(|p| p.parameter == parameter.0 && p.scope == scope && p.bus == bus)
            .map(|p| p.value)
    }

    fn set_param(&mut self, parameter: ParameterId, scope: Scope, bus: u32, value: f32) {
        if let Some(slot) = self
            .params
            .iter_mut()
            .find(|p| p.parameter == parameter.0 && p.scope == scope && p.bus == bus)
        {
            slot.value = value;
        } else {
            self.params.push(ParamSnapshot {
                parameter: parameter.0,
                scope,
                bus,
                value,
            });
        }
    }

    fn meter_peak(&self, scope: Scope, bus: u32) -> Option<f32> {
        self.meters
            .iter()
            .find(|m| m.scope == scope && m.bus == bus)
            .map(|m| m.peak)
    }

    fn track_peak(&mut self, scope: Scope, bus: u32, peak: f32) {
        if let Some(meter) = self
            .meters
            .iter_mut()
            .find(|m| m.scope == scope && m.bus == bus && m.enabled)
        {
            meter.peak = peak;
        }
    }
}

/// The reference [`AudioEngine`]. Thread-safe; each unit carries its own
/// lock so rendering one chain never serializes against configuring
/// another. Graphs must be acyclic, as with any pull graph.
pub struct SoftwareEngine {
    units: Mutex<Vec<Option<Arc<Mutex<UnitState>>>>>,
    clock: AtomicU64,
}

impl Default for SoftwareEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn to_decibels(peak: f32) -> f32 {
    if peak <= 0.0 {
        -120.0
    } else {
        (20.0 * peak.log10()).clamp(-120.0, 0.0)
    }
}

impl SoftwareEngine {
    pub fn new() -> Self {
        Self {
            units: Mutex::new(Vec::new()),
            clock: AtomicU64::new(0),
        }
    }

    fn unit(&self, id: UnitId) -> Option<Arc<Mutex<UnitState>>> {
        lock(&self.units).get(id.0 as usize).cloned().flatten()
    }

    fn state(&self, id: UnitId) -> Result<Arc<Mutex<UnitState>>, EngineError> {
        self.unit(id).ok_or(EngineError::BadHandle)
    }

    /// Simulate one realtime callback: pull `frames` frames from the first
    /// running output unit. Advances the engine clock.
    pub fn pump(&self, frames: usize) -> Result<BufferList, RenderError> {
        let output = {
            let units = lock(&self.units);
            units
                .iter()
                .enumerate()
                .filter_map(|(i, u)| Some((i, u.as_ref()?)))
                .find(|(_, u)| {
                    let state = lock(u);
                    state.behavior == Behavior::Output && state.running
                })
                .map(|(i, _)| UnitId(i as u64))
        };
        let output = output.ok_or(RenderError::InvalidUnit)?;

        let sample_time = self.clock.fetch_add(frames as u64, Ordering::Relaxed);
        let timestamp = Timestamp {
            sample_time: sample_time as f64,
            host_time: sample_time,
        };
        let mut flags = RenderFlags::default();
        let mut data = BufferList::new(DEFAULT_CHANNELS, frames);
        self.render(output, &mut flags, &timestamp, 0, frames, &mut data)?;
        Ok(data)
    }

    /// Simulate a hardware capture interrupt delivering `data` to a running
    /// input unit's capture sink.
    pub fn feed_input(&self, unit: UnitId, data: &BufferList) {
        let Some(state) = self.unit(unit) else {
            warn!("feed_input: unit {unit:?} does not exist");
            return;
        };
        let mut state = lock(&state);
        if !state.running {
            return;
        }
        let sample_time = self.clock.load(Ordering::Relaxed);
        let timestamp = Timestamp {
            sample_time: sample_time as f64,
            host_time: sample_time,
        };
        if let Some(sink) = state.capture.as_mut() {
            sink.deliver(&timestamp, data);
        }
    }

    /// MIDI messages scheduled on a sampler unit so far, oldest first.
    pub fn midi_log(&self, unit: UnitId) -> Vec<MidiRecord> {
        self.unit(unit)
            .map(|state| lock(&state).midi.clone())
            .unwrap_or_default()
    }

    /// Sample paths loaded into an instrument's voice table.
    pub fn voice_table(&self, unit: UnitId) -> Vec<PathBuf> {
        self.unit(unit)
            .map(|state| lock(&state).voices.clone())
            .unwrap_or_default()
    }

    pub fn is_running(&self, unit: UnitId) -> bool {
        self.unit(unit).map(|s| lock(&s).running).unwrap_or(false)
    }

    pub fn exists(&self, unit: UnitId) -> bool {
        self.unit(unit).is_some()
    }

    pub fn scheduled_region(&self, unit: UnitId) -> Option<FileRegion> {
        self.unit(unit)
            .and_then(|s| lock(&s).schedule.as_ref().map(|sched| sched.region))
    }

    fn render_behavior(
        &self,
        state: &mut UnitState,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError> {
        match state.behavior {
            Behavior::RampGenerator => {
                let base = state.phase;
                for channel in data.iter_channels_mut() {
                    for (i, sample) in channel.iter_mut().enumerate() {
                        *sample = (base + i as u64) as f32;
                    }
                }
                state.phase += frames as u64;
                Ok(())
            }
            Behavior::LevelGenerator => {
                let level = state
                    .param(param::generator::LEVEL, Scope::Global, 0)
                    .unwrap_or(0.0);
                for channel in data.iter_channels_mut() {
                    channel.fill(level);
                }
                Ok(())
            }
            Behavior::Passthrough | Behavior::Output => match state.inputs.get_mut(0) {
                Some(Some(source)) => source.pull(flags, timestamp, frames, data),
                _ => {
                    data.silence();
                    flags.output_is_silence = true;
                    Ok(())
                }
            },
            Behavior::Mixer => {
                data.silence();
                let UnitState {
                    inputs,
                    scratch,
                    params,
                    meters,
                    ..
                } = state;
                scratch.resize_frames(frames);
                let lookup = |parameter: ParameterId, scope: Scope, bus: u32, default: f32| {
                    params
                        .iter()
                        .find(|p| p.parameter == parameter.0 && p.scope == scope && p.bus == bus)
                        .map(|p| p.value)
                        .unwrap_or(default)
                };
                for (bus, slot) in inputs.iter_mut().enumerate() {
                    let Some(source) = slot else { continue };
                    scratch.silence();
                    source.pull(flags, timestamp, frames, scratch)?;

                    let bus = bus as u32;
                    let volume = lookup(param::mixer::INPUT_VOLUME, Scope::Input, bus, 1.0);
                    let pan = lookup(param::mixer::PAN, Scope::Input, bus, 0.0).clamp(-1.0, 1.0);
                    let gains = [volume * (1.0 - pan.max(0.0)), volume * (1.0 + pan.min(0.0))];
                    data.accumulate(scratch, &gains);

                    if let Some(meter) = meters
                        .iter_mut()
                        .find(|m| m.scope == Scope::Input && m.bus == bus && m.enabled)
                    {
                        meter.peak = scratch.peak() * volume;
                    }
                }
                let master = lookup(param::mixer::OUTPUT_VOLUME, Scope::Output, 0, 1.0);
                for channel in data.iter_channels_mut() {
                    for sample in channel.iter_mut() {
                        *sample *= master;
                    }
                }
                let peak = data.peak();
                state.track_peak(Scope::Output, 0, peak);
                Ok(())
            }
            Behavior::FilePlayer => {
                data.silence();
                // A zero-length region would never make progress.
                if state.schedule.as_ref().is_some_and(|s| s.region.frames == 0) {
                    state.schedule = None;
                }
                let Some(sched) = state.schedule.as_mut() else {
                    flags.output_is_silence = true;
                    return Ok(());
                };
                if let Some(start) = sched.region.start_host_time {
                    if timestamp.host_time < start {
                        flags.output_is_silence = true;
                        return Ok(());
                    }
                }
                let mut written = 0usize;
                let mut finished = false;
                while written < frames {
                    let left = sched.region.frames.saturating_sub(sched.position);
                    if left == 0 {
                        sched.plays_done += 1;
                        let again = match sched.region.loops {
                            LoopCount::Forever => true,
                            LoopCount::Times(n) => sched.plays_done < n,
                        };
                        if !again {
                            finished = true;
                            break;
                        }
                        sched.position = 0;
                        continue;
                    }
                    let n = (frames - written).min(left as usize);
                    for channel in data.iter_channels_mut() {
                        channel[written..written + n].fill(0.5);
                    }
                    sched.position += n as u64;
                    written += n;
                }
                if finished {
                    state.schedule = None;
                }
                Ok(())
            }
            // The sampler's voices and the input unit's capture stream are
            // opaque here; both render silence.
            Behavior::Sampler | Behavior::Input => {
                data.silence();
                flags.output_is_silence = true;
                Ok(())
            }
        }
    }
}

impl AudioEngine for SoftwareEngine {
    fn instantiate(&self, descriptor: &UnitDescriptor) -> Result<UnitId, EngineError> {
        let state = match (descriptor.unit_type, descriptor.subtype) {
            (UnitType::Output, s) if s == subtype::HARDWARE_OUTPUT => {
                UnitState::new(Behavior::Output, 1)
            }
            (UnitType::Output, s) if s == subtype::HARDWARE_INPUT => {
                UnitState::new(Behavior::Input, 0)
            }
            (UnitType::Mixer, s) if s == subtype::MULTICHANNEL_MIXER => {
                UnitState::new(Behavior::Mixer, 1)
            }
            (UnitType::Generator, s) if s == subtype::RAMP_GENERATOR => {
                UnitState::new(Behavior::RampGenerator, 0)
            }
            (UnitType::Generator, s) if s == subtype::LEVEL_GENERATOR => {
                UnitState::new(Behavior::LevelGenerator, 0)
            }
            (UnitType::Generator, s) if s == subtype::FILE_PLAYER => {
                UnitState::new(Behavior::FilePlayer, 0)
            }
            (UnitType::MusicDevice, s) if s == subtype::SAMPLER => {
                UnitState::new(Behavior::Sampler, 0)
            }
            (UnitType::Effect | UnitType::FormatConverter, s) if s == subtype::PASSTHROUGH => {
                UnitState::new(Behavior::Passthrough, 1)
            }
            _ => {
                warn!("no software unit matches descriptor {descriptor:?}");
                return Err(EngineError::ComponentNotFound(*descriptor));
            }
        };
        let mut units = lock(&self.units);
        let id = UnitId(units.len() as u64);
        units.push(Some(Arc::new(Mutex::new(state))));
        debug!("instantiated {descriptor:?} as {id:?}");
        Ok(id)
    }

    fn dispose(&self, unit: UnitId) {
        // Drop the removed state outside the critical section: a consumer's
        // inputs own `UnitHandle`s, and dropping the last one re-enters
        // `dispose`, which must not find `self.units` still locked.
        let removed = {
            let mut units = lock(&self.units);
            units.get_mut(unit.0 as usize).and_then(|slot| slot.take())
        };
        drop(removed);
    }

    fn render(
        &self,
        unit: UnitId,
        flags: &mut RenderFlags,
        timestamp: &Timestamp,
        _bus: u32,
        frames: usize,
        data: &mut BufferList,
    ) -> Result<(), RenderError> {
        let state = self.unit(unit).ok_or(RenderError::InvalidUnit)?;
        let mut state = lock(&state);
        data.resize_frames(frames);
        self.render_behavior(&mut state, flags, timestamp, frames, data)
    }

    fn set_render_source(
        &self,
        unit: UnitId,
        bus: u32,
        source: Option<Box<dyn RenderSource>>,
    ) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        let mut state = lock(&state);
        let count = state.inputs.len() as u32;
        let slot = state
            .inputs
            .get_mut(bus as usize)
            .ok_or(EngineError::InvalidBus { bus, count })?;
        *slot = source;
        Ok(())
    }

    fn set_parameter(
        &self,
        unit: UnitId,
        parameter: ParameterId,
        scope: Scope,
        bus: u32,
        value: f32,
    ) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        lock(&state).set_param(parameter, scope, bus, value);
        Ok(())
    }

    fn get_parameter(
        &self,
        unit: UnitId,
        parameter: ParameterId,
        scope: Scope,
        bus: u32,
    ) -> Result<f32, EngineError> {
        let state = self.state(unit)?;
        let state = lock(&state);
        if parameter == param::mixer::POST_AVERAGE_POWER {
            // Stale (0 dB floor) until metering has been enabled.
            return Ok(state
                .meter_peak(scope, bus)
                .map(to_decibels)
                .unwrap_or(0.0));
        }
        Ok(state.param(parameter, scope, bus).unwrap_or(0.0))
    }

    fn input_bus_count(&self, unit: UnitId) -> u32 {
        self.unit(unit)
            .map(|s| lock(&s).inputs.len() as u32)
            .unwrap_or(0)
    }

    fn output_bus_count(&self, unit: UnitId) -> u32 {
        self.unit(unit).map(|s| lock(&s).output_buses).unwrap_or(0)
    }

    fn set_input_bus_count(&self, unit: UnitId, count: u32) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        let mut state = lock(&state);
        state.inputs.resize_with(count as usize, || None);
        Ok(())
    }

    fn set_output_bus_count(&self, unit: UnitId, count: u32) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        lock(&state).output_buses = count;
        Ok(())
    }

    fn start(&self, unit: UnitId) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        lock(&state).running = true;
        Ok(())
    }

    fn stop(&self, unit: UnitId) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        lock(&state).running = false;
        Ok(())
    }

    fn reset(&self, unit: UnitId) {
        if let Some(state) = self.unit(unit) {
            let mut state = lock(&state);
            state.phase = 0;
            state.schedule = None;
            for meter in &mut state.meters {
                meter.peak = 0.0;
            }
        }
    }

    fn class_data(&self, unit: UnitId) -> Result<Vec<u8>, EngineError> {
        let state = self.state(unit)?;
        let state = lock(&state);
        serde_json::to_vec(&state.params)
            .map_err(|e| EngineError::BadPresetData(e.to_string()))
    }

    fn set_class_data(&self, unit: UnitId, data: &[u8]) -> Result<(), EngineError> {
        let params: Vec<ParamSnapshot> = serde_json::from_slice(data)
            .map_err(|e| EngineError::BadPresetData(e.to_string()))?;
        let state = self.state(unit)?;
        lock(&state).params = params;
        Ok(())
    }

    fn set_metering(
        &self,
        unit: UnitId,
        scope: Scope,
        bus: u32,
        enabled: bool,
    ) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        let mut state = lock(&state);
        if let Some(meter) = state
            .meters
            .iter_mut()
            .find(|m| m.scope == scope && m.bus == bus)
        {
            meter.enabled = enabled;
        } else {
            state.meters.push(Meter {
                scope,
                bus,
                enabled,
                peak: 0.0,
            });
        }
        Ok(())
    }

    fn schedule_midi(
        &self,
        unit: UnitId,
        status: u8,
        data1: u8,
        data2: u8,
        frame_offset: u32,
    ) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        lock(&state).midi.push(MidiRecord {
            status,
            data1,
            data2,
            frame_offset,
        });
        Ok(())
    }

    fn load_audio_file(&self, unit: UnitId, path: &Path) -> Result<FileInfo, EngineError> {
        // Fake decode: the file must exist, and its length in bytes stands
        // in for its length in frames.
        let metadata = std::fs::metadata(path).map_err(|source| EngineError::FileOpen {
            path: path.to_path_buf(),
            source,
        })?;
        let info = FileInfo {
            path: path.to_path_buf(),
            frames: metadata.len(),
        };
        let state = self.state(unit)?;
        lock(&state).file = Some(info.clone());
        Ok(info)
    }

    fn schedule_region(&self, unit: UnitId, region: FileRegion) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        lock(&state).schedule = Some(Schedule {
            region,
            position: 0,
            plays_done: 0,
        });
        Ok(())
    }

    fn clear_schedule(&self, unit: UnitId) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        lock(&state).schedule = None;
        Ok(())
    }

    fn load_voices(&self, unit: UnitId, paths: &[PathBuf]) -> Result<(), EngineError> {
        for path in paths {
            if !path.exists() {
                return Err(EngineError::FileOpen {
                    path: path.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such file"),
                });
            }
        }
        let state = self.state(unit)?;
        lock(&state).voices = paths.to_vec();
        Ok(())
    }

    fn set_capture_sink(
        &self,
        unit: UnitId,
        sink: Option<Box<dyn CaptureSink>>,
    ) -> Result<(), EngineError> {
        let state = self.state(unit)?;
        lock(&state).capture = sink;
        Ok(())
    }
}
