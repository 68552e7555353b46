//! A thin, composable façade over a platform audio-unit graph.
//!
//! Nodes wrap opaque processing units supplied by an [`engine::AudioEngine`]
//! and are wired into pull-rendering chains: connecting node A to node B
//! registers a render source on B's input bus that, when the realtime thread
//! pulls B, pulls A in turn. A [`graph::Tap`] can sit between two nodes to
//! copy the samples flowing past into a lock-protected buffer for
//! visualization, without altering the signal path.

pub mod buffer;
pub mod engine;
pub mod graph;
pub mod io;
pub mod preset;
pub mod ring;

pub use buffer::BufferList;
pub use engine::{AudioEngine, EngineError, GraphError, RenderError};
pub use graph::{AudioUnit, FilePlayer, InputUnit, Mixer, OutputUnit, Sampler, Tap};

/// Default number of slots in the capture ring buffer.
pub const DEFAULT_RING_SLOTS: usize = 3;
/// Default channel count for buffers allocated by this crate.
pub const DEFAULT_CHANNELS: usize = 2;
/// Default per-render frame count; ring-buffer slots are preallocated to
/// this shape.
pub const DEFAULT_FRAMES: usize = 512;
