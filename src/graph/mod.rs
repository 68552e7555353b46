//! Nodes, variants and the tap.
//!
//! Every node wraps exactly one opaque engine unit and shares the same
//! connect/render protocol; the variants are thin configuration layers on
//! top of it. Downstream nodes pull audio from upstream nodes on demand,
//! so connecting never touches the producer; it only registers a render
//! source on the consumer's input bus.

/// Scheduled playback of one decoded file region.
pub mod file_player;
/// Hardware capture bridged into the pull graph through the ring buffer.
pub mod input;
/// Multi-input summing mixer with optional level metering.
pub mod mixer;
/// The base node contract shared by every variant.
pub mod node;
/// The terminal hardware sink driving the pull model.
pub mod output;
/// Instrument node with a voice table and a channel-voice MIDI surface.
pub mod sampler;
/// Transparent sample interception between two nodes.
pub mod tap;

pub use file_player::FilePlayer;
pub use input::InputUnit;
pub use mixer::Mixer;
pub use node::{AudioUnit, UnitRef};
pub use output::OutputUnit;
pub use sampler::Sampler;
pub use tap::{Tap, TapSamples, Waveform};
