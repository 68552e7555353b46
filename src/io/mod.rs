//! Wire-level encodings shared by the graph nodes.

pub mod midi;
