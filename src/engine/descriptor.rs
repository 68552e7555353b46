//! Identifiers for the opaque processing units behind the graph.

use serde::{Deserialize, Serialize};

/// Pack a four-character code into a `u32`, the classic component
/// identifier encoding.
pub const fn four_cc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) << 24 | (code[1] as u32) << 16 | (code[2] as u32) << 8 | code[3] as u32
}

/// The broad family a processing unit belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitType {
    Output,
    Mixer,
    Generator,
    MusicDevice,
    Effect,
    FormatConverter,
}

/// The triple identifying which kind of unit to instantiate. Immutable
/// after node construction; re-resolving the same descriptor always yields
/// a fresh, independent unit instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitDescriptor {
    pub unit_type: UnitType,
    pub subtype: u32,
    pub manufacturer: u32,
}

impl UnitDescriptor {
    pub const fn new(unit_type: UnitType, subtype: u32) -> Self {
        Self {
            unit_type,
            subtype,
            manufacturer: manufacturer::SYSTEM,
        }
    }
}

pub mod manufacturer {
    use super::four_cc;

    /// The platform's built-in unit vendor.
    pub const SYSTEM: u32 = four_cc(b"sys ");
}

/// Subtype codes for the units the façade's variants wrap.
pub mod subtype {
    use super::four_cc;

    pub const HARDWARE_OUTPUT: u32 = four_cc(b"ahal");
    pub const HARDWARE_INPUT: u32 = four_cc(b"ainp");
    pub const MULTICHANNEL_MIXER: u32 = four_cc(b"mcmx");
    pub const FILE_PLAYER: u32 = four_cc(b"afpl");
    pub const SAMPLER: u32 = four_cc(b"samp");
    pub const PASSTHROUGH: u32 = four_cc(b"pass");
    /// Deterministic ramp generator (software engine test signal).
    pub const RAMP_GENERATOR: u32 = four_cc(b"ramp");
    /// Constant-level generator (software engine test signal).
    pub const LEVEL_GENERATOR: u32 = four_cc(b"dclv");
}

/// Opaque handle to an instantiated unit, owned by exactly one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(pub u64);

/// Identifies a parameter on a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ParameterId(pub u32);

/// Which side of a unit a parameter or property applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scope {
    Global,
    Input,
    Output,
}

/// Well-known parameter ids.
pub mod param {
    use super::ParameterId;

    pub mod mixer {
        use super::ParameterId;

        pub const INPUT_VOLUME: ParameterId = ParameterId(1);
        pub const PAN: ParameterId = ParameterId(2);
        pub const OUTPUT_VOLUME: ParameterId = ParameterId(3);
        /// Post-mix average power in decibels, valid once metering is
        /// enabled on the matching scope and bus.
        pub const POST_AVERAGE_POWER: ParameterId = ParameterId(4);
    }

    pub mod device {
        use super::ParameterId;

        pub const VOLUME: ParameterId = ParameterId(16);
    }

    pub mod generator {
        use super::ParameterId;

        /// Output level of the constant-level generator.
        pub const LEVEL: ParameterId = ParameterId(32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_cc_is_big_endian_packed() {
        assert_eq!(four_cc(b"ahal"), 0x6168_616c);
    }

    #[test]
    fn descriptors_compare_by_triple() {
        let a = UnitDescriptor::new(UnitType::Mixer, subtype::MULTICHANNEL_MIXER);
        let b = UnitDescriptor::new(UnitType::Mixer, subtype::MULTICHANNEL_MIXER);
        assert_eq!(a, b);
    }
}
