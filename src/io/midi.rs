//! Channel-voice MIDI packing.
//!
//! A status byte carries the command in its high nibble and the channel in
//! its low nibble; the two data bytes that follow are 7-bit.

/// Note off, data bytes: key, release velocity.
pub const NOTE_OFF: u8 = 0x8;
/// Note on, data bytes: key, velocity.
pub const NOTE_ON: u8 = 0x9;
/// Control change, data bytes: controller number, value.
pub const CONTROL_CHANGE: u8 = 0xB;
/// Program change, data bytes: program number, unused.
pub const PROGRAM_CHANGE: u8 = 0xC;

/// Controller number selecting the bank MSB.
pub const BANK_MSB_CONTROL: u8 = 0;
/// Controller number selecting the bank LSB.
pub const BANK_LSB_CONTROL: u8 = 32;

/// Pack a command and channel into a status byte. Channels above 15 wrap
/// into the low nibble.
pub const fn status_byte(command: u8, channel: u8) -> u8 {
    (command << 4) | (channel & 0x0F)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_packs_command_high_channel_low() {
        assert_eq!(status_byte(NOTE_ON, 0), 0x90);
        assert_eq!(status_byte(NOTE_ON, 3), 0x93);
        assert_eq!(status_byte(NOTE_OFF, 15), 0x8F);
        assert_eq!(status_byte(CONTROL_CHANGE, 7), 0xB7);
    }

    #[test]
    fn out_of_range_channels_are_masked() {
        assert_eq!(status_byte(PROGRAM_CHANGE, 16), 0xC0);
        assert_eq!(status_byte(NOTE_ON, 0xFF), 0x9F);
    }
}
