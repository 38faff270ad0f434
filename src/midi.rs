//! MIDI message model and value conversions
//!
//! The engine routes exactly five channel-voice messages; everything else on
//! the wire is ignored at parse time.

use std::fmt;

/// Channel-voice MIDI messages the deck sends and receives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note Off: channel (0-15), note (0-127), velocity (0-127)
    NoteOff { channel: u8, note: u8, velocity: u8 },

    /// Note On: channel (0-15), note (0-127), velocity (0-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },

    /// Control Change: channel (0-15), cc (0-127), value (0-127)
    ControlChange { channel: u8, cc: u8, value: u8 },

    /// Channel Pressure (aftertouch): channel (0-15), pressure (0-127)
    ChannelPressure { channel: u8, pressure: u8 },

    /// Pitch Bend: channel (0-15), value (0-16383, 14-bit)
    PitchBend { channel: u8, value: u16 },
}

impl MidiMessage {
    /// Parse a message from raw bytes.
    ///
    /// Returns `None` for system messages, truncated data, and the
    /// channel-voice types the engine does not route. A Note On with
    /// velocity 0 parses as Note Off.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.is_empty() {
            return None;
        }

        let status = data[0];
        if status < 0x80 || status >= 0xF0 {
            // Running status and system messages are out of scope
            return None;
        }

        let channel = status & 0x0F;

        match status & 0xF0 {
            0x80 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiMessage::NoteOff {
                    channel,
                    note: data[1] & 0x7F,
                    velocity: data[2] & 0x7F,
                })
            }
            0x90 => {
                if data.len() < 3 {
                    return None;
                }
                let note = data[1] & 0x7F;
                let velocity = data[2] & 0x7F;

                if velocity == 0 {
                    Some(MidiMessage::NoteOff { channel, note, velocity: 0 })
                } else {
                    Some(MidiMessage::NoteOn { channel, note, velocity })
                }
            }
            0xB0 => {
                if data.len() < 3 {
                    return None;
                }
                Some(MidiMessage::ControlChange {
                    channel,
                    cc: data[1] & 0x7F,
                    value: data[2] & 0x7F,
                })
            }
            0xD0 => {
                if data.len() < 2 {
                    return None;
                }
                Some(MidiMessage::ChannelPressure {
                    channel,
                    pressure: data[1] & 0x7F,
                })
            }
            0xE0 => {
                if data.len() < 3 {
                    return None;
                }
                let lsb = (data[1] & 0x7F) as u16;
                let msb = (data[2] & 0x7F) as u16;
                Some(MidiMessage::PitchBend {
                    channel,
                    value: (msb << 7) | lsb,
                })
            }
            _ => None,
        }
    }

    /// Encode the message to MIDI bytes
    pub fn encode(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F]
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                vec![0xB0 | (channel & 0x0F), cc & 0x7F, value & 0x7F]
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                vec![0xD0 | (channel & 0x0F), pressure & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
        }
    }

    /// The message's channel (0-15)
    pub fn channel(&self) -> u8 {
        match *self {
            MidiMessage::NoteOff { channel, .. }
            | MidiMessage::NoteOn { channel, .. }
            | MidiMessage::ControlChange { channel, .. }
            | MidiMessage::ChannelPressure { channel, .. }
            | MidiMessage::PitchBend { channel, .. } => channel,
        }
    }
}

impl fmt::Display for MidiMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            MidiMessage::NoteOff { channel, note, velocity } => {
                write!(f, "NoteOff ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::NoteOn { channel, note, velocity } => {
                write!(f, "NoteOn ch:{} n:{} v:{}", channel + 1, note, velocity)
            }
            MidiMessage::ControlChange { channel, cc, value } => {
                write!(f, "CC ch:{} cc:{} v:{}", channel + 1, cc, value)
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                write!(f, "Aftertouch ch:{} p:{}", channel + 1, pressure)
            }
            MidiMessage::PitchBend { channel, value } => {
                write!(f, "PitchBend ch:{} v:{:+}", channel + 1, value as i32 - 8192)
            }
        }
    }
}

/// Conversions between the 0-127 control range and 14-bit pitch
pub mod convert {
    /// Rescale a 0-127 control value to the 14-bit pitch range (0-16383)
    pub fn pitch_from_control(raw: u8) -> u16 {
        ((raw.min(127) as f32 / 127.0) * 16383.0).round() as u16
    }

    /// Rescale a 14-bit pitch value (0-16383) back to 0-127
    pub fn control_from_pitch(value: u16) -> u8 {
        ((value.min(16383) as f32 / 16383.0) * 127.0).round() as u8
    }
}

/// Format MIDI bytes as hex string for debugging
pub fn format_hex(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
