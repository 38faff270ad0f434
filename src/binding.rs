//! Control bindings: one MIDI address plus its live value
//!
//! A `Binding` is pure data; it is mutated only by the deck (on inbound
//! routing or an explicit edit). The predicates here define what
//! "unassigned" means for the allocator and the dispatcher.

use serde::{Deserialize, Serialize};

/// MIDI target mode of a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MidiMode {
    #[serde(rename = "CC")]
    Cc,
    Note,
    #[serde(rename = "Pitch Bend")]
    PitchBend,
    Aftertouch,
}

impl MidiMode {
    /// Parse a user-facing mode name ("CC", "Note", "Pitch Bend", "Aftertouch")
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cc" => Some(MidiMode::Cc),
            "note" => Some(MidiMode::Note),
            "pitchbend" | "pitch bend" | "pb" => Some(MidiMode::PitchBend),
            "aftertouch" | "at" => Some(MidiMode::Aftertouch),
            _ => None,
        }
    }
}

impl std::fmt::Display for MidiMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MidiMode::Cc => "CC",
            MidiMode::Note => "Note",
            MidiMode::PitchBend => "Pitch Bend",
            MidiMode::Aftertouch => "Aftertouch",
        };
        f.write_str(s)
    }
}

/// Controller numbers 120-127 are Channel-Mode messages (e.g. All Notes Off
/// = 123). Auto-allocation never hands them out; hand-entry is allowed with
/// a warning.
pub const RESERVED_NUMBERS: std::ops::RangeInclusive<u8> = 120..=127;

/// All Notes Off must carry value 0 regardless of the control's value
pub const CC_ALL_NOTES_OFF: u8 = 123;

/// True if `number` is a reserved Channel-Mode controller number
pub fn is_reserved_number(number: u8) -> bool {
    RESERVED_NUMBERS.contains(&number)
}

/// One control's MIDI address and most recent value.
///
/// `channel` is 1-based (1..=16); `None` means unassigned and behaves as
/// channel 1 on the wire. `number` is the controller or note number for
/// CC/Note modes and meaningless otherwise; `None` is explicitly
/// "unassigned" and is distinct from number 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Binding {
    pub mode: MidiMode,
    pub channel: Option<u8>,
    pub number: Option<u8>,
    pub value: u8,
}

impl Binding {
    pub fn new(mode: MidiMode) -> Self {
        Self { mode, channel: Some(1), number: None, value: 0 }
    }

    /// True for modes that address by controller/note number
    pub fn requires_number(&self) -> bool {
        matches!(self.mode, MidiMode::Cc | MidiMode::Note)
    }

    /// True when the binding can actually address a target: for CC/Note the
    /// number and channel must both be set, for the channel-wide modes the
    /// channel default always applies.
    pub fn is_assigned(&self) -> bool {
        if self.requires_number() {
            self.number.is_some() && self.channel.is_some()
        } else {
            true
        }
    }

    /// Wire channel (0-15); an unassigned channel falls back to channel 1
    pub fn wire_channel(&self) -> u8 {
        self.channel.unwrap_or(1).clamp(1, 16) - 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_requires_number() {
        assert!(Binding::new(MidiMode::Cc).requires_number());
        assert!(Binding::new(MidiMode::Note).requires_number());
        assert!(!Binding::new(MidiMode::PitchBend).requires_number());
        assert!(!Binding::new(MidiMode::Aftertouch).requires_number());
    }

    #[test]
    fn test_assignment_predicate() {
        let mut b = Binding::new(MidiMode::Cc);
        assert!(!b.is_assigned());

        b.number = Some(0); // number 0 is a real assignment
        assert!(b.is_assigned());

        b.channel = None;
        assert!(!b.is_assigned());

        // Channel-wide modes are addressable without a number
        assert!(Binding::new(MidiMode::PitchBend).is_assigned());
        assert!(Binding::new(MidiMode::Aftertouch).is_assigned());
    }

    #[test]
    fn test_wire_channel_default() {
        let mut b = Binding::new(MidiMode::Cc);
        b.channel = Some(3);
        assert_eq!(b.wire_channel(), 2);

        b.channel = None;
        assert_eq!(b.wire_channel(), 0);
    }

    #[test]
    fn test_reserved_set() {
        assert!(!is_reserved_number(119));
        for n in 120..=127 {
            assert!(is_reserved_number(n));
        }
        assert!(is_reserved_number(CC_ALL_NOTES_OFF));
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!(MidiMode::parse("CC"), Some(MidiMode::Cc));
        assert_eq!(MidiMode::parse("pitch bend"), Some(MidiMode::PitchBend));
        assert_eq!(MidiMode::parse("nope"), None);
    }
}
