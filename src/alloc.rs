//! Free-slot allocation over the 16-channel / 128-number address space
//!
//! Stateless: each call scans the live registry and returns the first
//! conflict-free (channel, number) pair. The caller must apply the pair to
//! a binding immediately — all allocation happens on the single
//! control-mutating context, so the snapshot cannot go stale in between.

use crate::binding::{is_reserved_number, MidiMode};
use crate::controls::ControlRegistry;

/// Controller/note numbers already claimed on a 1-based channel.
///
/// Every CC/Note binding of every control kind counts; a Select claims its
/// shared number once. Channel-wide modes (Pitch Bend, Aftertouch) claim
/// nothing.
pub fn claimed_numbers(registry: &ControlRegistry, channel: u8) -> [bool; 128] {
    let mut used = [false; 128];
    for (_, control) in registry.iter() {
        let binding = control.binding();
        if !matches!(binding.mode, MidiMode::Cc | MidiMode::Note) {
            continue;
        }
        if binding.channel != Some(channel) {
            continue;
        }
        if let Some(number) = binding.number {
            used[number as usize & 0x7F] = true;
        }
    }
    used
}

/// Find the next free (channel, number) pair, preferring `preferred_channel`.
///
/// Channels are scanned `preferred, preferred+1, ..., 16, 1, ...` so
/// allocation stays on the caller's channel and only spills when it is
/// full. Within a channel, numbers 0-127 are scanned ascending with the
/// reserved Channel-Mode set (120-127) skipped.
///
/// Returns `None` only when all 16 channels are saturated (120 usable
/// numbers each). Callers treat that as hard exhaustion, not a retryable
/// error.
pub fn find_free_slot(registry: &ControlRegistry, preferred_channel: u8) -> Option<(u8, u8)> {
    let start = preferred_channel.clamp(1, 16);

    for offset in 0..16u8 {
        let channel = ((start - 1 + offset) % 16) + 1;
        let used = claimed_numbers(registry, channel);
        for number in 0..128u8 {
            if is_reserved_number(number) {
                continue;
            }
            if !used[number as usize] {
                return Some((channel, number));
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{Control, Rect};
    use proptest::prelude::*;

    fn cc_control(channel: u8, number: u8) -> Control {
        let mut c = Control::slider("s", MidiMode::Cc, Rect::new(0, 0, 50, 200));
        c.binding_mut().channel = Some(channel);
        c.binding_mut().number = Some(number);
        c
    }

    #[test]
    fn test_prefers_caller_channel() {
        let mut reg = ControlRegistry::new();
        reg.insert(cc_control(3, 0));
        reg.insert(cc_control(3, 1));

        assert_eq!(find_free_slot(&reg, 3), Some((3, 2)));
    }

    #[test]
    fn test_rolls_over_when_channel_full() {
        let mut reg = ControlRegistry::new();
        for n in 0..120 {
            reg.insert(cc_control(16, n));
        }

        // Channel 16 has only reserved numbers left; wraps to channel 1
        assert_eq!(find_free_slot(&reg, 16), Some((1, 0)));
    }

    #[test]
    fn test_note_bindings_claim_slots_too() {
        let mut reg = ControlRegistry::new();
        let mut c = Control::button("b", MidiMode::Note, false, Rect::new(0, 0, 50, 50));
        c.binding_mut().channel = Some(2);
        c.binding_mut().number = Some(0);
        reg.insert(c);

        assert_eq!(find_free_slot(&reg, 2), Some((2, 1)));
    }

    #[test]
    fn test_select_claims_its_shared_number() {
        let mut reg = ControlRegistry::new();
        let mut c = Control::select("r", MidiMode::Cc, 3, Rect::new(0, 0, 100, 100));
        c.binding_mut().channel = Some(1);
        c.binding_mut().number = Some(0);
        reg.insert(c);

        assert_eq!(find_free_slot(&reg, 1), Some((1, 1)));
    }

    #[test]
    fn test_channel_wide_modes_claim_nothing() {
        let mut reg = ControlRegistry::new();
        reg.insert(Control::slider("pb", MidiMode::PitchBend, Rect::new(0, 0, 50, 200)));
        reg.insert(Control::slider("at", MidiMode::Aftertouch, Rect::new(60, 0, 50, 200)));

        assert_eq!(find_free_slot(&reg, 1), Some((1, 0)));
    }

    #[test]
    fn test_exhaustion_returns_none() {
        let mut reg = ControlRegistry::new();
        for ch in 1..=16u8 {
            for n in 0..120u8 {
                reg.insert(cc_control(ch, n));
            }
        }
        // 16 x 120 = 1920 claimed slots: nothing left anywhere
        assert_eq!(find_free_slot(&reg, 5), None);
    }

    #[test]
    fn test_unassigned_numbers_claim_nothing() {
        let mut reg = ControlRegistry::new();
        // Assigned channel but no number: not a claim
        let mut c = Control::slider("s", MidiMode::Cc, Rect::new(0, 0, 50, 200));
        c.binding_mut().channel = Some(1);
        reg.insert(c);

        assert_eq!(find_free_slot(&reg, 1), Some((1, 0)));
    }

    proptest! {
        /// Whatever is already claimed, the allocator never returns a
        /// reserved number or an already-claimed pair.
        #[test]
        fn prop_slot_is_never_reserved_or_claimed(
            claims in proptest::collection::vec((1u8..=16, 0u8..=127), 0..300),
            preferred in 1u8..=16,
        ) {
            let mut reg = ControlRegistry::new();
            for (ch, n) in &claims {
                reg.insert(cc_control(*ch, *n));
            }

            if let Some((ch, n)) = find_free_slot(&reg, preferred) {
                prop_assert!((1..=16).contains(&ch));
                prop_assert!(n < 128);
                prop_assert!(!is_reserved_number(n));
                prop_assert!(!claims.contains(&(ch, n)));
            }
        }
    }
}
