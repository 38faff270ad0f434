//! Bidirectional dispatch: binding values to messages and back
//!
//! Outbound: `encode` turns a binding plus a raw 0-127 value into a wire
//! message (or nothing, for unassigned targets). Inbound: `route` matches a
//! message against every live control and yields the updates to apply. The
//! deck applies them while holding an `EchoGuard` so reflected UI updates
//! never re-emit MIDI.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::binding::{is_reserved_number, Binding, MidiMode, CC_ALL_NOTES_OFF};
use crate::controls::{ControlId, ControlKind, ControlRegistry, SelectOption};
use crate::midi::{convert, MidiMessage};

/// Encode an outbound message for `binding` carrying `raw` (clamped 0-127).
///
/// Returns `None` when the binding cannot send: CC/Note with no number
/// assigned. That is a normal steady state during setup, not an error.
pub fn encode(binding: &Binding, raw: u8) -> Option<MidiMessage> {
    let value = raw.min(127);
    let channel = binding.wire_channel();

    match binding.mode {
        MidiMode::Cc => {
            let cc = binding.number?;
            let value = if is_reserved_number(cc) {
                warn!(
                    "CC {} is a Channel-Mode number; receivers may ignore or filter it",
                    cc
                );
                // All Notes Off is defined to carry value 0
                if cc == CC_ALL_NOTES_OFF {
                    0
                } else {
                    value
                }
            } else {
                value
            };
            Some(MidiMessage::ControlChange { channel, cc, value })
        }
        MidiMode::Note => {
            // Note off is a Note On with velocity 0; there is no separate
            // outbound note-off path
            let note = binding.number?;
            Some(MidiMessage::NoteOn { channel, note, velocity: value })
        }
        MidiMode::PitchBend => Some(MidiMessage::PitchBend {
            channel,
            value: convert::pitch_from_control(value),
        }),
        MidiMode::Aftertouch => Some(MidiMessage::ChannelPressure { channel, pressure: value }),
    }
}

/// One control update produced by routing an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouteUpdate {
    pub id: ControlId,
    pub action: RouteAction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    /// New raw value for a slider or button binding
    SetValue(u8),
    /// Option index to select on a Select control
    SelectOption(usize),
}

/// Match an inbound message against every live control.
///
/// Evaluated against the whole registry, never short-circuited: one message
/// may legitimately update several independent controls at once.
pub fn route(registry: &ControlRegistry, msg: &MidiMessage) -> Vec<RouteUpdate> {
    let mut updates = Vec::new();

    for (id, control) in registry.iter() {
        match &control.kind {
            ControlKind::Slider { binding } | ControlKind::Button { binding, .. } => {
                if let Some(value) = value_for(binding, msg) {
                    updates.push(RouteUpdate { id, action: RouteAction::SetValue(value) });
                }
            }
            ControlKind::Select { binding, options, .. } => {
                if let Some(value) = select_value_for(binding, msg) {
                    if let Some(index) = nearest_option(options, value) {
                        updates.push(RouteUpdate { id, action: RouteAction::SelectOption(index) });
                    }
                }
            }
        }
    }

    updates
}

/// Value an inbound message carries for a slider/button binding, if it
/// matches. CC/Note require an assigned, equal number; the channel-wide
/// modes match on channel alone. Note off maps to 0.
fn value_for(binding: &Binding, msg: &MidiMessage) -> Option<u8> {
    let channel = binding.wire_channel();

    match (binding.mode, msg) {
        (MidiMode::Cc, MidiMessage::ControlChange { channel: ch, cc, value })
            if *ch == channel && binding.number == Some(*cc) =>
        {
            Some(*value)
        }
        (MidiMode::Note, MidiMessage::NoteOn { channel: ch, note, velocity })
            if *ch == channel && binding.number == Some(*note) =>
        {
            Some(*velocity)
        }
        (MidiMode::Note, MidiMessage::NoteOff { channel: ch, note, .. })
            if *ch == channel && binding.number == Some(*note) =>
        {
            Some(0)
        }
        (MidiMode::PitchBend, MidiMessage::PitchBend { channel: ch, value }) if *ch == channel => {
            Some(convert::control_from_pitch(*value))
        }
        (MidiMode::Aftertouch, MidiMessage::ChannelPressure { channel: ch, pressure })
            if *ch == channel =>
        {
            Some(*pressure)
        }
        _ => None,
    }
}

/// Value to resolve against a Select's options, if the message addresses
/// the group. Note off does not change a selection.
fn select_value_for(binding: &Binding, msg: &MidiMessage) -> Option<u8> {
    let channel = binding.wire_channel();

    match (binding.mode, msg) {
        (MidiMode::Cc, MidiMessage::ControlChange { channel: ch, cc, value })
            if *ch == channel && binding.number == Some(*cc) =>
        {
            Some(*value)
        }
        (MidiMode::Note, MidiMessage::NoteOn { channel: ch, note, velocity })
            if *ch == channel && binding.number == Some(*note) =>
        {
            Some(*velocity)
        }
        (MidiMode::Aftertouch, MidiMessage::ChannelPressure { channel: ch, pressure })
            if *ch == channel =>
        {
            Some(*pressure)
        }
        _ => None,
    }
}

/// Option whose fixed value is closest to `value`; ties go to the lowest
/// index (first-declared option).
fn nearest_option(options: &[SelectOption], value: u8) -> Option<usize> {
    let mut best: Option<(usize, u8)> = None;
    for (index, option) in options.iter().enumerate() {
        let distance = option.value.abs_diff(value);
        match best {
            Some((_, d)) if d <= distance => {}
            _ => best = Some((index, distance)),
        }
    }
    best.map(|(index, _)| index)
}

/// Process-wide re-entrancy flag: set while inbound-derived values are being
/// applied, checked by every outbound send path.
#[derive(Debug, Clone, Default)]
pub struct EchoFlag(Arc<AtomicBool>);

impl EchoFlag {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a routing pass holds the guard
    pub fn is_held(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Acquire the guard for the duration of one message's routing. The
    /// flag is released when the guard drops, including on early return or
    /// panic, so outbound sends can never stay silenced.
    pub fn hold(&self) -> EchoGuard {
        self.0.store(true, Ordering::SeqCst);
        EchoGuard { flag: Arc::clone(&self.0) }
    }
}

/// RAII guard for `EchoFlag`
pub struct EchoGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for EchoGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}
