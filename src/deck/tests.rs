//! Tests for the Deck orchestrator

use super::*;
use crate::binding::MidiMode;
use crate::bridge::InputBridge;
use crate::controls::{Control, Rect};
use crate::midi::MidiMessage;
use crate::transport::testing::{RecordingOutput, ScriptedInput};

fn deck_with_output() -> (Deck, RecordingOutput) {
    let mut deck = Deck::new();
    let output = RecordingOutput::new();
    deck.set_output(Box::new(output.clone()));
    (deck, output)
}

fn bound_slider(deck: &mut Deck, channel: u8, number: u8) -> ControlId {
    let id = deck.add_control(Control::slider("fader", MidiMode::Cc, Rect::new(0, 0, 50, 200)));
    deck.set_binding_channel(id, Some(channel)).unwrap();
    deck.set_binding_number(id, Some(number)).unwrap();
    id
}

#[test]
fn test_encode_route_round_trip() {
    let (mut deck, output) = deck_with_output();
    let id = bound_slider(&mut deck, 3, 10);

    deck.set_value(id, 64).unwrap();
    assert_eq!(
        output.sent(),
        vec![MidiMessage::ControlChange { channel: 2, cc: 10, value: 64 }]
    );

    // Routing the exact message back lands on the same binding
    deck.apply_inbound(&MidiMessage::ControlChange { channel: 2, cc: 10, value: 64 });
    assert_eq!(deck.control(id).unwrap().binding().value, 64);

    // ...and did not echo anything back out
    assert_eq!(output.sent().len(), 1);
}

#[test]
fn test_inbound_never_echoes_outbound() {
    let (mut deck, output) = deck_with_output();
    let id = bound_slider(&mut deck, 1, 7);

    deck.apply_inbound(&MidiMessage::ControlChange { channel: 0, cc: 7, value: 99 });

    assert_eq!(deck.control(id).unwrap().binding().value, 99);
    assert!(output.sent().is_empty(), "inbound routing must not send MIDI");
}

#[test]
fn test_unassigned_slider_is_silent() {
    let (mut deck, output) = deck_with_output();
    let id = deck.add_control(Control::slider("s", MidiMode::Cc, Rect::new(0, 0, 50, 200)));

    deck.set_value(id, 80).unwrap();

    // Value is stored but nothing goes out while the number is unassigned
    assert_eq!(deck.control(id).unwrap().binding().value, 80);
    assert!(output.sent().is_empty());
}

#[test]
fn test_all_notes_off_always_sends_zero() {
    let (mut deck, output) = deck_with_output();
    let id = bound_slider(&mut deck, 1, 123);

    deck.set_value(id, 64).unwrap();
    deck.set_value(id, 127).unwrap();

    assert_eq!(
        output.sent(),
        vec![
            MidiMessage::ControlChange { channel: 0, cc: 123, value: 0 },
            MidiMessage::ControlChange { channel: 0, cc: 123, value: 0 },
        ]
    );
}

#[test]
fn test_momentary_button_press_release() {
    let (mut deck, output) = deck_with_output();
    let id = deck.add_control(Control::button("go", MidiMode::Cc, false, Rect::new(0, 0, 50, 50)));
    deck.set_binding_channel(id, Some(1)).unwrap();
    deck.set_binding_number(id, Some(30)).unwrap();

    deck.press_button(id).unwrap();
    deck.release_button(id).unwrap();

    assert_eq!(
        output.sent(),
        vec![
            MidiMessage::ControlChange { channel: 0, cc: 30, value: 127 },
            MidiMessage::ControlChange { channel: 0, cc: 30, value: 0 },
        ]
    );
}

#[test]
fn test_latch_button_toggles() {
    let (mut deck, output) = deck_with_output();
    let id = deck.add_control(Control::button("hold", MidiMode::Cc, true, Rect::new(0, 0, 50, 50)));
    deck.set_binding_channel(id, Some(1)).unwrap();
    deck.set_binding_number(id, Some(31)).unwrap();

    deck.press_button(id).unwrap();
    deck.release_button(id).unwrap(); // release is ignored in latch mode
    deck.press_button(id).unwrap();

    assert_eq!(
        output.sent(),
        vec![
            MidiMessage::ControlChange { channel: 0, cc: 31, value: 127 },
            MidiMessage::ControlChange { channel: 0, cc: 31, value: 0 },
        ]
    );
}

#[test]
fn test_latch_button_follows_inbound() {
    let (mut deck, _output) = deck_with_output();
    let id = deck.add_control(Control::button("hold", MidiMode::Cc, true, Rect::new(0, 0, 50, 50)));
    deck.set_binding_channel(id, Some(1)).unwrap();
    deck.set_binding_number(id, Some(31)).unwrap();

    deck.apply_inbound(&MidiMessage::ControlChange { channel: 0, cc: 31, value: 100 });
    match &deck.control(id).unwrap().kind {
        ControlKind::Button { latched, .. } => assert!(*latched),
        _ => unreachable!(),
    }

    deck.apply_inbound(&MidiMessage::ControlChange { channel: 0, cc: 31, value: 10 });
    match &deck.control(id).unwrap().kind {
        ControlKind::Button { latched, .. } => assert!(!*latched),
        _ => unreachable!(),
    }
}

#[test]
fn test_select_sends_once_per_selection_change() {
    let (mut deck, output) = deck_with_output();
    let id = deck.add_control(Control::select("bank", MidiMode::Cc, 3, Rect::new(0, 0, 100, 100)));
    deck.set_binding_channel(id, Some(1)).unwrap();
    deck.set_binding_number(id, Some(20)).unwrap();

    deck.choose_option(id, 2).unwrap();
    deck.choose_option(id, 2).unwrap(); // re-selecting is a no-op

    let sent = output.sent();
    assert_eq!(sent.len(), 1);
    let MidiMessage::ControlChange { channel, cc, value } = sent[0] else {
        panic!("expected a CC message");
    };
    assert_eq!((channel, cc), (0, 20));
    assert_eq!(value, deck_option_value(&deck, id, 2));
}

fn deck_option_value(deck: &Deck, id: ControlId, index: usize) -> u8 {
    match &deck.control(id).unwrap().kind {
        ControlKind::Select { options, .. } => options[index].value,
        _ => unreachable!(),
    }
}

#[test]
fn test_select_nearest_value_resolution() {
    let (mut deck, output) = deck_with_output();
    let id = deck.add_control(Control::select("bank", MidiMode::Cc, 3, Rect::new(0, 0, 100, 100)));
    deck.set_binding_channel(id, Some(1)).unwrap();
    deck.set_binding_number(id, Some(20)).unwrap();

    // Fix the option values to the canonical spread
    if let Some(control) = deck.registry.get_mut(id) {
        if let ControlKind::Select { options, .. } = &mut control.kind {
            options[0].value = 0;
            options[1].value = 64;
            options[2].value = 127;
        }
    }

    // |70-64| = 6 beats both alternatives
    deck.apply_inbound(&MidiMessage::ControlChange { channel: 0, cc: 20, value: 70 });

    match &deck.control(id).unwrap().kind {
        ControlKind::Select { selected, binding, .. } => {
            assert_eq!(*selected, 1);
            assert_eq!(binding.value, 64);
        }
        _ => unreachable!(),
    }
    assert!(output.sent().is_empty());
}

#[test]
fn test_one_message_updates_multiple_controls() {
    let (mut deck, _output) = deck_with_output();
    let slider = bound_slider(&mut deck, 1, 20);
    let select = deck.add_control(Control::select("bank", MidiMode::Cc, 3, Rect::new(0, 300, 100, 100)));
    deck.set_binding_channel(select, Some(1)).unwrap();
    deck.set_binding_number(select, Some(20)).unwrap();

    deck.apply_inbound(&MidiMessage::ControlChange { channel: 0, cc: 20, value: 120 });

    assert_eq!(deck.control(slider).unwrap().binding().value, 120);
    match &deck.control(select).unwrap().kind {
        ControlKind::Select { selected, .. } => assert_eq!(*selected, 2),
        _ => unreachable!(),
    }
}

#[test]
fn test_group_auto_fills_new_controls() {
    let (mut deck, _output) = deck_with_output();
    deck.add_group(Group::new("strip", 4, Rect::new(0, 0, 300, 300)));

    let id = deck.add_control(Control::slider("s", MidiMode::Cc, Rect::new(10, 10, 50, 200)));

    let binding = deck.control(id).unwrap().binding();
    assert_eq!(binding.channel, Some(4));
    assert_eq!(binding.number, Some(0));
}

#[test]
fn test_membership_follows_geometry() {
    let (mut deck, _output) = deck_with_output();
    let gid = deck.add_group(Group::new("strip", 1, Rect::new(0, 0, 300, 300)));
    let id = deck.add_control(Control::slider("s", MidiMode::Cc, Rect::new(10, 10, 50, 200)));

    assert_eq!(deck.group(gid).unwrap().members, vec![id]);

    deck.move_control(id, Rect::new(600, 600, 50, 200)).unwrap();
    assert!(deck.group(gid).unwrap().members.is_empty());

    deck.move_control(id, Rect::new(10, 10, 50, 200)).unwrap();
    assert_eq!(deck.group(gid).unwrap().members, vec![id]);
}

#[test]
fn test_duplicate_control_gets_fresh_number_inside_group() {
    let (mut deck, _output) = deck_with_output();
    deck.add_group(Group::new("strip", 1, Rect::new(0, 0, 500, 500)));
    let original = deck.add_control(Control::slider("s", MidiMode::Cc, Rect::new(10, 10, 50, 200)));
    assert_eq!(deck.control(original).unwrap().binding().number, Some(0));

    let copy = deck.duplicate_control(original).unwrap();

    let binding = deck.control(copy).unwrap().binding();
    assert_eq!(binding.channel, Some(1));
    assert_eq!(binding.number, Some(1), "copy must not collide with the original");
}

#[test]
fn test_duplicate_group_next_channel_fresh_numbers() {
    let (mut deck, _output) = deck_with_output();
    let gid = deck.add_group(Group::new("strip", 1, Rect::new(0, 0, 300, 300)));
    let a = deck.add_control(Control::slider("a", MidiMode::Cc, Rect::new(10, 10, 50, 200)));
    let b = deck.add_control(Control::slider("b", MidiMode::Cc, Rect::new(70, 10, 50, 200)));

    // Something already claims (2, 0) outside the group; the duplicate's
    // allocation must skip it
    let blocker = deck.add_control(Control::slider("x", MidiMode::Cc, Rect::new(900, 900, 50, 200)));
    deck.set_binding_channel(blocker, Some(2)).unwrap();
    deck.set_binding_number(blocker, Some(0)).unwrap();

    let copy = deck.duplicate_group(gid).unwrap();

    let group = deck.group(copy).unwrap();
    assert_eq!(group.channel, 2);
    assert_eq!(group.members.len(), 2);

    let mut numbers = Vec::new();
    for member in &group.members {
        let binding = deck.control(*member).unwrap().binding();
        assert_eq!(binding.channel, Some(2));
        numbers.push(binding.number.unwrap());
    }
    numbers.sort_unstable();
    assert_eq!(numbers, vec![1, 2], "fresh numbers, skipping the claimed 0");

    // Originals are untouched
    assert_eq!(deck.control(a).unwrap().binding().channel, Some(1));
    assert_eq!(deck.control(b).unwrap().binding().channel, Some(1));
}

#[test]
fn test_duplicate_locked_group_keeps_numbers() {
    let (mut deck, _output) = deck_with_output();
    let gid = deck.add_group(Group::new("strip", 1, Rect::new(0, 0, 300, 300)));
    let a = deck.add_control(Control::slider("a", MidiMode::Cc, Rect::new(10, 10, 50, 200)));
    assert_eq!(deck.control(a).unwrap().binding().number, Some(0));

    deck.set_group_locked(gid, true).unwrap();
    let copy = deck.duplicate_group(gid).unwrap();

    let group = deck.group(copy).unwrap();
    assert_eq!(group.channel, 2);
    let member = group.members[0];
    let binding = deck.control(member).unwrap().binding();
    assert_eq!(binding.channel, Some(2));
    assert_eq!(binding.number, Some(0), "locked duplicate keeps numbers verbatim");
}

#[test]
fn test_group_channel_wraps_on_duplicate() {
    let (mut deck, _output) = deck_with_output();
    let gid = deck.add_group(Group::new("strip", 16, Rect::new(0, 0, 300, 300)));

    let copy = deck.duplicate_group(gid).unwrap();
    assert_eq!(deck.group(copy).unwrap().channel, 1);
}

#[test]
fn test_cascade_delete_removes_members_only() {
    let (mut deck, _output) = deck_with_output();
    let gid = deck.add_group(Group::new("strip", 1, Rect::new(0, 0, 300, 300)));
    let inside = deck.add_control(Control::slider("in", MidiMode::Cc, Rect::new(10, 10, 50, 200)));
    let outside = deck.add_control(Control::slider("out", MidiMode::Cc, Rect::new(900, 900, 50, 200)));

    deck.remove_group_cascade(gid).unwrap();

    assert!(deck.control(inside).is_none());
    assert!(deck.control(outside).is_some());
    assert!(deck.group(gid).is_none());
}

#[test]
fn test_remove_group_keeps_members() {
    let (mut deck, _output) = deck_with_output();
    let gid = deck.add_group(Group::new("strip", 1, Rect::new(0, 0, 300, 300)));
    let inside = deck.add_control(Control::slider("in", MidiMode::Cc, Rect::new(10, 10, 50, 200)));

    deck.remove_group(gid).unwrap();

    assert!(deck.control(inside).is_some());
    assert!(deck.group(gid).is_none());
}

#[test]
fn test_number_usage_report() {
    let (mut deck, _output) = deck_with_output();
    bound_slider(&mut deck, 3, 10);
    let select = deck.add_control(Control::select("bank", MidiMode::Cc, 2, Rect::new(0, 300, 100, 100)));
    deck.set_binding_channel(select, Some(3)).unwrap();
    deck.set_binding_number(select, Some(10)).unwrap();

    let usage = deck.number_usage();
    let on_channel = usage.get(&3).unwrap();
    let claimants = on_channel.get(&10).unwrap();
    assert_eq!(claimants.len(), 2, "shared numbers list every claimant");
}

#[tokio::test]
async fn test_pump_applies_inbound_without_echo() {
    let (mut deck, output) = deck_with_output();
    let id = bound_slider(&mut deck, 1, 5);

    let input = ScriptedInput::new();
    input.push(MidiMessage::ControlChange { channel: 0, cc: 5, value: 42 });
    let mut bridge = InputBridge::start(Box::new(input));

    // Let the listener move the message into the queue, then drain
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let processed = deck.pump(&mut bridge);

    assert_eq!(processed, 1);
    assert_eq!(deck.control(id).unwrap().binding().value, 42);
    assert!(output.sent().is_empty());

    bridge.shutdown().await;
}
