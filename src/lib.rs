//! ccdeck - software MIDI control surface engine
//!
//! A canvas of sliders, buttons and mutually-exclusive selects bound to
//! CC/Note/PitchBend/Aftertouch targets, with group boxes that allocate
//! conflict-free addresses across the 16-channel space and a bidirectional
//! bridge between the controls and a pair of MIDI ports.

pub mod alloc;
pub mod binding;
pub mod bridge;
pub mod cli;
pub mod config;
pub mod controls;
pub mod deck;
pub mod dispatch;
pub mod group;
pub mod midi;
pub mod persistence;
pub mod transport;

pub use binding::{Binding, MidiMode};
pub use controls::{Control, ControlId, ControlKind, ControlRegistry, Rect};
pub use deck::{Deck, GroupId};
pub use group::Group;
pub use midi::MidiMessage;
