//! Layout persistence
//!
//! The canvas is saved as one JSON document of widget records. Loading is
//! forgiving: missing fields fall back to defaults (channel 1, number
//! unassigned, value 0) instead of failing the whole document. Controls are
//! recreated before group boxes so containment works, and every group is
//! refreshed once at the end of the load.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::binding::MidiMode;
use crate::controls::{Control, ControlKind, Orientation, Rect, SelectOption};
use crate::deck::Deck;
use crate::group::Group;

#[derive(Debug, Serialize, Deserialize)]
struct LayoutDoc {
    #[serde(default)]
    widgets: Vec<WidgetRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WidgetRecord {
    Slider(SliderRecord),
    Button(ButtonRecord),
    Select(SelectRecord),
    Group(GroupRecord),
}

#[derive(Debug, Serialize, Deserialize)]
struct BoundsRecord {
    #[serde(default)]
    x: i32,
    #[serde(default)]
    y: i32,
    #[serde(default = "default_width")]
    width: i32,
    #[serde(default = "default_height")]
    height: i32,
}

fn default_width() -> i32 {
    50
}

fn default_height() -> i32 {
    50
}

fn default_channel() -> Option<u8> {
    Some(1)
}

fn default_mode() -> MidiMode {
    MidiMode::Cc
}

fn default_label() -> String {
    "?".to_string()
}

impl BoundsRecord {
    fn rect(&self) -> Rect {
        Rect::new(self.x, self.y, self.width.max(1), self.height.max(1))
    }

    fn from_rect(rect: &Rect) -> Self {
        Self { x: rect.x, y: rect.y, width: rect.width, height: rect.height }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SliderRecord {
    #[serde(default = "default_label")]
    name: String,
    #[serde(default = "default_mode")]
    mode: MidiMode,
    #[serde(default = "default_channel")]
    channel: Option<u8>,
    #[serde(default)]
    control: Option<u8>,
    #[serde(default)]
    value: u8,
    #[serde(flatten)]
    bounds: BoundsRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct ButtonRecord {
    #[serde(default = "default_label")]
    name: String,
    #[serde(default = "default_mode")]
    mode: MidiMode,
    #[serde(default = "default_channel")]
    channel: Option<u8>,
    #[serde(default)]
    control: Option<u8>,
    #[serde(default)]
    value: u8,
    #[serde(default)]
    latch: bool,
    #[serde(default)]
    latched: bool,
    #[serde(flatten)]
    bounds: BoundsRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct SelectRecord {
    #[serde(default = "default_label")]
    name: String,
    #[serde(default = "default_mode")]
    mode: MidiMode,
    #[serde(default = "default_channel")]
    channel: Option<u8>,
    #[serde(default)]
    control: Option<u8>,
    #[serde(default)]
    selected: usize,
    #[serde(default)]
    orientation: Orientation,
    #[serde(default)]
    options: Vec<OptionRecord>,
    #[serde(flatten)]
    bounds: BoundsRecord,
}

#[derive(Debug, Serialize, Deserialize)]
struct OptionRecord {
    #[serde(default = "default_label")]
    label: String,
    #[serde(default)]
    value: u8,
}

#[derive(Debug, Serialize, Deserialize)]
struct GroupRecord {
    #[serde(default = "default_group_title")]
    title: String,
    #[serde(default = "default_group_channel")]
    channel: u8,
    #[serde(default)]
    locked: bool,
    #[serde(flatten)]
    bounds: BoundsRecord,
}

fn default_group_title() -> String {
    "Group".to_string()
}

fn default_group_channel() -> u8 {
    1
}

fn sanitize_channel(channel: Option<u8>) -> Option<u8> {
    channel.filter(|c| (1..=16).contains(c))
}

fn sanitize_number(number: Option<u8>) -> Option<u8> {
    number.filter(|n| *n <= 127)
}

/// Serialize the deck's controls and groups to a JSON file
pub fn save_layout(deck: &Deck, path: impl AsRef<Path>) -> Result<()> {
    let mut widgets = Vec::new();

    for (_, control) in deck.registry().iter() {
        let bounds = BoundsRecord::from_rect(&control.rect);
        let binding = control.binding();
        match &control.kind {
            ControlKind::Slider { .. } => widgets.push(WidgetRecord::Slider(SliderRecord {
                name: control.label.clone(),
                mode: binding.mode,
                channel: binding.channel,
                control: binding.number,
                value: binding.value,
                bounds,
            })),
            ControlKind::Button { latch, latched, .. } => {
                widgets.push(WidgetRecord::Button(ButtonRecord {
                    name: control.label.clone(),
                    mode: binding.mode,
                    channel: binding.channel,
                    control: binding.number,
                    value: binding.value,
                    latch: *latch,
                    latched: *latched,
                    bounds,
                }))
            }
            ControlKind::Select { options, selected, orientation, .. } => {
                widgets.push(WidgetRecord::Select(SelectRecord {
                    name: control.label.clone(),
                    mode: binding.mode,
                    channel: binding.channel,
                    control: binding.number,
                    selected: *selected,
                    orientation: *orientation,
                    options: options
                        .iter()
                        .map(|o| OptionRecord { label: o.label.clone(), value: o.value })
                        .collect(),
                    bounds,
                }))
            }
        }
    }

    for (_, group) in deck.groups() {
        widgets.push(WidgetRecord::Group(GroupRecord {
            title: group.title.clone(),
            channel: group.channel,
            locked: !group.auto_assign,
            bounds: BoundsRecord::from_rect(&group.rect),
        }));
    }

    let doc = LayoutDoc { widgets };
    let json = serde_json::to_string_pretty(&doc)?;
    std::fs::write(path.as_ref(), json)
        .with_context(|| format!("failed to write layout to {}", path.as_ref().display()))?;
    info!("layout saved to {}", path.as_ref().display());
    Ok(())
}

/// Replace the deck's contents with a saved layout.
///
/// Controls come back before groups, then every group refreshes once so
/// membership and auto-assignment match the loaded geometry.
pub fn load_layout(deck: &mut Deck, path: impl AsRef<Path>) -> Result<()> {
    let json = std::fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read layout from {}", path.as_ref().display()))?;
    let doc: LayoutDoc = serde_json::from_str(&json)
        .with_context(|| format!("failed to parse layout {}", path.as_ref().display()))?;

    deck.clear();

    for record in &doc.widgets {
        match record {
            WidgetRecord::Slider(r) => {
                let mut control = Control::slider(r.name.clone(), r.mode, r.bounds.rect());
                let binding = control.binding_mut();
                binding.channel = sanitize_channel(r.channel);
                binding.number = sanitize_number(r.control);
                binding.value = r.value.min(127);
                deck.add_control(control);
            }
            WidgetRecord::Button(r) => {
                let mut control = Control::button(r.name.clone(), r.mode, r.latch, r.bounds.rect());
                if let ControlKind::Button { latched, .. } = &mut control.kind {
                    *latched = r.latched;
                }
                let binding = control.binding_mut();
                binding.channel = sanitize_channel(r.channel);
                binding.number = sanitize_number(r.control);
                binding.value = r.value.min(127);
                deck.add_control(control);
            }
            WidgetRecord::Select(r) => {
                let mut mode = r.mode;
                if mode == MidiMode::PitchBend {
                    // Not a valid select mode; fall back rather than fail
                    mode = MidiMode::Cc;
                }
                let mut control = Control::select(r.name.clone(), mode, 1, r.bounds.rect());
                if let ControlKind::Select { binding, options, selected, orientation } =
                    &mut control.kind
                {
                    *options = if r.options.is_empty() {
                        SelectOption::spread(3)
                    } else {
                        r.options
                            .iter()
                            .map(|o| SelectOption { label: o.label.clone(), value: o.value.min(127) })
                            .collect()
                    };
                    *selected = r.selected.min(options.len().saturating_sub(1));
                    *orientation = r.orientation;
                    binding.channel = sanitize_channel(r.channel);
                    binding.number = sanitize_number(r.control);
                    binding.value = options[*selected].value;
                }
                deck.add_control(control);
            }
            WidgetRecord::Group(_) => {}
        }
    }

    for record in &doc.widgets {
        if let WidgetRecord::Group(r) = record {
            let mut group = Group::new(r.title.clone(), r.channel.clamp(1, 16), r.bounds.rect());
            group.auto_assign = !r.locked;
            deck.add_group(group);
        }
    }

    info!(
        "layout loaded from {} ({} widget(s))",
        path.as_ref().display(),
        doc.widgets.len()
    );
    Ok(())
}
