//! Interactive shell over the deck
//!
//! The binary has no canvas; this shell is the host surface during setup
//! and testing. A reader thread feeds lines to the main loop, which parses
//! them here and applies them to the deck between ticks.

use anyhow::Result;
use colored::Colorize;

use crate::binding::MidiMode;
use crate::controls::{Control, ControlId, ControlKind, Rect};
use crate::deck::{Deck, GroupId};
use crate::group::Group;
use crate::transport::Transport;

/// A parsed shell command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    Quit,
    Ports,
    SetInput(String),
    SetOutput(String),
    AddSlider { label: String },
    AddButton { label: String, latch: bool },
    AddSelect { label: String, options: usize },
    AddGroup { title: String, channel: u8 },
    List,
    Map,
    Set { id: usize, value: u8 },
    Press { id: usize },
    Release { id: usize },
    Choose { id: usize, option: usize },
    BindMode { id: usize, mode: MidiMode },
    BindChannel { id: usize, channel: Option<u8> },
    BindNumber { id: usize, number: Option<u8> },
    Move { id: usize, rect: Rect },
    Duplicate { id: usize },
    Delete { id: usize },
    GroupChannel { id: usize, channel: u8 },
    GroupLock { id: usize, locked: bool },
    GroupDuplicate { id: usize },
    GroupDelete { id: usize, cascade: bool },
    Recompute,
    Save(String),
    Load(String),
}

const HELP: &str = "\
commands:
  ports                         list MIDI ports
  in <port> | out <port>        select ports (substring match)
  add slider|button|latch|select [label] [n]
  group <channel> [title]       add a group box
  list                          controls and groups
  map                           claimed CC/note numbers by channel
  set <id> <0-127>              move a slider / force a value
  press <id> | release <id>     button actions
  choose <id> <option>          select an option
  bind <id> mode|ch|num <value> edit a binding ('-' clears ch/num)
  move <id> <x> <y> <w> <h>     reposition a control
  dup <id> | del <id>           duplicate / delete a control
  gch <gid> <channel>           set a group's channel
  glock <gid> on|off            lock / unlock auto-assign
  gdup <gid> | gdel <gid> [all] duplicate / delete a group
  recompute                     refresh every group now
  save <file> | load <file>     layout persistence
  quit";

impl Command {
    /// Parse one shell line; `Err` carries a usage message
    pub fn parse(line: &str) -> std::result::Result<Command, String> {
        let tokens: Vec<&str> = line.split_whitespace().collect();
        let usage = |msg: &str| Err(msg.to_string());

        match tokens.as_slice() {
            [] => usage("empty command (try 'help')"),
            ["help"] => Ok(Command::Help),
            ["quit"] | ["exit"] => Ok(Command::Quit),
            ["ports"] => Ok(Command::Ports),
            ["in", rest @ ..] if !rest.is_empty() => Ok(Command::SetInput(rest.join(" "))),
            ["out", rest @ ..] if !rest.is_empty() => Ok(Command::SetOutput(rest.join(" "))),
            ["add", "slider", rest @ ..] => Ok(Command::AddSlider {
                label: label_or(rest, "Slider"),
            }),
            ["add", "button", rest @ ..] => Ok(Command::AddButton {
                label: label_or(rest, "Button"),
                latch: false,
            }),
            ["add", "latch", rest @ ..] => Ok(Command::AddButton {
                label: label_or(rest, "Button"),
                latch: true,
            }),
            ["add", "select", rest @ ..] => {
                // Trailing integer = option count
                let (options, rest) = match rest.split_last() {
                    Some((last, head)) => match last.parse::<usize>() {
                        Ok(n) if n >= 1 && n <= 64 => (n, head),
                        _ => (3, rest),
                    },
                    None => (3, rest),
                };
                Ok(Command::AddSelect { label: label_or(rest, "Select"), options })
            }
            ["group", channel, rest @ ..] => {
                let channel = parse_channel(channel)?;
                Ok(Command::AddGroup { title: label_or(rest, "Group"), channel })
            }
            ["list"] => Ok(Command::List),
            ["map"] => Ok(Command::Map),
            ["set", id, value] => Ok(Command::Set {
                id: parse_id(id)?,
                value: parse_value(value)?,
            }),
            ["press", id] => Ok(Command::Press { id: parse_id(id)? }),
            ["release", id] => Ok(Command::Release { id: parse_id(id)? }),
            ["choose", id, option] => Ok(Command::Choose {
                id: parse_id(id)?,
                option: option.parse().map_err(|_| "bad option index".to_string())?,
            }),
            ["bind", id, "mode", mode] => Ok(Command::BindMode {
                id: parse_id(id)?,
                mode: MidiMode::parse(mode).ok_or("modes: cc, note, pb, at")?,
            }),
            ["bind", id, "ch", "-"] => Ok(Command::BindChannel { id: parse_id(id)?, channel: None }),
            ["bind", id, "ch", channel] => Ok(Command::BindChannel {
                id: parse_id(id)?,
                channel: Some(parse_channel(channel)?),
            }),
            ["bind", id, "num", "-"] => Ok(Command::BindNumber { id: parse_id(id)?, number: None }),
            ["bind", id, "num", number] => Ok(Command::BindNumber {
                id: parse_id(id)?,
                number: Some(parse_value(number)?),
            }),
            ["move", id, x, y, w, h] => {
                let parse = |s: &str| s.parse::<i32>().map_err(|_| "bad coordinate".to_string());
                Ok(Command::Move {
                    id: parse_id(id)?,
                    rect: Rect::new(parse(x)?, parse(y)?, parse(w)?.max(1), parse(h)?.max(1)),
                })
            }
            ["dup", id] => Ok(Command::Duplicate { id: parse_id(id)? }),
            ["del", id] => Ok(Command::Delete { id: parse_id(id)? }),
            ["gch", id, channel] => Ok(Command::GroupChannel {
                id: parse_id(id)?,
                channel: parse_channel(channel)?,
            }),
            ["glock", id, "on"] => Ok(Command::GroupLock { id: parse_id(id)?, locked: true }),
            ["glock", id, "off"] => Ok(Command::GroupLock { id: parse_id(id)?, locked: false }),
            ["gdup", id] => Ok(Command::GroupDuplicate { id: parse_id(id)? }),
            ["gdel", id] => Ok(Command::GroupDelete { id: parse_id(id)?, cascade: false }),
            ["gdel", id, "all"] => Ok(Command::GroupDelete { id: parse_id(id)?, cascade: true }),
            ["recompute"] => Ok(Command::Recompute),
            ["save", path] => Ok(Command::Save(path.to_string())),
            ["load", path] => Ok(Command::Load(path.to_string())),
            _ => usage("unknown command (try 'help')"),
        }
    }
}

fn label_or(tokens: &[&str], fallback: &str) -> String {
    if tokens.is_empty() {
        fallback.to_string()
    } else {
        tokens.join(" ")
    }
}

fn parse_id(s: &str) -> std::result::Result<usize, String> {
    s.trim_start_matches(['#', 'g'])
        .parse()
        .map_err(|_| format!("bad id '{s}'"))
}

fn parse_channel(s: &str) -> std::result::Result<u8, String> {
    match s.parse::<u8>() {
        Ok(c) if (1..=16).contains(&c) => Ok(c),
        _ => Err(format!("bad channel '{s}' (1-16)")),
    }
}

fn parse_value(s: &str) -> std::result::Result<u8, String> {
    match s.parse::<u8>() {
        Ok(v) if v <= 127 => Ok(v),
        _ => Err(format!("bad value '{s}' (0-127)")),
    }
}

/// Where a freshly added control lands: beside the rightmost existing one
fn spawn_rect(deck: &Deck, width: i32, height: i32) -> Rect {
    let x = deck
        .registry()
        .iter()
        .map(|(_, c)| c.rect.x + c.rect.width)
        .max()
        .map(|right| right + 10)
        .unwrap_or(10);
    Rect::new(x, 10, width, height)
}

/// Apply a deck-level command, returning the line to print
pub fn apply(deck: &mut Deck, command: &Command) -> Result<String> {
    match command {
        Command::Help => Ok(HELP.to_string()),
        Command::AddSlider { label } => {
            let rect = spawn_rect(deck, 50, 200);
            let id = deck.add_control(Control::slider(label.clone(), MidiMode::Cc, rect));
            Ok(format!("added slider {id}"))
        }
        Command::AddButton { label, latch } => {
            let rect = spawn_rect(deck, 50, 50);
            let id = deck.add_control(Control::button(label.clone(), MidiMode::Cc, *latch, rect));
            Ok(format!("added button {id}"))
        }
        Command::AddSelect { label, options } => {
            let rect = spawn_rect(deck, 100, 120);
            let id = deck.add_control(Control::select(label.clone(), MidiMode::Cc, *options, rect));
            Ok(format!("added select {id} with {options} options"))
        }
        Command::AddGroup { title, channel } => {
            let rect = spawn_rect(deck, 320, 240);
            let id = deck.add_group(Group::new(title.clone(), *channel, rect));
            Ok(format!("added group {id} on channel {channel}"))
        }
        Command::List => Ok(render_list(deck)),
        Command::Map => Ok(render_map(deck)),
        Command::Set { id, value } => {
            deck.set_value(ControlId::from_index(*id), *value)?;
            Ok(format!("#{id} = {value}"))
        }
        Command::Press { id } => {
            deck.press_button(ControlId::from_index(*id))?;
            Ok(format!("#{id} pressed"))
        }
        Command::Release { id } => {
            deck.release_button(ControlId::from_index(*id))?;
            Ok(format!("#{id} released"))
        }
        Command::Choose { id, option } => {
            deck.choose_option(ControlId::from_index(*id), *option)?;
            Ok(format!("#{id} -> option {option}"))
        }
        Command::BindMode { id, mode } => {
            deck.set_binding_mode(ControlId::from_index(*id), *mode)?;
            Ok(format!("#{id} mode = {mode}"))
        }
        Command::BindChannel { id, channel } => {
            deck.set_binding_channel(ControlId::from_index(*id), *channel)?;
            Ok(format!("#{id} channel = {}", channel.map_or("-".into(), |c| c.to_string())))
        }
        Command::BindNumber { id, number } => {
            deck.set_binding_number(ControlId::from_index(*id), *number)?;
            Ok(format!("#{id} number = {}", number.map_or("-".into(), |n| n.to_string())))
        }
        Command::Move { id, rect } => {
            deck.move_control(ControlId::from_index(*id), *rect)?;
            Ok(format!("#{id} moved"))
        }
        Command::Duplicate { id } => {
            let copy = deck.duplicate_control(ControlId::from_index(*id))?;
            Ok(format!("#{id} duplicated as {copy}"))
        }
        Command::Delete { id } => {
            deck.remove_control(ControlId::from_index(*id))?;
            Ok(format!("#{id} deleted"))
        }
        Command::GroupChannel { id, channel } => {
            deck.set_group_channel(GroupId::from_index(*id), *channel)?;
            Ok(format!("g{id} channel = {channel}"))
        }
        Command::GroupLock { id, locked } => {
            deck.set_group_locked(GroupId::from_index(*id), *locked)?;
            Ok(format!("g{id} {}", if *locked { "locked" } else { "unlocked" }))
        }
        Command::GroupDuplicate { id } => {
            let copy = deck.duplicate_group(GroupId::from_index(*id))?;
            Ok(format!("g{id} duplicated as {copy}"))
        }
        Command::GroupDelete { id, cascade } => {
            if *cascade {
                deck.remove_group_cascade(GroupId::from_index(*id))?;
                Ok(format!("g{id} and its members deleted"))
            } else {
                deck.remove_group(GroupId::from_index(*id))?;
                Ok(format!("g{id} deleted, members kept"))
            }
        }
        Command::Recompute => {
            deck.refresh_groups();
            Ok("group membership recomputed".to_string())
        }
        Command::Save(path) => {
            crate::persistence::save_layout(deck, path)?;
            Ok(format!("saved {path}"))
        }
        Command::Load(path) => {
            crate::persistence::load_layout(deck, path)?;
            Ok(format!(
                "loaded {path}: {} control(s), {} group(s)",
                deck.registry().len(),
                deck.groups().count()
            ))
        }
        // Port selection and quit are handled by the run loop
        Command::Quit | Command::Ports | Command::SetInput(_) | Command::SetOutput(_) => {
            Ok(String::new())
        }
    }
}

fn describe_binding(control: &Control) -> String {
    let binding = control.binding();
    let channel = binding.channel.map_or("-".to_string(), |c| c.to_string());
    let number = binding.number.map_or("-".to_string(), |n| n.to_string());
    format!("{} ch {} num {} val {}", binding.mode, channel, number, binding.value)
}

fn render_list(deck: &Deck) -> String {
    let mut lines = Vec::new();
    for (id, control) in deck.registry().iter() {
        let extra = match &control.kind {
            ControlKind::Button { latch, latched, .. } if *latch => {
                if *latched {
                    " [latched]"
                } else {
                    " [latch]"
                }
            }
            ControlKind::Select { options, selected, .. } => {
                lines.push(format!(
                    "{} {} '{}' {} ({} options, selected {})",
                    id,
                    control.kind.kind_name(),
                    control.label,
                    describe_binding(control),
                    options.len(),
                    selected
                ));
                continue;
            }
            _ => "",
        };
        lines.push(format!(
            "{} {} '{}' {}{}",
            id,
            control.kind.kind_name(),
            control.label,
            describe_binding(control),
            extra
        ));
    }
    for (id, group) in deck.groups() {
        lines.push(format!(
            "{} group '{}' ch {} {} ({} member(s))",
            id,
            group.title,
            group.channel,
            if group.auto_assign { "auto" } else { "locked" },
            group.members.len()
        ));
    }
    if lines.is_empty() {
        "nothing placed yet".to_string()
    } else {
        lines.join("\n")
    }
}

fn render_map(deck: &Deck) -> String {
    let usage = deck.number_usage();
    if usage.is_empty() {
        return "no CC/note numbers assigned".to_string();
    }
    let mut lines = Vec::new();
    for (channel, numbers) in usage {
        lines.push(format!("channel {channel}"));
        for (number, claimants) in numbers {
            lines.push(format!("  {:>3}: {}", number, claimants.join(", ")));
        }
    }
    lines.join("\n")
}

/// Print available MIDI ports, input then output
pub fn list_ports_formatted(transport: &dyn Transport) {
    println!("\n{}", "=== MIDI Input Ports ===".bold());
    match transport.input_ports() {
        Ok(ports) if !ports.is_empty() => {
            for (i, port) in ports.iter().enumerate() {
                println!("  {}: {}", i, port.green());
            }
        }
        Ok(_) => println!("  (none)"),
        Err(e) => println!("  {}", format!("error: {e}").red()),
    }

    println!("\n{}", "=== MIDI Output Ports ===".bold());
    match transport.output_ports() {
        Ok(ports) if !ports.is_empty() => {
            for (i, port) in ports.iter().enumerate() {
                println!("  {}: {}", i, port.green());
            }
        }
        Ok(_) => println!("  (none)"),
        Err(e) => println!("  {}", format!("error: {e}").red()),
    }
    println!();
}
