//! Deck - the single control-mutating context
//!
//! The deck owns the control registry, the group boxes, the outbound port
//! handle and the echo flag. Every mutation of a binding happens here: user
//! actions encode and send, inbound routing applies values under the echo
//! guard, geometry changes re-run group membership and allocation. Nothing
//! in the deck is shared or locked; the input listener only ever touches
//! its queue.

#[cfg(test)]
mod tests;

use anyhow::{anyhow, bail, Result};
use std::collections::BTreeMap;
use tracing::{debug, info, trace, warn};

use crate::binding::{is_reserved_number, MidiMode};
use crate::controls::{Control, ControlId, ControlKind, ControlRegistry, Rect};
use crate::dispatch::{self, EchoFlag, RouteAction, RouteUpdate};
use crate::group::{AssignOutcome, Group};
use crate::bridge::InputBridge;
use crate::transport::MidiOutputHandle;

/// Horizontal gap when spawning a duplicate next to its original
const DUPLICATE_GAP: i32 = 20;

/// Stable handle to a group box
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GroupId(usize);

impl std::fmt::Display for GroupId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

impl GroupId {
    pub fn index(&self) -> usize {
        self.0
    }

    /// Rebuild a handle from a displayed index; lookups with a dead or
    /// out-of-range id simply miss
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// The control surface engine
pub struct Deck {
    registry: ControlRegistry,
    groups: Vec<Option<Group>>,
    output: Option<Box<dyn MidiOutputHandle>>,
    echo: EchoFlag,
}

impl Default for Deck {
    fn default() -> Self {
        Self::new()
    }
}

impl Deck {
    pub fn new() -> Self {
        Self {
            registry: ControlRegistry::new(),
            groups: Vec::new(),
            output: None,
            echo: EchoFlag::new(),
        }
    }

    // ----- output port -----

    /// Install the outbound port handle, closing any previous one first
    pub fn set_output(&mut self, handle: Box<dyn MidiOutputHandle>) {
        if let Some(old) = self.output.take() {
            info!("closing output port '{}'", old.port_name());
        }
        info!("output port '{}' connected", handle.port_name());
        self.output = Some(handle);
    }

    pub fn clear_output(&mut self) {
        if let Some(old) = self.output.take() {
            info!("closing output port '{}'", old.port_name());
        }
    }

    pub fn output_name(&self) -> Option<&str> {
        self.output.as_deref().map(|o| o.port_name())
    }

    // ----- registry access -----

    pub fn registry(&self) -> &ControlRegistry {
        &self.registry
    }

    pub fn control(&self, id: ControlId) -> Option<&Control> {
        self.registry.get(id)
    }

    pub fn groups(&self) -> impl Iterator<Item = (GroupId, &Group)> {
        self.groups
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|g| (GroupId(i), g)))
    }

    pub fn group(&self, id: GroupId) -> Option<&Group> {
        self.groups.get(id.0).and_then(Option::as_ref)
    }

    // ----- control lifecycle -----

    /// Place a control; any group containing its center auto-fills it
    pub fn add_control(&mut self, control: Control) -> ControlId {
        let id = self.registry.insert(control);
        self.refresh_groups();
        id
    }

    /// Destroy a control and its binding
    pub fn remove_control(&mut self, id: ControlId) -> Result<()> {
        if self.registry.remove(id).is_none() {
            bail!("no such control {id}");
        }
        self.refresh_groups();
        Ok(())
    }

    /// Clone a control beside the original. The copy starts with its number
    /// unassigned; a containing auto-assign group fills it immediately.
    pub fn duplicate_control(&mut self, id: ControlId) -> Result<ControlId> {
        let dx = match self.registry.get(id) {
            Some(c) => c.rect.width + DUPLICATE_GAP,
            None => bail!("no such control {id}"),
        };
        let copy = self
            .registry
            .duplicate(id, dx, 0)
            .ok_or_else(|| anyhow!("no such control {id}"))?;
        self.refresh_groups();
        Ok(copy)
    }

    /// Host geometry callback: a control moved or resized
    pub fn move_control(&mut self, id: ControlId, rect: Rect) -> Result<()> {
        if !self.registry.set_rect(id, rect) {
            bail!("no such control {id}");
        }
        self.refresh_groups();
        Ok(())
    }

    // ----- binding edits -----

    pub fn set_binding_channel(&mut self, id: ControlId, channel: Option<u8>) -> Result<()> {
        let control = self.registry.get_mut(id).ok_or_else(|| anyhow!("no such control {id}"))?;
        control.binding_mut().channel = channel.map(|c| c.clamp(1, 16));
        Ok(())
    }

    /// Set a controller/note number by hand. Reserved Channel-Mode numbers
    /// are allowed but warned about.
    pub fn set_binding_number(&mut self, id: ControlId, number: Option<u8>) -> Result<()> {
        if let Some(n) = number {
            if n > 127 {
                bail!("number {n} out of range (0-127)");
            }
            if is_reserved_number(n) {
                warn!(
                    "number {} is a reserved Channel-Mode controller; \
                     most receivers treat it specially",
                    n
                );
            }
        }
        let control = self.registry.get_mut(id).ok_or_else(|| anyhow!("no such control {id}"))?;
        control.binding_mut().number = number;
        Ok(())
    }

    pub fn set_binding_mode(&mut self, id: ControlId, mode: MidiMode) -> Result<()> {
        let control = self.registry.get_mut(id).ok_or_else(|| anyhow!("no such control {id}"))?;
        if matches!(control.kind, ControlKind::Select { .. }) && mode == MidiMode::PitchBend {
            bail!("pitch bend is not a valid mode for a select");
        }
        control.binding_mut().mode = mode;
        Ok(())
    }

    // ----- user actions -----

    /// Slider moved (or any control's value forced): store and send
    pub fn set_value(&mut self, id: ControlId, raw: u8) -> Result<()> {
        let binding = {
            let control = self.registry.get_mut(id).ok_or_else(|| anyhow!("no such control {id}"))?;
            let value = raw.min(127);
            if let ControlKind::Button { binding: _, latch, latched } = &mut control.kind {
                if *latch {
                    *latched = value >= 64;
                }
            }
            let binding = control.binding_mut();
            binding.value = raw.min(127);
            binding.clone()
        };
        self.send_for(&binding, binding.value);
        Ok(())
    }

    /// Button pressed: latch toggles, momentary goes on
    pub fn press_button(&mut self, id: ControlId) -> Result<()> {
        let (binding, value) = {
            let control = self.registry.get_mut(id).ok_or_else(|| anyhow!("no such control {id}"))?;
            let ControlKind::Button { binding, latch, latched } = &mut control.kind else {
                bail!("{id} is not a button");
            };
            let value = if *latch {
                *latched = !*latched;
                if *latched {
                    127
                } else {
                    0
                }
            } else {
                127
            };
            binding.value = value;
            (binding.clone(), value)
        };
        self.send_for(&binding, value);
        Ok(())
    }

    /// Button released: momentary goes off, latch ignores it
    pub fn release_button(&mut self, id: ControlId) -> Result<()> {
        let sent = {
            let control = self.registry.get_mut(id).ok_or_else(|| anyhow!("no such control {id}"))?;
            let ControlKind::Button { binding, latch, .. } = &mut control.kind else {
                bail!("{id} is not a button");
            };
            if *latch {
                None
            } else {
                binding.value = 0;
                Some(binding.clone())
            }
        };
        if let Some(binding) = sent {
            self.send_for(&binding, 0);
        }
        Ok(())
    }

    /// Selection changed on a Select: re-resolve the option's fixed value
    /// and send exactly one message. Re-selecting the current option is a
    /// no-op.
    pub fn choose_option(&mut self, id: ControlId, index: usize) -> Result<()> {
        let sent = {
            let control = self.registry.get_mut(id).ok_or_else(|| anyhow!("no such control {id}"))?;
            let ControlKind::Select { binding, options, selected, .. } = &mut control.kind else {
                bail!("{id} is not a select");
            };
            if index >= options.len() {
                bail!("option {index} out of range for {id}");
            }
            if index == *selected {
                None
            } else {
                *selected = index;
                binding.value = options[index].value;
                Some((binding.clone(), options[index].value))
            }
        };
        if let Some((binding, value)) = sent {
            self.send_for(&binding, value);
        }
        Ok(())
    }

    /// Encode and send, unless the echo guard is held or nothing can go
    /// out. Send failures are logged and swallowed; one failed message must
    /// not take the session down.
    fn send_for(&mut self, binding: &crate::binding::Binding, raw: u8) {
        if self.echo.is_held() {
            trace!("echo guard held, outbound send skipped");
            return;
        }
        let Some(msg) = dispatch::encode(binding, raw) else {
            return;
        };
        match self.output.as_deref_mut() {
            Some(out) => {
                if let Err(e) = out.send(&msg) {
                    warn!("MIDI send failed: {}", e);
                }
            }
            None => trace!("no output port selected, dropped {}", msg),
        }
    }

    // ----- inbound -----

    /// Drain the input bridge and apply every routed update. Returns the
    /// number of messages processed.
    pub fn pump(&mut self, bridge: &mut InputBridge) -> usize {
        let mut processed = 0;
        while let Some(msg) = bridge.try_recv() {
            self.apply_inbound(&msg);
            processed += 1;
        }
        processed
    }

    /// Route one inbound message and apply its updates with the echo guard
    /// held, so reflected control updates never re-emit MIDI.
    pub fn apply_inbound(&mut self, msg: &crate::midi::MidiMessage) {
        let updates = dispatch::route(&self.registry, msg);
        if updates.is_empty() {
            return;
        }
        trace!("inbound {} -> {} update(s)", msg, updates.len());

        // Guard scope covers exactly this message's updates; the guard
        // drops (and releases) even if an apply errors out.
        let _guard = self.echo.hold();
        for update in updates {
            self.apply_update(update);
        }
    }

    fn apply_update(&mut self, update: RouteUpdate) {
        let result = match update.action {
            RouteAction::SetValue(value) => self.set_value(update.id, value),
            RouteAction::SelectOption(index) => self.choose_option(update.id, index),
        };
        if let Err(e) = result {
            debug!("inbound update for {} dropped: {}", update.id, e);
        }
    }

    // ----- groups -----

    pub fn add_group(&mut self, group: Group) -> GroupId {
        self.groups.push(Some(group));
        let id = GroupId(self.groups.len() - 1);
        self.refresh_group(id);
        id
    }

    /// Delete the group record, leaving its members in place
    pub fn remove_group(&mut self, id: GroupId) -> Result<()> {
        match self.groups.get_mut(id.0).and_then(Option::take) {
            Some(group) => {
                debug!("group '{}' removed, members kept", group.title);
                Ok(())
            }
            None => bail!("no such group {id}"),
        }
    }

    /// Delete the group and every control currently contained in it.
    /// Membership is recomputed first so the cascade matches the geometry
    /// on screen, not a stale set.
    pub fn remove_group_cascade(&mut self, id: GroupId) -> Result<()> {
        let members = {
            let group = self.groups.get_mut(id.0).and_then(Option::as_mut).ok_or_else(|| anyhow!("no such group {id}"))?;
            group.compute_membership(&self.registry);
            group.members.clone()
        };
        for member in members {
            let _ = self.registry.remove(member);
        }
        self.groups[id.0] = None;
        self.refresh_groups();
        Ok(())
    }

    pub fn rename_group(&mut self, id: GroupId, title: impl Into<String>) -> Result<()> {
        let group = self.groups.get_mut(id.0).and_then(Option::as_mut).ok_or_else(|| anyhow!("no such group {id}"))?;
        group.title = title.into();
        Ok(())
    }

    /// Change the group's target channel and re-run both apply steps
    pub fn set_group_channel(&mut self, id: GroupId, channel: u8) -> Result<()> {
        {
            let group = self.groups.get_mut(id.0).and_then(Option::as_mut).ok_or_else(|| anyhow!("no such group {id}"))?;
            group.channel = channel.clamp(1, 16);
        }
        self.refresh_group(id);
        Ok(())
    }

    /// Lock (stop auto-assign) or unlock a group; unlocking fills any
    /// members that went unassigned while locked
    pub fn set_group_locked(&mut self, id: GroupId, locked: bool) -> Result<()> {
        {
            let group = self.groups.get_mut(id.0).and_then(Option::as_mut).ok_or_else(|| anyhow!("no such group {id}"))?;
            group.auto_assign = !locked;
        }
        if !locked {
            self.refresh_group(id);
        }
        Ok(())
    }

    /// Host geometry callback: a group box moved or resized
    pub fn move_group(&mut self, id: GroupId, rect: Rect) -> Result<()> {
        {
            let group = self.groups.get_mut(id.0).and_then(Option::as_mut).ok_or_else(|| anyhow!("no such group {id}"))?;
            group.rect = rect;
        }
        self.refresh_groups();
        Ok(())
    }

    /// Duplicate a group box and its members beside the original. The copy
    /// targets the next channel (16 wraps to 1). With auto-assign on, the
    /// copies' numbers are cleared and freshly allocated so they can never
    /// collide with anything already on the new channel; a locked group's
    /// copies keep their numbers verbatim.
    pub fn duplicate_group(&mut self, id: GroupId) -> Result<GroupId> {
        let (mut source, members) = {
            let group = self.groups.get_mut(id.0).and_then(Option::as_mut).ok_or_else(|| anyhow!("no such group {id}"))?;
            group.compute_membership(&self.registry);
            (group.clone(), group.members.clone())
        };

        let dx = source.rect.width + DUPLICATE_GAP;
        let new_channel = source.next_channel();

        for member in members {
            if let Some(original) = self.registry.get(member) {
                let mut copy = original.clone();
                copy.rect = copy.rect.offset(dx, 0);
                let binding = copy.binding_mut();
                binding.channel = Some(new_channel);
                if source.auto_assign && binding.requires_number() {
                    binding.number = None;
                }
                self.registry.insert(copy);
            }
        }

        source.rect = source.rect.offset(dx, 0);
        source.channel = new_channel;
        source.members.clear();
        let title = source.title.clone();
        let copy_id = self.add_group(source);
        info!("group '{}' duplicated onto channel {}", title, new_channel);
        Ok(copy_id)
    }

    /// Re-run membership + channel + allocation for every group, in
    /// creation order. Called on any geometry change so no group ever shows
    /// stale membership.
    pub fn refresh_groups(&mut self) {
        for i in 0..self.groups.len() {
            self.refresh_group(GroupId(i));
        }
    }

    fn refresh_group(&mut self, id: GroupId) {
        if let Some(slot) = self.groups.get_mut(id.0) {
            if let Some(group) = slot.as_mut() {
                if let AssignOutcome::Exhausted { unassigned, .. } =
                    group.refresh(&mut self.registry)
                {
                    // Already warned inside the group; keep the deck-level
                    // note so hosts can surface it
                    debug!(
                        "group '{}' left {} member(s) unassigned after exhaustion",
                        group.title, unassigned
                    );
                }
            }
        }
    }

    /// Drop every control and group, e.g. before loading a layout
    pub fn clear(&mut self) {
        self.registry = ControlRegistry::new();
        self.groups.clear();
    }

    // ----- reports -----

    /// Claimed CC/note numbers per channel, with the labels of the controls
    /// claiming them. Channels with no claims are omitted.
    pub fn number_usage(&self) -> BTreeMap<u8, BTreeMap<u8, Vec<String>>> {
        let mut usage: BTreeMap<u8, BTreeMap<u8, Vec<String>>> = BTreeMap::new();
        for (_, control) in self.registry.iter() {
            let binding = control.binding();
            if !binding.requires_number() {
                continue;
            }
            let (Some(channel), Some(number)) = (binding.channel, binding.number) else {
                continue;
            };
            usage
                .entry(channel)
                .or_default()
                .entry(number)
                .or_default()
                .push(format!("{}: {}", control.kind.kind_name(), control.label));
        }
        usage
    }
}
