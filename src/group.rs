//! Group boxes: spatial clusters that auto-allocate member addresses
//!
//! A group does not own its members; it references them by containment and
//! may set their channel/number fields. Membership is a pure function of
//! the current bounding boxes and is recomputed wholesale on every geometry
//! change — never maintained incrementally, never persisted.

use tracing::{debug, warn};

use crate::alloc::find_free_slot;
use crate::controls::{ControlId, ControlRegistry, Rect};

/// Outcome of a missing-number assignment pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOutcome {
    /// Every member that needed a number received one
    Complete { assigned: usize },
    /// The address space ran out; this many members are still unassigned
    Exhausted { assigned: usize, unassigned: usize },
}

/// A lasso-like box grouping the controls whose centers lie inside it
#[derive(Debug, Clone)]
pub struct Group {
    pub title: String,
    /// Default channel handed to members (1-16)
    pub channel: u8,
    /// When false the group is locked: members are never auto-filled
    pub auto_assign: bool,
    pub rect: Rect,
    /// Current membership, in registry iteration order
    pub members: Vec<ControlId>,
}

impl Group {
    pub fn new(title: impl Into<String>, channel: u8, rect: Rect) -> Self {
        Self {
            title: title.into(),
            channel: channel.clamp(1, 16),
            auto_assign: true,
            rect,
            members: Vec::new(),
        }
    }

    /// Replace the membership set with the controls whose bounding-box
    /// center currently falls within this group's box (edges inclusive).
    pub fn compute_membership(&mut self, registry: &ControlRegistry) {
        self.members = registry
            .iter()
            .filter(|(_, control)| self.rect.contains_center(&control.rect))
            .map(|(id, _)| id)
            .collect();
    }

    /// Give the group's channel to members whose binding is still missing a
    /// channel or a required number. Already-assigned numbers are left
    /// untouched.
    pub fn apply_channel_to_members(&self, registry: &mut ControlRegistry) {
        for id in &self.members {
            if let Some(control) = registry.get_mut(*id) {
                let binding = control.binding_mut();
                let missing_number = binding.requires_number() && binding.number.is_none();
                if missing_number || binding.channel.is_none() {
                    binding.channel = Some(self.channel);
                }
            }
        }
    }

    /// Allocate numbers for members that still lack one. No-op when the
    /// group is locked. Stops at exhaustion, leaving the remainder
    /// unassigned for the caller to report.
    pub fn assign_missing_numbers(&self, registry: &mut ControlRegistry) -> AssignOutcome {
        if !self.auto_assign {
            return AssignOutcome::Complete { assigned: 0 };
        }

        let mut assigned = 0usize;
        for (idx, id) in self.members.iter().enumerate() {
            let needs_number = registry
                .get(*id)
                .map(|c| {
                    let b = c.binding();
                    b.requires_number() && b.number.is_none()
                })
                .unwrap_or(false);
            if !needs_number {
                continue;
            }

            match find_free_slot(registry, self.channel) {
                Some((channel, number)) => {
                    if let Some(control) = registry.get_mut(*id) {
                        let binding = control.binding_mut();
                        binding.channel = Some(channel);
                        binding.number = Some(number);
                        debug!(
                            "group '{}': assigned ch {} num {} to {} '{}'",
                            self.title,
                            channel,
                            number,
                            control.kind.kind_name(),
                            control.label
                        );
                        assigned += 1;
                    }
                }
                None => {
                    let unassigned = self.members[idx..]
                        .iter()
                        .filter(|m| {
                            registry
                                .get(**m)
                                .map(|c| {
                                    let b = c.binding();
                                    b.requires_number() && b.number.is_none()
                                })
                                .unwrap_or(false)
                        })
                        .count();
                    warn!(
                        "group '{}': no free CC/note slots left on any channel, \
                         {} member(s) left unassigned",
                        self.title, unassigned
                    );
                    return AssignOutcome::Exhausted { assigned, unassigned };
                }
            }
        }

        AssignOutcome::Complete { assigned }
    }

    /// Membership recomputation and both apply steps, as one unit. Runs on
    /// every geometry change so stale membership is never visible.
    pub fn refresh(&mut self, registry: &mut ControlRegistry) -> AssignOutcome {
        self.compute_membership(registry);
        self.apply_channel_to_members(registry);
        self.assign_missing_numbers(registry)
    }

    /// Next channel for a duplicate of this group (16 wraps to 1)
    pub fn next_channel(&self) -> u8 {
        if self.channel < 16 {
            self.channel + 1
        } else {
            1
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::MidiMode;
    use crate::controls::Control;

    fn slider_at(x: i32, y: i32) -> Control {
        Control::slider("s", MidiMode::Cc, Rect::new(x, y, 50, 200))
    }

    #[test]
    fn test_membership_is_pure_geometry() {
        let mut reg = ControlRegistry::new();
        let inside = reg.insert(slider_at(10, 10));
        let outside = reg.insert(slider_at(500, 500));

        let mut group = Group::new("G", 1, Rect::new(0, 0, 300, 300));
        group.compute_membership(&reg);
        assert_eq!(group.members, vec![inside]);

        // Move the member out, recompute: gone
        reg.set_rect(inside, Rect::new(600, 600, 50, 200));
        group.compute_membership(&reg);
        assert!(group.members.is_empty());

        // Move it back, recompute: restored
        reg.set_rect(inside, Rect::new(10, 10, 50, 200));
        group.compute_membership(&reg);
        assert_eq!(group.members, vec![inside]);

        let _ = outside;
    }

    #[test]
    fn test_refresh_assigns_channel_and_numbers() {
        let mut reg = ControlRegistry::new();
        let a = reg.insert(slider_at(10, 10));
        let b = reg.insert(slider_at(70, 10));

        let mut group = Group::new("G", 5, Rect::new(0, 0, 300, 300));
        let outcome = group.refresh(&mut reg);

        assert_eq!(outcome, AssignOutcome::Complete { assigned: 2 });
        let ba = reg.get(a).unwrap().binding();
        let bb = reg.get(b).unwrap().binding();
        assert_eq!(ba.channel, Some(5));
        assert_eq!(bb.channel, Some(5));
        assert_eq!(ba.number, Some(0));
        assert_eq!(bb.number, Some(1));
    }

    #[test]
    fn test_locked_group_never_assigns() {
        let mut reg = ControlRegistry::new();
        let a = reg.insert(slider_at(10, 10));

        let mut group = Group::new("G", 5, Rect::new(0, 0, 300, 300));
        group.auto_assign = false;
        group.refresh(&mut reg);

        // Channel still applied, but no number handed out
        let binding = reg.get(a).unwrap().binding();
        assert_eq!(binding.channel, Some(5));
        assert_eq!(binding.number, None);
    }

    #[test]
    fn test_partially_assigned_numbers_untouched() {
        let mut reg = ControlRegistry::new();
        let a = reg.insert(slider_at(10, 10));
        {
            let binding = reg.get_mut(a).unwrap().binding_mut();
            binding.channel = Some(2);
            binding.number = Some(44);
        }

        let mut group = Group::new("G", 9, Rect::new(0, 0, 300, 300));
        group.refresh(&mut reg);

        let binding = reg.get(a).unwrap().binding();
        assert_eq!(binding.channel, Some(2), "assigned member keeps its channel");
        assert_eq!(binding.number, Some(44));
    }

    #[test]
    fn test_channel_wide_members_get_channel_but_no_number() {
        let mut reg = ControlRegistry::new();
        let mut pb = Control::slider("pb", MidiMode::PitchBend, Rect::new(10, 10, 50, 200));
        pb.binding_mut().channel = None;
        let pb = reg.insert(pb);

        let mut group = Group::new("G", 7, Rect::new(0, 0, 300, 300));
        group.refresh(&mut reg);

        let binding = reg.get(pb).unwrap().binding();
        assert_eq!(binding.channel, Some(7));
        assert_eq!(binding.number, None);
    }

    #[test]
    fn test_exhaustion_stops_and_reports() {
        let mut reg = ControlRegistry::new();
        // Saturate the whole address space
        for ch in 1..=16u8 {
            for n in 0..120u8 {
                let mut c = slider_at(1000, 1000);
                c.binding_mut().channel = Some(ch);
                c.binding_mut().number = Some(n);
                reg.insert(c);
            }
        }
        let a = reg.insert(slider_at(10, 10));
        let b = reg.insert(slider_at(70, 10));

        let mut group = Group::new("G", 1, Rect::new(0, 0, 300, 300));
        let outcome = group.refresh(&mut reg);

        assert_eq!(outcome, AssignOutcome::Exhausted { assigned: 0, unassigned: 2 });
        assert_eq!(reg.get(a).unwrap().binding().number, None);
        assert_eq!(reg.get(b).unwrap().binding().number, None);
    }

    #[test]
    fn test_next_channel_wraps() {
        let mut g = Group::new("G", 15, Rect::new(0, 0, 10, 10));
        assert_eq!(g.next_channel(), 16);
        g.channel = 16;
        assert_eq!(g.next_channel(), 1);
    }
}
