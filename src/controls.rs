//! Placeable controls and the registry that owns them
//!
//! The registry is the single owning collection for every control on the
//! canvas. The deck passes it (by reference) into the allocator, the groups
//! and the dispatcher; nothing here is global. Ids are stable across
//! removals (arena slots are never reused for a different control's id
//! while it is alive, and a freed slot simply yields a fresh id).

use serde::{Deserialize, Serialize};

use crate::binding::{Binding, MidiMode};

/// Axis-aligned bounding box in canvas coordinates.
///
/// Supplied by the host's geometry layer; the engine only reads it for
/// group containment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    /// Center point, integer division like the canvas grid
    pub fn center(&self) -> (i32, i32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// Point containment, inclusive of all four edges
    pub fn contains_point(&self, px: i32, py: i32) -> bool {
        px >= self.x && px <= self.x + self.width && py >= self.y && py <= self.y + self.height
    }

    /// True when `other`'s center lies within this box
    pub fn contains_center(&self, other: &Rect) -> bool {
        let (cx, cy) = other.center();
        self.contains_point(cx, cy)
    }

    pub fn offset(&self, dx: i32, dy: i32) -> Rect {
        Rect { x: self.x + dx, y: self.y + dy, ..*self }
    }
}

/// One option of a Select control: a label and the fixed value it sends
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelectOption {
    pub label: String,
    pub value: u8,
}

impl SelectOption {
    /// Default options for an n-way select: the 0-127 range bucketed into
    /// n equal spans, each option sending its bucket's midpoint. Keeps
    /// nearest-value resolution well-spread without user editing.
    pub fn spread(n: usize) -> Vec<SelectOption> {
        let n = n.max(1);
        (0..n)
            .map(|i| {
                let low = (i * 128) / n;
                let high = ((i + 1) * 128 / n).saturating_sub(1).max(low);
                SelectOption {
                    label: format!("{}", i + 1),
                    value: (((low + high) / 2).min(127)) as u8,
                }
            })
            .collect()
    }
}

/// Layout direction of a Select's option strip (persisted for the host UI)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Orientation {
    #[default]
    Vertical,
    Horizontal,
}

/// The UI construct owning a binding, with exactly the fields each kind needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlKind {
    /// Continuous 0-127 value
    Slider { binding: Binding },

    /// Two-state control: on = 127, off = 0. With `latch` the button
    /// toggles on press; without, press sends on and release sends off.
    Button { binding: Binding, latch: bool, latched: bool },

    /// Mutually-exclusive option group. All options share the binding's
    /// (channel, number); they differ only in the fixed value each sends.
    /// Pitch Bend is not a valid mode here.
    Select {
        binding: Binding,
        options: Vec<SelectOption>,
        selected: usize,
        orientation: Orientation,
    },
}

impl ControlKind {
    pub fn binding(&self) -> &Binding {
        match self {
            ControlKind::Slider { binding }
            | ControlKind::Button { binding, .. }
            | ControlKind::Select { binding, .. } => binding,
        }
    }

    pub fn binding_mut(&mut self) -> &mut Binding {
        match self {
            ControlKind::Slider { binding }
            | ControlKind::Button { binding, .. }
            | ControlKind::Select { binding, .. } => binding,
        }
    }

    /// Short kind name for logs and reports
    pub fn kind_name(&self) -> &'static str {
        match self {
            ControlKind::Slider { .. } => "slider",
            ControlKind::Button { .. } => "button",
            ControlKind::Select { .. } => "select",
        }
    }
}

/// A placed control: label, geometry, and its kind-specific state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Control {
    pub label: String,
    pub rect: Rect,
    pub kind: ControlKind,
}

impl Control {
    pub fn slider(label: impl Into<String>, mode: MidiMode, rect: Rect) -> Self {
        Self {
            label: label.into(),
            rect,
            kind: ControlKind::Slider { binding: Binding::new(mode) },
        }
    }

    pub fn button(label: impl Into<String>, mode: MidiMode, latch: bool, rect: Rect) -> Self {
        Self {
            label: label.into(),
            rect,
            kind: ControlKind::Button { binding: Binding::new(mode), latch, latched: false },
        }
    }

    pub fn select(label: impl Into<String>, mode: MidiMode, options: usize, rect: Rect) -> Self {
        let options = SelectOption::spread(options);
        let mut binding = Binding::new(mode);
        binding.value = options.first().map(|o| o.value).unwrap_or(0);
        Self {
            label: label.into(),
            rect,
            kind: ControlKind::Select {
                binding,
                options,
                selected: 0,
                orientation: Orientation::default(),
            },
        }
    }

    pub fn binding(&self) -> &Binding {
        self.kind.binding()
    }

    pub fn binding_mut(&mut self) -> &mut Binding {
        self.kind.binding_mut()
    }
}

/// Stable handle to a control in the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ControlId(usize);

impl std::fmt::Display for ControlId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl ControlId {
    pub fn index(&self) -> usize {
        self.0
    }

    /// Rebuild a handle from a displayed index; lookups with a dead or
    /// out-of-range id simply miss
    pub fn from_index(index: usize) -> Self {
        Self(index)
    }
}

/// Owning collection of every live control
#[derive(Debug, Default)]
pub struct ControlRegistry {
    slots: Vec<Option<Control>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, control: Control) -> ControlId {
        self.slots.push(Some(control));
        ControlId(self.slots.len() - 1)
    }

    /// Destroy a control; its binding dies with it
    pub fn remove(&mut self, id: ControlId) -> Option<Control> {
        self.slots.get_mut(id.0).and_then(Option::take)
    }

    pub fn get(&self, id: ControlId) -> Option<&Control> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, id: ControlId) -> Option<&mut Control> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    pub fn contains(&self, id: ControlId) -> bool {
        self.get(id).is_some()
    }

    /// Live controls in creation order
    pub fn iter(&self) -> impl Iterator<Item = (ControlId, &Control)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|c| (ControlId(i), c)))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (ControlId, &mut Control)> {
        self.slots
            .iter_mut()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_mut().map(|c| (ControlId(i), c)))
    }

    pub fn ids(&self) -> Vec<ControlId> {
        self.iter().map(|(id, _)| id).collect()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clone a control next to the original. The copy starts with its
    /// number unassigned so it can be re-allocated; channel, mode, value
    /// and kind state carry over.
    pub fn duplicate(&mut self, id: ControlId, dx: i32, dy: i32) -> Option<ControlId> {
        let mut copy = self.get(id)?.clone();
        copy.rect = copy.rect.offset(dx, dy);
        copy.binding_mut().number = None;
        Some(self.insert(copy))
    }

    pub fn set_rect(&mut self, id: ControlId, rect: Rect) -> bool {
        match self.get_mut(id) {
            Some(c) => {
                c.rect = rect;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_center_containment_inclusive() {
        let outer = Rect::new(0, 0, 100, 100);

        // Center on the edge still counts
        let on_edge = Rect::new(90, 40, 20, 20); // center (100, 50)
        assert!(outer.contains_center(&on_edge));

        let outside = Rect::new(92, 40, 20, 20); // center (102, 50)
        assert!(!outer.contains_center(&outside));
    }

    #[test]
    fn test_option_spread() {
        let opts = SelectOption::spread(3);
        assert_eq!(opts.len(), 3);
        // Buckets 0-41, 42-84, 85-127 -> midpoints
        assert_eq!(opts[0].value, 20);
        assert_eq!(opts[1].value, 63);
        assert_eq!(opts[2].value, 106);

        // Degenerate case never panics and stays in range
        let one = SelectOption::spread(1);
        assert_eq!(one.len(), 1);
        assert!(one[0].value <= 127);
    }

    #[test]
    fn test_registry_insert_remove() {
        let mut reg = ControlRegistry::new();
        let a = reg.insert(Control::slider("A", MidiMode::Cc, Rect::new(0, 0, 50, 200)));
        let b = reg.insert(Control::button("B", MidiMode::Note, false, Rect::new(60, 0, 50, 50)));

        assert_eq!(reg.len(), 2);
        assert!(reg.contains(a));

        reg.remove(a);
        assert_eq!(reg.len(), 1);
        assert!(!reg.contains(a));
        assert!(reg.contains(b));

        // Removal is idempotent
        assert!(reg.remove(a).is_none());
    }

    #[test]
    fn test_duplicate_clears_number() {
        let mut reg = ControlRegistry::new();
        let id = reg.insert(Control::slider("A", MidiMode::Cc, Rect::new(0, 0, 50, 200)));
        {
            let b = reg.get_mut(id).unwrap().binding_mut();
            b.channel = Some(4);
            b.number = Some(17);
            b.value = 90;
        }

        let copy = reg.duplicate(id, 60, 0).unwrap();
        let cb = reg.get(copy).unwrap().binding();
        assert_eq!(cb.channel, Some(4));
        assert_eq!(cb.number, None);
        assert_eq!(cb.value, 90);
        assert_eq!(reg.get(copy).unwrap().rect.x, 60);
    }
}
