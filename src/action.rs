use serde::{Deserialize, Serialize};

use crate::error::EnvError;

// =============================================================================
// Controller Buttons
// =============================================================================

/// NES controller one state, one bit per button.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Buttons(pub u8);

impl Buttons {
    pub const NOOP: Buttons = Buttons(0);
    pub const A: Buttons = Buttons(0b0000_0001);
    pub const B: Buttons = Buttons(0b0000_0010);
    pub const SELECT: Buttons = Buttons(0b0000_0100);
    pub const START: Buttons = Buttons(0b0000_1000);
    pub const UP: Buttons = Buttons(0b0001_0000);
    pub const DOWN: Buttons = Buttons(0b0010_0000);
    pub const LEFT: Buttons = Buttons(0b0100_0000);
    pub const RIGHT: Buttons = Buttons(0b1000_0000);

    pub const ALL: [(&'static str, Buttons); 8] = [
        ("right", Buttons::RIGHT),
        ("left", Buttons::LEFT),
        ("down", Buttons::DOWN),
        ("up", Buttons::UP),
        ("start", Buttons::START),
        ("select", Buttons::SELECT),
        ("B", Buttons::B),
        ("A", Buttons::A),
    ];

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: Buttons) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn from_name(name: &str) -> Option<Buttons> {
        if name.eq_ignore_ascii_case("noop") {
            return Some(Buttons::NOOP);
        }
        Self::ALL
            .iter()
            .find(|(n, _)| *n == name || (n.len() > 1 && n.eq_ignore_ascii_case(name)))
            .map(|&(_, b)| b)
    }

    pub fn names(self) -> Vec<&'static str> {
        if self.is_empty() {
            return vec!["NOOP"];
        }
        Self::ALL
            .iter()
            .filter(|&&(_, b)| self.contains(b))
            .map(|&(n, _)| n)
            .collect()
    }
}

impl std::ops::BitOr for Buttons {
    type Output = Buttons;

    fn bitor(self, rhs: Buttons) -> Buttons {
        Buttons(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for Buttons {
    fn bitor_assign(&mut self, rhs: Buttons) {
        self.0 |= rhs.0;
    }
}

// =============================================================================
// Action Space
// =============================================================================

/// Which action table an environment exposes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionSet {
    RightOnly,
    #[default]
    SimpleMovement,
    ComplexMovement,
    /// Button-name combinations, e.g. `[["NOOP"], ["right", "A"]]`.
    Custom(Vec<Vec<String>>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionEntry {
    pub name: String,
    pub buttons: Buttons,
}

/// Ordered discrete action space. The index of an entry is its action value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionTable {
    entries: Vec<ActionEntry>,
}

const RIGHT_ONLY: &[&[&str]] = &[
    &["NOOP"],
    &["right"],
    &["right", "A"],
    &["right", "B"],
    &["right", "A", "B"],
];

const SIMPLE_MOVEMENT: &[&[&str]] = &[
    &["NOOP"],
    &["right"],
    &["right", "A"],
    &["right", "B"],
    &["right", "A", "B"],
    &["A"],
    &["left"],
];

const COMPLEX_MOVEMENT: &[&[&str]] = &[
    &["NOOP"],
    &["right"],
    &["right", "A"],
    &["right", "B"],
    &["right", "A", "B"],
    &["A"],
    &["left"],
    &["left", "A"],
    &["left", "B"],
    &["left", "A", "B"],
    &["down"],
    &["up"],
];

impl ActionTable {
    pub fn right_only() -> Self {
        Self::from_static(RIGHT_ONLY)
    }

    pub fn simple_movement() -> Self {
        Self::from_static(SIMPLE_MOVEMENT)
    }

    pub fn complex_movement() -> Self {
        Self::from_static(COMPLEX_MOVEMENT)
    }

    fn from_static(combos: &[&[&str]]) -> Self {
        let entries = combos
            .iter()
            .map(|combo| {
                let buttons = combo
                    .iter()
                    .filter_map(|name| Buttons::from_name(name))
                    .fold(Buttons::NOOP, |acc, b| acc | b);
                ActionEntry {
                    name: combo.join("+"),
                    buttons,
                }
            })
            .collect();
        Self { entries }
    }

    pub fn from_names<S: AsRef<str>>(combos: &[Vec<S>]) -> Result<Self, EnvError> {
        if combos.is_empty() {
            return Err(EnvError::config("action table must not be empty"));
        }
        let mut entries = Vec::with_capacity(combos.len());
        for combo in combos {
            let mut buttons = Buttons::NOOP;
            let mut names = Vec::with_capacity(combo.len());
            for name in combo {
                let name = name.as_ref();
                let button = Buttons::from_name(name)
                    .ok_or_else(|| EnvError::config(format!("unknown button name {name:?}")))?;
                buttons |= button;
                names.push(name);
            }
            if names.is_empty() {
                names.push("NOOP");
            }
            entries.push(ActionEntry {
                name: names.join("+"),
                buttons,
            });
        }
        Ok(Self { entries })
    }

    pub fn from_set(set: &ActionSet) -> Result<Self, EnvError> {
        match set {
            ActionSet::RightOnly => Ok(Self::right_only()),
            ActionSet::SimpleMovement => Ok(Self::simple_movement()),
            ActionSet::ComplexMovement => Ok(Self::complex_movement()),
            ActionSet::Custom(combos) => Self::from_names(combos),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[ActionEntry] {
        &self.entries
    }

    pub fn to_bitmask(&self, index: usize) -> Result<Buttons, EnvError> {
        self.entries
            .get(index)
            .map(|e| e.buttons)
            .ok_or(EnvError::InvalidAction {
                index,
                len: self.entries.len(),
            })
    }

    pub fn name(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|e| e.name.as_str())
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.name == name)
    }
}
