//! Target coupling profiles.
//!
//! A pattern holds one slot per view: either the coupling value a pair
//! should show in that view, or a wildcard for "don't care". The pattern
//! `[1, 0, *]` over the views `[references, evolutionary, linguistic]`
//! asks for elements that reference each other heavily but never change
//! together, whatever their vocabulary.

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Default view ordering of [`taxonomy`]
pub const TAXONOMY_VIEWS: [&str; 4] = ["references", "evolutionary", "linguistic", "module_distance"];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SlotRepr", into = "SlotRepr")]
pub enum Slot {
    Fixed(f64),
    Wildcard,
}

impl Slot {
    pub fn value(&self) -> Option<f64> {
        match self {
            Slot::Fixed(v) => Some(*v),
            Slot::Wildcard => None,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Slot::Wildcard)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Fixed(v) => write!(f, "{}", v),
            Slot::Wildcard => f.write_str("*"),
        }
    }
}

impl FromStr for Slot {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "*" | "_" | "" => Ok(Slot::Wildcard),
            other => other
                .parse::<f64>()
                .map(Slot::Fixed)
                .map_err(|_| Error::validation(format!("invalid pattern slot '{}'", other))),
        }
    }
}

/// Wire form of a slot: a number, `null`, or the string `"*"`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum SlotRepr {
    Value(Option<f64>),
    Marker(String),
}

impl TryFrom<SlotRepr> for Slot {
    type Error = Error;

    fn try_from(repr: SlotRepr) -> Result<Self> {
        match repr {
            SlotRepr::Value(Some(v)) => Ok(Slot::Fixed(v)),
            SlotRepr::Value(None) => Ok(Slot::Wildcard),
            SlotRepr::Marker(s) => s.parse(),
        }
    }
}

impl From<Slot> for SlotRepr {
    fn from(slot: Slot) -> Self {
        SlotRepr::Value(slot.value())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    slots: Vec<Slot>,
    #[serde(default)]
    label: String,
}

impl Pattern {
    /// Build a pattern, rejecting fixed values outside `[0, 1]`
    pub fn new(slots: Vec<Slot>, label: impl Into<String>) -> Result<Self> {
        let pattern = Self {
            slots,
            label: label.into(),
        };
        pattern.validate()?;
        Ok(pattern)
    }

    /// Shorthand for tests and defaults: `None` is a wildcard
    pub fn from_values(values: &[Option<f64>], label: impl Into<String>) -> Result<Self> {
        let slots = values
            .iter()
            .map(|v| v.map_or(Slot::Wildcard, Slot::Fixed))
            .collect();
        Self::new(slots, label)
    }

    pub fn validate(&self) -> Result<()> {
        if self.slots.is_empty() {
            return Err(Error::validation(format!(
                "pattern '{}' has no slots",
                self.label
            )));
        }
        for slot in &self.slots {
            if let Slot::Fixed(v) = slot {
                if !v.is_finite() || !(0.0..=1.0).contains(v) {
                    return Err(Error::validation(format!(
                        "pattern '{}' has slot value {} outside [0, 1]",
                        self.label, v
                    )));
                }
            }
        }
        Ok(())
    }

    /// Every pattern needs one slot per analyzed view
    pub fn check_arity(&self, view_count: usize) -> Result<()> {
        if self.slots.len() < view_count {
            return Err(Error::validation(format!(
                "pattern '{}' has {} slots but {} views are analyzed",
                self.describe(),
                self.slots.len(),
                view_count
            )));
        }
        Ok(())
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// (view index, target value) for every non-wildcard slot
    pub fn fixed_slots(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.value().map(|v| (i, v)))
    }

    pub fn fixed_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.is_wildcard()).count()
    }

    /// Error dimensions plus the negated support dimension
    pub fn dimensions(&self) -> usize {
        self.fixed_count() + 1
    }

    /// Keep only the first `view_count` slots
    pub fn truncated(&self, view_count: usize) -> Pattern {
        Pattern {
            slots: self.slots.iter().take(view_count).copied().collect(),
            label: self.label.clone(),
        }
    }

    /// Reorder slots so that slot `i` of the result is slot `order[i]` of self
    pub fn permuted(&self, order: &[usize]) -> Pattern {
        Pattern {
            slots: order.iter().map(|&i| self.slots[i]).collect(),
            label: self.label.clone(),
        }
    }

    /// Compact slot notation, e.g. `1,*,0.5`
    pub fn signature(&self) -> String {
        self.slots
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn describe(&self) -> String {
        if self.label.is_empty() {
            format!("[{}]", self.signature())
        } else {
            format!("[{}] {}", self.signature(), self.label)
        }
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Parses `1,*,0.5` or `1,*,0.5:Some label`
impl FromStr for Pattern {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (slot_part, label) = match s.split_once(':') {
            Some((slots, label)) => (slots, label.trim()),
            None => (s, ""),
        };
        let slots = slot_part
            .split(',')
            .map(str::parse)
            .collect::<Result<Vec<Slot>>>()?;
        Pattern::new(slots, label)
    }
}

/// Catalogue of architectural smells over [`TAXONOMY_VIEWS`]
pub fn taxonomy() -> Vec<Pattern> {
    const W: Option<f64> = None;
    let entries: [([Option<f64>; 4], &str); 7] = [
        (
            [Some(0.0), W, Some(0.0), Some(1.0)],
            "Mixed Concerns / Low Cohesion",
        ),
        (
            [Some(0.0), W, Some(1.0), Some(0.0)],
            "Independent Code Duplication",
        ),
        (
            [Some(0.0), W, Some(1.0), Some(1.0)],
            "Parallel Structures",
        ),
        (
            [Some(0.0), Some(1.0), Some(0.0), Some(0.0)],
            "Hidden Relation",
        ),
        (
            [Some(1.0), Some(0.0), Some(1.0), W],
            "Direct Code Clones",
        ),
        (
            [Some(1.0), Some(1.0), Some(0.0), Some(1.0)],
            "Inconsistent Language",
        ),
        (
            [Some(1.0), Some(1.0), W, Some(0.0)],
            "Cross-Cutting Concerns",
        ),
    ];
    entries
        .iter()
        .map(|(values, label)| Pattern {
            slots: values
                .iter()
                .map(|v| v.map_or(Slot::Wildcard, Slot::Fixed))
                .collect(),
            label: (*label).to_string(),
        })
        .collect()
}
