pub mod element;
pub mod pattern;

pub use element::{is_ancestor, module_distance, parent_path, ElementId, ElementKind};
pub use pattern::{taxonomy, Pattern, Slot, TAXONOMY_VIEWS};
