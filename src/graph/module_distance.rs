use super::CouplingGraph;
use crate::core::module_distance;

pub const MODULE_DISTANCE_VIEW: &str = "module_distance";

/// Must stay above one. Lower values keep coupling high across larger
/// distances, higher values make it decay faster.
const DECAY_BASE: f64 = 1.1;

/// Coupling that decays with the distance of two elements in the module tree.
/// Defined for every pair, so it never restricts the node universe.
#[derive(Debug, Clone, Default)]
pub struct ModuleDistanceCouplingGraph;

impl ModuleDistanceCouplingGraph {
    pub fn new() -> Self {
        Self
    }
}

impl CouplingGraph for ModuleDistanceCouplingGraph {
    fn name(&self) -> &str {
        MODULE_DISTANCE_VIEW
    }

    fn support(&self, _node: &str) -> f64 {
        1.0
    }

    fn coupling(&self, a: &str, b: &str) -> f64 {
        let distance = module_distance(a, b) as i32;
        DECAY_BASE.powi(-distance)
    }
}
