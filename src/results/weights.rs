//! Weight vectors for ranking result sets.

use crate::core::Pattern;

/// Every weight vector of length `dimensions` whose entries are multiples of
/// `1 / precision` and sum to one.
pub fn generate_one_distributions(dimensions: usize, precision: usize) -> Vec<Vec<f64>> {
    if dimensions == 0 {
        return Vec::new();
    }
    let precision = precision.max(1);
    let mut result = Vec::new();
    let mut current = vec![0usize; dimensions];
    fill(&mut current, 0, precision, precision, &mut result);
    result
}

fn fill(
    current: &mut Vec<usize>,
    position: usize,
    remaining: usize,
    precision: usize,
    out: &mut Vec<Vec<f64>>,
) {
    if position + 1 == current.len() {
        current[position] = remaining;
        out.push(
            current
                .iter()
                .map(|&steps| steps as f64 / precision as f64)
                .collect(),
        );
        return;
    }
    for steps in (0..=remaining).rev() {
        current[position] = steps;
        fill(current, position + 1, remaining - steps, precision, out);
    }
}

/// Equal weight for each fixed slot of `pattern` and for support
pub fn sort_weights_for(pattern: &Pattern) -> Vec<f64> {
    let dimensions = pattern.dimensions();
    vec![1.0 / dimensions as f64; dimensions]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_grid() {
        let grid = generate_one_distributions(3, 4);
        // C(4 + 2, 2)
        assert_eq!(grid.len(), 15);
        assert!(grid.contains(&vec![1.0, 0.0, 0.0]));
        assert!(grid.contains(&vec![0.25, 0.25, 0.5]));
        for weights in &grid {
            assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-12);
        }
    }

    #[test]
    fn test_distribution_edge_cases() {
        assert!(generate_one_distributions(0, 5).is_empty());
        assert_eq!(generate_one_distributions(1, 5), vec![vec![1.0]]);
    }

    #[test]
    fn test_sort_weights_for_pattern() {
        let pattern: crate::core::Pattern = "1,*,0".parse().unwrap();
        assert_eq!(sort_weights_for(&pattern), vec![1.0 / 3.0; 3]);
    }
}
