//! Lower-left convex frontier of a point cloud.
//!
//! Trimming keeps exactly the points that can win some non-negative linear
//! weighting of the error dimensions. Those are the Pareto-optimal points on
//! the convex hull facing the origin. To get them from a plain convex hull,
//! the cloud is normalized to the unit box and closed off with auxiliary
//! points at the worst corner (`[2; d]`) and at that corner projected onto
//! each axis plane. Every hull vertex that is not auxiliary is then part of
//! the frontier.

use std::collections::{HashMap, HashSet};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum HullError {
    #[error("degenerate point set: {0}")]
    Degenerate(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Extracts the indices of the lower-left frontier of `points`
pub trait FrontierExtractor: Send + Sync {
    fn lower_frontier_indices(&self, points: &[Vec<f64>]) -> Result<Vec<usize>, HullError>;
}

/// Pareto prefilter followed by an incremental d-dimensional quickhull
#[derive(Debug, Clone, Copy)]
pub struct QuickHullFrontier {
    pub epsilon: f64,
}

impl Default for QuickHullFrontier {
    fn default() -> Self {
        Self { epsilon: 1e-10 }
    }
}

const WORST_CORNER: f64 = 2.0;

impl FrontierExtractor for QuickHullFrontier {
    fn lower_frontier_indices(&self, points: &[Vec<f64>]) -> Result<Vec<usize>, HullError> {
        let Some(first) = points.first() else {
            return Ok(Vec::new());
        };
        let dimensions = first.len();
        for point in points {
            if point.len() != dimensions {
                return Err(HullError::InvalidInput(format!(
                    "mixed dimensions {} and {}",
                    dimensions,
                    point.len()
                )));
            }
            if point.iter().any(|c| !c.is_finite()) {
                return Err(HullError::InvalidInput(format!(
                    "non-finite coordinate in {:?}",
                    point
                )));
            }
        }

        let front = pareto_front(points);
        let active = varying_dimensions(points, &front);
        if active.len() < 2 || front.len() < active.len() + 2 {
            let mut front = front;
            front.sort_unstable();
            return Ok(front);
        }

        let mut cloud = normalized(points, &front, &active);
        let k = active.len();
        cloud.push(vec![WORST_CORNER; k]);
        for axis in 0..k {
            let mut corner = vec![WORST_CORNER; k];
            corner[axis] = 0.0;
            cloud.push(corner);
        }

        let vertices = quickhull_vertices(&cloud, self.epsilon)?;
        let mut result: Vec<usize> = vertices
            .into_iter()
            .filter(|&v| v < front.len())
            .map(|v| front[v])
            .collect();
        result.sort_unstable();
        Ok(result)
    }
}

/// Indices of points not strictly dominated by any other point
pub fn pareto_front(points: &[Vec<f64>]) -> Vec<usize> {
    let mut order: Vec<(f64, usize)> = points
        .iter()
        .enumerate()
        .map(|(i, p)| (p.iter().sum(), i))
        .collect();
    // (sum, lexicographic) is a linear extension of dominance
    order.sort_by(|a, b| {
        a.0.total_cmp(&b.0).then_with(|| {
            points[a.1]
                .iter()
                .zip(&points[b.1])
                .map(|(x, y)| x.total_cmp(y))
                .find(|o| o.is_ne())
                .unwrap_or(std::cmp::Ordering::Equal)
        })
    });

    let mut accepted: Vec<usize> = Vec::new();
    for (_, candidate) in order {
        let p = &points[candidate];
        if !accepted.iter().any(|&a| dominates(&points[a], p)) {
            accepted.push(candidate);
        }
    }
    accepted
}

fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly = false;
    for (x, y) in a.iter().zip(b) {
        if x > y {
            return false;
        }
        if x < y {
            strictly = true;
        }
    }
    strictly
}

/// Dimensions whose value differs between at least two of `subset`
pub fn varying_dimensions(points: &[Vec<f64>], subset: &[usize]) -> Vec<usize> {
    let Some(&first) = subset.first() else {
        return Vec::new();
    };
    (0..points[first].len())
        .filter(|&d| {
            let reference = points[first][d];
            subset.iter().any(|&i| points[i][d] != reference)
        })
        .collect()
}

fn normalized(points: &[Vec<f64>], subset: &[usize], dims: &[usize]) -> Vec<Vec<f64>> {
    let bounds: Vec<(f64, f64)> = dims
        .iter()
        .map(|&d| {
            subset.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &i| {
                (lo.min(points[i][d]), hi.max(points[i][d]))
            })
        })
        .collect();
    subset
        .iter()
        .map(|&i| {
            dims.iter()
                .zip(&bounds)
                .map(|(&d, &(lo, hi))| (points[i][d] - lo) / (hi - lo))
                .collect()
        })
        .collect()
}

struct Facet {
    vertices: Vec<usize>,
    normal: Vec<f64>,
    offset: f64,
    outside: Vec<usize>,
    alive: bool,
}

impl Facet {
    fn distance(&self, point: &[f64]) -> f64 {
        dot(&self.normal, point) - self.offset
    }
}

/// Vertex indices of the convex hull of `points` (full dimensional)
pub fn quickhull_vertices(points: &[Vec<f64>], epsilon: f64) -> Result<Vec<usize>, HullError> {
    let dimensions = points.first().map_or(0, Vec::len);
    if dimensions < 2 {
        return Err(HullError::InvalidInput(format!(
            "hull needs at least 2 dimensions, got {}",
            dimensions
        )));
    }
    if points.len() <= dimensions {
        return Err(HullError::Degenerate(format!(
            "{} points cannot span {} dimensions",
            points.len(),
            dimensions
        )));
    }

    let simplex = initial_simplex(points, epsilon)?;
    let interior: Vec<f64> = (0..dimensions)
        .map(|d| simplex.iter().map(|&i| points[i][d]).sum::<f64>() / simplex.len() as f64)
        .collect();

    let mut facets: Vec<Facet> = Vec::new();
    for skip in 0..simplex.len() {
        let vertices: Vec<usize> = simplex
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != skip)
            .map(|(_, &v)| v)
            .collect();
        facets.push(make_facet(points, vertices, &interior)?);
    }

    let in_simplex: HashSet<usize> = simplex.iter().copied().collect();
    let remaining: Vec<usize> = (0..points.len()).filter(|i| !in_simplex.contains(i)).collect();
    let all_facets: Vec<usize> = (0..facets.len()).collect();
    assign_outside(points, &mut facets, &all_facets, remaining, epsilon);

    let max_iterations = points.len() + 1;
    let mut iterations = 0;
    while let Some(current) = facets.iter().position(|f| f.alive && !f.outside.is_empty()) {
        iterations += 1;
        if iterations > max_iterations {
            return Err(HullError::Degenerate(
                "hull construction did not converge".to_string(),
            ));
        }

        let eye = farthest_outside(points, &facets[current]);
        let eye_point = &points[eye];
        let visible: Vec<usize> = facets
            .iter()
            .enumerate()
            .filter(|(_, f)| f.alive && f.distance(eye_point) > epsilon)
            .map(|(i, _)| i)
            .collect();

        let mut ridge_count: HashMap<Vec<usize>, usize> = HashMap::new();
        let mut orphans: Vec<usize> = Vec::new();
        for &index in &visible {
            let facet = &mut facets[index];
            facet.alive = false;
            orphans.extend(facet.outside.drain(..).filter(|&p| p != eye));
            for skip in 0..facet.vertices.len() {
                let mut ridge: Vec<usize> = facet
                    .vertices
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != skip)
                    .map(|(_, &v)| v)
                    .collect();
                ridge.sort_unstable();
                *ridge_count.entry(ridge).or_insert(0) += 1;
            }
        }

        let mut created = Vec::new();
        for (ridge, count) in ridge_count {
            if count != 1 {
                continue;
            }
            let mut vertices = ridge;
            vertices.push(eye);
            facets.push(make_facet(points, vertices, &interior)?);
            created.push(facets.len() - 1);
        }
        assign_outside(points, &mut facets, &created, orphans, epsilon);
    }

    let mut vertices: Vec<usize> = facets
        .iter()
        .filter(|f| f.alive)
        .flat_map(|f| f.vertices.iter().copied())
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    vertices.sort_unstable();
    Ok(vertices)
}

fn farthest_outside(points: &[Vec<f64>], facet: &Facet) -> usize {
    let mut best = facet.outside[0];
    let mut best_distance = f64::NEG_INFINITY;
    for &p in &facet.outside {
        let distance = facet.distance(&points[p]);
        if distance > best_distance {
            best = p;
            best_distance = distance;
        }
    }
    best
}

fn assign_outside(
    points: &[Vec<f64>],
    facets: &mut [Facet],
    candidates: &[usize],
    unassigned: Vec<usize>,
    epsilon: f64,
) {
    for p in unassigned {
        let mut best: Option<(usize, f64)> = None;
        for &f in candidates {
            let distance = facets[f].distance(&points[p]);
            if distance > epsilon && best.map_or(true, |(_, d)| distance > d) {
                best = Some((f, distance));
            }
        }
        if let Some((f, _)) = best {
            facets[f].outside.push(p);
        }
    }
}

/// d + 1 affinely independent points, each as far as possible from the
/// span of the previous ones
fn initial_simplex(points: &[Vec<f64>], epsilon: f64) -> Result<Vec<usize>, HullError> {
    let dimensions = points[0].len();
    let first = (0..points.len())
        .min_by(|&a, &b| points[a][0].total_cmp(&points[b][0]))
        .unwrap_or(0);
    let origin = &points[first];
    let mut simplex = vec![first];
    let mut basis: Vec<Vec<f64>> = Vec::new();

    while simplex.len() <= dimensions {
        let mut best: Option<(usize, f64, Vec<f64>)> = None;
        for (i, point) in points.iter().enumerate() {
            let mut residual: Vec<f64> = point.iter().zip(origin).map(|(p, o)| p - o).collect();
            for axis in &basis {
                let projection = dot(&residual, axis);
                for (r, a) in residual.iter_mut().zip(axis) {
                    *r -= projection * a;
                }
            }
            let distance = dot(&residual, &residual).sqrt();
            if best.as_ref().map_or(true, |(_, d, _)| distance > *d) {
                best = Some((i, distance, residual));
            }
        }
        match best {
            Some((index, distance, residual)) if distance > epsilon => {
                basis.push(residual.iter().map(|r| r / distance).collect());
                simplex.push(index);
            }
            _ => {
                return Err(HullError::Degenerate(format!(
                    "points span only {} of {} dimensions",
                    basis.len(),
                    dimensions
                )))
            }
        }
    }
    Ok(simplex)
}

fn make_facet(points: &[Vec<f64>], vertices: Vec<usize>, interior: &[f64]) -> Result<Facet, HullError> {
    let dimensions = interior.len();
    let base = &points[vertices[0]];
    let edges: Vec<Vec<f64>> = vertices[1..]
        .iter()
        .map(|&v| points[v].iter().zip(base).map(|(p, b)| p - b).collect())
        .collect();

    // generalized cross product of the d - 1 edge vectors
    let mut normal: Vec<f64> = (0..dimensions)
        .map(|column| {
            let minor: Vec<Vec<f64>> = edges
                .iter()
                .map(|row| {
                    row.iter()
                        .enumerate()
                        .filter(|(c, _)| *c != column)
                        .map(|(_, v)| *v)
                        .collect()
                })
                .collect();
            let sign = if column % 2 == 0 { 1.0 } else { -1.0 };
            sign * determinant(minor)
        })
        .collect();

    let length = dot(&normal, &normal).sqrt();
    if !length.is_finite() || length <= f64::EPSILON {
        return Err(HullError::Degenerate(format!(
            "flat facet through {:?}",
            vertices
        )));
    }
    for n in normal.iter_mut() {
        *n /= length;
    }
    let mut offset = dot(&normal, base);
    if dot(&normal, interior) - offset > 0.0 {
        for n in normal.iter_mut() {
            *n = -*n;
        }
        offset = -offset;
    }
    Ok(Facet {
        vertices,
        normal,
        offset,
        outside: Vec::new(),
        alive: true,
    })
}

/// Gaussian elimination with partial pivoting
fn determinant(mut matrix: Vec<Vec<f64>>) -> f64 {
    let n = matrix.len();
    if n == 0 {
        return 1.0;
    }
    let mut det = 1.0;
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&a, &b| matrix[a][col].abs().total_cmp(&matrix[b][col].abs()))
            .unwrap_or(col);
        if matrix[pivot][col] == 0.0 {
            return 0.0;
        }
        if pivot != col {
            matrix.swap(pivot, col);
            det = -det;
        }
        det *= matrix[col][col];
        for row in (col + 1)..n {
            let factor = matrix[row][col] / matrix[col][col];
            for k in col..n {
                matrix[row][k] -= factor * matrix[col][k];
            }
        }
    }
    det
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_square_hull() {
        let points = vec![
            vec![0.0, 0.0],
            vec![1.0, 0.0],
            vec![0.0, 1.0],
            vec![1.0, 1.0],
            vec![0.5, 0.5],
            vec![0.2, 0.7],
        ];
        assert_eq!(quickhull_vertices(&points, 1e-10).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_octahedron_hull_ignores_interior() {
        let points = vec![
            vec![-1.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, -1.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.0, 0.0, -1.0],
            vec![0.0, 0.0, 1.0],
            vec![0.1, 0.2, -0.1],
            vec![0.0, 0.0, 0.0],
        ];
        let vertices = quickhull_vertices(&points, 1e-10).unwrap();
        assert_eq!(vertices, (0..6).collect::<Vec<_>>());
    }

    #[test]
    fn test_flat_input_is_degenerate() {
        let points = vec![
            vec![0.0, 0.0, 0.0],
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![1.0, 1.0, 0.0],
        ];
        assert!(matches!(
            quickhull_vertices(&points, 1e-10),
            Err(HullError::Degenerate(_))
        ));
    }

    #[test]
    fn test_pareto_front() {
        let points = vec![
            vec![1.0, 1.0],
            vec![0.0, 2.0],
            vec![2.0, 2.0],
            vec![2.0, 0.0],
            vec![1.0, 1.0],
        ];
        let mut front = pareto_front(&points);
        front.sort_unstable();
        assert_eq!(front, vec![0, 1, 3, 4]);
    }

    #[test]
    fn test_frontier_skips_concave_points() {
        // (0.6, 0.6) is Pareto optimal but never wins a linear weighting
        let points = vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.6, 0.6],
            vec![0.2, 0.75],
            vec![0.9, 0.9],
        ];
        let frontier = QuickHullFrontier::default()
            .lower_frontier_indices(&points)
            .unwrap();
        assert_eq!(frontier, vec![0, 1, 3]);
    }

    #[test]
    fn test_small_front_returned_directly() {
        let points = vec![vec![0.0, 0.0], vec![1.0, 1.0], vec![2.0, 0.5]];
        let frontier = QuickHullFrontier::default()
            .lower_frontier_indices(&points)
            .unwrap();
        assert_eq!(frontier, vec![0]);
    }

    #[test]
    fn test_rejects_non_finite() {
        let points = vec![vec![0.0, f64::NAN], vec![1.0, 1.0]];
        assert!(matches!(
            QuickHullFrontier::default().lower_frontier_indices(&points),
            Err(HullError::InvalidInput(_))
        ));
    }
}
