use crate::dimension::Dimension;
use crate::error::{GatingError, Result};
use crate::traits::{GateContainment, GateValidation};
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};

/// Polygon over two dimensions. Vertices are implicitly closed and may
/// describe non-convex or self-intersecting outlines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonGate {
    pub dimensions: [Dimension; 2],
    pub vertices: Vec<(f64, f64)>,
}

impl PolygonGate {
    pub fn new(x: Dimension, y: Dimension, vertices: Vec<(f64, f64)>) -> Result<Self> {
        let gate = Self {
            dimensions: [x, y],
            vertices,
        };
        gate.validate()?;
        Ok(gate)
    }
}

impl GateContainment for PolygonGate {
    fn contains_event(&self, columns: &[ArrayView1<f64>], index: usize) -> bool {
        point_in_polygon(columns[0][index], columns[1][index], &self.vertices)
    }
}

impl GateValidation for PolygonGate {
    fn validate(&self) -> Result<()> {
        if self.vertices.len() < 3 {
            return Err(GatingError::invalid_geometry(format!(
                "polygon needs at least 3 vertices, got {}",
                self.vertices.len()
            )));
        }
        if self
            .vertices
            .iter()
            .any(|(x, y)| !x.is_finite() || !y.is_finite())
        {
            return Err(GatingError::invalid_geometry(
                "polygon vertices must be finite",
            ));
        }
        Ok(())
    }
}

/// Point-in-polygon test.
///
/// Points on an edge or vertex are inside. Everything else uses even-odd ray
/// casting: a horizontal ray towards +x toggles membership at each edge whose
/// endpoints straddle the point's y (one endpoint strictly above, the other
/// at or below), so a ray passing exactly through a vertex is counted once.
pub fn point_in_polygon(x: f64, y: f64, polygon: &[(f64, f64)]) -> bool {
    if x.is_nan() || y.is_nan() {
        return false;
    }
    let n = polygon.len();
    let mut inside = false;

    for i in 0..n {
        let (x1, y1) = polygon[i];
        let (x2, y2) = polygon[(i + 1) % n];

        if on_segment(x, y, x1, y1, x2, y2) {
            return true;
        }
        if ((y1 > y) != (y2 > y)) && (x < (x2 - x1) * (y - y1) / (y2 - y1) + x1) {
            inside = !inside;
        }
    }

    inside
}

/// Distance from an edge, relative to the edge length, still counted as on it
const ON_EDGE_TOLERANCE: f64 = 1e-12;

fn on_segment(x: f64, y: f64, x1: f64, y1: f64, x2: f64, y2: f64) -> bool {
    let (dx, dy) = (x2 - x1, y2 - y1);
    let length_sq = dx * dx + dy * dy;
    // |cross| / length is the distance from the edge's line
    let cross = dx * (y - y1) - dy * (x - x1);
    if cross.abs() > ON_EDGE_TOLERANCE * length_sq {
        return false;
    }
    let slack = ON_EDGE_TOLERANCE * length_sq.sqrt();
    x >= x1.min(x2) - slack
        && x <= x1.max(x2) + slack
        && y >= y1.min(y2) - slack
        && y <= y1.max(y2) + slack
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square() -> Vec<(f64, f64)> {
        vec![(0.0, 0.0), (0.0, 10.0), (10.0, 10.0), (10.0, 0.0)]
    }

    #[test]
    fn test_square() {
        let sq = square();
        assert!(point_in_polygon(5.0, 5.0, &sq));
        assert!(!point_in_polygon(15.0, 5.0, &sq));
        assert!(!point_in_polygon(-5.0, 5.0, &sq));
        assert!(!point_in_polygon(5.0, 15.0, &sq));
    }

    #[test]
    fn test_boundary_is_inside() {
        let sq = square();
        // every edge and every vertex
        for (x, y) in [(0.0, 5.0), (10.0, 5.0), (5.0, 0.0), (5.0, 10.0)] {
            assert!(point_in_polygon(x, y, &sq), "edge point ({x}, {y})");
        }
        for &(x, y) in &sq {
            assert!(point_in_polygon(x, y, &sq), "vertex ({x}, {y})");
        }
    }

    #[test]
    fn test_diagonal_edge_points_are_inside() {
        let (a, b): ((f64, f64), (f64, f64)) = ((0.1, 0.2), (0.7, 1.3));
        let triangle = vec![a, b, (0.7, 0.2)];
        // unit normal pointing away from the third vertex
        let length = ((b.0 - a.0).powi(2) + (b.1 - a.1).powi(2)).sqrt();
        let normal = (-(b.1 - a.1) / length, (b.0 - a.0) / length);
        for i in 0..=50 {
            let t = i as f64 / 50.0;
            let (x, y) = (a.0 + t * (b.0 - a.0), a.1 + t * (b.1 - a.1));
            assert!(point_in_polygon(x, y, &triangle), "t = {t}");
            let (ox, oy) = (x + 1e-6 * normal.0, y + 1e-6 * normal.1);
            assert!(!point_in_polygon(ox, oy, &triangle), "outside at t = {t}");
        }
    }

    #[test]
    fn test_ray_through_vertex_counted_once() {
        // diamond: the ray from (0, 0) passes through the vertex at (5, 0)
        let diamond = vec![(0.0, -5.0), (5.0, 0.0), (0.0, 5.0), (-5.0, 0.0)];
        assert!(point_in_polygon(0.0, 0.0, &diamond));
        assert!(!point_in_polygon(-6.0, 0.0, &diamond));
    }

    #[test]
    fn test_concave() {
        // U shape opening upwards
        let u = vec![
            (0.0, 0.0),
            (9.0, 0.0),
            (9.0, 9.0),
            (6.0, 9.0),
            (6.0, 3.0),
            (3.0, 3.0),
            (3.0, 9.0),
            (0.0, 9.0),
        ];
        assert!(point_in_polygon(1.5, 6.0, &u));
        assert!(!point_in_polygon(4.5, 6.0, &u));
        assert!(point_in_polygon(4.5, 1.5, &u));
    }

    #[test]
    fn test_self_intersecting_bowtie() {
        let bowtie = vec![(0.0, 0.0), (10.0, 10.0), (10.0, 0.0), (0.0, 10.0)];
        assert!(point_in_polygon(2.0, 5.0, &bowtie));
        assert!(point_in_polygon(8.0, 5.0, &bowtie));
        assert!(!point_in_polygon(5.0, 8.0, &bowtie));
        assert!(!point_in_polygon(5.0, 2.0, &bowtie));
    }

    #[test]
    fn test_too_few_vertices() {
        let err =
            PolygonGate::new(Dimension::new("x"), Dimension::new("y"), vec![(0.0, 0.0), (1.0, 1.0)])
                .unwrap_err();
        assert!(matches!(err, GatingError::InvalidGateGeometry { .. }));
    }
}
