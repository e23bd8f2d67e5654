//! Closed-form trilateration
//!
//! Subtracting the circle equation of a reference anchor r from that of
//! anchor i removes the quadratic terms:
//!
//! ```text
//! 2(xr − xi)·x + 2(yr − yi)·y = di² − dr² − xi² + xr² − yi² + yr²
//! ```
//!
//! With three or more ranges this is an over- or exactly-determined linear
//! system in (x, y), solved in the least-squares sense through the normal
//! equations AᵀA·p = Aᵀb. The reference is the last anchor with a range.
//!
//! The result only (re)seeds the EKF; it is never blended into the estimate.

use crate::config::AnchorSet;
use crate::constants::{MIN_ANCHORS_FOR_UPDATE, NORMAL_MATRIX_DET_EPSILON};
use crate::errors::{TrackingError, TrackingResult};
use crate::linalg::{matvec, multiply, solve, transpose, Matrix, SquareMatrix, Vector};

/// 2-D position in meters
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Position {
    /// X coordinate (m)
    pub x: f32,
    /// Y coordinate (m)
    pub y: f32,
}

/// Least-squares position from the anchors that have a range
///
/// `ranges[i]` belongs to `anchors[i]`; `None` marks an anchor without a
/// reading. Fails with [`TrackingError::InsufficientAnchors`] below
/// `min_anchors` (never below three) and with [`TrackingError::SingularMatrix`]
/// when the anchors in use are too close to collinear or the solution is
/// not finite.
///
/// ```rust
/// use uwbtrack_core::{trilaterate, AnchorSet};
///
/// let anchors = AnchorSet::default();
/// let ranges = anchors.ranges_from(0.85, 3.15).map(Some);
/// let p = trilaterate(&anchors, &ranges, 3).unwrap();
/// assert!((p.x - 0.85).abs() < 1e-3 && (p.y - 3.15).abs() < 1e-3);
/// ```
pub fn trilaterate<const N: usize>(
    anchors: &AnchorSet<N>,
    ranges: &[Option<f32>; N],
    min_anchors: usize,
) -> TrackingResult<Position> {
    let required = min_anchors.max(MIN_ANCHORS_FOR_UPDATE);
    let available = ranges.iter().filter(|r| r.is_some()).count();
    if available < required {
        return Err(TrackingError::InsufficientAnchors { required, available });
    }

    let (reference, d_ref) = match ranges.iter().enumerate().rev().find_map(|(i, r)| r.map(|d| (i, d))) {
        Some(found) => found,
        None => return Err(TrackingError::InsufficientAnchors { required, available }),
    };
    let xr = anchors[reference].x;
    let yr = anchors[reference].y;

    // One row per non-reference anchor; rows of unused anchors stay zero and
    // add nothing to the normal equations.
    let mut a: Matrix<N, 2> = [[0.0; 2]; N];
    let mut b: Vector<N> = [0.0; N];
    for (i, range) in ranges.iter().enumerate() {
        let di = match range {
            Some(d) if i != reference => *d,
            _ => continue,
        };
        let xi = anchors[i].x;
        let yi = anchors[i].y;
        a[i] = [2.0 * (xr - xi), 2.0 * (yr - yi)];
        b[i] = di * di - d_ref * d_ref - xi * xi + xr * xr - yi * yi + yr * yr;
    }

    let mut at: Matrix<2, N> = [[0.0; N]; 2];
    transpose(&a, &mut at);

    let mut ata: SquareMatrix<2> = [[0.0; 2]; 2];
    multiply(&at, &a, &mut ata);

    let mut atb: Vector<2> = [0.0; 2];
    matvec(&at, &b, &mut atb);

    let det = ata[0][0] * ata[1][1] - ata[0][1] * ata[1][0];
    if !(libm::fabsf(det) >= NORMAL_MATRIX_DET_EPSILON) {
        return Err(TrackingError::SingularMatrix);
    }

    let mut p: Vector<2> = [0.0; 2];
    solve(&ata, &atb, &mut p)?;
    // Squared ranges overflow long before f32 runs out
    if !(p[0].is_finite() && p[1].is_finite()) {
        return Err(TrackingError::SingularMatrix);
    }

    Ok(Position { x: p[0], y: p[1] })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TARGET: (f32, f32) = (0.85, 3.15);

    fn exact_ranges() -> [Option<f32>; 4] {
        AnchorSet::default().ranges_from(TARGET.0, TARGET.1).map(Some)
    }

    fn assert_near(p: Position, x: f32, y: f32, tol: f32) {
        assert!(
            (p.x - x).abs() < tol && (p.y - y).abs() < tol,
            "got ({}, {}), want ({}, {})",
            p.x,
            p.y,
            x,
            y
        );
    }

    #[test]
    fn all_four_anchors() {
        let p = trilaterate(&AnchorSet::default(), &exact_ranges(), 3).unwrap();
        assert_near(p, TARGET.0, TARGET.1, 1e-3);
    }

    #[test]
    fn every_three_anchor_subset() {
        let anchors = AnchorSet::default();
        for dropped in 0..4 {
            let mut ranges = exact_ranges();
            ranges[dropped] = None;
            let p = trilaterate(&anchors, &ranges, 3).unwrap();
            assert_near(p, TARGET.0, TARGET.1, 1e-3);
        }
    }

    #[test]
    fn off_center_point() {
        let anchors = AnchorSet::default();
        let ranges = anchors.ranges_from(1.2, 5.0).map(Some);
        let p = trilaterate(&anchors, &ranges, 3).unwrap();
        assert_near(p, 1.2, 5.0, 1e-3);
    }

    #[test]
    fn two_anchors_is_not_enough() {
        let ranges = [Some(3.0), None, Some(3.0), None];
        assert_eq!(
            trilaterate(&AnchorSet::default(), &ranges, 3),
            Err(TrackingError::InsufficientAnchors { required: 3, available: 2 })
        );
    }

    #[test]
    fn min_anchors_is_respected() {
        let mut ranges = exact_ranges();
        ranges[1] = None;
        assert!(matches!(
            trilaterate(&AnchorSet::default(), &ranges, 4),
            Err(TrackingError::InsufficientAnchors { required: 4, available: 3 })
        ));
    }

    #[test]
    fn collinear_anchors_are_singular() {
        let anchors = AnchorSet::from_coords([(0.0, 0.0), (1.0, 0.0), (2.0, 0.0)]);
        let ranges = anchors.ranges_from(1.0, 2.0).map(Some);
        assert_eq!(trilaterate(&anchors, &ranges, 3), Err(TrackingError::SingularMatrix));
    }

    #[test]
    fn overflowing_range_has_no_solution() {
        let anchors = AnchorSet::default();
        for faulty in 0..4 {
            let mut ranges = exact_ranges();
            ranges[faulty] = Some(3.0e19);
            assert_eq!(
                trilaterate(&anchors, &ranges, 3),
                Err(TrackingError::SingularMatrix),
                "range on anchor {}",
                faulty
            );
        }
    }

    #[test]
    fn noisy_ranges_stay_close() {
        let anchors = AnchorSet::default();
        let mut ranges = exact_ranges();
        let offsets = [0.03, -0.02, 0.01, -0.03];
        for (r, off) in ranges.iter_mut().zip(offsets) {
            *r = r.map(|d| d + off);
        }
        let p = trilaterate(&anchors, &ranges, 3).unwrap();
        assert_near(p, TARGET.0, TARGET.1, 0.15);
    }
}
