//! Shared floating-point geometry primitives. Every orientation test in
//! the BSP and reject builders funnels through [`orient`] so the zero
//! epsilon lives in exactly one place.

use glam::DVec2;

/// Orientation tolerance: a signed distance below this magnitude is
/// treated as "on the line".
pub const EPSILON: f64 = 1e-4;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Orientation {
    Left,
    Right,
    On,
}

/// Axis-aligned bounding box in the `[maxY, minY, minX, maxX]` layout
/// NODES lumps store on disk.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BBox {
    pub max_y: i16,
    pub min_y: i16,
    pub min_x: i16,
    pub max_x: i16,
}

impl BBox {
    pub fn from_points(points: impl IntoIterator<Item = (i16, i16)>) -> Self {
        let mut it = points.into_iter();
        let (x0, y0) = it.next().expect("bbox needs at least one point");
        let mut bb = BBox {
            max_y: y0,
            min_y: y0,
            min_x: x0,
            max_x: x0,
        };
        for (x, y) in it {
            bb.min_x = bb.min_x.min(x);
            bb.max_x = bb.max_x.max(x);
            bb.min_y = bb.min_y.min(y);
            bb.max_y = bb.max_y.max(y);
        }
        bb
    }

    pub fn union(self, other: BBox) -> BBox {
        BBox {
            max_y: self.max_y.max(other.max_y),
            min_y: self.min_y.min(other.min_y),
            min_x: self.min_x.min(other.min_x),
            max_x: self.max_x.max(other.max_x),
        }
    }
}

/// Signed-distance orientation of `p` relative to the line through
/// `origin` with direction `dir`: positive is right of travel, matching
/// the source's `DX·(p.y−Y) − DY·(p.x−X)` convention.
pub fn signed_distance(origin: DVec2, dir: DVec2, p: DVec2) -> f64 {
    dir.x * (p.y - origin.y) - dir.y * (p.x - origin.x)
}

/// Zero-snapped orientation test (`spec.md` §4.2).
pub fn orient(origin: DVec2, dir: DVec2, p: DVec2) -> Orientation {
    let d = signed_distance(origin, dir, p);
    if d.abs() < EPSILON {
        Orientation::On
    } else if d > 0.0 {
        Orientation::Right
    } else {
        Orientation::Left
    }
}

/// Round to the nearest integer, ties to even — the `lrint` equivalent
/// used at every integer-snap site.
pub fn lrint(v: f64) -> i32 {
    v.round_ties_even() as i32
}

/// Solve the 2x2 intersection of two lines given as origin + direction.
/// Returns the intersection point, or `None` if the lines are parallel
/// (cross product of the directions is within [`EPSILON`] of zero).
pub fn intersect_lines(o1: DVec2, d1: DVec2, o2: DVec2, d2: DVec2) -> Option<DVec2> {
    let denom = d1.x * d2.y - d1.y * d2.x;
    if denom.abs() < EPSILON {
        return None;
    }
    let diff = o2 - o1;
    let t = (diff.x * d2.y - diff.y * d2.x) / denom;
    Some(o1 + d1 * t)
}

/// Binary angle measure: 0x4000 = 90 degrees, full circle wraps at
/// 0x10000. Computed from a direction vector via `atan2`.
pub fn bam_angle(dir: DVec2) -> u16 {
    let radians = dir.y.atan2(dir.x);
    let turns = radians / std::f64::consts::TAU;
    let turns = if turns < 0.0 { turns + 1.0 } else { turns };
    (turns * 65536.0).round_ties_even() as u32 as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orient_sees_both_sides_and_on() {
        let origin = DVec2::new(0.0, 0.0);
        let dir = DVec2::new(1.0, 0.0);
        assert_eq!(orient(origin, dir, DVec2::new(5.0, 1.0)), Orientation::Left);
        assert_eq!(
            orient(origin, dir, DVec2::new(5.0, -1.0)),
            Orientation::Right
        );
        assert_eq!(orient(origin, dir, DVec2::new(5.0, 0.0)), Orientation::On);
    }

    #[test]
    fn lrint_ties_to_even() {
        assert_eq!(lrint(0.5), 0);
        assert_eq!(lrint(1.5), 2);
        assert_eq!(lrint(2.5), 2);
        assert_eq!(lrint(-0.5), 0);
    }

    #[test]
    fn intersect_crossing_lines() {
        let p = intersect_lines(
            DVec2::new(0.0, 0.0),
            DVec2::new(1.0, 0.0),
            DVec2::new(5.0, -5.0),
            DVec2::new(0.0, 1.0),
        )
        .unwrap();
        assert!((p.x - 5.0).abs() < 1e-9);
        assert!(p.y.abs() < 1e-9);
    }

    #[test]
    fn intersect_parallel_lines_is_none() {
        assert!(
            intersect_lines(
                DVec2::new(0.0, 0.0),
                DVec2::new(1.0, 0.0),
                DVec2::new(0.0, 5.0),
                DVec2::new(2.0, 0.0),
            )
            .is_none()
        );
    }

    #[test]
    fn bam_angle_cardinal_directions() {
        assert_eq!(bam_angle(DVec2::new(1.0, 0.0)), 0);
        assert_eq!(bam_angle(DVec2::new(0.0, 1.0)), 0x4000);
        assert_eq!(bam_angle(DVec2::new(-1.0, 0.0)), 0x8000);
    }
}
