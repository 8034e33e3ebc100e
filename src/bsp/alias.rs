//! Co-linearity classes over linedefs (`spec.md` §4.4.2). Two linedefs
//! whose infinite lines coincide share an alias id; once a partition
//! candidate from one alias has been tried or ruled out at a subtree,
//! every other linedef sharing that alias is skipped there.

use crate::level::Level;
use crate::level::records::Linedef;
use glam::DVec2;

fn angle_mod_180(dx: f64, dy: f64) -> f64 {
    let mut a = dy.atan2(dx).to_degrees();
    if a < 0.0 {
        a += 180.0;
    }
    if a >= 180.0 {
        a -= 180.0;
    }
    a
}

fn co_linear(level: &Level, a: &Linedef, b: &Linedef) -> bool {
    let av1 = level.vertices[a.v1 as usize];
    let av2 = level.vertices[a.v2 as usize];
    let bv1 = level.vertices[b.v1 as usize];
    let bv2 = level.vertices[b.v2 as usize];

    let adx = (av2.x - av1.x) as f64;
    let ady = (av2.y - av1.y) as f64;
    let bdx = (bv2.x - bv1.x) as f64;
    let bdy = (bv2.y - bv1.y) as f64;

    if (angle_mod_180(adx, ady) - angle_mod_180(bdx, bdy)).abs() > 1e-6 {
        return false;
    }

    if adx == 0.0 {
        return bv1.x == av1.x;
    }
    if ady == 0.0 {
        return bv1.y == av1.y;
    }

    let origin = DVec2::new(av1.x as f64, av1.y as f64);
    let dir = DVec2::new(adx, ady);
    matches!(
        crate::geom::orient(origin, dir, DVec2::new(bv1.x as f64, bv1.y as f64)),
        crate::geom::Orientation::On
    )
}

/// Assign an alias id to every linedef; co-linear linedefs share a value.
/// Linedefs with no seg (filtered earlier) still get an id so indices
/// line up with `level.linedefs`.
pub fn compute_aliases(level: &Level) -> Vec<i32> {
    let n = level.linedefs.len();
    let mut alias = vec![-1i32; n];
    let mut next_alias = 0i32;

    for i in 0..n {
        if alias[i] != -1 {
            continue;
        }
        alias[i] = next_alias;
        for j in (i + 1)..n {
            if alias[j] != -1 {
                continue;
            }
            if co_linear(level, &level.linedefs[i], &level.linedefs[j]) {
                alias[j] = next_alias;
            }
        }
        next_alias += 1;
    }
    alias
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::tests::square_room;

    #[test]
    fn square_room_walls_have_distinct_aliases() {
        let lvl = square_room();
        let aliases = compute_aliases(&lvl);
        assert_eq!(aliases.len(), 4);
        let mut sorted = aliases.clone();
        sorted.sort();
        sorted.dedup();
        assert_eq!(sorted.len(), 4); // no two walls of a square share a line
    }

    #[test]
    fn collinear_extension_shares_alias() {
        let mut lvl = square_room();
        // extend the bottom wall with a second collinear segment.
        lvl.vertices.push(crate::level::records::Vertex { x: 2048, y: 0 });
        lvl.linedefs.push(crate::level::records::Linedef {
            v1: 1,
            v2: 4,
            flags: 1,
            kind: crate::level::records::LinedefKind::Classic { special: 0, tag: 0 },
            right: Some(0),
            left: None,
        });
        let aliases = compute_aliases(&lvl);
        assert_eq!(aliases[0], aliases[4]);
    }
}
