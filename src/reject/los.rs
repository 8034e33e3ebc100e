//! Line-pair line-of-sight test (`spec.md` §4.5.3).
//!
//! `src` and `tgt` are canonicalized so `tgt` lies to one side of
//! `src`'s line with an opposite facing (step 2); candidate solid lines
//! are gathered from the blockmap along the quadrilateral's four
//! boundary segments (step 3) and clipped against a running pair of
//! polylines — `upper`/`lower` — that bound the remaining visible
//! cone (steps 4-6). A line bisecting the other during canonicalization
//! (step 7) splits `src` at the crossing point and recurses on each
//! half.

use crate::blockmap::{BlockMap, rasterize_line};
use crate::geom::{EPSILON, intersect_lines, signed_distance};
use glam::DVec2;

#[derive(Clone, Copy, Debug)]
pub struct LineSeg {
    pub p1: DVec2,
    pub p2: DVec2,
}

fn sign(v: f64) -> i32 {
    if v > EPSILON {
        1
    } else if v < -EPSILON {
        -1
    } else {
        0
    }
}

/// Result of canonicalizing a `(src, tgt)` pair.
#[derive(Debug)]
enum Canon {
    /// `tgt` runs opposite `src`, `tgt.p1` to `tgt`'s left.
    Pair(LineSeg, LineSeg),
    /// `src`'s line bisects `tgt` between its endpoints: `near` is the
    /// point on `src`'s line, `far` is the endpoint left standing.
    Bisected { src: LineSeg, near: DVec2, far: DVec2 },
}

/// `spec.md` §4.5.3 step 2: orient `src` so `tgt` lies to its left, flip
/// `src`'s own facing if both endpoints of `tgt` are behind it, and swap
/// `src`/`tgt` if `tgt`'s line instead straddles `src` (rejecting a pair
/// where this happens twice, a literal crossing). Step 7's degenerate
/// case - one line exactly bisecting the other - falls out here too.
fn canonicalize(src0: LineSeg, tgt0: LineSeg) -> Option<Canon> {
    let mut src = src0;
    let mut tgt = tgt0;
    let mut swapped = false;
    loop {
        let dir = src.p2 - src.p1;
        let sy1 = sign(signed_distance(src.p1, dir, tgt.p1));
        let sy2 = sign(signed_distance(src.p1, dir, tgt.p2));
        if sy1 == 0 && sy2 == 0 {
            // tgt is collinear with src: no well-defined cone between them.
            return None;
        }
        if (sy1 > 0 && sy2 < 0) || (sy1 < 0 && sy2 > 0) {
            std::mem::swap(&mut src, &mut tgt);
            if swapped {
                return None;
            }
            swapped = true;
            continue;
        }
        break;
    }

    let dir = src.p2 - src.p1;
    let mut y1 = signed_distance(src.p1, dir, tgt.p1);
    let mut y2 = signed_distance(src.p1, dir, tgt.p2);
    if sign(y1) <= 0 && sign(y2) <= 0 {
        std::mem::swap(&mut src.p1, &mut src.p2);
        y1 = -y1;
        y2 = -y2;
    }
    let dir = src.p2 - src.p1;

    if (y2 - y1).abs() < EPSILON {
        // tgt runs parallel to src: order its endpoints so p1 trails p2.
        let x1 = dir.dot(tgt.p1 - src.p1);
        let x2 = dir.dot(tgt.p2 - src.p1);
        if x1 < x2 {
            std::mem::swap(&mut tgt.p1, &mut tgt.p2);
        }
        return Some(Canon::Pair(src, tgt));
    }

    let tgt_dir = tgt.p2 - tgt.p1;
    let x1 = signed_distance(tgt.p1, tgt_dir, src.p1);
    let x2 = signed_distance(tgt.p1, tgt_dir, src.p2);

    if sign(y1) == 0 {
        if x1 >= 0.0 && x2 <= 0.0 {
            return Some(Canon::Bisected { src, near: tgt.p1, far: tgt.p2 });
        }
        if x1 < 0.0 {
            std::mem::swap(&mut tgt.p1, &mut tgt.p2);
        }
        return Some(Canon::Pair(src, tgt));
    }
    if sign(y2) == 0 {
        if x1 <= 0.0 && x2 >= 0.0 {
            return Some(Canon::Bisected { src, near: tgt.p2, far: tgt.p1 });
        }
        if x1 < 0.0 {
            std::mem::swap(&mut tgt.p1, &mut tgt.p2);
        }
        return Some(Canon::Pair(src, tgt));
    }

    if (x1 < 0.0 && x2 > 0.0) || (x1 > 0.0 && x2 < 0.0) {
        return Some(if y2 > y1 {
            Canon::Bisected { src, near: tgt.p1, far: tgt.p2 }
        } else {
            Canon::Bisected { src, near: tgt.p2, far: tgt.p1 }
        });
    }
    if x1 <= 0.0 && x2 <= 0.0 {
        std::mem::swap(&mut tgt.p1, &mut tgt.p2);
    }
    Some(Canon::Pair(src, tgt))
}

/// A candidate occluding line, tracked across the clip so endpoints
/// tightened by one iteration are visible to the next.
#[derive(Clone, Copy, Debug)]
struct Occluder {
    start: DVec2,
    end: DVec2,
}

/// One boundary of the remaining visible cone: the far endpoint of the
/// ray from `src`, tightened as occluders are folded in.
#[derive(Clone, Copy, Debug)]
struct PolyLine {
    end: DVec2,
}

/// Distinct solid lines touching any blockmap cell along the
/// quadrilateral's four boundary segments (`spec.md` §4.5.3 step 3).
fn gather_candidates(
    bm: &BlockMap,
    src: LineSeg,
    tgt: LineSeg,
    solid: &[bool],
) -> Vec<u16> {
    let mut out = Vec::new();
    let mut visit = |a: DVec2, b: DVec2| {
        rasterize_line(
            a.x as i32 - bm.header.x_origin as i32,
            a.y as i32 - bm.header.y_origin as i32,
            b.x as i32 - bm.header.x_origin as i32,
            b.y as i32 - bm.header.y_origin as i32,
            |c, r| {
                for &line in bm.cell(c, r) {
                    if solid.get(line as usize).copied().unwrap_or(false) && !out.contains(&line) {
                        out.push(line);
                    }
                }
            },
        );
    };
    visit(src.p1, src.p2);
    visit(tgt.p1, tgt.p2);
    visit(src.p1, tgt.p1);
    visit(src.p2, tgt.p2);
    out
}

/// Rotate a point into the `src -> tgt.p1` travel frame: `x` is the
/// distance travelled along that axis, `y` the signed perpendicular
/// offset (`spec.md` §4.5.3 step 4's rotated-bounding-box prune).
fn rotate(origin: DVec2, dir: DVec2, p: DVec2) -> DVec2 {
    DVec2::new(dir.dot(p - origin), signed_distance(origin, dir, p))
}

enum TrimOutcome {
    /// An occluder fully spans the quadrilateral: nothing gets through.
    Blocked,
    /// No candidate occluder lies inside the rotated bounding box.
    Empty,
    /// The occluders left after pruning, in their original endpoint order.
    Remaining(Vec<Occluder>),
}

/// `spec.md` §4.5.3 step 4: prune candidates to those that actually lie
/// inside the rotated bounding box spanned by `src` and `tgt`, with a
/// fast path when a single candidate fully spans the gap.
fn trim_lines(src: LineSeg, tgt: LineSeg, candidates: &[Occluder]) -> TrimOutcome {
    let origin = src.p1;
    let dir = tgt.p1 - origin;
    if dir.length_squared() < EPSILON * EPSILON {
        return TrimOutcome::Empty;
    }

    let p1 = rotate(origin, dir, src.p2);
    let p2 = rotate(origin, dir, tgt.p1);
    let p3 = rotate(origin, dir, tgt.p2);

    let min_x = p1.x.max(0.0);
    let max_x = p2.x.min(p3.x);
    let min_y = p1.y.min(p2.y).min(p3.y);

    if min_x > max_x {
        return TrimOutcome::Empty;
    }

    let mut remaining = Vec::new();
    for &occ in candidates {
        let start_y = signed_distance(origin, dir, occ.start);
        let end_y = signed_distance(origin, dir, occ.end);

        if (start_y <= min_y && end_y <= min_y) || (start_y >= 0.0 && end_y >= 0.0 && min_y >= 0.0)
        {
            continue;
        }

        if start_y >= 0.0 || start_y <= min_y {
            let straddles = (end_y <= min_y && start_y >= 0.0) || (end_y >= 0.0 && start_y <= min_y);
            if straddles {
                let start_x = dir.dot(occ.start - origin);
                if start_x >= min_x && start_x <= max_x {
                    let end_x = dir.dot(occ.end - origin);
                    if end_x >= min_x && end_x <= max_x {
                        return TrimOutcome::Blocked;
                    }
                }
            } else {
                let start_x = dir.dot(occ.start - origin);
                let end_x = dir.dot(occ.end - origin);
                if (start_x <= min_x && end_x <= min_x) || (start_x >= max_x && end_x >= max_x) {
                    continue;
                }
            }
        }
        remaining.push(occ);
    }

    if remaining.is_empty() {
        TrimOutcome::Empty
    } else {
        TrimOutcome::Remaining(remaining)
    }
}

enum Side {
    Left,
    Right,
    On,
}

fn find_side(p1: DVec2, p2: DVec2, p: DVec2) -> Side {
    let d = signed_distance(p1, p2 - p1, p);
    if d.abs() < EPSILON {
        Side::On
    } else if d > 0.0 {
        Side::Right
    } else {
        Side::Left
    }
}

/// Does segment `a1-a2` cross segment `b1-b2` strictly between their
/// endpoints?
fn segments_cross(a1: DVec2, a2: DVec2, b1: DVec2, b2: DVec2) -> bool {
    let d1 = find_side(a1, a2, b1);
    let d2 = find_side(a1, a2, b2);
    let d3 = find_side(b1, b2, a1);
    let d4 = find_side(b1, b2, a2);
    !matches!(d1, Side::On)
        && !matches!(d2, Side::On)
        && !matches!(d3, Side::On)
        && !matches!(d4, Side::On)
        && !matches!((d1, d2), (Side::Left, Side::Left) | (Side::Right, Side::Right))
        && !matches!((d3, d4), (Side::Left, Side::Left) | (Side::Right, Side::Right))
}

/// Tighten `poly`'s near endpoint by following it across `occ` if `occ`
/// crosses the segment from `src` to `poly`'s current end
/// (`spec.md` §4.5.3 step 5/6's endpoint-tightening).
fn add_to_poly_line(anchor: DVec2, poly: &mut PolyLine, occ: Occluder) -> bool {
    if !segments_cross(anchor, poly.end, occ.start, occ.end) {
        return false;
    }
    let dir = poly.end - anchor;
    let occ_dir = occ.end - occ.start;
    if let Some(hit) = intersect_lines(anchor, dir, occ.start, occ_dir) {
        // keep whichever of the occluder's endpoints still lies farther
        // out along the ray, tightening the cone to the crossing point.
        poly.end = if (occ.end - hit).dot(dir) > (occ.start - hit).dot(dir) {
            occ.end
        } else {
            occ.start
        };
        true
    } else {
        false
    }
}

/// Do the current upper and lower polylines cross, meaning the visible
/// cone has closed to nothing?
fn poly_lines_cross(src: DVec2, upper: &PolyLine, lower: &PolyLine) -> bool {
    matches!(find_side(src, upper.end, lower.end), Side::Left)
}

/// Iteratively clip `upper`/`lower` against every remaining occluder
/// (`spec.md` §4.5.3 steps 5-6): each occluder that crosses into the
/// current cone tightens whichever polyline it touches; visibility
/// survives unless the two polylines end up crossed.
fn find_poly_lines(src: DVec2, tgt: LineSeg, occluders: &[Occluder]) -> bool {
    let mut upper = PolyLine { end: tgt.p1 };
    let mut lower = PolyLine { end: tgt.p2 };

    let mut changed = true;
    while changed {
        changed = false;
        for &occ in occluders {
            if add_to_poly_line(src, &mut upper, occ) {
                changed = true;
            }
            if add_to_poly_line(src, &mut lower, occ) {
                changed = true;
            }
            if poly_lines_cross(src, &upper, &lower) {
                return false;
            }
        }
    }
    true
}

/// `spec.md` §4.5.3 steps 3-6 for one already-canonicalized, non-bisected
/// pair: gather candidates, prune, then clip the polyline cone.
fn check_los(bm: &BlockMap, src: LineSeg, tgt: LineSeg, solid: &[bool], solid_geometry: &[(DVec2, DVec2)]) -> bool {
    let candidate_ids = gather_candidates(bm, src, tgt, solid);
    if candidate_ids.is_empty() {
        return true;
    }
    let candidates: Vec<Occluder> = candidate_ids
        .iter()
        .map(|&id| {
            let (a, b) = solid_geometry[id as usize];
            Occluder { start: a, end: b }
        })
        .collect();

    match trim_lines(src, tgt, &candidates) {
        TrimOutcome::Blocked => false,
        TrimOutcome::Empty => true,
        TrimOutcome::Remaining(remaining) => find_poly_lines(src.p1, tgt, &remaining),
    }
}

/// `spec.md` §4.5.3 step 7: `src`'s line bisects `tgt` between its
/// endpoints, so split `src` at the crossing point and test each half
/// against the retained endpoint; visible iff either half sees it.
fn has_los_bisected(
    bm: &BlockMap,
    src: LineSeg,
    near: DVec2,
    far: DVec2,
    solid: &[bool],
    solid_geometry: &[(DVec2, DVec2)],
) -> bool {
    let first = LineSeg { p1: src.p1, p2: near };
    let second = LineSeg { p1: near, p2: src.p2 };
    let probe = LineSeg { p1: far, p2: far };
    check_los(bm, first, probe, solid, solid_geometry)
        || check_los(bm, second, probe, solid, solid_geometry)
}

/// Is there a line of sight between `src` and `tgt`? `solid` flags which
/// linedef indices are solid (one-sided); `solid_geometry` gives their
/// endpoints in world coordinates, indexed the same way.
pub fn has_los(
    src: LineSeg,
    tgt: LineSeg,
    bm: &BlockMap,
    solid: &[bool],
    solid_geometry: &[(DVec2, DVec2)],
) -> bool {
    match canonicalize(src, tgt) {
        None => true,
        Some(Canon::Pair(src, tgt)) => check_los(bm, src, tgt, solid, solid_geometry),
        Some(Canon::Bisected { src, near, far }) => {
            has_los_bisected(bm, src, near, far, solid, solid_geometry)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn colinear_pair_canonicalizes_to_none() {
        let src = LineSeg { p1: DVec2::new(0.0, 0.0), p2: DVec2::new(100.0, 0.0) };
        let tgt = LineSeg { p1: DVec2::new(20.0, 0.0), p2: DVec2::new(80.0, 0.0) };
        assert!(matches!(canonicalize(src, tgt), None));
    }

    #[test]
    fn parallel_pair_canonicalizes_to_opposite_facing_pair() {
        let src = LineSeg { p1: DVec2::new(0.0, 0.0), p2: DVec2::new(100.0, 0.0) };
        let tgt = LineSeg { p1: DVec2::new(0.0, 10.0), p2: DVec2::new(100.0, 10.0) };
        match canonicalize(src, tgt) {
            Some(Canon::Pair(s, t)) => {
                assert!((s.p1 - DVec2::new(0.0, 0.0)).length() < 1e-6);
                assert!((s.p2 - DVec2::new(100.0, 0.0)).length() < 1e-6);
                // tgt now runs opposite src: p1 trails p2 along src's direction.
                assert!((t.p1 - DVec2::new(100.0, 10.0)).length() < 1e-6);
                assert!((t.p2 - DVec2::new(0.0, 10.0)).length() < 1e-6);
            }
            other => panic!("expected Pair, got {other:?}"),
        }
    }

    #[test]
    fn trim_lines_blocks_on_full_span_occluder() {
        let src = LineSeg { p1: DVec2::new(0.0, 0.0), p2: DVec2::new(0.0, 10.0) };
        let tgt = LineSeg { p1: DVec2::new(100.0, 10.0), p2: DVec2::new(100.0, 0.0) };
        let occ = Occluder { start: DVec2::new(50.0, -50.0), end: DVec2::new(50.0, 50.0) };
        assert!(matches!(trim_lines(src, tgt, &[occ]), TrimOutcome::Blocked));
    }

    #[test]
    fn trim_lines_ignores_out_of_bounds_occluder() {
        let src = LineSeg { p1: DVec2::new(0.0, 0.0), p2: DVec2::new(0.0, 10.0) };
        let tgt = LineSeg { p1: DVec2::new(100.0, 10.0), p2: DVec2::new(100.0, 0.0) };
        let occ = Occluder { start: DVec2::new(50.0, 1000.0), end: DVec2::new(50.0, 1100.0) };
        assert!(matches!(trim_lines(src, tgt, &[occ]), TrimOutcome::Empty));
    }

    #[test]
    fn has_los_true_when_no_candidates() {
        let bm = crate::blockmap::BlockMap {
            header: crate::blockmap::BlockMapHeader { x_origin: 0, y_origin: 0, columns: 0, rows: 0 },
            cells: vec![],
        };
        let src = LineSeg { p1: DVec2::new(0.0, 0.0), p2: DVec2::new(0.0, 10.0) };
        let tgt = LineSeg { p1: DVec2::new(100.0, 10.0), p2: DVec2::new(100.0, 0.0) };
        assert!(has_los(src, tgt, &bm, &[], &[]));
    }
}
