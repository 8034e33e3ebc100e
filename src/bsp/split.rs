//! Recursive seg splitting (`spec.md` §4.4.4): partitions a seg list
//! into right/left halves, duplicating any seg the chosen partition
//! actually crosses into two integer-snapped fragments.

use super::select::{Class, classify};
use super::{PartitionContext, WorkSeg};
use crate::level::Level;
use glam::DVec2;

/// Intersect the partition with the *underlying linedef* (not the seg
/// fragment) so every fragment of one linedef splits at the identical
/// integer-snapped point, then recompute the new fragment's offset as
/// the distance from the linedef's own first vertex (`spec.md` §4.4.4).
fn split_point_and_offset(seg: &WorkSeg, ctx: &PartitionContext, level: &Level) -> ((i16, i16), i32) {
    let ld = &level.linedefs[seg.linedef as usize];
    let lv1 = level.vertices[ld.v1 as usize];
    let lv2 = level.vertices[ld.v2 as usize];
    let ld_origin = DVec2::new(lv1.x as f64, lv1.y as f64);
    let ld_dir = DVec2::new((lv2.x - lv1.x) as f64, (lv2.y - lv1.y) as f64);

    let ix = crate::geom::intersect_lines(ctx.origin, ctx.dir, ld_origin, ld_dir)
        .expect("a seg classified as a split must cross its own partition line");
    let split = (
        crate::geom::lrint(ix.x) as i16,
        crate::geom::lrint(ix.y) as i16,
    );

    let len = ld_dir.length();
    let offset = if len > 0.0 {
        let to_split = DVec2::new(split.0 as f64 - ld_origin.x, split.1 as f64 - ld_origin.y);
        crate::geom::lrint(to_split.dot(ld_dir) / len)
    } else {
        0
    };
    (split, offset)
}

/// Duplicate a seg straddling the partition into its right and left
/// halves. Whichever half keeps the seg's original start point keeps its
/// original offset; the other half's start moves to the split point and
/// its offset is recomputed from the linedef's canonical start.
fn split_one(seg: &WorkSeg, ctx: &PartitionContext, level: &Level) -> (WorkSeg, WorkSeg) {
    let (split, offset) = split_point_and_offset(seg, ctx, level);
    let starts_on_right = matches!(
        crate::geom::orient(ctx.origin, ctx.dir, seg.p1()),
        crate::geom::Orientation::Right
    );

    if starts_on_right {
        let right_half = WorkSeg {
            v2: split,
            is_split: true,
            ..*seg
        };
        let left_half = WorkSeg {
            v1: split,
            offset,
            is_split: true,
            ..*seg
        };
        (right_half, left_half)
    } else {
        let left_half = WorkSeg {
            v2: split,
            is_split: true,
            ..*seg
        };
        let right_half = WorkSeg {
            v1: split,
            offset,
            is_split: true,
            ..*seg
        };
        (right_half, left_half)
    }
}

/// Reorder `segs` into right and left halves under partition `ctx`,
/// duplicating every straddling seg (`spec.md` §4.4.4). The source
/// reorders in place as `[right | split | left]`; since `WorkSeg`s here
/// carry their coordinates inline rather than pool indices, two fresh
/// output vectors are equivalent and avoid the in-place dance.
pub fn split_segs(segs: &[WorkSeg], ctx: &PartitionContext, level: &Level) -> (Vec<WorkSeg>, Vec<WorkSeg>) {
    let mut right = Vec::with_capacity(segs.len());
    let mut left = Vec::with_capacity(segs.len());

    for seg in segs {
        match classify(ctx, seg) {
            Class::Right => right.push(*seg),
            Class::Left => left.push(*seg),
            Class::Split => {
                let (r, l) = split_one(seg, ctx, level);
                right.push(r);
                left.push(l);
            }
        }
    }
    (right, left)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::compute_static_variables;
    use crate::level::tests::square_room;

    #[test]
    fn splitting_a_straddling_wall_preserves_endpoints() {
        let lvl = square_room();
        // Bottom wall (0,0)-(1024,0) split by a vertical partition at x=512.
        let seg = WorkSeg {
            v1: (0, 0),
            v2: (1024, 0),
            angle: 0,
            linedef: 0,
            flip: 0,
            offset: 0,
            sector: 0,
            alias: 0,
            is_split: false,
        };
        let ctx = PartitionContext {
            origin: DVec2::new(512.0, 0.0),
            dir: DVec2::new(0.0, 1.0),
            alias: 99,
        };
        let (right, left) = split_segs(std::slice::from_ref(&seg), &ctx, &lvl);
        assert_eq!(right.len(), 1);
        assert_eq!(left.len(), 1);
        assert_eq!(right[0].v2, (512, 0));
        assert_eq!(left[0].v1, (512, 0));
        assert_eq!(right[0].v1, (0, 0));
        assert_eq!(left[0].v2, (1024, 0));
    }

    #[test]
    fn static_variables_match_first_seg() {
        let seg = WorkSeg {
            v1: (0, 0),
            v2: (64, 0),
            angle: 0,
            linedef: 0,
            flip: 0,
            offset: 0,
            sector: 0,
            alias: 0,
            is_split: false,
        };
        let ctx = compute_static_variables(&seg);
        assert_eq!(ctx.origin, DVec2::new(0.0, 0.0));
        assert_eq!(ctx.dir, DVec2::new(64.0, 0.0));
    }
}
