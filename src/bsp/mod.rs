//! BSP builder (`spec.md` §4.4): seg construction, alias computation,
//! partition selection, recursive splitting, and leaf/node emission.

pub(crate) mod alias;
mod select;
mod split;

use crate::config::NodeConfig;
use crate::geom::BBox;
use crate::level::Level;
use crate::level::records::{self as rec, LinedefKind, Node, Seg, SubSector, Vertex};
use glam::DVec2;
use std::collections::HashSet;
use thiserror::Error;
use tracing::warn;

#[derive(Error, Debug)]
pub enum BspError {
    #[error("segment pool exhausted ({limit} segs, strategy produced pathological splits)")]
    SegCapacityExceeded { limit: usize },
}

/// A seg under construction: vertex coordinates are carried inline
/// (rather than as pool indices) until leaf emission, since the pool
/// itself is only populated once, at the end, from the final coordinates.
#[derive(Clone, Copy, Debug)]
pub struct WorkSeg {
    pub v1: (i16, i16),
    pub v2: (i16, i16),
    pub angle: u16,
    pub linedef: u16,
    pub flip: u16,
    pub offset: i32,
    pub sector: u16,
    pub alias: i32,
    pub is_split: bool,
}

impl WorkSeg {
    fn p1(&self) -> DVec2 {
        DVec2::new(self.v1.0 as f64, self.v1.1 as f64)
    }
    fn p2(&self) -> DVec2 {
        DVec2::new(self.v2.0 as f64, self.v2.1 as f64)
    }
}

/// Replaces the source's `X, Y, DX, DY, ANGLE, currentAlias` globals: a
/// partition candidate's geometry, threaded explicitly through selection
/// and splitting instead of being read from module state.
#[derive(Clone, Copy, Debug)]
pub struct PartitionContext {
    pub origin: DVec2,
    pub dir: DVec2,
    pub alias: i32,
}

pub fn compute_static_variables(seg: &WorkSeg) -> PartitionContext {
    PartitionContext {
        origin: seg.p1(),
        dir: seg.p2() - seg.p1(),
        alias: seg.alias,
    }
}

const FACTOR_NODE: f64 = 0.6;
const FACTOR_SEGS: f64 = 2.0;
const FACTOR_VERTEX: f64 = 1.0;
const GROWTH: f64 = 1.10;

struct Builder<'a> {
    level: &'a Level,
    cfg: &'a NodeConfig,
    seg_limit: usize,
    segs_emitted: usize,
    out_segs: Vec<Seg>,
    out_subsectors: Vec<SubSector>,
    out_nodes: Vec<Node>,
    vertex_pool: Vec<Vertex>,
}

impl<'a> Builder<'a> {
    fn find_or_add_vertex(&mut self, p: (i16, i16)) -> u16 {
        if let Some(idx) = self.vertex_pool.iter().position(|v| v.x == p.0 && v.y == p.1) {
            return idx as u16;
        }
        self.vertex_pool.push(Vertex { x: p.0, y: p.1 });
        (self.vertex_pool.len() - 1) as u16
    }

    /// Emit a convex leaf: sort by linedef id (preserves source ordering
    /// for renderer special effects, `spec.md` §4.4.5) and resolve final
    /// vertex indices through the dedup pool.
    fn emit_leaf(&mut self, mut segs: Vec<WorkSeg>) -> u16 {
        segs.sort_by_key(|s| (s.linedef, s.flip));
        let first = self.out_segs.len() as u16;
        for s in &segs {
            if self.segs_emitted >= self.seg_limit {
                warn!("seg pool exhausted while emitting leaf; truncating");
                break;
            }
            let v1 = self.find_or_add_vertex(s.v1);
            let v2 = self.find_or_add_vertex(s.v2);
            self.out_segs.push(Seg {
                v1,
                v2,
                angle: s.angle,
                linedef: s.linedef,
                flip: s.flip,
                offset: s.offset as i16,
            });
            self.segs_emitted += 1;
        }
        let count = (self.out_segs.len() as u16) - first;
        self.out_subsectors.push(SubSector { count, first });
        (self.out_subsectors.len() - 1) as u16
    }

    fn bbox_of(segs: &[WorkSeg]) -> BBox {
        BBox::from_points(segs.iter().flat_map(|s| [s.v1, s.v2]))
    }

    /// Recursively build one subtree, returning its child reference
    /// (high bit set => sub-sector index, else node index).
    fn build(&mut self, segs: Vec<WorkSeg>, convex: &mut Vec<i32>) -> u16 {
        if let Some((ctx, pushed)) = select::choose_partition(&segs, self.cfg, convex) {
            convex.extend_from_slice(&pushed);
            convex.push(ctx.alias);

            let (right, left) = split::split_segs(&segs, &ctx, self.level);
            let right_bbox = Self::bbox_of(&right);
            let left_bbox = Self::bbox_of(&left);

            let right_child = self.build(right, convex);
            let left_child = self.build(left, convex);

            convex.truncate(convex.len() - pushed.len() - 1);

            let node = Node {
                x: crate::geom::lrint(ctx.origin.x) as i16,
                y: crate::geom::lrint(ctx.origin.y) as i16,
                dx: crate::geom::lrint(ctx.dir.x) as i16,
                dy: crate::geom::lrint(ctx.dir.y) as i16,
                bbox: [right_bbox, left_bbox],
                child: [right_child, left_child],
            };
            self.out_nodes.push(node);
            return (self.out_nodes.len() - 1) as u16; // high bit clear: node index
        }

        if self.cfg.unique_subsectors {
            let distinct: HashSet<u16> = segs.iter().map(|s| s.sector).collect();
            if distinct.len() > 1 {
                if let Some(&unique) = distinct.iter().find(|&&s| self.cfg.is_keep_unique(s)) {
                    return self.sector_split(segs, unique, convex);
                }
            }
        }

        let ss = self.emit_leaf(segs);
        ss | rec::SUBSECTOR_BIT
    }

    /// Force-split a leaf by sector membership rather than geometry
    /// (`spec.md` §4.4.4 "unique-sector option", `SPEC_FULL.md`'s
    /// `SectorSplit` redesign note). The node's partition fields are the
    /// geometry of the first seg — not a real geometric divider, the
    /// children are grouped by sector instead of by side.
    fn sector_split(&mut self, segs: Vec<WorkSeg>, unique_sector: u16, convex: &mut Vec<i32>) -> u16 {
        let ctx = compute_static_variables(&segs[0]);
        let (unique, rest): (Vec<WorkSeg>, Vec<WorkSeg>) =
            segs.into_iter().partition(|s| s.sector == unique_sector);

        let unique_bbox = Self::bbox_of(&unique);
        let rest_bbox = Self::bbox_of(&rest);

        let unique_child = self.build(unique, convex);
        let rest_child = self.build(rest, convex);

        let node = Node {
            x: crate::geom::lrint(ctx.origin.x) as i16,
            y: crate::geom::lrint(ctx.origin.y) as i16,
            dx: crate::geom::lrint(ctx.dir.x) as i16,
            dy: crate::geom::lrint(ctx.dir.y) as i16,
            bbox: [unique_bbox, rest_bbox],
            child: [unique_child, rest_child],
        };
        self.out_nodes.push(node);
        (self.out_nodes.len() - 1) as u16
    }
}

/// Build seg list from linedefs/sidedefs (`spec.md` §4.4.1).
fn build_initial_segs(level: &Level, aliases: &[i32], cfg: &NodeConfig) -> Vec<WorkSeg> {
    let mut segs = Vec::with_capacity(level.linedefs.len() * 2);
    for (i, ld) in level.linedefs.iter().enumerate() {
        if cfg.is_ignored(i as u16) {
            continue;
        }
        let v1 = level.vertices[ld.v1 as usize];
        let v2 = level.vertices[ld.v2 as usize];
        if v1.x == v2.x && v1.y == v2.y {
            continue; // zero-length linedef, no seg
        }

        let special = match ld.kind {
            LinedefKind::Classic { special, .. } => special as u32,
            LinedefKind::Extended { special, .. } => special as u32,
        };

        let mut right = ld.right;
        let mut left = ld.left;
        if cfg.reduce_linedefs {
            if let (Some(r), Some(l)) = (ld.right, ld.left) {
                let rs = &level.sidedefs[r as usize];
                let ls = &level.sidedefs[l as usize];
                let same_sector = rs.sector == ls.sector;
                let no_special = special == 0;
                if same_sector && no_special {
                    let empty = |tex: &[u8; 8]| tex[0] == b'-' || tex[0] == 0;
                    if empty(&rs.middle) {
                        right = None;
                    }
                    if empty(&ls.middle) {
                        left = None;
                    }
                }
            }
        }

        let dx = (v2.x - v1.x) as f64;
        let dy = (v2.y - v1.y) as f64;
        let angle = crate::geom::bam_angle(DVec2::new(dx, dy));

        if let Some(r) = right {
            segs.push(WorkSeg {
                v1: (v1.x, v1.y),
                v2: (v2.x, v2.y),
                angle,
                linedef: i as u16,
                flip: 0,
                offset: 0,
                sector: level.sidedefs[r as usize].sector,
                alias: aliases[i],
                is_split: false,
            });
        }
        if let Some(l) = left {
            let back_angle = (angle as u32 + 0x8000) as u16;
            segs.push(WorkSeg {
                v1: (v2.x, v2.y),
                v2: (v1.x, v1.y),
                angle: back_angle,
                linedef: i as u16,
                flip: 1,
                offset: 0,
                sector: level.sidedefs[l as usize].sector,
                alias: aliases[i],
                is_split: false,
            });
        }
    }
    segs
}

/// Test-only escape hatch so `select`'s own unit tests can build a seg
/// list without going through the whole `build_nodes` pipeline.
#[cfg(test)]
pub(crate) fn build_initial_segs_for_test(level: &Level, aliases: &[i32], cfg: &NodeConfig) -> Vec<WorkSeg> {
    build_initial_segs(level, aliases, cfg)
}

pub fn build_nodes(level: &Level, cfg: &NodeConfig) -> Result<(Vec<Vertex>, Vec<Seg>, Vec<SubSector>, Vec<Node>), BspError> {
    let aliases = alias::compute_aliases(level);
    let initial_segs = build_initial_segs(level, &aliases, cfg);
    let initial_count = initial_segs.len().max(1);

    let seg_limit = (FACTOR_SEGS * initial_count as f64) as usize;
    let node_cap = ((FACTOR_NODE * level.sidedefs.len() as f64) as usize).max(8);
    let vertex_cap = ((FACTOR_VERTEX * level.vertices.len() as f64) as usize).max(8);
    let _ = GROWTH; // growth factor documented; Vec's own amortized growth covers it in practice

    let mut builder = Builder {
        level,
        cfg,
        seg_limit,
        segs_emitted: 0,
        out_segs: Vec::with_capacity(seg_limit),
        out_subsectors: Vec::with_capacity(node_cap),
        out_nodes: Vec::with_capacity(node_cap),
        vertex_pool: Vec::with_capacity(vertex_cap),
    };

    let mut convex = Vec::new();
    let root = builder.build(initial_segs, &mut convex);

    if builder.segs_emitted > seg_limit {
        return Err(BspError::SegCapacityExceeded { limit: seg_limit });
    }

    // A single-subsector level (no partition needed at all) has no
    // NODES entries; `Level::bsp_root` then falls back to the lone
    // sub-sector. Otherwise the last pushed node is the root, matching
    // the classic `nodes.len()-1` convention.
    let _ = root;

    Ok((
        builder.vertex_pool,
        builder.out_segs,
        builder.out_subsectors,
        builder.out_nodes,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::tests::square_room;

    #[test]
    fn square_room_produces_one_subsector_no_nodes() {
        let lvl = square_room();
        let cfg = NodeConfig::default();
        let (_vertices, segs, subsectors, nodes) = build_nodes(&lvl, &cfg).unwrap();
        assert_eq!(nodes.len(), 0);
        assert_eq!(subsectors.len(), 1);
        assert_eq!(segs.len(), 4);
    }

    #[test]
    fn every_seg_vertex_is_in_range() {
        let lvl = square_room();
        let cfg = NodeConfig::default();
        let (vertices, segs, _subsectors, _nodes) = build_nodes(&lvl, &cfg).unwrap();
        for s in &segs {
            assert!((s.v1 as usize) < vertices.len());
            assert!((s.v2 as usize) < vertices.len());
        }
    }
}
