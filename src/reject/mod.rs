//! Reject builder (`spec.md` §4.5): sector-pair visibility matrix.
//!
//! Solid and see-thru lines are classified first, then sectors are
//! grouped into a parent/child graph (`graph.rs`) so singleton sectors
//! don't need their own line-pair tests, then every remaining line pair
//! runs the LOS test (`los.rs`). Anything left `unknown` once every
//! pair has been visited is `hidden` (`spec.md` §4.5.5) — this builder
//! applies that rule as one final sweep rather than incrementally as
//! each sector's last line is visited, which is an ordering-independent
//! optimization in the original and produces the identical matrix.

pub mod graph;
pub mod los;

use crate::blockmap::BlockMap;
use crate::config::RejectConfig;
use crate::level::Level;
use glam::DVec2;
use graph::{SeeThruLine, SectorGraph};
use los::LineSeg;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum RejectError {
    #[error("sidedef references sector {sector} but level only has {count} sectors")]
    SectorIndexOutOfRange { sector: u16, count: usize },
}

#[derive(Clone, Debug)]
pub enum RejectOutcome {
    /// Freshly computed (or empty-mode) matrix, ready for `Level::set_reject`.
    Built(Vec<u8>),
    /// The existing matrix looks hand-edited for engine special effects
    /// (`spec.md` §4.5.6); left untouched.
    SkippedSpecialEffects,
}

fn bits_len(sector_count: usize) -> usize {
    (sector_count * sector_count + 7) / 8
}

fn get_bit(bytes: &[u8], sector_count: usize, i: usize, j: usize) -> bool {
    let bit = i * sector_count + j;
    let byte = bit / 8;
    if byte >= bytes.len() {
        return false;
    }
    bytes[byte] & (1 << (bit % 8)) != 0
}

fn set_bit(bytes: &mut [u8], sector_count: usize, i: usize, j: usize) {
    let bit = i * sector_count + j;
    bytes[bit / 8] |= 1 << (bit % 8);
}

/// `spec.md` §4.5.6: a set diagonal bit, or an asymmetric `(i,j)` pair,
/// means the matrix encodes something other than plain visibility.
fn has_special_effects(existing: &[u8], sector_count: usize) -> bool {
    if existing.len() < bits_len(sector_count) {
        return false;
    }
    for i in 0..sector_count {
        if get_bit(existing, sector_count, i, i) {
            return true;
        }
        for j in (i + 1)..sector_count {
            if get_bit(existing, sector_count, i, j) != get_bit(existing, sector_count, j, i) {
                return true;
            }
        }
    }
    false
}

/// Classify every linedef into solid (one-sided) or see-thru (two-sided,
/// distinct sectors on each side) per `spec.md` §4.5.1. Same-sector
/// two-sided lines and missing-side lines are discarded from both sets.
fn classify_lines(level: &Level) -> Result<(Vec<bool>, Vec<SeeThruLine>), RejectError> {
    let sector_count = level.sectors.len();
    let mut solid = vec![false; level.linedefs.len()];
    let mut see_thru = Vec::new();

    for (idx, ld) in level.linedefs.iter().enumerate() {
        match (ld.right, ld.left) {
            (Some(r), None) | (None, Some(r)) => {
                let sector = level.sidedefs[r as usize].sector;
                if sector as usize >= sector_count {
                    return Err(RejectError::SectorIndexOutOfRange { sector, count: sector_count });
                }
                solid[idx] = true;
            }
            (Some(r), Some(l)) => {
                let front = level.sidedefs[r as usize].sector;
                let back = level.sidedefs[l as usize].sector;
                for &s in &[front, back] {
                    if s as usize >= sector_count {
                        return Err(RejectError::SectorIndexOutOfRange { sector: s, count: sector_count });
                    }
                }
                if front != back {
                    see_thru.push(SeeThruLine { linedef: idx as u16, front, back });
                }
            }
            (None, None) => {}
        }
    }
    Ok((solid, see_thru))
}

fn line_geometry(level: &Level) -> Vec<(DVec2, DVec2)> {
    level
        .linedefs
        .iter()
        .map(|ld| {
            let v1 = level.vertices[ld.v1 as usize];
            let v2 = level.vertices[ld.v2 as usize];
            (
                DVec2::new(v1.x as f64, v1.y as f64),
                DVec2::new(v2.x as f64, v2.y as f64),
            )
        })
        .collect()
}

/// Walk sectors in `spec.md` §4.5.4 order, collecting each of their
/// (and their absorbed children's) see-thru lines exactly once.
fn line_visit_order(graph: &SectorGraph) -> Vec<usize> {
    let mut seen = vec![false; graph.see_thru.len()];
    let mut order = Vec::with_capacity(graph.see_thru.len());
    for sector in graph.visit_order() {
        let mut stack = vec![sector];
        while let Some(s) = stack.pop() {
            for &line in &graph.nodes[s as usize].lines {
                if !seen[line] {
                    seen[line] = true;
                    order.push(line);
                }
            }
            stack.extend(graph.nodes[s as usize].children.iter().copied());
        }
    }
    order
}

/// Propagate a parent's hidden row onto every absorbed descendant
/// (`spec.md` §4.5.2, §4.5.5): a child is hidden from exactly the
/// sectors its parent is hidden from.
fn propagate_children(visible: &mut [bool], sector_count: usize, graph: &SectorGraph) {
    for sector in 0..sector_count as u16 {
        let root = graph.root_of(sector);
        if root == sector {
            continue;
        }
        for other in 0..sector_count {
            if other == sector as usize || other == root as usize {
                continue;
            }
            let v = visible[root as usize * sector_count + other];
            visible[sector as usize * sector_count + other] = v;
            visible[other * sector_count + sector as usize] = v;
        }
    }
}

fn build_matrix(level: &Level, bm: &BlockMap, cfg: &RejectConfig) -> Result<Vec<bool>, RejectError> {
    let sector_count = level.sectors.len();
    let (solid, see_thru) = classify_lines(level)?;
    let geometry = line_geometry(level);

    let mut visible = vec![false; sector_count * sector_count];
    for i in 0..sector_count {
        visible[i * sector_count + i] = true;
    }
    for line in &see_thru {
        let (a, b) = (line.front as usize, line.back as usize);
        visible[a * sector_count + b] = true;
        visible[b * sector_count + a] = true;
    }

    let graph = SectorGraph::build(sector_count, see_thru.clone(), cfg.use_children);
    let order = if cfg.use_graphs {
        line_visit_order(&graph)
    } else {
        (0..see_thru.len()).collect()
    };

    for (pos, &src_idx) in order.iter().enumerate() {
        let src = see_thru[src_idx];
        for &tgt_idx in &order[pos + 1..] {
            let tgt = see_thru[tgt_idx];
            let same_pair = (src.front == tgt.front && src.back == tgt.back)
                || (src.front == tgt.back && src.back == tgt.front);
            if same_pair {
                continue;
            }

            let (sf, sb) = (src.front as usize, src.back as usize);
            let (tf, tb) = (tgt.front as usize, tgt.back as usize);
            let gate = visible[sf * sector_count + tf]
                && visible[sf * sector_count + tb]
                && visible[sb * sector_count + tf]
                && visible[sb * sector_count + tb];
            if gate {
                continue;
            }

            let src_seg = ld_to_seg(&geometry, src.linedef);
            let tgt_seg = ld_to_seg(&geometry, tgt.linedef);
            if los::has_los(src_seg, tgt_seg, bm, &solid, &geometry) {
                for &(a, b) in &[(sf, tf), (sf, tb), (sb, tf), (sb, tb)] {
                    visible[a * sector_count + b] = true;
                    visible[b * sector_count + a] = true;
                }
            }
        }
    }

    if cfg.use_children {
        propagate_children(&mut visible, sector_count, &graph);
    }

    Ok(visible)
}

fn ld_to_seg(geometry: &[(DVec2, DVec2)], linedef: u16) -> LineSeg {
    let (p1, p2) = geometry[linedef as usize];
    LineSeg { p1, p2 }
}

/// Entry point: build (or reuse, or skip) the reject matrix for `level`,
/// given its already-built blockmap.
pub fn build_reject(level: &Level, bm: &BlockMap, cfg: &RejectConfig) -> Result<RejectOutcome, RejectError> {
    let sector_count = level.sectors.len();

    if cfg.empty {
        info!(sectors = sector_count, "emitting empty reject matrix");
        return Ok(RejectOutcome::Built(vec![0u8; bits_len(sector_count).max(1)]));
    }

    if !cfg.force && has_special_effects(&level.reject, sector_count) {
        warn!("existing reject matrix looks hand-edited for special effects, skipping rebuild");
        return Ok(RejectOutcome::SkippedSpecialEffects);
    }

    let visible = build_matrix(level, bm, cfg)?;
    let mut bytes = vec![0u8; bits_len(sector_count).max(1)];
    for i in 0..sector_count {
        for j in 0..sector_count {
            if !visible[i * sector_count + j] {
                set_bit(&mut bytes, sector_count, i, j);
            }
        }
    }
    Ok(RejectOutcome::Built(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockmap::build_blockmap;
    use crate::level::tests::{square_room, three_room_chain, two_rooms_joined, two_rooms_separated};

    #[test]
    fn single_sector_room_is_fully_visible_to_itself() {
        let lvl = square_room();
        let bm = build_blockmap(&lvl, false);
        let cfg = RejectConfig::default();
        let RejectOutcome::Built(bytes) = build_reject(&lvl, &bm, &cfg).unwrap() else {
            panic!("expected a built matrix");
        };
        assert!(!get_bit(&bytes, 1, 0, 0));
    }

    #[test]
    fn two_rooms_joined_by_a_doorway_see_each_other() {
        let lvl = two_rooms_joined();
        let bm = build_blockmap(&lvl, false);
        let cfg = RejectConfig::default();
        let RejectOutcome::Built(bytes) = build_reject(&lvl, &bm, &cfg).unwrap() else {
            panic!("expected a built matrix");
        };
        assert!(!get_bit(&bytes, 2, 0, 1));
        assert!(!get_bit(&bytes, 2, 1, 0));
    }

    #[test]
    fn two_separated_rooms_cannot_see_each_other() {
        let lvl = two_rooms_separated();
        let bm = build_blockmap(&lvl, false);
        let cfg = RejectConfig::default();
        let RejectOutcome::Built(bytes) = build_reject(&lvl, &bm, &cfg).unwrap() else {
            panic!("expected a built matrix");
        };
        assert!(get_bit(&bytes, 2, 0, 1));
        assert!(get_bit(&bytes, 2, 1, 0));
    }

    #[test]
    fn three_room_chain_hides_the_endpoints_from_each_other() {
        let lvl = three_room_chain();
        let bm = build_blockmap(&lvl, false);
        let cfg = RejectConfig::default();
        let RejectOutcome::Built(bytes) = build_reject(&lvl, &bm, &cfg).unwrap() else {
            panic!("expected a built matrix");
        };
        // A and B see each other (shared doorway), B and C see each other,
        // but the pillar in B keeps A and C mutually hidden.
        assert!(!get_bit(&bytes, 3, 0, 1));
        assert!(!get_bit(&bytes, 3, 1, 2));
        assert!(get_bit(&bytes, 3, 0, 2));
        assert!(get_bit(&bytes, 3, 2, 0));
    }

    #[test]
    fn empty_mode_skips_computation() {
        let lvl = two_rooms_separated();
        let bm = build_blockmap(&lvl, false);
        let cfg = RejectConfig { empty: true, ..RejectConfig::default() };
        let RejectOutcome::Built(bytes) = build_reject(&lvl, &bm, &cfg).unwrap() else {
            panic!("expected a built matrix");
        };
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn hand_edited_diagonal_bit_is_detected_as_special() {
        let lvl = two_rooms_joined();
        let bm = build_blockmap(&lvl, false);
        let mut cfg = RejectConfig::default();
        let mut existing = vec![0u8; bits_len(2)];
        set_bit(&mut existing, 2, 0, 0);
        let mut lvl = lvl;
        lvl.reject = existing;
        cfg.force = false;
        let outcome = build_reject(&lvl, &bm, &cfg).unwrap();
        assert!(matches!(outcome, RejectOutcome::SkippedSpecialEffects));
    }

    #[test]
    fn forced_rebuild_ignores_special_effects_marker() {
        let lvl = two_rooms_joined();
        let bm = build_blockmap(&lvl, false);
        let mut existing = vec![0u8; bits_len(2)];
        set_bit(&mut existing, 2, 0, 0);
        let mut lvl = lvl;
        lvl.reject = existing;
        let cfg = RejectConfig { force: true, ..RejectConfig::default() };
        let outcome = build_reject(&lvl, &bm, &cfg).unwrap();
        assert!(matches!(outcome, RejectOutcome::Built(_)));
    }
}
