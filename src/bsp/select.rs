//! Partition-candidate scoring (`spec.md` §4.4.3): the three selector
//! strategies, each built on the same left/right/split classification.

use super::{PartitionContext, WorkSeg, compute_static_variables};
use crate::config::{NodeConfig, Strategy};
use crate::geom::Orientation;
use std::collections::HashSet;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub(crate) enum Class {
    Left,
    Right,
    Split,
}

pub(crate) fn classify(ctx: &PartitionContext, seg: &WorkSeg) -> Class {
    let o1 = crate::geom::orient(ctx.origin, ctx.dir, seg.p1());
    let o2 = crate::geom::orient(ctx.origin, ctx.dir, seg.p2());
    match (o1, o2) {
        (Orientation::On, Orientation::On) => {
            if ctx.dir.dot(seg.p2() - seg.p1()) >= 0.0 {
                Class::Right
            } else {
                Class::Left
            }
        }
        (Orientation::Right, Orientation::Right)
        | (Orientation::On, Orientation::Right)
        | (Orientation::Right, Orientation::On) => Class::Right,
        (Orientation::Left, Orientation::Left)
        | (Orientation::On, Orientation::Left)
        | (Orientation::Left, Orientation::On) => Class::Left,
        (Orientation::Right, Orientation::Left) | (Orientation::Left, Orientation::Right) => {
            Class::Split
        }
    }
}

struct Tally {
    left: u32,
    right: u32,
    splits: u32,
    left_sectors: HashSet<u16>,
    right_sectors: HashSet<u16>,
    split_sectors: HashSet<u16>,
    splits_dont_split: bool,
}

fn tally(ctx: &PartitionContext, segs: &[WorkSeg], cfg: &NodeConfig) -> Tally {
    let mut t = Tally {
        left: 0,
        right: 0,
        splits: 0,
        left_sectors: HashSet::new(),
        right_sectors: HashSet::new(),
        split_sectors: HashSet::new(),
        splits_dont_split: false,
    };
    for seg in segs {
        match classify(ctx, seg) {
            Class::Right => {
                t.right += 1;
                t.right_sectors.insert(seg.sector);
            }
            Class::Left => {
                t.left += 1;
                t.left_sectors.insert(seg.sector);
            }
            Class::Split => {
                t.splits += 1;
                t.split_sectors.insert(seg.sector);
                if cfg.is_dont_split(seg.linedef) {
                    t.splits_dont_split = true;
                }
            }
        }
    }
    t
}

fn is_boundary(t: &Tally) -> bool {
    t.splits == 0 && (t.left == 0 || t.right == 0)
}

/// Candidates: one representative seg per not-yet-disqualified alias,
/// in first-occurrence order.
fn candidates<'a>(segs: &'a [WorkSeg], convex: &[i32]) -> Vec<&'a WorkSeg> {
    let mut seen = Vec::new();
    let mut out = Vec::new();
    for s in segs {
        if convex.contains(&s.alias) || seen.contains(&s.alias) {
            continue;
        }
        seen.push(s.alias);
        out.push(s);
    }
    out
}

fn score_a(t: &Tally, ctx: &PartitionContext, cfg: &NodeConfig) -> f64 {
    let mut score = (t.left * t.right) as f64;
    if t.splits > 0 {
        let splits = t.splits as i64;
        let tuning = &cfg.tuning;
        let denom = (((tuning.x1 as i64 * splits) / tuning.x2.max(1) as i64).max(1)) as f64;
        score /= denom;
        score -= ((tuning.x3 as i64 * splits + tuning.x4 as i64) * splits) as f64;
    }
    if ctx.dir.x != 0.0 && ctx.dir.y != 0.0 {
        score -= 1.0;
    }
    score
}

/// Strategy A / C shared scan: returns the best scoring valid candidate
/// among `window`, plus every boundary-disqualified alias encountered.
fn best_in_window(
    window: &[&WorkSeg],
    segs: &[WorkSeg],
    cfg: &NodeConfig,
) -> (Option<(PartitionContext, f64)>, Vec<i32>) {
    let n = segs.len() as u64;
    let max_product = (n / 2) * (n - n / 2);

    let mut best: Option<(PartitionContext, f64)> = None;
    let mut pushed = Vec::new();

    for cand in window {
        let ctx = compute_static_variables(cand);
        let t = tally(&ctx, segs, cfg);
        if is_boundary(&t) {
            pushed.push(ctx.alias);
            continue;
        }
        if t.splits == 0 && (t.left as u64) * (t.right as u64) == max_product {
            return (Some((ctx, f64::INFINITY)), pushed);
        }
        let s = score_a(&t, &ctx, cfg);
        if best.as_ref().map_or(true, |(_, best_s)| s > *best_s) {
            best = Some((ctx, s));
        }
    }
    (best, pushed)
}

fn strategy_min_splits(
    segs: &[WorkSeg],
    cfg: &NodeConfig,
    convex: &[i32],
) -> Option<(PartitionContext, Vec<i32>)> {
    let cands = candidates(segs, convex);
    let (best, pushed) = best_in_window(&cands, segs, cfg);
    best.map(|(ctx, _)| (ctx, pushed))
}

fn strategy_min_time(
    segs: &[WorkSeg],
    cfg: &NodeConfig,
    convex: &[i32],
) -> Option<(PartitionContext, Vec<i32>)> {
    let cands = candidates(segs, convex);
    let mut window_size = 30usize.min(cands.len());
    loop {
        let window = &cands[..window_size];
        let (best, pushed) = best_in_window(window, segs, cfg);
        if best.is_some() || window_size >= cands.len() {
            return best.map(|(ctx, _)| (ctx, pushed));
        }
        window_size = (window_size + 5).min(cands.len());
    }
}

/// `spec.md` §4.4.3 Strategy B: a candidate that would split a
/// don't-split linedef is never preferred over one that wouldn't, but it
/// is still kept as a last-resort pick rather than dropped outright — a
/// subtree whose only candidates all split a protected line must still
/// pick the best of them instead of being emitted as a non-convex leaf.
fn strategy_min_depth(
    segs: &[WorkSeg],
    cfg: &NodeConfig,
    convex: &[i32],
) -> Option<(PartitionContext, Vec<i32>)> {
    let cands = candidates(segs, convex);
    let mut pushed = Vec::new();
    let mut entries: Vec<(usize, PartitionContext, u64, u64, bool)> = Vec::new();

    for (i, cand) in cands.iter().enumerate() {
        let ctx = compute_static_variables(cand);
        let t = tally(&ctx, segs, cfg);
        if is_boundary(&t) {
            pushed.push(ctx.alias);
            continue;
        }
        let metric1 = ((t.left + t.splits) as u64) * ((t.right + t.splits) as u64);
        let metric2 = ((t.left_sectors.len() + t.split_sectors.len()) as u64)
            * ((t.right_sectors.len() + t.split_sectors.len()) as u64);
        entries.push((i, ctx, metric1, metric2, t.splits_dont_split));
    }
    if entries.is_empty() {
        return None;
    }

    // Ranking by `(invalid, metric, i)` puts every valid entry ahead of
    // every invalid one regardless of metric value, so a summed rank
    // below can never favor an invalid candidate over a valid one.
    let mut by_metric1 = entries.clone();
    by_metric1.sort_by_key(|(i, _, m1, _, invalid)| (*invalid, *m1, *i));
    let mut rank1 = vec![0usize; entries.len()];
    for (rank, (orig_pos, ..)) in by_metric1.iter().enumerate() {
        let pos = entries.iter().position(|(i, ..)| i == orig_pos).unwrap();
        rank1[pos] = rank;
    }

    let mut by_metric2 = entries.clone();
    by_metric2.sort_by_key(|(i, _, _, m2, invalid)| (*invalid, *m2, *i));
    let mut rank2 = vec![0usize; entries.len()];
    for (rank, (orig_pos, ..)) in by_metric2.iter().enumerate() {
        let pos = entries.iter().position(|(i, ..)| i == orig_pos).unwrap();
        rank2[pos] = rank;
    }

    let mut best_idx = 0;
    let mut best_sum = usize::MAX;
    for (pos, (i, ..)) in entries.iter().enumerate() {
        let sum = rank1[pos] + rank2[pos];
        if sum < best_sum || (sum == best_sum && *i < entries[best_idx].0) {
            best_sum = sum;
            best_idx = pos;
        }
    }
    Some((entries[best_idx].1, pushed))
}

pub fn choose_partition(
    segs: &[WorkSeg],
    cfg: &NodeConfig,
    convex: &[i32],
) -> Option<(PartitionContext, Vec<i32>)> {
    if segs.len() < 2 {
        return None;
    }
    match cfg.strategy {
        Strategy::MinSplits => strategy_min_splits(segs, cfg, convex),
        Strategy::MinTime => strategy_min_time(segs, cfg, convex),
        Strategy::MinDepth => strategy_min_depth(segs, cfg, convex),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bsp::build_initial_segs_for_test;
    use crate::level::tests::square_room;

    #[test]
    fn square_room_has_no_interior_partition() {
        let lvl = square_room();
        let aliases = crate::bsp::alias::compute_aliases(&lvl);
        let cfg = NodeConfig::default();
        let segs = build_initial_segs_for_test(&lvl, &aliases, &cfg);
        assert!(choose_partition(&segs, &cfg, &[]).is_none());
    }

    #[test]
    fn pentagon_with_slit_splits_at_most_twice() {
        // Convex pentagon room with a two-sided slit into an adjacent
        // triangle (`spec.md` §8 scenario 5); MinSplits should resolve the
        // whole thing in a handful of partitions.
        use crate::bsp::build_nodes;

        let lvl = crate::level::tests::pentagon_with_slit();
        let cfg = NodeConfig::default();
        let (_v, _segs, subsectors, nodes) = build_nodes(&lvl, &cfg).unwrap();
        assert!(nodes.len() <= 3);
        assert!(!subsectors.is_empty());
    }
}
