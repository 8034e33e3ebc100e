//! Per-level `.zen` rules file (`SPEC_FULL.md` §4.6): an INI-like grammar
//! naming linedefs/sectors a level's builders should treat specially.
//! Parsed with `regex` + `once_cell::sync::Lazy` rather than a
//! hand-rolled character-by-character scanner.
//!
//! ```text
//! [E1M1]
//! ignore-linedefs
//! 12,40-45
//! dont-split-sectors
//! !3
//! ```
//!
//! A bare `!` in front of an entry's range list negates it: every index
//! *outside* the listed ranges is selected instead of the ranges
//! themselves. `all` selects every index in the level.

use crate::config::NodeConfig;
use crate::level::Level;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use tracing::warn;

static SECTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\[\s*(.+?)\s*\]$").unwrap());
static SUBSECTION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(ignore-linedefs|dont-split-linedefs|dont-split-sectors|unique-sectors)$").unwrap()
});
static RANGE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d+)(?:-(\d+))?$").unwrap());

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Subsection {
    IgnoreLinedefs,
    DontSplitLinedefs,
    DontSplitSectors,
    UniqueSectors,
}

impl Subsection {
    fn from_str(s: &str) -> Option<Subsection> {
        match s {
            "ignore-linedefs" => Some(Subsection::IgnoreLinedefs),
            "dont-split-linedefs" => Some(Subsection::DontSplitLinedefs),
            "dont-split-sectors" => Some(Subsection::DontSplitSectors),
            "unique-sectors" => Some(Subsection::UniqueSectors),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
struct Entry {
    all: bool,
    negate: bool,
    ranges: Vec<(u32, u32)>,
}

fn parse_entry(line: &str) -> Option<Entry> {
    if line == "all" {
        return Some(Entry { all: true, negate: false, ranges: Vec::new() });
    }
    let (negate, body) = match line.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, line),
    };
    let mut ranges = Vec::new();
    for token in body.split(',') {
        let caps = RANGE_RE.captures(token.trim())?;
        let lo: u32 = caps[1].parse().ok()?;
        let hi: u32 = caps.get(2).map_or(Ok(lo), |m| m.as_str().parse())?;
        if lo > hi {
            return None;
        }
        ranges.push((lo, hi));
    }
    Some(Entry { all: false, negate, ranges })
}

/// Apply a subsection's entries onto a freshly zeroed bitset, sized to
/// the level's actual count. Out-of-range indices are a warning, not a
/// parse error, since the rules file may predate a level edit.
fn apply_entries(entries: &[Entry], bits: &mut [bool], level: &str, subsection: &str) {
    for entry in entries {
        if entry.all {
            bits.fill(true);
            continue;
        }
        let fill = !entry.negate;
        if entry.negate {
            bits.fill(true);
        }
        for &(lo, hi) in &entry.ranges {
            for idx in lo..=hi {
                match bits.get_mut(idx as usize) {
                    Some(b) => *b = fill,
                    None => warn!(level, subsection, index = idx, "rules entry index out of range, ignored"),
                }
            }
        }
    }
}

#[derive(Clone, Debug, Default)]
struct RawLevelRules {
    ignore_linedefs: Vec<Entry>,
    dont_split_linedefs: Vec<Entry>,
    dont_split_sectors: Vec<Entry>,
    unique_sectors: Vec<Entry>,
}

impl RawLevelRules {
    fn push(&mut self, sub: Subsection, entry: Entry) {
        match sub {
            Subsection::IgnoreLinedefs => self.ignore_linedefs.push(entry),
            Subsection::DontSplitLinedefs => self.dont_split_linedefs.push(entry),
            Subsection::DontSplitSectors => self.dont_split_sectors.push(entry),
            Subsection::UniqueSectors => self.unique_sectors.push(entry),
        }
    }
}

/// The resolved, per-level bitsets a `NodeConfig` can be seeded from.
#[derive(Clone, Debug, Default)]
pub struct LevelRules {
    pub ignore_linedefs: Vec<bool>,
    pub dont_split_linedefs: Vec<bool>,
    pub unique_sectors: Vec<bool>,
}

impl LevelRules {
    pub fn apply_to(&self, cfg: &mut NodeConfig) {
        cfg.ignore_linedef = self.ignore_linedefs.clone();
        cfg.dont_split = self.dont_split_linedefs.clone();
        cfg.keep_unique = self.unique_sectors.clone();
    }
}

/// Every level's raw, unresolved rules, keyed by level marker name.
#[derive(Clone, Debug, Default)]
pub struct RuleSet(HashMap<String, RawLevelRules>);

impl RuleSet {
    pub fn empty() -> RuleSet {
        RuleSet(HashMap::new())
    }

    pub fn parse(text: &str) -> RuleSet {
        let mut levels: HashMap<String, RawLevelRules> = HashMap::new();
        let mut current_level: Option<String> = None;
        let mut current_subsection: Option<Subsection> = None;

        for raw_line in text.lines() {
            let line = raw_line.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(caps) = SECTION_RE.captures(line) {
                let name = caps[1].to_string();
                levels.entry(name.clone()).or_default();
                current_level = Some(name);
                current_subsection = None;
                continue;
            }
            if let Some(caps) = SUBSECTION_RE.captures(line) {
                current_subsection = Subsection::from_str(&caps[1]);
                continue;
            }
            let (Some(level), Some(sub)) = (current_level.as_ref(), current_subsection) else {
                warn!(entry = line, "rules entry outside any [level]/subsection, ignored");
                continue;
            };
            let Some(entry) = parse_entry(line) else {
                warn!(entry = line, "unparsable rules entry, ignored");
                continue;
            };
            levels.get_mut(level).unwrap().push(sub, entry);
        }
        RuleSet(levels)
    }

    /// Resolve this level's rules against its real linedef/sector counts,
    /// expanding `dont-split-sectors` into `dont-split-linedefs` via each
    /// linedef's sidedefs (`SPEC_FULL.md` §4.6).
    pub fn resolve(&self, level: &Level) -> LevelRules {
        let linedef_count = level.linedefs.len();
        let sector_count = level.sectors.len();

        let mut ignore_linedefs = vec![false; linedef_count];
        let mut dont_split_linedefs = vec![false; linedef_count];
        let mut unique_sectors = vec![false; sector_count];

        let Some(raw) = self.0.get(&level.name) else {
            return LevelRules { ignore_linedefs, dont_split_linedefs, unique_sectors };
        };

        apply_entries(&raw.ignore_linedefs, &mut ignore_linedefs, &level.name, "ignore-linedefs");
        apply_entries(&raw.dont_split_linedefs, &mut dont_split_linedefs, &level.name, "dont-split-linedefs");
        apply_entries(&raw.unique_sectors, &mut unique_sectors, &level.name, "unique-sectors");

        let mut dont_split_sectors = vec![false; sector_count];
        apply_entries(&raw.dont_split_sectors, &mut dont_split_sectors, &level.name, "dont-split-sectors");
        for (i, ld) in level.linedefs.iter().enumerate() {
            let faces_dont_split = [ld.right, ld.left].into_iter().flatten().any(|sd| {
                dont_split_sectors
                    .get(level.sidedefs[sd as usize].sector as usize)
                    .copied()
                    .unwrap_or(false)
            });
            if faces_dont_split {
                dont_split_linedefs[i] = true;
            }
        }

        LevelRules { ignore_linedefs, dont_split_linedefs, unique_sectors }
    }
}
