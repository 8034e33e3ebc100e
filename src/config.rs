//! Build configuration: the three option structs `spec.md` §6 exposes,
//! each with the defaults the historical tool shipped.

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockmapConfig {
    pub rebuild: bool,
    pub compress: bool,
}

impl Default for BlockmapConfig {
    fn default() -> Self {
        BlockmapConfig {
            rebuild: true,
            compress: true,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Strategy {
    MinSplits,
    MinDepth,
    MinTime,
}

/// The four split-quality tuning constants from `spec.md` §4.4.3.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SplitTuning {
    pub x1: i32,
    pub x2: i32,
    pub x3: i32,
    pub x4: i32,
}

impl Default for SplitTuning {
    fn default() -> Self {
        SplitTuning {
            x1: 20,
            x2: 10,
            x3: 1,
            x4: 25,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeConfig {
    pub rebuild: bool,
    pub strategy: Strategy,
    pub tuning: SplitTuning,
    pub unique_subsectors: bool,
    pub reduce_linedefs: bool,
    pub ignore_linedef: Vec<bool>,
    pub dont_split: Vec<bool>,
    pub keep_unique: Vec<bool>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        NodeConfig {
            rebuild: true,
            strategy: Strategy::MinSplits,
            tuning: SplitTuning::default(),
            unique_subsectors: false,
            reduce_linedefs: true,
            ignore_linedef: Vec::new(),
            dont_split: Vec::new(),
            keep_unique: Vec::new(),
        }
    }
}

impl NodeConfig {
    pub fn is_ignored(&self, linedef: u16) -> bool {
        self.ignore_linedef
            .get(linedef as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn is_dont_split(&self, linedef: u16) -> bool {
        self.dont_split
            .get(linedef as usize)
            .copied()
            .unwrap_or(false)
    }

    pub fn is_keep_unique(&self, sector: u16) -> bool {
        self.keep_unique
            .get(sector as usize)
            .copied()
            .unwrap_or(false)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RejectConfig {
    pub rebuild: bool,
    pub empty: bool,
    pub force: bool,
    pub use_children: bool,
    pub use_graphs: bool,
}

impl Default for RejectConfig {
    fn default() -> Self {
        RejectConfig {
            rebuild: true,
            empty: false,
            force: false,
            use_children: true,
            use_graphs: true,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct BuildConfig {
    pub blockmap: BlockmapConfig,
    pub nodes: NodeConfig,
    pub reject: RejectConfig,
}
