//! `zennode_rs`: level model, geometry primitives, and the three
//! builders (blockmap, BSP, reject) that regenerate a level's derived
//! rendering/collision/visibility lumps. See `bin/zennode.rs` for the
//! CLI driver that wires these against real archives on disk.

pub mod blockmap;
pub mod bsp;
pub mod config;
pub mod geom;
pub mod level;
pub mod reject;
pub mod rules;
