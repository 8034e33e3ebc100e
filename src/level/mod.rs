//! Typed view over one level's ten lumps. Tracks a dirty bit per
//! category so only the categories a build actually touched are
//! re-serialized on save.

pub mod codec;
pub mod records;

use crate::geom::BBox;
use bitflags::bitflags;
use records::*;
use std::cell::Cell;
use thiserror::Error;
use wad::{LevelGroup, Wad, WadError};

#[derive(Error, Debug)]
pub enum LevelError {
    #[error(transparent)]
    Wad(#[from] WadError),

    #[error("level {0}: neither classic nor extended THINGS/LINEDEFS layout parses")]
    UnknownFormat(String),

    #[error("level {0}: lump decode failed: {1}")]
    Decode(String, std::io::Error),
}

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct DirtyCategories: u16 {
        const THINGS     = 1 << 0;
        const LINEDEFS   = 1 << 1;
        const SIDEDEFS   = 1 << 2;
        const VERTEXES   = 1 << 3;
        const SECTORS    = 1 << 4;
        const SEGS       = 1 << 5;
        const SUBSECTORS = 1 << 6;
        const NODES      = 1 << 7;
        const REJECT     = 1 << 8;
        const BLOCKMAP   = 1 << 9;
    }
}

/// One level's decoded lumps, plus bookkeeping for incremental saves.
#[derive(Debug)]
pub struct Level {
    pub name: String,
    pub format: Format,

    pub things: Vec<Thing>,
    pub linedefs: Vec<Linedef>,
    pub sidedefs: Vec<Sidedef>,
    pub vertices: Vec<Vertex>,
    pub sectors: Vec<Sector>,
    pub segs: Vec<Seg>,
    pub subsectors: Vec<SubSector>,
    pub nodes: Vec<Node>,
    pub reject: Vec<u8>,
    pub blockmap: Vec<u8>,

    dirty: DirtyCategories,
    valid: Cell<Option<bool>>,
}

/// Guess, then verify, the record layout of one level's THINGS and
/// LINEDEFS lumps (`spec.md` §4.1).
fn detect_format(things: &[u8], linedefs: &[u8]) -> Option<Format> {
    let guess = guess_format(things);
    if verify_format(things, linedefs, guess) {
        return Some(guess);
    }
    let other = match guess {
        Format::Classic => Format::Extended,
        Format::Extended => Format::Classic,
    };
    if verify_format(things, linedefs, other) {
        return Some(other);
    }
    None
}

fn guess_format(things: &[u8]) -> Format {
    if things.is_empty() || things.len() % codec::CLASSIC_THING_SIZE != 0 {
        return Format::Extended;
    }
    let parsed = match codec::decode_things(things, Format::Classic) {
        Ok(t) => t,
        Err(_) => return Format::Extended,
    };
    let n = parsed.len();
    let count_mod_2_even = n % 2 == 0;

    let min_x = parsed.iter().map(|t| t.x).min().unwrap_or(0);
    let zero_x = parsed.iter().filter(|t| t.x == 0).count();
    let zero_type = parsed.iter().filter(|t| t.kind == 0).count();
    let bad_angle = parsed.iter().filter(|t| t.angle % 45 != 0).count();

    let third = n / 3;
    let votes = [
        min_x >= 0,
        zero_x > third,
        zero_type > third,
        bad_angle > third,
    ]
    .iter()
    .filter(|&&v| v)
    .count();

    if count_mod_2_even && votes >= 2 {
        Format::Extended
    } else {
        Format::Classic
    }
}

fn verify_format(things: &[u8], linedefs: &[u8], format: Format) -> bool {
    let thing_size = match format {
        Format::Classic => codec::CLASSIC_THING_SIZE,
        Format::Extended => codec::EXTENDED_THING_SIZE,
    };
    let linedef_size = match format {
        Format::Classic => codec::CLASSIC_LINEDEF_SIZE,
        Format::Extended => codec::EXTENDED_LINEDEF_SIZE,
    };
    if !codec::size_is_multiple_of(things.len(), thing_size) {
        return false;
    }
    if !codec::size_is_multiple_of(linedefs.len(), linedef_size) {
        return false;
    }
    let Ok(parsed) = codec::decode_linedefs(linedefs, format) else {
        return false;
    };
    if format == Format::Extended && parsed.iter().any(|ld| ld.right.is_none()) {
        return false;
    }
    true
}

impl Level {
    /// Load the level whose marker lump is `group.marker`.
    pub fn load(wad: &Wad, group: &LevelGroup) -> Result<Level, LevelError> {
        let name = wad.lump_name(group.marker)?.to_owned();

        let things_bytes = wad.lump_bytes(group.things)?;
        let linedefs_bytes = wad.lump_bytes(group.linedefs)?;
        let format = detect_format(things_bytes, linedefs_bytes)
            .ok_or_else(|| LevelError::UnknownFormat(name.clone()))?;

        let things = codec::decode_things(things_bytes, format)
            .map_err(|e| LevelError::Decode(name.clone(), e))?;
        let linedefs = codec::decode_linedefs(linedefs_bytes, format)
            .map_err(|e| LevelError::Decode(name.clone(), e))?;
        let sidedefs = codec::decode_sidedefs(wad.lump_bytes(group.sidedefs)?)
            .map_err(|e| LevelError::Decode(name.clone(), e))?;
        let vertices = codec::decode_vertexes(wad.lump_bytes(group.vertexes)?)
            .map_err(|e| LevelError::Decode(name.clone(), e))?;
        let segs = codec::decode_segs(wad.lump_bytes(group.segs)?)
            .map_err(|e| LevelError::Decode(name.clone(), e))?;
        let subsectors = codec::decode_subsectors(wad.lump_bytes(group.ssectors)?)
            .map_err(|e| LevelError::Decode(name.clone(), e))?;
        let nodes = codec::decode_nodes(wad.lump_bytes(group.nodes)?)
            .map_err(|e| LevelError::Decode(name.clone(), e))?;
        let sectors = codec::decode_sectors(wad.lump_bytes(group.sectors)?)
            .map_err(|e| LevelError::Decode(name.clone(), e))?;
        let reject = wad.lump_bytes(group.reject)?.to_vec();
        let blockmap = wad.lump_bytes(group.blockmap)?.to_vec();

        Ok(Level {
            name,
            format,
            things,
            linedefs,
            sidedefs,
            vertices,
            sectors,
            segs,
            subsectors,
            nodes,
            reject,
            blockmap,
            dirty: DirtyCategories::empty(),
            valid: Cell::new(None),
        })
    }

    /// Index-range sanity check across LINEDEFS, SIDEDEFS, SEGS,
    /// SSECTORS and NODES. Memoizes its verdict until a dirty bit that
    /// could affect index ranges is set again.
    pub fn is_valid(&self) -> bool {
        if let Some(v) = self.valid.get() {
            return v;
        }
        let v = self.check_valid();
        self.valid.set(Some(v));
        v
    }

    fn check_valid(&self) -> bool {
        let nv = self.vertices.len();
        let ns = self.sidedefs.len();
        let nsec = self.sectors.len();
        let nseg = self.segs.len();

        for ld in &self.linedefs {
            if ld.v1 as usize >= nv || ld.v2 as usize >= nv || ld.v1 == ld.v2 {
                return false;
            }
            if let Some(r) = ld.right {
                if r as usize >= ns {
                    return false;
                }
            } else {
                return false; // every linedef must carry a right side
            }
            if let Some(l) = ld.left {
                if l as usize >= ns {
                    return false;
                }
            }
        }
        for sd in &self.sidedefs {
            if sd.sector as usize >= nsec {
                return false;
            }
        }
        for s in &self.segs {
            if s.v1 as usize >= nv || s.v2 as usize >= nv || s.linedef as usize >= self.linedefs.len()
            {
                return false;
            }
        }
        for ss in &self.subsectors {
            if ss.first as usize + ss.count as usize > nseg {
                return false;
            }
        }
        for n in &self.nodes {
            for &c in &n.child {
                let idx = (c & CHILD_MASK) as usize;
                if c & SUBSECTOR_BIT != 0 {
                    if idx >= self.subsectors.len() {
                        return false;
                    }
                } else if idx >= self.nodes.len() {
                    return false;
                }
            }
        }
        true
    }

    fn mark_dirty(&mut self, cat: DirtyCategories) {
        self.dirty.insert(cat);
        if cat.intersects(
            DirtyCategories::LINEDEFS
                | DirtyCategories::SIDEDEFS
                | DirtyCategories::VERTEXES
                | DirtyCategories::SEGS
                | DirtyCategories::SUBSECTORS
                | DirtyCategories::NODES
                | DirtyCategories::SECTORS,
        ) {
            self.valid.set(None);
        }
    }

    pub fn dirty(&self) -> DirtyCategories {
        self.dirty
    }

    /// Replace vertices if they differ byte-for-byte from the current set.
    pub fn set_vertices(&mut self, vertices: Vec<Vertex>) {
        if vertices != self.vertices {
            self.vertices = vertices;
            self.mark_dirty(DirtyCategories::VERTEXES);
        }
    }

    pub fn set_segs(&mut self, segs: Vec<Seg>) {
        if segs != self.segs {
            self.segs = segs;
            self.mark_dirty(DirtyCategories::SEGS);
        }
    }

    pub fn set_subsectors(&mut self, subsectors: Vec<SubSector>) {
        if subsectors != self.subsectors {
            self.subsectors = subsectors;
            self.mark_dirty(DirtyCategories::SUBSECTORS);
        }
    }

    pub fn set_nodes(&mut self, nodes: Vec<Node>) {
        if nodes != self.nodes {
            self.nodes = nodes;
            self.mark_dirty(DirtyCategories::NODES);
        }
    }

    pub fn set_blockmap(&mut self, data: Vec<u8>) {
        if data != self.blockmap {
            self.blockmap = data;
            self.mark_dirty(DirtyCategories::BLOCKMAP);
        }
    }

    /// Replace the reject table. When `preserve_tail` is set and the new
    /// buffer is the same length as the old one, the unused high bits of
    /// the final byte are copied from the previous value — some archives
    /// stash engine-specific flags there (`spec.md` §4.1, §4.5.6).
    pub fn set_reject(&mut self, mut data: Vec<u8>, preserve_tail: bool) {
        if preserve_tail {
            if let (Some(new_last), Some(&old_last)) = (data.last_mut(), self.reject.last()) {
                if data.len() == self.reject.len() {
                    let used_bits = (self.sectors.len() * self.sectors.len())
                        - (self.reject.len() - 1) * 8;
                    let used_mask: u8 = if used_bits >= 8 {
                        0xFF
                    } else {
                        (1u8 << used_bits) - 1
                    };
                    *new_last = (*new_last & used_mask) | (old_last & !used_mask);
                }
            }
        }
        if data != self.reject {
            self.reject = data;
            self.mark_dirty(DirtyCategories::REJECT);
        }
    }

    /// Discard vertices referenced by nothing (`spec.md` §4.1 "Trim").
    pub fn trim_vertices(&mut self) {
        let mut used = vec![false; self.vertices.len()];
        for ld in &self.linedefs {
            used[ld.v1 as usize] = true;
            used[ld.v2 as usize] = true;
        }
        if !self.segs.is_empty() {
            for s in &self.segs {
                used[s.v1 as usize] = true;
                used[s.v2 as usize] = true;
            }
        }
        if used.iter().all(|&u| u) {
            return;
        }

        let mut remap = vec![0u16; self.vertices.len()];
        let mut kept = Vec::with_capacity(self.vertices.len());
        for (i, &u) in used.iter().enumerate() {
            if u {
                remap[i] = kept.len() as u16;
                kept.push(self.vertices[i]);
            }
        }
        for ld in &mut self.linedefs {
            ld.v1 = remap[ld.v1 as usize];
            ld.v2 = remap[ld.v2 as usize];
        }
        for s in &mut self.segs {
            s.v1 = remap[s.v1 as usize];
            s.v2 = remap[s.v2 as usize];
        }
        self.set_vertices(kept);
    }

    /// Merge vertices sharing identical coordinates (`spec.md` §4.1 "Pack").
    pub fn pack_vertices(&mut self) {
        let mut remap = vec![0u16; self.vertices.len()];
        let mut kept: Vec<Vertex> = Vec::with_capacity(self.vertices.len());
        for (i, v) in self.vertices.iter().enumerate() {
            let existing = kept.iter().position(|k| k.x == v.x && k.y == v.y);
            remap[i] = match existing {
                Some(idx) => idx as u16,
                None => {
                    kept.push(*v);
                    (kept.len() - 1) as u16
                }
            };
        }
        if kept.len() == self.vertices.len() {
            return;
        }
        for ld in &mut self.linedefs {
            ld.v1 = remap[ld.v1 as usize];
            ld.v2 = remap[ld.v2 as usize];
        }
        for s in &mut self.segs {
            s.v1 = remap[s.v1 as usize];
            s.v2 = remap[s.v2 as usize];
        }
        self.set_vertices(kept);
    }

    /// Re-encode every dirty category back into the archive.
    pub fn save(&self, wad: &mut Wad, group: &LevelGroup) -> Result<(), WadError> {
        if self.dirty.contains(DirtyCategories::THINGS) {
            wad.set_lump_bytes(group.things, codec::encode_things(&self.things, self.format))?;
        }
        if self.dirty.contains(DirtyCategories::LINEDEFS) {
            wad.set_lump_bytes(
                group.linedefs,
                codec::encode_linedefs(&self.linedefs, self.format),
            )?;
        }
        if self.dirty.contains(DirtyCategories::SIDEDEFS) {
            wad.set_lump_bytes(group.sidedefs, codec::encode_sidedefs(&self.sidedefs))?;
        }
        if self.dirty.contains(DirtyCategories::VERTEXES) {
            wad.set_lump_bytes(group.vertexes, codec::encode_vertexes(&self.vertices))?;
        }
        if self.dirty.contains(DirtyCategories::SECTORS) {
            wad.set_lump_bytes(group.sectors, codec::encode_sectors(&self.sectors))?;
        }
        if self.dirty.contains(DirtyCategories::SEGS) {
            wad.set_lump_bytes(group.segs, codec::encode_segs(&self.segs))?;
        }
        if self.dirty.contains(DirtyCategories::SUBSECTORS) {
            wad.set_lump_bytes(group.ssectors, codec::encode_subsectors(&self.subsectors))?;
        }
        if self.dirty.contains(DirtyCategories::NODES) {
            wad.set_lump_bytes(group.nodes, codec::encode_nodes(&self.nodes))?;
        }
        if self.dirty.contains(DirtyCategories::REJECT) {
            wad.set_lump_bytes(group.reject, self.reject.clone())?;
        }
        if self.dirty.contains(DirtyCategories::BLOCKMAP) {
            wad.set_lump_bytes(group.blockmap, self.blockmap.clone())?;
        }
        Ok(())
    }

    /// Overall bounding box of every vertex (used to seed the blockmap grid).
    pub fn vertex_bbox(&self) -> BBox {
        BBox::from_points(self.vertices.iter().map(|v| (v.x, v.y)))
    }

    /// Best-effort human-readable title for this level's marker, read
    /// from an optional `MAPINFO` text lump elsewhere in the archive
    /// (`SPEC_FULL.md` §4.1). Used only for progress/log lines; absence
    /// of `MAPINFO`, or of an entry for this marker, is not an error.
    pub fn lookup_title(&self, wad: &Wad) -> Option<String> {
        let idx = wad.find_lump("MAPINFO")?;
        let text = std::str::from_utf8(wad.lump_bytes(idx).ok()?).ok()?;
        for line in text.lines() {
            let line = line.trim();
            let Some(rest) = line.strip_prefix("map ") else {
                continue;
            };
            let rest = rest.trim_start();
            if !rest.eq_ignore_ascii_case(&self.name)
                && !rest
                    .split_whitespace()
                    .next()
                    .is_some_and(|tok| tok.eq_ignore_ascii_case(&self.name))
            {
                continue;
            }
            if let Some(start) = line.find('"') {
                if let Some(end) = line[start + 1..].find('"') {
                    return Some(line[start + 1..start + 1 + end].to_string());
                }
            }
        }
        None
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    /// A single-sector square room, four one-sided linedefs
    /// (`spec.md` §8 end-to-end scenario 1).
    pub fn square_room() -> Level {
        let vertices = vec![
            Vertex { x: 0, y: 0 },
            Vertex { x: 1024, y: 0 },
            Vertex { x: 1024, y: 1024 },
            Vertex { x: 0, y: 1024 },
        ];
        let sidedefs = vec![
            Sidedef {
                x_off: 0,
                y_off: 0,
                upper: *b"-\0\0\0\0\0\0\0",
                lower: *b"-\0\0\0\0\0\0\0",
                middle: *b"WALL1\0\0\0",
                sector: 0,
            };
            4
        ];
        let linedefs = (0..4)
            .map(|i| Linedef {
                v1: i,
                v2: (i + 1) % 4,
                flags: 1,
                kind: LinedefKind::Classic {
                    special: 0,
                    tag: 0,
                },
                right: Some(i),
                left: None,
            })
            .collect();
        let sectors = vec![Sector {
            floor_h: 0,
            ceil_h: 128,
            floor_tex: *b"FLOOR\0\0\0",
            ceil_tex: *b"CEIL\0\0\0\0",
            light: 160,
            special: 0,
            tag: 0,
        }];
        Level {
            name: "TESTMAP".into(),
            format: Format::Classic,
            things: vec![],
            linedefs,
            sidedefs,
            vertices,
            sectors,
            segs: vec![],
            subsectors: vec![],
            nodes: vec![],
            reject: vec![0],
            blockmap: vec![],
            dirty: DirtyCategories::empty(),
            valid: Cell::new(None),
        }
    }

    fn sector_stub() -> Sector {
        Sector {
            floor_h: 0,
            ceil_h: 128,
            floor_tex: *b"FLOOR\0\0\0",
            ceil_tex: *b"CEIL\0\0\0\0",
            light: 160,
            special: 0,
            tag: 0,
        }
    }

    fn wall_sidedef(sector: u16) -> Sidedef {
        Sidedef {
            x_off: 0,
            y_off: 0,
            upper: *b"-\0\0\0\0\0\0\0",
            lower: *b"-\0\0\0\0\0\0\0",
            middle: *b"WALL1\0\0\0",
            sector,
        }
    }

    fn push_solid(sector: u16, v1: u16, v2: u16, sidedefs: &mut Vec<Sidedef>, linedefs: &mut Vec<Linedef>) {
        let s = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(sector));
        linedefs.push(classic_linedef(v1, v2, s, None));
    }

    fn classic_linedef(v1: u16, v2: u16, right: u16, left: Option<u16>) -> Linedef {
        Linedef {
            v1,
            v2,
            flags: 1,
            kind: LinedefKind::Classic { special: 0, tag: 0 },
            right: Some(right),
            left,
        }
    }

    fn bare_level(name: &str, vertices: Vec<Vertex>, sidedefs: Vec<Sidedef>, linedefs: Vec<Linedef>, sectors: Vec<Sector>) -> Level {
        Level {
            name: name.into(),
            format: Format::Classic,
            things: vec![],
            linedefs,
            sidedefs,
            vertices,
            sectors,
            segs: vec![],
            subsectors: vec![],
            nodes: vec![],
            reject: vec![0; 1],
            blockmap: vec![],
            dirty: DirtyCategories::empty(),
            valid: Cell::new(None),
        }
    }

    /// Two square rooms sharing one two-sided wall (`spec.md` §8 scenario 2).
    pub fn two_rooms_joined() -> Level {
        let vertices = vec![
            Vertex { x: 0, y: 0 },
            Vertex { x: 1024, y: 0 },
            Vertex { x: 1024, y: 1024 },
            Vertex { x: 0, y: 1024 },
            Vertex { x: 2048, y: 0 },
            Vertex { x: 2048, y: 1024 },
        ];
        let mut sidedefs = Vec::new();
        let mut linedefs = Vec::new();

        let s0 = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(0));
        linedefs.push(classic_linedef(0, 1, s0, None)); // south A

        let s1r = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(0));
        let s1l = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(1));
        linedefs.push(classic_linedef(1, 2, s1r, Some(s1l))); // shared A/B wall

        let s2 = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(0));
        linedefs.push(classic_linedef(2, 3, s2, None)); // north A

        let s3 = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(0));
        linedefs.push(classic_linedef(3, 0, s3, None)); // west A

        let s4 = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(1));
        linedefs.push(classic_linedef(1, 4, s4, None)); // south B

        let s5 = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(1));
        linedefs.push(classic_linedef(4, 5, s5, None)); // east B

        let s6 = sidedefs.len() as u16;
        sidedefs.push(wall_sidedef(1));
        linedefs.push(classic_linedef(5, 2, s6, None)); // north B

        let sectors = vec![sector_stub(), sector_stub()];
        bare_level("JOINED", vertices, sidedefs, linedefs, sectors)
    }

    /// Two disjoint square rooms, no connecting linedef at all
    /// (`spec.md` §8 scenario 3).
    pub fn two_rooms_separated() -> Level {
        let vertices = vec![
            Vertex { x: 0, y: 0 },
            Vertex { x: 1024, y: 0 },
            Vertex { x: 1024, y: 1024 },
            Vertex { x: 0, y: 1024 },
            Vertex { x: 4096, y: 0 },
            Vertex { x: 5120, y: 0 },
            Vertex { x: 5120, y: 1024 },
            Vertex { x: 4096, y: 1024 },
        ];
        let mut sidedefs = Vec::new();
        let mut linedefs = Vec::new();
        for (sector, base) in [(0u16, 0u16), (1u16, 4u16)] {
            for i in 0..4u16 {
                let s = sidedefs.len() as u16;
                sidedefs.push(wall_sidedef(sector));
                linedefs.push(classic_linedef(base + i, base + (i + 1) % 4, s, None));
            }
        }
        let sectors = vec![sector_stub(), sector_stub()];
        bare_level("SEPARATED", vertices, sidedefs, linedefs, sectors)
    }

    /// Three sectors `A-B-C`: `B` is an otherwise-rectangular room with an
    /// interior pillar linedef that blocks every straight sight line
    /// between the `A` doorway (west wall) and the `C` doorway (east
    /// wall), so `A` and `C` are not directly visible (`spec.md` §8
    /// scenario 4).
    pub fn three_room_chain() -> Level {
        let vertices = vec![
            Vertex { x: -300, y: 0 },   // 0
            Vertex { x: 0, y: 0 },      // 1
            Vertex { x: 0, y: 300 },    // 2
            Vertex { x: -300, y: 300 }, // 3
            Vertex { x: 300, y: 0 },    // 4
            Vertex { x: 300, y: 300 },  // 5
            Vertex { x: 600, y: 0 },    // 6
            Vertex { x: 600, y: 300 },  // 7
            Vertex { x: 150, y: -200 }, // 8 (pillar)
            Vertex { x: 150, y: 500 },  // 9 (pillar)
        ];
        let mut sidedefs = Vec::new();
        let mut linedefs = Vec::new();

        push_solid(0, 0, 1, &mut sidedefs, &mut linedefs); // south A
        {
            let r = sidedefs.len() as u16;
            sidedefs.push(wall_sidedef(0));
            let l = sidedefs.len() as u16;
            sidedefs.push(wall_sidedef(1));
            linedefs.push(classic_linedef(1, 2, r, Some(l))); // shared A/B (west B wall)
        }
        push_solid(0, 2, 3, &mut sidedefs, &mut linedefs); // north A
        push_solid(0, 3, 0, &mut sidedefs, &mut linedefs); // west A

        push_solid(1, 1, 4, &mut sidedefs, &mut linedefs); // south B
        {
            let r = sidedefs.len() as u16;
            sidedefs.push(wall_sidedef(1));
            let l = sidedefs.len() as u16;
            sidedefs.push(wall_sidedef(2));
            linedefs.push(classic_linedef(4, 5, r, Some(l))); // shared B/C (east B wall)
        }
        push_solid(1, 5, 2, &mut sidedefs, &mut linedefs); // north B
        push_solid(1, 8, 9, &mut sidedefs, &mut linedefs); // interior pillar, blocks B's middle

        push_solid(2, 4, 6, &mut sidedefs, &mut linedefs); // south C
        push_solid(2, 6, 7, &mut sidedefs, &mut linedefs); // east C
        push_solid(2, 7, 5, &mut sidedefs, &mut linedefs); // north C

        let sectors = vec![sector_stub(), sector_stub(), sector_stub()];
        bare_level("CHAIN", vertices, sidedefs, linedefs, sectors)
    }

    /// Convex pentagon room with a two-sided slit into an adjacent
    /// triangle (`spec.md` §8 scenario 5).
    pub fn pentagon_with_slit() -> Level {
        let vertices = vec![
            Vertex { x: 0, y: 0 },
            Vertex { x: 512, y: -256 },
            Vertex { x: 1024, y: 0 },
            Vertex { x: 1024, y: 768 },
            Vertex { x: 0, y: 768 },
            Vertex { x: 1536, y: 384 }, // triangle apex
        ];
        let mut sidedefs = Vec::new();
        let mut linedefs = Vec::new();

        push_solid(0, 0, 1, &mut sidedefs, &mut linedefs);
        push_solid(0, 1, 2, &mut sidedefs, &mut linedefs);
        // the slit: shared wall between the pentagon (sector 0) and the
        // adjacent triangle (sector 1).
        {
            let r = sidedefs.len() as u16;
            sidedefs.push(wall_sidedef(0));
            let l = sidedefs.len() as u16;
            sidedefs.push(wall_sidedef(1));
            linedefs.push(classic_linedef(2, 3, r, Some(l)));
        }
        push_solid(0, 3, 4, &mut sidedefs, &mut linedefs);
        push_solid(0, 4, 0, &mut sidedefs, &mut linedefs);
        push_solid(1, 3, 5, &mut sidedefs, &mut linedefs);
        push_solid(1, 5, 2, &mut sidedefs, &mut linedefs);

        let sectors = vec![sector_stub(), sector_stub()];
        bare_level("PENTAGON", vertices, sidedefs, linedefs, sectors)
    }

    /// A zero-length linedef and a duplicate vertex, for the trim/pack
    /// idempotence scenario (`spec.md` §8 scenario 6).
    pub fn degenerate_level() -> Level {
        let mut lvl = square_room();
        // duplicate vertex 0 at index 4, referenced by nothing yet.
        lvl.vertices.push(Vertex { x: 0, y: 0 });
        // zero-length linedef between the duplicate and itself.
        let s = lvl.sidedefs.len() as u16;
        lvl.sidedefs.push(wall_sidedef(0));
        lvl.linedefs.push(classic_linedef(4, 4, s, None));
        lvl
    }

    #[test]
    fn square_room_is_valid() {
        assert!(square_room().is_valid());
    }

    #[test]
    fn two_rooms_joined_is_valid() {
        assert!(two_rooms_joined().is_valid());
    }

    #[test]
    fn three_room_chain_is_valid() {
        assert!(three_room_chain().is_valid());
    }

    #[test]
    fn setter_suppresses_write_on_equal_data() {
        let mut lvl = square_room();
        let verts = lvl.vertices.clone();
        lvl.set_vertices(verts);
        assert!(!lvl.dirty().contains(DirtyCategories::VERTEXES));
    }

    #[test]
    fn trim_drops_unreferenced_vertex() {
        let mut lvl = square_room();
        lvl.vertices.push(Vertex { x: 999, y: 999 });
        lvl.trim_vertices();
        assert_eq!(lvl.vertices.len(), 4);
        assert!(lvl.dirty().contains(DirtyCategories::VERTEXES));
    }

    #[test]
    fn pack_merges_duplicate_vertex() {
        let mut lvl = square_room();
        lvl.vertices.push(Vertex { x: 0, y: 0 });
        lvl.linedefs.push(Linedef {
            v1: 4,
            v2: 1,
            flags: 1,
            kind: LinedefKind::Classic {
                special: 0,
                tag: 0,
            },
            right: Some(0),
            left: None,
        });
        lvl.pack_vertices();
        assert_eq!(lvl.vertices.len(), 4);
        assert_eq!(lvl.linedefs.last().unwrap().v1, 0);
    }

    #[test]
    fn reject_preserve_tail_keeps_unused_bits() {
        let mut lvl = square_room();
        lvl.reject = vec![0b1010_0000];
        lvl.set_reject(vec![0b0000_0001], true);
        assert_eq!(lvl.reject[0] & 0b0000_0001, 1); // used bit taken from the new data
        assert_eq!(lvl.reject[0] & 0b1000_0000, 0b1000_0000); // padding bit preserved from the old value
    }

    fn write_test_wad(path: &std::path::Path, lumps: &[(&str, &[u8])]) {
        use byteorder::{LittleEndian as LE, WriteBytesExt};
        use std::io::Write;

        let mut f = std::fs::File::create(path).unwrap();
        f.write_all(b"PWAD").unwrap();
        f.write_u32::<LE>(lumps.len() as u32).unwrap();
        let dir_offset = 12 + lumps.iter().map(|(_, d)| d.len() as u32).sum::<u32>();
        f.write_u32::<LE>(dir_offset).unwrap();
        for (_, data) in lumps {
            f.write_all(data).unwrap();
        }
        let mut offset = 12u32;
        for (name, data) in lumps {
            f.write_u32::<LE>(offset).unwrap();
            f.write_u32::<LE>(data.len() as u32).unwrap();
            let mut padded = [0u8; 8];
            padded[..name.len()].copy_from_slice(name.as_bytes());
            f.write_all(&padded).unwrap();
            offset += data.len() as u32;
        }
    }

    #[test]
    fn lookup_title_finds_quoted_name_for_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wad");
        let mapinfo = b"map TESTMAP \"Hangar\"\nmap E1M2 \"Nuclear Plant\"\n";
        write_test_wad(&path, &[("MAPINFO", mapinfo)]);
        let wad = Wad::from_file(&path).unwrap();

        let lvl = square_room();
        assert_eq!(lvl.lookup_title(&wad).as_deref(), Some("Hangar"));
    }

    #[test]
    fn lookup_title_absent_mapinfo_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wad");
        write_test_wad(&path, &[("LINEDEFS", &[1, 2, 3, 4])]);
        let wad = Wad::from_file(&path).unwrap();

        let lvl = square_room();
        assert!(lvl.lookup_title(&wad).is_none());
    }
}
