//! Uniform 128-unit collision grid (`spec.md` §4.3). Rasterizes every
//! linedef into the cells it touches and emits a compact per-cell
//! index table, with optional row/column list sharing.

use crate::level::Level;
use crate::level::records::Linedef;
use smallvec::SmallVec;

pub const CELL_SIZE: i32 = 128;
/// Safety margin subtracted from the minimum vertex coordinate before
/// laying down the grid (`spec.md` §3 invariant).
pub const MARGIN: i32 = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockMapHeader {
    pub x_origin: i16,
    pub y_origin: i16,
    pub columns: u16,
    pub rows: u16,
}

/// A fully decoded blockmap: header plus one linedef-index list per cell,
/// in row-major order. Kept in memory by callers (the reject builder in
/// particular) instead of being re-decoded from the encoded lump bytes.
#[derive(Clone, Debug)]
pub struct BlockMap {
    pub header: BlockMapHeader,
    pub cells: Vec<Vec<u16>>,
}

impl BlockMap {
    pub fn cell(&self, col: i32, row: i32) -> &[u16] {
        if col < 0 || row < 0 || col >= self.header.columns as i32 || row >= self.header.rows as i32
        {
            return &[];
        }
        &self.cells[(row as usize) * (self.header.columns as usize) + col as usize]
    }

    pub fn col_of(&self, x: i32) -> i32 {
        (x - self.header.x_origin as i32) / CELL_SIZE
    }

    pub fn row_of(&self, y: i32) -> i32 {
        (y - self.header.y_origin as i32) / CELL_SIZE
    }
}

/// Rasterize the line from `(x1,y1)` to `(x2,y2)`, in grid-relative
/// integer coordinates, calling `visit(col, row)` once for every cell it
/// touches. Shared verbatim by the blockmap builder and the reject
/// builder's candidate-occluder scan (`spec.md` §4.3, §4.5.3 step 3).
pub fn rasterize_line(x1: i32, y1: i32, x2: i32, y2: i32, mut visit: impl FnMut(i32, i32)) {
    let col = |x: i32| x.div_euclid(CELL_SIZE);
    let row = |y: i32| y.div_euclid(CELL_SIZE);

    if x1 == x2 {
        let c = col(x1);
        let (r0, r1) = if y1 <= y2 { (row(y1), row(y2)) } else { (row(y2), row(y1)) };
        for r in r0..=r1 {
            visit(c, r);
        }
        return;
    }
    if y1 == y2 {
        let r = row(y1);
        let (c0, c1) = if x1 <= x2 { (col(x1), col(x2)) } else { (col(x2), col(x1)) };
        for c in c0..=c1 {
            visit(c, r);
        }
        return;
    }

    // Normalize so dy > 0; the pre-scaled DDA only needs one division per
    // row regardless of travel direction along x.
    let (sx1, sy1, sx2, sy2) = if y1 <= y2 {
        (x1, y1, x2, y2)
    } else {
        (x2, y2, x1, y1)
    };
    let dx = sx2 - sx1;
    let dy = sy2 - sy1;

    let r0 = row(sy1);
    let r1 = row(sy2);
    let mut prev_exit_col = col(sx1);
    for r in r0..=r1 {
        let exit_y = if r == r1 {
            sy2
        } else {
            (r + 1) * CELL_SIZE - 1
        };
        // pre-scaled: multiply dx by the step in y before the single division.
        let exit_x = sx1 + (exit_y - sy1) * dx / dy;
        let exit_col = col(exit_x);
        let (c0, c1) = if prev_exit_col <= exit_col {
            (prev_exit_col, exit_col)
        } else {
            (exit_col, prev_exit_col)
        };
        for c in c0..=c1 {
            visit(c, r);
        }
        prev_exit_col = exit_col;
    }
}

fn touches(linedef: &Linedef, level: &Level, origin_x: i32, origin_y: i32, mut visit: impl FnMut(i32, i32)) {
    let v1 = level.vertices[linedef.v1 as usize];
    let v2 = level.vertices[linedef.v2 as usize];
    rasterize_line(
        v1.x as i32 - origin_x,
        v1.y as i32 - origin_y,
        v2.x as i32 - origin_x,
        v2.y as i32 - origin_y,
        |c, r| visit(c, r),
    );
}

pub fn build_blockmap(level: &Level, compress: bool) -> BlockMap {
    let bbox = level.vertex_bbox();
    let origin_x = bbox.min_x as i32 - MARGIN;
    let origin_y = bbox.min_y as i32 - MARGIN;
    let columns = ((bbox.max_x as i32 - origin_x) / CELL_SIZE + 1).max(1) as u16;
    let rows = ((bbox.max_y as i32 - origin_y) / CELL_SIZE + 1).max(1) as u16;

    let mut cells: Vec<SmallVec<[u16; 8]>> = vec![SmallVec::new(); columns as usize * rows as usize];

    for (idx, ld) in level.linedefs.iter().enumerate() {
        touches(ld, level, origin_x, origin_y, |c, r| {
            if c < 0 || r < 0 || c >= columns as i32 || r >= rows as i32 {
                return;
            }
            let cell = &mut cells[(r as usize) * (columns as usize) + c as usize];
            if cell.last() != Some(&(idx as u16)) {
                cell.push(idx as u16);
            }
        });
    }

    let _ = compress; // compression affects only the encoded byte layout, not this decoded form
    BlockMap {
        header: BlockMapHeader {
            x_origin: origin_x as i16,
            y_origin: origin_y as i16,
            columns,
            rows,
        },
        cells: cells.into_iter().map(|c| c.into_vec()).collect(),
    }
}

/// Encode a built blockmap to its on-disk lump bytes (`spec.md` §6).
/// When `compress` is set, cells with identical contents (including the
/// all-empty cell) share one stored list.
pub fn encode(bm: &BlockMap, compress: bool) -> Vec<u8> {
    let n = bm.cells.len();
    let mut offsets = vec![0u16; n];
    let mut body: Vec<u16> = Vec::new();
    let columns = bm.header.columns as usize;

    // offset already assigned to each processed cell, so a later cell with
    // identical contents (including the all-empty list) can reuse it.
    let mut cell_offset: Vec<Option<u16>> = vec![None; n];

    for i in 0..n {
        let mut shared = None;
        if compress {
            let lo = i.saturating_sub(2 * columns.max(1));
            for j in (lo..i).rev() {
                if bm.cells[j] == bm.cells[i] {
                    shared = cell_offset[j];
                    break;
                }
            }
        }
        let offset = match shared {
            Some(off) => off,
            None => {
                let off = (4 + body.len()) as u16; // header is 4 u16 words
                body.push(0);
                for &line in &bm.cells[i] {
                    body.push(line);
                }
                body.push(0xFFFF);
                off
            }
        };
        cell_offset[i] = Some(offset);
        offsets[i] = offset;
    }

    let mut out = Vec::with_capacity(8 + n * 2 + body.len() * 2);
    out.extend_from_slice(&bm.header.x_origin.to_le_bytes());
    out.extend_from_slice(&bm.header.y_origin.to_le_bytes());
    out.extend_from_slice(&bm.header.columns.to_le_bytes());
    out.extend_from_slice(&bm.header.rows.to_le_bytes());
    for off in &offsets {
        out.extend_from_slice(&off.to_le_bytes());
    }
    for word in &body {
        out.extend_from_slice(&word.to_le_bytes());
    }
    out
}

pub fn decode(bytes: &[u8]) -> Option<BlockMap> {
    if bytes.len() < 8 {
        return None;
    }
    let x_origin = i16::from_le_bytes([bytes[0], bytes[1]]);
    let y_origin = i16::from_le_bytes([bytes[2], bytes[3]]);
    let columns = u16::from_le_bytes([bytes[4], bytes[5]]);
    let rows = u16::from_le_bytes([bytes[6], bytes[7]]);
    let n = columns as usize * rows as usize;

    let words: Vec<u16> = bytes[8..]
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();
    let offsets = &bytes[8..8 + n * 2];
    let offsets: Vec<u16> = offsets
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect();

    let mut cells = Vec::with_capacity(n);
    for &off in &offsets {
        let start = off as usize;
        if start < 4 || start - 4 >= words.len() {
            cells.push(Vec::new());
            continue;
        }
        let mut list = Vec::new();
        let mut i = start - 4 + 1; // skip the leading 0 word
        while i < words.len() && words[i] != 0xFFFF {
            list.push(words[i]);
            i += 1;
        }
        cells.push(list);
    }

    Some(BlockMap {
        header: BlockMapHeader {
            x_origin,
            y_origin,
            columns,
            rows,
        },
        cells,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::tests::square_room;

    #[test]
    fn square_room_blockmap_has_nine_cells() {
        let lvl = square_room();
        let bm = build_blockmap(&lvl, true);
        assert_eq!(bm.header.columns, 3);
        assert_eq!(bm.header.rows, 3);
        assert_eq!(bm.cells.len(), 9);
    }

    #[test]
    fn every_wall_cell_lists_its_linedef() {
        let lvl = square_room();
        let bm = build_blockmap(&lvl, true);
        // bottom-left corner cell must contain both linedefs meeting there.
        let corner = bm.cell(0, 0);
        assert!(corner.contains(&0) || corner.contains(&3));
    }

    #[test]
    fn encode_decode_roundtrip() {
        let lvl = square_room();
        let bm = build_blockmap(&lvl, false);
        let bytes = encode(&bm, false);
        let back = decode(&bytes).unwrap();
        assert_eq!(back.header, bm.header);
        assert_eq!(back.cells, bm.cells);
    }

    #[test]
    fn compression_shares_empty_cell_offset() {
        let lvl = square_room();
        let bm = build_blockmap(&lvl, true);
        let bytes = encode(&bm, true);
        let back = decode(&bytes).unwrap();
        // center cell (1,1) touches no wall in a 1024x1024 room on a
        // 128-grid with an 8-unit margin; it and any other interior
        // empty cell should decode to the same (empty) content.
        let empties: Vec<usize> = back
            .cells
            .iter()
            .enumerate()
            .filter(|(_, c)| c.is_empty())
            .map(|(i, _)| i)
            .collect();
        assert!(empties.len() >= 2);
    }
}
