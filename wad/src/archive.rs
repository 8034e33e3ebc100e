//! Named byte-blob archive ("WAD"): directory of 8-character names each
//! naming one lump of bytes. Lumps are read fully into memory on load and
//! rewritten as owned buffers, so saving after replacing a lump's bytes
//! never has to worry about shifting offsets of its neighbours — those
//! are recomputed from scratch on every save.

use crate::error::WadError;
use bincode::{Decode, config, decode_from_slice};
use byteorder::{LittleEndian as LE, ReadBytesExt, WriteBytesExt};
use once_cell::sync::Lazy;
use regex::Regex;
use std::{
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    mem,
    path::Path,
};

/// The ordered lump names that make up one level, after its marker.
/// Extended (Hexen-style) levels additionally carry `BEHAVIOR`.
pub const LEVEL_LUMP_NAMES: [&str; 10] = [
    "THINGS", "LINEDEFS", "SIDEDEFS", "VERTEXES", "SEGS", "SSECTORS", "NODES", "SECTORS",
    "REJECT", "BLOCKMAP",
];

static LEVEL_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(E[1-4]M[1-9]|MAP[0-3][0-9])$").unwrap());

#[derive(Clone, Debug)]
struct Lump {
    name: [u8; 8],
    data: Vec<u8>,
}

/// The lump indices that make up one level's mandatory group, in the
/// fixed order `spec.md` §6 defines.
#[derive(Clone, Copy, Debug)]
pub struct LevelGroup {
    pub marker: usize,
    pub things: usize,
    pub linedefs: usize,
    pub sidedefs: usize,
    pub vertexes: usize,
    pub segs: usize,
    pub ssectors: usize,
    pub nodes: usize,
    pub sectors: usize,
    pub reject: usize,
    pub blockmap: usize,
    pub behavior: Option<usize>,
}

/// Entire archive in memory: an ordered list of named lumps.
#[derive(Debug)]
pub struct Wad {
    iwad: bool,
    lumps: Vec<Lump>,
}

impl Wad {
    /// Read an archive fully into memory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, WadError> {
        let mut file = File::open(path)?;

        let mut magic = [0u8; 4];
        file.read_exact(&mut magic)?;
        let iwad = match &magic {
            b"IWAD" => true,
            b"PWAD" => false,
            _ => return Err(WadError::BadMagic),
        };

        let num_lumps = file.read_u32::<LE>()?;
        let dir_offset = file.read_u32::<LE>()?;

        let file_len = file.seek(SeekFrom::End(0))?;
        let dir_end = dir_offset as u64 + num_lumps as u64 * 16;
        if dir_end > file_len {
            return Err(WadError::DirectoryOutOfBounds);
        }

        file.seek(SeekFrom::Start(dir_offset as u64))?;
        let mut dir_bytes = vec![0u8; num_lumps as usize * 16];
        file.read_exact(&mut dir_bytes)?;

        let mut lumps = Vec::with_capacity(num_lumps as usize);
        let mut cur = dir_bytes.as_slice();
        for i in 0..num_lumps as usize {
            let offset = cur.read_u32::<LE>()?;
            let size = cur.read_u32::<LE>()?;
            let mut name = [0u8; 8];
            cur.read_exact(&mut name)?;

            let end = offset as u64 + size as u64;
            if end > file_len {
                return Err(WadError::BadOffset {
                    index: i,
                    name: Self::name_str(&name).into(),
                    offset,
                    size,
                    file_size: file_len as usize,
                });
            }
            file.seek(SeekFrom::Start(offset as u64))?;
            let mut data = vec![0u8; size as usize];
            file.read_exact(&mut data)?;
            lumps.push(Lump { name, data });
        }

        Ok(Self { iwad, lumps })
    }

    /// Re-derive the directory from the current lump list and write the
    /// whole archive back out. Offsets and directory position are
    /// recomputed; the original file's layout is not preserved.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), WadError> {
        let mut file = File::create(path)?;

        file.write_all(if self.iwad { b"IWAD" } else { b"PWAD" })?;
        file.write_u32::<LE>(self.lumps.len() as u32)?;

        let mut cursor = 12u32;
        let mut offsets = Vec::with_capacity(self.lumps.len());
        for lump in &self.lumps {
            offsets.push(cursor);
            cursor += lump.data.len() as u32;
        }
        let dir_offset = cursor;
        file.write_u32::<LE>(dir_offset)?;

        for lump in &self.lumps {
            file.write_all(&lump.data)?;
        }
        for (lump, offset) in self.lumps.iter().zip(&offsets) {
            file.write_u32::<LE>(*offset)?;
            file.write_u32::<LE>(lump.data.len() as u32)?;
            file.write_all(&lump.name)?;
        }
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.lumps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lumps.is_empty()
    }

    /// Trim an 8-byte, NUL-padded lump name to its `&str` view.
    pub fn name_str(name: &[u8; 8]) -> &str {
        let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
        std::str::from_utf8(&name[..end]).unwrap_or("?")
    }

    pub fn lump_name(&self, idx: usize) -> Result<&str, WadError> {
        self.lumps
            .get(idx)
            .map(|l| Self::name_str(&l.name))
            .ok_or(WadError::BadIndex(idx))
    }

    /// Last lump named `name` (case-insensitive, length-bounded to 8),
    /// matching `spec.md` §6's directory lookup rule and the shadowing
    /// convention of later lumps overriding earlier ones of the same name.
    pub fn find_lump(&self, name: &str) -> Option<usize> {
        self.lumps
            .iter()
            .enumerate()
            .rev()
            .find(|(_, l)| Self::name_str(&l.name).eq_ignore_ascii_case(name))
            .map(|(i, _)| i)
    }

    /// Search `self.lumps[start..]` for `name`, matching case-insensitively,
    /// returning the first match. Used to resolve a level's mandatory
    /// lumps within its fixed-order window.
    fn find_lump_from(&self, start: usize, name: &str) -> Option<usize> {
        self.lumps[start..]
            .iter()
            .position(|l| Self::name_str(&l.name).eq_ignore_ascii_case(name))
            .map(|i| i + start)
    }

    pub fn lump_bytes(&self, idx: usize) -> Result<&[u8], WadError> {
        self.lumps
            .get(idx)
            .map(|l| l.data.as_slice())
            .ok_or(WadError::BadIndex(idx))
    }

    /// Replace a lump's bytes in place. The caller is responsible for
    /// encoding; this never changes the lump's name or position.
    pub fn set_lump_bytes(&mut self, idx: usize, data: Vec<u8>) -> Result<(), WadError> {
        let lump = self.lumps.get_mut(idx).ok_or(WadError::BadIndex(idx))?;
        lump.data = data;
        Ok(())
    }

    /// Decode a lump as a packed array of fixed-size little-endian records.
    pub fn lump_to_vec<T: Decode<()>>(&self, idx: usize) -> Result<Vec<T>, WadError> {
        let name = self.lump_name(idx)?.to_owned();
        let bytes = self.lump_bytes(idx)?;
        let elem = mem::size_of::<T>();

        if elem == 0 || bytes.len() % elem != 0 {
            return Err(WadError::BadLumpSize {
                index: idx,
                name,
                size: bytes.len(),
                elem_size: elem,
            });
        }

        let cfg = config::standard()
            .with_fixed_int_encoding()
            .with_little_endian();
        let mut out = Vec::with_capacity(bytes.len() / elem.max(1));
        let mut slice = bytes;
        while !slice.is_empty() {
            let (val, read) = decode_from_slice::<T, _>(slice, cfg).map_err(|_| {
                WadError::BadLumpSize {
                    index: idx,
                    name: name.clone(),
                    size: bytes.len(),
                    elem_size: elem,
                }
            })?;
            out.push(val);
            slice = &slice[read..];
        }
        Ok(out)
    }

    /// Indices of every level marker lump (`ExMy` or `MAPxx`), in archive order.
    pub fn level_indices(&self) -> Vec<usize> {
        self.lumps
            .iter()
            .enumerate()
            .filter(|(_, l)| LEVEL_MARKER.is_match(Self::name_str(&l.name)))
            .map(|(i, _)| i)
            .collect()
    }

    /// Resolve the fixed-order lump group belonging to the level marked
    /// at `marker`. Lumps may appear in any relative order within the
    /// window up to the next marker or end of archive; `BEHAVIOR`'s
    /// presence signals the extended/Hexen format.
    pub fn level_group(&self, marker: usize) -> Result<LevelGroup, WadError> {
        let name = self.lump_name(marker)?.to_owned();
        let window_end = self.lumps[marker + 1..]
            .iter()
            .position(|l| LEVEL_MARKER.is_match(Self::name_str(&l.name)))
            .map(|i| marker + 1 + i)
            .unwrap_or(self.lumps.len());

        let mut resolved = [0usize; 10];
        for (slot, lump_name) in LEVEL_LUMP_NAMES.iter().enumerate() {
            let idx = self
                .find_lump_from(marker + 1, lump_name)
                .filter(|&i| i < window_end)
                .ok_or_else(|| WadError::MissingLevelLump(name.clone(), lump_name))?;
            resolved[slot] = idx;
        }
        let behavior = self
            .find_lump_from(marker + 1, "BEHAVIOR")
            .filter(|&i| i < window_end);

        Ok(LevelGroup {
            marker,
            things: resolved[0],
            linedefs: resolved[1],
            sidedefs: resolved[2],
            vertexes: resolved[3],
            segs: resolved[4],
            ssectors: resolved[5],
            nodes: resolved[6],
            sectors: resolved[7],
            reject: resolved[8],
            blockmap: resolved[9],
            behavior,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::{LittleEndian as LE, WriteBytesExt};
    use std::io::Write as _;

    fn build_test_wad(path: &Path) {
        let mut f = File::create(path).unwrap();
        f.write_all(b"PWAD").unwrap();

        let names: [&[u8; 8]; 2] = [b"E1M1\0\0\0\0", b"LINEDEFS"];
        let datas: [&[u8]; 2] = [&[], &[1, 2, 3, 4]];

        f.write_u32::<LE>(names.len() as u32).unwrap();
        let dir_offset = 12 + datas.iter().map(|d| d.len() as u32).sum::<u32>();
        f.write_u32::<LE>(dir_offset).unwrap();

        for d in &datas {
            f.write_all(d).unwrap();
        }
        let mut offset = 12u32;
        for (name, data) in names.iter().zip(&datas) {
            f.write_u32::<LE>(offset).unwrap();
            f.write_u32::<LE>(data.len() as u32).unwrap();
            f.write_all(*name).unwrap();
            offset += data.len() as u32;
        }
    }

    #[test]
    fn loads_and_finds_lumps() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wad");
        build_test_wad(&path);

        let wad = Wad::from_file(&path).unwrap();
        assert_eq!(wad.len(), 2);
        assert!(!wad.iwad);
        assert_eq!(wad.find_lump("e1m1"), Some(0));
        assert_eq!(wad.lump_bytes(1).unwrap(), &[1, 2, 3, 4]);
    }

    #[test]
    fn level_indices_finds_marker() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wad");
        build_test_wad(&path);

        let wad = Wad::from_file(&path).unwrap();
        assert_eq!(wad.level_indices(), vec![0]);
    }

    #[test]
    fn save_then_reload_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.wad");
        build_test_wad(&path);

        let mut wad = Wad::from_file(&path).unwrap();
        wad.set_lump_bytes(1, vec![9, 9]).unwrap();

        let out_path = dir.path().join("out.wad");
        wad.save_to_file(&out_path).unwrap();

        let reloaded = Wad::from_file(&out_path).unwrap();
        assert_eq!(reloaded.lump_bytes(1).unwrap(), &[9, 9]);
        assert_eq!(reloaded.find_lump("E1M1"), Some(0));
    }
}
