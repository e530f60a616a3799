//! QuadtreeFile - random-access on-disk tile store.
//!
//! Byte-level layout, frozen at build time (all integers and floats
//! little-endian):
//!
//! ```text
//! FileHeader:
//!   magic      b"QTF1"     (4)
//!   kind       u8          (1)  0 = elevation, 1 = color
//!   reserved   [u8; 3]     (3)  zero
//!   resolution u32         (4)  samples per tile edge, must be 33
//!   patches    u32         (4)  number of patch roots P
//!   roots      [u32; P]         tile offset of each patch root
//!
//! TileRecord (elevation):
//!   min f32, max f32
//!   samples  [f32; R*R]         row-major, lower row first
//!   children [u32; 4]           tile offsets, 0xFFFF_FFFF = no child
//!
//! TileRecord (color):
//!   samples  [[u8; 3]; R*R]
//!   children [u32; 4]
//! ```
//!
//! Tile offsets address fixed-size records after the header; the mapping
//! from tree position to offset is established by walking from the root via
//! the stored child offsets.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::marker::PhantomData;
use std::path::Path;

use crate::constants::{TILE_RESOLUTION, TILE_SAMPLES};
use crate::error::{GlobeError, Result};

const MAGIC: [u8; 4] = *b"QTF1";

/// Offset of a tile record within a quadtree file. This is the on-disk
/// addressing scheme; the hierarchical name of a node is `TreeIndex`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
pub struct TileIndex(pub u32);

impl TileIndex {
  /// Sentinel marking "no tile on disk".
  pub const INVALID: TileIndex = TileIndex(0xFFFF_FFFF);

  pub fn is_valid(&self) -> bool {
    *self != Self::INVALID
  }
}

impl Default for TileIndex {
  fn default() -> Self {
    Self::INVALID
  }
}

/// Per-tile header of an elevation tile: the sample value range.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ElevationRange {
  pub min: f32,
  pub max: f32,
}

impl Default for ElevationRange {
  fn default() -> Self {
    Self { min: 0.0, max: 0.0 }
  }
}

/// Static description of one data layer stored in a quadtree file.
pub trait TileLayer {
  type Sample: Copy + Default + PartialEq + std::fmt::Debug;
  type TileHeader: Copy + Default + PartialEq + std::fmt::Debug;

  /// Layer tag in the file header.
  const KIND: u8;
  const SAMPLE_SIZE: usize;
  const HEADER_SIZE: usize;

  fn decode_header(bytes: &[u8]) -> Self::TileHeader;
  fn encode_header(header: &Self::TileHeader, out: &mut Vec<u8>);
  fn decode_sample(bytes: &[u8]) -> Self::Sample;
  fn encode_sample(sample: &Self::Sample, out: &mut Vec<u8>);
}

/// Digital elevation layer: one f32 per sample, `(min, max)` tile header.
pub enum DemLayer {}

impl TileLayer for DemLayer {
  type Sample = f32;
  type TileHeader = ElevationRange;

  const KIND: u8 = 0;
  const SAMPLE_SIZE: usize = 4;
  const HEADER_SIZE: usize = 8;

  fn decode_header(bytes: &[u8]) -> ElevationRange {
    ElevationRange {
      min: get_f32(bytes, 0),
      max: get_f32(bytes, 4),
    }
  }

  fn encode_header(header: &ElevationRange, out: &mut Vec<u8>) {
    out.extend_from_slice(&header.min.to_le_bytes());
    out.extend_from_slice(&header.max.to_le_bytes());
  }

  fn decode_sample(bytes: &[u8]) -> f32 {
    get_f32(bytes, 0)
  }

  fn encode_sample(sample: &f32, out: &mut Vec<u8>) {
    out.extend_from_slice(&sample.to_le_bytes());
  }
}

/// Color imagery layer: three bytes per sample, empty tile header.
pub enum ColorLayer {}

impl TileLayer for ColorLayer {
  type Sample = [u8; 3];
  type TileHeader = ();

  const KIND: u8 = 1;
  const SAMPLE_SIZE: usize = 3;
  const HEADER_SIZE: usize = 0;

  fn decode_header(_bytes: &[u8]) {}

  fn encode_header(_header: &(), _out: &mut Vec<u8>) {}

  fn decode_sample(bytes: &[u8]) -> [u8; 3] {
    [bytes[0], bytes[1], bytes[2]]
  }

  fn encode_sample(sample: &[u8; 3], out: &mut Vec<u8>) {
    out.extend_from_slice(sample);
  }
}

/// One decoded tile record.
pub struct TileRecord<L: TileLayer> {
  pub header: L::TileHeader,
  /// `TILE_SAMPLES` values, row-major, lower row first.
  pub samples: Vec<L::Sample>,
  /// On-disk offsets of the four children.
  pub children: [TileIndex; 4],
}

impl<L: TileLayer> TileRecord<L> {
  /// Record with default header, uniform samples and no children.
  pub fn flat(value: L::Sample) -> Self {
    Self {
      header: L::TileHeader::default(),
      samples: vec![value; TILE_SAMPLES],
      children: [TileIndex::INVALID; 4],
    }
  }
}

// Manual impls: the derives would put bounds on the (uninhabited) layer
// marker type instead of the associated sample and header types.
impl<L: TileLayer> Clone for TileRecord<L> {
  fn clone(&self) -> Self {
    Self {
      header: self.header,
      samples: self.samples.clone(),
      children: self.children,
    }
  }
}

impl<L: TileLayer> PartialEq for TileRecord<L> {
  fn eq(&self, other: &Self) -> bool {
    self.header == other.header
      && self.samples == other.samples
      && self.children == other.children
  }
}

impl<L: TileLayer> std::fmt::Debug for TileRecord<L> {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("TileRecord")
      .field("header", &self.header)
      .field("samples", &self.samples.len())
      .field("children", &self.children)
      .finish()
  }
}

/// Random-access tile store for one layer.
pub struct QuadtreeFile<L: TileLayer> {
  file: File,
  num_patches: u32,
  roots: Vec<TileIndex>,
  num_tiles: u32,
  _layer: PhantomData<L>,
}

impl<L: TileLayer> QuadtreeFile<L> {
  const fn record_size() -> usize {
    L::HEADER_SIZE + TILE_SAMPLES * L::SAMPLE_SIZE + 4 * 4
  }

  fn header_size(num_patches: u32) -> u64 {
    (4 + 1 + 3 + 4 + 4) as u64 + num_patches as u64 * 4
  }

  /// Create a fresh file with `num_patches` root slots, all unassigned.
  pub fn create<P: AsRef<Path>>(path: P, num_patches: u32) -> Result<Self> {
    let mut file = OpenOptions::new()
      .read(true)
      .write(true)
      .create(true)
      .truncate(true)
      .open(path)?;

    let mut header = Vec::with_capacity(Self::header_size(num_patches) as usize);
    header.extend_from_slice(&MAGIC);
    header.push(L::KIND);
    header.extend_from_slice(&[0u8; 3]);
    header.extend_from_slice(&(TILE_RESOLUTION as u32).to_le_bytes());
    header.extend_from_slice(&num_patches.to_le_bytes());
    for _ in 0..num_patches {
      header.extend_from_slice(&TileIndex::INVALID.0.to_le_bytes());
    }
    file.write_all(&header)?;

    Ok(Self {
      file,
      num_patches,
      roots: vec![TileIndex::INVALID; num_patches as usize],
      num_tiles: 0,
      _layer: PhantomData,
    })
  }

  /// Open an existing file, validating magic, layer kind and resolution.
  pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
    let mut file = OpenOptions::new().read(true).write(true).open(&path)?;

    let mut fixed = [0u8; 16];
    file.read_exact(&mut fixed).map_err(|_| {
      GlobeError::format(format!("{}: truncated header", path.as_ref().display()))
    })?;
    if fixed[0..4] != MAGIC {
      return Err(GlobeError::format("bad magic, not a quadtree file"));
    }
    if fixed[4] != L::KIND {
      return Err(GlobeError::format(format!(
        "layer kind mismatch: file has {}, expected {}",
        fixed[4],
        L::KIND
      )));
    }
    let resolution = get_u32(&fixed, 8);
    if resolution as usize != TILE_RESOLUTION {
      return Err(GlobeError::format(format!(
        "tile resolution mismatch: file has {resolution}, expected {TILE_RESOLUTION}"
      )));
    }
    let num_patches = get_u32(&fixed, 12);

    let mut root_bytes = vec![0u8; num_patches as usize * 4];
    file.read_exact(&mut root_bytes)?;
    let roots = root_bytes
      .chunks_exact(4)
      .map(|c| TileIndex(get_u32(c, 0)))
      .collect();

    let len = file.seek(SeekFrom::End(0))?;
    let body = len - Self::header_size(num_patches);
    if body % Self::record_size() as u64 != 0 {
      return Err(GlobeError::format("file body is not a whole number of tiles"));
    }
    let num_tiles = (body / Self::record_size() as u64) as u32;

    Ok(Self {
      file,
      num_patches,
      roots,
      num_tiles,
      _layer: PhantomData,
    })
  }

  pub fn num_patches(&self) -> u32 {
    self.num_patches
  }

  pub fn num_tiles(&self) -> u32 {
    self.num_tiles
  }

  /// Root tile offset of a patch.
  pub fn root(&self, patch: u8) -> TileIndex {
    self
      .roots
      .get(patch as usize)
      .copied()
      .unwrap_or(TileIndex::INVALID)
  }

  /// Assign a patch root and persist the header entry.
  pub fn set_root(&mut self, patch: u8, index: TileIndex) -> Result<()> {
    if patch as u32 >= self.num_patches {
      return Err(GlobeError::format(format!("patch {patch} out of range")));
    }
    self.roots[patch as usize] = index;
    self.file.seek(SeekFrom::Start(16 + patch as u64 * 4))?;
    self.file.write_all(&index.0.to_le_bytes())?;
    Ok(())
  }

  fn record_start(&self, index: TileIndex) -> Result<u64> {
    if !index.is_valid() || index.0 >= self.num_tiles {
      return Err(GlobeError::format(format!("tile offset {} out of range", index.0)));
    }
    Ok(Self::header_size(self.num_patches) + index.0 as u64 * Self::record_size() as u64)
  }

  /// Append a record, returning its new tile offset.
  pub fn append_tile(&mut self, record: &TileRecord<L>) -> Result<TileIndex> {
    let index = TileIndex(self.num_tiles);
    self.file.seek(SeekFrom::End(0))?;
    self.file.write_all(&Self::encode(record)?)?;
    self.num_tiles += 1;
    Ok(index)
  }

  /// Overwrite an existing record in place.
  pub fn write_tile(&mut self, index: TileIndex, record: &TileRecord<L>) -> Result<()> {
    let start = self.record_start(index)?;
    self.file.seek(SeekFrom::Start(start))?;
    self.file.write_all(&Self::encode(record)?)?;
    Ok(())
  }

  /// Read the record at `index`.
  pub fn read_tile(&mut self, index: TileIndex) -> Result<TileRecord<L>> {
    let start = self.record_start(index)?;
    self.file.seek(SeekFrom::Start(start))?;
    let mut bytes = vec![0u8; Self::record_size()];
    self.file.read_exact(&mut bytes)?;

    let header = L::decode_header(&bytes[0..L::HEADER_SIZE]);
    let mut samples = Vec::with_capacity(TILE_SAMPLES);
    let mut at = L::HEADER_SIZE;
    for _ in 0..TILE_SAMPLES {
      samples.push(L::decode_sample(&bytes[at..at + L::SAMPLE_SIZE]));
      at += L::SAMPLE_SIZE;
    }
    let mut children = [TileIndex::INVALID; 4];
    for child in &mut children {
      *child = TileIndex(get_u32(&bytes, at));
      at += 4;
    }
    debug_assert_eq!(at, Self::record_size());

    Ok(TileRecord {
      header,
      samples,
      children,
    })
  }

  fn encode(record: &TileRecord<L>) -> Result<Vec<u8>> {
    if record.samples.len() != TILE_SAMPLES {
      return Err(GlobeError::format(format!(
        "tile has {} samples, expected {TILE_SAMPLES}",
        record.samples.len()
      )));
    }
    let mut bytes = Vec::with_capacity(Self::record_size());
    L::encode_header(&record.header, &mut bytes);
    for sample in &record.samples {
      L::encode_sample(sample, &mut bytes);
    }
    for child in &record.children {
      bytes.extend_from_slice(&child.0.to_le_bytes());
    }
    debug_assert_eq!(bytes.len(), Self::record_size());
    Ok(bytes)
  }
}

fn get_u32(bytes: &[u8], at: usize) -> u32 {
  u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn get_f32(bytes: &[u8], at: usize) -> f32 {
  f32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

#[cfg(test)]
#[path = "quadtree_file_test.rs"]
mod quadtree_file_test;
