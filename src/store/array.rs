//! Chunked, compressed, extensible 2-D arrays.
//!
//! Each dataset is a `[rows x cols]` grid of fixed-width elements, split
//! into `[chunk_rows x chunk_cols]` blocks. Blocks are held decompressed in
//! an LRU cache and written back on eviction or flush; a block that was
//! never written has no blob and reads as the dataset fill value.

use std::collections::BTreeMap;
use std::num::NonZeroUsize;

use lru::LruCache;
use tracing::trace;

use crate::error::{Result, TableError};
use crate::store::codec::{self, Element};
use crate::store::container::{BlobRef, Container, DatasetId, DatasetMeta};

pub const DEFAULT_CACHE_ENTRIES: usize = 64;

struct Chunk<T> {
    data: Vec<T>,
    dirty: bool,
}

pub struct ChunkedArray<T: Element> {
    id: DatasetId,
    rows: u64,
    cols: u32,
    chunk_rows: u32,
    chunk_cols: u32,
    fill: T,
    deflate_level: u32,
    refs: BTreeMap<(u32, u32), BlobRef>,
    cache: LruCache<(u32, u32), Chunk<T>>,
}

impl<T: Element> ChunkedArray<T> {
    pub fn new(
        id: DatasetId,
        rows: u64,
        cols: u32,
        chunk_rows: u32,
        chunk_cols: u32,
        fill: T,
        deflate_level: u32,
        cache_entries: usize,
    ) -> Self {
        let capacity = NonZeroUsize::new(cache_entries)
            .unwrap_or_else(|| NonZeroUsize::new(DEFAULT_CACHE_ENTRIES).expect("nonzero"));
        Self {
            id,
            rows,
            cols,
            chunk_rows: chunk_rows.max(1),
            chunk_cols: chunk_cols.max(1),
            fill,
            deflate_level,
            refs: BTreeMap::new(),
            cache: LruCache::new(capacity),
        }
    }

    /// Rebuilds an array from its manifest entry, validating the chunk grid.
    pub fn from_meta(
        meta: &DatasetMeta,
        deflate_level: u32,
        cache_entries: usize,
    ) -> Result<Self> {
        let mut array = Self::new(
            meta.id,
            meta.rows,
            meta.cols,
            meta.chunk_rows,
            meta.chunk_cols,
            T::from_bits(meta.fill_bits),
            deflate_level,
            cache_entries,
        );
        let grid_rows = array.grid_rows();
        let grid_cols = array.grid_cols();
        for &(crow, ccol, blob) in &meta.chunks {
            if crow >= grid_rows || ccol >= grid_cols {
                return Err(TableError::Corruption(format!(
                    "dataset 0x{:02X} chunk ({crow},{ccol}) outside its {grid_rows}x{grid_cols} grid",
                    meta.id.to_byte()
                )));
            }
            if array.refs.insert((crow, ccol), blob).is_some() {
                return Err(TableError::Corruption(format!(
                    "dataset 0x{:02X} chunk ({crow},{ccol}) listed twice",
                    meta.id.to_byte()
                )));
            }
        }
        Ok(array)
    }

    /// Captures the manifest entry for the current (flushed) state.
    pub fn to_meta(&self) -> DatasetMeta {
        DatasetMeta {
            id: self.id,
            rows: self.rows,
            cols: self.cols,
            chunk_rows: self.chunk_rows,
            chunk_cols: self.chunk_cols,
            fill_bits: self.fill.to_bits(),
            chunks: self
                .refs
                .iter()
                .map(|(&(crow, ccol), &blob)| (crow, ccol, blob))
                .collect(),
        }
    }

    pub fn rows(&self) -> u64 {
        self.rows
    }

    pub fn cols(&self) -> u32 {
        self.cols
    }

    fn grid_rows(&self) -> u32 {
        self.rows
            .div_ceil(u64::from(self.chunk_rows))
            .min(u64::from(u32::MAX)) as u32
    }

    fn grid_cols(&self) -> u32 {
        self.cols.div_ceil(self.chunk_cols)
    }

    fn chunk_len(&self) -> usize {
        self.chunk_rows as usize * self.chunk_cols as usize
    }

    fn check_bounds(&self, row: u64, col: u32, count: u32) -> Result<()> {
        if row >= self.rows {
            return Err(TableError::FidOutOfRange {
                fid: row,
                size: self.rows,
            });
        }
        if u64::from(col) + u64::from(count) > u64::from(self.cols) {
            return Err(TableError::InvalidArgument(format!(
                "cell range {col}..{} exceeds {} columns",
                col + count,
                self.cols
            )));
        }
        Ok(())
    }

    fn encode_chunk_bytes(&self, chunk: &Chunk<T>) -> Result<Vec<u8>> {
        let mut raw = vec![0u8; chunk.data.len() * T::WIDTH];
        for (i, value) in chunk.data.iter().enumerate() {
            value.store_le(&mut raw[i * T::WIDTH..]);
        }
        codec::encode_chunk(&raw, T::WIDTH, self.deflate_level)
    }

    fn load_chunk(&mut self, io: &mut Container, key: (u32, u32)) -> Result<Chunk<T>> {
        match self.refs.get(&key) {
            Some(&blob) => {
                let stored = io.read_blob(blob)?;
                let raw = codec::decode_chunk(&stored, T::WIDTH)?;
                if raw.len() != self.chunk_len() * T::WIDTH {
                    return Err(TableError::Corruption(format!(
                        "dataset 0x{:02X} chunk ({},{}) has {} bytes, expected {}",
                        self.id.to_byte(),
                        key.0,
                        key.1,
                        raw.len(),
                        self.chunk_len() * T::WIDTH
                    )));
                }
                let data = raw
                    .chunks_exact(T::WIDTH)
                    .map(T::load_le)
                    .collect::<Vec<_>>();
                Ok(Chunk { data, dirty: false })
            }
            None => Ok(Chunk {
                data: vec![self.fill; self.chunk_len()],
                dirty: false,
            }),
        }
    }

    fn write_back(&mut self, io: &mut Container, key: (u32, u32), chunk: &Chunk<T>) -> Result<()> {
        let bytes = self.encode_chunk_bytes(chunk)?;
        let blob = io.append_blob(&bytes)?;
        self.refs.insert(key, blob);
        trace!(
            dataset = self.id.to_byte(),
            crow = key.0,
            ccol = key.1,
            stored = bytes.len(),
            "chunk written back"
        );
        Ok(())
    }

    fn fetch_chunk(&mut self, io: &mut Container, key: (u32, u32)) -> Result<&mut Chunk<T>> {
        if !self.cache.contains(&key) {
            let chunk = self.load_chunk(io, key)?;
            if let Some((evicted_key, evicted)) = self.cache.push(key, chunk) {
                if evicted.dirty {
                    self.write_back(io, evicted_key, &evicted)?;
                }
            }
        }
        Ok(self.cache.get_mut(&key).expect("chunk must exist"))
    }

    /// Reads `count` cells of one row starting at `col`.
    pub fn read_cells(
        &mut self,
        io: &mut Container,
        row: u64,
        col: u32,
        count: u32,
    ) -> Result<Vec<T>> {
        self.check_bounds(row, col, count)?;
        let mut out = Vec::with_capacity(count as usize);
        let crow = (row / u64::from(self.chunk_rows)) as u32;
        let local_row = (row % u64::from(self.chunk_rows)) as usize;

        let mut cursor = col;
        let end = col + count;
        while cursor < end {
            let ccol = cursor / self.chunk_cols;
            let local_col = (cursor % self.chunk_cols) as usize;
            let take = ((ccol + 1) * self.chunk_cols).min(end) - cursor;
            let chunk_cols = self.chunk_cols as usize;
            let chunk = self.fetch_chunk(io, (crow, ccol))?;
            let base = local_row * chunk_cols + local_col;
            out.extend_from_slice(&chunk.data[base..base + take as usize]);
            cursor += take;
        }
        Ok(out)
    }

    /// Writes cells of one row starting at `col`.
    pub fn write_cells(
        &mut self,
        io: &mut Container,
        row: u64,
        col: u32,
        values: &[T],
    ) -> Result<()> {
        let count: u32 = values
            .len()
            .try_into()
            .map_err(|_| TableError::InvalidArgument("cell run exceeds u32::MAX".into()))?;
        self.check_bounds(row, col, count)?;
        let crow = (row / u64::from(self.chunk_rows)) as u32;
        let local_row = (row % u64::from(self.chunk_rows)) as usize;

        let mut cursor = col;
        let end = col + count;
        while cursor < end {
            let ccol = cursor / self.chunk_cols;
            let local_col = (cursor % self.chunk_cols) as usize;
            let take = (((ccol + 1) * self.chunk_cols).min(end) - cursor) as usize;
            let chunk_cols = self.chunk_cols as usize;
            let offset = (cursor - col) as usize;
            let chunk = self.fetch_chunk(io, (crow, ccol))?;
            let base = local_row * chunk_cols + local_col;
            chunk.data[base..base + take].copy_from_slice(&values[offset..offset + take]);
            chunk.dirty = true;
            cursor += take as u32;
        }
        Ok(())
    }

    pub fn read_row(&mut self, io: &mut Container, row: u64) -> Result<Vec<T>> {
        self.read_cells(io, row, 0, self.cols)
    }

    pub fn write_row(&mut self, io: &mut Container, row: u64, values: &[T]) -> Result<()> {
        if values.len() != self.cols as usize {
            return Err(TableError::InvalidArgument(format!(
                "row of {} values written to {} columns",
                values.len(),
                self.cols
            )));
        }
        self.write_cells(io, row, 0, values)
    }

    pub fn read_cell(&mut self, io: &mut Container, row: u64, col: u32) -> Result<T> {
        Ok(self.read_cells(io, row, col, 1)?[0])
    }

    pub fn write_cell(&mut self, io: &mut Container, row: u64, col: u32, value: T) -> Result<()> {
        self.write_cells(io, row, col, &[value])
    }

    /// Extends dimension 1. Metadata only: new cells sit in chunk padding or
    /// in never-written chunks and therefore read as the fill value until
    /// written. Callers that need a different default run [`fill_col`].
    ///
    /// [`fill_col`]: ChunkedArray::fill_col
    pub fn grow_cols(&mut self, by: u32) {
        self.cols += by;
    }

    /// Reverts a [`grow_cols`], pruning any chunk state past the restored
    /// edge so a failed backfill leaves no stale cache or blob references.
    ///
    /// [`grow_cols`]: ChunkedArray::grow_cols
    pub fn shrink_cols(&mut self, by: u32) {
        self.cols -= by;
        let grid_cols = self.grid_cols();
        self.refs.retain(|&(_, ccol), _| ccol < grid_cols);
        let stale: Vec<(u32, u32)> = self
            .cache
            .iter()
            .map(|(&key, _)| key)
            .filter(|&(_, ccol)| ccol >= grid_cols)
            .collect();
        for key in stale {
            self.cache.pop(&key);
        }
    }

    /// Writes `value` into every row of one column, one chunk-row batch at a
    /// time: full batches of `chunk_rows`, then the final remainder. Peak
    /// memory stays bounded by a single chunk regardless of table size.
    pub fn fill_col(&mut self, io: &mut Container, col: u32, value: T) -> Result<()> {
        if col >= self.cols {
            return Err(TableError::InvalidArgument(format!(
                "fill of column {col} in a {}-column dataset",
                self.cols
            )));
        }
        let ccol = col / self.chunk_cols;
        let local_col = (col % self.chunk_cols) as usize;
        let chunk_cols = self.chunk_cols as usize;

        for crow in 0..self.grid_rows() {
            let batch_rows = self.batch_rows(crow);
            let chunk = self.fetch_chunk(io, (crow, ccol))?;
            for local_row in 0..batch_rows {
                chunk.data[local_row * chunk_cols + local_col] = value;
            }
            chunk.dirty = true;
        }
        Ok(())
    }

    /// Rows covered by chunk-row `crow`: `chunk_rows` for full batches, the
    /// remainder for the last one.
    fn batch_rows(&self, crow: u32) -> usize {
        let start = u64::from(crow) * u64::from(self.chunk_rows);
        (self.rows - start).min(u64::from(self.chunk_rows)) as usize
    }

    /// Writes every dirty cached chunk back to the container.
    pub fn flush(&mut self, io: &mut Container) -> Result<()> {
        let dirty: Vec<(u32, u32)> = self
            .cache
            .iter()
            .filter_map(|(&key, chunk)| if chunk.dirty { Some(key) } else { None })
            .collect();
        for key in dirty {
            let bytes = {
                let chunk = self.cache.peek(&key).expect("dirty chunk must exist");
                self.encode_chunk_bytes(chunk)?
            };
            let blob = io.append_blob(&bytes)?;
            self.refs.insert(key, blob);
            if let Some(chunk) = self.cache.get_mut(&key) {
                chunk.dirty = false;
            }
        }
        Ok(())
    }
}
