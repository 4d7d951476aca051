//! Adjacency storage: a fixed-width id matrix plus a per-row degree vector.
//!
//! Reads are degree-first, so slots past a row's degree are never visible.
//! Writing a list wider than the matrix grows the width geometrically up to
//! a hard ceiling.

use tracing::debug;

use crate::error::{Result, TableError};
use crate::model::Fid;
use crate::store::array::ChunkedArray;
use crate::store::container::{Container, DatasetId, DatasetMeta};

pub struct NeighbourStore {
    ids: ChunkedArray<u64>,
    counts: ChunkedArray<u32>,
    width_limit: u32,
}

impl NeighbourStore {
    pub fn create(
        rows: u64,
        initial_width: u32,
        width_limit: u32,
        chunk_rows: u32,
        deflate_level: u32,
        cache_entries: usize,
    ) -> Self {
        Self {
            ids: ChunkedArray::new(
                DatasetId::NeighbourIds,
                rows,
                initial_width,
                chunk_rows,
                initial_width,
                0,
                deflate_level,
                cache_entries,
            ),
            counts: ChunkedArray::new(
                DatasetId::NeighbourCounts,
                rows,
                1,
                chunk_rows,
                1,
                0,
                deflate_level,
                cache_entries,
            ),
            width_limit,
        }
    }

    /// Rebuilds the store from its two manifest entries, validating that
    /// they agree on the feature count.
    pub fn from_meta(
        ids_meta: &DatasetMeta,
        counts_meta: &DatasetMeta,
        width_limit: u32,
        deflate_level: u32,
        cache_entries: usize,
    ) -> Result<Self> {
        if ids_meta.rows != counts_meta.rows {
            return Err(TableError::Corruption(format!(
                "the neighbour datasets disagree on feature count: {} vs {}",
                ids_meta.rows, counts_meta.rows
            )));
        }
        if counts_meta.cols != 1 {
            return Err(TableError::Corruption(
                "the neighbour degree dataset must have one column".into(),
            ));
        }
        Ok(Self {
            ids: ChunkedArray::from_meta(ids_meta, deflate_level, cache_entries)?,
            counts: ChunkedArray::from_meta(counts_meta, deflate_level, cache_entries)?,
            width_limit,
        })
    }

    pub fn rows(&self) -> u64 {
        self.counts.rows()
    }

    pub fn width(&self) -> u32 {
        self.ids.cols()
    }

    pub fn neighbours(&mut self, io: &mut Container, fid: Fid) -> Result<Vec<Fid>> {
        let degree = self.counts.read_cell(io, fid, 0)?;
        if degree == 0 {
            return Ok(Vec::new());
        }
        if degree > self.width() {
            return Err(TableError::Corruption(format!(
                "feature {fid} has degree {degree} but the matrix is {} wide",
                self.width()
            )));
        }
        self.ids.read_cells(io, fid, 0, degree)
    }

    pub fn set_neighbours(&mut self, io: &mut Container, fid: Fid, list: &[Fid]) -> Result<()> {
        let degree: u32 = list
            .len()
            .try_into()
            .ok()
            .filter(|&d| d <= self.width_limit)
            .ok_or(TableError::CapacityExceeded {
                requested: list.len(),
                limit: self.width_limit,
            })?;

        if degree > self.width() {
            self.grow_width(degree);
        }

        self.counts.write_cell(io, fid, 0, degree)?;
        if !list.is_empty() {
            self.ids.write_cells(io, fid, 0, list)?;
        }
        Ok(())
    }

    /// Doubles the matrix width until `needed` fits, clamped to the limit.
    /// New slots sit past every row's degree and in fill-value chunk space,
    /// so no backfill pass is required.
    fn grow_width(&mut self, needed: u32) {
        let old = self.width();
        let mut new_width = old.max(1);
        while new_width < needed {
            new_width = new_width.saturating_mul(2);
        }
        new_width = new_width.min(self.width_limit);
        self.ids.grow_cols(new_width - old);
        debug!(old, new_width, "neighbour matrix widened");
    }

    pub fn flush(&mut self, io: &mut Container) -> Result<()> {
        self.ids.flush(io)?;
        self.counts.flush(io)
    }

    pub fn ids_meta(&self) -> DatasetMeta {
        self.ids.to_meta()
    }

    pub fn counts_meta(&self) -> DatasetMeta {
        self.counts.to_meta()
    }
}
