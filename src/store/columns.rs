//! Typed column groups over [`ChunkedArray`].
//!
//! A group's dataset is created lazily by the first field of its type; a
//! field count of zero therefore means there is no dataset at all, and the
//! group answers reads with empty rows.

use crate::error::{Result, TableError};
use crate::store::array::ChunkedArray;
use crate::store::codec::Element;
use crate::store::container::{Container, DatasetId, DatasetMeta};

pub struct ColumnGroup<T: Element> {
    id: DatasetId,
    array: Option<ChunkedArray<T>>,
}

impl<T: Element> ColumnGroup<T> {
    pub fn empty(id: DatasetId) -> Self {
        Self { id, array: None }
    }

    /// Rebuilds the group from its manifest entry.
    pub fn from_meta(
        meta: &DatasetMeta,
        deflate_level: u32,
        cache_entries: usize,
    ) -> Result<Self> {
        Ok(Self {
            id: meta.id,
            array: Some(ChunkedArray::from_meta(meta, deflate_level, cache_entries)?),
        })
    }

    pub fn is_present(&self) -> bool {
        self.array.is_some()
    }

    pub fn cols(&self) -> u32 {
        self.array.as_ref().map_or(0, ChunkedArray::cols)
    }

    pub fn rows(&self) -> Option<u64> {
        self.array.as_ref().map(ChunkedArray::rows)
    }

    /// Adds one column backfilled with `default` for every existing row.
    ///
    /// The first column creates the dataset and fixes its fill value to
    /// `default`; later columns extend it. A failed backfill reverts the
    /// extension so the caller's registry never gets ahead of the store.
    pub fn add_column(
        &mut self,
        io: &mut Container,
        rows: u64,
        default: T,
        chunk_rows: u32,
        deflate_level: u32,
        cache_entries: usize,
    ) -> Result<()> {
        match &mut self.array {
            None => {
                let mut array = ChunkedArray::new(
                    self.id,
                    rows,
                    1,
                    chunk_rows,
                    1,
                    default,
                    deflate_level,
                    cache_entries,
                );
                array.fill_col(io, 0, default)?;
                self.array = Some(array);
            }
            Some(array) => {
                array.grow_cols(1);
                let new_col = array.cols() - 1;
                if let Err(e) = array.fill_col(io, new_col, default) {
                    array.shrink_cols(1);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Reads a full row; empty when the group has no fields.
    pub fn read_row(&mut self, io: &mut Container, fid: u64) -> Result<Vec<T>> {
        match &mut self.array {
            Some(array) => array.read_row(io, fid),
            None => Ok(Vec::new()),
        }
    }

    /// Writes a full row; a group with no fields accepts only an empty row.
    pub fn write_row(&mut self, io: &mut Container, fid: u64, values: &[T]) -> Result<()> {
        match &mut self.array {
            Some(array) => array.write_row(io, fid, values),
            None if values.is_empty() => Ok(()),
            None => Err(TableError::InvalidArgument(format!(
                "row of {} values written to a group with no fields",
                values.len()
            ))),
        }
    }

    pub fn flush(&mut self, io: &mut Container) -> Result<()> {
        if let Some(array) = &mut self.array {
            array.flush(io)?;
        }
        Ok(())
    }

    pub fn to_meta(&self) -> Option<DatasetMeta> {
        self.array.as_ref().map(ChunkedArray::to_meta)
    }
}
