use crate::error::{Result, TableError};

/// Configuration supplied when creating or importing an attribute table.
#[derive(Debug, Clone)]
pub struct TableOptions {
    /// Rows per chunk batch in every dataset.
    pub chunk_rows: u32,
    /// Decompressed chunks cached per dataset.
    pub chunk_cache_entries: usize,
    /// Deflate level applied to stored chunks (0-9).
    pub deflate_level: u32,
    /// Neighbour-slot width allocated at creation.
    pub initial_max_degree: u32,
    /// Hard ceiling for geometric neighbour-width growth.
    pub max_degree_limit: u32,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            chunk_rows: 250,
            chunk_cache_entries: 64,
            deflate_level: 1,
            initial_max_degree: 25,
            max_degree_limit: 4096,
        }
    }
}

impl TableOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the rows-per-chunk batch size.
    pub fn chunk_rows(mut self, rows: u32) -> Self {
        self.chunk_rows = rows;
        self
    }

    /// Sets the number of decompressed chunks cached per dataset.
    pub fn chunk_cache_entries(mut self, entries: usize) -> Self {
        self.chunk_cache_entries = entries;
        self
    }

    /// Sets the deflate level for stored chunks.
    pub fn deflate_level(mut self, level: u32) -> Self {
        self.deflate_level = level;
        self
    }

    /// Sets the neighbour-slot width allocated at creation.
    pub fn initial_max_degree(mut self, width: u32) -> Self {
        self.initial_max_degree = width;
        self
    }

    /// Sets the ceiling for neighbour-width growth.
    pub fn max_degree_limit(mut self, limit: u32) -> Self {
        self.max_degree_limit = limit;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.chunk_rows == 0 {
            return Err(TableError::InvalidArgument(
                "chunk_rows must be at least 1".into(),
            ));
        }
        if self.deflate_level > 9 {
            return Err(TableError::InvalidArgument(
                "deflate_level must be 9 or less".into(),
            ));
        }
        if self.initial_max_degree == 0 {
            return Err(TableError::InvalidArgument(
                "initial_max_degree must be at least 1".into(),
            ));
        }
        if self.max_degree_limit < self.initial_max_degree {
            return Err(TableError::InvalidArgument(
                "max_degree_limit must not be below initial_max_degree".into(),
            ));
        }
        Ok(())
    }
}
