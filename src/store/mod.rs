//! On-disk storage engine for the attribute table.
//!
//! Implements the single-file container, chunked compressed arrays, typed
//! column groups, the field registry, and adjacency storage.

/// Chunk compression codec and fixed-width element encoding.
pub mod codec;

/// Backing file: header, blob body, manifest.
pub mod container;

/// Chunked, compressed, extensible 2-D arrays.
pub mod array;

/// Typed column groups layered on the chunked arrays.
pub mod columns;

/// Field registry and on-disk field directories.
pub mod schema;

/// Adjacency matrix and degree vector.
pub mod neighbours;

pub use array::ChunkedArray;
pub use columns::ColumnGroup;
pub use container::{BlobRef, Container, DatasetId, DirectoryId, Header, Manifest};
pub use neighbours::NeighbourStore;
pub use schema::SchemaRegistry;
