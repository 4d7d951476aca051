//! The attribute table: lifecycle, schema growth, and feature checkout.
//!
//! One table owns the backing container, the field registry, three typed
//! column groups and the neighbour store. All I/O is synchronous and
//! single-threaded; a checked-out [`Feature`] is a detached snapshot that
//! only reaches disk through [`AttributeTable::return_feature`] with
//! `sync = true`.

use std::path::Path;

use tracing::{debug, error};

use crate::error::{Result, TableError};
use crate::model::{Feature, FieldDef, FieldType, Fid};
use crate::store::codec::Element;
use crate::store::columns::ColumnGroup;
use crate::store::container::{Container, DatasetId, DirectoryId, Header, Manifest};
use crate::store::neighbours::NeighbourStore;
use crate::store::schema::SchemaRegistry;

mod cursor;
mod options;

pub use cursor::FeatureCursor;
pub use options::TableOptions;

pub struct AttributeTable {
    io: Container,
    opts: TableOptions,
    rows: u64,
    schema: SchemaRegistry,
    bools: ColumnGroup<i8>,
    ints: ColumnGroup<i64>,
    floats: ColumnGroup<f64>,
    neighbours: NeighbourStore,
    dirty: bool,
    closed: bool,
}

impl AttributeTable {
    /// Creates a new table with `rows` features and no fields.
    ///
    /// The neighbour store is allocated immediately at
    /// `rows x initial_max_degree`; column datasets appear when the first
    /// field of their type is added.
    pub fn create(rows: u64, path: &Path, opts: TableOptions) -> Result<Self> {
        opts.validate()?;
        if rows == 0 {
            return Err(TableError::InvalidArgument(
                "an attribute table needs at least one feature".into(),
            ));
        }

        let io = Container::create(path)?;
        let neighbours = NeighbourStore::create(
            rows,
            opts.initial_max_degree,
            opts.max_degree_limit,
            opts.chunk_rows,
            opts.deflate_level,
            opts.chunk_cache_entries,
        );
        let mut table = Self {
            io,
            rows,
            schema: SchemaRegistry::new(),
            bools: ColumnGroup::empty(DatasetId::BoolData),
            ints: ColumnGroup::empty(DatasetId::IntData),
            floats: ColumnGroup::empty(DatasetId::FloatData),
            neighbours,
            opts,
            dirty: true,
            closed: false,
        };
        table.flush()?;
        debug!(rows, path = %path.display(), "attribute table created");
        Ok(table)
    }

    /// Opens an existing table, rebuilding the registry from the field
    /// directories and validating structural consistency.
    pub fn import(path: &Path, opts: TableOptions) -> Result<Self> {
        opts.validate()?;
        let mut io = Container::open(path)?;
        let header = io.read_header()?;

        let manifest_ref = header
            .manifest
            .ok_or_else(|| TableError::Corruption("container has no manifest".into()))?;
        let manifest_bytes = io.read_blob(manifest_ref)?;
        if crc32fast::hash(&manifest_bytes) != header.manifest_crc {
            return Err(TableError::Corruption("manifest checksum mismatch".into()));
        }
        let manifest = Manifest::decode(&manifest_bytes)?;

        // A group with no directory simply has no fields yet.
        let mut schema = SchemaRegistry::new();
        for (ty, dir_id) in [
            (FieldType::Bool, DirectoryId::BoolFields),
            (FieldType::Int, DirectoryId::IntFields),
            (FieldType::Float, DirectoryId::FloatFields),
        ] {
            if let Some(blob) = manifest.directory(dir_id) {
                let bytes = io.read_blob(blob)?;
                schema.load_directory(ty, &bytes)?;
            }
        }
        for (declared, ty) in [
            (header.bool_fields, FieldType::Bool),
            (header.int_fields, FieldType::Int),
            (header.float_fields, FieldType::Float),
        ] {
            if declared != schema.count(ty) {
                return Err(TableError::Corruption(format!(
                    "the header declares {declared} {} fields but the directory lists {}",
                    ty.name(),
                    schema.count(ty)
                )));
            }
        }

        let ids_meta = manifest
            .dataset(DatasetId::NeighbourIds)
            .ok_or_else(|| TableError::Corruption("neighbour id dataset missing".into()))?;
        let counts_meta = manifest
            .dataset(DatasetId::NeighbourCounts)
            .ok_or_else(|| TableError::Corruption("neighbour degree dataset missing".into()))?;
        let neighbours = NeighbourStore::from_meta(
            ids_meta,
            counts_meta,
            opts.max_degree_limit.max(header.max_degree),
            opts.deflate_level,
            opts.chunk_cache_entries,
        )?;
        if neighbours.rows() != header.rows {
            return Err(TableError::Corruption(format!(
                "the neighbour datasets hold {} features but the header declares {}",
                neighbours.rows(),
                header.rows
            )));
        }
        if neighbours.width() != header.max_degree {
            return Err(TableError::Corruption(format!(
                "the neighbour matrix is {} wide but the header declares {}",
                neighbours.width(),
                header.max_degree
            )));
        }

        let bools = Self::import_group(&manifest, DatasetId::BoolData, &schema, FieldType::Bool, header.rows, &opts)?;
        let ints = Self::import_group(&manifest, DatasetId::IntData, &schema, FieldType::Int, header.rows, &opts)?;
        let floats = Self::import_group(&manifest, DatasetId::FloatData, &schema, FieldType::Float, header.rows, &opts)?;

        debug!(
            rows = header.rows,
            bool_fields = schema.count(FieldType::Bool),
            int_fields = schema.count(FieldType::Int),
            float_fields = schema.count(FieldType::Float),
            path = %path.display(),
            "attribute table imported"
        );
        Ok(Self {
            io,
            rows: header.rows,
            schema,
            bools,
            ints,
            floats,
            neighbours,
            opts,
            dirty: false,
            closed: false,
        })
    }

    fn import_group<T: Element>(
        manifest: &Manifest,
        id: DatasetId,
        schema: &SchemaRegistry,
        ty: FieldType,
        rows: u64,
        opts: &TableOptions,
    ) -> Result<ColumnGroup<T>> {
        let count = schema.count(ty);
        match manifest.dataset(id) {
            None if count == 0 => Ok(ColumnGroup::empty(id)),
            None => Err(TableError::Corruption(format!(
                "{count} {} fields are registered but the dataset is missing",
                ty.name()
            ))),
            Some(_) if count == 0 => Err(TableError::Corruption(format!(
                "a {} dataset exists but no fields are registered",
                ty.name()
            ))),
            Some(meta) => {
                if meta.rows != rows {
                    return Err(TableError::Corruption(format!(
                        "the {} dataset holds {} features, expected {rows}",
                        ty.name(),
                        meta.rows
                    )));
                }
                if meta.cols != count {
                    return Err(TableError::Corruption(format!(
                        "the {} dataset has {} columns but {count} fields are registered",
                        ty.name(),
                        meta.cols
                    )));
                }
                ColumnGroup::from_meta(meta, opts.deflate_level, opts.chunk_cache_entries)
            }
        }
    }

    /// Number of features. Every fid in `0..size()` is valid for the life
    /// of the table.
    pub fn size(&self) -> u64 {
        self.rows
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.schema.has_field(name)
    }

    pub fn field_type(&self, name: &str) -> Result<FieldType> {
        self.schema.field_type(name)
    }

    pub fn field_count(&self, ty: FieldType) -> u32 {
        match ty {
            FieldType::String => 0,
            _ => self.schema.count(ty),
        }
    }

    /// Field names of one group in slot order.
    pub fn field_names(&self, ty: FieldType) -> &[String] {
        match ty {
            FieldType::String => &[],
            _ => self.schema.names(ty),
        }
    }

    /// Current neighbour-slot width.
    pub fn max_degree(&self) -> u32 {
        self.neighbours.width()
    }

    /// Adds a boolean field, backfilling every row with `default`.
    pub fn add_bool_field(&mut self, name: &str, default: bool) -> Result<()> {
        self.schema.ensure_absent(name)?;
        self.bools.add_column(
            &mut self.io,
            self.rows,
            default as i8,
            self.opts.chunk_rows,
            self.opts.deflate_level,
            self.opts.chunk_cache_entries,
        )?;
        self.schema.register(name, FieldType::Bool)?;
        self.dirty = true;
        Ok(())
    }

    /// Adds an integer field, backfilling every row with `default`.
    pub fn add_int_field(&mut self, name: &str, default: i64) -> Result<()> {
        self.schema.ensure_absent(name)?;
        self.ints.add_column(
            &mut self.io,
            self.rows,
            default,
            self.opts.chunk_rows,
            self.opts.deflate_level,
            self.opts.chunk_cache_entries,
        )?;
        self.schema.register(name, FieldType::Int)?;
        self.dirty = true;
        Ok(())
    }

    /// Adds a float field, backfilling every row with `default`.
    pub fn add_float_field(&mut self, name: &str, default: f64) -> Result<()> {
        self.schema.ensure_absent(name)?;
        self.floats.add_column(
            &mut self.io,
            self.rows,
            default,
            self.opts.chunk_rows,
            self.opts.deflate_level,
            self.opts.chunk_cache_entries,
        )?;
        self.schema.register(name, FieldType::Float)?;
        self.dirty = true;
        Ok(())
    }

    /// String columns are not representable in the container.
    pub fn add_string_field(&mut self, _name: &str, _default: &str) -> Result<()> {
        Err(TableError::UnsupportedType(
            "string fields are not supported within attribute tables",
        ))
    }

    /// Adds several fields at once with each type's zero default.
    pub fn add_fields(&mut self, defs: &[FieldDef]) -> Result<()> {
        for def in defs {
            match def.ty {
                FieldType::Bool => self.add_bool_field(&def.name, false)?,
                FieldType::Int => self.add_int_field(&def.name, 0)?,
                FieldType::Float => self.add_float_field(&def.name, 0.0)?,
                FieldType::String => self.add_string_field(&def.name, "")?,
            }
        }
        Ok(())
    }

    fn check_fid(&self, fid: Fid) -> Result<()> {
        if fid >= self.rows {
            return Err(TableError::FidOutOfRange {
                fid,
                size: self.rows,
            });
        }
        Ok(())
    }

    /// Materializes one feature as an owned snapshot: one row read per
    /// present column group plus the neighbour list.
    pub fn checkout(&mut self, fid: Fid) -> Result<Feature> {
        self.check_fid(fid)?;
        let neighbours = self.neighbours.neighbours(&mut self.io, fid)?;
        let bools = self
            .bools
            .read_row(&mut self.io, fid)?
            .into_iter()
            .map(|v| v != 0)
            .collect();
        let ints = self.ints.read_row(&mut self.io, fid)?;
        let floats = self.floats.read_row(&mut self.io, fid)?;
        Ok(Feature {
            fid,
            bools,
            ints,
            floats,
            neighbours,
        })
    }

    /// Releases a checked-out feature.
    ///
    /// With `sync = true` the feature's vectors are written back first: the
    /// neighbour list, then one row write per present group. The vectors
    /// must match the current schema, so a feature checked out before a
    /// field was added cannot silently clobber the new column.
    pub fn return_feature(&mut self, feature: Feature, sync: bool) -> Result<()> {
        if !sync {
            return Ok(());
        }
        self.check_fid(feature.fid)?;
        for (len, ty) in [
            (feature.bools.len(), FieldType::Bool),
            (feature.ints.len(), FieldType::Int),
            (feature.floats.len(), FieldType::Float),
        ] {
            if len != self.schema.count(ty) as usize {
                return Err(TableError::InvalidArgument(format!(
                    "feature carries {len} {} values but the table has {} {} fields",
                    ty.name(),
                    self.schema.count(ty),
                    ty.name()
                )));
            }
        }

        self.neighbours
            .set_neighbours(&mut self.io, feature.fid, &feature.neighbours)?;
        if !feature.bools.is_empty() {
            let raw: Vec<i8> = feature.bools.iter().map(|&b| b as i8).collect();
            self.bools.write_row(&mut self.io, feature.fid, &raw)?;
        }
        if !feature.ints.is_empty() {
            self.ints.write_row(&mut self.io, feature.fid, &feature.ints)?;
        }
        if !feature.floats.is_empty() {
            self.floats
                .write_row(&mut self.io, feature.fid, &feature.floats)?;
        }
        self.dirty = true;
        Ok(())
    }

    /// Neighbour fids of one feature.
    pub fn neighbours(&mut self, fid: Fid) -> Result<Vec<Fid>> {
        self.check_fid(fid)?;
        self.neighbours.neighbours(&mut self.io, fid)
    }

    /// Replaces one feature's neighbour list.
    pub fn set_neighbours(&mut self, fid: Fid, list: &[Fid]) -> Result<()> {
        self.check_fid(fid)?;
        self.neighbours.set_neighbours(&mut self.io, fid, list)?;
        self.dirty = true;
        Ok(())
    }

    /// A forward cursor positioned on fid 0.
    pub fn cursor(&mut self) -> FeatureCursor<'_> {
        FeatureCursor::new(self)
    }

    /// Writes dirty chunks, field directories, the manifest and the header.
    pub fn flush(&mut self) -> Result<()> {
        self.bools.flush(&mut self.io)?;
        self.ints.flush(&mut self.io)?;
        self.floats.flush(&mut self.io)?;
        self.neighbours.flush(&mut self.io)?;

        let mut manifest = Manifest::default();
        for (ty, dir_id) in [
            (FieldType::Bool, DirectoryId::BoolFields),
            (FieldType::Int, DirectoryId::IntFields),
            (FieldType::Float, DirectoryId::FloatFields),
        ] {
            if self.schema.count(ty) > 0 {
                let bytes = self.schema.encode_directory(ty)?;
                let blob = self.io.append_blob(&bytes)?;
                manifest.directories.push((dir_id, blob));
            }
        }
        if let Some(meta) = self.bools.to_meta() {
            manifest.datasets.push(meta);
        }
        if let Some(meta) = self.ints.to_meta() {
            manifest.datasets.push(meta);
        }
        if let Some(meta) = self.floats.to_meta() {
            manifest.datasets.push(meta);
        }
        manifest.datasets.push(self.neighbours.ids_meta());
        manifest.datasets.push(self.neighbours.counts_meta());

        let manifest_bytes = manifest.encode()?;
        let manifest_crc = crc32fast::hash(&manifest_bytes);
        let manifest_ref = self.io.append_blob(&manifest_bytes)?;

        let mut header = Header::new(self.rows, self.neighbours.width());
        header.bool_fields = self.schema.count(FieldType::Bool);
        header.int_fields = self.schema.count(FieldType::Int);
        header.float_fields = self.schema.count(FieldType::Float);
        header.manifest = Some(manifest_ref);
        header.manifest_crc = manifest_crc;
        self.io.write_header(&header)?;
        self.io.sync()?;
        self.dirty = false;
        Ok(())
    }

    /// Flushes and releases the table. Consuming `self` makes a second
    /// close unrepresentable.
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.flush()
    }
}

impl Drop for AttributeTable {
    fn drop(&mut self) {
        if self.closed || !self.dirty {
            return;
        }
        if let Err(e) = self.flush() {
            error!("flush on drop failed: {e}");
        }
    }
}
