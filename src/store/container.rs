//! Single-file backing container.
//!
//! Layout: a fixed header region at offset 0, followed by an append-only
//! body of blobs (compressed chunks, field directories, manifests). The
//! manifest locates every dataset's chunks; flushing appends a fresh
//! manifest and rewrites the header to point at it. Superseded blobs are
//! abandoned in place; there is no compaction.

use std::convert::TryInto;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Result, TableError};

const MAGIC: &[u8; 8] = b"CAIRNAT\0";
pub const HEADER_REGION_SIZE: usize = 128;
const VERSION_MAJOR: u16 = 1;
const VERSION_MINOR: u16 = 0;

/// Byte offset of the row-count field inside the header region.
pub const HEADER_ROWS_OFFSET: usize = 12;

/// Location of a blob inside the container body.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct BlobRef {
    pub offset: u64,
    pub len: u32,
}

/// Identifies a dataset inside the manifest.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub enum DatasetId {
    BoolData = 0x01,
    IntData = 0x02,
    FloatData = 0x03,
    NeighbourIds = 0x04,
    NeighbourCounts = 0x05,
}

impl DatasetId {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x01 => Ok(Self::BoolData),
            0x02 => Ok(Self::IntData),
            0x03 => Ok(Self::FloatData),
            0x04 => Ok(Self::NeighbourIds),
            0x05 => Ok(Self::NeighbourCounts),
            other => Err(TableError::Corruption(format!(
                "unknown dataset id: 0x{other:02X}"
            ))),
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

/// Identifies a field directory inside the manifest.
#[repr(u8)]
#[derive(Debug, Copy, Clone, Eq, PartialEq, PartialOrd, Ord)]
pub enum DirectoryId {
    BoolFields = 0x11,
    IntFields = 0x12,
    FloatFields = 0x13,
}

impl DirectoryId {
    pub fn from_byte(byte: u8) -> Result<Self> {
        match byte {
            0x11 => Ok(Self::BoolFields),
            0x12 => Ok(Self::IntFields),
            0x13 => Ok(Self::FloatFields),
            other => Err(TableError::Corruption(format!(
                "unknown directory id: 0x{other:02X}"
            ))),
        }
    }

    pub fn to_byte(self) -> u8 {
        self as u8
    }
}

#[derive(Debug, Clone)]
pub struct Header {
    pub rows: u64,
    pub max_degree: u32,
    pub bool_fields: u32,
    pub int_fields: u32,
    pub float_fields: u32,
    pub manifest: Option<BlobRef>,
    pub manifest_crc: u32,
}

impl Header {
    pub fn new(rows: u64, max_degree: u32) -> Self {
        Self {
            rows,
            max_degree,
            bool_fields: 0,
            int_fields: 0,
            float_fields: 0,
            manifest: None,
            manifest_crc: 0,
        }
    }

    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_REGION_SIZE {
            return Err(TableError::Corruption(
                "header region shorter than expected".into(),
            ));
        }
        if &data[..MAGIC.len()] != MAGIC {
            return Err(TableError::Corruption(
                "invalid attribute table magic".into(),
            ));
        }

        let major = u16::from_le_bytes([data[8], data[9]]);
        let minor = u16::from_le_bytes([data[10], data[11]]);
        if major != VERSION_MAJOR || minor != VERSION_MINOR {
            return Err(TableError::Corruption(format!(
                "unsupported container version {major}.{minor}"
            )));
        }

        let rows = u64::from_le_bytes(data[12..20].try_into().expect("slice is 8 bytes"));
        let max_degree = u32::from_le_bytes(data[20..24].try_into().expect("slice is 4 bytes"));
        let bool_fields = u32::from_le_bytes(data[24..28].try_into().expect("slice is 4 bytes"));
        let int_fields = u32::from_le_bytes(data[28..32].try_into().expect("slice is 4 bytes"));
        let float_fields = u32::from_le_bytes(data[32..36].try_into().expect("slice is 4 bytes"));
        let manifest_off = u64::from_le_bytes(data[36..44].try_into().expect("slice is 8 bytes"));
        let manifest_len = u32::from_le_bytes(data[44..48].try_into().expect("slice is 4 bytes"));
        let manifest_crc = u32::from_le_bytes(data[48..52].try_into().expect("slice is 4 bytes"));

        Ok(Self {
            rows,
            max_degree,
            bool_fields,
            int_fields,
            float_fields,
            manifest: if manifest_off == 0 {
                None
            } else {
                Some(BlobRef {
                    offset: manifest_off,
                    len: manifest_len,
                })
            },
            manifest_crc,
        })
    }

    pub fn write(&self, data: &mut [u8]) -> Result<()> {
        if data.len() < HEADER_REGION_SIZE {
            return Err(TableError::Corruption(
                "header region shorter than expected".into(),
            ));
        }
        data.fill(0);
        data[..MAGIC.len()].copy_from_slice(MAGIC);
        data[8..10].copy_from_slice(&VERSION_MAJOR.to_le_bytes());
        data[10..12].copy_from_slice(&VERSION_MINOR.to_le_bytes());
        data[12..20].copy_from_slice(&self.rows.to_le_bytes());
        data[20..24].copy_from_slice(&self.max_degree.to_le_bytes());
        data[24..28].copy_from_slice(&self.bool_fields.to_le_bytes());
        data[28..32].copy_from_slice(&self.int_fields.to_le_bytes());
        data[32..36].copy_from_slice(&self.float_fields.to_le_bytes());
        let (off, len) = match self.manifest {
            Some(r) => (r.offset, r.len),
            None => (0, 0),
        };
        data[36..44].copy_from_slice(&off.to_le_bytes());
        data[44..48].copy_from_slice(&len.to_le_bytes());
        data[48..52].copy_from_slice(&self.manifest_crc.to_le_bytes());
        Ok(())
    }
}

/// Owns the backing file handle and the append cursor.
pub struct Container {
    file: File,
    file_len: u64,
}

impl Container {
    /// Creates (truncating) a new container with a zeroed header region.
    pub fn create(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        let mut container = Self { file, file_len: 0 };
        container.file.seek(SeekFrom::Start(0))?;
        container.file.write_all(&[0u8; HEADER_REGION_SIZE])?;
        container.file_len = HEADER_REGION_SIZE as u64;
        Ok(container)
    }

    /// Opens an existing container.
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_REGION_SIZE as u64 {
            return Err(TableError::Corruption(
                "container file shorter than the header region".into(),
            ));
        }
        Ok(Self { file, file_len })
    }

    pub fn read_header(&mut self) -> Result<Header> {
        let mut buf = [0u8; HEADER_REGION_SIZE];
        self.file.seek(SeekFrom::Start(0))?;
        self.file.read_exact(&mut buf)?;
        Header::read(&buf)
    }

    pub fn write_header(&mut self, header: &Header) -> Result<()> {
        let mut buf = [0u8; HEADER_REGION_SIZE];
        header.write(&mut buf)?;
        self.file.seek(SeekFrom::Start(0))?;
        self.file.write_all(&buf)?;
        Ok(())
    }

    /// Appends a blob to the body and returns its location.
    pub fn append_blob(&mut self, bytes: &[u8]) -> Result<BlobRef> {
        let len: u32 = bytes
            .len()
            .try_into()
            .map_err(|_| TableError::InvalidArgument("blob exceeds u32::MAX bytes".into()))?;
        let offset = self.file_len;
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(bytes)?;
        self.file_len += u64::from(len);
        Ok(BlobRef { offset, len })
    }

    pub fn read_blob(&mut self, blob: BlobRef) -> Result<Vec<u8>> {
        let end = blob
            .offset
            .checked_add(u64::from(blob.len))
            .ok_or_else(|| TableError::Corruption("blob offset overflow".into()))?;
        if blob.offset < HEADER_REGION_SIZE as u64 || end > self.file_len {
            return Err(TableError::Corruption(
                "blob reference outside the container body".into(),
            ));
        }
        let mut buf = vec![0u8; blob.len as usize];
        self.file.seek(SeekFrom::Start(blob.offset))?;
        self.file.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

/// Per-dataset metadata as stored in the manifest.
#[derive(Debug, Clone)]
pub struct DatasetMeta {
    pub id: DatasetId,
    pub rows: u64,
    pub cols: u32,
    pub chunk_rows: u32,
    pub chunk_cols: u32,
    pub fill_bits: u64,
    pub chunks: Vec<(u32, u32, BlobRef)>,
}

/// The manifest: every dataset plus the field-directory blobs.
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub datasets: Vec<DatasetMeta>,
    pub directories: Vec<(DirectoryId, BlobRef)>,
}

const MANIFEST_MAGIC: &[u8; 4] = b"ATTM";

impl Manifest {
    pub fn dataset(&self, id: DatasetId) -> Option<&DatasetMeta> {
        self.datasets.iter().find(|d| d.id == id)
    }

    pub fn directory(&self, id: DirectoryId) -> Option<BlobRef> {
        self.directories
            .iter()
            .find(|(d, _)| *d == id)
            .map(|(_, r)| *r)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(MANIFEST_MAGIC);

        let dataset_count: u32 = self
            .datasets
            .len()
            .try_into()
            .map_err(|_| TableError::InvalidArgument("too many datasets to serialize".into()))?;
        buf.extend_from_slice(&dataset_count.to_le_bytes());
        for ds in &self.datasets {
            buf.push(ds.id.to_byte());
            buf.extend_from_slice(&ds.rows.to_le_bytes());
            buf.extend_from_slice(&ds.cols.to_le_bytes());
            buf.extend_from_slice(&ds.chunk_rows.to_le_bytes());
            buf.extend_from_slice(&ds.chunk_cols.to_le_bytes());
            buf.extend_from_slice(&ds.fill_bits.to_le_bytes());
            let chunk_count: u32 = ds.chunks.len().try_into().map_err(|_| {
                TableError::InvalidArgument("too many chunks to serialize".into())
            })?;
            buf.extend_from_slice(&chunk_count.to_le_bytes());
            for (crow, ccol, blob) in &ds.chunks {
                buf.extend_from_slice(&crow.to_le_bytes());
                buf.extend_from_slice(&ccol.to_le_bytes());
                buf.extend_from_slice(&blob.offset.to_le_bytes());
                buf.extend_from_slice(&blob.len.to_le_bytes());
            }
        }

        buf.push(self.directories.len() as u8);
        for (id, blob) in &self.directories {
            buf.push(id.to_byte());
            buf.extend_from_slice(&blob.offset.to_le_bytes());
            buf.extend_from_slice(&blob.len.to_le_bytes());
        }
        Ok(buf)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut cursor = Reader::new(bytes);
        if cursor.take(4)? != &MANIFEST_MAGIC[..] {
            return Err(TableError::Corruption("invalid manifest magic".into()));
        }

        let dataset_count = cursor.take_u32()?;
        let mut datasets = Vec::with_capacity(dataset_count as usize);
        for _ in 0..dataset_count {
            let id = DatasetId::from_byte(cursor.take_u8()?)?;
            if datasets.iter().any(|d: &DatasetMeta| d.id == id) {
                return Err(TableError::Corruption(format!(
                    "duplicate dataset 0x{:02X} in manifest",
                    id.to_byte()
                )));
            }
            let rows = cursor.take_u64()?;
            let cols = cursor.take_u32()?;
            let chunk_rows = cursor.take_u32()?;
            let chunk_cols = cursor.take_u32()?;
            let fill_bits = cursor.take_u64()?;
            if chunk_rows == 0 || chunk_cols == 0 {
                return Err(TableError::Corruption(
                    "manifest declares a zero chunk dimension".into(),
                ));
            }
            let chunk_count = cursor.take_u32()?;
            let mut chunks = Vec::with_capacity(chunk_count as usize);
            for _ in 0..chunk_count {
                let crow = cursor.take_u32()?;
                let ccol = cursor.take_u32()?;
                let offset = cursor.take_u64()?;
                let len = cursor.take_u32()?;
                if offset == 0 || len == 0 {
                    return Err(TableError::Corruption(
                        "manifest chunk reference is empty".into(),
                    ));
                }
                chunks.push((crow, ccol, BlobRef { offset, len }));
            }
            datasets.push(DatasetMeta {
                id,
                rows,
                cols,
                chunk_rows,
                chunk_cols,
                fill_bits,
                chunks,
            });
        }

        let dir_count = cursor.take_u8()?;
        let mut directories = Vec::with_capacity(dir_count as usize);
        for _ in 0..dir_count {
            let id = DirectoryId::from_byte(cursor.take_u8()?)?;
            if directories.iter().any(|&(d, _)| d == id) {
                return Err(TableError::Corruption(format!(
                    "duplicate directory 0x{:02X} in manifest",
                    id.to_byte()
                )));
            }
            let offset = cursor.take_u64()?;
            let len = cursor.take_u32()?;
            directories.push((id, BlobRef { offset, len }));
        }

        if !cursor.is_empty() {
            return Err(TableError::Corruption(
                "trailing bytes after manifest".into(),
            ));
        }
        Ok(Self {
            datasets,
            directories,
        })
    }
}

/// Bounds-checked little-endian reader over a byte slice.
pub struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.bytes.len())
            .ok_or_else(|| TableError::Corruption("record truncated".into()))?;
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    pub fn take_u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn take_u16(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(
            self.take(2)?.try_into().expect("slice is 2 bytes"),
        ))
    }

    pub fn take_u32(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(
            self.take(4)?.try_into().expect("slice is 4 bytes"),
        ))
    }

    pub fn take_u64(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(
            self.take(8)?.try_into().expect("slice is 8 bytes"),
        ))
    }
}
