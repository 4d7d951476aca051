//! Field registry and the on-disk field directories.
//!
//! Every field has a globally unique name and a slot inside its type group;
//! slots are dense, append-only and never reused. Each group persists a
//! directory blob of `(name, slot)` records; a missing directory simply
//! means the group has no fields yet.

use std::collections::BTreeMap;
use std::convert::TryInto;

use crate::error::{Result, TableError};
use crate::model::FieldType;
use crate::store::container::Reader;

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct FieldInfo {
    pub ty: FieldType,
    pub slot: u32,
}

#[derive(Debug, Default)]
pub struct SchemaRegistry {
    by_name: BTreeMap<String, FieldInfo>,
    bool_fields: Vec<String>,
    int_fields: Vec<String>,
    float_fields: Vec<String>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn group(&self, ty: FieldType) -> &Vec<String> {
        match ty {
            FieldType::Bool => &self.bool_fields,
            FieldType::Int => &self.int_fields,
            FieldType::Float => &self.float_fields,
            FieldType::String => unreachable!("string groups are rejected before lookup"),
        }
    }

    fn group_mut(&mut self, ty: FieldType) -> &mut Vec<String> {
        match ty {
            FieldType::Bool => &mut self.bool_fields,
            FieldType::Int => &mut self.int_fields,
            FieldType::Float => &mut self.float_fields,
            FieldType::String => unreachable!("string groups are rejected before lookup"),
        }
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn field_type(&self, name: &str) -> Result<FieldType> {
        self.by_name
            .get(name)
            .map(|info| info.ty)
            .ok_or_else(|| TableError::UnknownField(name.to_string()))
    }

    pub fn field_slot(&self, name: &str) -> Result<u32> {
        self.by_name
            .get(name)
            .map(|info| info.slot)
            .ok_or_else(|| TableError::UnknownField(name.to_string()))
    }

    pub fn count(&self, ty: FieldType) -> u32 {
        self.group(ty).len() as u32
    }

    /// Field names of one group in slot order.
    pub fn names(&self, ty: FieldType) -> &[String] {
        self.group(ty)
    }

    /// Fails without mutating if `name` exists in any group.
    pub fn ensure_absent(&self, name: &str) -> Result<()> {
        if self.has_field(name) {
            return Err(TableError::DuplicateField(name.to_string()));
        }
        Ok(())
    }

    /// Registers a field and returns its slot. Callers run the on-disk
    /// column extension first; registration is the commit point.
    pub fn register(&mut self, name: &str, ty: FieldType) -> Result<u32> {
        self.ensure_absent(name)?;
        if ty == FieldType::String {
            return Err(TableError::UnsupportedType(
                "string fields are not supported within attribute tables",
            ));
        }
        let slot = self.count(ty);
        self.by_name.insert(
            name.to_string(),
            FieldInfo { ty, slot },
        );
        self.group_mut(ty).push(name.to_string());
        Ok(slot)
    }

    /// Serializes one group's directory:
    /// `[count u32][name_len u16, name, slot u32]*[crc32 u32]`.
    pub fn encode_directory(&self, ty: FieldType) -> Result<Vec<u8>> {
        let names = self.group(ty);
        let mut buf = Vec::new();
        buf.extend_from_slice(&(names.len() as u32).to_le_bytes());
        for (slot, name) in names.iter().enumerate() {
            let name_bytes = name.as_bytes();
            let name_len: u16 = name_bytes.len().try_into().map_err(|_| {
                TableError::InvalidArgument("field name exceeds u16::MAX bytes".into())
            })?;
            buf.extend_from_slice(&name_len.to_le_bytes());
            buf.extend_from_slice(name_bytes);
            buf.extend_from_slice(&(slot as u32).to_le_bytes());
        }
        let crc = crc32fast::hash(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }

    /// Loads one group's directory into the registry, validating checksum,
    /// name uniqueness and dense slot assignment.
    pub fn load_directory(&mut self, ty: FieldType, bytes: &[u8]) -> Result<()> {
        if bytes.len() < 8 {
            return Err(TableError::Corruption("field directory truncated".into()));
        }
        let (body, tail) = bytes.split_at(bytes.len() - 4);
        let crc = u32::from_le_bytes(tail.try_into().expect("slice is 4 bytes"));
        if crc32fast::hash(body) != crc {
            return Err(TableError::Corruption(
                "field directory checksum mismatch".into(),
            ));
        }

        let mut cursor = Reader::new(body);
        let count = cursor.take_u32()?;
        for expected_slot in 0..count {
            let name_len = cursor.take_u16()? as usize;
            let name = std::str::from_utf8(cursor.take(name_len)?)
                .map_err(|_| TableError::Corruption("field name is not valid UTF-8".into()))?
                .to_string();
            let slot = cursor.take_u32()?;
            if slot != expected_slot {
                return Err(TableError::Corruption(format!(
                    "field '{name}' has slot {slot}, expected {expected_slot}"
                )));
            }
            if self.by_name.contains_key(&name) {
                return Err(TableError::Corruption(format!(
                    "field '{name}' appears in more than one directory"
                )));
            }
            self.by_name.insert(name.clone(), FieldInfo { ty, slot });
            self.group_mut(ty).push(name);
        }
        if !cursor.is_empty() {
            return Err(TableError::Corruption(
                "trailing bytes after field directory".into(),
            ));
        }
        Ok(())
    }
}
