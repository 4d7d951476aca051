/// Zero-based feature identifier, used as the row index into every dataset.
pub type Fid = u64;

/// Data type of an attribute field.
///
/// Fields are grouped into separate on-disk arrays by type. `String` exists
/// so that requests for string columns can be rejected explicitly; the
/// container does not store string data.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
}

impl FieldType {
    pub fn name(self) -> &'static str {
        match self {
            FieldType::Bool => "bool",
            FieldType::Int => "int",
            FieldType::Float => "float",
            FieldType::String => "string",
        }
    }
}

/// A field requested during bulk schema setup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ty: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// An owned, detached snapshot of one feature row.
///
/// Produced by checkout; mutations are invisible to the store until the
/// feature is returned with `sync = true`. Vector lengths correspond to the
/// per-type field counts at checkout time, in slot order.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub fid: Fid,
    pub bools: Vec<bool>,
    pub ints: Vec<i64>,
    pub floats: Vec<f64>,
    pub neighbours: Vec<Fid>,
}

impl Feature {
    pub fn new(fid: Fid) -> Self {
        Self {
            fid,
            bools: Vec::new(),
            ints: Vec::new(),
            floats: Vec::new(),
            neighbours: Vec::new(),
        }
    }
}
