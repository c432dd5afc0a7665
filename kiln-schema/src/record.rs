use crate::{SchemaError, SchemaResult, Value};
use kiln_base::{AssetPath, StringHash};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use std::ops::Deref;
use std::sync::Arc;

/// Stable ID of a registered asset type, derived from the type's name. Stored in serialized
/// objects so a decoder can verify it is reading the type it expects.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetTypeId(pub u128);

impl AssetTypeId {
    pub fn from_name(name: &str) -> Self {
        AssetTypeId(StringHash::from_runtime_str(name).hash())
    }

    pub fn as_u128(&self) -> u128 {
        self.0
    }
}

impl Debug for AssetTypeId {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_tuple("AssetTypeId")
            .field(&format!("{:0>32x}", self.0))
            .finish()
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum FieldType {
    Boolean,
    I32,
    I64,
    U32,
    U64,
    F32,
    F64,
    String,
    Bytes,
    // Reference to another asset, optionally constrained to one type
    AssetRef(Option<AssetTypeId>),
    Array(Box<FieldType>),
}

impl FieldType {
    /// The value a field of this type holds when nothing else was specified
    pub fn default_value(&self) -> Value {
        match self {
            FieldType::Boolean => Value::Boolean(false),
            FieldType::I32 => Value::I32(0),
            FieldType::I64 => Value::I64(0),
            FieldType::U32 => Value::U32(0),
            FieldType::U64 => Value::U64(0),
            FieldType::F32 => Value::F32(0.0),
            FieldType::F64 => Value::F64(0.0),
            FieldType::String => Value::String(String::default()),
            FieldType::Bytes => Value::Bytes(Vec::default()),
            FieldType::AssetRef(_) => Value::AssetRef(None),
            FieldType::Array(_) => Value::Array(Vec::default()),
        }
    }

    pub fn accepts(
        &self,
        value: &Value,
    ) -> bool {
        match (self, value) {
            (FieldType::Boolean, Value::Boolean(_)) => true,
            (FieldType::I32, Value::I32(_)) => true,
            (FieldType::I64, Value::I64(_)) => true,
            (FieldType::U32, Value::U32(_)) => true,
            (FieldType::U64, Value::U64(_)) => true,
            (FieldType::F32, Value::F32(_)) => true,
            (FieldType::F64, Value::F64(_)) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Bytes, Value::Bytes(_)) => true,
            (FieldType::AssetRef(_), Value::AssetRef(_)) => true,
            (FieldType::Array(inner), Value::Array(values)) => {
                values.iter().all(|value| inner.accepts(value))
            }
            _ => false,
        }
    }

    /// The type constraint on references held by this field, looking through arrays
    pub fn asset_ref_constraint(&self) -> Option<AssetTypeId> {
        match self {
            FieldType::AssetRef(constraint) => *constraint,
            FieldType::Array(inner) => inner.asset_ref_constraint(),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct SchemaRecordField {
    name: String,
    aliases: Box<[String]>,
    field_type: FieldType,
    default_value: Value,
}

impl SchemaRecordField {
    pub fn new(
        name: String,
        aliases: Box<[String]>,
        field_type: FieldType,
        default_value: Value,
    ) -> Self {
        SchemaRecordField {
            name,
            aliases,
            field_type,
            default_value,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Former names of this field. Data written under an alias is read into this field.
    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn field_type(&self) -> &FieldType {
        &self.field_type
    }

    pub fn default_value(&self) -> &Value {
        &self.default_value
    }
}

/// Passed to a record's teardown hook when the last reference to a loaded object goes away
pub struct TeardownContext<'a> {
    pub path: &'a AssetPath,
    pub record: &'a SchemaRecord,
    pub values: &'a [Value],
}

impl<'a> TeardownContext<'a> {
    pub fn field(
        &self,
        name: &str,
    ) -> Option<&'a Value> {
        let index = self.record.find_field_index(name)?;
        self.values.get(index)
    }
}

pub type TeardownFn = Arc<dyn Fn(&TeardownContext) + Send + Sync>;

pub struct SchemaRecordInner {
    name: String,
    type_id: AssetTypeId,
    fields: Box<[SchemaRecordField]>,
    teardown: Option<TeardownFn>,
}

impl Debug for SchemaRecordInner {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        f.debug_struct("SchemaRecord")
            .field("name", &self.name)
            .field("type_id", &self.type_id)
            .field("fields", &self.fields)
            .field("has_teardown", &self.teardown.is_some())
            .finish()
    }
}

/// The registered shape of one asset type. Cheap to clone.
#[derive(Clone, Debug)]
pub struct SchemaRecord {
    inner: Arc<SchemaRecordInner>,
}

impl Deref for SchemaRecord {
    type Target = SchemaRecordInner;

    fn deref(&self) -> &Self::Target {
        &*self.inner
    }
}

impl SchemaRecord {
    pub fn new(
        name: String,
        fields: Box<[SchemaRecordField]>,
        teardown: Option<TeardownFn>,
    ) -> SchemaResult<Self> {
        // Names and aliases share one namespace within a record
        let mut seen = Vec::<&str>::default();
        for field in &*fields {
            for field_name in std::iter::once(&field.name).chain(field.aliases.iter()) {
                if seen.contains(&field_name.as_str()) {
                    return Err(SchemaError::DuplicateField {
                        record: name,
                        field: field_name.clone(),
                    });
                }
                seen.push(field_name);
            }

            if !field.field_type.accepts(&field.default_value) {
                return Err(SchemaError::InvalidDefault {
                    record: name,
                    field: field.name.clone(),
                });
            }
        }

        let inner = SchemaRecordInner {
            type_id: AssetTypeId::from_name(&name),
            name,
            fields,
            teardown,
        };

        Ok(SchemaRecord {
            inner: Arc::new(inner),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn type_id(&self) -> AssetTypeId {
        self.type_id
    }

    pub fn fields(&self) -> &[SchemaRecordField] {
        &*self.fields
    }

    /// Finds a field by its current name, falling back to aliases
    pub fn find_field_index(
        &self,
        name: &str,
    ) -> Option<usize> {
        if let Some(index) = self.fields.iter().position(|field| field.name == name) {
            return Some(index);
        }

        self.fields
            .iter()
            .position(|field| field.aliases.iter().any(|alias| alias == name))
    }

    pub fn find_field(
        &self,
        name: &str,
    ) -> Option<&SchemaRecordField> {
        self.find_field_index(name).map(|index| &self.fields[index])
    }

    pub fn default_values(&self) -> Vec<Value> {
        self.fields
            .iter()
            .map(|field| field.default_value.clone())
            .collect()
    }

    pub fn has_teardown(&self) -> bool {
        self.teardown.is_some()
    }

    pub fn run_teardown(
        &self,
        path: &AssetPath,
        values: &[Value],
    ) {
        if let Some(teardown) = &self.teardown {
            (teardown)(&TeardownContext {
                path,
                record: self,
                values,
            });
        }
    }
}
