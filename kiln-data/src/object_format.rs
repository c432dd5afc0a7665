use crate::{AssetTypeId, DataError, DataResult, SchemaSet, SingleObject, Value};
use serde::{Deserialize, Serialize};

pub const OBJECT_FORMAT_MAGIC: [u8; 4] = *b"KOBJ";
pub const OBJECT_FORMAT_VERSION: u32 = 1;

// magic + little-endian format version
const OBJECT_HEADER_SIZE: usize = 8;

// Each field's value is encoded separately so a reader can skip fields it no longer knows
// about, and fall back to a default when the stored encoding doesn't fit the current type.
#[derive(Serialize, Deserialize)]
struct SerializedField {
    name: String,
    payload: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct SerializedObject {
    type_name: String,
    type_id: AssetTypeId,
    fields: Vec<SerializedField>,
}

/// Encodes an object to the binary form stored in cache entries. Fields are written in schema
/// order, so equal objects produce identical bytes.
pub fn serialize_object(object: &SingleObject) -> DataResult<Vec<u8>> {
    profiling::scope!("serialize_object");

    let schema = object.schema();
    let mut fields = Vec::with_capacity(schema.fields().len());
    for (field, value) in schema.fields().iter().zip(object.values()) {
        fields.push(SerializedField {
            name: field.name().to_string(),
            payload: bincode::serialize(value)?,
        });
    }

    let serialized = SerializedObject {
        type_name: schema.name().to_string(),
        type_id: schema.type_id(),
        fields,
    };

    let body_size = bincode::serialized_size(&serialized)? as usize;
    let mut data = Vec::with_capacity(OBJECT_HEADER_SIZE + body_size);
    data.extend_from_slice(&OBJECT_FORMAT_MAGIC);
    data.extend_from_slice(&OBJECT_FORMAT_VERSION.to_le_bytes());
    bincode::serialize_into(&mut data, &serialized)?;
    Ok(data)
}

/// Decodes an object produced by [`serialize_object`].
///
/// If `expected_type` is given and the stream holds a different type, this fails with
/// [`DataError::TypeMismatch`] before any field is read. Fields missing from the stream keep
/// their defaults, fields the schema no longer has are skipped, and fields whose stored value
/// doesn't fit the current field type are reset to the default with a warning.
pub fn deserialize_object(
    schema_set: &SchemaSet,
    data: &[u8],
    expected_type: Option<AssetTypeId>,
) -> DataResult<SingleObject> {
    profiling::scope!("deserialize_object");

    if data.len() < OBJECT_HEADER_SIZE {
        return Err(DataError::Corrupt(format!(
            "object is only {} bytes",
            data.len()
        )));
    }

    if data[0..4] != OBJECT_FORMAT_MAGIC {
        return Err(DataError::Corrupt("bad object magic".to_string()));
    }

    let mut version_bytes = [0u8; 4];
    version_bytes.copy_from_slice(&data[4..OBJECT_HEADER_SIZE]);
    let version = u32::from_le_bytes(version_bytes);
    if version > OBJECT_FORMAT_VERSION {
        return Err(DataError::UnsupportedVersion(version));
    }

    let serialized: SerializedObject = bincode::deserialize(&data[OBJECT_HEADER_SIZE..])?;

    if let Some(expected_type) = expected_type {
        if expected_type != serialized.type_id {
            return Err(DataError::TypeMismatch {
                expected: schema_set.type_name(expected_type),
                found: serialized.type_name,
            });
        }
    }

    let schema = schema_set
        .find_record(serialized.type_id)
        .ok_or_else(|| DataError::UnknownType(serialized.type_name.clone()))?;

    let mut object = SingleObject::new(schema);
    for field in serialized.fields {
        let index = match schema.find_field_index(&field.name) {
            Some(index) => index,
            None => {
                log::debug!(
                    "Skipping field {} no longer present in type {}",
                    field.name,
                    schema.name()
                );
                continue;
            }
        };

        match bincode::deserialize::<Value>(&field.payload) {
            Ok(value) => {
                if let Err(e) = object.set_by_index(index, value) {
                    log::warn!(
                        "Using default for {}.{}: {}",
                        schema.name(),
                        field.name,
                        e
                    );
                }
            }
            Err(e) => {
                log::warn!(
                    "Using default for {}.{}, stored value could not be decoded: {}",
                    schema.name(),
                    field.name,
                    e
                );
            }
        }
    }

    Ok(object)
}
