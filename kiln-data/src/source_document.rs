use crate::{DataError, DataResult, FieldType, SchemaSet, SingleObject, Value};
use kiln_base::{AssetPath, Platform};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

type JsonFields = serde_json::Map<String, serde_json::Value>;

// On-disk layout of an authored source asset:
// {
//     "type": "Mesh",
//     "fields": { "name": "tree", "texture": "/Env/Bark" },
//     "platform_overrides": { "linux": { "texture": "/Env/BarkLow" } }
// }
#[derive(Serialize, Deserialize)]
struct SourceDocumentJson {
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    fields: JsonFields,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    platform_overrides: BTreeMap<String, JsonFields>,
}

fn json_to_i64(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Number(number) => number.as_i64(),
        serde_json::Value::String(s) => s.parse::<i64>().ok(),
        _ => None,
    }
}

fn json_to_u64(value: &serde_json::Value) -> Option<u64> {
    match value {
        serde_json::Value::Number(number) => number.as_u64(),
        serde_json::Value::String(s) => s.parse::<u64>().ok(),
        _ => None,
    }
}

fn json_to_f64(value: &serde_json::Value) -> Option<f64> {
    match value {
        serde_json::Value::Number(number) => number.as_f64(),
        serde_json::Value::String(s) => s.parse::<f64>().ok(),
        _ => None,
    }
}

fn json_to_value(
    field_name: &str,
    field_type: &FieldType,
    json: &serde_json::Value,
) -> DataResult<Value> {
    let invalid = |reason: &str| DataError::InvalidFieldValue {
        field: field_name.to_string(),
        reason: format!("{} (found {})", reason, json),
    };

    let value = match field_type {
        FieldType::Boolean => Value::Boolean(json.as_bool().ok_or_else(|| invalid("expected a bool"))?),
        FieldType::I32 => Value::I32(
            json_to_i64(json)
                .and_then(|x| i32::try_from(x).ok())
                .ok_or_else(|| invalid("expected an i32"))?,
        ),
        FieldType::I64 => Value::I64(json_to_i64(json).ok_or_else(|| invalid("expected an i64"))?),
        FieldType::U32 => Value::U32(
            json_to_u64(json)
                .and_then(|x| u32::try_from(x).ok())
                .ok_or_else(|| invalid("expected a u32"))?,
        ),
        FieldType::U64 => Value::U64(json_to_u64(json).ok_or_else(|| invalid("expected a u64"))?),
        FieldType::F32 => {
            Value::F32(json_to_f64(json).ok_or_else(|| invalid("expected a number"))? as f32)
        }
        FieldType::F64 => Value::F64(json_to_f64(json).ok_or_else(|| invalid("expected a number"))?),
        FieldType::String => Value::String(
            json.as_str()
                .ok_or_else(|| invalid("expected a string"))?
                .to_string(),
        ),
        FieldType::Bytes => {
            let encoded = json
                .as_str()
                .ok_or_else(|| invalid("expected a base64 string"))?;
            Value::Bytes(base64::decode(encoded).map_err(|_| invalid("expected a base64 string"))?)
        }
        FieldType::AssetRef(_) => match json {
            serde_json::Value::Null => Value::AssetRef(None),
            serde_json::Value::String(s) => Value::AssetRef(Some(
                AssetPath::parse(s).map_err(|e| invalid(&e.to_string()))?,
            )),
            _ => return Err(invalid("expected an asset path or null")),
        },
        FieldType::Array(element_type) => {
            let elements = json
                .as_array()
                .ok_or_else(|| invalid("expected an array"))?;
            let mut values = Vec::with_capacity(elements.len());
            for element in elements {
                values.push(json_to_value(field_name, element_type, element)?);
            }
            Value::Array(values)
        }
    };

    Ok(value)
}

fn value_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Boolean(x) => serde_json::Value::from(*x),
        Value::I32(x) => serde_json::Value::from(*x),
        Value::I64(x) => serde_json::Value::from(*x),
        Value::U32(x) => serde_json::Value::from(*x),
        Value::U64(x) => serde_json::Value::from(*x),
        Value::F32(x) => serde_json::Value::from(*x),
        Value::F64(x) => serde_json::Value::from(*x),
        Value::String(x) => serde_json::Value::from(x.as_str()),
        Value::Bytes(x) => serde_json::Value::from(base64::encode(x)),
        Value::AssetRef(Some(x)) => serde_json::Value::from(x.as_str()),
        Value::AssetRef(None) => serde_json::Value::Null,
        Value::Array(x) => serde_json::Value::Array(x.iter().map(value_to_json).collect()),
    }
}

fn parse_fields(
    object: &SingleObject,
    json_fields: &JsonFields,
) -> DataResult<Vec<(usize, Value)>> {
    let schema = object.schema();
    let mut values = Vec::with_capacity(json_fields.len());
    for (name, json) in json_fields {
        let index = match schema.find_field_index(name) {
            Some(index) => index,
            None => {
                log::warn!(
                    "Ignoring field {} in source, type {} has no such field",
                    name,
                    schema.name()
                );
                continue;
            }
        };

        let field = &schema.fields()[index];
        values.push((index, json_to_value(field.name(), field.field_type(), json)?));
    }

    Ok(values)
}

/// A parsed source asset: the authored object, plus per-platform field overrides
#[derive(Clone, Debug)]
pub struct SourceDocument {
    object: SingleObject,
    platform_overrides: Vec<(Platform, Vec<(usize, Value)>)>,
}

impl SourceDocument {
    pub fn parse(
        schema_set: &SchemaSet,
        data: &[u8],
    ) -> DataResult<SourceDocument> {
        profiling::scope!("SourceDocument::parse");

        let json: SourceDocumentJson = serde_json::from_slice(data)?;
        let schema = schema_set
            .find_record_by_name(&json.type_name)
            .ok_or_else(|| DataError::UnknownType(json.type_name.clone()))?;

        let mut object = SingleObject::new(schema);
        for (index, value) in parse_fields(&object, &json.fields)? {
            object.set_by_index(index, value)?;
        }

        let mut platform_overrides = Vec::with_capacity(json.platform_overrides.len());
        for (platform_name, json_fields) in &json.platform_overrides {
            let platform = Platform::from_name(platform_name).ok_or_else(|| {
                DataError::InvalidFieldValue {
                    field: "platform_overrides".to_string(),
                    reason: format!("unknown platform {}", platform_name),
                }
            })?;
            platform_overrides.push((platform, parse_fields(&object, json_fields)?));
        }

        Ok(SourceDocument {
            object,
            platform_overrides,
        })
    }

    /// The object as authored, with no platform overrides applied
    pub fn object(&self) -> &SingleObject {
        &self.object
    }

    pub fn object_for_platform(
        &self,
        platform: Platform,
    ) -> SingleObject {
        let mut object = self.object.clone();
        for (override_platform, values) in &self.platform_overrides {
            if *override_platform == platform {
                for (index, value) in values {
                    // Types were checked while parsing
                    let _ = object.set_by_index(*index, value.clone());
                }
            }
        }

        object
    }

    /// Writes an object back out in source form. Fields still holding their default are
    /// omitted.
    pub fn object_to_json_string(object: &SingleObject) -> DataResult<String> {
        let schema = object.schema();
        let mut fields = JsonFields::default();
        for (field, value) in schema.fields().iter().zip(object.values()) {
            if value != field.default_value() {
                fields.insert(field.name().to_string(), value_to_json(value));
            }
        }

        let json = SourceDocumentJson {
            type_name: schema.name().to_string(),
            fields,
            platform_overrides: Default::default(),
        };

        Ok(serde_json::to_string_pretty(&json)?)
    }
}
