use kiln_base::AssetPath;
use serde::{Deserialize, Serialize};

/// A single field value of an asset object
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Boolean(bool),
    I32(i32),
    I64(i64),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    String(String),
    Bytes(Vec<u8>),
    // None is a null reference
    AssetRef(Option<AssetPath>),
    Array(Vec<Value>),
}

impl Value {
    pub fn as_boolean(&self) -> Option<bool> {
        match self {
            Value::Boolean(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::I64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::U64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Value::F32(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F64(x) => Some(*x),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(x) => Some(x),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(x) => Some(x),
            _ => None,
        }
    }

    /// Returns the referenced path. Null references and non-reference values both give None.
    pub fn as_asset_ref(&self) -> Option<&AssetPath> {
        match self {
            Value::AssetRef(x) => x.as_ref(),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(x) => Some(x),
            _ => None,
        }
    }

    /// Calls `f` for every non-null asset reference in this value, including references nested
    /// in arrays
    pub fn visit_asset_refs<F: FnMut(&AssetPath)>(
        &self,
        f: &mut F,
    ) {
        match self {
            Value::AssetRef(Some(path)) => f(path),
            Value::Array(values) => {
                for value in values {
                    value.visit_asset_refs(f);
                }
            }
            _ => {}
        }
    }
}
