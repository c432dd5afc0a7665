use std::error::Error;
use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    DuplicateType(String),
    DuplicateField { record: String, field: String },
    // Field default does not match the field's declared type
    InvalidDefault { record: String, field: String },
    // An asset reference is constrained to a type that was never registered
    UnknownType(String),
}

impl Display for SchemaError {
    fn fmt(
        &self,
        f: &mut Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            SchemaError::DuplicateType(name) => write!(f, "type {} registered twice", name),
            SchemaError::DuplicateField { record, field } => {
                write!(f, "field or alias {} appears twice in {}", field, record)
            }
            SchemaError::InvalidDefault { record, field } => write!(
                f,
                "default value for {}.{} does not match the field type",
                record, field
            ),
            SchemaError::UnknownType(name) => write!(f, "type {} is not registered", name),
        }
    }
}

impl Error for SchemaError {}

pub type SchemaResult<T> = Result<T, SchemaError>;
