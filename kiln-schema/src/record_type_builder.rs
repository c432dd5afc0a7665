use crate::{AssetTypeId, FieldType, TeardownContext, TeardownFn, Value};
use std::sync::Arc;

pub struct RecordTypeFieldBuilder {
    pub(crate) name: String,
    pub(crate) aliases: Vec<String>,
    pub(crate) field_type: FieldType,
    pub(crate) default_value: Option<Value>,
    // Kept for error messages, the field type only holds the hashed ID
    pub(crate) constraint_name: Option<String>,
}

impl RecordTypeFieldBuilder {
    pub fn add_field_alias(
        &mut self,
        alias: impl Into<String>,
    ) -> &mut Self {
        self.aliases.push(alias.into());
        self
    }

    pub fn set_default(
        &mut self,
        value: Value,
    ) -> &mut Self {
        self.default_value = Some(value);
        self
    }
}

#[derive(Default)]
pub struct RecordTypeBuilder {
    pub(crate) fields: Vec<RecordTypeFieldBuilder>,
    pub(crate) teardown: Option<TeardownFn>,
}

impl RecordTypeBuilder {
    pub fn add_field(
        &mut self,
        name: impl Into<String>,
        field_type: FieldType,
    ) -> &mut RecordTypeFieldBuilder {
        self.fields.push(RecordTypeFieldBuilder {
            name: name.into(),
            aliases: Default::default(),
            field_type,
            default_value: None,
            constraint_name: None,
        });
        self.fields.last_mut().unwrap()
    }

    pub fn add_boolean(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::Boolean)
    }

    pub fn add_i32(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::I32)
    }

    pub fn add_i64(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::I64)
    }

    pub fn add_u32(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::U32)
    }

    pub fn add_u64(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::U64)
    }

    pub fn add_f32(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::F32)
    }

    pub fn add_f64(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::F64)
    }

    pub fn add_string(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::String)
    }

    pub fn add_bytes(
        &mut self,
        name: impl Into<String>,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::Bytes)
    }

    /// A reference to another asset. If `type_name` is given, the referenced asset must be of
    /// that type.
    pub fn add_asset_ref(
        &mut self,
        name: impl Into<String>,
        type_name: Option<&str>,
    ) -> &mut RecordTypeFieldBuilder {
        let field =
            self.add_field(name, FieldType::AssetRef(type_name.map(AssetTypeId::from_name)));
        field.constraint_name = type_name.map(str::to_string);
        field
    }

    pub fn add_array(
        &mut self,
        name: impl Into<String>,
        element_type: FieldType,
    ) -> &mut RecordTypeFieldBuilder {
        self.add_field(name, FieldType::Array(Box::new(element_type)))
    }

    /// Runs once when the last reference to a loaded object of this type is released
    pub fn set_teardown<F: Fn(&TeardownContext) + Send + Sync + 'static>(
        &mut self,
        f: F,
    ) {
        self.teardown = Some(Arc::new(f));
    }
}
