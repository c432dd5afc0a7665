use crate::{AssetTypeId, DataError, DataResult, SchemaRecord, Value};
use kiln_base::AssetPath;

/// A dependency of an object on another asset, discovered from its reference fields
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AssetReference {
    pub path: AssetPath,
    // Set when the field is constrained to one asset type
    pub expected_type: Option<AssetTypeId>,
}

/// The field values of one asset object, laid out in schema order. Fields that were never set
/// hold the schema's default.
#[derive(Clone, Debug)]
pub struct SingleObject {
    schema: SchemaRecord,
    values: Vec<Value>,
}

impl PartialEq for SingleObject {
    fn eq(
        &self,
        other: &Self,
    ) -> bool {
        self.schema.type_id() == other.schema.type_id() && self.values == other.values
    }
}

impl SingleObject {
    pub fn new(schema: &SchemaRecord) -> Self {
        SingleObject {
            schema: schema.clone(),
            values: schema.default_values(),
        }
    }

    pub fn schema(&self) -> &SchemaRecord {
        &self.schema
    }

    pub fn type_id(&self) -> AssetTypeId {
        self.schema.type_id()
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn get(
        &self,
        field_name: &str,
    ) -> Option<&Value> {
        let index = self.schema.find_field_index(field_name)?;
        self.values.get(index)
    }

    pub fn set(
        &mut self,
        field_name: &str,
        value: Value,
    ) -> DataResult<()> {
        let index = self
            .schema
            .find_field_index(field_name)
            .ok_or_else(|| DataError::UnknownField(field_name.to_string()))?;
        self.set_by_index(index, value)
    }

    pub(crate) fn set_by_index(
        &mut self,
        index: usize,
        value: Value,
    ) -> DataResult<()> {
        let field = &self.schema.fields()[index];
        if !field.field_type().accepts(&value) {
            return Err(DataError::InvalidFieldValue {
                field: field.name().to_string(),
                reason: format!("{:?} is not a {:?}", value, field.field_type()),
            });
        }

        self.values[index] = value;
        Ok(())
    }

    /// Every asset this object references, in field order. A path is listed once per distinct type
    /// constraint.
    pub fn asset_references(&self) -> Vec<AssetReference> {
        let mut references = Vec::<AssetReference>::default();
        for (field, value) in self.schema.fields().iter().zip(&self.values) {
            let expected_type = field.field_type().asset_ref_constraint();
            value.visit_asset_refs(&mut |path| {
                if !references
                    .iter()
                    .any(|x| x.path == *path && x.expected_type == expected_type)
                {
                    references.push(AssetReference {
                        path: path.clone(),
                        expected_type,
                    });
                }
            });
        }

        references
    }
}
