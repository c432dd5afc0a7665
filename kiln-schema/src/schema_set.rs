use crate::{
    AssetTypeId, HashMap, RecordTypeBuilder, SchemaError, SchemaRecord, SchemaRecordField,
    SchemaResult,
};
use std::sync::Arc;

struct PendingRecord {
    name: String,
    builder: RecordTypeBuilder,
}

/// Accumulates asset type registrations. Types may reference each other in any order, references
/// are checked when the set is built.
#[derive(Default)]
pub struct SchemaSetBuilder {
    records: Vec<PendingRecord>,
}

impl SchemaSetBuilder {
    pub fn register_record_type<F: FnOnce(&mut RecordTypeBuilder)>(
        &mut self,
        name: impl Into<String>,
        f: F,
    ) -> SchemaResult<()> {
        let name = name.into();
        if self.records.iter().any(|record| record.name == name) {
            return Err(SchemaError::DuplicateType(name));
        }

        let mut builder = RecordTypeBuilder::default();
        (f)(&mut builder);

        self.records.push(PendingRecord { name, builder });
        Ok(())
    }

    pub fn build(self) -> SchemaResult<SchemaSet> {
        let known_ids: Vec<AssetTypeId> = self
            .records
            .iter()
            .map(|record| AssetTypeId::from_name(&record.name))
            .collect();

        let mut records = HashMap::default();
        let mut type_ids_by_name = HashMap::default();
        for pending in self.records {
            let mut fields = Vec::with_capacity(pending.builder.fields.len());
            for field in pending.builder.fields {
                if let Some(constraint) = field.field_type.asset_ref_constraint() {
                    if !known_ids.contains(&constraint) {
                        return Err(SchemaError::UnknownType(
                            field
                                .constraint_name
                                .unwrap_or_else(|| format!("{:?}", constraint)),
                        ));
                    }
                }

                let default_value = field
                    .default_value
                    .unwrap_or_else(|| field.field_type.default_value());
                fields.push(SchemaRecordField::new(
                    field.name,
                    field.aliases.into_boxed_slice(),
                    field.field_type,
                    default_value,
                ));
            }

            let record = SchemaRecord::new(
                pending.name.clone(),
                fields.into_boxed_slice(),
                pending.builder.teardown,
            )?;

            type_ids_by_name.insert(pending.name, record.type_id());
            records.insert(record.type_id(), record);
        }

        Ok(SchemaSet {
            inner: Arc::new(SchemaSetInner {
                records,
                type_ids_by_name,
            }),
        })
    }
}

#[derive(Default)]
pub struct SchemaSetInner {
    records: HashMap<AssetTypeId, SchemaRecord>,
    type_ids_by_name: HashMap<String, AssetTypeId>,
}

/// Read-only registry of every asset type known to the process. Cheap to clone.
#[derive(Clone, Default)]
pub struct SchemaSet {
    inner: Arc<SchemaSetInner>,
}

impl SchemaSet {
    pub fn find_record(
        &self,
        type_id: AssetTypeId,
    ) -> Option<&SchemaRecord> {
        self.inner.records.get(&type_id)
    }

    pub fn find_record_by_name(
        &self,
        name: &str,
    ) -> Option<&SchemaRecord> {
        let type_id = self.inner.type_ids_by_name.get(name)?;
        self.find_record(*type_id)
    }

    pub fn type_id(
        &self,
        name: &str,
    ) -> Option<AssetTypeId> {
        self.inner.type_ids_by_name.get(name).copied()
    }

    /// Human readable name of a type for messages, falls back to the hashed ID
    pub fn type_name(
        &self,
        type_id: AssetTypeId,
    ) -> String {
        match self.find_record(type_id) {
            Some(record) => record.name().to_string(),
            None => format!("{:?}", type_id),
        }
    }

    pub fn records(&self) -> impl Iterator<Item = &SchemaRecord> {
        self.inner.records.values()
    }

    pub fn len(&self) -> usize {
        self.inner.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.records.is_empty()
    }
}
