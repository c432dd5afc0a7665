use super::*;
use kiln_base::AssetPath;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn build_test_schema() -> SchemaSet {
    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Texture", |x| {
            x.add_u32("width");
            x.add_u32("height");
            x.add_bytes("pixels");
        })
        .unwrap();
    builder
        .register_record_type("Mesh", |x| {
            x.add_string("name").add_field_alias("label");
            x.add_f32("scale").set_default(Value::F32(1.0));
            x.add_asset_ref("texture", Some("Texture"));
            x.add_array("lods", FieldType::AssetRef(None));
        })
        .unwrap();
    builder.build().unwrap()
}

#[test]
fn lookup_by_name_and_id() {
    let schema_set = build_test_schema();
    assert_eq!(schema_set.len(), 2);

    let mesh = schema_set.find_record_by_name("Mesh").unwrap();
    assert_eq!(mesh.type_id(), AssetTypeId::from_name("Mesh"));
    assert_eq!(schema_set.type_id("Mesh"), Some(mesh.type_id()));
    assert_eq!(
        schema_set.find_record(mesh.type_id()).unwrap().name(),
        "Mesh"
    );
    assert!(schema_set.find_record_by_name("Sound").is_none());
}

#[test]
fn fields_resolve_through_aliases() {
    let schema_set = build_test_schema();
    let mesh = schema_set.find_record_by_name("Mesh").unwrap();

    assert_eq!(mesh.find_field_index("name"), Some(0));
    assert_eq!(mesh.find_field_index("label"), Some(0));
    assert_eq!(mesh.find_field_index("missing"), None);
    assert_eq!(
        mesh.find_field("scale").unwrap().default_value(),
        &Value::F32(1.0)
    );
    assert_eq!(
        mesh.find_field("texture").unwrap().field_type(),
        &FieldType::AssetRef(Some(AssetTypeId::from_name("Texture")))
    );
}

#[test]
fn defaults_follow_field_type() {
    let schema_set = build_test_schema();
    let texture = schema_set.find_record_by_name("Texture").unwrap();
    assert_eq!(
        texture.default_values(),
        vec![Value::U32(0), Value::U32(0), Value::Bytes(vec![])]
    );
}

#[test]
fn duplicate_type_is_rejected() {
    let mut builder = SchemaSetBuilder::default();
    builder.register_record_type("Mesh", |_| {}).unwrap();
    assert_eq!(
        builder.register_record_type("Mesh", |_| {}),
        Err(SchemaError::DuplicateType("Mesh".to_string()))
    );
}

#[test]
fn duplicate_field_or_alias_is_rejected() {
    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Mesh", |x| {
            x.add_string("name");
            x.add_string("title").add_field_alias("name");
        })
        .unwrap();
    assert_eq!(
        builder.build().err(),
        Some(SchemaError::DuplicateField {
            record: "Mesh".to_string(),
            field: "name".to_string()
        })
    );
}

#[test]
fn mismatched_default_is_rejected() {
    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Mesh", |x| {
            x.add_f32("scale").set_default(Value::I32(1));
        })
        .unwrap();
    assert!(matches!(
        builder.build(),
        Err(SchemaError::InvalidDefault { .. })
    ));
}

#[test]
fn reference_to_unknown_type_is_rejected() {
    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Mesh", |x| {
            x.add_asset_ref("material", Some("Material"));
        })
        .unwrap();
    assert_eq!(
        builder.build().err(),
        Some(SchemaError::UnknownType("Material".to_string()))
    );
}

#[test]
fn array_accepts_only_matching_elements() {
    let field_type = FieldType::Array(Box::new(FieldType::U32));
    assert!(field_type.accepts(&Value::Array(vec![Value::U32(1), Value::U32(2)])));
    assert!(!field_type.accepts(&Value::Array(vec![Value::U32(1), Value::I32(2)])));
    assert!(!field_type.accepts(&Value::U32(1)));
}

#[test]
fn visit_nested_asset_refs() {
    let a = AssetPath::parse("/A").unwrap();
    let b = AssetPath::parse("/B").unwrap();
    let value = Value::Array(vec![
        Value::AssetRef(Some(a.clone())),
        Value::AssetRef(None),
        Value::Array(vec![Value::AssetRef(Some(b.clone()))]),
    ]);

    let mut visited = Vec::default();
    value.visit_asset_refs(&mut |path| visited.push(path.clone()));
    assert_eq!(visited, vec![a, b]);
}

#[test]
fn teardown_hook_sees_field_values() {
    let calls = Arc::new(AtomicUsize::new(0));
    let calls_clone = calls.clone();

    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Sound", move |x| {
            x.add_string("clip").add_field_alias("file");
            x.set_teardown(move |context| {
                assert_eq!(context.path.as_str(), "/Audio/Boom");
                assert_eq!(
                    context.field("file").and_then(|x| x.as_string()),
                    Some("boom.wav")
                );
                calls_clone.fetch_add(1, Ordering::SeqCst);
            });
        })
        .unwrap();
    let schema_set = builder.build().unwrap();

    let sound = schema_set.find_record_by_name("Sound").unwrap();
    assert!(sound.has_teardown());
    sound.run_teardown(
        &AssetPath::parse("/Audio/Boom").unwrap(),
        &[Value::String("boom.wav".to_string())],
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}
