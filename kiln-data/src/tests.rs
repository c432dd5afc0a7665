use super::*;
use kiln_base::{AssetPath, Platform};

fn mesh_schema_set(extra_fields: bool) -> SchemaSet {
    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Texture", |x| {
            x.add_u32("width");
        })
        .unwrap();
    builder
        .register_record_type("Mesh", |x| {
            x.add_string("name");
            x.add_f32("scale").set_default(Value::F32(1.0));
            x.add_asset_ref("texture", Some("Texture"));
            x.add_array("lods", FieldType::AssetRef(None));
            if extra_fields {
                x.add_u32("vertex_count");
            }
        })
        .unwrap();
    builder.build().unwrap()
}

fn path(s: &str) -> AssetPath {
    AssetPath::parse(s).unwrap()
}

fn sample_mesh(schema_set: &SchemaSet) -> SingleObject {
    let mut object = SingleObject::new(schema_set.find_record_by_name("Mesh").unwrap());
    object
        .set("name", Value::String("tree".to_string()))
        .unwrap();
    object
        .set("texture", Value::AssetRef(Some(path("/Env/Bark"))))
        .unwrap();
    object
        .set(
            "lods",
            Value::Array(vec![
                Value::AssetRef(Some(path("/Env/TreeLod1"))),
                Value::AssetRef(Some(path("/Env/Bark"))),
            ]),
        )
        .unwrap();
    object
}

#[test]
fn new_object_holds_defaults() {
    let schema_set = mesh_schema_set(false);
    let object = SingleObject::new(schema_set.find_record_by_name("Mesh").unwrap());
    assert_eq!(object.get("scale"), Some(&Value::F32(1.0)));
    assert_eq!(object.get("texture"), Some(&Value::AssetRef(None)));
    assert_eq!(object.get("missing"), None);
}

#[test]
fn set_checks_field_type() {
    let schema_set = mesh_schema_set(false);
    let mut object = SingleObject::new(schema_set.find_record_by_name("Mesh").unwrap());
    assert!(matches!(
        object.set("scale", Value::String("big".to_string())),
        Err(DataError::InvalidFieldValue { .. })
    ));
    assert!(matches!(
        object.set("colour", Value::U32(1)),
        Err(DataError::UnknownField(_))
    ));
}

#[test]
fn references_are_deduplicated_in_field_order() {
    let schema_set = mesh_schema_set(false);
    let mut object = sample_mesh(&schema_set);
    object
        .set(
            "lods",
            Value::Array(vec![
                Value::AssetRef(Some(path("/Env/TreeLod1"))),
                Value::AssetRef(Some(path("/Env/Bark"))),
                Value::AssetRef(Some(path("/Env/TreeLod1"))),
            ]),
        )
        .unwrap();

    // Bark is listed once per constraint it is referenced under
    assert_eq!(
        object.asset_references(),
        vec![
            AssetReference {
                path: path("/Env/Bark"),
                expected_type: schema_set.type_id("Texture"),
            },
            AssetReference {
                path: path("/Env/TreeLod1"),
                expected_type: None,
            },
            AssetReference {
                path: path("/Env/Bark"),
                expected_type: None,
            },
        ]
    );
}

#[test]
fn serialize_then_deserialize() {
    let schema_set = mesh_schema_set(false);
    let object = sample_mesh(&schema_set);
    let data = serialize_object(&object).unwrap();
    let restored = deserialize_object(&schema_set, &data, schema_set.type_id("Mesh")).unwrap();
    assert_eq!(restored, object);
}

#[test]
fn serialization_is_deterministic() {
    let schema_set = mesh_schema_set(false);
    let a = serialize_object(&sample_mesh(&schema_set)).unwrap();
    let b = serialize_object(&sample_mesh(&schema_set)).unwrap();
    assert_eq!(a, b);
}

#[test]
fn type_tag_mismatch_is_reported() {
    let schema_set = mesh_schema_set(false);
    let data = serialize_object(&sample_mesh(&schema_set)).unwrap();
    match deserialize_object(&schema_set, &data, schema_set.type_id("Texture")) {
        Err(DataError::TypeMismatch { expected, found }) => {
            assert_eq!(expected, "Texture");
            assert_eq!(found, "Mesh");
        }
        other => panic!("unexpected result {:?}", other),
    }
}

#[test]
fn fields_added_later_take_defaults() {
    let old_schema = mesh_schema_set(false);
    let new_schema = mesh_schema_set(true);
    let data = serialize_object(&sample_mesh(&old_schema)).unwrap();

    let restored = deserialize_object(&new_schema, &data, None).unwrap();
    assert_eq!(restored.get("vertex_count"), Some(&Value::U32(0)));
    assert_eq!(
        restored.get("name"),
        Some(&Value::String("tree".to_string()))
    );
}

#[test]
fn fields_removed_later_are_skipped() {
    let old_schema = mesh_schema_set(true);
    let new_schema = mesh_schema_set(false);
    let mut object = sample_mesh(&old_schema);
    object.set("vertex_count", Value::U32(300)).unwrap();
    let data = serialize_object(&object).unwrap();

    let restored = deserialize_object(&new_schema, &data, None).unwrap();
    assert_eq!(restored, sample_mesh(&new_schema));
}

#[test]
fn renamed_and_retyped_fields() {
    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Light", |x| {
            x.add_u32("intensity");
            x.add_string("label");
        })
        .unwrap();
    let old_schema = builder.build().unwrap();

    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Light", |x| {
            // Was a u32, stored values no longer fit
            x.add_f32("intensity").set_default(Value::F32(0.5));
            x.add_string("name").add_field_alias("label");
        })
        .unwrap();
    let new_schema = builder.build().unwrap();

    let mut object = SingleObject::new(old_schema.find_record_by_name("Light").unwrap());
    object.set("intensity", Value::U32(7)).unwrap();
    object
        .set("label", Value::String("sun".to_string()))
        .unwrap();
    let data = serialize_object(&object).unwrap();

    let restored = deserialize_object(&new_schema, &data, None).unwrap();
    assert_eq!(restored.get("intensity"), Some(&Value::F32(0.5)));
    assert_eq!(restored.get("name"), Some(&Value::String("sun".to_string())));
}

#[test]
fn corrupt_data_is_rejected() {
    let schema_set = mesh_schema_set(false);
    let data = serialize_object(&sample_mesh(&schema_set)).unwrap();

    let error = deserialize_object(&schema_set, &data[0..3], None).unwrap_err();
    assert!(error.is_corruption());

    let mut bad_magic = data.clone();
    bad_magic[0] = b'X';
    assert!(deserialize_object(&schema_set, &bad_magic, None)
        .unwrap_err()
        .is_corruption());

    let truncated = &data[0..data.len() / 2];
    assert!(deserialize_object(&schema_set, truncated, None)
        .unwrap_err()
        .is_corruption());

    let mut newer = data.clone();
    newer[4..8].copy_from_slice(&(OBJECT_FORMAT_VERSION + 1).to_le_bytes());
    assert!(matches!(
        deserialize_object(&schema_set, &newer, None),
        Err(DataError::UnsupportedVersion(_))
    ));
}

#[test]
fn unknown_type_in_blob() {
    let schema_set = mesh_schema_set(false);
    let data = serialize_object(&sample_mesh(&schema_set)).unwrap();

    let mut builder = SchemaSetBuilder::default();
    builder
        .register_record_type("Texture", |x| {
            x.add_u32("width");
        })
        .unwrap();
    let other_schema = builder.build().unwrap();

    assert!(matches!(
        deserialize_object(&other_schema, &data, None),
        Err(DataError::UnknownType(_))
    ));
}

#[test]
fn parse_source_with_platform_overrides() {
    let schema_set = mesh_schema_set(false);
    let source = br#"{
        "type": "Mesh",
        "fields": {
            "name": "tree",
            "scale": 2.5,
            "texture": "/Env/Bark",
            "lods": ["/Env/TreeLod1", null],
            "unused": 12
        },
        "platform_overrides": {
            "linux": { "texture": "/Env/BarkLow" }
        }
    }"#;

    let document = SourceDocument::parse(&schema_set, source).unwrap();
    let pc = document.object_for_platform(Platform::Pc);
    assert_eq!(pc.get("scale"), Some(&Value::F32(2.5)));
    assert_eq!(
        pc.get("texture").and_then(|x| x.as_asset_ref()),
        Some(&path("/Env/Bark"))
    );
    assert_eq!(
        pc.get("lods"),
        Some(&Value::Array(vec![
            Value::AssetRef(Some(path("/Env/TreeLod1"))),
            Value::AssetRef(None)
        ]))
    );

    let linux = document.object_for_platform(Platform::Linux);
    assert_eq!(
        linux.get("texture").and_then(|x| x.as_asset_ref()),
        Some(&path("/Env/BarkLow"))
    );
    assert_eq!(document.object(), &pc);
}

#[test]
fn bad_source_values_are_rejected() {
    let schema_set = mesh_schema_set(false);

    let wrong_type = br#"{ "type": "Mesh", "fields": { "scale": "huge" } }"#;
    assert!(matches!(
        SourceDocument::parse(&schema_set, wrong_type),
        Err(DataError::InvalidFieldValue { .. })
    ));

    let bad_path = br#"{ "type": "Mesh", "fields": { "texture": "Env/Bark" } }"#;
    assert!(matches!(
        SourceDocument::parse(&schema_set, bad_path),
        Err(DataError::InvalidFieldValue { .. })
    ));

    let unknown_type = br#"{ "type": "Sound" }"#;
    assert!(matches!(
        SourceDocument::parse(&schema_set, unknown_type),
        Err(DataError::UnknownType(_))
    ));

    let unknown_platform = br#"{ "type": "Mesh", "platform_overrides": { "n64": {} } }"#;
    assert!(SourceDocument::parse(&schema_set, unknown_platform).is_err());

    assert!(matches!(
        SourceDocument::parse(&schema_set, b"not json"),
        Err(DataError::JsonError(_))
    ));
}

#[test]
fn source_json_round_trip() {
    let schema_set = mesh_schema_set(false);
    let object = sample_mesh(&schema_set);
    let json = SourceDocument::object_to_json_string(&object).unwrap();
    assert!(!json.contains("scale"));

    let document = SourceDocument::parse(&schema_set, json.as_bytes()).unwrap();
    assert_eq!(document.object(), &object);
}
