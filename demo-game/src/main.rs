use kiln::base::AssetPath;
use kiln::loader::{AssetEvent, AssetHandle, AssetManager, LoadResult};
use kiln::pipeline::{
    FieldType, PreprocessorRegistryBuilder, SchemaResult, SchemaSet, SchemaSetBuilder, Value,
};
use std::cell::RefCell;
use std::error::Error;
use std::path::PathBuf;
use std::rc::Rc;

pub fn project_path() -> PathBuf {
    PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data"))
}

fn register_types() -> SchemaResult<SchemaSet> {
    let mut builder = SchemaSetBuilder::default();
    builder.register_record_type("Texture", |x| {
        x.add_u32("width");
        x.add_u32("height");
        x.add_string("format")
            .set_default(Value::String("rgba8".to_string()));
        x.add_bytes("pixels");
        x.set_teardown(|context| {
            log::info!("Releasing GPU memory for {}", context.path);
        });
    })?;

    builder.register_record_type("Material", |x| {
        x.add_asset_ref("albedo", Some("Texture"));
        x.add_array("tint", FieldType::F32);
    })?;

    builder.register_record_type("Mesh", |x| {
        x.add_string("name");
        x.add_asset_ref("material", Some("Material"));
        x.add_array("lod_distances", FieldType::F32)
            .add_field_alias("lods");
    })?;

    builder.register_record_type("Character", |x| {
        x.add_string("name");
        x.add_u32("health").set_default(Value::U32(100));
        x.add_asset_ref("mesh", Some("Mesh"));
    })?;

    builder.build()
}

fn print_object(handle: &AssetHandle) {
    println!("{} ({})", handle.path(), handle.type_name());
    for (field, value) in handle
        .object()
        .schema()
        .fields()
        .iter()
        .zip(handle.object().values())
    {
        match value {
            Value::Bytes(bytes) => println!("  {}: {} bytes", field.name(), bytes.len()),
            value => println!("  {}: {:?}", field.name(), value),
        }
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    // Setup logging
    env_logger::Builder::default()
        .write_style(env_logger::WriteStyle::Always)
        .filter_level(log::LevelFilter::Debug)
        .init();

    let preprocessors = PreprocessorRegistryBuilder::with_standard_preprocessors().build()?;
    let mut asset_manager = AssetManager::from_project(&project_path(), register_types()?, preprocessors)?;

    let tree = AssetPath::parse("/Meshes/Tree")?;
    let hero = AssetPath::parse("/Characters:Hero")?;

    asset_manager.subscribe(tree.clone(), |event| match event {
        AssetEvent::Loaded(path) => println!("event: {} loaded", path),
        AssetEvent::Unloaded(path) => println!("event: {} unloaded", path),
        AssetEvent::Invalidated(path) => println!("event: {} invalidated", path),
    });

    let loaded_tree: Rc<RefCell<Option<LoadResult<AssetHandle>>>> = Default::default();
    let loaded_tree_clone = loaded_tree.clone();
    let mesh_type = asset_manager.type_id("Mesh");
    asset_manager.load_async(&tree, mesh_type, move |result| {
        *loaded_tree_clone.borrow_mut() = Some(result);
    });

    let character_type = asset_manager.type_id("Character");
    let hero_ticket = asset_manager.begin_load(&hero, character_type);
    let mut loaded_hero = None;

    while loaded_tree.borrow().is_none() || loaded_hero.is_none() {
        std::thread::sleep(std::time::Duration::from_millis(15));
        asset_manager.tick();

        if loaded_hero.is_none() {
            loaded_hero = asset_manager.try_finish_load(hero_ticket);
        }

        println!(
            "{} load requests in flight, {} objects loaded",
            asset_manager.active_request_count(),
            asset_manager.loaded_count()
        );
    }

    let tree_handle = loaded_tree.borrow_mut().take().ok_or("tree load vanished")??;
    let hero_handle = loaded_hero.ok_or("hero load vanished")??;
    print_object(&tree_handle);
    print_object(&hero_handle);

    // Already loaded, so this never touches the cache
    let texture = asset_manager.load_blocking(&AssetPath::parse("/Textures/Bark")?, None)?;
    print_object(&texture);

    let io_stats = asset_manager.io_stats();
    let cache_stats = asset_manager.pipeline().cache_store().stats();
    println!(
        "io: {} reads, {} completed. cache: {} lookups, {} hits, {} stores",
        io_stats.reads_submitted,
        io_stats.completed,
        cache_stats.lookups,
        cache_stats.hits,
        cache_stats.stores
    );

    asset_manager.release(texture);
    asset_manager.release(hero_handle);
    asset_manager.release(tree_handle);
    asset_manager.tick();

    println!("{} objects loaded after release", asset_manager.loaded_count());
    Ok(())
}
