pub use kiln_base::hashing::{HashMap, HashSet};

pub mod io_queue;
pub use io_queue::{
    AsyncIoQueue, AsyncIoQueueConfig, IoCompletion, IoOperationHandle, IoOperationKind,
    IoQueueError, IoQueueStats, IoStatus,
};

mod handle;
pub use handle::{AssetHandle, AssetObject, RefOp};

mod load_error;
pub use load_error::{LoadError, LoadResult};

mod subscriptions;
pub use subscriptions::{AssetEvent, SubscriptionId};

mod loader;
pub use loader::{LoadInfo, LoadTicket};

use crate::loader::Loader;
use crossbeam_channel::{Receiver, Sender};
use kiln_base::{AssetPath, Platform};
use kiln_pipeline::{
    AssetPipeline, AssetTypeId, KilnProjectConfiguration, PreprocessorRegistry, SchemaSet,
};
use std::error::Error;
use std::path::Path;


// Asset lifecycle:
//
// Requested -> ResolvingCache -> (Preprocessing -> ResolvingCache) -> Fetching -> Deserializing
//
// - Cache resolution checks the entry for the running platform against the source fingerprint,
//   preprocessor version and cache format version. Anything but an exact match is regenerated.
// - Fetching reads just the blob through the async IO queue.
// - Deserializing decodes the blob and waits until every referenced asset is loaded. The object
//   is published to the object cache only after that, so callers never see an object whose
//   references are missing.
// - Any failure fails every waiter on the request, including requests that reference it.
//
// Only one request exists per path. Later callers join it. Once published, later callers are
// answered from the object cache until the last handle is released, at which point the type's
// teardown hook runs and the object is dropped.

fn process_ref_ops(
    loader: &mut Loader,
    rx: &Receiver<RefOp>,
) {
    while let Ok(ref_op) = rx.try_recv() {
        match ref_op {
            RefOp::Decrease(handle) => loader.remove_ref(handle),
            RefOp::Increase(handle) => loader.add_ref(handle),
        }
    }
}

/// Entry point for loading assets. Owns the pipeline, the IO queue and every loaded object.
///
/// Nothing happens in the background except file IO. Loads advance, callbacks run and released
/// objects are torn down only inside [`tick`](AssetManager::tick) or
/// [`load_blocking`](AssetManager::load_blocking), on the calling thread.
pub struct AssetManager {
    loader: Loader,
    ref_op_rx: Receiver<RefOp>,
}

impl AssetManager {
    pub fn new(
        platform: Platform,
        pipeline: AssetPipeline,
        io_config: AsyncIoQueueConfig,
    ) -> Result<Self, IoQueueError> {
        let (ref_op_tx, ref_op_rx): (Sender<RefOp>, Receiver<RefOp>) =
            crossbeam_channel::unbounded();
        let io_queue = AsyncIoQueue::new(io_config)?;
        let loader = Loader::new(platform, pipeline, io_queue, ref_op_tx);

        log::info!("Asset manager started for platform {}", platform);
        Ok(AssetManager { loader, ref_op_rx })
    }

    /// Finds the project file by searching upward from `search_location`, and loads loose json
    /// sources into the cache directory it names
    pub fn from_project(
        search_location: &Path,
        schema_set: SchemaSet,
        preprocessors: PreprocessorRegistry,
    ) -> Result<Self, Box<dyn Error>> {
        let project_configuration =
            KilnProjectConfiguration::locate_project_file(search_location)?;
        let pipeline = AssetPipeline::from_project(&project_configuration, schema_set, preprocessors)?;
        let io_config = AsyncIoQueueConfig {
            thread_count: project_configuration.io_thread_count,
            max_pending_operations: project_configuration.max_pending_io_operations,
        };

        Ok(AssetManager::new(
            project_configuration.platform,
            pipeline,
            io_config,
        )?)
    }

    pub fn platform(&self) -> Platform {
        self.loader.platform()
    }

    pub fn pipeline(&self) -> &AssetPipeline {
        self.loader.pipeline()
    }

    pub fn pipeline_mut(&mut self) -> &mut AssetPipeline {
        self.loader.pipeline_mut()
    }

    pub fn schema_set(&self) -> &SchemaSet {
        self.loader.pipeline().schema_set()
    }

    pub fn type_id(
        &self,
        type_name: &str,
    ) -> Option<AssetTypeId> {
        self.schema_set().type_id(type_name)
    }

    /// Starts loading an asset. `callback` runs during a later tick, even if the asset is
    /// already loaded. If `expected_type` is given, an object of any other type fails with
    /// TypeMismatch.
    pub fn load_async<F: FnOnce(LoadResult<AssetHandle>) + 'static>(
        &mut self,
        path: &AssetPath,
        expected_type: Option<AssetTypeId>,
        callback: F,
    ) -> LoadTicket {
        self.loader
            .load_async(path, expected_type, Box::new(callback))
    }

    /// Starts loading an asset, the result is collected with
    /// [`try_finish_load`](AssetManager::try_finish_load)
    pub fn begin_load(
        &mut self,
        path: &AssetPath,
        expected_type: Option<AssetTypeId>,
    ) -> LoadTicket {
        self.loader.begin_load(path, expected_type)
    }

    /// Returns the result of a load started with [`begin_load`](AssetManager::begin_load) once
    /// a tick has delivered it
    pub fn try_finish_load(
        &mut self,
        ticket: LoadTicket,
    ) -> Option<LoadResult<AssetHandle>> {
        self.loader.try_finish_load(ticket)
    }

    /// Loads an asset and waits for it. Other loads keep advancing while this waits, but their
    /// callbacks are held until the next tick.
    pub fn load_blocking(
        &mut self,
        path: &AssetPath,
        expected_type: Option<AssetTypeId>,
    ) -> LoadResult<AssetHandle> {
        profiling::scope!("AssetManager::load_blocking");
        let ticket = self.loader.begin_blocking_load(path, expected_type);
        loop {
            self.loader.process_events();
            process_ref_ops(&mut self.loader, &self.ref_op_rx);

            if let Some(result) = self.loader.take_blocking_result(ticket) {
                return result;
            }

            if self.loader.has_queued_events() {
                continue;
            }

            if self.loader.wait_for_io() == 0 && !self.loader.has_queued_events() {
                log::error!("Blocking load of {} has nothing left to wait on", path);
                self.loader.cancel(ticket);
                return Err(LoadError::Stalled(path.clone()));
            }
        }
    }

    /// Withdraws interest in a load. Returns false if the result was already delivered.
    pub fn cancel(
        &mut self,
        ticket: LoadTicket,
    ) -> bool {
        self.loader.cancel(ticket)
    }

    /// Drops a handle and applies the release immediately instead of on the next tick
    pub fn release(
        &mut self,
        handle: AssetHandle,
    ) {
        drop(handle);
        process_ref_ops(&mut self.loader, &self.ref_op_rx);
    }

    /// Evicts the cached data for an asset on every platform. Objects already handed out stay
    /// valid, later loads read the current source.
    pub fn invalidate(
        &mut self,
        path: &AssetPath,
    ) {
        self.loader.invalidate(path);
    }

    /// `callback` sees Loaded, Unloaded and Invalidated events for `path` during ticks
    pub fn subscribe<F: FnMut(&AssetEvent) + 'static>(
        &mut self,
        path: AssetPath,
        callback: F,
    ) -> SubscriptionId {
        self.loader.subscribe(path, Box::new(callback))
    }

    pub fn unsubscribe(
        &mut self,
        id: SubscriptionId,
    ) -> bool {
        self.loader.unsubscribe(id)
    }

    /// Advances every load, applies released handles and runs callbacks
    #[profiling::function]
    pub fn tick(&mut self) {
        self.loader.process_events();
        process_ref_ops(&mut self.loader, &self.ref_op_rx);
        self.loader.flush_notifications();
        self.loader.dispatch_asset_events();
    }

    pub fn load_info(
        &self,
        path: &AssetPath,
    ) -> Option<LoadInfo> {
        self.loader.load_info(path)
    }

    /// Number of load requests in flight
    pub fn active_request_count(&self) -> usize {
        self.loader.active_request_count()
    }

    /// Number of objects held, including invalidated ones that are still referenced
    pub fn loaded_count(&self) -> usize {
        self.loader.loaded_count()
    }

    pub fn io_stats(&self) -> IoQueueStats {
        self.loader.io_stats()
    }
}
