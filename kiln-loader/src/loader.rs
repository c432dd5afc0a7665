use crate::handle::{AssetHandle, AssetObject, RefOp};
use crate::io_queue::{AsyncIoQueue, IoCompletion, IoOperationHandle, IoQueueStats, IoStatus};
use crate::subscriptions::{AssetEvent, SubscriptionId, Subscriptions};
use crate::{HashMap, HashSet, LoadError, LoadResult};
use crossbeam_channel::{Receiver, Sender};
use kiln_base::{AssetPath, LoadHandle, LoadState, Platform};
use kiln_pipeline::{
    deserialize_object, AssetPipeline, AssetTypeId, CacheEntry, CacheResolution, DataError,
    PipelineError, SingleObject,
};
use std::collections::VecDeque;
use std::sync::Arc;

// An entry that is still unusable right after being regenerated won't get better by trying again
const MAX_PREPROCESS_ATTEMPTS: u32 = 2;

/// Identifies one caller's interest in a load. Used to cancel it or to collect a polled result.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct LoadTicket(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
struct RequestId(u64);

pub type LoadCallback = Box<dyn FnOnce(LoadResult<AssetHandle>)>;

enum Waiter {
    Callback {
        ticket: LoadTicket,
        expected_type: Option<AssetTypeId>,
        callback: LoadCallback,
    },
    // Result is parked until collected with try_finish_load
    Polled {
        ticket: LoadTicket,
        expected_type: Option<AssetTypeId>,
    },
    // Result is taken directly by load_blocking
    Blocking {
        ticket: LoadTicket,
        expected_type: Option<AssetTypeId>,
    },
    // Another request that references this asset
    Dependent {
        parent: RequestId,
        expected_type: Option<AssetTypeId>,
    },
}

impl Waiter {
    fn expected_type(&self) -> Option<AssetTypeId> {
        match self {
            Waiter::Callback { expected_type, .. } => *expected_type,
            Waiter::Polled { expected_type, .. } => *expected_type,
            Waiter::Blocking { expected_type, .. } => *expected_type,
            Waiter::Dependent { expected_type, .. } => *expected_type,
        }
    }

    fn ticket(&self) -> Option<LoadTicket> {
        match self {
            Waiter::Callback { ticket, .. } => Some(*ticket),
            Waiter::Polled { ticket, .. } => Some(*ticket),
            Waiter::Blocking { ticket, .. } => Some(*ticket),
            Waiter::Dependent { .. } => None,
        }
    }

    fn is_dependent_of(
        &self,
        request_id: RequestId,
    ) -> bool {
        matches!(self, Waiter::Dependent { parent, .. } if *parent == request_id)
    }
}

// Decoded, but not published until every referenced asset has loaded
struct PendingObject {
    object: SingleObject,
    waiting_on: Vec<RequestId>,
    dependencies: Vec<AssetHandle>,
}

enum RequestState {
    Requested,
    ResolvingCache,
    Preprocessing,
    Fetching { operation: IoOperationHandle },
    Deserializing(Box<PendingObject>),
}

// The type every waiter asks for, if they agree. Otherwise each waiter checks the type itself
// once the object is published.
fn common_expected_type(waiters: &[Waiter]) -> Option<AssetTypeId> {
    let expected_type = waiters.first()?.expected_type()?;
    if waiters
        .iter()
        .all(|x| x.expected_type() == Some(expected_type))
    {
        Some(expected_type)
    } else {
        None
    }
}

impl RequestState {
    fn load_state(&self) -> LoadState {
        match self {
            RequestState::Requested => LoadState::Requested,
            RequestState::ResolvingCache => LoadState::ResolvingCache,
            RequestState::Preprocessing => LoadState::Preprocessing,
            RequestState::Fetching { .. } => LoadState::Fetching,
            RequestState::Deserializing(_) => LoadState::Deserializing,
        }
    }
}

struct LoadRequest {
    path: AssetPath,
    state: RequestState,
    waiters: Vec<Waiter>,
    preprocess_attempts: u32,
}

struct LoadedAsset {
    object: Arc<AssetObject>,
    ref_count: u32,
    // Keeps referenced assets loaded for as long as this one is
    dependencies: Vec<AssetHandle>,
}

enum LoaderEvent {
    Advance(RequestId),
    FetchComplete(RequestId, IoCompletion),
}

struct Notification {
    waiter: Waiter,
    result: LoadResult<AssetHandle>,
}

/// Diagnostics for one asset path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadInfo {
    pub state: LoadState,
    // Handles held on the published object, 0 while a request is still in flight
    pub ref_count: u32,
    pub load_handle: Option<LoadHandle>,
    pub type_name: Option<String>,
    pub waiter_count: usize,
}

/// Drives load requests through cache resolution, preprocessing, reading and decoding, and owns
/// every loaded object. Only ever touched from the thread that ticks it.
pub(crate) struct Loader {
    platform: Platform,
    pipeline: AssetPipeline,
    io_queue: AsyncIoQueue,
    events_tx: Sender<LoaderEvent>,
    events_rx: Receiver<LoaderEvent>,
    ref_op_tx: Sender<RefOp>,

    // At most one request per path
    requests: HashMap<RequestId, LoadRequest>,
    request_by_path: HashMap<AssetPath, RequestId>,

    loaded: HashMap<LoadHandle, LoadedAsset>,
    // The current object for a path. Invalidated objects stay in `loaded` until released.
    loaded_by_path: HashMap<AssetPath, LoadHandle>,

    notifications: VecDeque<Notification>,
    finished_polls: HashMap<LoadTicket, LoadResult<AssetHandle>>,
    subscriptions: Subscriptions,

    next_request_id: u64,
    next_ticket: u64,
    next_load_handle: u64,
}

impl Loader {
    pub(crate) fn new(
        platform: Platform,
        pipeline: AssetPipeline,
        io_queue: AsyncIoQueue,
        ref_op_tx: Sender<RefOp>,
    ) -> Self {
        let (events_tx, events_rx) = crossbeam_channel::unbounded();
        Loader {
            platform,
            pipeline,
            io_queue,
            events_tx,
            events_rx,
            ref_op_tx,
            requests: Default::default(),
            request_by_path: Default::default(),
            loaded: Default::default(),
            loaded_by_path: Default::default(),
            notifications: Default::default(),
            finished_polls: Default::default(),
            subscriptions: Default::default(),
            next_request_id: 1,
            next_ticket: 1,
            next_load_handle: 1,
        }
    }

    pub(crate) fn platform(&self) -> Platform {
        self.platform
    }

    pub(crate) fn pipeline(&self) -> &AssetPipeline {
        &self.pipeline
    }

    pub(crate) fn pipeline_mut(&mut self) -> &mut AssetPipeline {
        &mut self.pipeline
    }

    pub(crate) fn io_stats(&self) -> IoQueueStats {
        self.io_queue.stats()
    }

    pub(crate) fn active_request_count(&self) -> usize {
        self.requests.len()
    }

    pub(crate) fn loaded_count(&self) -> usize {
        self.loaded.len()
    }

    fn allocate_ticket(&mut self) -> LoadTicket {
        let ticket = LoadTicket(self.next_ticket);
        self.next_ticket += 1;
        ticket
    }

    fn send_event(
        &self,
        event: LoaderEvent,
    ) {
        // The receiver lives as long as self
        let _ = self.events_tx.send(event);
    }

    pub(crate) fn load_async(
        &mut self,
        path: &AssetPath,
        expected_type: Option<AssetTypeId>,
        callback: LoadCallback,
    ) -> LoadTicket {
        let ticket = self.allocate_ticket();
        self.attach(
            path,
            Waiter::Callback {
                ticket,
                expected_type,
                callback,
            },
        );
        ticket
    }

    pub(crate) fn begin_load(
        &mut self,
        path: &AssetPath,
        expected_type: Option<AssetTypeId>,
    ) -> LoadTicket {
        let ticket = self.allocate_ticket();
        self.attach(
            path,
            Waiter::Polled {
                ticket,
                expected_type,
            },
        );
        ticket
    }

    pub(crate) fn begin_blocking_load(
        &mut self,
        path: &AssetPath,
        expected_type: Option<AssetTypeId>,
    ) -> LoadTicket {
        let ticket = self.allocate_ticket();
        self.attach(
            path,
            Waiter::Blocking {
                ticket,
                expected_type,
            },
        );
        ticket
    }

    pub(crate) fn try_finish_load(
        &mut self,
        ticket: LoadTicket,
    ) -> Option<LoadResult<AssetHandle>> {
        self.finished_polls.remove(&ticket)
    }

    pub(crate) fn take_blocking_result(
        &mut self,
        ticket: LoadTicket,
    ) -> Option<LoadResult<AssetHandle>> {
        let index = self
            .notifications
            .iter()
            .position(|x| matches!(x.waiter, Waiter::Blocking { ticket: t, .. } if t == ticket))?;
        self.notifications.remove(index).map(|x| x.result)
    }

    // Joins an in-flight request for the path, answers from the object cache, or starts a new
    // request. Returns the request the waiter was attached to, if any.
    fn attach(
        &mut self,
        path: &AssetPath,
        waiter: Waiter,
    ) -> Option<RequestId> {
        if let Some(&request_id) = self.request_by_path.get(path) {
            if let Some(request) = self.requests.get_mut(&request_id) {
                log::trace!("Joining in-flight load of {}", path);
                request.waiters.push(waiter);
                return Some(request_id);
            }
        }

        if let Some(&load_handle) = self.loaded_by_path.get(path) {
            log::trace!("{} is already loaded", path);
            let result = self.checked_handle(load_handle, path, waiter.expected_type());
            self.deliver(waiter, path, None, result);
            return None;
        }

        let request_id = RequestId(self.next_request_id);
        self.next_request_id += 1;

        log::debug!("Requesting load of {}", path);
        self.requests.insert(
            request_id,
            LoadRequest {
                path: path.clone(),
                state: RequestState::Requested,
                waiters: vec![waiter],
                preprocess_attempts: 0,
            },
        );
        self.request_by_path.insert(path.clone(), request_id);
        self.send_event(LoaderEvent::Advance(request_id));
        Some(request_id)
    }

    // Counts a new reference to a loaded object and hands out a handle for it, if it is the type
    // the caller asked for
    fn checked_handle(
        &mut self,
        load_handle: LoadHandle,
        path: &AssetPath,
        expected_type: Option<AssetTypeId>,
    ) -> LoadResult<AssetHandle> {
        let loaded = match self.loaded.get_mut(&load_handle) {
            Some(loaded) => loaded,
            None => {
                log::error!("{:?} for {} is not loaded", load_handle, path);
                return Err(LoadError::Stalled(path.clone()));
            }
        };

        if let Some(expected_type) = expected_type {
            if loaded.object.type_id() != expected_type {
                return Err(LoadError::TypeMismatch {
                    path: path.clone(),
                    expected: self.pipeline.schema_set().type_name(expected_type),
                    found: loaded.object.type_name().to_string(),
                });
            }
        }

        loaded.ref_count += 1;
        Ok(AssetHandle::new_counted(
            loaded.object.clone(),
            self.ref_op_tx.clone(),
        ))
    }

    // Hands a result to a waiter. Callers are notified on the next tick, dependents are
    // resolved immediately.
    fn deliver(
        &mut self,
        waiter: Waiter,
        path: &AssetPath,
        from_request: Option<RequestId>,
        result: LoadResult<AssetHandle>,
    ) {
        match waiter {
            Waiter::Dependent { parent, .. } => match result {
                Ok(handle) => self.dependency_loaded(parent, from_request, handle),
                Err(error) => self.fail_request(
                    parent,
                    LoadError::DependencyFailed {
                        dependency: path.clone(),
                        error: Box::new(error),
                    },
                ),
            },
            waiter => self
                .notifications
                .push_back(Notification { waiter, result }),
        }
    }

    fn set_state(
        &mut self,
        request_id: RequestId,
        state: RequestState,
    ) {
        if let Some(request) = self.requests.get_mut(&request_id) {
            log::trace!(
                "{} {:?} -> {:?}",
                request.path,
                request.state.load_state(),
                state.load_state()
            );
            request.state = state;
        }
    }

    // Runs a request forward until it has to wait on IO or another request, or until it ends
    fn advance(
        &mut self,
        request_id: RequestId,
    ) {
        profiling::scope!("Loader::advance");
        loop {
            let (path, state) = match self.requests.get(&request_id) {
                Some(request) => (request.path.clone(), request.state.load_state()),
                None => return,
            };

            match state {
                LoadState::Requested => {
                    if let Some(&load_handle) = self.loaded_by_path.get(&path) {
                        self.complete_from_loaded(request_id, load_handle);
                        return;
                    }

                    self.set_state(request_id, RequestState::ResolvingCache);
                }
                LoadState::ResolvingCache => {
                    match self.pipeline.resolve_cache(&path, self.platform) {
                        Ok(CacheResolution::Fresh(entry)) => {
                            self.begin_fetch(request_id, &entry);
                            return;
                        }
                        Ok(CacheResolution::Stale(_)) | Ok(CacheResolution::Miss) => {
                            self.set_state(request_id, RequestState::Preprocessing);
                        }
                        Err(e) => {
                            self.fail_request(request_id, LoadError::from_pipeline(&path, e));
                            return;
                        }
                    }
                }
                LoadState::Preprocessing => {
                    let attempts = match self.requests.get_mut(&request_id) {
                        Some(request) => {
                            request.preprocess_attempts += 1;
                            request.preprocess_attempts
                        }
                        None => return,
                    };

                    if attempts > MAX_PREPROCESS_ATTEMPTS {
                        let error = LoadError::CacheCorruption {
                            path: path.clone(),
                            reason: "entry is still unusable after preprocessing".to_string(),
                        };
                        self.fail_request(request_id, error);
                        return;
                    }

                    match self.pipeline.preprocess(&path, self.platform) {
                        Ok(_) => self.set_state(request_id, RequestState::ResolvingCache),
                        Err(e) => {
                            self.fail_request(request_id, LoadError::from_pipeline(&path, e));
                            return;
                        }
                    }
                }
                // Waiting on IO or on referenced assets
                _ => return,
            }
        }
    }

    fn begin_fetch(
        &mut self,
        request_id: RequestId,
        entry: &CacheEntry,
    ) {
        let events_tx = self.events_tx.clone();
        let result = self.io_queue.submit_read(
            entry.file_path.clone(),
            entry.blob_offset,
            entry.blob_length as usize,
            Vec::new(),
            move |completion| {
                let _ = events_tx.send(LoaderEvent::FetchComplete(request_id, completion));
            },
        );

        match result {
            Ok(operation) => self.set_state(request_id, RequestState::Fetching { operation }),
            Err(e) => {
                log::error!("Could not queue read of {:?}: {}", entry.file_path, e);
                panic!("async IO queue rejected a cache read: {}", e);
            }
        }
    }

    fn handle_fetch_complete(
        &mut self,
        request_id: RequestId,
        completion: IoCompletion,
    ) {
        profiling::scope!("Loader::handle_fetch_complete");
        let (path, expected_type) = match self.requests.get(&request_id) {
            Some(LoadRequest {
                state: RequestState::Fetching { operation },
                path,
                waiters,
                ..
            }) if *operation == completion.handle => {
                (path.clone(), common_expected_type(waiters))
            }
            _ => {
                log::trace!("Dropping read {:?} nobody is waiting for", completion.handle);
                return;
            }
        };

        // Not retried, the caller may load again
        if !completion.status.is_success() {
            let reason = match &completion.status {
                IoStatus::Error(e) => e.to_string(),
                status => status.to_string(),
            };

            // The index no longer matches the file. The next lookup reads it again and reports
            // a miss if it is gone or truncated.
            self.pipeline
                .cache_store_mut()
                .forget(&path, self.platform);
            self.fail_request(request_id, LoadError::Io { path, reason });
            return;
        }

        let decoded = {
            profiling::scope!("deserialize_object");
            deserialize_object(
                self.pipeline.schema_set(),
                &completion.buffer,
                expected_type,
            )
        };

        match decoded {
            Ok(object) => self.resolve_dependencies(request_id, object),
            Err(DataError::TypeMismatch { expected, found }) => {
                self.fail_request(
                    request_id,
                    LoadError::TypeMismatch {
                        path,
                        expected,
                        found,
                    },
                );
            }
            Err(e) if e.is_corruption() => {
                self.regenerate_entry(request_id, &path, &e.to_string());
            }
            Err(e) => {
                self.fail_request(
                    request_id,
                    LoadError::Pipeline {
                        path,
                        error: PipelineError::DataError(e),
                    },
                );
            }
        }
    }

    fn regenerate_entry(
        &mut self,
        request_id: RequestId,
        path: &AssetPath,
        reason: &str,
    ) {
        log::warn!("Cache entry for {} is unreadable ({}), regenerating", path, reason);
        if let Err(e) = self
            .pipeline
            .cache_store_mut()
            .evict(path, self.platform)
        {
            log::warn!("Could not evict cache entry for {}: {}", path, e);
        }

        self.set_state(request_id, RequestState::Preprocessing);
        self.advance(request_id);
    }

    // Publishes the object once every asset it references is loaded, starting loads for the ones
    // that aren't
    fn resolve_dependencies(
        &mut self,
        request_id: RequestId,
        object: SingleObject,
    ) {
        let path = match self.requests.get(&request_id) {
            Some(request) => request.path.clone(),
            None => return,
        };

        let references = object.asset_references();
        self.set_state(
            request_id,
            RequestState::Deserializing(Box::new(PendingObject {
                object,
                waiting_on: Vec::new(),
                dependencies: Vec::new(),
            })),
        );

        for reference in references {
            if reference.path == path {
                self.fail_cycle(vec![request_id], vec![path.clone(), path.clone()]);
                return;
            }

            if let Some(&load_handle) = self.loaded_by_path.get(&reference.path) {
                match self.checked_handle(load_handle, &reference.path, reference.expected_type) {
                    Ok(handle) => {
                        if let Some(pending) = self.pending_object_mut(request_id) {
                            pending.dependencies.push(handle);
                        }
                    }
                    Err(error) => {
                        let error = LoadError::DependencyFailed {
                            dependency: reference.path,
                            error: Box::new(error),
                        };
                        self.fail_request(request_id, error);
                        return;
                    }
                }
                continue;
            }

            if let Some(&dependency_id) = self.request_by_path.get(&reference.path) {
                if let Some(chain) = self.find_wait_chain(dependency_id, request_id) {
                    let mut cycle = vec![path.clone()];
                    cycle.extend(
                        chain
                            .iter()
                            .filter_map(|x| self.requests.get(x))
                            .map(|x| x.path.clone()),
                    );
                    self.fail_cycle(chain, cycle);
                    return;
                }
            }

            let waiter = Waiter::Dependent {
                parent: request_id,
                expected_type: reference.expected_type,
            };
            // One entry per waiter, a path referenced under two type constraints is waited on
            // twice
            if let Some(dependency_id) = self.attach(&reference.path, waiter) {
                if let Some(pending) = self.pending_object_mut(request_id) {
                    pending.waiting_on.push(dependency_id);
                }
            }
        }

        let ready = self
            .pending_object_mut(request_id)
            .map(|x| x.waiting_on.is_empty())
            .unwrap_or(false);
        if ready {
            self.complete_request(request_id);
        }
    }

    fn pending_object_mut(
        &mut self,
        request_id: RequestId,
    ) -> Option<&mut PendingObject> {
        match self.requests.get_mut(&request_id) {
            Some(LoadRequest {
                state: RequestState::Deserializing(pending),
                ..
            }) => Some(pending),
            _ => None,
        }
    }

    // Looks for a path through "waiting on" edges from `from` to `target`. The returned chain
    // starts with `from` and ends with `target`.
    fn find_wait_chain(
        &self,
        from: RequestId,
        target: RequestId,
    ) -> Option<Vec<RequestId>> {
        let mut visited = HashSet::default();
        let mut chain = vec![from];
        if self.search_wait_chain(from, target, &mut visited, &mut chain) {
            Some(chain)
        } else {
            None
        }
    }

    fn search_wait_chain(
        &self,
        current: RequestId,
        target: RequestId,
        visited: &mut HashSet<RequestId>,
        chain: &mut Vec<RequestId>,
    ) -> bool {
        if current == target {
            return true;
        }

        if !visited.insert(current) {
            return false;
        }

        if let Some(LoadRequest {
            state: RequestState::Deserializing(pending),
            ..
        }) = self.requests.get(&current)
        {
            for next in &pending.waiting_on {
                chain.push(*next);
                if self.search_wait_chain(*next, target, visited, chain) {
                    return true;
                }
                chain.pop();
            }
        }

        false
    }

    fn fail_cycle(
        &mut self,
        members: Vec<RequestId>,
        cycle: Vec<AssetPath>,
    ) {
        log::warn!(
            "Cyclic asset references: {}",
            cycle
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        );

        // Members report the cycle itself rather than each other's failure
        for member in &members {
            if let Some(request) = self.requests.get_mut(member) {
                request.waiters.retain(|waiter| {
                    !members
                        .iter()
                        .any(|parent| waiter.is_dependent_of(*parent))
                });
            }
        }

        for member in members {
            self.fail_request(
                member,
                LoadError::CyclicDependency {
                    cycle: cycle.clone(),
                },
            );
        }
    }

    fn remove_request(
        &mut self,
        request_id: RequestId,
    ) -> Option<LoadRequest> {
        let request = self.requests.remove(&request_id)?;
        if self.request_by_path.get(&request.path) == Some(&request_id) {
            self.request_by_path.remove(&request.path);
        }
        Some(request)
    }

    // Undoes whatever a request is in the middle of. Handles to already loaded dependencies are
    // dropped here.
    fn release_request_state(
        &mut self,
        request_id: RequestId,
        state: RequestState,
    ) {
        match state {
            RequestState::Fetching { operation } => {
                // If the read already started its completion is dropped when it arrives
                self.io_queue.cancel(operation);
            }
            RequestState::Deserializing(pending) => {
                for dependency_id in pending.waiting_on {
                    self.detach_dependent(dependency_id, request_id);
                }
            }
            _ => {}
        }
    }

    fn detach_dependent(
        &mut self,
        dependency_id: RequestId,
        parent: RequestId,
    ) {
        let orphaned = match self.requests.get_mut(&dependency_id) {
            Some(request) => {
                request.waiters.retain(|x| !x.is_dependent_of(parent));
                request.waiters.is_empty()
            }
            None => false,
        };

        if orphaned {
            self.abort_request(dependency_id);
        }
    }

    fn abort_request(
        &mut self,
        request_id: RequestId,
    ) {
        if let Some(request) = self.remove_request(request_id) {
            log::debug!("Abandoning load of {}, nothing is waiting for it", request.path);
            self.release_request_state(request_id, request.state);
        }
    }

    fn fail_request(
        &mut self,
        request_id: RequestId,
        error: LoadError,
    ) {
        let request = match self.remove_request(request_id) {
            Some(request) => request,
            None => return,
        };

        log::warn!("Load of {} failed: {}", request.path, error);
        self.release_request_state(request_id, request.state);
        for waiter in request.waiters {
            self.deliver(waiter, &request.path, Some(request_id), Err(error.clone()));
        }
    }

    fn complete_from_loaded(
        &mut self,
        request_id: RequestId,
        load_handle: LoadHandle,
    ) {
        if let Some(request) = self.remove_request(request_id) {
            self.resolve_waiters(request_id, &request.path, load_handle, request.waiters);
        }
    }

    fn complete_request(
        &mut self,
        request_id: RequestId,
    ) {
        let request = match self.remove_request(request_id) {
            Some(request) => request,
            None => return,
        };

        let pending = match request.state {
            RequestState::Deserializing(pending) => *pending,
            state => {
                log::error!(
                    "Tried to complete {} while {:?}",
                    request.path,
                    state.load_state()
                );
                return;
            }
        };

        let load_handle = LoadHandle(self.next_load_handle);
        self.next_load_handle += 1;

        let object = Arc::new(AssetObject::new(
            request.path.clone(),
            load_handle,
            pending.object,
        ));
        self.loaded.insert(
            load_handle,
            LoadedAsset {
                object,
                ref_count: 0,
                dependencies: pending.dependencies,
            },
        );
        self.loaded_by_path
            .insert(request.path.clone(), load_handle);

        log::debug!("Loaded {} as {:?}", request.path, load_handle);
        self.subscriptions
            .queue_event(AssetEvent::Loaded(request.path.clone()));

        self.resolve_waiters(request_id, &request.path, load_handle, request.waiters);

        // Every waiter rejected the object or was itself abandoned
        let unreferenced = self
            .loaded
            .get(&load_handle)
            .map(|x| x.ref_count == 0)
            .unwrap_or(false);
        if unreferenced {
            self.unload(load_handle);
        }
    }

    // Waiters are resolved in the order they attached
    fn resolve_waiters(
        &mut self,
        request_id: RequestId,
        path: &AssetPath,
        load_handle: LoadHandle,
        waiters: Vec<Waiter>,
    ) {
        for waiter in waiters {
            let result = self.checked_handle(load_handle, path, waiter.expected_type());
            self.deliver(waiter, path, Some(request_id), result);
        }
    }

    fn dependency_loaded(
        &mut self,
        parent: RequestId,
        dependency_id: Option<RequestId>,
        handle: AssetHandle,
    ) {
        let ready = match self.pending_object_mut(parent) {
            Some(pending) => {
                if let Some(dependency_id) = dependency_id {
                    let index = pending
                        .waiting_on
                        .iter()
                        .position(|x| *x == dependency_id);
                    if let Some(index) = index {
                        pending.waiting_on.remove(index);
                    }
                }
                pending.dependencies.push(handle);
                pending.waiting_on.is_empty()
            }
            // Parent is gone, dropping the handle releases the reference
            None => false,
        };

        if ready {
            self.complete_request(parent);
        }
    }

    fn unload(
        &mut self,
        load_handle: LoadHandle,
    ) {
        let loaded = match self.loaded.remove(&load_handle) {
            Some(loaded) => loaded,
            None => return,
        };

        let path = loaded.object.path().clone();
        if self.loaded_by_path.get(&path) == Some(&load_handle) {
            self.loaded_by_path.remove(&path);
        }

        log::debug!("Unloading {} ({:?})", path, load_handle);
        {
            profiling::scope!("teardown");
            let object = loaded.object.object();
            object.schema().run_teardown(&path, object.values());
        }

        // Dependency handles release their references through the ref op channel
        drop(loaded);
        self.subscriptions
            .queue_event(AssetEvent::Unloaded(path));
    }

    pub(crate) fn add_ref(
        &mut self,
        load_handle: LoadHandle,
    ) {
        match self.loaded.get_mut(&load_handle) {
            Some(loaded) => loaded.ref_count += 1,
            None => log::warn!("Reference added to {:?}, which is not loaded", load_handle),
        }
    }

    pub(crate) fn remove_ref(
        &mut self,
        load_handle: LoadHandle,
    ) {
        let unreferenced = match self.loaded.get_mut(&load_handle) {
            Some(loaded) if loaded.ref_count > 0 => {
                loaded.ref_count -= 1;
                loaded.ref_count == 0
            }
            Some(_) => {
                log::warn!("{:?} released more often than it was acquired", load_handle);
                false
            }
            None => {
                log::warn!("Reference released on {:?}, which is not loaded", load_handle);
                false
            }
        };

        if unreferenced {
            self.unload(load_handle);
        }
    }

    /// Withdraws a caller's interest in a load. An in-flight request nobody else waits on is
    /// abandoned. Returns false if the ticket has already been delivered or is unknown.
    pub(crate) fn cancel(
        &mut self,
        ticket: LoadTicket,
    ) -> bool {
        let mut found = None;
        for (request_id, request) in &mut self.requests {
            if let Some(index) = request
                .waiters
                .iter()
                .position(|x| x.ticket() == Some(ticket))
            {
                request.waiters.remove(index);
                found = Some((*request_id, request.waiters.is_empty()));
                break;
            }
        }

        if let Some((request_id, orphaned)) = found {
            log::debug!("Cancelled load ticket {:?}", ticket);
            if orphaned {
                self.abort_request(request_id);
            }
            return true;
        }

        // Finished but not delivered yet, dropping the result releases its handle
        if let Some(index) = self
            .notifications
            .iter()
            .position(|x| x.waiter.ticket() == Some(ticket))
        {
            self.notifications.remove(index);
            return true;
        }

        self.finished_polls.remove(&ticket).is_some()
    }

    /// Drops cached data for a path so the next load sees the current source. Objects already
    /// handed out stay valid, and an in-flight request for the path starts over.
    pub(crate) fn invalidate(
        &mut self,
        path: &AssetPath,
    ) {
        log::info!("Invalidating {}", path);
        if let Err(e) = self.pipeline.invalidate(path) {
            log::warn!("Could not evict cache entries for {}: {}", path, e);
        }

        self.loaded_by_path.remove(path);
        if let Some(&request_id) = self.request_by_path.get(path) {
            self.restart_request(request_id);
        }

        self.subscriptions
            .queue_event(AssetEvent::Invalidated(path.clone()));
    }

    fn restart_request(
        &mut self,
        request_id: RequestId,
    ) {
        let previous_state = match self.requests.get_mut(&request_id) {
            Some(request) => {
                request.preprocess_attempts = 0;
                std::mem::replace(&mut request.state, RequestState::Requested)
            }
            None => return,
        };

        // A request still in Requested already has an Advance queued
        if !matches!(previous_state, RequestState::Requested) {
            self.release_request_state(request_id, previous_state);
            self.send_event(LoaderEvent::Advance(request_id));
        }
    }

    /// Runs IO continuations and everything they unblock. Returns the number of events handled.
    #[profiling::function]
    pub(crate) fn process_events(&mut self) -> usize {
        let mut processed = self.io_queue.tick();
        while let Ok(event) = self.events_rx.try_recv() {
            processed += 1;
            match event {
                LoaderEvent::Advance(request_id) => self.advance(request_id),
                LoaderEvent::FetchComplete(request_id, completion) => {
                    self.handle_fetch_complete(request_id, completion)
                }
            }
        }

        processed
    }

    pub(crate) fn has_queued_events(&self) -> bool {
        !self.events_rx.is_empty()
    }

    /// Blocks until some IO completes. Returns 0 if no IO is in flight.
    pub(crate) fn wait_for_io(&mut self) -> usize {
        self.io_queue.wait_and_tick()
    }

    /// Delivers finished loads to callbacks and parks polled results
    pub(crate) fn flush_notifications(&mut self) {
        profiling::scope!("Loader::flush_notifications");
        while let Some(notification) = self.notifications.pop_front() {
            match notification.waiter {
                Waiter::Callback { callback, .. } => (callback)(notification.result),
                Waiter::Polled { ticket, .. } | Waiter::Blocking { ticket, .. } => {
                    self.finished_polls.insert(ticket, notification.result);
                }
                Waiter::Dependent { parent, .. } => {
                    log::error!("Dependent of {:?} in the notification queue", parent);
                }
            }
        }
    }

    pub(crate) fn dispatch_asset_events(&mut self) {
        self.subscriptions.dispatch();
    }

    pub(crate) fn subscribe(
        &mut self,
        path: AssetPath,
        callback: Box<dyn FnMut(&AssetEvent)>,
    ) -> SubscriptionId {
        self.subscriptions.subscribe(path, callback)
    }

    pub(crate) fn unsubscribe(
        &mut self,
        id: SubscriptionId,
    ) -> bool {
        self.subscriptions.unsubscribe(id)
    }

    pub(crate) fn load_info(
        &self,
        path: &AssetPath,
    ) -> Option<LoadInfo> {
        if let Some(request) = self
            .request_by_path
            .get(path)
            .and_then(|x| self.requests.get(x))
        {
            return Some(LoadInfo {
                state: request.state.load_state(),
                ref_count: 0,
                load_handle: None,
                type_name: common_expected_type(&request.waiters)
                    .map(|x| self.pipeline.schema_set().type_name(x)),
                waiter_count: request.waiters.len(),
            });
        }

        let load_handle = *self.loaded_by_path.get(path)?;
        let loaded = self.loaded.get(&load_handle)?;
        Some(LoadInfo {
            state: LoadState::Completed,
            ref_count: loaded.ref_count,
            load_handle: Some(load_handle),
            type_name: Some(loaded.object.type_name().to_string()),
            waiter_count: 0,
        })
    }
}
