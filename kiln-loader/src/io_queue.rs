use crate::HashMap;
use crossbeam_channel::{Receiver, Sender};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

const OPERATION_PENDING: u8 = 0;
const OPERATION_RUNNING: u8 = 1;
const OPERATION_CANCELLED: u8 = 2;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IoOperationHandle(u64);

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IoOperationKind {
    Read,
    Write,
}

#[derive(Debug, Clone)]
pub enum IoStatus {
    Success,
    // The file ended before `requested` bytes could be read
    ShortRead { requested: usize, read: usize },
    Error(Arc<std::io::Error>),
}

impl IoStatus {
    pub fn is_success(&self) -> bool {
        matches!(self, IoStatus::Success)
    }
}

impl std::fmt::Display for IoStatus {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            IoStatus::Success => write!(f, "success"),
            IoStatus::ShortRead { requested, read } => {
                write!(f, "short read, {} of {} bytes", read, requested)
            }
            IoStatus::Error(e) => e.fmt(f),
        }
    }
}

/// Result of one operation, handed to its continuation on the thread that calls
/// [`AsyncIoQueue::tick`]
#[derive(Debug)]
pub struct IoCompletion {
    pub handle: IoOperationHandle,
    pub kind: IoOperationKind,
    pub file_path: PathBuf,
    pub offset: u64,
    // Reads: the bytes that were read. Writes: the buffer that was written, returned for reuse.
    pub buffer: Vec<u8>,
    pub status: IoStatus,
}

#[derive(Debug, Clone)]
pub enum IoQueueError {
    QueueFull { max_pending_operations: usize },
    InvalidLength { length: usize, buffer_length: usize },
    WorkerSpawnFailed(Arc<std::io::Error>),
    // Every worker thread has exited, nothing would run the operation
    WorkersStopped,
}

impl std::error::Error for IoQueueError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            IoQueueError::WorkerSpawnFailed(e) => Some(&**e),
            _ => None,
        }
    }
}

impl std::fmt::Display for IoQueueError {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        match self {
            IoQueueError::QueueFull {
                max_pending_operations,
            } => write!(
                f,
                "too many IO operations in flight (limit {})",
                max_pending_operations
            ),
            IoQueueError::InvalidLength {
                length,
                buffer_length,
            } => write!(
                f,
                "write of {} bytes from a buffer of {} bytes",
                length, buffer_length
            ),
            IoQueueError::WorkerSpawnFailed(e) => write!(f, "could not start IO thread: {}", e),
            IoQueueError::WorkersStopped => write!(f, "IO threads have stopped"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AsyncIoQueueConfig {
    pub thread_count: usize,
    // Submitting past this many incomplete operations fails with QueueFull
    pub max_pending_operations: usize,
}

impl Default for AsyncIoQueueConfig {
    fn default() -> Self {
        AsyncIoQueueConfig {
            thread_count: 4,
            max_pending_operations: 4096,
        }
    }
}

#[derive(Default, Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoQueueStats {
    pub reads_submitted: u64,
    pub writes_submitted: u64,
    pub completed: u64,
    pub cancelled: u64,
}

struct IoRequest {
    handle: IoOperationHandle,
    kind: IoOperationKind,
    file_path: PathBuf,
    offset: u64,
    length: usize,
    buffer: Vec<u8>,
    state: Arc<AtomicU8>,
}

fn read_fully<T: Read>(
    reader: &mut T,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buffer.len() {
        match reader.read(&mut buffer[total..]) {
            Ok(0) => break,
            Ok(read) => total += read,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(total)
}

fn read_at(
    file_path: &Path,
    offset: u64,
    buffer: &mut [u8],
) -> std::io::Result<usize> {
    let mut file = File::open(file_path)?;
    file.seek(SeekFrom::Start(offset))?;
    read_fully(&mut file, buffer)
}

fn write_at(
    file_path: &Path,
    offset: u64,
    data: &[u8],
) -> std::io::Result<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .open(file_path)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(data)
}

fn execute_request(request: IoRequest) -> IoCompletion {
    let IoRequest {
        handle,
        kind,
        file_path,
        offset,
        length,
        mut buffer,
        ..
    } = request;

    let status = match kind {
        IoOperationKind::Read => {
            profiling::scope!("IoOperationKind::Read");
            buffer.clear();
            buffer.resize(length, 0);
            match read_at(&file_path, offset, &mut buffer) {
                Ok(read) if read == length => IoStatus::Success,
                Ok(read) => {
                    buffer.truncate(read);
                    IoStatus::ShortRead {
                        requested: length,
                        read,
                    }
                }
                Err(e) => {
                    buffer.clear();
                    IoStatus::Error(Arc::new(e))
                }
            }
        }
        IoOperationKind::Write => {
            profiling::scope!("IoOperationKind::Write");
            match write_at(&file_path, offset, &buffer[..length]) {
                Ok(()) => IoStatus::Success,
                Err(e) => IoStatus::Error(Arc::new(e)),
            }
        }
    };

    log::trace!("{:?} {:?} {:?}: {}", kind, handle, file_path, status);

    IoCompletion {
        handle,
        kind,
        file_path,
        offset,
        buffer,
        status,
    }
}

// Thread that takes requests out of the request channel and ends when the finish channel is
// signalled
struct IoWorkerThread {
    finish_tx: Sender<()>,
    join_handle: JoinHandle<()>,
}

impl IoWorkerThread {
    fn new(
        request_rx: Receiver<IoRequest>,
        completion_tx: Sender<IoCompletion>,
        thread_index: usize,
    ) -> std::io::Result<Self> {
        let (finish_tx, finish_rx) = crossbeam_channel::bounded(1);
        let join_handle = std::thread::Builder::new()
            .name(format!("IO Thread {}", thread_index))
            .spawn(move || {
                profiling::register_thread!(&format!("IoWorkerThread {}", thread_index));
                loop {
                    crossbeam_channel::select! {
                        recv(request_rx) -> msg => {
                            let request = match msg {
                                Ok(request) => request,
                                Err(_) => return,
                            };

                            // Cancelled while it sat in the channel
                            let claimed = request.state.compare_exchange(
                                OPERATION_PENDING,
                                OPERATION_RUNNING,
                                Ordering::AcqRel,
                                Ordering::Acquire,
                            );

                            if claimed.is_ok() {
                                if completion_tx.send(execute_request(request)).is_err() {
                                    return;
                                }
                            } else {
                                log::trace!("Skipping cancelled IO operation {:?}", request.handle);
                            }
                        },
                        recv(finish_rx) -> _msg => {
                            return;
                        }
                    }
                }
            })?;

        Ok(IoWorkerThread {
            finish_tx,
            join_handle,
        })
    }
}

struct PendingOperation {
    state: Arc<AtomicU8>,
    on_complete: Box<dyn FnOnce(IoCompletion)>,
}

/// Runs file reads and writes on a pool of worker threads. Continuations run on whichever thread
/// calls [`tick`](AsyncIoQueue::tick), never on a worker.
pub struct AsyncIoQueue {
    worker_threads: Vec<IoWorkerThread>,
    request_tx: Sender<IoRequest>,
    completion_rx: Receiver<IoCompletion>,
    pending: HashMap<IoOperationHandle, PendingOperation>,
    next_handle: u64,
    max_pending_operations: usize,
    stats: IoQueueStats,
}

impl AsyncIoQueue {
    pub fn new(config: AsyncIoQueueConfig) -> Result<Self, IoQueueError> {
        let (request_tx, request_rx) = crossbeam_channel::unbounded::<IoRequest>();
        let (completion_tx, completion_rx) = crossbeam_channel::unbounded::<IoCompletion>();

        let thread_count = config.thread_count.max(1);
        let mut worker_threads = Vec::with_capacity(thread_count);
        for thread_index in 0..thread_count {
            let worker =
                IoWorkerThread::new(request_rx.clone(), completion_tx.clone(), thread_index)
                    .map_err(|e| IoQueueError::WorkerSpawnFailed(Arc::new(e)))?;
            worker_threads.push(worker);
        }

        log::debug!("Started {} IO threads", thread_count);

        Ok(AsyncIoQueue {
            worker_threads,
            request_tx,
            completion_rx,
            pending: Default::default(),
            next_handle: 1,
            max_pending_operations: config.max_pending_operations,
            stats: Default::default(),
        })
    }

    /// Reads `length` bytes at `offset`. `buffer` is reused for the result if it has capacity.
    pub fn submit_read<F: FnOnce(IoCompletion) + 'static>(
        &mut self,
        file_path: impl Into<PathBuf>,
        offset: u64,
        length: usize,
        buffer: Vec<u8>,
        on_complete: F,
    ) -> Result<IoOperationHandle, IoQueueError> {
        let handle = self.submit(
            IoOperationKind::Read,
            file_path.into(),
            offset,
            length,
            buffer,
            Box::new(on_complete),
        )?;
        self.stats.reads_submitted += 1;
        Ok(handle)
    }

    /// Writes the first `length` bytes of `buffer` at `offset`, creating the file if needed
    pub fn submit_write<F: FnOnce(IoCompletion) + 'static>(
        &mut self,
        file_path: impl Into<PathBuf>,
        offset: u64,
        length: usize,
        buffer: Vec<u8>,
        on_complete: F,
    ) -> Result<IoOperationHandle, IoQueueError> {
        if length > buffer.len() {
            return Err(IoQueueError::InvalidLength {
                length,
                buffer_length: buffer.len(),
            });
        }

        let handle = self.submit(
            IoOperationKind::Write,
            file_path.into(),
            offset,
            length,
            buffer,
            Box::new(on_complete),
        )?;
        self.stats.writes_submitted += 1;
        Ok(handle)
    }

    fn submit(
        &mut self,
        kind: IoOperationKind,
        file_path: PathBuf,
        offset: u64,
        length: usize,
        buffer: Vec<u8>,
        on_complete: Box<dyn FnOnce(IoCompletion)>,
    ) -> Result<IoOperationHandle, IoQueueError> {
        if self.pending.len() >= self.max_pending_operations {
            log::warn!(
                "IO queue is full, rejecting {:?} of {:?}",
                kind,
                file_path
            );
            return Err(IoQueueError::QueueFull {
                max_pending_operations: self.max_pending_operations,
            });
        }

        let handle = IoOperationHandle(self.next_handle);
        self.next_handle += 1;

        let state = Arc::new(AtomicU8::new(OPERATION_PENDING));
        self.pending.insert(
            handle,
            PendingOperation {
                state: state.clone(),
                on_complete,
            },
        );

        log::trace!("Submit {:?} {:?} {:?}", kind, handle, file_path);
        let request = IoRequest {
            handle,
            kind,
            file_path,
            offset,
            length,
            buffer,
            state,
        };

        if self.request_tx.send(request).is_err() {
            self.pending.remove(&handle);
            log::error!("IO worker threads are gone, rejecting {:?}", handle);
            return Err(IoQueueError::WorkersStopped);
        }

        Ok(handle)
    }

    /// Stops an operation that has not started yet. Its continuation never runs. Returns false
    /// if the operation is already running, done, or unknown.
    pub fn cancel(
        &mut self,
        handle: IoOperationHandle,
    ) -> bool {
        let cancelled = match self.pending.get(&handle) {
            Some(operation) => operation
                .state
                .compare_exchange(
                    OPERATION_PENDING,
                    OPERATION_CANCELLED,
                    Ordering::AcqRel,
                    Ordering::Acquire,
                )
                .is_ok(),
            None => false,
        };

        if cancelled {
            log::trace!("Cancelled IO operation {:?}", handle);
            self.pending.remove(&handle);
            self.stats.cancelled += 1;
        }

        cancelled
    }

    /// Runs the continuations of every operation that has completed. Returns how many ran.
    pub fn tick(&mut self) -> usize {
        profiling::scope!("AsyncIoQueue::tick");
        let mut completed = 0;
        while let Ok(completion) = self.completion_rx.try_recv() {
            if self.dispatch(completion) {
                completed += 1;
            }
        }

        completed
    }

    /// Blocks until at least one operation completes, then behaves like
    /// [`tick`](AsyncIoQueue::tick). Returns 0 immediately if nothing is pending.
    pub fn wait_and_tick(&mut self) -> usize {
        profiling::scope!("AsyncIoQueue::wait_and_tick");
        let mut completed = 0;
        while completed == 0 && !self.pending.is_empty() {
            match self.completion_rx.recv() {
                Ok(completion) => {
                    if self.dispatch(completion) {
                        completed += 1;
                    }
                }
                Err(_) => {
                    log::error!("IO worker threads are gone");
                    return 0;
                }
            }
        }

        completed + self.tick()
    }

    fn dispatch(
        &mut self,
        completion: IoCompletion,
    ) -> bool {
        match self.pending.remove(&completion.handle) {
            Some(operation) => {
                self.stats.completed += 1;
                (operation.on_complete)(completion);
                true
            }
            None => false,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn stats(&self) -> IoQueueStats {
        self.stats
    }
}

impl Drop for AsyncIoQueue {
    fn drop(&mut self) {
        // Anything not started yet is skipped by the workers, continuations are dropped unrun
        for operation in self.pending.values() {
            operation
                .state
                .store(OPERATION_CANCELLED, Ordering::Release);
        }
        self.pending.clear();

        let worker_threads = std::mem::take(&mut self.worker_threads);
        for worker_thread in &worker_threads {
            let _ = worker_thread.finish_tx.send(());
        }

        for worker_thread in worker_threads {
            if worker_thread.join_handle.join().is_err() {
                log::error!("IO thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn queue(max_pending_operations: usize) -> AsyncIoQueue {
        AsyncIoQueue::new(AsyncIoQueueConfig {
            thread_count: 2,
            max_pending_operations,
        })
        .unwrap()
    }

    fn run_until_idle(queue: &mut AsyncIoQueue) {
        while queue.pending_count() > 0 {
            queue.wait_and_tick();
        }
    }

    #[test]
    fn read_at_offset() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("data.bin");
        std::fs::write(&file_path, b"0123456789").unwrap();

        let mut queue = queue(16);
        let result = Rc::new(RefCell::new(None));
        let result_clone = result.clone();
        queue
            .submit_read(&file_path, 3, 4, Vec::new(), move |completion| {
                *result_clone.borrow_mut() = Some(completion);
            })
            .unwrap();

        run_until_idle(&mut queue);
        let completion = result.borrow_mut().take().unwrap();
        assert!(completion.status.is_success());
        assert_eq!(completion.buffer, b"3456");
        assert_eq!(completion.offset, 3);
        assert_eq!(queue.stats().completed, 1);
    }

    #[test]
    fn short_read_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("data.bin");
        std::fs::write(&file_path, b"0123").unwrap();

        let mut queue = queue(16);
        let statuses = Rc::new(RefCell::new(Vec::new()));

        let statuses_clone = statuses.clone();
        queue
            .submit_read(&file_path, 2, 10, Vec::new(), move |completion| {
                statuses_clone
                    .borrow_mut()
                    .push((completion.buffer, completion.status));
            })
            .unwrap();
        run_until_idle(&mut queue);

        let statuses_clone = statuses.clone();
        queue
            .submit_read(dir.path().join("missing.bin"), 0, 10, Vec::new(), move |completion| {
                statuses_clone
                    .borrow_mut()
                    .push((completion.buffer, completion.status));
            })
            .unwrap();
        run_until_idle(&mut queue);

        let statuses = statuses.borrow();
        assert_eq!(statuses[0].0, b"23");
        assert!(matches!(
            statuses[0].1,
            IoStatus::ShortRead {
                requested: 10,
                read: 2
            }
        ));
        assert!(statuses[1].0.is_empty());
        assert!(matches!(statuses[1].1, IoStatus::Error(_)));
    }

    #[test]
    fn write_then_read() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("out.bin");

        let mut queue = queue(16);
        let written = Rc::new(RefCell::new(false));
        let written_clone = written.clone();
        queue
            .submit_write(&file_path, 0, 5, b"hello world".to_vec(), move |completion| {
                assert!(completion.status.is_success());
                *written_clone.borrow_mut() = true;
            })
            .unwrap();
        run_until_idle(&mut queue);
        assert!(*written.borrow());
        assert_eq!(std::fs::read(&file_path).unwrap(), b"hello");

        assert!(matches!(
            queue.submit_write(&file_path, 0, 20, b"short".to_vec(), |_| {}),
            Err(IoQueueError::InvalidLength { .. })
        ));
    }

    #[test]
    fn queue_full() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("data.bin");
        std::fs::write(&file_path, b"0123").unwrap();

        let mut queue = queue(1);
        queue
            .submit_read(&file_path, 0, 4, Vec::new(), |_| {})
            .unwrap();

        // Completions only leave the pending set when ticked
        assert!(matches!(
            queue.submit_read(&file_path, 0, 4, Vec::new(), |_| {}),
            Err(IoQueueError::QueueFull {
                max_pending_operations: 1
            })
        ));

        run_until_idle(&mut queue);
        assert!(queue
            .submit_read(&file_path, 0, 4, Vec::new(), |_| {})
            .is_ok());
    }

    #[test]
    fn submit_fails_once_workers_stop() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("data.bin");
        std::fs::write(&file_path, b"0123").unwrap();

        let mut queue = queue(16);
        let worker_threads = std::mem::take(&mut queue.worker_threads);
        for worker_thread in &worker_threads {
            worker_thread.finish_tx.send(()).unwrap();
        }
        for worker_thread in worker_threads {
            worker_thread.join_handle.join().unwrap();
        }

        let ran = Rc::new(RefCell::new(false));
        let ran_clone = ran.clone();
        assert!(matches!(
            queue.submit_read(&file_path, 0, 4, Vec::new(), move |_| {
                *ran_clone.borrow_mut() = true;
            }),
            Err(IoQueueError::WorkersStopped)
        ));
        assert_eq!(queue.pending_count(), 0);
        assert_eq!(queue.stats().reads_submitted, 0);
        assert_eq!(queue.wait_and_tick(), 0);
        assert!(!*ran.borrow());
    }

    #[test]
    fn cancelled_continuation_never_runs() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("data.bin");
        std::fs::write(&file_path, b"0123").unwrap();

        let mut queue = queue(64);
        let calls = Rc::new(RefCell::new(0));
        let mut handles = Vec::new();
        for _ in 0..32 {
            let calls_clone = calls.clone();
            handles.push(
                queue
                    .submit_read(&file_path, 0, 4, Vec::new(), move |_| {
                        *calls_clone.borrow_mut() += 1;
                    })
                    .unwrap(),
            );
        }

        // Whether a cancel wins depends on the workers, but every operation finishes exactly one way
        let cancelled = handles
            .iter()
            .filter(|handle| queue.cancel(**handle))
            .count();
        assert!(!queue.cancel(IoOperationHandle(9999)));

        run_until_idle(&mut queue);
        assert_eq!(*calls.borrow() + cancelled, 32);
        assert_eq!(queue.stats().cancelled as usize, cancelled);

        for handle in handles {
            assert!(!queue.cancel(handle));
        }
    }
}
