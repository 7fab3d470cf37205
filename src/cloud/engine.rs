//! Background upload engine.
//!
//! The stream consumer hands packets to [`UploadEngine::submit`], which only
//! queues them. A dedicated uploader thread drains the queue into a working
//! buffer every tick and sends a chunk whenever the buffer reaches the chunk
//! size. On flush it sends whatever remains, marked as the last chunk.
//!
//! Every chunk is retried with truncated exponential backoff. Only the bytes
//! the backend acknowledges leave the buffer, so partially accepted chunks
//! resume where the provider stopped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::sync::Notify;

use crate::cloud::backend::{ChunkReceipt, CloudStorageClient, StorageBackend};
use crate::cloud::backoff::BackoffPolicy;
use crate::cloud::queue::PacketQueue;
use crate::config::PipelineConfig;
use crate::error::UploadError;
use crate::models::{Packet, ProgressFn, UploadDestination};
use crate::security::safe_error_message;

/// Tunables of one engine instance.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub chunk_size: usize,
    pub tick: Duration,
    pub backoff: BackoffPolicy,
    pub timeout: Option<Duration>,
    pub max_upload_bytes_per_sec: Option<u64>,
    pub queue_warn_bytes: usize,
    pub rng_seed: Option<u64>,
}

impl EngineOptions {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            chunk_size: config.upload.chunk_size_bytes,
            tick: Duration::from_millis(config.upload.tick_interval_ms),
            backoff: BackoffPolicy::from_settings(&config.backoff, config.upload.max_retries),
            timeout: config.upload.timeout_secs.map(Duration::from_secs),
            max_upload_bytes_per_sec: config.upload.max_upload_bytes_per_sec,
            queue_warn_bytes: config.upload.queue_warn_bytes,
            rng_seed: config.upload.rng_seed,
        }
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self::from_config(&PipelineConfig::default())
    }
}

/// Settings callers may change while the upload runs.
struct Settings {
    max_retries: u32,
    timeout: Option<Duration>,
    progress: Option<ProgressFn>,
    total_bytes: Option<u64>,
    max_bytes_per_sec: Option<u64>,
}

struct UploadSession {
    uploaded_bytes: u64,
    segment_tokens: Vec<String>,
    started: Instant,
    last_upload: Option<Instant>,
}

/// State shared between the engine handle and its uploader thread.
struct Shared {
    queue: PacketQueue,
    finished: AtomicBool,
    skip_flush: AtomicBool,
    failed: AtomicBool,
    settings: Mutex<Settings>,
    session: Mutex<UploadSession>,
    /// Interrupts backoff and pacing sleeps once the final flush is skipped
    wake: Notify,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

enum Worker {
    Running(JoinHandle<Result<(), UploadError>>),
    Finished(Result<(), UploadError>),
}

/// Cloud sink: queues packets and uploads them from a background thread.
pub struct UploadEngine {
    shared: Arc<Shared>,
    session_id: String,
    worker: Mutex<Worker>,
}

impl UploadEngine {
    /// Create an engine for the stream `id`, choosing the backend from
    /// `destination.loc`.
    pub fn new(
        id: &str,
        destination: &UploadDestination,
        config: &PipelineConfig,
    ) -> Result<Self, UploadError> {
        let client = StorageBackend::for_destination(id, destination, config)?;
        Self::with_client(client, destination, EngineOptions::from_config(config))
    }

    /// Create an engine around an already constructed client.
    ///
    /// Blocks until the client has initialized the destination; an
    /// initialization failure is returned here.
    pub fn with_client<C>(
        client: C,
        destination: &UploadDestination,
        options: EngineOptions,
    ) -> Result<Self, UploadError>
    where
        C: CloudStorageClient + 'static,
    {
        let shared = Arc::new(Shared {
            queue: PacketQueue::new(options.queue_warn_bytes),
            finished: AtomicBool::new(false),
            skip_flush: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            settings: Mutex::new(Settings {
                max_retries: options.backoff.max_retries,
                timeout: options.timeout,
                progress: None,
                total_bytes: None,
                max_bytes_per_sec: options.max_upload_bytes_per_sec,
            }),
            session: Mutex::new(UploadSession {
                uploaded_bytes: 0,
                segment_tokens: Vec::new(),
                started: Instant::now(),
                last_upload: None,
            }),
            wake: Notify::new(),
        });

        let (ready_tx, ready_rx) = mpsc::channel();
        let thread_shared = Arc::clone(&shared);
        let thread_destination = destination.clone();

        let handle = thread::Builder::new()
            .name("cloud-uploader".to_string())
            .spawn(move || run_worker(client, thread_destination, thread_shared, options, ready_tx))
            .map_err(|e| UploadError::Runtime(format!("Failed to spawn uploader thread: {}", e)))?;

        let session_id = match ready_rx.recv() {
            Ok(Ok(session_id)) => session_id,
            Ok(Err(e)) => {
                let _ = handle.join();
                return Err(e);
            }
            Err(_) => {
                let _ = handle.join();
                return Err(UploadError::Runtime(
                    "Uploader thread exited before initializing the destination".to_string(),
                ));
            }
        };

        info!("Upload engine ready for {}", destination);
        Ok(Self {
            shared,
            session_id,
            worker: Mutex::new(Worker::Running(handle)),
        })
    }

    /// Queue a packet for upload. Never blocks on the network.
    ///
    /// Once the uploader has given up, returns the error that ended the
    /// stream rather than [`UploadError::Finished`].
    pub fn submit(&self, packet: Packet) -> Result<(), UploadError> {
        if self.shared.failed.load(Ordering::SeqCst) {
            // The uploader thread is exiting; joining it yields its error
            return self.flush().and(Err(UploadError::Finished));
        }
        if self.shared.finished.load(Ordering::SeqCst) {
            return Err(UploadError::Finished);
        }
        if !packet.is_empty() {
            self.shared.queue.push(packet);
        }
        Ok(())
    }

    /// Send everything still buffered and wait for the uploader to exit.
    ///
    /// Idempotent: later calls return the outcome of the first one.
    pub fn flush(&self) -> Result<(), UploadError> {
        let mut worker = lock(&self.worker);

        if let Worker::Running(_) = &*worker {
            self.shared.finished.store(true, Ordering::SeqCst);

            let placeholder = Worker::Finished(Ok(()));
            if let Worker::Running(handle) = std::mem::replace(&mut *worker, placeholder) {
                let result = handle.join().unwrap_or_else(|_| {
                    Err(UploadError::Runtime("Uploader thread panicked".to_string()))
                });
                if result.is_err() {
                    self.shared.failed.store(true, Ordering::SeqCst);
                }
                *worker = Worker::Finished(result);
            }
        }

        match &*worker {
            Worker::Finished(result) => result.clone(),
            Worker::Running(_) => Ok(()),
        }
    }

    /// Stop without sending the remaining buffer. Errors after this point
    /// are ignored.
    pub fn stop_skipping_final_flush(&self) -> Result<(), UploadError> {
        self.shared.skip_flush.store(true, Ordering::SeqCst);
        self.shared.wake.notify_one();
        self.flush()
    }

    /// Progress callback fired after each accepted chunk, with the expected
    /// total when known.
    pub fn set_progress_callback(&self, callback: ProgressFn, total_bytes: Option<u64>) {
        let mut settings = lock(&self.shared.settings);
        settings.progress = Some(callback);
        settings.total_bytes = total_bytes;
    }

    pub fn set_max_retries(&self, max_retries: u32) {
        lock(&self.shared.settings).max_retries = max_retries;
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) {
        lock(&self.shared.settings).timeout = timeout;
    }

    pub fn set_max_upload_speed(&self, bytes_per_sec: Option<u64>) {
        lock(&self.shared.settings).max_bytes_per_sec = bytes_per_sec.filter(|rate| *rate > 0);
    }

    /// Whether the uploader gave up on the stream.
    pub fn is_failed(&self) -> bool {
        self.shared.failed.load(Ordering::SeqCst)
    }

    pub fn uploaded_bytes(&self) -> u64 {
        lock(&self.shared.session).uploaded_bytes
    }

    /// Tokens of committed segments, in the order they were accepted.
    pub fn segment_ids(&self) -> Vec<String> {
        lock(&self.shared.session).segment_tokens.clone()
    }

    pub fn session_id(&self) -> String {
        self.session_id.clone()
    }

    /// Time from engine creation to the last accepted chunk.
    pub fn time_spent_uploading(&self) -> Duration {
        let session = lock(&self.shared.session);
        session
            .last_upload
            .map(|last| last.duration_since(session.started))
            .unwrap_or_default()
    }

    pub fn pending_bytes(&self) -> usize {
        self.shared.queue.pending_bytes()
    }

    pub fn peak_pending_bytes(&self) -> usize {
        self.shared.queue.peak_pending_bytes()
    }
}

impl Drop for UploadEngine {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            error!("{}", safe_error_message("Upload did not complete", &e));
        }
    }
}

fn run_worker<C: CloudStorageClient>(
    client: C,
    destination: UploadDestination,
    shared: Arc<Shared>,
    options: EngineOptions,
    ready: mpsc::Sender<Result<String, UploadError>>,
) -> Result<(), UploadError> {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let err = UploadError::Runtime(format!("Failed to build uploader runtime: {}", e));
            let _ = ready.send(Err(err.clone()));
            return Err(err);
        }
    };

    runtime.block_on(async move {
        let mut uploader = Uploader {
            rng: match options.rng_seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_os_rng(),
            },
            client,
            shared,
            options,
            buffer: Vec::new(),
        };

        if let Err(e) = uploader.client.initialize_destination(&destination).await {
            error!("{}", safe_error_message("Failed to initialize upload destination", &e));
            let _ = ready.send(Err(e.clone()));
            return Err(e);
        }
        let _ = ready.send(Ok(uploader.client.session_id()));

        let result = uploader.run().await;
        if result.is_err() {
            uploader.shared.failed.store(true, Ordering::SeqCst);
        }
        result
    })
}

struct Uploader<C> {
    client: C,
    shared: Arc<Shared>,
    options: EngineOptions,
    rng: StdRng,
    buffer: Vec<u8>,
}

impl<C: CloudStorageClient> Uploader<C> {
    async fn run(&mut self) -> Result<(), UploadError> {
        while !self.shared.finished.load(Ordering::SeqCst) {
            self.shared.queue.drain_into(&mut self.buffer);
            if self.buffer.len() >= self.options.chunk_size {
                self.send_with_backoff(self.options.chunk_size, false).await?;
            }
            self.pause(self.options.tick).await;
        }

        self.shared.queue.drain_into(&mut self.buffer);
        debug!("Flushing {} buffered bytes", self.buffer.len());

        // Resumable sessions need a terminal call even when nothing is left
        let mut first = true;
        while (first || !self.buffer.is_empty()) && !self.shared.skip_flush.load(Ordering::SeqCst) {
            first = false;
            self.send_with_backoff(0, true).await?;
        }

        let session = lock(&self.shared.session);
        info!(
            "Upload finished: {} bytes in {} segments",
            session.uploaded_bytes,
            session.segment_tokens.len()
        );
        Ok(())
    }

    /// Send up to `max_bytes` from the front of the buffer (everything when
    /// `max_bytes` is zero), retrying with backoff.
    async fn send_with_backoff(&mut self, max_bytes: usize, is_last: bool) -> Result<(), UploadError> {
        let requested = if max_bytes == 0 {
            self.buffer.len()
        } else {
            max_bytes.min(self.buffer.len())
        };

        let (policy, timeout) = {
            let settings = lock(&self.shared.settings);
            (self.options.backoff.with_max_retries(settings.max_retries), settings.timeout)
        };
        self.client.set_timeout(timeout);

        let attempts = policy.max_retries.max(1);
        let mut last_error = String::new();

        for attempt in 0..attempts {
            let uploaded_so_far = lock(&self.shared.session).uploaded_bytes;
            let started = Instant::now();

            match self
                .client
                .upload_bytes(&self.buffer[..requested], is_last, uploaded_so_far)
                .await
            {
                Ok(receipt) if receipt.bytes_accepted > 0 || requested == 0 => {
                    let accepted = self.commit(receipt, requested);
                    self.pace(accepted, started.elapsed()).await;

                    if !is_last {
                        // A segment that cannot be opened ends the stream
                        self.client.start_new_segment().await?;
                    }
                    return Ok(());
                }
                Ok(_) => last_error = "provider accepted no bytes".to_string(),
                Err(e) => last_error = e.to_string(),
            }

            if self.shared.skip_flush.load(Ordering::SeqCst) {
                debug!("Dropping failed chunk, final flush is skipped");
                return Ok(());
            }

            if attempt + 1 < attempts {
                let delay = policy.delay_for(attempt, &mut self.rng);
                warn!(
                    "Failed to upload chunk [attempt {}/{}], retrying in {:?}: {}",
                    attempt + 1,
                    attempts,
                    delay,
                    safe_error_message("upload", &last_error)
                );
                self.pause(delay).await;
            }
        }

        let err = UploadError::RetryBudgetExhausted {
            attempts,
            last_error: safe_error_message("last attempt", &last_error),
        };
        error!("{}", err);
        Err(err)
    }

    /// Record an accepted chunk and report progress. Returns the bytes removed
    /// from the buffer.
    fn commit(&mut self, receipt: ChunkReceipt, requested: usize) -> usize {
        let accepted = receipt.bytes_accepted.min(requested);
        self.buffer.drain(..accepted);

        let uploaded = {
            let mut session = lock(&self.shared.session);
            session.uploaded_bytes += accepted as u64;
            session.last_upload = Some(Instant::now());
            if let Some(token) = receipt.segment_token.filter(|token| !token.is_empty()) {
                session.segment_tokens.push(token);
            }
            session.uploaded_bytes
        };

        let (progress, total) = {
            let settings = lock(&self.shared.settings);
            (settings.progress.clone(), settings.total_bytes)
        };
        if let Some(progress) = progress {
            progress(0, 0, total.unwrap_or(0), uploaded);
        }

        debug!("Accepted {} of {} bytes ({} total)", accepted, requested, uploaded);
        accepted
    }

    /// Hold the upload rate of the last chunk under the configured cap.
    async fn pace(&self, accepted: usize, elapsed: Duration) {
        let limit = lock(&self.shared.settings).max_bytes_per_sec;
        if let Some(rate) = limit {
            let target = Duration::from_secs_f64(accepted as f64 / rate as f64);
            if let Some(remaining) = target.checked_sub(elapsed) {
                self.pause(remaining).await;
            }
        }
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = self.shared.wake.notified() => {}
        }
    }
}
