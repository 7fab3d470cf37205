//! Thread that moves packets from a byte source into a sink.
//!
//! ```text
//! Idle ──connect──▶ Connected ──▶ Streaming ──EOF / stop──▶ Draining ──flush──▶ Stopped
//!   └──────────────── connect failed ─────────────────────────┘
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, info, warn};

use crate::channel::ByteSource;
use crate::error::UploadError;
use crate::pipeline::sink::Sink;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumerState {
    Idle,
    Connected,
    Streaming,
    Draining,
    Stopped,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Flags shared between a consumer thread and whoever controls it.
pub struct ConsumerControl {
    running: AtomicBool,
    paused: Mutex<bool>,
    resumed: Condvar,
    state: Mutex<ConsumerState>,
    poll: Duration,
}

impl ConsumerControl {
    pub fn new(poll: Duration) -> Self {
        Self {
            running: AtomicBool::new(true),
            paused: Mutex::new(false),
            resumed: Condvar::new(),
            state: Mutex::new(ConsumerState::Idle),
            poll,
        }
    }

    /// Stop before the next read. A read already blocked keeps waiting for
    /// the producer.
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.resumed.notify_all();
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Pause or resume reading. An in-flight read is not interrupted.
    pub fn pause(&self, paused: bool) {
        *lock(&self.paused) = paused;
        if !paused {
            self.resumed.notify_all();
        }
    }

    pub fn is_paused(&self) -> bool {
        *lock(&self.paused)
    }

    pub fn state(&self) -> ConsumerState {
        *lock(&self.state)
    }

    fn set_state(&self, state: ConsumerState) {
        debug!("Consumer state -> {:?}", state);
        *lock(&self.state) = state;
    }

    /// Wait at most one poll interval while paused. Returns whether reading
    /// may proceed.
    fn wait_while_paused(&self) -> bool {
        let paused = lock(&self.paused);
        let (paused, _) = self
            .resumed
            .wait_timeout_while(paused, self.poll, |paused| *paused && self.is_running())
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        !*paused
    }
}

/// Handle to a running consumer thread.
pub struct StreamConsumer {
    control: Arc<ConsumerControl>,
    handle: Option<JoinHandle<Result<(), UploadError>>>,
    outcome: Option<Result<(), UploadError>>,
}

impl StreamConsumer {
    /// Spawn the consumer thread for `source`.
    pub fn start<S: ByteSource>(
        name: &str,
        source: S,
        sink: Arc<Sink>,
        control: Arc<ConsumerControl>,
    ) -> Result<Self, UploadError> {
        let thread_control = Arc::clone(&control);
        let handle = thread::Builder::new()
            .name(format!("consumer-{}", name))
            .spawn(move || consume(source, &sink, &thread_control))
            .map_err(|e| UploadError::Runtime(format!("Failed to spawn consumer thread: {}", e)))?;

        Ok(Self {
            control,
            handle: Some(handle),
            outcome: None,
        })
    }

    pub fn control(&self) -> &Arc<ConsumerControl> {
        &self.control
    }

    /// Wait for the thread to drain and stop. Returns the sink's flush outcome.
    pub fn join(&mut self) -> Result<(), UploadError> {
        if let Some(handle) = self.handle.take() {
            let result = handle
                .join()
                .unwrap_or_else(|_| Err(UploadError::Runtime("Consumer thread panicked".to_string())));
            self.outcome = Some(result);
        }
        self.outcome.clone().unwrap_or(Ok(()))
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |handle| handle.is_finished())
    }
}

/// Body of the consumer thread.
pub fn consume<S: ByteSource>(mut source: S, sink: &Sink, control: &ConsumerControl) -> Result<(), UploadError> {
    control.set_state(ConsumerState::Idle);

    if !control.is_running() {
        debug!("Stopped before the producer connected");
        control.set_state(ConsumerState::Draining);
        let result = sink.flush();
        control.set_state(ConsumerState::Stopped);
        return result;
    }

    match source.wait_for_connect() {
        Ok(()) => {
            control.set_state(ConsumerState::Connected);
            stream(&mut source, sink, control);
        }
        Err(e) => warn!("{}", e),
    }

    control.set_state(ConsumerState::Draining);
    let result = sink.flush();
    control.set_state(ConsumerState::Stopped);
    result
}

fn stream<S: ByteSource>(source: &mut S, sink: &Sink, control: &ConsumerControl) {
    control.set_state(ConsumerState::Streaming);
    let mut received = 0u64;

    while control.is_running() {
        if !control.wait_while_paused() {
            continue;
        }

        let packet = source.read();
        if packet.is_empty() {
            debug!("Producer closed the stream");
            break;
        }

        received += packet.len() as u64;
        match sink.submit(packet) {
            Ok(()) => {}
            Err(UploadError::Finished) => {
                debug!("Sink finished, no longer consuming");
                break;
            }
            Err(e) => {
                warn!("Failed to hand packet to sink: {}", e);
                break;
            }
        }
    }

    info!("Consumed {} bytes from producer", received);
}
