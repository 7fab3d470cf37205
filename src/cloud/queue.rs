use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use log::{info, warn};

use crate::models::Packet;

/// FIFO of packets waiting for the uploader.
///
/// The queue is unbounded. Growth past `warn_bytes` is logged once per
/// excursion so a producer outrunning the network shows up in the logs.
pub struct PacketQueue {
    packets: Mutex<VecDeque<Packet>>,
    pending_bytes: AtomicUsize,
    peak_bytes: AtomicUsize,
    warn_bytes: usize,
    over_watermark: AtomicBool,
}

impl PacketQueue {
    pub fn new(warn_bytes: usize) -> Self {
        Self {
            packets: Mutex::new(VecDeque::new()),
            pending_bytes: AtomicUsize::new(0),
            peak_bytes: AtomicUsize::new(0),
            warn_bytes,
            over_watermark: AtomicBool::new(false),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Packet>> {
        self.packets.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn push(&self, packet: Packet) {
        let len = packet.len();
        let pending = {
            let mut packets = self.lock();
            packets.push_back(packet);
            self.pending_bytes.fetch_add(len, Ordering::SeqCst) + len
        };
        self.peak_bytes.fetch_max(pending, Ordering::SeqCst);

        if self.warn_bytes > 0
            && pending >= self.warn_bytes
            && !self.over_watermark.swap(true, Ordering::SeqCst)
        {
            warn!(
                "Upload queue holds {} MB, uploads are falling behind the stream",
                pending / (1024 * 1024)
            );
        }
    }

    /// Move every queued packet, in arrival order, onto the end of `buffer`.
    /// Returns the number of bytes moved.
    pub fn drain_into(&self, buffer: &mut Vec<u8>) -> usize {
        let (drained, moved, pending) = {
            let mut packets = self.lock();
            let drained: Vec<Packet> = packets.drain(..).collect();
            let moved: usize = drained.iter().map(Packet::len).sum();
            let pending = self.pending_bytes.fetch_sub(moved, Ordering::SeqCst) - moved;
            (drained, moved, pending)
        };

        buffer.reserve(moved);
        for packet in &drained {
            buffer.extend_from_slice(packet.as_bytes());
        }

        if pending < self.warn_bytes / 2 && self.over_watermark.swap(false, Ordering::SeqCst) {
            info!("Upload queue drained back to {} MB", pending / (1024 * 1024));
        }

        moved
    }

    pub fn pending_bytes(&self) -> usize {
        self.pending_bytes.load(Ordering::SeqCst)
    }

    pub fn peak_pending_bytes(&self) -> usize {
        self.peak_bytes.load(Ordering::SeqCst)
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
