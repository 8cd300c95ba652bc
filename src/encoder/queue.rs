//! Bounded frame queue in front of a sink
//!
//! A dedicated writer thread drains the queue into the inner sink so the
//! render thread only pays for a channel send. What happens when the queue is
//! full is decided by [`Backpressure`].

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::{EncoderHandle, FrameSink};
use crate::capture::Frame;
use crate::error::{RecorderError, WriteError};

/// What to do when the encoder falls behind the render loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backpressure {
    /// Write inline; the render loop waits for the encoder
    #[default]
    Block,
    /// Discard frames while the queue is full
    Drop,
    /// Queue frames, blocking only once the queue is full
    #[serde(rename = "buffer")]
    BufferAndWarn,
}

/// State shared with the writer thread
#[derive(Default)]
struct WriterShared {
    frames_written: AtomicU64,
    /// Oldest write failure not yet reported to the caller
    pending_error: Mutex<Option<String>>,
}

impl WriterShared {
    fn record_error(&self, message: String) {
        if let Ok(mut pending) = self.pending_error.lock() {
            if pending.is_none() {
                *pending = Some(message);
            }
        }
    }

    fn take_error(&self) -> Option<String> {
        self.pending_error.lock().ok().and_then(|mut p| p.take())
    }
}

/// Default time the writer gets to drain the queue at close
const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

/// Poll interval while waiting for the writer thread
const DRAIN_POLL: Duration = Duration::from_millis(10);

/// Sink that hands frames to a writer thread through a bounded queue
///
/// Failures from the inner sink are reported on the next `write_frame` call.
/// If the writer is still busy when the drain timeout expires at close, the
/// inner sink's encoder is terminated so a write blocked on a stalled
/// encoder fails and the thread can be joined.
pub struct QueuedSink {
    tx: Option<mpsc::Sender<Frame>>,
    writer: Option<JoinHandle<Result<(), RecorderError>>>,
    shared: Arc<WriterShared>,
    encoder: Option<EncoderHandle>,
    policy: Backpressure,
    drain_timeout: Duration,
    frames_dropped: u64,
    lag_warned: bool,
}

impl QueuedSink {
    pub fn new(mut inner: Box<dyn FrameSink>, capacity: usize, policy: Backpressure) -> Self {
        let encoder = inner.encoder_handle();
        let (tx, mut rx) = mpsc::channel::<Frame>(capacity.max(1));
        let shared = Arc::new(WriterShared::default());
        let writer_shared = Arc::clone(&shared);

        let writer = std::thread::spawn(move || {
            debug!("Encoder writer thread started");
            while let Some(frame) = rx.blocking_recv() {
                let sequence = frame.sequence();
                match inner.write_frame(frame) {
                    Ok(()) => {
                        writer_shared.frames_written.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(e) => {
                        writer_shared.record_error(format!("frame {}: {}", sequence, e));
                    }
                }
            }
            debug!("Encoder writer thread draining done, closing sink");
            inner.close()
        });

        Self {
            tx: Some(tx),
            writer: Some(writer),
            shared,
            encoder,
            policy,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            frames_dropped: 0,
            lag_warned: false,
        }
    }

    /// How long close waits for queued frames before stopping the encoder
    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    pub fn policy(&self) -> Backpressure {
        self.policy
    }

    /// Wait for the writer to finish, stopping a stalled encoder if needed
    fn join_writer(&mut self) -> Result<(), RecorderError> {
        let Some(handle) = self.writer.take() else {
            return Ok(());
        };

        let deadline = Instant::now() + self.drain_timeout;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(DRAIN_POLL);
        }

        if !handle.is_finished() {
            match &self.encoder {
                Some(encoder) => {
                    warn!(
                        "Encoder writer still busy after {:?}, terminating encoder",
                        self.drain_timeout
                    );
                    if let Err(e) = encoder.terminate() {
                        warn!("Failed to terminate encoder: {}", e);
                    }
                }
                None => warn!("Encoder writer still busy, waiting for it"),
            }
        }

        handle
            .join()
            .unwrap_or_else(|_| Err(RecorderError::InvalidState("encoder writer panicked".to_string())))
    }

    fn warn_lag_once(&mut self, message: &str) {
        if !self.lag_warned {
            warn!("{}", message);
            self.lag_warned = true;
        }
    }
}

impl FrameSink for QueuedSink {
    fn write_frame(&mut self, frame: Frame) -> Result<(), WriteError> {
        let sent = match self.tx.as_ref() {
            Some(tx) => tx.try_send(frame),
            None => return Err(WriteError::Closed),
        };

        match sent {
            Ok(()) => {}
            Err(TrySendError::Full(frame)) => match self.policy {
                Backpressure::Drop => {
                    self.frames_dropped += 1;
                    self.warn_lag_once("Encoder is falling behind, dropping frames");
                }
                Backpressure::Block | Backpressure::BufferAndWarn => {
                    if self.policy == Backpressure::BufferAndWarn {
                        self.warn_lag_once("Encoder queue is full, render loop is now waiting on the encoder");
                    }
                    let tx = self.tx.as_ref().ok_or(WriteError::Closed)?;
                    tx.blocking_send(frame)
                        .map_err(|_| WriteError::Disconnected("writer thread exited".to_string()))?;
                }
            },
            Err(TrySendError::Closed(_)) => {
                return Err(WriteError::Disconnected("writer thread exited".to_string()));
            }
        }

        match self.shared.take_error() {
            Some(message) => Err(WriteError::Disconnected(message)),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), RecorderError> {
        let Some(tx) = self.tx.take() else {
            return Ok(());
        };
        // Closing the channel lets the writer drain what is queued and exit
        drop(tx);

        let result = self.join_writer();

        if let Some(message) = self.shared.take_error() {
            warn!("Unreported encoder write failure at close: {}", message);
        }
        if self.frames_dropped > 0 {
            info!("Dropped {} frames under backpressure", self.frames_dropped);
        }
        result
    }

    fn frames_written(&self) -> u64 {
        self.shared.frames_written.load(Ordering::Relaxed)
    }

    fn frames_dropped(&self) -> u64 {
        self.frames_dropped
    }

    fn encoder_handle(&self) -> Option<EncoderHandle> {
        self.encoder.clone()
    }
}

impl Drop for QueuedSink {
    fn drop(&mut self) {
        if self.tx.is_some() {
            if let Err(e) = self.close() {
                warn!("Queued sink close on drop failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::PixelFormat;
    use std::sync::mpsc as std_mpsc;

    /// Inner sink recording sequence numbers
    struct RecordingSink {
        seen: Arc<Mutex<Vec<u64>>>,
        closed: Arc<AtomicU64>,
        gate: Option<std_mpsc::Receiver<()>>,
        fail_on: Option<u64>,
    }

    impl RecordingSink {
        fn new(seen: Arc<Mutex<Vec<u64>>>, closed: Arc<AtomicU64>) -> Self {
            Self {
                seen,
                closed,
                gate: None,
                fail_on: None,
            }
        }
    }

    impl FrameSink for RecordingSink {
        fn write_frame(&mut self, frame: Frame) -> Result<(), WriteError> {
            if let Some(gate) = &self.gate {
                // Blocks until the test opens the gate (drops the sender)
                let _ = gate.recv();
            }
            if self.fail_on == Some(frame.sequence()) {
                return Err(WriteError::Io(std::io::Error::new(
                    std::io::ErrorKind::BrokenPipe,
                    "pipe closed",
                )));
            }
            self.seen.lock().unwrap().push(frame.sequence());
            Ok(())
        }

        fn close(&mut self) -> Result<(), RecorderError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn frames_written(&self) -> u64 {
            self.seen.lock().unwrap().len() as u64
        }
    }

    fn frame(seq: u64) -> Frame {
        Frame::new(seq, 1, 1, PixelFormat::Rgba, vec![seq as u8; 4]).unwrap()
    }

    #[test]
    fn test_frames_arrive_in_order_and_close_drains() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicU64::new(0));
        let inner = RecordingSink::new(Arc::clone(&seen), Arc::clone(&closed));

        let mut sink = QueuedSink::new(Box::new(inner), 2, Backpressure::BufferAndWarn);
        for seq in 0..50 {
            sink.write_frame(frame(seq)).unwrap();
        }
        sink.close().unwrap();

        assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
        assert_eq!(sink.frames_written(), 50);
        assert_eq!(sink.frames_dropped(), 0);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_policy_discards_when_full() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicU64::new(0));
        let (gate_tx, gate_rx) = std_mpsc::channel();
        let mut inner = RecordingSink::new(Arc::clone(&seen), Arc::clone(&closed));
        inner.gate = Some(gate_rx);

        let mut sink = QueuedSink::new(Box::new(inner), 2, Backpressure::Drop);
        for seq in 0..10 {
            sink.write_frame(frame(seq)).unwrap();
        }
        drop(gate_tx);
        sink.close().unwrap();

        let seen = seen.lock().unwrap();
        // At most one in flight plus a full queue
        assert!(!seen.is_empty() && seen.len() <= 3, "seen = {:?}", seen);
        assert!(seen.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(seen.len() as u64 + sink.frames_dropped(), 10);
    }

    /// Poll until the writer has accepted `count` frames
    fn wait_for_written(sink: &QueuedSink, count: u64) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while sink.frames_written() < count {
            assert!(Instant::now() < deadline, "writer stuck at {}", sink.frames_written());
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_inner_failure_is_reported_once_and_writing_continues() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicU64::new(0));
        let mut inner = RecordingSink::new(Arc::clone(&seen), Arc::clone(&closed));
        inner.fail_on = Some(3);

        let mut sink = QueuedSink::new(Box::new(inner), 4, Backpressure::BufferAndWarn);
        let mut errors = 0;
        for seq in 0..20 {
            if seq == 5 {
                // Frames 0, 1, 2 and 4 written means frame 3 has already failed
                wait_for_written(&sink, 4);
            }
            if sink.write_frame(frame(seq)).is_err() {
                errors += 1;
            }
        }
        sink.close().unwrap();

        let seen = seen.lock().unwrap();
        assert!(!seen.contains(&3));
        assert_eq!(seen.len(), 19);
        assert_eq!(errors, 1);
    }

    #[cfg(unix)]
    fn stalled_encoder(frame_len: usize) -> Box<dyn FrameSink> {
        use crate::encoder::{EncoderCommand, ProcessSink};

        // Alive but never reads stdin
        let command = EncoderCommand::new("sh", ["-c", "exec sleep 30"]);
        Box::new(ProcessSink::spawn(&command, frame_len, Duration::from_millis(200)).unwrap())
    }

    #[cfg(unix)]
    fn large_frame(seq: u64) -> Frame {
        Frame::new(seq, 512, 512, PixelFormat::Rgba, vec![0; 512 * 512 * 4]).unwrap()
    }

    #[cfg(unix)]
    #[test]
    fn test_close_terminates_encoder_that_stopped_reading() {
        for policy in [Backpressure::Drop, Backpressure::BufferAndWarn] {
            let inner = stalled_encoder(512 * 512 * 4);
            let mut sink = QueuedSink::new(inner, 2, policy)
                .with_drain_timeout(Duration::from_millis(200));
            let encoder = sink.encoder_handle().unwrap();

            // 1 MiB frames overflow the pipe buffer, so the writer blocks
            sink.write_frame(large_frame(0)).unwrap();
            std::thread::sleep(Duration::from_millis(50));

            let started = Instant::now();
            let result = sink.close();
            assert!(
                started.elapsed() < Duration::from_secs(5),
                "{:?} close took {:?}",
                policy,
                started.elapsed()
            );
            assert!(matches!(result, Err(RecorderError::EncoderExit { .. })));
            assert!(!encoder.is_running());
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_drop_terminates_encoder_that_stopped_reading() {
        let inner = stalled_encoder(512 * 512 * 4);
        let mut sink = QueuedSink::new(inner, 2, Backpressure::Drop)
            .with_drain_timeout(Duration::from_millis(200));
        let encoder = sink.encoder_handle().unwrap();
        sink.write_frame(large_frame(0)).unwrap();

        let started = Instant::now();
        drop(sink);
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!encoder.is_running());
    }

    #[test]
    fn test_close_twice_and_write_after_close() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicU64::new(0));
        let inner = RecordingSink::new(Arc::clone(&seen), Arc::clone(&closed));

        let mut sink = QueuedSink::new(Box::new(inner), 1, Backpressure::Drop);
        sink.close().unwrap();
        sink.close().unwrap();
        assert!(matches!(sink.write_frame(frame(0)), Err(WriteError::Closed)));
        drop(sink);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_backpressure_config_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            policy: Backpressure,
        }
        let parsed: Wrapper = toml::from_str("policy = \"buffer\"").unwrap();
        assert_eq!(parsed.policy, Backpressure::BufferAndWarn);
        let parsed: Wrapper = toml::from_str("policy = \"drop\"").unwrap();
        assert_eq!(parsed.policy, Backpressure::Drop);
    }
}
