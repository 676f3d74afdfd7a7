//! Bounded frame buffer between the landmark source and the worker.
//!
//! The buffer never blocks the live producer: when it is full the oldest
//! frame is discarded and counted. Replay sources can opt into waiting for
//! space instead.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use gazectl_frame_model::LandmarkFrame;
use tokio::sync::Notify;

/// Result of waiting on the buffer.
#[derive(Debug, Clone, PartialEq)]
pub enum Pop {
    Frame(LandmarkFrame),
    /// Nothing arrived within the poll interval.
    Idle,
    /// The producer hung up and every buffered frame has been taken.
    Closed,
}

#[derive(Debug, Default)]
struct Inner {
    frames: VecDeque<LandmarkFrame>,
    closed: bool,
}

/// Drop-oldest ring of landmark frames.
#[derive(Debug)]
pub struct FrameRing {
    capacity: usize,
    inner: Mutex<Inner>,
    dropped: AtomicU64,
    readable: Notify,
    writable: Notify,
}

impl FrameRing {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                frames: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            dropped: AtomicU64::new(0),
            readable: Notify::new(),
            writable: Notify::new(),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A panic while holding the lock cannot leave the queue torn.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Frames discarded because the buffer was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Push a frame, evicting the oldest one when full.
    ///
    /// Returns `false` if the buffer is closed and the frame was discarded.
    pub fn push(&self, frame: LandmarkFrame) -> bool {
        {
            let mut inner = self.lock();
            if inner.closed {
                return false;
            }
            if inner.frames.len() >= self.capacity {
                if let Some(old) = inner.frames.pop_front() {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                    tracing::trace!(frame_id = old.frame_id, "Frame buffer full, dropped oldest");
                }
            }
            inner.frames.push_back(frame);
        }
        self.readable.notify_one();
        true
    }

    /// Push a frame, waiting for space instead of evicting.
    pub async fn push_wait(&self, frame: LandmarkFrame) -> bool {
        loop {
            {
                let inner = self.lock();
                if inner.closed {
                    return false;
                }
                if inner.frames.len() < self.capacity {
                    drop(inner);
                    return self.push(frame);
                }
            }
            self.writable.notified().await;
        }
    }

    pub fn try_pop(&self) -> Option<LandmarkFrame> {
        let frame = self.lock().frames.pop_front();
        if frame.is_some() {
            self.writable.notify_one();
        }
        frame
    }

    /// Take the next frame, waiting up to `timeout` for one to arrive.
    pub async fn pop_timeout(&self, timeout: Duration) -> Pop {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            {
                let mut inner = self.lock();
                if let Some(frame) = inner.frames.pop_front() {
                    drop(inner);
                    self.writable.notify_one();
                    return Pop::Frame(frame);
                }
                if inner.closed {
                    return Pop::Closed;
                }
            }
            if tokio::time::timeout_at(deadline, self.readable.notified())
                .await
                .is_err()
            {
                return Pop::Idle;
            }
        }
    }

    /// Mark the producer as gone. Buffered frames remain readable.
    pub fn close(&self) {
        self.lock().closed = true;
        self.readable.notify_one();
        self.writable.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u64) -> LandmarkFrame {
        LandmarkFrame::no_face(id, id * 33)
    }

    #[test]
    fn test_drop_oldest_when_full() {
        let ring = FrameRing::new(3);
        for id in 0..5 {
            assert!(ring.push(frame(id)));
        }
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.dropped(), 2);
        let ids: Vec<_> = std::iter::from_fn(|| ring.try_pop())
            .map(|f| f.frame_id)
            .collect();
        assert_eq!(ids, vec![2, 3, 4]);
    }

    #[test]
    fn test_closed_ring_rejects_pushes() {
        let ring = FrameRing::new(2);
        ring.push(frame(0));
        ring.close();
        assert!(!ring.push(frame(1)));
        assert!(ring.is_closed());
        assert_eq!(ring.try_pop().map(|f| f.frame_id), Some(0));
    }

    #[tokio::test]
    async fn test_pop_drains_before_reporting_closed() {
        let ring = FrameRing::new(4);
        ring.push(frame(7));
        ring.close();
        let timeout = Duration::from_millis(10);
        assert_eq!(ring.pop_timeout(timeout).await, Pop::Frame(frame(7)));
        assert_eq!(ring.pop_timeout(timeout).await, Pop::Closed);
    }

    #[tokio::test]
    async fn test_pop_times_out_when_idle() {
        let ring = FrameRing::new(4);
        assert_eq!(ring.pop_timeout(Duration::from_millis(5)).await, Pop::Idle);
    }

    #[tokio::test]
    async fn test_pop_wakes_on_push() {
        let ring = std::sync::Arc::new(FrameRing::new(4));
        let producer = ring.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(5)).await;
            producer.push(frame(1));
        });
        let popped = ring.pop_timeout(Duration::from_secs(5)).await;
        handle.await.unwrap();
        assert_eq!(popped, Pop::Frame(frame(1)));
    }

    #[tokio::test]
    async fn test_push_wait_applies_backpressure() {
        let ring = std::sync::Arc::new(FrameRing::new(1));
        ring.push(frame(0));
        let producer = ring.clone();
        let handle = tokio::spawn(async move { producer.push_wait(frame(1)).await });
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(ring.try_pop().map(|f| f.frame_id), Some(0));
        assert!(handle.await.unwrap());
        assert_eq!(ring.try_pop().map(|f| f.frame_id), Some(1));
        assert_eq!(ring.dropped(), 0);
    }
}
