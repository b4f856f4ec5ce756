use crate::types::PointRecord;
use crate::{ReplayError, Result};
use crossbeam_channel::{Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// One reconstructed sub-packet, borrowed for the duration of a callback.
#[derive(Debug, Clone, Copy)]
pub struct PointFrame<'a> {
    pub device_handle: u8,
    pub timestamp: u64,
    pub points: &'a [PointRecord],
}

/// Receiver of reconstructed point frames.
///
/// Called from the session's background threads. `on_frame` must not block
/// and must not keep references past the call.
pub trait FrameConsumer: Send + Sync {
    /// One-time setup, run on the priming thread. May run before or after
    /// the first frame is offered.
    fn initialize(&self) {}

    /// Frames offered while this returns false are dropped.
    fn ready(&self) -> bool;

    fn on_frame(&self, frame: &PointFrame<'_>);
}

/// Owned copy of a [`PointFrame`].
#[derive(Debug, Clone, PartialEq)]
pub struct OwnedFrame {
    pub device_handle: u8,
    pub timestamp: u64,
    pub points: Vec<PointRecord>,
}

/// Consumer forwarding frames into a bounded channel.
///
/// Not ready until initialized, and not ready while the channel is full.
pub struct ChannelConsumer {
    sender: Sender<OwnedFrame>,
    initialized: AtomicBool,
}

/// Receiving end of a [`ChannelConsumer`].
pub struct FrameReceiver {
    receiver: Receiver<OwnedFrame>,
}

impl ChannelConsumer {
    pub fn bounded(capacity: usize) -> (ChannelConsumer, FrameReceiver) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (
            ChannelConsumer {
                sender,
                initialized: AtomicBool::new(false),
            },
            FrameReceiver { receiver },
        )
    }
}

impl FrameConsumer for ChannelConsumer {
    fn initialize(&self) {
        self.initialized.store(true, Ordering::Release);
    }

    fn ready(&self) -> bool {
        self.initialized.load(Ordering::Acquire) && !self.sender.is_full()
    }

    fn on_frame(&self, frame: &PointFrame<'_>) {
        let owned = OwnedFrame {
            device_handle: frame.device_handle,
            timestamp: frame.timestamp,
            points: frame.points.to_vec(),
        };
        if let Err(e) = self.sender.try_send(owned) {
            match e {
                crossbeam_channel::TrySendError::Full(_) => {
                    log::trace!("Frame channel full, dropping frame");
                }
                crossbeam_channel::TrySendError::Disconnected(_) => {
                    log::trace!("Frame receiver gone, dropping frame");
                }
            }
        }
    }
}

impl FrameReceiver {
    /// Receive the next frame (blocks until available).
    pub fn recv(&self) -> Result<OwnedFrame> {
        self.receiver
            .recv()
            .map_err(|_| ReplayError::SourceRead("frame channel disconnected".into()))
    }

    /// Try to receive a frame without blocking.
    pub fn try_recv(&self) -> Option<OwnedFrame> {
        self.receiver.try_recv().ok()
    }

    /// Receive a frame with a timeout. Returns `None` on timeout or disconnect.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<OwnedFrame> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Frames currently queued.
    pub fn len(&self) -> usize {
        self.receiver.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(points: &[PointRecord]) -> PointFrame<'_> {
        PointFrame {
            device_handle: 1,
            timestamp: 99,
            points,
        }
    }

    #[test]
    fn test_not_ready_before_initialize() {
        let (consumer, _rx) = ChannelConsumer::bounded(4);
        assert!(!consumer.ready());
        consumer.initialize();
        assert!(consumer.ready());
    }

    #[test]
    fn test_frames_are_copied() {
        let (consumer, rx) = ChannelConsumer::bounded(4);
        consumer.initialize();
        let points = vec![PointRecord::default(); 3];
        consumer.on_frame(&frame(&points));
        drop(points);

        let got = rx.try_recv().unwrap();
        assert_eq!(got.device_handle, 1);
        assert_eq!(got.timestamp, 99);
        assert_eq!(got.points.len(), 3);
        assert!(rx.try_recv().is_none());
    }

    #[test]
    fn test_full_channel_drops_and_reports_not_ready() {
        let (consumer, rx) = ChannelConsumer::bounded(1);
        consumer.initialize();
        let points = [PointRecord::default()];
        consumer.on_frame(&frame(&points));
        assert!(!consumer.ready());
        consumer.on_frame(&frame(&points));
        assert_eq!(rx.len(), 1);

        rx.try_recv().unwrap();
        assert!(consumer.ready());
        assert!(rx.recv_timeout(Duration::from_millis(1)).is_none());
    }
}
