// SPDX-License-Identifier: GPL-3.0-only

//! Frame sinks
//!
//! A sink receives each keyed frame as a borrow of the capture thread's
//! output buffer. The borrow ends when [`FrameSink::output`] returns, so a
//! sink never observes a frame that is still being written.

use crossbeam_channel::{Receiver, Sender, TrySendError};

use tracing::trace;

use crate::backends::depth::VideoFormat;

/// One keyed frame, borrowed from the capture buffer
#[derive(Debug, Clone, Copy)]
pub struct OutputFrame<'a> {
    /// `stride * height` bytes
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    /// Bytes per row
    pub stride: usize,
    pub format: VideoFormat,
    /// Nanoseconds since the capture loop started
    pub timestamp_ns: u64,
}

impl OutputFrame<'_> {
    /// Copy the borrowed bytes into an owned frame
    pub fn to_keyed_frame(&self) -> KeyedFrame {
        KeyedFrame {
            data: self.data.to_vec(),
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            timestamp_ns: self.timestamp_ns,
        }
    }
}

/// Owned copy of an [`OutputFrame`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyedFrame {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub format: VideoFormat,
    pub timestamp_ns: u64,
}

/// Consumer of keyed frames, called once per emitted frame
pub trait FrameSink: Send {
    fn output(&mut self, frame: OutputFrame<'_>);
}

impl<F> FrameSink for F
where
    F: FnMut(OutputFrame<'_>) + Send,
{
    fn output(&mut self, frame: OutputFrame<'_>) {
        self(frame)
    }
}

/// Forwards owned copies over a bounded channel, dropping frames when full
#[derive(Debug)]
pub struct ChannelSink {
    sender: Sender<KeyedFrame>,
    dropped: u64,
}

impl ChannelSink {
    /// Create a sink and the receiving end, holding at most `capacity` frames
    pub fn channel(capacity: usize) -> (Self, Receiver<KeyedFrame>) {
        let (sender, receiver) = crossbeam_channel::bounded(capacity);
        (Self { sender, dropped: 0 }, receiver)
    }

    /// Frames dropped because the receiver fell behind or went away
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl FrameSink for ChannelSink {
    fn output(&mut self, frame: OutputFrame<'_>) {
        match self.sender.try_send(frame.to_keyed_frame()) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                self.dropped += 1;
                trace!(dropped = self.dropped, "Frame channel full, dropping frame");
            }
            Err(TrySendError::Disconnected(_)) => {
                self.dropped += 1;
            }
        }
    }
}
