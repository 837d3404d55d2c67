// SPDX-License-Identifier: GPL-3.0-only

//! Sliding window of recent depth frames
//!
//! Stereo depth sensors drop individual pixels from frame to frame. Keeping
//! the last N frames lets the keyer call a pixel foreground when any recent
//! sample at that coordinate was inside the clip range, so a single-frame
//! dropout does not flicker to the key color.

use std::collections::VecDeque;

use crate::backends::depth::{ClipRange, DepthFrame};

#[derive(Debug, Clone)]
pub struct DepthHistory {
    capacity: usize,
    width: u32,
    height: u32,
    /// Oldest frame at the front
    frames: VecDeque<Vec<u16>>,
}

impl DepthHistory {
    /// A window of `capacity` frames (at least one)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            width: 0,
            height: 0,
            frames: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of frames currently retained
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Whether more than the current frame takes part in the decision
    pub fn is_enabled(&self) -> bool {
        self.capacity > 1
    }

    /// Change the window length, keeping the most recent frames
    ///
    /// A length of one disables the window and drops everything retained, so
    /// a later re-enable starts from fresh samples only.
    pub fn set_capacity(&mut self, capacity: usize) {
        let capacity = capacity.max(1);
        self.capacity = capacity;
        if capacity == 1 {
            self.frames.clear();
            self.frames.shrink_to_fit();
        } else if self.frames.len() > capacity {
            let excess = self.frames.len() - capacity;
            self.frames.drain(..excess);
            self.frames.shrink_to_fit();
        }
    }

    /// Append a frame, evicting the oldest one when the window is full
    ///
    /// A frame with different geometry restarts the window; samples from
    /// another pixel grid say nothing about this one.
    pub fn push(&mut self, frame: &DepthFrame) {
        if frame.width != self.width || frame.height != self.height {
            self.frames.clear();
            self.width = frame.width;
            self.height = frame.height;
        }

        let mut slot = if self.frames.len() >= self.capacity {
            self.frames.pop_front().unwrap_or_default()
        } else {
            Vec::with_capacity(frame.data.len())
        };
        slot.clear();
        slot.extend_from_slice(&frame.data);
        self.frames.push_back(slot);
    }

    /// Whether any retained sample at `index` is inside `clip`
    #[inline]
    pub fn any_in_range(&self, index: usize, clip: &ClipRange) -> bool {
        self.frames
            .iter()
            .any(|frame| frame.get(index).is_some_and(|&d| clip.contains(d)))
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

impl Default for DepthHistory {
    fn default() -> Self {
        Self::new(crate::constants::DEFAULT_DEPTH_HISTORY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(value: u16) -> DepthFrame {
        DepthFrame::filled(2, 1, value)
    }

    /// Retained samples at `index`, oldest first
    fn samples(history: &DepthHistory, index: usize) -> Vec<u16> {
        history.frames.iter().filter_map(|f| f.get(index).copied()).collect()
    }

    #[test]
    fn test_window_is_bounded() {
        let mut history = DepthHistory::new(3);
        for value in 1..=5 {
            history.push(&frame(value));
        }
        assert_eq!(history.len(), 3);
        assert_eq!(samples(&history, 0), vec![3, 4, 5]);
    }

    #[test]
    fn test_shrink_keeps_most_recent() {
        let mut history = DepthHistory::new(8);
        for value in 1..=6 {
            history.push(&frame(value));
        }

        history.set_capacity(2);
        assert_eq!(history.len(), 2);
        assert_eq!(samples(&history, 1), vec![5, 6]);

        history.push(&frame(7));
        assert_eq!(samples(&history, 1), vec![6, 7]);
    }

    #[test]
    fn test_grow_keeps_samples() {
        let mut history = DepthHistory::new(2);
        history.push(&frame(1));
        history.push(&frame(2));
        history.set_capacity(4);
        history.push(&frame(3));
        assert_eq!(samples(&history, 0), vec![1, 2, 3]);
    }

    #[test]
    fn test_zero_capacity_means_current_frame_only() {
        let mut history = DepthHistory::new(0);
        assert_eq!(history.capacity(), 1);
        assert!(!history.is_enabled());
        history.push(&frame(1));
        history.push(&frame(2));
        assert_eq!(samples(&history, 0), vec![2]);
    }

    #[test]
    fn test_disable_drops_retained_frames() {
        let mut history = DepthHistory::new(4);
        history.push(&frame(500));
        history.push(&frame(600));

        history.set_capacity(1);
        assert!(!history.is_enabled());
        assert!(history.is_empty());

        history.set_capacity(4);
        assert!(history.is_empty());
        history.push(&frame(0));
        assert_eq!(samples(&history, 0), vec![0]);
    }

    #[test]
    fn test_geometry_change_resets() {
        let mut history = DepthHistory::new(4);
        history.push(&frame(1));
        history.push(&frame(2));
        history.push(&DepthFrame::filled(4, 4, 9));
        assert_eq!(history.len(), 1);
        assert_eq!(samples(&history, 15), vec![9]);
    }

    #[test]
    fn test_any_in_range_tolerates_dropout() {
        let clip = ClipRange {
            lower: 100,
            upper: 1000,
        };
        let mut history = DepthHistory::new(3);
        history.push(&frame(500));
        history.push(&frame(0));
        assert!(history.any_in_range(0, &clip));

        history.push(&frame(0));
        history.push(&frame(0));
        assert!(!history.any_in_range(0, &clip));
    }
}
