// SPDX-License-Identifier: GPL-3.0-only

//! Thread lifecycle management for paced capture loops
//!
//! A [`CaptureLoopController`] owns one capture thread. The loop body runs
//! once per tick; ticks are scheduled against absolute deadlines so a slow
//! frame does not push every following frame back.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Action returned by the capture loop callback to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Absolute-deadline scheduler
///
/// Each tick is due exactly one interval after the previous deadline, not
/// after the previous wake-up. When the loop falls more than one interval
/// behind it resynchronizes to the current time instead of bursting.
#[derive(Debug, Clone)]
pub struct Pacer {
    interval: Duration,
    next_deadline: Instant,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self::starting_at(interval, Instant::now())
    }

    pub fn starting_at(interval: Duration, start: Instant) -> Self {
        Self {
            interval,
            next_deadline: start + interval,
        }
    }

    /// Advance to the next deadline and return how long to sleep until it
    pub fn advance(&mut self, now: Instant) -> Duration {
        let wait = self.next_deadline.saturating_duration_since(now);
        if now > self.next_deadline + self.interval {
            trace!(
                behind = ?(now - self.next_deadline),
                "Capture loop fell behind, resynchronizing"
            );
            self.next_deadline = now + self.interval;
        } else {
            self.next_deadline += self.interval;
        }
        wait
    }

    pub fn next_deadline(&self) -> Instant {
        self.next_deadline
    }
}

/// Controller for a capture loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let mut controller = CaptureLoopController::start("depth-capture", interval, || {
///     match engine.get_frame(&mut buffer) {
///         Ok(_) => LoopAction::Continue,
///         Err(_) => LoopAction::Stop,
///     }
/// });
///
/// // Later, stop the loop
/// controller.stop();
/// ```
pub struct CaptureLoopController {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<()>>,
    /// Signal to stop the loop
    stop_signal: Arc<AtomicBool>,
    /// Name for logging
    name: String,
}

impl CaptureLoopController {
    /// Start a new paced capture loop in a separate thread
    ///
    /// `loop_fn` is called once per `interval` until it returns
    /// `LoopAction::Stop` or the controller is stopped.
    pub fn start<F>(name: &str, interval: Duration, mut loop_fn: F) -> Self
    where
        F: FnMut() -> LoopAction + Send + 'static,
    {
        Self::start_with_init(name, interval, || Ok(()), move |_: &mut ()| loop_fn())
    }

    /// Start a paced capture loop with initialization
    ///
    /// The `init_fn` is called once at the start of the thread to set up
    /// resources. If initialization fails, the thread exits immediately.
    pub fn start_with_init<S, I, F>(name: &str, interval: Duration, init_fn: I, mut loop_fn: F) -> Self
    where
        S: Send + 'static,
        I: FnOnce() -> Result<S, String> + Send + 'static,
        F: FnMut(&mut S) -> LoopAction + Send + 'static,
    {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, interval = ?interval, "Starting capture loop");

        let thread_handle = thread::spawn(move || {
            debug!(name = %name_clone, "Capture loop thread started, initializing...");

            let mut state = match init_fn() {
                Ok(s) => s,
                Err(e) => {
                    warn!(name = %name_clone, error = %e, "Initialization failed");
                    return;
                }
            };

            let mut pacer = Pacer::new(interval);
            loop {
                if stop_signal_clone.load(Ordering::SeqCst) {
                    debug!(name = %name_clone, "Stop signal received");
                    break;
                }

                if loop_fn(&mut state) == LoopAction::Stop {
                    debug!(name = %name_clone, "Loop requested stop");
                    break;
                }

                let wait = pacer.advance(Instant::now());
                if !wait.is_zero() {
                    thread::sleep(wait);
                }
            }

            info!(name = %name_clone, "Capture loop thread exiting");
        });

        Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        }
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the loop and wait for the thread to finish
    pub fn stop(&mut self) {
        self.request_stop();
        self.join();
    }

    /// Wait for the thread to finish without sending stop signal
    pub fn join(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "Waiting for capture loop thread to finish");
            if let Err(e) = handle.join() {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
            }
        }
    }
}

impl Drop for CaptureLoopController {
    fn drop(&mut self) {
        if self.thread_handle.is_some() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    #[test]
    fn test_pacer_uses_absolute_deadlines() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);
        let mut pacer = Pacer::starting_at(interval, start);

        // Tick finished 4ms in: sleep the remaining 6ms
        let wait = pacer.advance(start + Duration::from_millis(4));
        assert_eq!(wait, Duration::from_millis(6));
        assert_eq!(pacer.next_deadline(), start + Duration::from_millis(20));

        // Slightly late tick: no sleep, but the schedule does not drift
        let wait = pacer.advance(start + Duration::from_millis(23));
        assert_eq!(wait, Duration::ZERO);
        assert_eq!(pacer.next_deadline(), start + Duration::from_millis(30));
    }

    #[test]
    fn test_pacer_resynchronizes_when_far_behind() {
        let start = Instant::now();
        let interval = Duration::from_millis(10);
        let mut pacer = Pacer::starting_at(interval, start);

        let late = start + Duration::from_millis(55);
        assert_eq!(pacer.advance(late), Duration::ZERO);
        assert_eq!(pacer.next_deadline(), late + interval);
    }

    #[test]
    fn test_basic_loop() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller =
            CaptureLoopController::start("test-loop", Duration::from_millis(1), move || {
                let count = counter_clone.fetch_add(1, Ordering::SeqCst);
                if count >= 10 {
                    LoopAction::Stop
                } else {
                    LoopAction::Continue
                }
            });

        controller.join();

        assert_eq!(counter.load(Ordering::SeqCst), 11);
    }

    #[test]
    fn test_stop_signal() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = Arc::clone(&counter);

        let mut controller =
            CaptureLoopController::start("test-loop", Duration::from_millis(5), move || {
                counter_clone.fetch_add(1, Ordering::SeqCst);
                LoopAction::Continue
            });

        thread::sleep(Duration::from_millis(50));

        controller.stop();
        let stopped_at = counter.load(Ordering::SeqCst);
        assert!(stopped_at > 0);
        assert!(!controller.is_running());

        thread::sleep(Duration::from_millis(20));
        assert_eq!(counter.load(Ordering::SeqCst), stopped_at);
    }

    #[test]
    fn test_init_failure() {
        let ran = Arc::new(AtomicBool::new(false));
        let ran_clone = Arc::clone(&ran);

        let mut controller = CaptureLoopController::start_with_init(
            "test-fail-init",
            Duration::from_millis(1),
            || Err::<(), _>("Init failed".to_string()),
            move |_: &mut ()| {
                ran_clone.store(true, Ordering::SeqCst);
                LoopAction::Stop
            },
        );

        controller.join();
        assert!(!ran.load(Ordering::SeqCst));
    }
}
