//! Progress reporting and cooperative cancellation.
//!
//! Analysis runs synchronously on the caller's thread. A caller can stop it
//! two ways:
//! - return `false` from a [`ProgressCallback`]
//! - call [`CancellationToken::cancel`] from any thread
//!
//! Either way the analysis stops at the next checkpoint and returns what it
//! has so far, marked incomplete.
//!
//! # Example
//!
//! ```
//! use mesh_overhang::progress::{CancellationToken, ProgressCallback};
//!
//! let callback: ProgressCallback = Box::new(|progress| {
//!     println!("{}%: {}", progress.percent(), progress.message);
//!     true
//! });
//!
//! let token = CancellationToken::new();
//! let remote = token.clone();
//! std::thread::spawn(move || remote.cancel()).join().unwrap();
//! assert!(token.is_cancelled());
//! # let _ = callback;
//! ```

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Progress information passed to callbacks.
#[derive(Debug, Clone)]
pub struct Progress {
    /// Current step.
    pub current: u64,

    /// Total number of steps.
    pub total: u64,

    /// Stage being processed.
    pub message: String,

    /// Elapsed time since the analysis started.
    pub elapsed: Duration,
}

impl Progress {
    /// Create a new progress report.
    pub fn new(current: u64, total: u64, message: impl Into<String>) -> Self {
        Self {
            current,
            total,
            message: message.into(),
            elapsed: Duration::ZERO,
        }
    }

    /// Progress as a fraction (0.0 to 1.0).
    #[inline]
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            (self.current as f64 / self.total as f64).min(1.0)
        }
    }

    /// Progress as a percentage (0 to 100).
    #[inline]
    pub fn percent(&self) -> u32 {
        (self.fraction() * 100.0).round() as u32
    }
}

/// Callback function for progress reporting.
///
/// Returns `true` to continue, `false` to request cancellation.
pub type ProgressCallback = Box<dyn Fn(&Progress) -> bool + Send + Sync>;

/// Shared cancellation flag.
///
/// Clones observe the same flag, so one clone can be handed to another
/// thread while the analysis polls the original.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Tracks progress of one analysis call and answers "should I stop?".
#[derive(Debug)]
pub struct ProgressTracker {
    current: AtomicU64,
    total: u64,
    token: CancellationToken,
    start_time: Instant,
    last_callback_time: Mutex<Option<Instant>>,
    callback_interval: Duration,
}

impl ProgressTracker {
    /// Create a tracker with its own cancellation flag.
    pub fn new(total: u64) -> Self {
        Self::with_token(total, CancellationToken::new())
    }

    /// Create a tracker that observes an external cancellation token.
    pub fn with_token(total: u64, token: CancellationToken) -> Self {
        Self {
            current: AtomicU64::new(0),
            total,
            token,
            start_time: Instant::now(),
            last_callback_time: Mutex::new(None),
            callback_interval: Duration::from_millis(100),
        }
    }

    /// Set the minimum time between two callback invocations.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.callback_interval = interval;
        self
    }

    /// Tracker for a following stage: its own counter over `total` items,
    /// the same cancellation flag and callback interval.
    pub fn stage(&self, total: u64) -> Self {
        Self::with_token(total, self.token.clone()).with_interval(self.callback_interval)
    }

    /// Increment progress by one.
    #[inline]
    pub fn increment(&self) {
        self.current.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn total(&self) -> u64 {
        self.total
    }

    /// Check if cancellation was requested.
    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Elapsed time since the tracker was created.
    #[inline]
    pub fn elapsed(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Create a Progress snapshot.
    pub fn snapshot(&self, message: impl Into<String>) -> Progress {
        Progress {
            current: self.current(),
            total: self.total,
            message: message.into(),
            elapsed: self.elapsed(),
        }
    }

    /// Call the callback if enough time has passed since the last call.
    ///
    /// Returns `false` when cancellation was requested, either earlier or by
    /// this callback.
    pub fn maybe_callback(
        &self,
        callback: Option<&ProgressCallback>,
        message: impl Into<String>,
    ) -> bool {
        if self.is_cancelled() {
            return false;
        }

        let Some(callback) = callback else {
            return true;
        };

        let now = Instant::now();
        if let Ok(mut last) = self.last_callback_time.lock() {
            if last.is_some_and(|t| now.duration_since(t) < self.callback_interval) {
                return true;
            }
            *last = Some(now);
        }

        let should_continue = callback(&self.snapshot(message));
        if !should_continue {
            self.cancel();
        }
        should_continue
    }
}
