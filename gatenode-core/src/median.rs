//! Running-Median Smoothing Filter for Raw RSSI Samples
//!
//! ## Overview
//!
//! Raw RSSI readings near the gate carry impulsive outliers (multipath
//! reflections, motor noise) that a moving average would smear into the
//! signal. A running median rejects them outright: the filter maintains the
//! most recent `W` raw samples and reports their median on every push.
//!
//! ## Design Rationale
//!
//! Two fixed-capacity structures back the filter:
//!
//! - a ring of the last `W` samples in arrival order, so the expiring sample
//!   is known without scanning;
//! - the same samples kept sorted ascending, so the median is a single array
//!   access and insertion/removal are bounded shifts.
//!
//! Each push is O(W) worst case (one binary search plus one `copy_within`
//! per structure), with no allocation and no blocking — it runs once per
//! sampling-loop iteration.
//!
//! ### Timestamp attribution
//!
//! A median computed over `W` samples describes the signal roughly half a
//! window ago, not "now". A parallel ring of `H = ceil(W/2)` timestamps
//! records when samples arrived; the filter attributes each reported median
//! the *oldest* timestamp still in that ring, which tracks the median's
//! middle position as the window slides.
//!
//! ## Usage
//!
//! ```
//! use gatenode_core::median::SmoothingFilter;
//!
//! let mut filter: SmoothingFilter<3, 2> = SmoothingFilter::new();
//! filter.push(50, 100);
//! filter.push(200, 101); // outlier
//! let (smoothed, at) = filter.push(52, 102);
//! assert_eq!(smoothed, 52); // outlier rejected
//! ```

use crate::time::Millis;
use crate::Rssi;

/// Production median window (samples).
pub const SMOOTHING_SAMPLES: usize = 255;

/// Production timestamp ring: half the median window, rounded up.
pub const SMOOTHING_TIMESTAMPS: usize = 128;

/// Fixed-capacity running-median filter with timestamp attribution.
///
/// ## Type Parameters
///
/// - `W`: median window length, at most 255 samples.
/// - `H`: timestamp ring length; callers supply `ceil(W / 2)` so the
///   attributed timestamp lags the input by about half the window.
///
/// ## Edge Cases
///
/// Before the window fills, the median is computed over the partial sample
/// set (upper median for even counts). Before the timestamp ring fills, the
/// attributed timestamp is the earliest one seen, so early medians are
/// attributed to the start of the recording rather than a bogus zero.
#[derive(Debug, Clone)]
pub struct SmoothingFilter<const W: usize, const H: usize> {
    /// Samples in arrival order; `head` is the next write position.
    ring: [Rssi; W],
    /// The same samples kept sorted ascending; `len` entries are valid.
    sorted: [Rssi; W],
    head: usize,
    len: usize,
    timestamps: [Millis; H],
    ts_head: usize,
    ts_len: usize,
}

impl<const W: usize, const H: usize> SmoothingFilter<W, H> {
    /// Create an empty filter. Usable in const/static contexts.
    pub const fn new() -> Self {
        Self {
            ring: [0; W],
            sorted: [0; W],
            head: 0,
            len: 0,
            timestamps: [0; H],
            ts_head: 0,
            ts_len: 0,
        }
    }

    /// Push a raw sample and return `(median, attributed_timestamp)`.
    pub fn push(&mut self, raw: Rssi, timestamp: Millis) -> (Rssi, Millis) {
        if self.len == W {
            let oldest = self.ring[self.head];
            self.remove_sorted(oldest);
            self.len -= 1;
        }
        self.ring[self.head] = raw;
        self.head = (self.head + 1) % W;
        self.insert_sorted(raw);
        self.len += 1;

        self.timestamps[self.ts_head] = timestamp;
        self.ts_head = (self.ts_head + 1) % H;
        if self.ts_len < H {
            self.ts_len += 1;
        }

        (self.median(), self.attributed_timestamp())
    }

    /// Median of the samples currently in the window.
    ///
    /// Upper median for even counts, matching the full-window convention
    /// (`sorted[W / 2]` once filled). Returns 0 before any sample arrives.
    pub fn median(&self) -> Rssi {
        if self.len == 0 {
            return 0;
        }
        self.sorted[self.len / 2]
    }

    /// Timestamp attributed to the current median value.
    ///
    /// The oldest entry still in the timestamp ring, i.e. the arrival time
    /// of the sample sitting near the median's middle position.
    pub fn attributed_timestamp(&self) -> Millis {
        if self.ts_len == 0 {
            return 0;
        }
        self.timestamps[(self.ts_head + H - self.ts_len) % H]
    }

    /// True once `W` samples have been absorbed.
    pub fn is_filled(&self) -> bool {
        self.len == W
    }

    /// Number of samples currently in the window.
    pub fn len(&self) -> usize {
        self.len
    }

    /// True if no samples have been pushed since creation or [`clear`].
    ///
    /// [`clear`]: SmoothingFilter::clear
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Discard all samples and timestamps.
    pub fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
        self.ts_head = 0;
        self.ts_len = 0;
    }

    fn insert_sorted(&mut self, value: Rssi) {
        let pos = self.sorted[..self.len].partition_point(|&x| x <= value);
        self.sorted.copy_within(pos..self.len, pos + 1);
        self.sorted[pos] = value;
    }

    fn remove_sorted(&mut self, value: Rssi) {
        // first entry equal to `value`; one is guaranteed present
        let pos = self.sorted[..self.len].partition_point(|&x| x < value);
        self.sorted.copy_within(pos + 1..self.len, pos);
    }
}

impl<const W: usize, const H: usize> Default for SmoothingFilter<W, H> {
    fn default() -> Self {
        Self::new()
    }
}
