//! Extremum Tracking and Lock-Free Peak/Nadir Mailboxes
//!
//! ## Overview
//!
//! The smoothed RSSI trace is a sequence of rising and falling runs. Each
//! direction reversal closes a local extremum — a peak when the signal stops
//! rising, a nadir when it stops falling — and the host wants every one of
//! them, in order, even though it only polls occasionally.
//!
//! This module tracks the live extremum from the sign of the latest smoothed
//! delta and hands closed plateaus to the protocol reader through one depth-1
//! mailbox per kind.
//!
//! ## Mailbox discipline
//!
//! Each mailbox is a double buffer: a *candidate* slot written only by the
//! sampling loop, and a *send* slot consumed only by the command handler.
//!
//! ```text
//! sampling loop                         command handler
//!      │ begin/extend                        │
//!      ▼                                     ▼
//!  candidate ──(flush: send empty)──► send ──► take()
//!      │
//!      └─(flush forced, send occupied: more extreme value wins)
//! ```
//!
//! The producer is the sole writer of the candidate and the only party that
//! fills an empty send slot; the consumer only ever empties the send slot.
//! On the wire the send slots use value sentinels for emptiness (0 for peak,
//! 255 for nadir); inside the core emptiness is an explicit `Option`, and the
//! sentinels appear only at serialization time.
//!
//! When both send slots are occupied the consumer reports whichever closed
//! first (`first_time` order), leaving the other queued — so delivery order
//! matches occurrence order across kinds and nothing is reported twice.

use crate::time::Millis;
use crate::{Rssi, MAX_RSSI};

/// Longest plateau duration representable on the wire (milliseconds).
pub const MAX_DURATION: u16 = u16::MAX;

/// A recorded signal plateau: the extreme value, when it was first seen, and
/// how long it held before the signal moved away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Extremum {
    /// Extreme smoothed value observed.
    pub rssi: Rssi,
    /// Timestamp the value was first observed.
    pub first_time: Millis,
    /// How long the plateau held at `rssi`, in milliseconds.
    pub duration: u16,
}

impl Extremum {
    /// Start a new plateau observation at `first_time`.
    pub const fn new(rssi: Rssi, first_time: Millis) -> Self {
        Self {
            rssi,
            first_time,
            duration: 0,
        }
    }

    /// Timestamp the plateau ended (`first_time + duration`).
    pub fn end_time(&self) -> Millis {
        self.first_time.wrapping_add(self.duration as Millis)
    }

    /// Grow the plateau to cover `timestamp`, clamping at [`MAX_DURATION`].
    pub fn extend_to(&mut self, timestamp: Millis) {
        let held = timestamp.saturating_sub(self.first_time);
        self.duration = held.min(MAX_DURATION as Millis) as u16;
    }
}

/// Which kind of extremum a record or mailbox carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtremumKind {
    /// Local maximum of the smoothed signal.
    Peak,
    /// Local minimum of the smoothed signal.
    Nadir,
}

/// Depth-1 candidate/send handoff for one extremum kind.
#[derive(Debug, Clone)]
struct Mailbox {
    kind: ExtremumKind,
    candidate: Option<Extremum>,
    pending: bool,
    send: Option<Extremum>,
}

impl Mailbox {
    const fn new(kind: ExtremumKind) -> Self {
        Self {
            kind,
            candidate: None,
            pending: false,
            send: None,
        }
    }

    /// Restart the candidate at a fresh observation.
    fn begin(&mut self, rssi: Rssi, timestamp: Millis) {
        self.candidate = Some(Extremum::new(rssi, timestamp));
    }

    /// Extend the candidate plateau to cover `timestamp`.
    fn extend(&mut self, timestamp: Millis) {
        if let Some(candidate) = &mut self.candidate {
            candidate.extend_to(timestamp);
        }
    }

    /// Mark the candidate as a closed extremum awaiting handoff.
    fn mark_pending(&mut self) {
        if self.candidate.is_some() {
            self.pending = true;
        }
    }

    /// Move a pending candidate into the send slot.
    ///
    /// When the send slot is empty the candidate moves unconditionally.
    /// When it is occupied, a `forced` flush (the candidate is about to be
    /// overwritten by a new run) keeps whichever value is more extreme and
    /// discards the other; an unforced flush leaves the candidate pending.
    fn flush(&mut self, forced: bool) {
        if !self.pending {
            return;
        }
        let Some(candidate) = self.candidate else {
            self.pending = false;
            return;
        };
        match self.send {
            None => {
                self.send = Some(candidate);
                self.pending = false;
            }
            Some(sent) if forced => {
                if self.outranks(candidate, sent) {
                    self.send = Some(candidate);
                }
                self.pending = false;
            }
            Some(_) => {}
        }
    }

    fn outranks(&self, a: Extremum, b: Extremum) -> bool {
        match self.kind {
            ExtremumKind::Peak => a.rssi > b.rssi,
            ExtremumKind::Nadir => a.rssi < b.rssi,
        }
    }

    fn clear(&mut self) {
        self.candidate = None;
        self.pending = false;
        self.send = None;
    }
}

/// Per-node extremum history: the delta-driven tracker plus one mailbox per
/// extremum kind.
#[derive(Debug, Clone)]
pub struct History {
    peak: Mailbox,
    nadir: Mailbox,
    /// Sign of the most recent smoothed-value delta, clamped to ±127.
    /// Selects which tracker is live: >0 peak, <0 nadir.
    rssi_change: i8,
}

impl History {
    /// Create an empty history.
    pub const fn new() -> Self {
        Self {
            peak: Mailbox::new(ExtremumKind::Peak),
            nadir: Mailbox::new(ExtremumKind::Nadir),
            rssi_change: 0,
        }
    }

    /// Feed one smoothed sample into the tracker.
    ///
    /// `smoothed`/`last` are the current and previous smoothed values;
    /// `timestamp` is the attributed time of the current one.
    pub fn record(&mut self, smoothed: Rssi, last: Rssi, timestamp: Millis) {
        let change = smoothed as i16 - last as i16;
        if change > 0 {
            // rising: the candidate peak is about to be replaced, so a
            // pending one must reach the send slot now or be merged away
            self.peak.flush(true);
            self.peak.begin(smoothed, timestamp);
            if self.rssi_change <= 0 {
                // was falling or flat: the candidate nadir just closed
                self.nadir.mark_pending();
            }
        } else if change < 0 {
            self.nadir.flush(true);
            self.nadir.begin(smoothed, timestamp);
            if self.rssi_change >= 0 {
                self.peak.mark_pending();
            }
        } else if self.rssi_change > 0 {
            self.peak.extend(timestamp);
        } else if self.rssi_change < 0 {
            self.nadir.extend(timestamp);
        }
        self.rssi_change = change.clamp(-127, 127) as i8;

        // lazy drain: a pending candidate moves into an empty send slot
        self.peak.flush(false);
        self.nadir.flush(false);
    }

    /// Force any pending extremum of `kind` toward its send slot.
    ///
    /// Used when a pass ends, so the closed pass peak is not stranded in the
    /// candidate slot behind an unread send value.
    pub fn flush(&mut self, kind: ExtremumKind, forced: bool) {
        match kind {
            ExtremumKind::Peak => self.peak.flush(forced),
            ExtremumKind::Nadir => self.nadir.flush(forced),
        }
    }

    /// Which send slot the reader should report next.
    ///
    /// With both slots occupied the chronologically earlier `first_time`
    /// wins (ties go to the nadir), preserving occurrence order across kinds.
    pub fn next_to_send(&self) -> Option<ExtremumKind> {
        match (&self.peak.send, &self.nadir.send) {
            (Some(p), Some(n)) => {
                if p.first_time < n.first_time {
                    Some(ExtremumKind::Peak)
                } else {
                    Some(ExtremumKind::Nadir)
                }
            }
            (Some(_), None) => Some(ExtremumKind::Peak),
            (None, Some(_)) => Some(ExtremumKind::Nadir),
            (None, None) => None,
        }
    }

    /// Consume the send slot of `kind`, leaving it empty.
    pub fn take(&mut self, kind: ExtremumKind) -> Option<Extremum> {
        match kind {
            ExtremumKind::Peak => self.peak.send.take(),
            ExtremumKind::Nadir => self.nadir.send.take(),
        }
    }

    /// Inspect the send slot of `kind` without consuming it.
    pub fn peek(&self, kind: ExtremumKind) -> Option<&Extremum> {
        match kind {
            ExtremumKind::Peak => self.peak.send.as_ref(),
            ExtremumKind::Nadir => self.nadir.send.as_ref(),
        }
    }

    /// Wire sentinel for an empty send slot of `kind`.
    pub const fn empty_sentinel(kind: ExtremumKind) -> Rssi {
        match kind {
            ExtremumKind::Peak => 0,
            ExtremumKind::Nadir => MAX_RSSI,
        }
    }

    /// Reset both mailboxes and the direction tracker.
    pub fn clear(&mut self) {
        self.peak.clear();
        self.nadir.clear();
        self.rssi_change = 0;
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new()
    }
}
