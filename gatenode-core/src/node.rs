//! Per-Receiver Node State: Crossing Detection and Pass Records
//!
//! ## Overview
//!
//! An [`RssiNode`] owns everything one tuner frequency needs: the smoothing
//! filter, the extremum history, the hysteresis crossing state machine, and
//! the last completed pass record. The firmware calls [`RssiNode::process`]
//! once per sampling-loop iteration; the command handler reads and mutates
//! the same node between iterations.
//!
//! ## Crossing state machine
//!
//! ```text
//!                smoothed >= enter_at_level
//!   NOT_CROSSING ──────────────────────────► CROSSING
//!        ▲                                       │
//!        └───────────────────────────────────────┘
//!          smoothed < exit_at_level, or force-end
//! ```
//!
//! Distinct enter/exit levels give hysteresis so the signal hovering near a
//! single threshold cannot toggle the gate. `enter >= exit` is the expected
//! configuration but is deliberately not enforced: an inverted pair is a
//! configuration fault that degrades to always/never-crossing behavior, not
//! a state-machine fault.
//!
//! While crossing, the node tracks the pass peak; while idle, it tracks the
//! lowest smoothed value since the previous pass ended. Completing a pass
//! (threshold exit or forced end) publishes a [`LastPass`] record and resets
//! both trackers for the next lap.

use crate::history::{Extremum, ExtremumKind, History};
use crate::median::{SmoothingFilter, SMOOTHING_SAMPLES, SMOOTHING_TIMESTAMPS};
use crate::time::{Micros, Millis};
use crate::{Rssi, MAX_RSSI};

/// Mutable node configuration, written over the command link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Settings {
    /// Tuner frequency in MHz.
    pub vtx_freq: u16,
    /// A pass begins when the smoothed RSSI is at or above this level.
    pub enter_at_level: Rssi,
    /// A pass ends when the smoothed RSSI goes below this level.
    pub exit_at_level: Rssi,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            vtx_freq: 5800,
            enter_at_level: 96,
            exit_at_level: 80,
        }
    }
}

/// Result of the most recently completed pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct LastPass {
    /// Peak smoothed RSSI seen during the pass (0 until a pass completes).
    pub rssi_peak: Rssi,
    /// Pass timestamp: midpoint of the peak plateau.
    pub timestamp: Millis,
    /// Lowest smoothed RSSI seen between the previous pass and this one.
    pub rssi_nadir: Rssi,
    /// Lap counter; increments by exactly one per completed pass.
    pub lap: u8,
}

/// Live signal state, reset whenever the tuner frequency changes.
#[derive(Debug, Clone)]
struct State {
    /// True while the transponder is judged to be in the gate.
    crossing: bool,
    /// Current smoothed RSSI value.
    rssi: Rssi,
    /// Previous smoothed value, for the delta-driven tracker.
    last_rssi: Rssi,
    /// Attributed timestamp of the current smoothed value.
    rssi_timestamp: Millis,
    /// Peak seen during the current pass; `None` outside a pass.
    pass_peak: Option<Extremum>,
    /// Lowest smoothed value since the end of the last pass.
    pass_rssi_nadir: Rssi,
    /// Highest smoothed value since the frequency was last set.
    node_rssi_peak: Rssi,
    /// Lowest smoothed value since the frequency was last set.
    node_rssi_nadir: Rssi,
    /// Set once the first frequency command arrives; gates processing.
    activated: bool,
    /// Duration of the last sampling-loop iteration, for health telemetry.
    loop_time_micros: Micros,
    last_loop_micros: Micros,
}

impl State {
    const fn new() -> Self {
        Self {
            crossing: false,
            rssi: 0,
            last_rssi: 0,
            rssi_timestamp: 0,
            pass_peak: None,
            pass_rssi_nadir: MAX_RSSI,
            node_rssi_peak: 0,
            node_rssi_nadir: MAX_RSSI,
            activated: false,
            loop_time_micros: 0,
            last_loop_micros: 0,
        }
    }

    /// Back to power-on signal state; activation survives, settings and the
    /// last pass record are not ours to touch.
    fn reset(&mut self) {
        let activated = self.activated;
        let last_loop = self.last_loop_micros;
        *self = Self::new();
        self.activated = activated;
        self.last_loop_micros = last_loop;
    }
}

/// One receiver node: smoothing, crossing detection, extremum history and
/// the last-pass record for a single tuner frequency.
///
/// `W`/`H` size the smoothing filter (median window and timestamp ring);
/// production builds use the defaults, tests shrink them for determinism.
#[derive(Debug, Clone)]
pub struct RssiNode<const W: usize = SMOOTHING_SAMPLES, const H: usize = SMOOTHING_TIMESTAMPS> {
    index: u8,
    settings: Settings,
    state: State,
    history: History,
    last_pass: LastPass,
    filter: SmoothingFilter<W, H>,
}

impl<const W: usize, const H: usize> RssiNode<W, H> {
    /// Create a node with the given registry index.
    pub const fn new(index: u8) -> Self {
        Self {
            index,
            settings: Settings {
                vtx_freq: 5800,
                enter_at_level: 96,
                exit_at_level: 80,
            },
            state: State::new(),
            history: History::new(),
            last_pass: LastPass {
                rssi_peak: 0,
                timestamp: 0,
                rssi_nadir: MAX_RSSI,
                lap: 0,
            },
            filter: SmoothingFilter::new(),
        }
    }

    /// Run one sampling-loop iteration; returns the crossing flag.
    ///
    /// The raw sample always feeds the smoothing window, but tracking,
    /// history and crossing logic only run once the node is activated by its
    /// first frequency command.
    pub fn process(&mut self, raw_rssi: Rssi, millis: Millis) -> bool {
        let (smoothed, smoothed_at) = self.filter.push(raw_rssi, millis);

        if self.state.activated {
            self.state.last_rssi = self.state.rssi;
            self.state.rssi = smoothed;
            self.state.rssi_timestamp = smoothed_at;

            self.history
                .record(self.state.rssi, self.state.last_rssi, smoothed_at);

            // node lifetime extrema, independent of crossing state
            if self.state.rssi > self.state.node_rssi_peak {
                self.state.node_rssi_peak = self.state.rssi;
            }
            if self.state.rssi < self.state.node_rssi_nadir {
                self.state.node_rssi_nadir = self.state.rssi;
            }

            if !self.state.crossing && self.state.rssi >= self.settings.enter_at_level {
                // pass starting
                self.state.crossing = true;
                self.state.pass_peak = None;
            } else if self.state.crossing && self.state.rssi < self.settings.exit_at_level {
                self.end_crossing();
            }

            if self.state.crossing {
                self.track_pass_peak(smoothed, smoothed_at);
            } else if self.state.rssi < self.state.pass_rssi_nadir {
                self.state.pass_rssi_nadir = self.state.rssi;
            }
        }

        self.state.crossing
    }

    fn track_pass_peak(&mut self, rssi: Rssi, timestamp: Millis) {
        match &mut self.state.pass_peak {
            Some(peak) if rssi > peak.rssi => *peak = Extremum::new(rssi, timestamp),
            Some(peak) if rssi == peak.rssi => peak.extend_to(timestamp),
            Some(_) => {}
            None => self.state.pass_peak = Some(Extremum::new(rssi, timestamp)),
        }
    }

    /// Complete the current pass, by threshold exit or host force-end.
    ///
    /// A force-end with no active crossing is a no-op, so the lap counter
    /// only ever advances on a completed pass. The pass timestamp is the
    /// midpoint of the peak plateau, which is where the transponder was
    /// closest to the gate.
    pub fn end_crossing(&mut self) {
        if !self.state.crossing {
            return;
        }

        match self.state.pass_peak {
            Some(peak) => {
                self.last_pass.rssi_peak = peak.rssi;
                self.last_pass.timestamp =
                    peak.first_time.wrapping_add(peak.duration as Millis / 2);
            }
            None => {
                self.last_pass.rssi_peak = 0;
                self.last_pass.timestamp = self.state.rssi_timestamp;
            }
        }
        self.last_pass.rssi_nadir = self.state.pass_rssi_nadir;
        self.last_pass.lap = self.last_pass.lap.wrapping_add(1);

        self.state.crossing = false;
        self.state.pass_peak = None;
        self.state.pass_rssi_nadir = MAX_RSSI;

        // hand the closed pass peak to the reader rather than stranding it
        // in the candidate slot behind an unread value
        self.history.flush(ExtremumKind::Peak, true);
    }

    /// Record the sampling-loop duration from the microsecond clock.
    pub fn record_loop_time(&mut self, micros: Micros) {
        self.state.loop_time_micros = micros.wrapping_sub(self.state.last_loop_micros);
        self.state.last_loop_micros = micros;
    }

    /// Restart all signal tracking: state, history, smoothing window and
    /// lifetime extrema. Settings and the last pass record are untouched.
    ///
    /// Invoked whenever the tuner frequency changes (prior signal history is
    /// meaningless on a new frequency) and on explicit host reset.
    pub fn state_reset(&mut self) {
        self.state.reset();
        self.history.clear();
        self.filter.clear();
    }

    /// True once the node has received an initializing frequency command.
    pub fn state_valid(&self) -> bool {
        self.state.activated
    }

    /// Registry index of this node.
    pub fn index(&self) -> u8 {
        self.index
    }

    /// Whether the transponder is currently judged to be in the gate.
    pub fn is_crossing(&self) -> bool {
        self.state.crossing
    }

    /// Current smoothed RSSI value.
    pub fn smoothed_rssi(&self) -> Rssi {
        self.state.rssi
    }

    /// Highest smoothed value since the frequency was last set.
    pub fn node_rssi_peak(&self) -> Rssi {
        self.state.node_rssi_peak
    }

    /// Lowest smoothed value since the frequency was last set.
    pub fn node_rssi_nadir(&self) -> Rssi {
        self.state.node_rssi_nadir
    }

    /// Duration of the last sampling-loop iteration in microseconds.
    pub fn loop_time_micros(&self) -> Micros {
        self.state.loop_time_micros
    }

    /// Whether the node has been activated by a frequency command.
    pub fn activated(&self) -> bool {
        self.state.activated
    }

    /// Set or clear the activation flag.
    pub fn set_activated(&mut self, activated: bool) {
        self.state.activated = activated;
    }

    /// Current tuner frequency in MHz.
    pub fn vtx_freq(&self) -> u16 {
        self.settings.vtx_freq
    }

    /// Set the tuner frequency setting (does not touch the tuner itself).
    pub fn set_vtx_freq(&mut self, mhz: u16) {
        self.settings.vtx_freq = mhz;
    }

    /// Pass-enter threshold.
    pub fn enter_at_level(&self) -> Rssi {
        self.settings.enter_at_level
    }

    /// Set the pass-enter threshold.
    pub fn set_enter_at_level(&mut self, level: Rssi) {
        self.settings.enter_at_level = level;
    }

    /// Pass-exit threshold.
    pub fn exit_at_level(&self) -> Rssi {
        self.settings.exit_at_level
    }

    /// Set the pass-exit threshold.
    pub fn set_exit_at_level(&mut self, level: Rssi) {
        self.settings.exit_at_level = level;
    }

    /// Most recently completed pass.
    pub fn last_pass(&self) -> &LastPass {
        &self.last_pass
    }

    /// Extremum history, read-only.
    pub fn history(&self) -> &History {
        &self.history
    }

    /// Extremum history for the draining reader.
    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }
}

impl<const W: usize, const H: usize> Default for RssiNode<W, H> {
    fn default() -> Self {
        Self::new(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Window of 1 makes the median the identity, so scenarios are exact.
    fn unsmoothed_node() -> RssiNode<1, 1> {
        let mut node = RssiNode::new(0);
        node.set_activated(true);
        node
    }

    fn feed(node: &mut RssiNode<1, 1>, samples: &[Rssi], start_ms: Millis) -> Millis {
        let mut t = start_ms;
        for &s in samples {
            node.process(s, t);
            t += 1;
        }
        t
    }

    #[test]
    fn inert_until_activated() {
        let mut node: RssiNode<1, 1> = RssiNode::new(0);
        assert!(!node.state_valid());

        node.process(200, 0);
        assert!(!node.is_crossing());
        assert_eq!(node.smoothed_rssi(), 0);
        assert_eq!(node.node_rssi_peak(), 0);
    }

    #[test]
    fn crossing_scenario_produces_pass() {
        let mut node = unsmoothed_node();
        node.set_enter_at_level(90);
        node.set_exit_at_level(70);

        feed(&mut node, &[50, 50, 52, 90, 92, 95, 91, 60, 55], 0);

        assert!(!node.is_crossing());
        let pass = node.last_pass();
        assert_eq!(pass.lap, 1);
        assert_eq!(pass.rssi_peak, 95);
        // nadir preceding the pass was the low plateau at 50
        assert_eq!(pass.rssi_nadir, 50);
    }

    #[test]
    fn equal_thresholds_toggle_at_boundary() {
        let mut node = unsmoothed_node();
        node.set_enter_at_level(90);
        node.set_exit_at_level(90);

        node.process(89, 0);
        assert!(!node.is_crossing());
        node.process(90, 1);
        assert!(node.is_crossing());
        node.process(89, 2);
        assert!(!node.is_crossing());
        assert_eq!(node.last_pass().lap, 1);
    }

    #[test]
    fn pass_peak_prefers_first_occurrence_midpoint() {
        let mut node = unsmoothed_node();
        node.set_enter_at_level(90);
        node.set_exit_at_level(70);

        // peak plateau of 95 from t=2 through t=4
        feed(&mut node, &[90, 92, 95, 95, 95, 80, 60], 0);

        let pass = node.last_pass();
        assert_eq!(pass.rssi_peak, 95);
        // plateau first seen t=2, held 2ms, midpoint t=3
        assert_eq!(pass.timestamp, 3);
    }

    #[test]
    fn forced_end_without_crossing_is_noop() {
        let mut node = unsmoothed_node();
        node.end_crossing();
        assert_eq!(node.last_pass().lap, 0);
    }

    #[test]
    fn forced_end_completes_active_crossing() {
        let mut node = unsmoothed_node();
        node.set_enter_at_level(90);
        node.set_exit_at_level(70);

        feed(&mut node, &[95, 96], 0);
        assert!(node.is_crossing());

        node.end_crossing();
        assert!(!node.is_crossing());
        assert_eq!(node.last_pass().lap, 1);
        assert_eq!(node.last_pass().rssi_peak, 96);

        // second forced end: no phantom lap
        node.end_crossing();
        assert_eq!(node.last_pass().lap, 1);
    }

    #[test]
    fn lap_counter_increments_once_per_pass() {
        let mut node = unsmoothed_node();
        node.set_enter_at_level(90);
        node.set_exit_at_level(70);

        let t = feed(&mut node, &[95, 95, 60], 0);
        assert_eq!(node.last_pass().lap, 1);
        feed(&mut node, &[95, 95, 60], t);
        assert_eq!(node.last_pass().lap, 2);
    }

    #[test]
    fn lifetime_extrema_track_unconditionally() {
        let mut node = unsmoothed_node();
        feed(&mut node, &[40, 120, 30], 0);
        assert_eq!(node.node_rssi_peak(), 120);
        assert_eq!(node.node_rssi_nadir(), 30);
    }

    #[test]
    fn state_reset_preserves_settings_and_last_pass() {
        let mut node = unsmoothed_node();
        node.set_enter_at_level(90);
        node.set_exit_at_level(70);
        feed(&mut node, &[95, 95, 60], 0);

        let pass_before = *node.last_pass();
        node.state_reset();

        assert_eq!(node.node_rssi_peak(), 0);
        assert_eq!(node.node_rssi_nadir(), MAX_RSSI);
        assert!(node.history().next_to_send().is_none());
        assert_eq!(*node.last_pass(), pass_before);
        assert_eq!(node.enter_at_level(), 90);
        assert_eq!(node.exit_at_level(), 70);
        assert!(node.state_valid());
    }

    #[test]
    fn degenerate_inverted_thresholds_accepted() {
        let mut node = unsmoothed_node();
        node.set_enter_at_level(60);
        node.set_exit_at_level(80);

        // enters at 60, then 70 < 80 exits on the very next sample:
        // degenerate but legal
        node.process(70, 0);
        assert!(node.is_crossing());
        node.process(70, 1);
        assert!(!node.is_crossing());
        assert_eq!(node.last_pass().lap, 1);
    }

    #[test]
    fn loop_time_is_delta_of_micros() {
        let mut node = unsmoothed_node();
        node.record_loop_time(1_000);
        node.record_loop_time(2_500);
        assert_eq!(node.loop_time_micros(), 1_500);
    }
}
