//! Signal-conditioning core for a gate-timing receiver node
//!
//! Digitized RSSI samples from a video-receiver tuner flow through a
//! running-median smoothing filter and a hysteresis crossing detector that
//! decides when a transponder passes through the timing gate. Detected
//! peak/nadir plateaus are handed to an asynchronously polling host through
//! depth-1 mailboxes, and per-pass results are retrievable over a small
//! command/response protocol.
//!
//! Key constraints:
//! - Runs inside a timing-critical sampling loop
//! - No heap allocation, no blocking, no locks
//! - Tolerates preemption by the command handler between iterations
//!
//! ```
//! use gatenode_core::{RssiNode, Settings};
//!
//! let mut node: RssiNode<3, 2> = RssiNode::new(0);
//! node.set_activated(true);
//!
//! // Sampling loop: raw ADC reading plus the millisecond clock
//! let crossing = node.process(120, 1000);
//! ```

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod commands;
pub mod errors;
pub mod history;
pub mod io;
pub mod median;
pub mod node;
pub mod registry;
pub mod rx5808;
pub mod time;

// Public API
pub use commands::{Command, CommandProcessor, PlatformHooks, SettingFlags};
pub use errors::{CommandError, CommandResult};
pub use history::{Extremum, ExtremumKind, History};
pub use node::{LastPass, RssiNode, Settings};
pub use registry::NodeRegistry;
pub use rx5808::{freq_mhz_to_reg_val, BusGuard, RxModule};
pub use time::{Clock, ManualClock, Micros, Millis};

/// 8-bit received-signal-strength level.
///
/// The full `[0, 255]` range is representable; `0` and [`MAX_RSSI`] double as
/// wire-level "slot empty" sentinels for peak and nadir records respectively.
/// A genuine sustained extremum never sits exactly at either rail in the
/// modeled signal range, which is what makes the sentinel encoding safe.
pub type Rssi = u8;

/// Highest representable RSSI level; wire sentinel for "no nadir recorded".
pub const MAX_RSSI: Rssi = 0xFF;

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
