//! RX5808 Tuner Interface: Frequency Encoding and Bus Timing Guard
//!
//! The bit-level SPI-style line sequencing lives in the board support layer;
//! the core only needs three things from the tuner side, all here:
//!
//! - the pure frequency→register encoding for the RTC6715 synthesizer,
//! - the [`RxModule`] trait the command handler retunes through,
//! - the [`BusGuard`] shared by every node on one physical tuner bus.
//!
//! ## Register encoding contract
//!
//! Synthesizer register B of the RTC6715 splits a scaled frequency into an
//! N divider and a 7-bit A counter:
//!
//! ```text
//! tf = (f_mhz - 479) / 2        (integer division)
//! N  = tf / 32
//! A  = tf % 32
//! reg = (N << 7) | A
//! ```
//!
//! Spot values from the stock channel map: 5658 MHz → 0x281D,
//! 5800 MHz → 0x2984, 5945 MHz → 0x2A8D.

use crate::time::Millis;

/// Lowest tunable frequency accepted over the protocol (MHz).
pub const MIN_FREQ: u16 = 5645;

/// Highest tunable frequency accepted over the protocol (MHz).
pub const MAX_FREQ: u16 = 5945;

/// After a frequency write, RSSI readings are invalid for this long (ms).
pub const MIN_TUNE_TIME_MS: Millis = 35;

/// Minimum interval between frequency writes on one bus (ms).
pub const MIN_BUS_TIME_MS: Millis = 30;

/// Encode a frequency in MHz into the RTC6715 synthesizer-B register value.
///
/// Pure and deterministic; callers are responsible for range-checking the
/// input against [`MIN_FREQ`]/[`MAX_FREQ`] first. Values below 479 MHz are
/// outside the hardware's domain and saturate to register zero.
pub fn freq_mhz_to_reg_val(freq_mhz: u16) -> u16 {
    let tf = freq_mhz.saturating_sub(479) / 2;
    let n = tf / 32;
    let a = tf % 32;
    (n << 7) | a
}

/// Tuner control surface the core retunes through.
///
/// Implementations own the pins and the serial sequencing; they are expected
/// to consult a [`BusGuard`] before touching the bus and to record the write
/// afterwards, so concurrent nodes respect [`MIN_BUS_TIME_MS`].
pub trait RxModule {
    /// Tune the module to `freq_mhz`. `now` is the millisecond clock, used
    /// for bus-guard bookkeeping.
    fn set_frequency(&mut self, freq_mhz: u16, now: Millis);
}

/// Shared tuner-bus timing guard.
///
/// One guard exists per physical bus, shared by all nodes wired to it: at
/// most one frequency write proceeds per guard interval, and RSSI reads are
/// only meaningful once the settle time since the last write has elapsed.
#[derive(Debug, Clone, Copy, Default)]
pub struct BusGuard {
    last_write: Option<Millis>,
}

impl BusGuard {
    /// Guard with no write recorded yet.
    pub const fn new() -> Self {
        Self { last_write: None }
    }

    /// True when enough bus time has elapsed to issue another write.
    pub fn write_allowed(&self, now: Millis) -> bool {
        match self.last_write {
            Some(at) => now.wrapping_sub(at) >= MIN_BUS_TIME_MS,
            None => true,
        }
    }

    /// True once the tuner has settled and RSSI readings are valid again.
    pub fn rssi_valid(&self, now: Millis) -> bool {
        match self.last_write {
            Some(at) => now.wrapping_sub(at) >= MIN_TUNE_TIME_MS,
            None => true,
        }
    }

    /// Record a frequency write at `now`.
    pub fn note_write(&mut self, now: Millis) {
        self.last_write = Some(now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_encoding_matches_channel_map() {
        // R1, F4 and the top of the band from the stock RX5808 table
        assert_eq!(freq_mhz_to_reg_val(5658), 0x281D);
        assert_eq!(freq_mhz_to_reg_val(5800), 0x2984);
        assert_eq!(freq_mhz_to_reg_val(5945), 0x2A8D);
    }

    #[test]
    fn encoding_is_monotonic_over_the_band() {
        let mut prev = freq_mhz_to_reg_val(MIN_FREQ);
        for mhz in (MIN_FREQ + 1)..=MAX_FREQ {
            let reg = freq_mhz_to_reg_val(mhz);
            assert!(reg >= prev, "register value regressed at {mhz} MHz");
            prev = reg;
        }
    }

    #[test]
    fn out_of_domain_input_saturates() {
        assert_eq!(freq_mhz_to_reg_val(0), 0);
        assert_eq!(freq_mhz_to_reg_val(479), 0);
    }

    #[test]
    fn bus_guard_spaces_writes() {
        let mut guard = BusGuard::new();
        assert!(guard.write_allowed(0));

        guard.note_write(100);
        assert!(!guard.write_allowed(100 + MIN_BUS_TIME_MS - 1));
        assert!(guard.write_allowed(100 + MIN_BUS_TIME_MS));
    }

    #[test]
    fn bus_guard_gates_rssi_validity() {
        let mut guard = BusGuard::new();
        assert!(guard.rssi_valid(0));

        guard.note_write(100);
        assert!(!guard.rssi_valid(100 + MIN_TUNE_TIME_MS - 1));
        assert!(guard.rssi_valid(100 + MIN_TUNE_TIME_MS));
    }
}
