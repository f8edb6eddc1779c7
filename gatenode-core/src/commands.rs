//! Command/Response Protocol Dispatch
//!
//! ## Overview
//!
//! The host controller drives the node through single in-flight
//! request/response exchanges: write commands carry a small fixed-size
//! payload, read commands return a fixed binary layout sealed with an
//! additive checksum. The transport (serial or bus-addressed) frames the
//! bytes; this module interprets them.
//!
//! The dispatcher runs in an interrupt-style context that may preempt the
//! sampling loop between iterations, so it only touches node state through
//! the handoff surfaces designed for it: settings writes that take effect
//! on the next iteration, the mailbox send slots it alone consumes, and the
//! last-pass record.
//!
//! ## Error behavior
//!
//! Unknown opcodes are logged and answered with an empty response — the
//! protocol never desynchronizes and never crashes. Recognized commands
//! with rejected values (out-of-band frequency, out-of-range node index)
//! are absorbed the same way but still count as host activity.

use crate::errors::{CommandError, CommandResult};
use crate::history::ExtremumKind;
use crate::io::IoBuffer;
use crate::node::RssiNode;
use crate::registry::NodeRegistry;
use crate::rx5808::{RxModule, MAX_FREQ, MIN_FREQ};
use crate::time::{Clock, Millis};

/// Protocol API level reported by `ReadRevisionCode`.
pub const NODE_API_LEVEL: u8 = 35;

/// Verification byte paired with the API level in the revision word.
pub const API_VERIFY: u8 = 0x25;

/// Optional-hardware feature flags reported by `ReadRhfeatFlags`.
///
/// This build drives a stock single-tuner board; no optional features.
pub const FEATURE_FLAGS: u16 = 0;

/// Extremum-response flag: a crossing is in progress.
pub const LAPSTATS_FLAG_CROSSING: u8 = 0x01;

/// Extremum-response flag: a peak record follows rather than a nadir.
pub const LAPSTATS_FLAG_PEAK: u8 = 0x02;

/// Protocol opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Node bus address readback.
    ReadAddress = 0x00,
    /// Current tuner frequency, 2 bytes.
    ReadFrequency = 0x03,
    /// Deprecated combined pass stats + extremums.
    ReadLapStats = 0x05,
    /// Lap number, time since pass, current/peak RSSI, loop time.
    ReadLapPassStats = 0x0D,
    /// Crossing flags, nadirs and one drained extremum record.
    ReadLapExtremums = 0x0E,
    /// API level and verification value, 2 bytes.
    ReadRevisionCode = 0x22,
    /// Lifetime peak since the frequency was set.
    ReadNodeRssiPeak = 0x23,
    /// Lifetime nadir since the frequency was set.
    ReadNodeRssiNadir = 0x24,
    /// Optional-hardware feature flags, 2 bytes.
    ReadRhfeatFlags = 0x27,
    /// Pass-enter threshold readback.
    ReadEnterAtLevel = 0x31,
    /// Pass-exit threshold readback.
    ReadExitAtLevel = 0x32,
    /// Millisecond clock readback, 4 bytes.
    ReadTimeMillis = 0x33,
    /// Number of nodes on this processor.
    ReadMultinodeCount = 0x39,
    /// Index of the node commands currently address.
    ReadCurnodeIndex = 0x3A,
    /// Set tuner frequency, 2 bytes, range-checked.
    WriteFrequency = 0x51,
    /// Set pass-enter threshold, 1 byte.
    WriteEnterAtLevel = 0x71,
    /// Set pass-exit threshold, 1 byte.
    WriteExitAtLevel = 0x72,
    /// End the current crossing regardless of signal level.
    ForceEndCrossing = 0x78,
    /// Assert/release the paired node's reset line (ISP support).
    ResetPairedNode = 0x79,
    /// Select which node subsequent commands address, 1 byte.
    WriteCurnodeIndex = 0x7A,
    /// Jump to the bootloader for a flash update.
    JumpToBootloader = 0x7E,
}

impl Command {
    /// Decode an opcode byte.
    pub fn from_opcode(opcode: u8) -> Option<Self> {
        Some(match opcode {
            0x00 => Self::ReadAddress,
            0x03 => Self::ReadFrequency,
            0x05 => Self::ReadLapStats,
            0x0D => Self::ReadLapPassStats,
            0x0E => Self::ReadLapExtremums,
            0x22 => Self::ReadRevisionCode,
            0x23 => Self::ReadNodeRssiPeak,
            0x24 => Self::ReadNodeRssiNadir,
            0x27 => Self::ReadRhfeatFlags,
            0x31 => Self::ReadEnterAtLevel,
            0x32 => Self::ReadExitAtLevel,
            0x33 => Self::ReadTimeMillis,
            0x39 => Self::ReadMultinodeCount,
            0x3A => Self::ReadCurnodeIndex,
            0x51 => Self::WriteFrequency,
            0x71 => Self::WriteEnterAtLevel,
            0x72 => Self::WriteExitAtLevel,
            0x78 => Self::ForceEndCrossing,
            0x79 => Self::ResetPairedNode,
            0x7A => Self::WriteCurnodeIndex,
            0x7E => Self::JumpToBootloader,
            _ => return None,
        })
    }

    /// Fixed payload size in bytes; the transport reads exactly this many
    /// after a write opcode.
    pub fn payload_size(self) -> usize {
        match self {
            Self::WriteFrequency => 2,
            Self::WriteEnterAtLevel
            | Self::WriteExitAtLevel
            | Self::ForceEndCrossing
            | Self::ResetPairedNode
            | Self::WriteCurnodeIndex
            | Self::JumpToBootloader => 1,
            _ => 0,
        }
    }

    /// True for commands that mutate state rather than read it.
    pub fn is_write(self) -> bool {
        self as u8 >= Self::WriteFrequency as u8
    }
}

/// Activity and change flags accumulated across commands.
///
/// External telemetry drains these with [`CommandProcessor::take_flags`] to
/// notice host activity and settings churn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SettingFlags(u8);

impl SettingFlags {
    /// A valid frequency write was applied (even if unchanged).
    pub const FREQ_SET: Self = Self(1 << 0);
    /// The tuner frequency actually changed.
    pub const FREQ_CHANGED: Self = Self(1 << 1);
    /// The enter threshold changed.
    pub const ENTERAT_CHANGED: Self = Self(1 << 2);
    /// The exit threshold changed.
    pub const EXITAT_CHANGED: Self = Self(1 << 3);
    /// Any recognized command was handled.
    pub const COMM_ACTIVITY: Self = Self(1 << 4);
    /// Lap statistics were read by the host.
    pub const LAPSTATS_READ: Self = Self(1 << 5);
    /// The command arrived over the serial transport.
    pub const SERIAL_CMD_MSG: Self = Self(1 << 6);

    /// No flags set.
    pub const fn empty() -> Self {
        Self(0)
    }

    /// Set all flags in `other`.
    pub fn set(&mut self, other: Self) {
        self.0 |= other.0;
    }

    /// True if all flags in `other` are set.
    pub const fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Raw flag bits.
    pub const fn bits(&self) -> u8 {
        self.0
    }
}

/// Board-level hooks for the two commands that reach outside the node:
/// paired-node reset (ISP) and bootloader entry. Hosts without the wiring
/// leave the defaults, which do nothing.
pub trait PlatformHooks {
    /// Drive the paired node's reset line; `asserted` pulls it low.
    fn reset_paired_node(&mut self, _asserted: bool) {}

    /// Reboot into the bootloader for a flash update.
    fn jump_to_bootloader(&mut self) {}
}

/// Protocol dispatcher: owns the bus address and the activity flags, and
/// borrows the registry explicitly for every exchange.
#[derive(Debug, Clone, Default)]
pub struct CommandProcessor {
    address: u8,
    flags: SettingFlags,
}

impl CommandProcessor {
    /// Create a dispatcher answering at `address`.
    pub fn new(address: u8) -> Self {
        Self {
            address,
            flags: SettingFlags::empty(),
        }
    }

    /// Flags accumulated since the last [`take_flags`].
    ///
    /// [`take_flags`]: CommandProcessor::take_flags
    pub fn flags(&self) -> SettingFlags {
        self.flags
    }

    /// Drain the accumulated flags for external telemetry.
    pub fn take_flags(&mut self) -> SettingFlags {
        core::mem::take(&mut self.flags)
    }

    /// Handle a write command against the active node.
    ///
    /// `payload` carries exactly [`Command::payload_size`] bytes as framed
    /// by the transport. Rejected values are absorbed: logged, prior state
    /// retained, no response either way.
    pub fn handle_write<const N: usize, const W: usize, const H: usize, P, C>(
        &mut self,
        registry: &mut NodeRegistry<N, W, H>,
        platform: &mut P,
        clock: &C,
        opcode: u8,
        payload: &[u8],
        serial: bool,
    ) where
        P: RxModule + PlatformHooks,
        C: Clock,
    {
        let recognized = match Command::from_opcode(opcode) {
            Some(command) if command.is_write() => Some(command),
            _ => None,
        };
        let Some(command) = recognized else {
            log::error!("invalid write command: 0x{opcode:02X}");
            return;
        };

        let mut buf = IoBuffer::from_payload(payload);
        let result: CommandResult<()> = match command {
            Command::WriteFrequency => {
                let mhz = buf.read16();
                if (MIN_FREQ..=MAX_FREQ).contains(&mhz) {
                    let node = registry.active_mut();
                    if mhz != node.vtx_freq() {
                        node.set_vtx_freq(mhz);
                        // a new frequency invalidates all prior signal history
                        node.state_reset();
                        self.flags.set(SettingFlags::FREQ_CHANGED);
                    }
                    self.flags.set(SettingFlags::FREQ_SET);
                    platform.set_frequency(mhz, clock.millis());
                    registry.active_mut().set_activated(true);
                    Ok(())
                } else {
                    Err(CommandError::FrequencyOutOfRange {
                        mhz,
                        min: MIN_FREQ,
                        max: MAX_FREQ,
                    })
                }
            }
            Command::WriteEnterAtLevel => {
                let level = buf.read8();
                let node = registry.active_mut();
                if level != node.enter_at_level() {
                    node.set_enter_at_level(level);
                    self.flags.set(SettingFlags::ENTERAT_CHANGED);
                }
                Ok(())
            }
            Command::WriteExitAtLevel => {
                let level = buf.read8();
                let node = registry.active_mut();
                if level != node.exit_at_level() {
                    node.set_exit_at_level(level);
                    self.flags.set(SettingFlags::EXITAT_CHANGED);
                }
                Ok(())
            }
            Command::WriteCurnodeIndex => {
                let index = buf.read8();
                if registry.select(index as usize) {
                    Ok(())
                } else {
                    Err(CommandError::NodeIndexOutOfRange {
                        index,
                        count: registry.count() as u8,
                    })
                }
            }
            Command::ForceEndCrossing => {
                registry.active_mut().end_crossing();
                Ok(())
            }
            Command::ResetPairedNode => {
                platform.reset_paired_node(buf.read8() != 0);
                Ok(())
            }
            Command::JumpToBootloader => {
                platform.jump_to_bootloader();
                Ok(())
            }
            // read opcodes never reach here
            _ => Err(CommandError::InvalidCommand { opcode }),
        };

        if let Err(err) = result {
            log::warn!("write command absorbed: {err}");
        }

        self.flags.set(SettingFlags::COMM_ACTIVITY);
        if serial {
            self.flags.set(SettingFlags::SERIAL_CMD_MSG);
        }
    }

    /// Handle a read command, building the response (with trailing checksum)
    /// into `response`. An unrecognized opcode leaves it empty.
    pub fn handle_read<const N: usize, const W: usize, const H: usize, C>(
        &mut self,
        registry: &mut NodeRegistry<N, W, H>,
        clock: &C,
        opcode: u8,
        response: &mut IoBuffer,
        serial: bool,
    ) where
        C: Clock,
    {
        response.clear();

        let recognized = match Command::from_opcode(opcode) {
            Some(command) if !command.is_write() => Some(command),
            _ => None,
        };
        let Some(command) = recognized else {
            log::error!("invalid read command: 0x{opcode:02X}");
            return;
        };

        match command {
            Command::ReadAddress => response.write8(self.address),
            Command::ReadFrequency => response.write16(registry.active().vtx_freq()),
            Command::ReadLapStats => {
                let now = clock.millis();
                write_pass_stats(response, registry.active(), now);
                write_extremums(response, registry.active_mut(), now);
                self.flags.set(SettingFlags::LAPSTATS_READ);
            }
            Command::ReadLapPassStats => {
                write_pass_stats(response, registry.active(), clock.millis());
                self.flags.set(SettingFlags::LAPSTATS_READ);
            }
            Command::ReadLapExtremums => {
                write_extremums(response, registry.active_mut(), clock.millis());
            }
            Command::ReadEnterAtLevel => response.write8(registry.active().enter_at_level()),
            Command::ReadExitAtLevel => response.write8(registry.active().exit_at_level()),
            Command::ReadRevisionCode => {
                response.write16(((API_VERIFY as u16) << 8) | NODE_API_LEVEL as u16)
            }
            Command::ReadNodeRssiPeak => response.write8(registry.active().node_rssi_peak()),
            Command::ReadNodeRssiNadir => response.write8(registry.active().node_rssi_nadir()),
            Command::ReadTimeMillis => response.write32(clock.millis()),
            Command::ReadRhfeatFlags => response.write16(FEATURE_FLAGS),
            Command::ReadMultinodeCount => response.write8(registry.count() as u8),
            Command::ReadCurnodeIndex => response.write8(registry.active_index() as u8),
            // write opcodes never reach here
            _ => {}
        }

        if !response.is_empty() {
            response.write_checksum();
        }

        self.flags.set(SettingFlags::COMM_ACTIVITY);
        if serial {
            self.flags.set(SettingFlags::SERIAL_CMD_MSG);
        }
    }
}

fn write_pass_stats<const W: usize, const H: usize>(
    buf: &mut IoBuffer,
    node: &RssiNode<W, H>,
    now: Millis,
) {
    let pass = node.last_pass();
    buf.write8(pass.lap);
    buf.write16(now.wrapping_sub(pass.timestamp) as u16); // ms since lap
    buf.write8(node.smoothed_rssi());
    buf.write8(node.node_rssi_peak());
    buf.write8(pass.rssi_peak);
    buf.write16(node.loop_time_micros() as u16);
}

fn write_extremums<const W: usize, const H: usize>(
    buf: &mut IoBuffer,
    node: &mut RssiNode<W, H>,
    now: Millis,
) {
    let next = node.history().next_to_send();
    let mut flags = 0u8;
    if node.is_crossing() {
        flags |= LAPSTATS_FLAG_CROSSING;
    }
    if next == Some(ExtremumKind::Peak) {
        flags |= LAPSTATS_FLAG_PEAK;
    }
    buf.write8(flags);
    buf.write8(node.last_pass().rssi_nadir);
    buf.write8(node.node_rssi_nadir());

    match next.and_then(|kind| node.history_mut().take(kind)) {
        Some(extremum) => {
            buf.write8(extremum.rssi);
            // ages truncate to 16 bits, like every duration on the wire
            buf.write16(now.wrapping_sub(extremum.first_time) as u16);
            buf.write16(now.wrapping_sub(extremum.end_time()) as u16);
        }
        None => {
            buf.write8(0);
            buf.write16(0);
            buf.write16(0);
        }
    }
}
