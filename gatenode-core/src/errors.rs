//! Protocol-Boundary Error Taxonomy
//!
//! The signal-processing core has no error path at all: every function is
//! total over its input domain. Errors exist only where host commands enter
//! the node, and they are always absorbed locally — logged, state left
//! unmutated, response left empty — never surfaced as a fault code. The host
//! notices stale or unchanged values instead.
//!
//! Variants are small and `Copy` so handlers can return them from hot paths
//! without allocation.

use thiserror_no_std::Error;

/// Result type for command handling.
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors raised (and absorbed) at the command dispatch boundary.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// Unknown opcode: nothing written back, no state mutated.
    #[error("unrecognized command opcode 0x{opcode:02X}")]
    InvalidCommand {
        /// The opcode byte as received.
        opcode: u8,
    },

    /// Frequency outside the tuner's band; prior value retained.
    #[error("frequency {mhz} MHz outside [{min}, {max}]")]
    FrequencyOutOfRange {
        /// Requested frequency in MHz.
        mhz: u16,
        /// Lower band edge.
        min: u16,
        /// Upper band edge.
        max: u16,
    },

    /// Node-select index beyond the registry; selection ignored.
    #[error("node index {index} out of range (count {count})")]
    NodeIndexOutOfRange {
        /// Requested node index.
        index: u8,
        /// Number of nodes present.
        count: u8,
    },
}

#[cfg(feature = "defmt")]
impl defmt::Format for CommandError {
    fn format(&self, fmt: defmt::Formatter) {
        match self {
            Self::InvalidCommand { opcode } => {
                defmt::write!(fmt, "unrecognized command 0x{:02X}", opcode)
            }
            Self::FrequencyOutOfRange { mhz, min, max } => {
                defmt::write!(fmt, "frequency {} outside [{}, {}]", mhz, min, max)
            }
            Self::NodeIndexOutOfRange { index, count } => {
                defmt::write!(fmt, "node index {} out of range ({})", index, count)
            }
        }
    }
}
