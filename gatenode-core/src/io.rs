//! Fixed-Size Response Buffer and Big-Endian Field Codec
//!
//! Read responses are built field by field into an [`IoBuffer`] — a fixed
//! array with a write size and a read cursor, never heap-backed — and sealed
//! with a trailing additive (mod-256) checksum over all preceding bytes.
//! Multi-byte fields are big-endian on the wire.
//!
//! All operations are total: writes past capacity are dropped and reads past
//! the written size return zero, so a malformed payload can skew a value but
//! can never fault the handler.

/// Capacity of a command/response buffer in bytes.
///
/// The largest response (combined lap stats) is well under this.
pub const IO_BUFFER_SIZE: usize = 32;

/// Bounded byte buffer with independent write size and read cursor.
#[derive(Debug, Clone)]
pub struct IoBuffer {
    data: [u8; IO_BUFFER_SIZE],
    size: usize,
    index: usize,
}

impl IoBuffer {
    /// Create an empty buffer.
    pub const fn new() -> Self {
        Self {
            data: [0; IO_BUFFER_SIZE],
            size: 0,
            index: 0,
        }
    }

    /// Create a buffer pre-loaded with a command payload, cursor at zero.
    pub fn from_payload(payload: &[u8]) -> Self {
        let mut buf = Self::new();
        let n = payload.len().min(IO_BUFFER_SIZE);
        buf.data[..n].copy_from_slice(&payload[..n]);
        buf.size = n;
        buf
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.size
    }

    /// True if nothing has been written.
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// The written bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data[..self.size]
    }

    /// Reset both size and cursor.
    pub fn clear(&mut self) {
        self.size = 0;
        self.index = 0;
    }

    /// Append one byte.
    pub fn write8(&mut self, value: u8) {
        if self.size < IO_BUFFER_SIZE {
            self.data[self.size] = value;
            self.size += 1;
        }
    }

    /// Append a 16-bit value, big-endian.
    pub fn write16(&mut self, value: u16) {
        self.write8((value >> 8) as u8);
        self.write8(value as u8);
    }

    /// Append a 32-bit value, big-endian.
    pub fn write32(&mut self, value: u32) {
        self.write8((value >> 24) as u8);
        self.write8((value >> 16) as u8);
        self.write8((value >> 8) as u8);
        self.write8(value as u8);
    }

    /// Read one byte at the cursor; zero once past the written size.
    pub fn read8(&mut self) -> u8 {
        let value = if self.index < self.size {
            self.data[self.index]
        } else {
            0
        };
        self.index += 1;
        value
    }

    /// Read a big-endian 16-bit value at the cursor.
    pub fn read16(&mut self) -> u16 {
        let hi = self.read8() as u16;
        (hi << 8) | self.read8() as u16
    }

    /// Read a big-endian 32-bit value at the cursor.
    pub fn read32(&mut self) -> u32 {
        let hi = self.read16() as u32;
        (hi << 16) | self.read16() as u32
    }

    /// Append the additive checksum of everything written so far.
    pub fn write_checksum(&mut self) {
        let checksum = calculate_checksum(self.as_bytes());
        self.write8(checksum);
    }
}

impl Default for IoBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Additive mod-256 checksum over `bytes`.
pub fn calculate_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fields_are_big_endian() {
        let mut buf = IoBuffer::new();
        buf.write16(0x1234);
        buf.write32(0xDEADBEEF);
        assert_eq!(buf.as_bytes(), &[0x12, 0x34, 0xDE, 0xAD, 0xBE, 0xEF]);

        let mut rd = IoBuffer::from_payload(buf.as_bytes());
        assert_eq!(rd.read16(), 0x1234);
        assert_eq!(rd.read32(), 0xDEADBEEF);
    }

    #[test]
    fn checksum_is_additive_mod_256() {
        let mut buf = IoBuffer::new();
        buf.write8(0xFF);
        buf.write8(0x02);
        buf.write_checksum();
        assert_eq!(buf.as_bytes(), &[0xFF, 0x02, 0x01]);

        let bytes = buf.as_bytes();
        let (payload, check) = bytes.split_at(bytes.len() - 1);
        assert_eq!(calculate_checksum(payload), check[0]);
    }

    #[test]
    fn overrun_reads_return_zero() {
        let mut buf = IoBuffer::from_payload(&[0xAB]);
        assert_eq!(buf.read8(), 0xAB);
        assert_eq!(buf.read8(), 0);
        assert_eq!(buf.read16(), 0);
    }

    #[test]
    fn overrun_writes_are_dropped() {
        let mut buf = IoBuffer::new();
        for i in 0..IO_BUFFER_SIZE + 4 {
            buf.write8(i as u8);
        }
        assert_eq!(buf.len(), IO_BUFFER_SIZE);
    }
}
