//! MM Communicate Header
//!
//! Every message exchanged with the secure partition begins with this header. The GUID identifies the handler the
//! message is for and the length gives the size of the data that follows.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;
use zerocopy::{FromBytes, IntoBytes};
use zerocopy_derive::*;

use crate::error::{EfiError, Result};

/// UEFI MM Communicate Header
///
/// ## Notes
///
/// - The length field is 64 bits wide regardless of the caller's pointer width, matching the AArch64 layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct MmCommunicateHeader {
    header_guid: [u8; 16],
    message_length: u64,
}

impl MmCommunicateHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Creates a header for a message of `message_length` bytes addressed to `recipient`.
    pub fn new(recipient: &efi::Guid, message_length: u64) -> Self {
        Self { header_guid: *recipient.as_bytes(), message_length }
    }

    /// Returns the recipient GUID.
    pub fn guid(&self) -> efi::Guid {
        efi::Guid::from_bytes(&self.header_guid)
    }

    /// Returns the declared message length in bytes, excluding the header.
    pub fn message_length(&self) -> u64 {
        self.message_length
    }

    /// Updates the declared message length.
    pub fn set_message_length(&mut self, message_length: u64) {
        self.message_length = message_length;
    }

    /// Returns the header size plus the declared message length, saturating on overflow.
    pub fn total_size(&self) -> usize {
        usize::try_from(self.message_length).map_or(usize::MAX, |len| Self::SIZE.saturating_add(len))
    }

    /// Reads a header from the start of `buffer`.
    pub fn read(buffer: &[u8]) -> Result<Self> {
        Self::read_from_prefix(buffer).map(|(header, _)| header).map_err(|_| EfiError::InvalidParameter)
    }

    /// Writes the header to the start of `buffer`.
    pub fn write(&self, buffer: &mut [u8]) -> Result<()> {
        self.write_to_prefix(buffer).map_err(|_| EfiError::BufferTooSmall)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_RECIPIENT: efi::Guid =
        efi::Guid::from_fields(0x12345678, 0x1234, 0x5678, 0x12, 0x34, &[0x56, 0x78, 0x90, 0xab, 0xcd, 0xef]);

    #[test]
    fn test_header_layout() {
        assert_eq!(MmCommunicateHeader::SIZE, 24);
        let header = MmCommunicateHeader::new(&TEST_RECIPIENT, 0x1122);
        let bytes = header.as_bytes();
        assert_eq!(&bytes[..16], TEST_RECIPIENT.as_bytes());
        assert_eq!(&bytes[16..], &0x1122u64.to_le_bytes());
    }

    #[test]
    fn test_read_and_write_through_buffer() {
        let mut buffer = [0u8; 32];
        let header = MmCommunicateHeader::new(&TEST_RECIPIENT, 8);
        header.write(&mut buffer).unwrap();

        let parsed = MmCommunicateHeader::read(&buffer).unwrap();
        assert_eq!(parsed.guid(), TEST_RECIPIENT);
        assert_eq!(parsed.message_length(), 8);
        assert_eq!(parsed.total_size(), 32);
    }

    #[test]
    fn test_short_buffers_are_rejected() {
        let mut buffer = [0u8; 16];
        assert_eq!(MmCommunicateHeader::read(&buffer), Err(EfiError::InvalidParameter));
        assert_eq!(MmCommunicateHeader::new(&TEST_RECIPIENT, 0).write(&mut buffer), Err(EfiError::BufferTooSmall));
    }

    #[test]
    fn test_total_size_saturates() {
        let header = MmCommunicateHeader::new(&TEST_RECIPIENT, u64::MAX);
        assert_eq!(header.total_size(), usize::MAX);
    }
}
