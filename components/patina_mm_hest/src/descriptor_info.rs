//! HEST Error Source Descriptor Info
//!
//! The reply of the error source MMI handler starts with the number of error source descriptors and their total
//! length, followed by the descriptors themselves back to back.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_ffa::error::{EfiError, Result};
use r_efi::efi;
use zerocopy::{FromBytes, IntoBytes};
use zerocopy_derive::*;

/// The MMI handler GUID of the error source aggregator.
pub const MM_HEST_GET_ERROR_SOURCE_INFO_GUID: efi::Guid =
    efi::Guid::from_fields(0x7d602951, 0x678e, 0x4cc4, 0x98, 0xd9, &[0xe3, 0x76, 0x04, 0xf6, 0x93, 0x0d]);

/// Published by MM drivers that provide error source descriptors.
pub const MM_HEST_ERROR_SOURCE_DESC_PROTOCOL_GUID: efi::Guid =
    efi::Guid::from_fields(0x560bf236, 0xa4a8, 0x4d69, 0xbc, 0xf6, &[0xc2, 0x97, 0x24, 0x10, 0x9d, 0x91]);

/// The normal world HEST table builder.
pub const HEST_TABLE_PROTOCOL_GUID: efi::Guid =
    efi::Guid::from_fields(0x705bdcd9, 0x8c47, 0x457e, 0xad, 0x0d, &[0xf7, 0x86, 0xf3, 0x4a, 0x0d, 0x63]);

/// Count and total length of the descriptors following it.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct ErrorSourceDescInfo {
    count: u64,
    length: u64,
}

impl ErrorSourceDescInfo {
    /// Size of the info header in bytes.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Creates a header announcing `count` descriptors taking `length` bytes.
    pub fn new(count: usize, length: usize) -> Self {
        Self { count: count as u64, length: length as u64 }
    }

    /// Number of descriptors.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Total length of the descriptors in bytes.
    pub fn length(&self) -> u64 {
        self.length
    }

    /// Reads the info header from the start of `buffer`.
    pub fn read(buffer: &[u8]) -> Result<Self> {
        Self::read_from_prefix(buffer).map(|(info, _)| info).map_err(|_| EfiError::InvalidParameter)
    }

    /// Writes the info header to the start of `buffer`.
    pub fn write(&self, buffer: &mut [u8]) -> Result<()> {
        self.write_to_prefix(buffer).map_err(|_| EfiError::BufferTooSmall)
    }
}
