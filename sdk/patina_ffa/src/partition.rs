//! FF-A Partition Information
//!
//! Defines the descriptor returned in the RX buffer by `FFA_PARTITION_INFO_GET`, and the conversion of a UEFI GUID
//! into the four argument words the partition manager expects for a UUID.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use r_efi::efi;
use zerocopy::FromBytes;
use zerocopy_derive::*;

/// Partition information descriptor (FF-A v1.0 layout).
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[repr(C)]
pub struct PartitionInfo {
    /// 16-bit endpoint ID of the partition.
    pub partition_id: u16,
    /// Number of execution contexts implemented by the partition.
    pub execution_context_count: u16,
    /// Partition properties bitmask.
    pub properties: u32,
}

impl PartitionInfo {
    /// Size of a descriptor in the RX buffer.
    pub const SIZE: usize = core::mem::size_of::<Self>();

    /// Reads the first descriptor from the start of `buffer`.
    pub fn read_first(buffer: &[u8]) -> Option<Self> {
        Self::read_from_prefix(buffer).ok().map(|(info, _)| info)
    }
}

/// Rotates the two interior 16-bit fields of a GUID.
///
/// Performs `b' = b + c; c' = b' - c; b'' = b' - c'` with wrapping arithmetic, which exchanges the fields. Returns
/// `(b'', c')`.
pub const fn rotate_interior_fields(b: u16, c: u16) -> (u16, u16) {
    let b = b.wrapping_add(c);
    let c = b.wrapping_sub(c);
    let b = b.wrapping_sub(c);
    (b, c)
}

/// Encodes a GUID as the four 32-bit argument words of a UUID for partition queries.
///
/// The interior fields are rotated, the 16 bytes are read as four little-endian words, and the last two words are
/// byte swapped.
pub fn smccc_uuid_words(guid: &efi::Guid) -> [u32; 4] {
    let (data1, data2, data3, data4_hi, data4_lo, node) = guid.as_fields();
    let (data2, data3) = rotate_interior_fields(data2, data3);

    let mut bytes = [0u8; 16];
    bytes[0..4].copy_from_slice(&data1.to_le_bytes());
    bytes[4..6].copy_from_slice(&data2.to_le_bytes());
    bytes[6..8].copy_from_slice(&data3.to_le_bytes());
    bytes[8] = data4_hi;
    bytes[9] = data4_lo;
    bytes[10..16].copy_from_slice(node);

    let word = |i: usize| u32::from_le_bytes([bytes[i * 4], bytes[i * 4 + 1], bytes[i * 4 + 2], bytes[i * 4 + 3]]);
    [word(0), word(1), word(2).swap_bytes(), word(3).swap_bytes()]
}
