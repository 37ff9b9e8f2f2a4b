//! HEST Table Sink
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use patina_ffa::error::Result;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// The builder of the HEST ACPI table, published under
/// [`HEST_TABLE_PROTOCOL_GUID`](crate::descriptor_info::HEST_TABLE_PROTOCOL_GUID).
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait HestTable {
    /// Appends `count` error source descriptors, stored back to back in `descriptors`, to the table.
    ///
    /// Fails with `InvalidParameter` when `descriptors` is empty.
    fn add_error_source_descriptors(&self, descriptors: &[u8], count: usize) -> Result<()>;
}
