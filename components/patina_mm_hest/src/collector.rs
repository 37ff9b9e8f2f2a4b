//! HEST Error Source Collector
//!
//! Retrieves the error source descriptors published in Standalone MM from the normal world. The first request
//! carries room for the info header only, and learns the size of the full reply from it. The second request is
//! sized to hold every descriptor.
//!
//! ## Logging
//!
//! The `hest` log target is used for request results.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::{vec, vec::Vec};

use patina_ffa::{
    communicate::MmCommunicateHeader,
    error::{EfiError, Result},
};
use patina_mm_ffa::communicator::MmCommunication;

use crate::{
    descriptor_info::{ErrorSourceDescInfo, MM_HEST_GET_ERROR_SOURCE_INFO_GUID},
    table::HestTable,
};

/// Error source descriptors collected from Standalone MM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorSourceDescriptors {
    /// Number of descriptors.
    pub count: usize,
    /// The descriptors, back to back.
    pub descriptors: Vec<u8>,
}

/// Collects error source descriptors over MM communication.
pub struct HestErrorSourceCollector<'a> {
    mm_comm: &'a dyn MmCommunication,
}

impl<'a> HestErrorSourceCollector<'a> {
    /// Creates a collector sending its requests through `mm_comm`.
    pub fn new(mm_comm: &'a dyn MmCommunication) -> Self {
        Self { mm_comm }
    }

    /// Retrieves every error source descriptor published in Standalone MM.
    ///
    /// Fails with `NotFound` when none are published, or with the communication error of either request.
    pub fn collect_all(&self) -> Result<ErrorSourceDescriptors> {
        let mut message = Self::request(0)?;
        match self.mm_comm.communicate(&mut message, None) {
            Ok(()) | Err(EfiError::BufferTooSmall) => {}
            Err(err) => {
                log::error!(target: "hest", "Error source size request failed: {:?}", err);
                return Err(err);
            }
        }

        let info = ErrorSourceDescInfo::read(&message[MmCommunicateHeader::SIZE..])?;
        if info.count() == 0 || info.length() == 0 {
            log::info!(target: "hest", "No HEST error sources published in MM.");
            return Err(EfiError::NotFound);
        }

        let length = usize::try_from(info.length()).map_err(|_| EfiError::OutOfResources)?;
        let mut message = Self::request(length)?;
        self.mm_comm.communicate(&mut message, None).inspect_err(|err| {
            log::error!(target: "hest", "Error source descriptor request failed: {:?}", err);
        })?;

        let payload = &message[MmCommunicateHeader::SIZE..];
        let info = ErrorSourceDescInfo::read(payload)?;
        let descriptors = &payload[ErrorSourceDescInfo::SIZE..];
        let length = usize::try_from(info.length())
            .ok()
            .filter(|length| *length <= descriptors.len())
            .ok_or_else(|| {
                log::error!(
                    target: "hest",
                    "Reply declares {:#X} bytes of descriptors, {:#X} were returned.",
                    info.length(),
                    descriptors.len()
                );
                EfiError::BadBufferSize
            })?;
        let count = usize::try_from(info.count()).map_err(|_| EfiError::BadBufferSize)?;
        if count == 0 || length == 0 {
            return Err(EfiError::NotFound);
        }

        log::info!(target: "hest", "Error sources: count {}, length {:#X}.", count, length);
        Ok(ErrorSourceDescriptors { count, descriptors: descriptors[..length].to_vec() })
    }

    /// Builds a request with room for the info header and `length` bytes of descriptors.
    fn request(length: usize) -> Result<Vec<u8>> {
        let body = ErrorSourceDescInfo::SIZE.checked_add(length).ok_or(EfiError::OutOfResources)?;
        let total = MmCommunicateHeader::SIZE.checked_add(body).ok_or(EfiError::OutOfResources)?;

        let mut message = vec![0u8; total];
        MmCommunicateHeader::new(&MM_HEST_GET_ERROR_SOURCE_INFO_GUID, body as u64).write(&mut message)?;
        Ok(message)
    }
}

/// Collects the error source descriptors published in Standalone MM and appends them to `table`.
pub fn append_mm_error_sources(mm_comm: &dyn MmCommunication, table: &dyn HestTable) -> Result<()> {
    let sources = HestErrorSourceCollector::new(mm_comm).collect_all()?;
    table.add_error_source_descriptors(&sources.descriptors, sources.count).inspect_err(|err| {
        log::error!(target: "hest", "Failed to append error sources to HEST: {:?}", err);
    })
}
