//! MM Communication Configuration
//!
//! Defines the platform choices needed to bring up a session with the secure partition: which calling convention
//! to request and where the shared communication buffer lives.
//!
//! ## MM Configuration Usage
//!
//! The configuration is expected to be populated by the platform before the communicator is created. The shared
//! buffer is usually a fixed physical range reserved by the platform memory map, and is described with
//! [`CommBuffer::from_raw_parts`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::fmt;

use patina_ffa::comm_buffer::CommBuffer;

/// The calling convention used to reach the secure partition.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CallingConvention {
    /// A single `MM_COMMUNICATE` SMC carrying the shared buffer address.
    Legacy,
    /// FF-A direct messages addressed from the local endpoint to the MM partition.
    PartitionAddressed,
}

/// MM Communication Configuration
pub struct MmCommunicationConfiguration {
    /// The convention requested by the platform. Negotiation may fall back to [`CallingConvention::Legacy`].
    pub convention: CallingConvention,
    /// The buffer shared with the secure partition.
    pub comm_buffer: Option<CommBuffer>,
}

impl Default for MmCommunicationConfiguration {
    fn default() -> Self {
        MmCommunicationConfiguration { convention: CallingConvention::PartitionAddressed, comm_buffer: None }
    }
}

impl fmt::Debug for MmCommunicationConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MmCommunicationConfiguration")
            .field("convention", &self.convention)
            .field("comm_buffer_base", &self.comm_buffer.as_ref().map(|buffer| buffer.physical_base()))
            .field("comm_buffer_len", &self.comm_buffer.as_ref().map(|buffer| buffer.len()))
            .finish()
    }
}
