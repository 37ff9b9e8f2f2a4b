//! Common Test Utilities
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
#![allow(dead_code)]

pub mod handlers;

use core::cell::RefCell;
use std::rc::Rc;

use patina_ffa::{error::Result, version::Version};
use patina_mm_ffa::{
    communicator::MmCommunicator,
    config::{CallingConvention, MmCommunicationConfiguration},
};
use patina_stmm::{
    event_loop::PartitionAbi,
    mmi::MmiDispatcher,
    simulation::{init_test_logger, secure_partition, SecurePartition, SharedRegion, SimulatedSpmc, SpmcState},
};

/// Size of the shared communication buffer.
pub const SHARED_BUFFER_SIZE: usize = 0x1000;

/// Both worlds, connected through a simulated partition manager.
pub struct MmTestWorld {
    pub communicator: MmCommunicator,
    pub spmc: Rc<RefCell<SpmcState>>,
}

impl MmTestWorld {
    /// Builds a world whose partition manager reports `ffa_version` and MM v1.0.
    pub fn new(
        convention: CallingConvention,
        ffa_version: Version,
        abi: PartitionAbi,
        dispatcher: MmiDispatcher,
    ) -> Result<Self> {
        Self::with_spmc(convention, abi, dispatcher, |partition| {
            SimulatedSpmc::new(ffa_version, Version::new(1, 0), partition)
        })
    }

    /// Builds a world with a partition manager customized by `build`.
    pub fn with_spmc(
        convention: CallingConvention,
        abi: PartitionAbi,
        dispatcher: MmiDispatcher,
        build: impl FnOnce(SecurePartition) -> SimulatedSpmc,
    ) -> Result<Self> {
        init_test_logger();
        let (region, comm_buffer) = SharedRegion::allocate(SHARED_BUFFER_SIZE);
        let spmc = build(secure_partition(dispatcher, &region, abi)?);
        let state = spmc.state();

        let config = MmCommunicationConfiguration { convention, comm_buffer: Some(comm_buffer) };
        let communicator = MmCommunicator::new(config, Box::new(spmc))?;
        Ok(Self { communicator, spmc: state })
    }

    /// Returns the function IDs issued so far.
    pub fn calls(&self) -> Vec<u64> {
        self.spmc.borrow().calls.clone()
    }
}
