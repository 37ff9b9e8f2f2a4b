//! Delegated Event Loop
//!
//! After initialization the secure partition never returns. It completes its entry with a call to the partition
//! manager and receives the next delegated event as that call's result, so every completion doubles as the wait for
//! the next request.
//!
//! The ABI spoken with the partition manager is fixed when the partition starts:
//!
//! - **FF-A**: Events arrive as direct requests carrying the shared buffer address in register 3 and complete with
//!   a direct response. A manager implementing FF-A v1.1 or later expects the partition to enter its wait loop
//!   with `FFA_MSG_WAIT`; a v1.0 manager expects the initialization status in a direct response.
//! - **SPM**: The legacy interface. Events carry the buffer address in register 1 and complete with
//!   `SP_EVENT_COMPLETE`.
//!
//! ## Logging
//!
//! The `stmm` log target is used for compatibility results and rejected events.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
use core::cell::RefCell;

use patina_ffa::{
    abi::{
        ARM_SVC_ID_SP_EVENT_COMPLETE_AARCH64, ARM_SVC_ID_SPM_VERSION_AARCH32, FFA_MSG_SEND_DIRECT_RESP_AARCH64,
        FFA_MSG_WAIT, FFA_VERSION, MmStatus,
    },
    comm_buffer::CommBuffer,
    error::{EfiError, Result},
    smc::{SmcArgs, SmcCall},
    version::Version,
};

use crate::mmi::MmiDispatcher;

/// The FF-A version the partition is built against.
pub const FFA_PARTITION_VERSION: Version = Version::new(1, 1);

/// The oldest legacy SPM interface the partition can run under.
pub const SPM_REQUIRED_VERSION: Version = Version::new(0, 1);

/// Initialization status reported for a missing resource. There is no legacy MM code for it.
const INIT_STATUS_NOT_FOUND: i64 = -7;

/// The ABI spoken with the partition manager.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PartitionAbi {
    /// FF-A direct messages. `use_only_ffa` is set when the manager implements FF-A v1.1 or later.
    Ffa { use_only_ffa: bool },
    /// The legacy SPM interface.
    Spm,
}

/// Checks that the partition manager speaks an ABI the partition was built for.
///
/// `ffa_enabled` selects which of the two interfaces is queried. Either query answered with the "not supported"
/// word, or with an incompatible version, fails with `Unsupported`.
pub fn check_compatibility(svc: &dyn SmcCall, ffa_enabled: bool) -> Result<PartitionAbi> {
    if ffa_enabled {
        let mut args = SmcArgs::new(FFA_VERSION);
        args.arg1 = FFA_PARTITION_VERSION.pack() as u64;
        let result = svc.call(args);

        let Some(version) = Version::from_register(result.arg0) else {
            log::error!(target: "stmm", "Partition manager does not implement FF-A.");
            return Err(EfiError::Unsupported);
        };
        if version.major != FFA_PARTITION_VERSION.major {
            log::error!(
                target: "stmm",
                "Incompatible FF-A version {:?}, built for {:?}.",
                version,
                FFA_PARTITION_VERSION
            );
            return Err(EfiError::Unsupported);
        }

        let use_only_ffa = version.minor >= FFA_PARTITION_VERSION.minor;
        log::info!(target: "stmm", "Partition manager FF-A version {:?}, FF-A only: {}.", version, use_only_ffa);
        Ok(PartitionAbi::Ffa { use_only_ffa })
    } else {
        let result = svc.call(SmcArgs::new(ARM_SVC_ID_SPM_VERSION_AARCH32));
        match Version::from_register(result.arg0) {
            Some(version) if version.satisfies(SPM_REQUIRED_VERSION) => {
                log::info!(target: "stmm", "Partition manager SPM version {:?}.", version);
                Ok(PartitionAbi::Spm)
            }
            version => {
                log::error!(
                    target: "stmm",
                    "Incompatible SPM version {:?}, requires {:?}.",
                    version,
                    SPM_REQUIRED_VERSION
                );
                Err(EfiError::Unsupported)
            }
        }
    }
}

/// Translates the outcome of a delegated event into the code returned to the partition manager.
pub fn spm_status(result: Result<()>) -> MmStatus {
    match result {
        Ok(()) => MmStatus::Success,
        Err(EfiError::InvalidParameter) => MmStatus::InvalidParams,
        Err(EfiError::AccessDenied) => MmStatus::Denied,
        Err(EfiError::OutOfResources) => MmStatus::NoMemory,
        Err(_) => MmStatus::NotSupported,
    }
}

/// Translates the outcome of partition initialization into the code reported with the first completion.
pub fn init_status(result: Result<()>) -> i64 {
    match result {
        Err(EfiError::Unsupported) => MmStatus::NotSupported as i64,
        Err(EfiError::InvalidParameter) => MmStatus::InvalidParams as i64,
        Err(EfiError::NotFound) => INIT_STATUS_NOT_FOUND,
        _ => MmStatus::Success as i64,
    }
}

/// Delegated Event Loop
///
/// Owns the shared communication buffer for the lifetime of the partition and routes every event that names it to
/// the [`MmiDispatcher`].
pub struct DelegatedEventLoop<'a> {
    svc: &'a dyn SmcCall,
    dispatcher: &'a MmiDispatcher,
    comm_buffer: RefCell<CommBuffer>,
    abi: PartitionAbi,
}

impl<'a> DelegatedEventLoop<'a> {
    /// Creates an event loop speaking `abi` over `svc`.
    pub fn new(
        svc: &'a dyn SmcCall,
        dispatcher: &'a MmiDispatcher,
        comm_buffer: CommBuffer,
        abi: PartitionAbi,
    ) -> Self {
        Self { svc, dispatcher, comm_buffer: RefCell::new(comm_buffer), abi }
    }

    /// Returns the ABI the loop speaks.
    pub fn abi(&self) -> PartitionAbi {
        self.abi
    }

    /// Builds the call that completes partition initialization.
    pub fn initial_completion(&self, init: Result<()>) -> SmcArgs {
        match self.abi {
            PartitionAbi::Ffa { use_only_ffa: true } => SmcArgs::new(FFA_MSG_WAIT),
            _ => self.completion(init_status(init) as u64),
        }
    }

    /// Handles one delegated event and builds the call that completes it.
    pub fn handle_event(&self, event: &SmcArgs) -> SmcArgs {
        let status = spm_status(self.process(event));
        self.completion(status.as_register())
    }

    /// Completes the previous event with `completion` and handles the event returned by the partition manager.
    ///
    /// Returns the completion for that event.
    pub fn step(&self, completion: SmcArgs) -> SmcArgs {
        let event = self.svc.call(completion);
        self.handle_event(&event)
    }

    /// Completes initialization with `init` and serves events forever.
    #[cfg(not(tarpaulin_include))]
    pub fn run(&self, init: Result<()>) -> ! {
        let mut completion = self.initial_completion(init);
        loop {
            completion = self.step(completion);
        }
    }

    fn process(&self, event: &SmcArgs) -> Result<()> {
        let address = match self.abi {
            PartitionAbi::Ffa { .. } => event.arg3,
            PartitionAbi::Spm => event.arg1,
        };

        let mut comm_buffer = self.comm_buffer.try_borrow_mut().map_err(|_| EfiError::AccessDenied)?;
        if address != comm_buffer.physical_base() {
            log::error!(
                target: "stmm",
                "Event names buffer {:#X}, shared buffer is at {:#X}.",
                address,
                comm_buffer.physical_base()
            );
            return Err(EfiError::AccessDenied);
        }

        self.dispatcher.dispatch(comm_buffer.as_slice_mut()).inspect_err(|err| {
            log::warn!(target: "stmm", "MMI dispatch failed: {:?}", err);
        })
    }

    fn completion(&self, status: u64) -> SmcArgs {
        match self.abi {
            PartitionAbi::Ffa { .. } => {
                let mut args = SmcArgs::new(FFA_MSG_SEND_DIRECT_RESP_AARCH64);
                args.arg3 = ARM_SVC_ID_SP_EVENT_COMPLETE_AARCH64;
                args.arg4 = status;
                args
            }
            PartitionAbi::Spm => {
                let mut args = SmcArgs::new(ARM_SVC_ID_SP_EVENT_COMPLETE_AARCH64);
                args.arg1 = status;
                args
            }
        }
    }
}
