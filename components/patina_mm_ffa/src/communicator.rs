//! Management Mode (MM) Communicator Service
//!
//! Provides the call surface used by normal world components to send a message to a handler in the MM secure
//! partition and receive its reply. Each call validates the caller's message, marshals it into the shared buffer,
//! traps into the secure world (resuming the partition as often as it is preempted), and copies the reply back.
//!
//! ## Logging
//!
//! Detailed logging is available for this component using the `mm_comm` log target.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::boxed::Box;

use core::cell::RefCell;
use core::fmt::{self, Debug};

use patina_ffa::{
    abi::{
        endpoint_pair, MmStatus, ARM_SMC_ID_MM_COMMUNICATE_AARCH64, FFA_INTERRUPT,
        FFA_MSG_SEND_DIRECT_REQ_AARCH64, FFA_MSG_SEND_DIRECT_RESP_AARCH64, FFA_RUN,
    },
    comm_buffer::{AddressConverter, CommBuffer},
    communicate::MmCommunicateHeader,
    error::{EfiError, Result},
    partition::PartitionInfo,
    smc::{SmcArgs, SmcCall},
};

use crate::{
    config::{CallingConvention, MmCommunicationConfiguration},
    directory::{PartitionDirectory, EFI_MM_COMMUNICATION2_PROTOCOL_GUID},
    negotiator,
};

/// The calling convention in effect for a session, with the endpoint details it needs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ActiveConvention {
    /// `MM_COMMUNICATE` SMCs.
    Legacy,
    /// FF-A direct messages from `local_id` to `remote`.
    PartitionAddressed { local_id: u16, remote: PartitionInfo },
}

/// MM Communication Trait
///
/// Provides a mechanism for components to communicate with MM handlers.
pub trait MmCommunication {
    /// Sends a message to a MM handler and receives the reply in place.
    ///
    /// # Parameters
    ///
    /// - `message`: A [`MmCommunicateHeader`] followed by the message data. The header GUID selects the handler and
    ///   the header length gives the size of the data. On success it is overwritten with the reply.
    /// - `comm_size`: Optionally, the size of the caller's buffer. If it is zero or larger than the shared buffer,
    ///   it is updated with the shared buffer's length.
    ///
    /// # Returns
    ///
    /// - `Ok(())`: The reply was copied into `message`.
    /// - `Err(EfiError::BufferTooSmall)`: The message does not fit the shared buffer. Either `comm_size` or the
    ///   header's message length has been updated with the largest size that fits.
    /// - `Err(EfiError::InvalidParameter)`: The message is malformed or `comm_size` is smaller than the message.
    /// - `Err(..)`: The secure partition rejected the request.
    fn communicate(&self, message: &mut [u8], comm_size: Option<&mut usize>) -> Result<()>;
}

/// MM Communicator Service
///
/// Owns the session with the MM secure partition: the negotiated convention, the partition directory (for the
/// partition-addressed convention) and the shared communication buffer.
pub struct MmCommunicator {
    smc: Box<dyn SmcCall>,
    convention: ActiveConvention,
    directory: RefCell<Option<PartitionDirectory>>,
    comm_buffer: RefCell<CommBuffer>,
    comm_buffer_len: usize,
}

impl MmCommunicator {
    /// Brings up a session with the MM secure partition.
    ///
    /// Negotiates the calling convention and, when partition-addressed, discovers the endpoints. Any failure leaves
    /// the transport unusable and is reported as `Unsupported`, or `InvalidParameter` when no shared buffer is
    /// configured.
    pub fn new(config: MmCommunicationConfiguration, smc: Box<dyn SmcCall>) -> Result<Self> {
        log::info!(target: "mm_comm", "MM Communicator entry...");
        log::trace!(target: "mm_comm", "Retrieved MM configuration: {:?}", config);

        let comm_buffer = config.comm_buffer.ok_or_else(|| {
            log::error!(target: "mm_comm", "No shared communication buffer configured.");
            EfiError::InvalidParameter
        })?;

        let (convention, directory) = match negotiator::negotiate(smc.as_ref(), config.convention)? {
            CallingConvention::Legacy => (ActiveConvention::Legacy, None),
            CallingConvention::PartitionAddressed => {
                let directory = PartitionDirectory::discover(smc.as_ref(), &EFI_MM_COMMUNICATION2_PROTOCOL_GUID)?;
                let convention =
                    ActiveConvention::PartitionAddressed { local_id: directory.local_id(), remote: directory.remote() };
                (convention, Some(directory))
            }
        };

        log::info!(
            target: "mm_comm",
            "MM Communicator initialized: {:?}, shared buffer {:#X} ({:#X} bytes)",
            convention,
            comm_buffer.physical_base(),
            comm_buffer.len()
        );

        Ok(Self {
            smc,
            convention,
            directory: RefCell::new(directory),
            comm_buffer_len: comm_buffer.len(),
            comm_buffer: RefCell::new(comm_buffer),
        })
    }

    /// Returns the active calling convention.
    pub fn convention(&self) -> ActiveConvention {
        self.convention
    }

    /// Returns the fixed length of the shared buffer.
    pub fn comm_buffer_len(&self) -> usize {
        self.comm_buffer_len
    }

    /// Returns the largest message data length that fits the shared buffer.
    pub fn max_message_length(&self) -> usize {
        self.comm_buffer_len().saturating_sub(MmCommunicateHeader::SIZE)
    }

    /// Switches the shared buffer to its virtual address.
    ///
    /// Intended to be called from the virtual address change event.
    pub fn on_virtual_address_change(&self, converter: &dyn AddressConverter) {
        match self.comm_buffer.try_borrow_mut() {
            Ok(mut buffer) => buffer.convert_to_virtual(converter),
            Err(_) => log::error!(target: "mm_comm", "Shared buffer is busy during virtual address change."),
        }
    }

    /// Releases the FF-A RX/TX pair registered during discovery.
    ///
    /// Intended to be called from the exit boot services event. Has no effect for the legacy convention or after
    /// the first call.
    pub fn on_exit_boot_services(&self) {
        if let Some(directory) = self.directory.borrow_mut().as_mut() {
            log::info!(target: "mm_comm", "Releasing FF-A RX/TX buffers.");
            directory.unmap(self.smc.as_ref());
        }
    }

    /// Returns whether discovery buffers are still registered with the partition manager.
    pub fn rxtx_mapped(&self) -> bool {
        self.directory.borrow().as_ref().is_some_and(|directory| directory.is_mapped())
    }

    fn request_args(&self, buffer_address: u64) -> SmcArgs {
        match self.convention {
            ActiveConvention::Legacy => {
                let mut args = SmcArgs::new(ARM_SMC_ID_MM_COMMUNICATE_AARCH64);
                args.arg2 = buffer_address;
                args
            }
            ActiveConvention::PartitionAddressed { local_id, remote } => {
                let mut args = SmcArgs::new(FFA_MSG_SEND_DIRECT_REQ_AARCH64);
                args.arg1 = endpoint_pair(local_id, remote.partition_id);
                args.arg3 = buffer_address;
                args
            }
        }
    }

    /// Issues `args` and resumes the partition until it stops reporting an interrupt.
    fn call_remote(&self, args: SmcArgs) -> SmcArgs {
        let mut ret = self.smc.call(args);
        if let ActiveConvention::PartitionAddressed { remote, .. } = self.convention {
            while ret.arg0 == FFA_INTERRUPT {
                log::debug!(target: "mm_comm", "MM partition preempted, resuming.");
                let mut run = SmcArgs::new(FFA_RUN);
                run.arg1 = endpoint_pair(remote.partition_id, 0);
                ret = self.smc.call(run);
            }
        }
        ret
    }

    fn is_success(&self, ret: &SmcArgs) -> bool {
        match self.convention {
            ActiveConvention::Legacy => MmStatus::from_register(ret.arg0) == Some(MmStatus::Success),
            ActiveConvention::PartitionAddressed { .. } => ret.arg0 == FFA_MSG_SEND_DIRECT_RESP_AARCH64,
        }
    }

    /// Returns the register carrying the status of a failed call.
    fn failure_status(&self, ret: &SmcArgs) -> u64 {
        match self.convention {
            ActiveConvention::Legacy => ret.arg0,
            ActiveConvention::PartitionAddressed { .. } => ret.arg2,
        }
    }

    /// Translates a failed call. Both conventions report failures with the legacy MM return codes.
    fn translate_failure(&self, ret: &SmcArgs) -> EfiError {
        let status = self.failure_status(ret);
        match MmStatus::from_register(status) {
            Some(MmStatus::InvalidParams) => EfiError::InvalidParameter,
            Some(MmStatus::Denied) => EfiError::AccessDenied,
            Some(MmStatus::NotSupported) => EfiError::Unsupported,
            Some(MmStatus::NoMemory) => {
                debug_assert!(false, "MM partition out of memory for a request that passed local checks");
                EfiError::OutOfResources
            }
            _ => {
                debug_assert!(false, "Unexpected MM status {:#X}", status);
                EfiError::AccessDenied
            }
        }
    }
}

impl Debug for MmCommunicator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "MM Communicator:")?;
        writeln!(f, "Convention: {:?}", self.convention)?;
        writeln!(f, "Directory: {:?}", self.directory.borrow())?;
        writeln!(f, "Comm Buffer: {:?}", self.comm_buffer.borrow())?;
        Ok(())
    }
}

impl MmCommunication for MmCommunicator {
    fn communicate(&self, message: &mut [u8], comm_size: Option<&mut usize>) -> Result<()> {
        let mut header = MmCommunicateHeader::read(message).map_err(|err| {
            log::warn!(target: "mm_comm", "Message of {} bytes cannot hold a communicate header.", message.len());
            err
        })?;

        let buffer_len = self.comm_buffer_len();
        let buffer_size = header.total_size();
        log::debug!(
            target: "mm_comm",
            "Starting MM communication: recipient={:?}, message_length={:#X}",
            header.guid(),
            header.message_length()
        );

        if let Some(comm_size) = comm_size {
            log::trace!(
                target: "mm_comm",
                "Buffer validation: comm_size={:#X}, buffer_len={:#X}",
                *comm_size,
                buffer_len
            );
            if *comm_size == 0 || *comm_size > buffer_len {
                log::warn!(
                    target: "mm_comm",
                    "Invalid comm size {:#X}, shared buffer holds {:#X}.",
                    *comm_size,
                    buffer_len
                );
                *comm_size = buffer_len;
                return Err(EfiError::BufferTooSmall);
            }
            if *comm_size < buffer_size {
                log::warn!(target: "mm_comm", "Comm size {:#X} smaller than message {:#X}.", *comm_size, buffer_size);
                return Err(EfiError::InvalidParameter);
            }
        }

        if header.message_length() == 0 || buffer_size > buffer_len {
            log::warn!(
                target: "mm_comm",
                "Message of {:#X} bytes does not fit shared buffer of {:#X}.",
                buffer_size,
                buffer_len
            );
            header.set_message_length(self.max_message_length() as u64);
            header.write(message)?;
            return Err(EfiError::BufferTooSmall);
        }

        if message.len() < buffer_size {
            log::warn!(
                target: "mm_comm",
                "Message slice of {:#X} bytes shorter than declared {:#X}.",
                message.len(),
                buffer_size
            );
            return Err(EfiError::InvalidParameter);
        }

        let mut comm_buffer = self.comm_buffer.try_borrow_mut().map_err(|_| {
            log::error!(target: "mm_comm", "Re-entrant MM communication rejected.");
            EfiError::AccessDenied
        })?;

        comm_buffer.as_slice_mut()[..buffer_size].copy_from_slice(&message[..buffer_size]);
        log::debug!(
            target: "mm_comm",
            "Request Data (hex): {:02X?}",
            &message[MmCommunicateHeader::SIZE..core::cmp::min(buffer_size, MmCommunicateHeader::SIZE + 64)]
        );

        let args = self.request_args(comm_buffer.physical_base());
        log::debug!(target: "mm_comm", "Executing MM communication: {:?}", args);
        let ret = self.call_remote(args);

        if !self.is_success(&ret) {
            let err = self.translate_failure(&ret);
            log::error!(target: "mm_comm", "MM communication failed: {:?} -> {:?}", ret, err);
            return Err(err);
        }

        message[..buffer_size].fill(0);
        let reply = MmCommunicateHeader::read(comm_buffer.as_slice())?;
        let reply_size = reply.total_size();
        if reply_size > comm_buffer.len() {
            log::error!(target: "mm_comm", "Reply of {:#X} bytes overruns shared buffer.", reply_size);
            return Err(EfiError::Aborted);
        }
        if reply_size > message.len() {
            log::warn!(
                target: "mm_comm",
                "Reply of {:#X} bytes does not fit caller buffer of {:#X}.",
                reply_size,
                message.len()
            );
            reply.write(message)?;
            return Err(EfiError::BufferTooSmall);
        }

        message[..reply_size].copy_from_slice(&comm_buffer.as_slice()[..reply_size]);
        log::debug!(target: "mm_comm", "MM communication response received: size={:#X}", reply_size);
        Ok(())
    }
}
