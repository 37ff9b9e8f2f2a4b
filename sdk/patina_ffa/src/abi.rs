//! FF-A and Legacy MM ABI Definitions
//!
//! Function identifiers are placed in the first argument register of a call. Returned identifiers use the same
//! numbering space, so the first result register of a call is compared against these values as well.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// FF-A error return. The error code is carried in the third register.
pub const FFA_ERROR: u64 = 0x8400_0060;
/// FF-A success return (SMC32).
pub const FFA_SUCCESS_AARCH32: u64 = 0x8400_0061;
/// FF-A success return (SMC64).
pub const FFA_SUCCESS_AARCH64: u64 = 0xC400_0061;
/// The callee was preempted by an interrupt and must be resumed with [`FFA_RUN`].
pub const FFA_INTERRUPT: u64 = 0x8400_0062;
/// Version exchange.
pub const FFA_VERSION: u64 = 0x8400_0063;
/// Returns ownership of the RX buffer to the producer.
pub const FFA_RX_RELEASE: u64 = 0x8400_0065;
/// Registers the caller's TX/RX buffer pair (SMC64).
pub const FFA_RXTX_MAP_AARCH64: u64 = 0xC400_0066;
/// Unregisters the caller's TX/RX buffer pair.
pub const FFA_RXTX_UNMAP: u64 = 0x8400_0067;
/// Queries partition information for a UUID.
pub const FFA_PARTITION_INFO_GET: u64 = 0x8400_0068;
/// Returns the caller's endpoint ID.
pub const FFA_ID_GET: u64 = 0x8400_0069;
/// Blocks a partition until a message is available.
pub const FFA_MSG_WAIT: u64 = 0x8400_006B;
/// Resumes execution of a preempted endpoint vCPU.
pub const FFA_RUN: u64 = 0x8400_006D;
/// Direct message request (SMC64).
pub const FFA_MSG_SEND_DIRECT_REQ_AARCH64: u64 = 0xC400_006F;
/// Direct message response (SMC64).
pub const FFA_MSG_SEND_DIRECT_RESP_AARCH64: u64 = 0xC400_0070;
/// Console output from a partition (SMC64). Carries up to [`FFA_CONSOLE_LOG_MAX_BYTES`] characters.
pub const FFA_CONSOLE_LOG_AARCH64: u64 = 0xC400_008A;
/// Characters carried by a single `FFA_CONSOLE_LOG_AARCH64` call, packed into registers 2 through 7.
pub const FFA_CONSOLE_LOG_MAX_BYTES: usize = 48;

/// Legacy MM interface version query (SMC32).
pub const ARM_SMC_ID_MM_VERSION_AARCH32: u64 = 0x8400_0040;
/// Legacy MM communicate (SMC64).
pub const ARM_SMC_ID_MM_COMMUNICATE_AARCH64: u64 = 0xC400_0041;
/// Legacy SPM interface version query issued from inside the secure partition (SVC32).
pub const ARM_SVC_ID_SPM_VERSION_AARCH32: u64 = 0x8400_0060;
/// Completion of a delegated event, issued from inside the secure partition (SVC64).
pub const ARM_SVC_ID_SP_EVENT_COMPLETE_AARCH64: u64 = 0xC400_0061;

/// Size of a single RX/TX buffer page.
pub const FFA_PAGE_SIZE: usize = 0x1000;

/// Number of pages registered for each of the RX and TX buffers.
pub const FFA_RXTX_PAGE_COUNT: u64 = 1;

/// Builds the `(sender << 16) | receiver` endpoint word used by direct messages.
pub const fn endpoint_pair(sender: u16, receiver: u16) -> u64 {
    ((sender as u64) << 16) | receiver as u64
}

/// Status codes returned in the third register alongside [`FFA_ERROR`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i32)]
pub enum FfaStatus {
    NotSupported = -1,
    InvalidParameters = -2,
    NoMemory = -3,
    Busy = -4,
    Interrupted = -5,
    Denied = -6,
    Retry = -7,
    Aborted = -8,
}

impl FfaStatus {
    /// Interprets the low 32 bits of a register as an FF-A status code.
    pub fn from_register(value: u64) -> Option<Self> {
        match value as u32 as i32 {
            -1 => Some(Self::NotSupported),
            -2 => Some(Self::InvalidParameters),
            -3 => Some(Self::NoMemory),
            -4 => Some(Self::Busy),
            -5 => Some(Self::Interrupted),
            -6 => Some(Self::Denied),
            -7 => Some(Self::Retry),
            -8 => Some(Self::Aborted),
            _ => None,
        }
    }
}

/// Return codes of the legacy MM (SPM) interface.
///
/// Used both for `MM_COMMUNICATE` results seen by the normal world and for the status a secure partition reports
/// when it completes a delegated event.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(i32)]
pub enum MmStatus {
    Success = 0,
    NotSupported = -1,
    InvalidParams = -2,
    Denied = -3,
    NoMemory = -5,
}

impl MmStatus {
    /// Interprets a whole register as a sign-extended legacy MM return code.
    pub fn from_register(value: u64) -> Option<Self> {
        match value as i64 {
            0 => Some(Self::Success),
            -1 => Some(Self::NotSupported),
            -2 => Some(Self::InvalidParams),
            -3 => Some(Self::Denied),
            -5 => Some(Self::NoMemory),
            _ => None,
        }
    }

    /// Returns the code sign-extended into a register value.
    pub const fn as_register(self) -> u64 {
        self as i32 as i64 as u64
    }
}
