//! Error type for secure partition communication.
//!
//! Errors are expressed as the UEFI status codes the surrounding firmware expects so a failure can cross into a
//! protocol interface without translation tables at every call site.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!

/// A specialized [`Result`](core::result::Result) type for secure partition operations.
pub type Result<T> = core::result::Result<T, EfiError>;

use r_efi::efi;

/// EDK II Error Code equivalent as a Rust Error enum
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum EfiError {
    /// The parameter was incorrect.
    InvalidParameter,
    /// The operation is not supported.
    Unsupported,
    /// The buffer was not the proper size for the request.
    BadBufferSize,
    /// The buffer was not large enough to hold the requested data. The required buffer size is returned in the
    /// appropriate parameter when this error occurs.
    BufferTooSmall,
    /// The physical device reported an error while attempting the operation.
    DeviceError,
    /// The resource has run out.
    OutOfResources,
    /// The item was not found.
    NotFound,
    /// Access was denied.
    AccessDenied,
    /// The protocol has already been started.
    AlreadyStarted,
    /// The operation was aborted.
    Aborted,
    /// An unknown EFI status code was encountered.
    Unknown(efi::Status),
}

impl EfiError {
    /// Converts an `r_efi::efi::Status` to a `Result`.
    ///
    /// If the status is `SUCCESS`, it returns `Ok(())`. Otherwise, it returns an `Err` with the corresponding
    /// `EfiError`.
    pub fn status_to_result(status: efi::Status) -> Result<()> {
        match status {
            efi::Status::SUCCESS => Ok(()),
            other => Err(EfiError::from(other)),
        }
    }
}

impl From<EfiError> for efi::Status {
    fn from(e: EfiError) -> efi::Status {
        match e {
            EfiError::InvalidParameter => efi::Status::INVALID_PARAMETER,
            EfiError::Unsupported => efi::Status::UNSUPPORTED,
            EfiError::BadBufferSize => efi::Status::BAD_BUFFER_SIZE,
            EfiError::BufferTooSmall => efi::Status::BUFFER_TOO_SMALL,
            EfiError::DeviceError => efi::Status::DEVICE_ERROR,
            EfiError::OutOfResources => efi::Status::OUT_OF_RESOURCES,
            EfiError::NotFound => efi::Status::NOT_FOUND,
            EfiError::AccessDenied => efi::Status::ACCESS_DENIED,
            EfiError::AlreadyStarted => efi::Status::ALREADY_STARTED,
            EfiError::Aborted => efi::Status::ABORTED,
            EfiError::Unknown(status) => status,
        }
    }
}

impl From<efi::Status> for EfiError {
    fn from(status: efi::Status) -> EfiError {
        match status {
            efi::Status::INVALID_PARAMETER => EfiError::InvalidParameter,
            efi::Status::UNSUPPORTED => EfiError::Unsupported,
            efi::Status::BAD_BUFFER_SIZE => EfiError::BadBufferSize,
            efi::Status::BUFFER_TOO_SMALL => EfiError::BufferTooSmall,
            efi::Status::DEVICE_ERROR => EfiError::DeviceError,
            efi::Status::OUT_OF_RESOURCES => EfiError::OutOfResources,
            efi::Status::NOT_FOUND => EfiError::NotFound,
            efi::Status::ACCESS_DENIED => EfiError::AccessDenied,
            efi::Status::ALREADY_STARTED => EfiError::AlreadyStarted,
            efi::Status::ABORTED => EfiError::Aborted,
            _ => EfiError::Unknown(status),
        }
    }
}
