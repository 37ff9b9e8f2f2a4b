//! MMI Handler Dispatch
//!
//! MM drivers register a handler for the GUID their callers place in the communicate header. The dispatcher
//! validates each incoming message against the buffer it arrived in and passes only the message data to the
//! handler.
//!
//! ## Logging
//!
//! The `stmm` log target is used for dispatch decisions.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
extern crate alloc;
use alloc::{boxed::Box, vec::Vec};

use patina_ffa::{
    communicate::MmCommunicateHeader,
    error::{EfiError, Result},
};
use r_efi::efi;

#[cfg(any(test, feature = "mockall"))]
use mockall::automock;

/// A handler for messages addressed to a single GUID.
#[cfg_attr(any(test, feature = "mockall"), automock)]
pub trait MmiHandler {
    /// Processes a message in place.
    ///
    /// `comm_buffer` holds exactly the message data declared by the header; its length is both the request size
    /// and the capacity available for the reply.
    fn handle(&self, comm_buffer: &mut [u8]) -> Result<()>;
}

/// Registry of MMI handlers.
#[derive(Default)]
pub struct MmiDispatcher {
    handlers: Vec<(efi::Guid, Box<dyn MmiHandler>)>,
}

impl MmiDispatcher {
    /// Creates an empty dispatcher.
    pub fn new() -> Self {
        Self { handlers: Vec::new() }
    }

    /// Registers `handler` for messages addressed to `guid`.
    ///
    /// Only one handler may be registered for a GUID; a second registration fails with `AlreadyStarted`.
    pub fn register(&mut self, guid: efi::Guid, handler: Box<dyn MmiHandler>) -> Result<()> {
        if self.handlers.iter().any(|(registered, _)| *registered == guid) {
            log::error!(target: "stmm", "MMI handler for {:?} already registered.", guid);
            return Err(EfiError::AlreadyStarted);
        }
        log::info!(target: "stmm", "Registered MMI handler for {:?}.", guid);
        self.handlers.push((guid, handler));
        Ok(())
    }

    /// Removes the handler registered for `guid`.
    pub fn unregister(&mut self, guid: &efi::Guid) -> Result<()> {
        let index = self.handlers.iter().position(|(registered, _)| registered == guid).ok_or(EfiError::NotFound)?;
        self.handlers.remove(index);
        Ok(())
    }

    /// Returns the number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns whether no handler is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatches the message at the start of `comm_buffer` to its handler.
    ///
    /// A handler answering `BufferTooSmall` has written the size it needs into its reply, so the message counts as
    /// handled and the reply is returned to the caller.
    pub fn dispatch(&self, comm_buffer: &mut [u8]) -> Result<()> {
        let header = MmCommunicateHeader::read(comm_buffer)?;
        let total_size = header.total_size();
        if total_size > comm_buffer.len() {
            log::error!(
                target: "stmm",
                "Message for {:?} declares {:#X} bytes, buffer holds {:#X}.",
                header.guid(),
                total_size,
                comm_buffer.len()
            );
            return Err(EfiError::InvalidParameter);
        }

        let guid = header.guid();
        let (_, handler) = self.handlers.iter().find(|(registered, _)| *registered == guid).ok_or_else(|| {
            log::warn!(target: "stmm", "No MMI handler for {:?}.", guid);
            EfiError::NotFound
        })?;

        log::debug!(target: "stmm", "Dispatching {:#X} bytes to MMI handler {:?}.", header.message_length(), guid);
        match handler.handle(&mut comm_buffer[MmCommunicateHeader::SIZE..total_size]) {
            Err(EfiError::BufferTooSmall) => {
                log::debug!(target: "stmm", "MMI handler {:?} replied with its required size.", guid);
                Ok(())
            }
            result => result,
        }
    }
}
