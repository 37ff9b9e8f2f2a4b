//! Test MMI Handlers
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
#![allow(dead_code)]

use core::cell::RefCell;
use std::rc::Rc;

use patina_ffa::{communicate::MmCommunicateHeader, error::Result};
use patina_stmm::mmi::MmiHandler;
use r_efi::efi;

/// Handler GUID used by the reversing handler.
pub const REVERSE_HANDLER_GUID: efi::Guid =
    efi::Guid::from_fields(0x12345678, 0x1234, 0x5678, 0x12, 0x34, &[0x56, 0x78, 0x90, 0xab, 0xcd, 0xef]);

/// A GUID no handler is registered for.
pub const UNKNOWN_GUID: efi::Guid =
    efi::Guid::from_fields(0xdeadbeef, 0x0bad, 0xf00d, 0xaa, 0x55, &[0x01, 0x02, 0x03, 0x04, 0x05, 0x06]);

/// Reverses the message data in place.
pub struct ReverseHandler;

impl MmiHandler for ReverseHandler {
    fn handle(&self, comm_buffer: &mut [u8]) -> Result<()> {
        comm_buffer.reverse();
        Ok(())
    }
}

/// Records every message it receives.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    pub received: Rc<RefCell<Vec<Vec<u8>>>>,
}

impl MmiHandler for RecordingHandler {
    fn handle(&self, comm_buffer: &mut [u8]) -> Result<()> {
        self.received.borrow_mut().push(comm_buffer.to_vec());
        Ok(())
    }
}

/// Builds a message with `data` addressed to `recipient`.
pub fn message(recipient: &efi::Guid, data: &[u8]) -> Vec<u8> {
    let mut message = vec![0u8; MmCommunicateHeader::SIZE + data.len()];
    MmCommunicateHeader::new(recipient, data.len() as u64).write(&mut message).expect("message holds header");
    message[MmCommunicateHeader::SIZE..].copy_from_slice(data);
    message
}
