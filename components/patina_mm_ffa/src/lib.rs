//! ## MM Communication on Arm Platforms
//!
//! On Arm platforms, Standalone MM runs as a secure partition at S-EL0 (or S-EL1) under a secure partition manager.
//! Normal world firmware reaches it through a statically reserved buffer shared between the two worlds, and a trap
//! into the secure monitor that tells the partition a message is waiting.
//!
//! Two calling conventions exist:
//!
//! - **Legacy**: A single `MM_COMMUNICATE` SMC carries the shared buffer's physical address to EL3, which delegates
//!   the event to the partition.
//! - **Partition-addressed**: FF-A v1.1 direct messages addressed from the normal world endpoint to the MM partition.
//!   The partition's endpoint ID is discovered at start with `FFA_PARTITION_INFO_GET`. The partition may be preempted
//!   while handling a request, in which case it is resumed with `FFA_RUN` until it responds.
//!
//! The convention is selected once by version negotiation when the [communicator::MmCommunicator] is created, and
//! stays fixed for the rest of the boot.
//!
//! ## Examples and Usage
//!
//! ```rust,no_run
//! use patina_ffa::{comm_buffer::CommBuffer, smc::{ArmSmc, Conduit}};
//! use patina_mm_ffa::{
//!     communicator::{MmCommunication, MmCommunicator},
//!     config::{CallingConvention, MmCommunicationConfiguration},
//! };
//!
//! fn entry_point() -> patina_ffa::error::Result<()> {
//!     // SAFETY: The platform reserves this range for the MM shared buffer.
//!     let comm_buffer = unsafe { CommBuffer::from_raw_parts(0xFF60_0000, 0x1_0000)? };
//!     let config = MmCommunicationConfiguration {
//!         convention: CallingConvention::PartitionAddressed,
//!         comm_buffer: Some(comm_buffer),
//!     };
//!     // SAFETY: Only the shared buffer is ever passed to the secure world.
//!     let smc = unsafe { ArmSmc::new(Conduit::Smc) };
//!     let communicator = MmCommunicator::new(config, Box::new(smc))?;
//!
//!     let mut message = [0u8; 24 + 4];
//!     communicator.communicate(&mut message, None)
//! }
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

pub mod communicator;
pub mod config;
pub mod directory;
pub mod events;
pub mod negotiator;
