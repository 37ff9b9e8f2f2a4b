//! HEST Error Sources from Standalone MM
//!
//! Hardware error sources handled in the secure world must still be described to the OS in the HEST ACPI table,
//! which is built in the normal world. This crate carries those descriptions across:
//!
//! - [aggregator]: The MMI handler that gathers the descriptors of every MM driver publishing error sources.
//! - [collector]: The normal world client that retrieves them through MM communication and hands them to the
//!   [table::HestTable] builder.
//!
//! The reply layout is described in [descriptor_info].
//!
//! ## Examples and Usage
//!
//! ```rust,no_run
//! use patina_mm_ffa::communicator::MmCommunication;
//! use patina_mm_hest::{collector::append_mm_error_sources, table::HestTable};
//!
//! fn publish_mm_error_sources(mm_comm: &dyn MmCommunication, hest: &dyn HestTable) {
//!     if let Err(err) = append_mm_error_sources(mm_comm, hest) {
//!         log::error!("Failed appending MM error sources to HEST: {:?}", err);
//!     }
//! }
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

pub mod aggregator;
pub mod collector;
pub mod descriptor_info;
pub mod table;
