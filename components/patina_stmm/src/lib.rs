//! Standalone MM Secure Partition Support
//!
//! The secure side of MM communication. Once the MM foundation has initialized, the partition hands control back
//! to its partition manager and waits for delegated events. Each event names the shared communication buffer,
//! whose [`MmCommunicateHeader`](patina_ffa::communicate::MmCommunicateHeader) selects the registered MMI handler
//! that processes the message in place.
//!
//! - [mmi]: The registry of MMI handlers keyed by GUID, and message dispatch.
//! - [event_loop]: Compatibility checks with the partition manager and the delegated event loop.
//! - [console]: A `log` implementation that writes through `FFA_CONSOLE_LOG`.
//! - `simulation`: With the `mockall` feature, a simulated partition manager hosting a real secure partition, for
//!   testing normal world code.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

pub mod console;
pub mod event_loop;
pub mod mmi;
#[cfg(feature = "mockall")]
pub mod simulation;
