//! Arm Firmware Framework (FF-A) and Legacy MM Calling Convention Support
//!
//! This crate holds the pieces shared by both sides of a secure partition conversation:
//!
//! - [smc]: The call primitive. A single blocking trap into the secure monitor (or partition manager) carrying
//!   eight register-sized arguments.
//! - [abi]: Function identifiers and status codes for the FF-A and legacy MM interfaces.
//! - [version]: Version word packing and the compatibility rule used by both callers and callees.
//! - [partition]: The partition information descriptor and the SMCCC encoding of a service GUID.
//! - [communicate]: The MM communicate header placed at the start of every message.
//! - [comm_buffer]: The fixed shared communication buffer and its one-time virtual remap.
//! - [error]: The error type returned throughout the workspace.
//!
//! ## Background
//!
//! On Arm platforms, Standalone MM runs in a secure partition. The normal world reaches it either through the
//! legacy `MM_COMMUNICATE` SMC, where a single buffer address is passed to the secure monitor, or through FF-A
//! direct messages addressed from one endpoint ID to another. In both cases the request and response payloads are
//! exchanged through one statically reserved buffer shared between the worlds.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent
//!
#![cfg_attr(all(not(feature = "std"), not(test), not(feature = "mockall")), no_std)]

pub mod abi;
pub mod comm_buffer;
pub mod communicate;
pub mod error;
pub mod partition;
pub mod smc;
pub mod version;
