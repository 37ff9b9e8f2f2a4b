//! Patina MM FF-A Integration Tests
//!
//! Runs the normal world communicator against a simulated partition manager and a real secure partition event
//! loop sharing one communication buffer.
//!
//! ## Logging
//!
//! The `env_logger` crate can be used to enable logging during tests.
//!
//! To enable logging, set the `RUST_LOG` environment variable to the desired log level before running the tests:
//!
//! ```sh
//! RUST_LOG=debug cargo make test -p patina_mm_ffa --test mm_ffa_integration
//! ```
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: BSD-2-Clause-Patent

// Common utilities available to all test modules
mod common;

// Test module groups
mod communication_tests;
mod discovery_tests;
mod event_group_tests;
