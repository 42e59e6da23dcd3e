// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic,
    clippy::string_slice
)]

//! Unit tests for the reconciliation engine
//!
//! This module contains unit tests for:
//! - Cluster resolution, provisioning and drift checks
//! - Firewall rule reconciliation and droplet allow-listing
//! - Temporary self access
//! - User, pool and database reconciliation
//! - Manifest application

#[path = "../common/mod.rs"]
mod common;

mod firewall;
