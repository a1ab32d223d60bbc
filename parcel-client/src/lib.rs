//! Relay-mediated peer-to-peer file transfer client. The binary (`main.rs`)
//! is a thin wrapper around this library, which exists so integration tests
//! can drive the transfer controller directly. See spec §1 and §4.5.1.

pub mod cli;
pub mod config;
pub mod error;
pub mod fs_util;
pub mod net_info;
pub mod transfer;
