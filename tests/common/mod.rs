//! Shared integration-test harness: a real server on an ephemeral port,
//! mock adapters, and a thin HTTP client.

#![allow(dead_code)]

pub mod harness;
