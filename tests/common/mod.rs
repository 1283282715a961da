//! Shared fixtures for the integration tests. Each test binary uses a different subset.
#![allow(dead_code)]

pub mod mocks;
pub mod test_helpers;
