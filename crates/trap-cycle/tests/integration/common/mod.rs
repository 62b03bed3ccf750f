//! Shared fixtures. Each test binary uses a subset.
#![allow(dead_code)]

pub mod harness;
