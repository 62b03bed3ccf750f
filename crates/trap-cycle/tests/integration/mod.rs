//! Integration tests for trap-cycle.
//!
//! These drive the engine end to end against the paper venue:
//! - cycle start and cascade staging
//! - fill attribution and level advance
//! - resolution paths and auto-restart
//! - scheduler fault isolation and shutdown

pub mod common;
