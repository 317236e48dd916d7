//! # Engine Module
//!
//! Internal step-harness implementation.
//!
//! This module contains all core building blocks such as:
//! - Step vocabulary and policies
//! - Batches and step result shapes
//! - The two-phase barrier and partial exchange
//! - Worker sets, step handlers and the dispatcher
//! - Per-thread running statistics
//!
//! Public API exposure is controlled by `lib.rs`.

pub mod types;
pub mod error;
pub mod config;
pub mod batch;
pub mod step;
pub mod algorithm;
pub mod barrier;
pub mod exchange;
pub mod worker;
pub mod scheduler;
pub mod dispatcher;
pub mod reduce;
