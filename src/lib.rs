//! Yieldbet Engine — Library Root
//!
//! Settlement and yield-allocation engine for binary prediction
//! markets whose escrowed stakes earn yield in external venues.
//! Re-exports all modules for the binary, integration tests and
//! benchmarks.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod ports;
pub mod usecases;
