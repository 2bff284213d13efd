//! Test support shared by the skirmish crates.
//!
//! [`fixtures`] builds ready-made simulations, [`strategies`] generates
//! random actors and orders for proptest, and [`determinism`] checks that
//! runs of either hash identically.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod determinism;
pub mod fixtures;
pub mod strategies;

pub use proptest;
