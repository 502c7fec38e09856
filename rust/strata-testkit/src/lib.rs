//! Test utilities and helpers for the Strata block crates.
//!
//! This crate provides:
//! - Seeded generation of random values for any [`strata_block::Type`]
//! - Assertion oracles over blocks: value equality, size accounting,
//!   compaction, retained-size parts and encoding round trips
//!
//! # Usage
//!
//! This crate is intended for use by the integration tests of the Strata
//! crates.

pub mod assertions;
pub mod data_gen;
