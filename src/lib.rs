#![allow(clippy::derive_partial_eq_without_eq)]

pub mod analyzer;
pub mod arch;
pub mod config;
pub mod detect;
pub mod extract;
pub mod host;
pub mod probe;
pub mod uid;
