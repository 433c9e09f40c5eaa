//! Domain logic. Pure and synchronous; no I/O.

pub mod pricing;
