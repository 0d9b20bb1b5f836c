//! Adapters that implement the collaborator ports in-process.

pub mod substrates;
