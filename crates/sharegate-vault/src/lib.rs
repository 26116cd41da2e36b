//! Credential vault for Sharegate.
//!
//! Owns everything the gateway needs to keep credentials encrypted at rest:
//! key-material bootstrap ([`keyfile`]), scrypt key derivation and AES-256-GCM
//! blob encryption ([`crypto`]), and the two-file credential store
//! ([`store`]). No HTTP types leak into this crate.

pub mod crypto;
pub mod error;
pub mod keyfile;
pub mod store;
