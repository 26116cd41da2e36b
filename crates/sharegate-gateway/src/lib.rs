//! Sharegate gateway library.
//!
//! Everything the `sharegate` binary does, exposed as modules so the
//! integration tests can build the router and state directly.

pub mod access;
pub mod app;
pub mod config;
pub mod error;
pub mod hardening;
pub mod pages;
pub mod proxy;
pub mod routes;
pub mod session;
pub mod state;
pub mod supervisor;
