//! Switchboard Client - Worker runtime
//!
//! Ties the backend connection, the call cache and its store together for a
//! request handler, and hosts the `switchboard` command line tool.

pub mod worker;

pub use worker::{open_store, Worker};
