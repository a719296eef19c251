//! Entitlement ledger core: record model, obfuscated ledger store, request
//! handling, and reconciliation against an external billing source.

pub mod billing;
pub mod codec;
pub mod command;
pub mod config;
pub mod envelope;
pub mod error;
pub mod event;
pub mod handler;
pub mod journal;
pub mod reconcile;
pub mod record;
pub mod rng;
pub mod scheduler;
pub mod server;
pub mod status;
pub mod store;
pub mod types;
