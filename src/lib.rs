//! Session hijack detection.
//!
//! A session token is bound to the fingerprint of the device that
//! established it. Later requests presenting the same token from a device
//! with a different fingerprint are reported as hijacked.
//!
//! - [`binding`]: binder, verifier and token hashing
//! - [`store`]: binding persistence (memory, SQLite, Redis)
//! - [`gateway`]: HTTP service exposing bind/verify
//! - [`client`]: SDK for an auth API guarded this way

#![forbid(unsafe_code)]

pub mod binding;
pub mod client;
pub mod config;
pub mod gateway;
pub mod metrics;
pub mod store;

pub use binding::{
    bind, hash_token, verify, BindOutcome, SessionBinder, SessionVerifier, Verification,
    VerificationRecord, VerifyError,
};
pub use client::{ClientError, FingerprintSource, SessionClient, StaticFingerprint};
pub use config::Config;
pub use store::{open_store, MemoryStore, SessionStore, SqliteStore, StoreError};
