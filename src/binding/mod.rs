//! Session-to-fingerprint binding and hijack detection.
//!
//! At login the caller binds `hash(token) -> fingerprint`. On every later
//! request it re-collects the fingerprint and asks the verifier whether the
//! session is still coming from the device it was established on.
//!
//! Both halves are stateless over an injected
//! [`SessionStore`](crate::store::SessionStore). Calls may run concurrently
//! without coordination; concurrent re-binds of one token resolve
//! last-write-wins in the store.

pub mod binder;
pub mod token;
pub mod verifier;

pub use binder::{bind, BindOutcome, BindSkip, SessionBinder};
pub use token::hash_token;
pub use verifier::{verify, SessionVerifier, Verification, VerificationRecord, VerifyError};
