//! Oblivious primitives
//!
//! This module provides the oblivious PRF used by password verification:
//! the user learns `F_k(password)` without revealing the password, the server
//! keeps `k` without learning the output.

pub mod oprf;

pub use oprf::{OprfRequest, OprfResponse, Requester, Responder};
