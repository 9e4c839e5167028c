//! # TSS Core
//!
//! Round-based, message-driven MPC protocols built on a single generic state
//! machine.
//!
//! This crate provides:
//! - [`message::MsgMain`], the engine that tracks per-peer message arrival and
//!   advances a chain of round handlers
//! - LISS threshold key generation over a homomorphic-encryption group
//! - Password-authenticated share recovery (user and server side)
//! - Threshold ECDSA signing over secp256k1
//!
//! ## Protocol Overview
//!
//! Every protocol is a chain of [`message::Handler`]s. Each handler consumes
//! exactly one message type; once every required peer has delivered that type
//! the engine calls `finalize`, which returns the next handler or terminates
//! the chain. Façades ([`keygen::Liss`], [`password::PasswordVerifier`],
//! [`password::PasswordServer`], [`sign::Signer`]) wire the chains and extract
//! typed results.
//!
//! ## Example
//!
//! ```rust,ignore
//! use tss_core::{keygen::{GroupConfig, GroupConfigs, Liss}, mpc::MemoryNetwork};
//!
//! let network = MemoryNetwork::new(["p0", "p1"]);
//! let liss = Liss::new(network.peer_manager("p0")?, configs, listener)?;
//! liss.start()?;
//! // ... deliver inbound messages, wait for Done ...
//! let result = liss.result()?;
//! ```

pub mod birkhoff;
pub mod commitment;
pub mod error;
pub mod group;
pub mod homo;
pub mod keygen;
pub mod message;
pub mod mpc;
pub mod oblivious;
pub mod password;
pub mod sign;
pub mod types;
pub mod zkproof;

pub use error::{Error, ErrorKind, Result};
pub use message::{MsgMain, State, StateChangedListener};
pub use types::{PeerId, Signature};

/// Protocol version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default threshold for a 3-party setup
pub const DEFAULT_THRESHOLD: usize = 2;

/// Default number of parties
pub const DEFAULT_PARTIES: usize = 3;
