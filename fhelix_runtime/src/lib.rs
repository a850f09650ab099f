#![deny(rustdoc::broken_intra_doc_links)]

//! This crate contains the runtime for fhelix programs: the scheme
//! dispatcher that commits a compiled DAG to one of the five backend
//! libraries, the scheme-parametric graph executor, key and valuation
//! handling, and the `KnownType` serialization envelope.
//!
//! The cryptographic kernels of the underlying HE libraries are external
//! collaborators (interfaces only); each backend here is the interface
//! plus a reference evaluator with honest scale, level, and key-identity
//! bookkeeping, so every compiler and runtime contract is exercised
//! end-to-end.

mod decision;
mod engine;
pub mod engines;
mod error;
mod executor;
mod scheme;
pub mod serialization;
mod session;
mod slot;
mod valuation;

pub use decision::Decision;
pub use engine::{
    BootstrapKey, EvalEngine, EvalKeys, PublicKey, RuntimeValue, SecretKey,
    SimCiphertext, SimPlaintext,
};
pub use error::{Error, Result};
pub use executor::Executor;
pub use scheme::{decide, Backend};
pub use session::{AloInfoMsg, Session, ValuationMsg};
pub use slot::SlotValue;
pub use valuation::{Valuation, Value};
