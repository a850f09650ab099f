#![deny(rustdoc::broken_intra_doc_links)]

//! This crate contains the compiler mid-end for fhelix: the rewrite passes
//! that prepare a DAG for an HE backend, the validation checkers, and
//! encryption-parameter selection.
//!
//! Compilation is two-phase. [`prepare`] runs the scheme-independent
//! passes (dead-node cleanup, reduction balancing, depth counting) so the
//! dispatcher can choose a backend from the DAG's characteristics; the
//! `transpile_*` pipelines then lower the DAG for the chosen backend and
//! produce its [`EncryptionParams`] and [`Signature`].

mod compile;
mod error;
pub mod params;
mod signature;
pub mod transforms;
pub mod validation;

pub use compile::{
    prepare, transpile_openfhe_bfv, transpile_openfhe_ckks,
    transpile_seal_bfv, transpile_seal_ckks, transpile_small_int, Transpiled,
};
pub use error::{Error, Result};
pub use params::EncryptionParams;
pub use signature::{EncodingInfo, Signature};
