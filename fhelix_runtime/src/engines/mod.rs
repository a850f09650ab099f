//! The five backend engines: CKKS and BFV on each of the SEAL- and
//! OpenFHE-style evaluators, and the TFHE-like small-integer engine.
//! All are reference evaluators over honest scale/level/key bookkeeping;
//! the cryptographic kernels are external collaborators.

mod concrete;
mod openfhe;
mod seal;
mod sim;

pub use concrete::Concrete;
pub use openfhe::{OpenfheBfv, OpenfheCkks};
pub use seal::{SealBfv, SealCkks};
