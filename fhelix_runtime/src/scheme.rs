use serde::{Deserialize, Serialize};

use fhelix_dag::{Dag, DEFAULT_Q_CNT, MAX_SEAL_BITS};

use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
/**
 * The backend libraries a program can be dispatched to. BFV and CKKS each
 * have two implementations; SEAL is preferred while the program's modulus
 * chain fits its standard-parameter budget, and OpenFHE takes over beyond
 * it. The small-integer backend handles native division.
 */
pub enum Backend {
    /**
     * CKKS on SEAL: approximate fixed-point arithmetic, explicit rescale
     * and modulus-switch scheduling.
     */
    SealCkks,

    /**
     * BFV on SEAL: exact integer arithmetic.
     */
    SealBfv,

    /**
     * CKKS on OpenFHE: the library schedules scales itself and supports
     * bootstrapping.
     */
    OpenfheCkks,

    /**
     * BFV on OpenFHE.
     */
    OpenfheBfv,

    /**
     * A TFHE-like small-integer library with native division.
     */
    Concrete,
}

impl Backend {
    /**
     * The backend's stable name, as surfaced by `lib_info` and stored in
     * serialized programs.
     */
    pub fn name(&self) -> &'static str {
        match self {
            Backend::SealCkks => "seal_ckks",
            Backend::SealBfv => "seal_bfv",
            Backend::OpenfheCkks => "openfhe_ckks",
            Backend::OpenfheBfv => "openfhe_bfv",
            Backend::Concrete => "concrete",
        }
    }

    /**
     * Resolves a stable name back to a backend.
     */
    pub fn from_name(name: &str) -> Option<Backend> {
        Some(match name {
            "seal_ckks" => Backend::SealCkks,
            "seal_bfv" => Backend::SealBfv,
            "openfhe_ckks" => Backend::OpenfheCkks,
            "openfhe_bfv" => Backend::OpenfheBfv,
            "concrete" => Backend::Concrete,
            _ => return None,
        })
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/**
 * Chooses a backend from a prepared DAG's characteristics, in order:
 *
 * 1. `short_int` (a `Div` was inserted) routes to the small-integer
 *    backend.
 * 2. `has_int64` routes to BFV, on OpenFHE when the depth-times-scale
 *    budget exceeds what SEAL's tables can hold.
 * 3. `has_double` (the default) routes to CKKS with the same split.
 *
 * A DAG matching none of these is an input-type error.
 */
pub fn decide(dag: &Dag) -> Result<Backend> {
    let max_depth_for_seal = MAX_SEAL_BITS / dag.scale - DEFAULT_Q_CNT;
    let depth = dag.after_reduction_depth;

    if dag.short_int {
        Ok(Backend::Concrete)
    } else if dag.has_int64 {
        if depth > max_depth_for_seal {
            Ok(Backend::OpenfheBfv)
        } else {
            Ok(Backend::SealBfv)
        }
    } else if dag.has_double {
        if depth > max_depth_for_seal {
            Ok(Backend::OpenfheCkks)
        } else {
            Ok(Backend::SealCkks)
        }
    } else {
        Err(Error::InvalidInputType)
    }
}
