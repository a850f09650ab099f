//! The scheme decision: commits a prepared DAG to one backend, owns that
//! backend's session, and routes every later operation through it. The
//! five known backends are a closed enum; dispatch is a `match`, not a
//! registry.

use std::collections::BTreeSet;

use log::debug;

use fhelix_backend::{
    prepare, transpile_openfhe_bfv, transpile_openfhe_ckks,
    transpile_seal_bfv, transpile_seal_ckks, transpile_small_int,
    EncryptionParams, Transpiled,
};
use fhelix_dag::{Dag, DagRef, DagSerializePara};

use fhelix_backend::transforms::clean_nodes;

use crate::engines::{Concrete, OpenfheBfv, OpenfheCkks, SealBfv, SealCkks};
use crate::scheme::{decide, Backend};
use crate::session::{AloInfoMsg, Session};
use crate::{Error, Result, Valuation};

/**
 * A compiled program: the chosen backend and its session state.
 */
#[derive(Debug)]
pub enum Decision {
    /**
     * Compiled for CKKS on SEAL.
     */
    SealCkks(Session<SealCkks>),

    /**
     * Compiled for BFV on SEAL.
     */
    SealBfv(Session<SealBfv>),

    /**
     * Compiled for CKKS on OpenFHE.
     */
    OpenfheCkks(Session<OpenfheCkks>),

    /**
     * Compiled for BFV on OpenFHE.
     */
    OpenfheBfv(Session<OpenfheBfv>),

    /**
     * Compiled for the small-integer backend.
     */
    Concrete(Session<Concrete>),
}

macro_rules! with_session {
    ($decision:expr, $session:ident => $body:expr) => {
        match $decision {
            Decision::SealCkks($session) => $body,
            Decision::SealBfv($session) => $body,
            Decision::OpenfheCkks($session) => $body,
            Decision::OpenfheBfv($session) => $body,
            Decision::Concrete($session) => $body,
        }
    };
}

fn transpile_for(backend: Backend, dag: &mut Dag) -> Result<Transpiled> {
    Ok(match backend {
        Backend::SealCkks => transpile_seal_ckks(dag)?,
        Backend::SealBfv => transpile_seal_bfv(dag)?,
        Backend::OpenfheCkks => transpile_openfhe_ckks(dag)?,
        Backend::OpenfheBfv => transpile_openfhe_bfv(dag)?,
        Backend::Concrete => transpile_small_int(dag)?,
    })
}

fn session_for(backend: Backend, transpiled: Transpiled) -> Decision {
    match backend {
        Backend::SealCkks => {
            Decision::SealCkks(Session::from_transpiled(transpiled))
        }
        Backend::SealBfv => {
            Decision::SealBfv(Session::from_transpiled(transpiled))
        }
        Backend::OpenfheCkks => {
            Decision::OpenfheCkks(Session::from_transpiled(transpiled))
        }
        Backend::OpenfheBfv => {
            Decision::OpenfheBfv(Session::from_transpiled(transpiled))
        }
        Backend::Concrete => {
            Decision::Concrete(Session::from_transpiled(transpiled))
        }
    }
}

fn empty_session_for(backend: Backend) -> Decision {
    match backend {
        Backend::SealCkks => Decision::SealCkks(Session::empty()),
        Backend::SealBfv => Decision::SealBfv(Session::empty()),
        Backend::OpenfheCkks => Decision::OpenfheCkks(Session::empty()),
        Backend::OpenfheBfv => Decision::OpenfheBfv(Session::empty()),
        Backend::Concrete => Decision::Concrete(Session::empty()),
    }
}

fn merge_params(
    acc: Option<EncryptionParams>,
    next: EncryptionParams,
) -> EncryptionParams {
    let acc = match acc {
        None => return next,
        Some(acc) => acc,
    };

    match (acc, next) {
        (
            EncryptionParams::PrimeChain {
                prime_bits: a_bits,
                rotations: a_rot,
                poly_modulus_degree: a_deg,
            },
            EncryptionParams::PrimeChain {
                prime_bits: b_bits,
                rotations: b_rot,
                poly_modulus_degree: b_deg,
            },
        ) => {
            let a_total: u32 = a_bits.iter().sum();
            let b_total: u32 = b_bits.iter().sum();
            let prime_bits = if b_total > a_total { b_bits } else { a_bits };

            let rotations: BTreeSet<i32> =
                a_rot.union(&b_rot).copied().collect();

            EncryptionParams::PrimeChain {
                prime_bits,
                rotations,
                poly_modulus_degree: a_deg.max(b_deg),
            }
        }
        (
            EncryptionParams::DepthBudget {
                mult_depth: a_depth,
                rotations: a_rot,
                batch_size: a_batch,
                scaling_mod_size,
                first_mod_size,
                plain_modulus,
            },
            EncryptionParams::DepthBudget {
                mult_depth: b_depth,
                rotations: b_rot,
                batch_size: b_batch,
                ..
            },
        ) => EncryptionParams::DepthBudget {
            mult_depth: a_depth.max(b_depth),
            rotations: a_rot.union(&b_rot).copied().collect(),
            batch_size: a_batch.max(b_batch),
            scaling_mod_size,
            first_mod_size,
            plain_modulus,
        },
        (acc, _) => acc,
    }
}

impl Decision {
    /**
     * Compiles a DAG: runs the scheme-independent preparation, commits a
     * backend from the DAG's characteristics, and lowers the program for
     * it. Groups compile each child individually and share one merged
     * parameter set and signature.
     */
    pub fn compile(dag: &mut Dag) -> Result<Decision> {
        if dag.is_group() {
            return Self::compile_group(dag);
        }

        prepare(dag)?;
        let backend = decide(dag)?;
        debug!(
            "dag {} compiles for {} at depth {}",
            dag.name(),
            backend,
            dag.after_reduction_depth
        );

        let transpiled = transpile_for(backend, dag)?;
        Ok(session_for(backend, transpiled))
    }

    fn compile_group(group: &mut Dag) -> Result<Decision> {
        let children: Vec<DagRef> =
            group.children().map(|(_, c)| c.clone()).collect();

        let mut max_depth = 0;
        let mut short_int = false;
        let mut has_int64 = false;

        for child in &children {
            group.update_group_index();
            let mut child = child.borrow_mut();
            prepare(&mut child)?;
            max_depth = max_depth.max(child.after_reduction_depth);
            short_int |= child.short_int;
            has_int64 |= child.has_int64;
        }
        group.update_group_index();

        group.after_reduction_depth = max_depth;
        group.short_int = short_int;
        group.has_int64 = has_int64;

        let backend = decide(group)?;
        debug!(
            "group {} compiles for {} at depth {}",
            group.name(),
            backend,
            max_depth
        );

        let mut params: Option<EncryptionParams> = None;
        let mut signature: Option<fhelix_backend::Signature> = None;

        for child in &children {
            let mut child = child.borrow_mut();
            // Every child keeps the group depth so per-child parameter
            // choices cover the deepest sibling.
            child.after_reduction_depth = max_depth;
            let transpiled = transpile_for(backend, &mut child)?;
            drop(child);
            group.update_group_index();

            params = Some(merge_params(params, transpiled.params));
            signature = Some(match signature {
                None => transpiled.signature,
                Some(mut s) => {
                    s.merge(&transpiled.signature);
                    s
                }
            });
        }

        let transpiled = Transpiled {
            params: params.ok_or(Error::NotCompiled)?,
            signature: signature.ok_or(Error::NotCompiled)?,
        };

        Ok(session_for(backend, transpiled))
    }

    /**
     * Recreates a decision shell for a named backend; artifacts arrive by
     * deserialization.
     */
    pub fn from_backend(backend: Backend) -> Decision {
        empty_session_for(backend)
    }

    /**
     * The committed backend.
     */
    pub fn backend(&self) -> Backend {
        match self {
            Decision::SealCkks(_) => Backend::SealCkks,
            Decision::SealBfv(_) => Backend::SealBfv,
            Decision::OpenfheCkks(_) => Backend::OpenfheCkks,
            Decision::OpenfheBfv(_) => Backend::OpenfheBfv,
            Decision::Concrete(_) => Backend::Concrete,
        }
    }

    /**
     * The stable names of the libraries this program uses.
     */
    pub fn lib_info(&self) -> Vec<String> {
        vec![self.backend().name().to_string()]
    }

    /**
     * Generates the key set.
     */
    pub fn gen_keys(&mut self) -> Result<()> {
        with_session!(self, s => s.gen_keys())
    }

    /**
     * Encrypts a plaintext valuation into the input slots.
     */
    pub fn encrypt(
        &mut self,
        inputs: &Valuation,
        replace: bool,
    ) -> Result<()> {
        with_session!(self, s => s.encrypt(inputs, replace))
    }

    /**
     * Evaluates `dag` over the seeded inputs. Dead nodes left behind by
     * lowering are dropped first.
     */
    pub fn execute(&mut self, dag: &mut Dag) -> Result<()> {
        clean_nodes(dag);
        with_session!(self, s => s.execute(dag))
    }

    /**
     * Decrypts every held output.
     */
    pub fn decrypt(&self) -> Result<Valuation> {
        with_session!(self, s => s.decrypt())
    }

    /**
     * Bundles the artifacts requested by the serialization flags.
     */
    pub fn alo_info(&self, para: &DagSerializePara) -> Result<AloInfoMsg> {
        with_session!(self, s => s.alo_info(para))
    }

    /**
     * Merges a deserialized artifact bundle.
     */
    pub fn load_alo_info(&mut self, msg: AloInfoMsg) {
        with_session!(self, s => s.load_alo_info(msg))
    }

    /**
     * Serializes the encrypted input valuation.
     */
    pub fn input_bytes(&self) -> Result<Vec<u8>> {
        with_session!(self, s => {
            bincode::serialize(&s.input_msg())
                .map_err(|e| Error::ParseError(e.to_string()))
        })
    }

    /**
     * Loads an encrypted input valuation.
     */
    pub fn load_input_bytes(
        &mut self,
        bytes: &[u8],
        replace: bool,
    ) -> Result<()> {
        with_session!(self, s => {
            let msg = bincode::deserialize(bytes)
                .map_err(|e| Error::ParseError(e.to_string()))?;
            s.load_input_msg(msg, replace);
            Ok(())
        })
    }

    /**
     * Serializes the encrypted output valuation.
     */
    pub fn output_bytes(&self) -> Result<Vec<u8>> {
        with_session!(self, s => {
            bincode::serialize(&s.output_msg())
                .map_err(|e| Error::ParseError(e.to_string()))
        })
    }

    /**
     * Loads an encrypted output valuation.
     */
    pub fn load_output_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        with_session!(self, s => {
            let msg = bincode::deserialize(bytes)
                .map_err(|e| Error::ParseError(e.to_string()))?;
            s.load_output_msg(msg);
            Ok(())
        })
    }

    /**
     * Streams the bootstrapping key out-of-band; it can exceed the
     * envelope's size limit.
     */
    pub fn save_bootstrap_key(
        &self,
        writer: &mut dyn std::io::Write,
    ) -> Result<()> {
        with_session!(self, s => {
            let key = s
                .bootstrap_key
                .as_ref()
                .ok_or(Error::MissingArtifact("bootstrapping key"))?;
            let bytes = bincode::serialize(key)
                .map_err(|e| Error::ParseError(e.to_string()))?;
            writer
                .write_all(&bytes)
                .map_err(|e| Error::ParseError(e.to_string()))
        })
    }

    /**
     * Loads a bootstrapping key from its out-of-band byte stream.
     */
    pub fn load_bootstrap_key(
        &mut self,
        reader: &mut dyn std::io::Read,
    ) -> Result<()> {
        with_session!(self, s => {
            let mut bytes = Vec::new();
            reader
                .read_to_end(&mut bytes)
                .map_err(|e| Error::ParseError(e.to_string()))?;
            let key = bincode::deserialize(&bytes)
                .map_err(|e| Error::ParseError(e.to_string()))?;
            s.bootstrap_key = Some(key);
            Ok(())
        })
    }
}
