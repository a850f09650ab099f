//! The transpile pipelines: scheme-independent preparation, then a
//! per-scheme transform/validate/parameter-selection sequence.

use log::debug;

use fhelix_dag::attr::{
    EncodeAtLevel, EncodeAtScale, Type,
};
use fhelix_dag::{Dag, DataType, NodeMap, NodeMapOptional, Op};

use crate::params::{
    depth_budget_params, finalize_params, select_prime_chain,
    EncryptionParams, PrimeConsumer,
};
use crate::signature::{EncodingInfo, Signature};
use crate::transforms::{
    clean_nodes, collect_rotation_keys, count_mult_depth,
    expand_reductions, fold_f64_constants, fold_i64_constants,
    infer_types, insert_encodes, insert_relinearizations, lower_u32_constants,
    reduce_chains, rescale_eager_waterline, switch_moduli, U32Target,
};
use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
/**
 * Everything a backend needs from compilation: the encryption parameters
 * and the per-input encoding signature.
 */
pub struct Transpiled {
    /**
     * The selected encryption parameters.
     */
    pub params: EncryptionParams,

    /**
     * The per-input encoding signature.
     */
    pub signature: Signature,
}

/**
 * The scheme-independent preparation run before a backend is chosen:
 * drops dead nodes, seeds source scales and output ranges, balances
 * reduction trees, and records the post-reduction multiplicative depth on
 * the DAG.
 */
pub fn prepare(dag: &mut Dag) -> Result<()> {
    debug!(
        "preparing {} (next index {})",
        dag.name(),
        dag.next_node_index()
    );

    clean_nodes(dag);
    dag.set_scale_range();

    let mut types = NodeMap::new(dag);
    infer_types(dag, &mut types);

    reduce_chains(dag);
    expand_reductions(dag, &mut types);
    infer_types(dag, &mut types);

    dag.after_reduction_depth = count_mult_depth(dag, &types);

    debug!(
        "prepared {}: depth {} (next index {})",
        dag.name(),
        dag.after_reduction_depth,
        dag.next_node_index()
    );

    Ok(())
}

fn seed_scales(dag: &Dag) -> Result<NodeMapOptional<u32>> {
    let mut scales = NodeMapOptional::new(dag);

    for source in dag.sources() {
        match dag.node(source).get::<EncodeAtScale>() {
            Some(scale) => scales.set(source, scale),
            None => {
                for (name, input) in dag.inputs() {
                    if *input == source {
                        return Err(Error::InputScaleNotSet(name.clone()));
                    }
                }
                return Err(Error::ConstScaleNotSet);
            }
        }
    }

    Ok(scales)
}

fn extract_signature(dag: &Dag) -> Signature {
    let mut inputs = std::collections::BTreeMap::new();

    for (name, node) in dag.inputs() {
        let node = dag.node(*node);
        inputs.insert(
            name.clone(),
            EncodingInfo {
                data_type: node.get::<Type>().unwrap_or(DataType::Cipher),
                scale: node.get::<EncodeAtScale>().unwrap_or(0),
                level: node.get::<EncodeAtLevel>().unwrap_or(0),
            },
        );
    }

    Signature {
        vec_size: dag.vec_size(),
        inputs,
    }
}

/**
 * Lowers a prepared DAG for SEAL-CKKS and selects its parameters:
 * constant folding, eager-waterline rescaling, encode insertion, lazy
 * relinearization, and modulus switching, followed by validation and the
 * rescale-driven prime chain.
 */
pub fn transpile_seal_ckks(dag: &mut Dag) -> Result<Transpiled> {
    lower_u32_constants(dag, U32Target::Double);

    let mut types = NodeMap::new(dag);
    infer_types(dag, &mut types);

    let mut scales = seed_scales(dag)?;

    fold_f64_constants(dag, &mut scales);
    rescale_eager_waterline(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    insert_encodes(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    insert_relinearizations(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    switch_moduli(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    let _levels = crate::validation::check_levels(dag, &types)?;
    crate::validation::check_parameters(dag, &types);
    crate::validation::check_scales(dag, &mut scales, &types);

    let prime_bits =
        select_prime_chain(dag, &scales, &types, PrimeConsumer::Rescale);
    let rotations = collect_rotation_keys(dag, &types);
    let params = finalize_params(dag, prime_bits, rotations, 2)?;

    Ok(Transpiled {
        params,
        signature: extract_signature(dag),
    })
}

/**
 * Lowers a prepared DAG for SEAL-BFV. BFV has no rescaling, so the
 * rescaler and mod-switcher are skipped: every source encodes at level
 * zero, and the prime chain charges half the default scale per ciphertext
 * multiplication as a conservative placeholder for noise growth.
 */
pub fn transpile_seal_bfv(dag: &mut Dag) -> Result<Transpiled> {
    lower_u32_constants(dag, U32Target::Int64);

    let mut types = NodeMap::new(dag);
    infer_types(dag, &mut types);

    let mut scales = seed_scales(dag)?;

    fold_i64_constants(dag, &mut scales);
    infer_types(dag, &mut types);

    insert_encodes(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    insert_relinearizations(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    let _levels = crate::validation::check_levels(dag, &types)?;
    crate::validation::check_parameters(dag, &types);

    let prime_bits =
        select_prime_chain(dag, &scales, &types, PrimeConsumer::Mul);
    let rotations = collect_rotation_keys(dag, &types);
    let params = finalize_params(dag, prime_bits, rotations, 1)?;

    Ok(Transpiled {
        params,
        signature: extract_signature(dag),
    })
}

/**
 * Lowers a prepared DAG for OpenFHE-CKKS. OpenFHE manages scales and
 * levels internally, so only constant folding and encode insertion run;
 * the parameters are a depth budget the library turns into a modulus
 * chain of its own. This is what lets programs too deep for the SEAL
 * tables still compile.
 */
pub fn transpile_openfhe_ckks(dag: &mut Dag) -> Result<Transpiled> {
    lower_u32_constants(dag, U32Target::Double);

    let mut types = NodeMap::new(dag);
    infer_types(dag, &mut types);

    let mut scales = seed_scales(dag)?;

    fold_f64_constants(dag, &mut scales);
    infer_types(dag, &mut types);

    insert_encodes(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    let rotations = collect_rotation_keys(dag, &types);
    let params = depth_budget_params(dag, rotations, 0);

    Ok(Transpiled {
        params,
        signature: extract_signature(dag),
    })
}

/**
 * Lowers a prepared DAG for OpenFHE-BFV: the same shallow pipeline as
 * OpenFHE-CKKS with integer constants and a fixed plaintext modulus.
 */
pub fn transpile_openfhe_bfv(dag: &mut Dag) -> Result<Transpiled> {
    lower_u32_constants(dag, U32Target::Int64);

    let mut types = NodeMap::new(dag);
    infer_types(dag, &mut types);

    let mut scales = seed_scales(dag)?;

    fold_i64_constants(dag, &mut scales);
    infer_types(dag, &mut types);

    insert_encodes(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    let rotations = collect_rotation_keys(dag, &types);
    let params = depth_budget_params(dag, rotations, OPENFHE_PLAIN_MODULUS);

    Ok(Transpiled {
        params,
        signature: extract_signature(dag),
    })
}

/*
 * 2^16 + 1, the usual NTT-friendly BFV plaintext modulus.
 */
const OPENFHE_PLAIN_MODULUS: u32 = 65537;

/**
 * Lowers a prepared DAG for the small-integer backend, which needs no
 * modulus chain: constants fold, and the parameters only carry the
 * rotation set as a zero-depth budget.
 */
pub fn transpile_small_int(dag: &mut Dag) -> Result<Transpiled> {
    lower_u32_constants(dag, U32Target::Double);

    let mut types = NodeMap::new(dag);
    infer_types(dag, &mut types);

    let mut scales = seed_scales(dag)?;
    fold_f64_constants(dag, &mut scales);
    infer_types(dag, &mut types);

    insert_encodes(dag, &mut types, &mut scales);
    infer_types(dag, &mut types);

    let params = EncryptionParams::DepthBudget {
        mult_depth: dag.after_reduction_depth,
        rotations: collect_rotation_keys(dag, &types),
        batch_size: dag.vec_size(),
        scaling_mod_size: 0,
        first_mod_size: 0,
        plain_modulus: 0,
    };

    Ok(Transpiled {
        params,
        signature: extract_signature(dag),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhelix_dag::attr::RescaleDivisor;
    use fhelix_dag::{DataType, DEFAULT_SCALE};

    fn depth_chain(dag: &mut Dag, depth: u32) {
        let x = dag.make_input("x", DataType::Cipher);
        let mut acc = dag.make_node(Op::Mul, &[x, x]);
        acc = dag.make_node(Op::Sub, &[acc, x]);
        for _ in 1..depth {
            acc = dag.make_node(Op::Mul, &[acc, x]);
            acc = dag.make_node(Op::Sub, &[acc, x]);
        }
        dag.make_output("out", acc);
    }

    #[test]
    fn prepare_counts_reduction_depth() {
        let mut dag = Dag::new("prep", 1024).unwrap();
        depth_chain(&mut dag, 11);

        prepare(&mut dag).unwrap();

        assert_eq!(dag.after_reduction_depth, 11);
    }

    #[test]
    fn seal_ckks_transpile_produces_aligned_program() {
        let mut dag = Dag::new("ckks", 1024).unwrap();
        depth_chain(&mut dag, 3);

        prepare(&mut dag).unwrap();
        let transpiled = transpile_seal_ckks(&mut dag).unwrap();

        // Every rescale divides out the default scale.
        for node in dag.node_indices() {
            if dag.node(node).op == Op::Rescale {
                assert_eq!(
                    dag.node(node).get::<RescaleDivisor>(),
                    Some(DEFAULT_SCALE)
                );
            }
        }

        // The chain ends with the key prime.
        match &transpiled.params {
            EncryptionParams::PrimeChain { prime_bits, .. } => {
                assert!(prime_bits.len() >= 3);
                assert_eq!(
                    prime_bits[prime_bits.len() - 1],
                    DEFAULT_SCALE
                );
            }
            other => panic!("expected a prime chain, got {other:?}"),
        }

        let info = transpiled.signature.inputs.get("x").unwrap();
        assert_eq!(info.data_type, DataType::Cipher);
        assert_eq!(info.scale, DEFAULT_SCALE);
    }

    #[test]
    fn seal_bfv_transpile_keeps_levels_flat() {
        let mut dag = Dag::new("bfv", 1024).unwrap();
        let x = dag.make_input("x", DataType::Cipher);
        let mul = dag.make_node(Op::Mul, &[x, x]);
        let add = dag.make_node(Op::Add, &[mul, x]);
        dag.make_output("out", add);

        prepare(&mut dag).unwrap();
        let transpiled = transpile_seal_bfv(&mut dag).unwrap();

        assert!(dag
            .node_indices()
            .all(|n| dag.node(n).op != Op::ModSwitch));
        assert!(dag
            .node_indices()
            .all(|n| dag.node(n).op != Op::Rescale));

        let info = transpiled.signature.inputs.get("x").unwrap();
        assert_eq!(info.level, 0);
    }

    #[test]
    fn deep_programs_exhaust_the_seal_tables() {
        let mut dag = Dag::new("deep", 1024).unwrap();
        depth_chain(&mut dag, 20);

        prepare(&mut dag).unwrap();
        let err = transpile_seal_ckks(&mut dag).unwrap_err();

        assert!(matches!(err, Error::BitBudgetExceeded { .. }));
    }

    #[test]
    fn openfhe_ckks_accepts_deep_programs() {
        let mut dag = Dag::new("deep", 1024).unwrap();
        depth_chain(&mut dag, 20);

        prepare(&mut dag).unwrap();
        let transpiled = transpile_openfhe_ckks(&mut dag).unwrap();

        match transpiled.params {
            EncryptionParams::DepthBudget {
                mult_depth,
                batch_size,
                ..
            } => {
                assert_eq!(mult_depth, 21);
                assert_eq!(batch_size, 1024);
            }
            other => panic!("expected a depth budget, got {other:?}"),
        }

        // No rescales or mod switches: the library schedules its own.
        assert!(dag
            .node_indices()
            .all(|n| dag.node(n).op != Op::Rescale));
    }
}
