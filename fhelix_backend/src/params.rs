//! Encryption-parameter selection: coefficient-modulus prime chains,
//! rotation-key sets, and the polynomial degree from the HE-standard
//! tables.

use std::collections::BTreeSet;

use log::debug;

use fhelix_dag::attr::{Range, RescaleDivisor};
use fhelix_dag::{
    forward_pass, Dag, DataType, NodeMap, NodeMapOptional, Op,
};

use crate::{Error, Result};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * The encryption parameters a compiled program requires. The SEAL
 * backends take an explicit coefficient-modulus prime chain and a
 * polynomial degree from the HE-standard tables; the OpenFHE backends
 * take a multiplicative-depth budget and derive their own chain.
 */
pub enum EncryptionParams {
    /**
     * An explicit prime chain, output prime first, key prime last.
     */
    PrimeChain {
        /**
         * Bit sizes of the coefficient-modulus primes.
         */
        prime_bits: Vec<u32>,

        /**
         * Signed rotation steps needing Galois keys.
         */
        rotations: BTreeSet<i32>,

        /**
         * The polynomial modulus degree `N`.
         */
        poly_modulus_degree: u64,
    },

    /**
     * A depth budget for libraries that derive the modulus chain
     * themselves.
     */
    DepthBudget {
        /**
         * The multiplicative depth the keys must support.
         */
        mult_depth: u32,

        /**
         * Signed rotation steps needing Galois keys.
         */
        rotations: BTreeSet<i32>,

        /**
         * Slots packed per ciphertext.
         */
        batch_size: u32,

        /**
         * Bits per scaling modulus.
         */
        scaling_mod_size: u32,

        /**
         * Bits of the first modulus.
         */
        first_mod_size: u32,

        /**
         * The plaintext modulus; zero for approximate schemes.
         */
        plain_modulus: u32,
    },
}

impl EncryptionParams {
    /**
     * The rotation steps key generation must cover.
     */
    pub fn rotations(&self) -> &BTreeSet<i32> {
        match self {
            EncryptionParams::PrimeChain { rotations, .. } => rotations,
            EncryptionParams::DepthBudget { rotations, .. } => rotations,
        }
    }

    /**
     * Total bits across the prime chain; zero for depth budgets.
     */
    pub fn total_bits(&self) -> u32 {
        match self {
            EncryptionParams::PrimeChain { prime_bits, .. } => {
                prime_bits.iter().sum()
            }
            EncryptionParams::DepthBudget { .. } => 0,
        }
    }
}

/*
 * The HE-standard tables: for each (security level, quantum-safe) pair,
 * the largest total coefficient-modulus bit count permitted at each
 * polynomial degree.
 */
const DEGREES: [u64; 6] = [1024, 2048, 4096, 8192, 16384, 32768];

const MAX_BITS_128_CLASSIC: [u32; 6] = [27, 54, 109, 218, 438, 881];
const MAX_BITS_128_QUANTUM: [u32; 6] = [25, 51, 101, 202, 411, 827];
const MAX_BITS_192_CLASSIC: [u32; 6] = [19, 37, 75, 152, 305, 611];
const MAX_BITS_192_QUANTUM: [u32; 6] = [17, 35, 70, 141, 284, 570];
const MAX_BITS_256_CLASSIC: [u32; 6] = [14, 29, 58, 118, 237, 476];
const MAX_BITS_256_QUANTUM: [u32; 6] = [13, 27, 54, 109, 220, 443];

static_assertions::const_assert_eq!(
    MAX_BITS_128_CLASSIC[5],
    fhelix_dag::MAX_SEAL_BITS
);

fn standard_table(
    sec_level: u32,
    quantum_safe: bool,
) -> Result<&'static [u32; 6]> {
    Ok(match (sec_level, quantum_safe) {
        (0..=128, false) => &MAX_BITS_128_CLASSIC,
        (0..=128, true) => &MAX_BITS_128_QUANTUM,
        (129..=192, false) => &MAX_BITS_192_CLASSIC,
        (129..=192, true) => &MAX_BITS_192_QUANTUM,
        (193..=256, false) => &MAX_BITS_256_CLASSIC,
        (193..=256, true) => &MAX_BITS_256_QUANTUM,
        _ => return Err(Error::SecurityLevelUnsupported(sec_level)),
    })
}

/**
 * The smallest tabulated degree whose bit allowance covers `bit_count` at
 * the given security level.
 */
pub fn min_degree_for_bits(
    sec_level: u32,
    quantum_safe: bool,
    bit_count: u32,
) -> Result<u64> {
    let table = standard_table(sec_level, quantum_safe)?;

    for (degree, max_bits) in DEGREES.iter().zip(table.iter()) {
        if *max_bits >= bit_count {
            return Ok(*degree);
        }
    }

    Err(Error::BitBudgetExceeded {
        required: bit_count,
        available: table[table.len() - 1],
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/**
 * Which operations consume a coefficient-modulus prime.
 */
pub enum PrimeConsumer {
    /**
     * CKKS: every `Rescale` consumes its divisor.
     */
    Rescale,

    /**
     * BFV: every ciphertext multiplication is charged half the default
     * scale. This is a conservative placeholder; precise BFV noise
     * budgeting is deferred.
     */
    Mul,
}

/**
 * Accumulates, per node, the prime chain consumed along the longest
 * operand chain, then builds the final coefficient modulus:
 *
 * 1. Primes covering the widest output (`Range + scale`), split into
 *    `default_scale`-sized pieces when it exceeds the default scale.
 * 2. The longest interior chain found among outputs.
 * 3. A final key prime equal to the largest prime seen.
 */
pub fn select_prime_chain(
    dag: &mut Dag,
    scales: &NodeMapOptional<u32>,
    types: &NodeMap<DataType>,
    consumer: PrimeConsumer,
) -> Vec<u32> {
    let mut chains: NodeMap<Vec<u32>> = NodeMap::new(dag);
    let default_scale = dag.scale;

    forward_pass(dag, |dag, node| {
        if types.get(node) == DataType::Raw
            || dag.node(node).op == Op::Encode
        {
            return;
        }

        let operands = dag.node(node).operands().to_vec();
        if operands.is_empty() {
            return;
        }

        let mut chain: Vec<u32> = Vec::new();
        for operand in &operands {
            let op_chain = chains.get(*operand);
            if op_chain.len() > chain.len() {
                chain = op_chain;
            }
        }

        let consumed = match consumer {
            PrimeConsumer::Rescale if dag.node(node).op == Op::Rescale => {
                dag.node(node).get::<RescaleDivisor>()
            }
            PrimeConsumer::Mul if dag.node(node).op == Op::Mul => {
                Some(default_scale / 2)
            }
            _ => None,
        };

        if let Some(consumed) = consumed {
            debug_assert_ne!(consumed, 0);
            chain.push(consumed);
        }

        chains.set(node, chain);
    });

    let mut max_output_size = 0;
    let mut max_prime = 0;
    let mut max_len = 0;

    for output in dag.outputs().values() {
        let range = dag.node(*output).get::<Range>().unwrap_or(0);
        let size = range + scales.get(*output).unwrap_or(0);
        max_output_size = max_output_size.max(size);

        let chain = chains.get(*output);
        max_len = max_len.max(chain.len());
        for prime in chain {
            max_prime = max_prime.max(prime);
        }
    }

    debug_assert_ne!(max_output_size, 0);

    let mut primes = Vec::new();

    if max_output_size > default_scale {
        max_prime = default_scale;
        while max_output_size >= default_scale {
            primes.push(default_scale);
            max_output_size -= default_scale;
        }
        if max_output_size > 0 {
            primes.push(max_output_size.max(20));
        }
    } else {
        max_prime = max_prime.max(max_output_size);
        primes.push(max_prime);
    }

    for output in dag.outputs().values() {
        let chain = chains.get(*output);
        if chain.len() == max_len {
            primes.extend(chain.iter().rev());
            break;
        }
    }

    // The key prime.
    primes.push(max_prime);

    primes
}

/**
 * Completes parameter selection: looks the total chain width up in the
 * standard tables and reconciles the derived slot count with the DAG's.
 * A larger derived count is transparently emulated by tiling; a smaller
 * one forces the degree up to twice the requested vector size.
 */
pub fn finalize_params(
    dag: &mut Dag,
    prime_bits: Vec<u32>,
    rotations: BTreeSet<i32>,
    slots_per_degree: u64,
) -> Result<EncryptionParams> {
    let bit_count: u32 = prime_bits.iter().sum();

    let mut degree =
        min_degree_for_bits(dag.sec_level, dag.quantum_safe, bit_count)?;

    let slots = degree / slots_per_degree;
    if slots > dag.vec_size() as u64 {
        debug!(
            "dag {} uses vector size {} while {} slots are available; \
             the smaller size is emulated by tiling",
            dag.name(),
            dag.vec_size(),
            slots
        );
    }
    if slots < dag.vec_size() as u64 {
        degree = 2 * dag.vec_size() as u64;
    }

    debug!(
        "encryption parameters for {}: Q = {:?} ({} bits), N = {}, \
         rotations = {:?}",
        dag.name(),
        prime_bits,
        bit_count,
        degree,
        rotations
    );

    Ok(EncryptionParams::PrimeChain {
        prime_bits,
        rotations,
        poly_modulus_degree: degree,
    })
}

/**
 * Builds a depth budget for the OpenFHE backends: the post-reduction
 * multiplicative depth plus one level of headroom, the DAG's slot count
 * as batch size, and scaling moduli carved from the default scale.
 */
pub fn depth_budget_params(
    dag: &Dag,
    rotations: BTreeSet<i32>,
    plain_modulus: u32,
) -> EncryptionParams {
    EncryptionParams::DepthBudget {
        mult_depth: dag.after_reduction_depth + 1,
        rotations,
        batch_size: dag.vec_size(),
        scaling_mod_size: dag.scale - 1,
        first_mod_size: dag.scale,
        plain_modulus,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn degree_search_walks_the_table() {
        assert_eq!(min_degree_for_bits(128, false, 27).unwrap(), 1024);
        assert_eq!(min_degree_for_bits(128, false, 28).unwrap(), 2048);
        assert_eq!(min_degree_for_bits(128, false, 180).unwrap(), 8192);
        assert_eq!(min_degree_for_bits(128, false, 881).unwrap(), 32768);
    }

    #[test]
    fn oversized_budgets_are_rejected() {
        let err = min_degree_for_bits(128, false, 882).unwrap_err();
        assert!(matches!(err, Error::BitBudgetExceeded { .. }));

        // Quantum-safe tables are tighter.
        assert!(min_degree_for_bits(128, true, 850).is_err());
    }

    #[test]
    fn higher_security_needs_larger_degrees() {
        assert_eq!(min_degree_for_bits(128, false, 100).unwrap(), 4096);
        assert_eq!(min_degree_for_bits(192, false, 100).unwrap(), 8192);
        assert_eq!(min_degree_for_bits(256, false, 100).unwrap(), 8192);
    }

    #[test]
    fn unsupported_levels_are_rejected() {
        assert!(matches!(
            min_degree_for_bits(384, false, 100),
            Err(Error::SecurityLevelUnsupported(384))
        ));
    }

    #[test]
    fn prime_chain_for_one_rescale() {
        use crate::transforms::infer_types;
        use fhelix_dag::attr::EncodeAtScale;
        use fhelix_dag::DataType;

        let mut dag = Dag::new("params", 4).unwrap();
        let x = dag.make_input("x", DataType::Cipher);
        dag.node_mut(x).set::<EncodeAtScale>(60);
        let mul = dag.make_node(Op::Mul, &[x, x]);
        let rescale = dag.make_rescale(mul, 60);
        let out = dag.make_output("out", rescale);
        dag.node_mut(out).set::<Range>(60);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);

        let mut scales = NodeMapOptional::new(&dag);
        scales.set(x, 60);
        scales.set(mul, 120);
        scales.set(rescale, 60);
        scales.set(out, 60);

        let primes = select_prime_chain(
            &mut dag,
            &scales,
            &types,
            PrimeConsumer::Rescale,
        );

        // Output needs 60 + 60 = 120 bits: two default-scale primes,
        // then the interior rescale prime, then the key prime.
        assert_eq!(primes, vec![60, 60, 60, 60]);
    }
}
