//! Multiplicative-depth counting.

use fhelix_dag::{forward_pass, Dag, DataType, NodeMap, Op};

/// The maximum number of ciphertext multiplications along any path from a
/// source to a named output. Plaintext-only multiplies do not count.
pub fn count_mult_depth(dag: &mut Dag, types: &NodeMap<DataType>) -> u32 {
    let mut counts: NodeMap<u32> = NodeMap::new(dag);

    forward_pass(dag, |dag, node| {
        let operands = dag.node(node).operands().to_vec();
        if operands.is_empty() {
            return;
        }

        let mut count = 0;
        let mut any_cipher = false;
        for operand in &operands {
            count = count.max(counts.get(*operand));
            if types.get(*operand) == DataType::Cipher {
                any_cipher = true;
            }
        }

        if dag.node(node).op == Op::Mul && any_cipher {
            count += 1;
        }

        counts.set(node, count);
    });

    dag.outputs()
        .values()
        .map(|output| counts.get(*output))
        .max()
        .unwrap_or(0)
}
