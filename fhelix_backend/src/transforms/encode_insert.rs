//! Encode insertion: raw operands of cipher operations become explicit
//! `Encode` nodes so the executor can hand them to the backend encoder.

use fhelix_dag::attr::EncodeAtScale;
use fhelix_dag::{
    forward_pass, Dag, DataType, NodeMap, NodeMapOptional, Op,
};

fn is_arith_op(op: Op) -> bool {
    matches!(op, Op::Add | Op::Sub | Op::Mul | Op::Div)
}

/// For every operation mixing a cipher operand with a raw one, wraps the
/// raw operand in an `Encode` node of type `Plain`.
///
/// The encode's scale depends on context: additive operations encode at
/// the cipher operand's scale so the addition lines up, multiplicative
/// operations encode at the raw operand's own scale.
pub fn insert_encodes(
    dag: &mut Dag,
    types: &mut NodeMap<DataType>,
    scales: &mut NodeMapOptional<u32>,
) {
    forward_pass(dag, |dag, node| {
        let op = dag.node(node).op;
        if !is_arith_op(op) || dag.node(node).num_operands() != 2 {
            return;
        }

        let operands = dag.node(node).operands().to_vec();
        let tys: Vec<DataType> =
            operands.iter().map(|o| types.get(*o)).collect();

        let (cipher_pos, raw_pos) = if tys[0] == DataType::Cipher
            && tys[1] == DataType::Raw
        {
            (0, 1)
        } else if tys[0] == DataType::Raw && tys[1] == DataType::Cipher {
            (1, 0)
        } else {
            return;
        };

        // Schemes without a rescaler never assign interior scales; those
        // encode at zero, which their encoders ignore.
        let raw = operands[raw_pos];
        let scale = if op == Op::Add || op == Op::Sub {
            scales.get(operands[cipher_pos]).unwrap_or(0)
        } else {
            scales.get(raw).unwrap_or(0)
        };

        let encode = dag.make_node(Op::Encode, &[raw]);
        dag.node_mut(encode).set::<EncodeAtScale>(scale);
        types.set(encode, DataType::Plain);
        scales.set(encode, scale);

        dag.replace_operand(node, raw, encode);
    });
}
