//! Reduction balancing: flatten chains of one associative operator into a
//! single many-operand node, then rebuild a balanced binary tree.

use std::collections::BTreeMap;

use log::warn;

use fhelix_dag::attr::EncodeAtScale;
use fhelix_dag::{
    forward_pass, Dag, DataType, NodeIndex, NodeMap, Op,
};

fn is_reduction_op(op: Op) -> bool {
    op == Op::Add || op == Op::Mul
}

/// Absorbs chains: an internal `Add` or `Mul` whose only use is another
/// node of the same kind donates its operands to that use and drops out of
/// the chain. After this pass, runs of one operator appear as single
/// many-operand nodes.
pub fn reduce_chains(dag: &mut Dag) {
    forward_pass(dag, |dag, node| {
        if !dag.node(node).is_internal()
            || !is_reduction_op(dag.node(node).op)
        {
            return;
        }

        let uses = dag.node(node).uses().to_vec();
        if uses.len() != 1 {
            return;
        }

        let use_ = uses[0];
        if dag.node(use_).op != dag.node(node).op {
            return;
        }

        while dag.erase_operand(use_, node) {
            for operand in dag.node(node).operands().to_vec() {
                dag.add_operand(use_, operand);
            }
        }

        if dag.node(node).num_uses() == 0 {
            dag.erase_all_operands(node);
        }
    });
}

/// Rebuilds every node with more than two operands as a balanced binary
/// tree of the same operator. Operands are ordered raw and plain first,
/// then ciphers by ascending scale, which minimizes multiplicative depth
/// for products and keeps scale ladders equal on both sides of additions.
pub fn expand_reductions(dag: &mut Dag, types: &mut NodeMap<DataType>) {
    let mut scale: NodeMap<u32> = NodeMap::new(dag);

    forward_pass(dag, |dag, node| {
        let op = dag.node(node).op;

        if op == Op::Rescale || op == Op::ModSwitch {
            warn!(
                "reduction expansion assumes rescaling has not run yet; \
                 scale is used as a proxy for level"
            );
            return;
        }

        let operands = dag.node(node).operands().to_vec();

        if operands.is_empty() {
            scale.set(
                node,
                dag.node(node).get::<EncodeAtScale>().unwrap_or(0),
            );
        } else if op == Op::Mul {
            let sum = operands.iter().map(|o| scale.get(*o)).sum();
            scale.set(node, sum);
        } else {
            let max = operands.iter().map(|o| scale.get(*o)).max();
            scale.set(node, max.unwrap_or(0));
        }

        if !is_reduction_op(op) || operands.len() <= 2 {
            return;
        }

        let mut sorted: BTreeMap<u64, Vec<NodeIndex>> = BTreeMap::new();
        for operand in &operands {
            let order = match types.get(*operand) {
                DataType::Plain | DataType::Raw => 1,
                DataType::Cipher => 2 + scale.get(*operand) as u64,
                DataType::Undef => 0,
            };
            sorted.entry(order).or_default().push(*operand);
        }

        let mut current: Vec<NodeIndex> =
            sorted.into_values().flatten().collect();

        while current.len() > 2 {
            let mut next = Vec::with_capacity(current.len() / 2 + 1);
            let mut i = 0;

            while i + 1 < current.len() {
                let inner =
                    dag.make_node(op, &[current[i], current[i + 1]]);
                types.set(inner, DataType::Undef);
                next.push(inner);
                i += 2;
            }
            if i < current.len() {
                next.push(current[i]);
            }

            current = next;
        }

        dag.set_operands(node, current);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::infer_types;
    use fhelix_dag::DataType;

    #[test]
    fn chains_flatten_into_one_node() {
        let mut dag = Dag::new("reduce", 8).unwrap();

        let a = dag.make_input("a", DataType::Cipher);
        let b = dag.make_input("b", DataType::Cipher);
        let c = dag.make_input("c", DataType::Cipher);
        let d = dag.make_input("d", DataType::Cipher);

        let m1 = dag.make_node(Op::Mul, &[a, b]);
        let m2 = dag.make_node(Op::Mul, &[m1, c]);
        let m3 = dag.make_node(Op::Mul, &[m2, d]);
        let out = dag.make_output("out", m3);

        reduce_chains(&mut dag);

        assert_eq!(dag.node(m3).num_operands(), 4);
        assert_eq!(dag.node(out).operands(), &[m3]);
        assert_eq!(dag.node(m1).num_uses(), 0);
    }

    #[test]
    fn expansion_rebuilds_balanced_trees() {
        let mut dag = Dag::new("reduce", 8).unwrap();

        let inputs: Vec<_> = (0..4)
            .map(|i| {
                let n =
                    dag.make_input(format!("x{i}"), DataType::Cipher);
                dag.node_mut(n).set::<EncodeAtScale>(60);
                n
            })
            .collect();

        let m1 = dag.make_node(Op::Mul, &[inputs[0], inputs[1]]);
        let m2 = dag.make_node(Op::Mul, &[m1, inputs[2]]);
        let m3 = dag.make_node(Op::Mul, &[m2, inputs[3]]);
        let out = dag.make_output("out", m3);
        let _ = out;

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);

        reduce_chains(&mut dag);
        expand_reductions(&mut dag, &mut types);
        infer_types(&mut dag, &mut types);

        // The root now holds two operands, each a product of two inputs:
        // depth two instead of three.
        assert_eq!(dag.node(m3).num_operands(), 2);
        for operand in dag.node(m3).operands() {
            assert_eq!(dag.node(*operand).op, Op::Mul);
            assert_eq!(dag.node(*operand).num_operands(), 2);
            for leaf in dag.node(*operand).operands() {
                assert!(inputs.contains(leaf));
            }
        }
    }

    #[test]
    fn raw_operands_sort_before_ciphers() {
        let mut dag = Dag::new("reduce", 8).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        dag.node_mut(x).set::<EncodeAtScale>(60);
        let y = dag.make_input("y", DataType::Cipher);
        dag.node_mut(y).set::<EncodeAtScale>(60);
        let c = dag.make_uniform_constant(1.0);
        dag.node_mut(c).set::<EncodeAtScale>(30);

        let add = dag.make_node(Op::Add, &[x, y, c]);
        dag.make_output("out", add);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);
        expand_reductions(&mut dag, &mut types);

        // The raw constant pairs with the first cipher; the remaining
        // cipher stays at the root.
        let operands = dag.node(add).operands().to_vec();
        assert_eq!(operands.len(), 2);
        assert_eq!(dag.node(operands[0]).op, Op::Add);
        assert_eq!(
            dag.node(operands[0]).operands()[0],
            c
        );
    }
}
