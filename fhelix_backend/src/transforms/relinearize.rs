//! Lazy relinearization: delay degree reduction until a use actually
//! needs a degree-two ciphertext.

use fhelix_dag::{
    forward_pass, Dag, DataType, NodeIndex, NodeMap, NodeMapOptional, Op,
};

fn all_operands_encrypted(
    dag: &Dag,
    types: &NodeMap<DataType>,
    node: NodeIndex,
) -> bool {
    dag.node(node)
        .operands()
        .iter()
        .all(|o| types.get(*o) == DataType::Cipher)
}

fn is_encrypted_mult(
    dag: &Dag,
    types: &NodeMap<DataType>,
    node: NodeIndex,
) -> bool {
    dag.node(node).op == Op::Mul
        && all_operands_encrypted(dag, types, node)
}

/// Marks the output of every cipher-by-cipher multiplication as pending
/// relinearization and forwards the mark along single-use chains. An
/// explicit `Relinearize` node is inserted as soon as any use is another
/// cipher multiply, a rotation, an output, or the pending node fans out to
/// multiple distinct uses.
pub fn insert_relinearizations(
    dag: &mut Dag,
    types: &mut NodeMap<DataType>,
    scales: &mut NodeMapOptional<u32>,
) {
    let mut pending: NodeMap<bool> = NodeMap::new(dag);

    forward_pass(dag, |dag, node| {
        if dag.node(node).num_operands() == 0 {
            return;
        }

        if is_encrypted_mult(dag, types, node) {
            pending.set(node, true);
        } else if !pending.get(node) {
            return;
        }

        let uses = dag.node(node).uses().to_vec();
        if uses.is_empty() {
            return;
        }

        let first_use = uses[0];
        let must_insert = uses.iter().any(|use_| {
            is_encrypted_mult(dag, types, *use_)
                || dag.node(*use_).op.is_rotation()
                || dag.node(*use_).op == Op::Output
                || *use_ != first_use
        });

        if must_insert {
            let relin = dag.make_node(Op::Relinearize, &[node]);
            types.set(relin, types.get(node));
            if let Some(scale) = scales.get(node) {
                scales.set(relin, scale);
            }
            dag.replace_other_uses_with(node, relin);
        } else {
            for use_ in uses {
                pending.set(use_, true);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::infer_types;
    use fhelix_dag::DataType;

    fn relinearized(dag: &mut Dag) {
        let mut types = NodeMap::new(dag);
        infer_types(dag, &mut types);
        let mut scales = NodeMapOptional::new(dag);
        insert_relinearizations(dag, &mut types, &mut scales);
    }

    #[test]
    fn chained_multiplies_relinearize_between() {
        let mut dag = Dag::new("relin", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let m1 = dag.make_node(Op::Mul, &[x, x]);
        let m2 = dag.make_node(Op::Mul, &[m1, x]);
        dag.make_output("out", m2);

        relinearized(&mut dag);

        // m1 feeds another cipher multiply, so it is relinearized; m2
        // feeds the output, so it is too.
        let relin1 = dag.node(m2).operand_at(0);
        assert_eq!(dag.node(relin1).op, Op::Relinearize);
        assert_eq!(dag.node(relin1).operands(), &[m1]);
    }

    #[test]
    fn additions_forward_the_pending_mark() {
        let mut dag = Dag::new("relin", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let y = dag.make_input("y", DataType::Cipher);
        let mul = dag.make_node(Op::Mul, &[x, y]);
        let add = dag.make_node(Op::Add, &[mul, mul]);
        let out = dag.make_output("out", add);

        relinearized(&mut dag);

        // The mul's only distinct use is the add, so relinearization is
        // deferred to the add, which feeds the output.
        assert_eq!(dag.node(add).operands(), &[mul, mul]);
        let relin = dag.node(out).operand_at(0);
        assert_eq!(dag.node(relin).op, Op::Relinearize);
        assert_eq!(dag.node(relin).operands(), &[add]);
    }

    #[test]
    fn rotations_force_relinearization() {
        let mut dag = Dag::new("relin", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let mul = dag.make_node(Op::Mul, &[x, x]);
        let rot = dag.make_left_rotation(mul, 1);
        dag.make_output("out", rot);

        relinearized(&mut dag);

        let relin = dag.node(rot).operand_at(0);
        assert_eq!(dag.node(relin).op, Op::Relinearize);
    }

    #[test]
    fn plain_multiplies_do_not_relinearize() {
        let mut dag = Dag::new("relin", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let c = dag.make_uniform_constant(2.0);
        let mul = dag.make_node(Op::Mul, &[x, c]);
        dag.make_output("out", mul);

        relinearized(&mut dag);

        assert!(dag
            .node_indices()
            .all(|n| dag.node(n).op != Op::Relinearize));
    }
}
