//! Rotation-key collection: the set of Galois steps key generation must
//! cover.

use std::collections::BTreeSet;

use fhelix_dag::attr::Rotation;
use fhelix_dag::{forward_pass, Dag, DataType, NodeMap, Op};

/// Walks the DAG and records `+k` for every left rotation of a ciphertext
/// and `-k` for every right rotation. Rotations over raw vectors are
/// evaluated slot-wise at runtime and need no keys.
pub fn collect_rotation_keys(
    dag: &mut Dag,
    types: &NodeMap<DataType>,
) -> BTreeSet<i32> {
    let mut keys = BTreeSet::new();

    forward_pass(dag, |dag, node| {
        let op = dag.node(node).op;
        if !op.is_rotation() || types.get(node) == DataType::Raw {
            return;
        }

        let rotation = dag.node(node).get::<Rotation>().unwrap_or(0) as i32;
        keys.insert(if op == Op::RotateRightConst {
            -rotation
        } else {
            rotation
        });
    });

    keys
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::infer_types;
    use fhelix_dag::DataType;

    #[test]
    fn cipher_rotations_are_recorded_signed() {
        let mut dag = Dag::new("keys", 8).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let l = dag.make_left_rotation(x, 2);
        let r = dag.make_right_rotation(x, 3);
        let add = dag.make_node(Op::Add, &[l, r]);
        dag.make_output("out", add);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);

        let keys = collect_rotation_keys(&mut dag, &types);
        assert_eq!(keys.into_iter().collect::<Vec<_>>(), vec![-3, 2]);
    }

    #[test]
    fn raw_rotations_are_ignored() {
        let mut dag = Dag::new("keys", 8).unwrap();

        let c = dag.make_uniform_constant(1.0);
        let rot = dag.make_left_rotation(c, 1);
        let x = dag.make_input("x", DataType::Cipher);
        let add = dag.make_node(Op::Add, &[x, rot]);
        dag.make_output("out", add);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);

        let keys = collect_rotation_keys(&mut dag, &types);
        assert!(keys.is_empty());
    }
}
