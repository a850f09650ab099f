//! Dead-node elimination.

use fhelix_dag::{backward_pass, Dag, Op};

fn can_clean(op: Op) -> bool {
    // Unused inputs stay addressable by name.
    op != Op::Input && op != Op::Output
}

/// Drops every node with zero uses whose kind permits it. Runs backward so
/// that removing a sink exposes the nodes it used as new sinks in the same
/// pass.
pub fn clean_nodes(dag: &mut Dag) {
    backward_pass(dag, |dag, node| {
        if dag.node(node).num_uses() == 0 && can_clean(dag.node(node).op) {
            dag.remove_node(node);
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhelix_dag::DataType;

    #[test]
    fn unused_chains_are_dropped() {
        let mut dag = Dag::new("clean", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let keep = dag.make_node(Op::Negate, &[x]);
        dag.make_output("out", keep);

        // A dangling chain nothing consumes.
        let dead1 = dag.make_node(Op::Negate, &[x]);
        let dead2 = dag.make_node(Op::Negate, &[dead1]);
        let _ = dead2;

        clean_nodes(&mut dag);

        assert!(!dag.contains(dead1));
        assert!(!dag.contains(dead2));
        assert!(dag.contains(keep));
    }

    #[test]
    fn unused_inputs_survive() {
        let mut dag = Dag::new("clean", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let unused = dag.make_input("y", DataType::Cipher);
        let neg = dag.make_node(Op::Negate, &[x]);
        dag.make_output("out", neg);

        clean_nodes(&mut dag);

        assert!(dag.contains(unused));
        assert_eq!(dag.input("y").unwrap(), unused);
    }
}
