use crate::{Dag, NodeIndex, NodeMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/**
 * Visits every node of `dag` with predecessors before successors: a node
 * is ready once all of its operands have been visited. The visitor may
 * mutate the graph: replace operands, splice in new nodes, or delete the
 * node it was handed.
 *
 * New sources the visitor creates mid-traversal (for example the constant
 * nodes constant folding substitutes in) are picked up by a leaf re-scan
 * after every visit, so they are not skipped.
 */
pub fn forward_pass<F>(dag: &mut Dag, visitor: F)
where
    F: FnMut(&mut Dag, NodeIndex),
{
    traverse(dag, Direction::Forward, visitor);
}

/**
 * Visits every node of `dag` with users before the nodes they use: a node
 * is ready once all of its uses have been visited. Same mutation contract
 * as [`forward_pass`].
 */
pub fn backward_pass<F>(dag: &mut Dag, visitor: F)
where
    F: FnMut(&mut Dag, NodeIndex),
{
    traverse(dag, Direction::Backward, visitor);
}

fn traverse<F>(dag: &mut Dag, direction: Direction, mut visitor: F)
where
    F: FnMut(&mut Dag, NodeIndex),
{
    let mut ready: NodeMap<bool> = NodeMap::new(dag);
    let mut processed: NodeMap<bool> = NodeMap::new(dag);

    let leaves = |dag: &Dag| match direction {
        Direction::Forward => dag.sources(),
        Direction::Backward => dag.sinks(),
    };

    let successors = |dag: &Dag, node: NodeIndex| -> Vec<NodeIndex> {
        match direction {
            Direction::Forward => dag.node(node).uses().to_vec(),
            Direction::Backward => dag.node(node).operands().to_vec(),
        }
    };

    let predecessors_done = |dag: &Dag,
                             processed: &NodeMap<bool>,
                             node: NodeIndex|
     -> bool {
        let preds = match direction {
            Direction::Forward => dag.node(node).operands(),
            Direction::Backward => dag.node(node).uses(),
        };
        preds.iter().all(|p| processed.get(*p))
    };

    let mut ready_nodes = leaves(dag);
    for node in &ready_nodes {
        ready.set(*node, true);
    }

    while let Some(node) = ready_nodes.pop() {
        if !dag.contains(node) {
            continue;
        }

        // Successors as they were before the visit; the visitor may detach
        // or delete this node.
        let mut check_list = successors(dag, node);

        visitor(dag, node);

        if dag.contains(node) {
            processed.set(node, true);
            check_list.extend(successors(dag, node));
        }

        // Leaves that appeared mid-traversal become ready immediately.
        for leaf in leaves(dag) {
            if !ready.get(leaf) {
                ready.set(leaf, true);
                ready_nodes.push(leaf);
            }
        }

        for succ in check_list {
            if dag.contains(succ)
                && !ready.get(succ)
                && predecessors_done(dag, &processed, succ)
            {
                ready.set(succ, true);
                ready_nodes.push(succ);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{DataType, Op};

    fn simple_dag() -> (Dag, Vec<NodeIndex>) {
        let mut dag = Dag::new("traverse", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let c = dag.make_uniform_constant(7.0);
        let add = dag.make_node(Op::Add, &[x, c]);
        let mul = dag.make_node(Op::Mul, &[add, add]);
        let out = dag.make_output("out", mul);

        (dag, vec![x, c, add, mul, out])
    }

    #[test]
    fn forward_visits_operands_first() {
        let (mut dag, nodes) = simple_dag();
        let mut visited = vec![];

        forward_pass(&mut dag, |_, n| visited.push(n));

        assert_eq!(visited.len(), 5);
        let pos =
            |n: NodeIndex| visited.iter().position(|v| *v == n).unwrap();
        assert!(pos(nodes[0]) < pos(nodes[2]));
        assert!(pos(nodes[1]) < pos(nodes[2]));
        assert!(pos(nodes[2]) < pos(nodes[3]));
        assert!(pos(nodes[3]) < pos(nodes[4]));
    }

    #[test]
    fn backward_visits_uses_first() {
        let (mut dag, nodes) = simple_dag();
        let mut visited = vec![];

        backward_pass(&mut dag, |_, n| visited.push(n));

        assert_eq!(visited.len(), 5);
        let pos =
            |n: NodeIndex| visited.iter().position(|v| *v == n).unwrap();
        assert!(pos(nodes[4]) < pos(nodes[3]));
        assert!(pos(nodes[3]) < pos(nodes[2]));
        assert!(pos(nodes[2]) < pos(nodes[0]));
        assert!(pos(nodes[2]) < pos(nodes[1]));
    }

    #[test]
    fn nodes_are_visited_exactly_once() {
        let (mut dag, _) = simple_dag();
        let mut counts = std::collections::HashMap::new();

        forward_pass(&mut dag, |_, n| {
            *counts.entry(n).or_insert(0) += 1;
        });

        assert!(counts.values().all(|c| *c == 1));
    }

    #[test]
    fn new_sources_created_mid_pass_are_visited() {
        let (mut dag, nodes) = simple_dag();
        let add = nodes[2];
        let mut visited = vec![];
        let mut replacement = None;

        forward_pass(&mut dag, |dag, n| {
            visited.push(n);
            if n == add {
                // Substitute a fresh constant for the addition, the way
                // constant folding does.
                let c = dag.make_uniform_constant(9.0);
                dag.replace_all_uses_with(add, c);
                replacement = Some(c);
            }
        });

        assert!(visited.contains(&replacement.unwrap()));
    }

    #[test]
    fn deletion_during_traversal_is_safe() {
        let (mut dag, nodes) = simple_dag();
        let out = nodes[4];
        let mut visited = vec![];

        backward_pass(&mut dag, |dag, n| {
            visited.push(n);
            if n == out {
                dag.remove_node(out);
            }
        });

        assert!(!dag.contains(out));
        assert_eq!(visited.len(), 5);
    }
}
