//! Modulus-switch insertion for CKKS.
//!
//! Runs backward, assigning every node a reverse level: sinks sit at zero
//! and each `Rescale` adds one toward the sources. When a node's uses
//! expect it at different levels, chains of `ModSwitch` nodes bridge the
//! gap so each use receives the operand at the level it expects. BFV
//! programs skip this pass entirely; their sources encode at level zero.

use std::collections::BTreeMap;

use fhelix_dag::attr::EncodeAtLevel;
use fhelix_dag::{
    backward_pass, Dag, DataType, NodeIndex, NodeMap, NodeMapOptional, Op,
};

fn insert_mod_switch(
    dag: &mut Dag,
    scales: &mut NodeMapOptional<u32>,
    levels: &mut NodeMap<u32>,
    node: NodeIndex,
    node_level: u32,
) -> NodeIndex {
    let switch = dag.make_node(Op::ModSwitch, &[node]);
    if let Some(scale) = scales.get(node) {
        scales.set(switch, scale);
    }
    levels.set(switch, node_level);
    switch
}

/// Inserts `ModSwitch` chains and finalizes `EncodeAtLevel` on every
/// source and `Encode` node: absolute levels count down from the maximum
/// reverse level, so they increase from the keys toward the outputs.
pub fn switch_moduli(
    dag: &mut Dag,
    types: &mut NodeMap<DataType>,
    scales: &mut NodeMapOptional<u32>,
) {
    let mut levels: NodeMap<u32> = NodeMap::new(dag);
    let mut encode_nodes: Vec<NodeIndex> = Vec::new();

    backward_pass(dag, |dag, node| {
        if dag.node(node).num_uses() == 0 {
            return;
        }

        if types.get(node) == DataType::Raw {
            return;
        }

        if dag.node(node).op == Op::Encode {
            encode_nodes.push(node);
        }

        let mut use_levels: BTreeMap<u32, Vec<NodeIndex>> = BTreeMap::new();
        for use_ in dag.node(node).uses() {
            use_levels
                .entry(levels.get(*use_))
                .or_default()
                .push(*use_);
        }

        let mut node_level = 0;
        if use_levels.len() > 1 {
            // Bridge from the highest expected level down; lower-level
            // uses take more mod-switches.
            let mut iter = use_levels.iter().rev();
            let (highest, _) = iter.next().unwrap();
            node_level = *highest;

            let mut temp = node;
            let mut temp_level = node_level;
            for (expected, uses) in iter {
                while temp_level > *expected {
                    temp = insert_mod_switch(
                        dag, scales, &mut levels, temp, temp_level,
                    );
                    temp_level -= 1;
                }
                for use_ in uses {
                    dag.replace_operand(*use_, node, temp);
                }
            }
        } else if let Some((level, _)) = use_levels.iter().next() {
            node_level = *level;
        }

        if dag.node(node).op == Op::Rescale {
            node_level += 1;
        }
        levels.set(node, node_level);
    });

    let sources = dag.sources();
    let max_level = sources
        .iter()
        .map(|s| levels.get(*s))
        .max()
        .unwrap_or(0);

    for source in sources {
        let level = max_level - levels.get(source);
        dag.node_mut(source).set::<EncodeAtLevel>(level);
    }

    for encode in encode_nodes {
        let level = max_level - levels.get(encode);
        dag.node_mut(encode).set::<EncodeAtLevel>(level);
    }
}
