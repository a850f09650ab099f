//! Post-transform validation. Levels are recomputed forward and checked as
//! a hard invariant; scale and prime-history oddities are logged, since
//! the scheduling passes are trusted to schedule correctly.

use log::warn;

use fhelix_dag::attr::{EncodeAtLevel, EncodeAtScale, RescaleDivisor};
use fhelix_dag::{
    forward_pass, Dag, DataType, NodeMap, NodeMapOptional, Op,
};

use crate::{Error, Result};

/// Recomputes every node's level from the sources and verifies that the
/// ciphertext operands of each node agree. A mismatch after the scheduling
/// passes is a compiler bug and fails compilation.
pub fn check_levels(
    dag: &mut Dag,
    types: &NodeMap<DataType>,
) -> Result<NodeMap<u32>> {
    let mut levels: NodeMap<u32> = NodeMap::new(dag);
    let mut failure: Option<Error> = None;

    forward_pass(dag, |dag, node| {
        if failure.is_some() {
            return;
        }

        let operands = dag.node(node).operands().to_vec();

        if operands.is_empty() {
            levels.set(
                node,
                dag.node(node).get::<EncodeAtLevel>().unwrap_or(0),
            );
            return;
        }

        let mut op_level = None;
        for operand in &operands {
            if types.get(*operand) == DataType::Cipher {
                let level = levels.get(*operand);
                match op_level {
                    None => op_level = Some(level),
                    Some(expected) if expected != level => {
                        failure = Some(Error::LevelMismatch {
                            node,
                            left: expected,
                            right: level,
                        });
                        return;
                    }
                    _ => {}
                }
            }
        }

        let mut level = op_level.unwrap_or(0);
        if matches!(dag.node(node).op, Op::Rescale | Op::ModSwitch) {
            level += 1;
        }
        levels.set(node, level);
    });

    match failure {
        Some(err) => Err(err),
        None => Ok(levels),
    }
}

/// Recomputes scales forward and logs anything the rescaler should have
/// prevented: unequal addition operands, zero scales, and rescales that do
/// not reduce by their divisor.
pub fn check_scales(
    dag: &mut Dag,
    scales: &mut NodeMapOptional<u32>,
    types: &NodeMap<DataType>,
) {
    forward_pass(dag, |dag, node| {
        if types.get(node) == DataType::Raw {
            return;
        }

        let op = dag.node(node).op;
        let operands = dag.node(node).operands().to_vec();

        let scale = match op {
            Op::Input | Op::Encode => {
                let scale =
                    dag.node(node).get::<EncodeAtScale>().unwrap_or(0);
                if scale == 0 {
                    if op == Op::Input {
                        warn!("dag has an input with zero scale");
                    } else {
                        warn!("compiled dag contains a zero-scale node");
                    }
                }
                scale
            }
            Op::Mul => {
                operands.iter().map(|o| scales.at(*o)).sum::<u32>()
            }
            Op::Rescale => {
                let divisor =
                    dag.node(node).get::<RescaleDivisor>().unwrap_or(0);
                scales.at(operands[0]).saturating_sub(divisor)
            }
            Op::Add | Op::Sub => {
                let mut scale = 0;
                for operand in &operands {
                    let operand_scale = scales.at(*operand);
                    if scale == 0 {
                        scale = operand_scale;
                    } else if scale != operand_scale {
                        warn!(
                            "addition or subtraction has operands of \
                             non-equal scale"
                        );
                    }
                }
                scale
            }
            _ => scales.at(operands[0]),
        };

        if scale == 0 && op != Op::Input {
            warn!("compiled dag contains a zero-scale node");
        }
        scales.set(node, scale);
    });
}

/// Accumulates the rescale/mod-switch prime history per node and verifies
/// consistency where operand chains merge. A `ModSwitch` contributes a
/// placeholder that any concrete prime may fill.
pub fn check_parameters(dag: &mut Dag, types: &NodeMap<DataType>) {
    let mut parms: NodeMap<Vec<u32>> = NodeMap::new(dag);

    forward_pass(dag, |dag, node| {
        if types.get(node) == DataType::Raw
            || dag.node(node).op == Op::Encode
        {
            return;
        }

        let operands = dag.node(node).operands().to_vec();
        let mut merged: Vec<u32> = Vec::new();

        if operands.is_empty() {
            let level = dag.node(node).get::<EncodeAtLevel>().unwrap_or(0);
            merged = vec![0; level as usize];
        } else {
            for operand in &operands {
                let op_parms = parms.get(*operand);
                if op_parms.is_empty() {
                    continue;
                }

                if merged.is_empty() {
                    merged = op_parms;
                    continue;
                }

                if merged.len() != op_parms.len() {
                    warn!(
                        "two operands require different numbers of primes"
                    );
                    continue;
                }

                for (slot, prime) in merged.iter_mut().zip(op_parms) {
                    if *slot == 0 {
                        *slot = prime;
                    } else if prime != 0 && *slot != prime {
                        warn!("primes required by two operands mismatch");
                    }
                }
            }

            match dag.node(node).op {
                Op::ModSwitch => merged.push(0),
                Op::Rescale => {
                    let divisor = dag
                        .node(node)
                        .get::<RescaleDivisor>()
                        .unwrap_or(0);
                    merged.push(divisor);
                }
                _ => {}
            }
        }

        parms.set(node, merged);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::infer_types;
    use fhelix_dag::DataType;

    #[test]
    fn aligned_levels_pass() {
        let mut dag = Dag::new("levels", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        dag.node_mut(x).set::<EncodeAtLevel>(0);
        let y = dag.make_input("y", DataType::Cipher);
        dag.node_mut(y).set::<EncodeAtLevel>(0);
        let add = dag.make_node(Op::Add, &[x, y]);
        dag.make_output("out", add);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);

        assert!(check_levels(&mut dag, &types).is_ok());
    }

    #[test]
    fn level_mismatches_are_hard_errors() {
        let mut dag = Dag::new("levels", 4).unwrap();

        // y enters one level deeper than x, and nothing bridges the gap.
        let x = dag.make_input("x", DataType::Cipher);
        dag.node_mut(x).set::<EncodeAtLevel>(0);
        let y = dag.make_input("y", DataType::Cipher);
        dag.node_mut(y).set::<EncodeAtLevel>(1);
        let add = dag.make_node(Op::Add, &[x, y]);
        dag.make_output("out", add);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);

        let err = check_levels(&mut dag, &types).unwrap_err();
        assert!(matches!(err, Error::LevelMismatch { .. }));
    }

    #[test]
    fn rescales_raise_the_level() {
        let mut dag = Dag::new("levels", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let mul = dag.make_node(Op::Mul, &[x, x]);
        let rescale = dag.make_rescale(mul, 60);
        dag.make_output("out", rescale);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);

        let levels = check_levels(&mut dag, &types).unwrap();
        assert_eq!(levels.get(mul), 0);
        assert_eq!(levels.get(rescale), 1);
    }
}
