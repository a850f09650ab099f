//! Eager waterline rescaling for CKKS.

use log::trace;

use fhelix_dag::attr::EncodeAtScale;
use fhelix_dag::{
    forward_pass, Dag, DataType, NodeIndex, NodeMap, NodeMapOptional, Op,
};

fn insert_rescale(
    dag: &mut Dag,
    types: &mut NodeMap<DataType>,
    scales: &mut NodeMapOptional<u32>,
    node: NodeIndex,
    rescale_by: u32,
) -> NodeIndex {
    let rescale = dag.make_rescale(node, rescale_by);
    types.set(rescale, types.get(node));
    scales.set(rescale, scales.at(node) - rescale_by);
    dag.replace_other_uses_with(node, rescale);
    rescale
}

fn raw_scale(
    dag: &Dag,
    scales: &mut NodeMapOptional<u32>,
    node: NodeIndex,
) {
    let max = dag
        .node(node)
        .operands()
        .iter()
        .map(|o| scales.at(*o))
        .max();

    if let Some(max) = max {
        scales.set(node, max);
    }
}

/// Tracks per-node scale and keeps it under the waterline.
///
/// Multiplication sums the operand scales and, while the running scale
/// stays at or above `waterline + min_source_scale`, chains `Rescale`
/// nodes that each divide out the DAG's default scale. Addition takes the
/// maximum operand scale; any cipher addend sitting below it is scaled up
/// by a uniform constant of value one, which matches scales without
/// changing the plaintext.
pub fn rescale_eager_waterline(
    dag: &mut Dag,
    types: &mut NodeMap<DataType>,
    scales: &mut NodeMapOptional<u32>,
) {
    let mut min_scale = 0;
    for source in dag.sources() {
        min_scale = min_scale.max(scales.get(source).unwrap_or(0));
    }
    debug_assert_ne!(min_scale, 0);

    let fixed_rescale = dag.scale;

    forward_pass(dag, |dag, node| {
        if dag.node(node).num_operands() == 0 {
            return;
        }

        if types.get(node) == DataType::Raw {
            raw_scale(dag, scales, node);
            return;
        }

        let op = dag.node(node).op;
        if op == Op::Rescale {
            return;
        }

        if op != Op::Mul {
            scales.set(node, scales.at(dag.node(node).operand_at(0)));

            if op == Op::Add || op == Op::Sub {
                let operands = dag.node(node).operands().to_vec();
                let max_scale = operands
                    .iter()
                    .map(|o| scales.at(*o))
                    .max()
                    .unwrap_or(0);

                for operand in operands {
                    let operand_scale = scales.at(operand);
                    if operand_scale < max_scale
                        && types.get(operand) != DataType::Raw
                    {
                        trace!(
                            "scaling up {operand} from {operand_scale} to \
                             match addition operands at {max_scale}"
                        );

                        let one = dag.make_uniform_constant(1.0);
                        scales.set(one, max_scale - operand_scale);
                        dag.node_mut(one)
                            .set::<EncodeAtScale>(max_scale - operand_scale);
                        types.set(one, DataType::Raw);

                        let mul = dag.make_node(Op::Mul, &[operand, one]);
                        scales.set(mul, max_scale);
                        types.set(mul, types.get(operand));
                        dag.replace_operand(node, operand, mul);
                    }
                }

                scales.set(node, max_scale);
            }
            return;
        }

        let mut mult_scale: u32 = dag
            .node(node)
            .operands()
            .iter()
            .map(|o| scales.at(*o))
            .sum();
        debug_assert_ne!(mult_scale, 0);
        scales.set(node, mult_scale);

        let mut temp = node;
        while mult_scale >= fixed_rescale + min_scale {
            temp = insert_rescale(dag, types, scales, temp, fixed_rescale);
            mult_scale -= fixed_rescale;
            debug_assert_eq!(mult_scale, scales.at(temp));
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transforms::infer_types;
    use fhelix_dag::attr::RescaleDivisor;
    use fhelix_dag::DataType;

    fn seed(dag: &Dag) -> NodeMapOptional<u32> {
        let mut scales = NodeMapOptional::new(dag);
        for source in dag.sources() {
            scales.set(
                source,
                dag.node(source).get::<EncodeAtScale>().unwrap_or(0),
            );
        }
        scales
    }

    #[test]
    fn squaring_inserts_one_rescale() {
        let mut dag = Dag::new("rescale", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        dag.node_mut(x).set::<EncodeAtScale>(60);
        let mul = dag.make_node(Op::Mul, &[x, x]);
        let out = dag.make_output("out", mul);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);
        let mut scales = seed(&dag);

        rescale_eager_waterline(&mut dag, &mut types, &mut scales);

        // 60 + 60 = 120 >= 60 + 60, so exactly one rescale by 60.
        let rescale = dag.node(out).operand_at(0);
        assert_eq!(dag.node(rescale).op, Op::Rescale);
        assert_eq!(
            dag.node(rescale).get::<RescaleDivisor>(),
            Some(60)
        );
        assert_eq!(dag.node(rescale).operands(), &[mul]);
        assert_eq!(scales.at(rescale), 60);
        assert_eq!(scales.at(mul), 120);
    }

    #[test]
    fn mismatched_addends_are_scaled_up() {
        let mut dag = Dag::new("rescale", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        dag.node_mut(x).set::<EncodeAtScale>(60);
        let y = dag.make_input("y", DataType::Cipher);
        dag.node_mut(y).set::<EncodeAtScale>(40);
        let add = dag.make_node(Op::Add, &[x, y]);
        dag.make_output("out", add);

        let mut types = NodeMap::new(&dag);
        infer_types(&mut dag, &mut types);
        let mut scales = seed(&dag);

        rescale_eager_waterline(&mut dag, &mut types, &mut scales);

        assert_eq!(scales.at(add), 60);

        // y was multiplied by a scale-20 constant one.
        let scaled = dag.node(add).operand_at(1);
        assert_eq!(dag.node(scaled).op, Op::Mul);
        assert_eq!(scales.at(scaled), 60);
        let one = dag.node(scaled).operand_at(1);
        assert_eq!(
            dag.node(one).get::<EncodeAtScale>(),
            Some(20)
        );
    }
}
