//! Constant folding. Materializes operations whose operands are all
//! constants and substitutes the result as a fresh constant node.

use std::rc::Rc;

use log::warn;

use fhelix_dag::attr::{
    ConstValue, ConstValueInt64, EncodeAtScale, Rotation,
};
use fhelix_dag::{
    forward_pass, ConstantValue, Dag, NodeIndex, NodeMapOptional, Op,
};

trait FoldElement: fhelix_dag::ConstantElement {
    fn constant_of(dag: &Dag, node: NodeIndex) -> Option<Rc<ConstantValue<Self>>>;
    fn make_constant(dag: &mut Dag, values: Vec<Self>) -> NodeIndex;
    fn add(a: Self, b: Self) -> Self;
    fn sub(a: Self, b: Self) -> Self;
    fn mul(a: Self, b: Self) -> Self;
    fn neg(a: Self) -> Self;
}

impl FoldElement for f64 {
    fn constant_of(dag: &Dag, node: NodeIndex) -> Option<Rc<ConstantValue<f64>>> {
        dag.node(node).get::<ConstValue>()
    }

    fn make_constant(dag: &mut Dag, values: Vec<f64>) -> NodeIndex {
        dag.make_dense_constant(values)
            .expect("folded vectors span the slot count")
    }

    fn add(a: f64, b: f64) -> f64 {
        a + b
    }

    fn sub(a: f64, b: f64) -> f64 {
        a - b
    }

    fn mul(a: f64, b: f64) -> f64 {
        a * b
    }

    fn neg(a: f64) -> f64 {
        -a
    }
}

impl FoldElement for i64 {
    fn constant_of(dag: &Dag, node: NodeIndex) -> Option<Rc<ConstantValue<i64>>> {
        dag.node(node).get::<ConstValueInt64>()
    }

    fn make_constant(dag: &mut Dag, values: Vec<i64>) -> NodeIndex {
        dag.make_int64_dense_constant(values)
            .expect("folded vectors span the slot count")
    }

    fn add(a: i64, b: i64) -> i64 {
        a.wrapping_add(b)
    }

    fn sub(a: i64, b: i64) -> i64 {
        a.wrapping_sub(b)
    }

    fn mul(a: i64, b: i64) -> i64 {
        a.wrapping_mul(b)
    }

    fn neg(a: i64) -> i64 {
        a.wrapping_neg()
    }
}

fn rotate_left<T: Copy>(input: &[T], shift: usize) -> Vec<T> {
    let shift = shift % input.len();
    let mut out = Vec::with_capacity(input.len());
    out.extend_from_slice(&input[shift..]);
    out.extend_from_slice(&input[..shift]);
    out
}

fn rotate_right<T: Copy>(input: &[T], shift: usize) -> Vec<T> {
    let shift = shift % input.len();
    rotate_left(input, input.len() - shift)
}

fn substitute<T: FoldElement>(
    dag: &mut Dag,
    scales: &mut NodeMapOptional<u32>,
    node: NodeIndex,
    values: Vec<T>,
    scale: u32,
) {
    let constant = T::make_constant(dag, values);
    scales.set(constant, scale);
    dag.node_mut(constant).set::<EncodeAtScale>(scale);
    dag.replace_all_uses_with(node, constant);
}

fn fold_constants<T: FoldElement>(
    dag: &mut Dag,
    scales: &mut NodeMapOptional<u32>,
) {
    forward_pass(dag, |dag, node| {
        if dag.node(node).num_operands() == 0 {
            return;
        }

        let args = dag.node(node).operands().to_vec();
        if args.iter().any(|a| dag.node(*a).op != Op::Constant) {
            return;
        }

        let expand = |dag: &Dag, arg: NodeIndex| -> Option<Vec<T>> {
            T::constant_of(dag, arg)
                .and_then(|c| c.expand_to(dag.vec_size() as usize).ok())
        };

        let op = dag.node(node).op;
        match op {
            Op::Add | Op::Sub | Op::Mul => {
                if args.len() != 2 {
                    return;
                }
                let (lhs, rhs) = match (
                    expand(dag, args[0]),
                    expand(dag, args[1]),
                ) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return,
                };

                let combine: fn(T, T) -> T = match op {
                    Op::Add => T::add,
                    Op::Sub => T::sub,
                    _ => T::mul,
                };
                let values = lhs
                    .iter()
                    .zip(rhs.iter())
                    .map(|(a, b)| combine(*a, *b))
                    .collect();

                let s0 = scales.get(args[0]).unwrap_or(0);
                let s1 = scales.get(args[1]).unwrap_or(0);
                // A product of encoded values carries the sum of the
                // operand scales; additive results keep the larger one.
                let scale = if op == Op::Mul { s0 + s1 } else { s0.max(s1) };

                substitute(dag, scales, node, values, scale);
            }
            Op::RotateLeftConst | Op::RotateRightConst => {
                let input = match expand(dag, args[0]) {
                    Some(v) => v,
                    None => return,
                };
                let shift =
                    dag.node(node).get::<Rotation>().unwrap_or(0) as usize;

                let values = if op == Op::RotateLeftConst {
                    rotate_left(&input, shift)
                } else {
                    rotate_right(&input, shift)
                };

                let scale = scales.get(args[0]).unwrap_or(0);
                substitute(dag, scales, node, values, scale);
            }
            Op::Negate => {
                let input = match expand(dag, args[0]) {
                    Some(v) => v,
                    None => return,
                };
                let values = input.iter().map(|a| T::neg(*a)).collect();
                let scale = scales.get(args[0]).unwrap_or(0);
                substitute(dag, scales, node, values, scale);
            }
            Op::Output | Op::Encode => {}
            Op::Relinearize | Op::ModSwitch | Op::Rescale => {
                warn!(
                    "encountered HE-specific operation {op} in unencrypted \
                     computation"
                );
            }
            _ => {}
        }
    });
}

/// Folds double-constant subgraphs (CKKS programs).
pub fn fold_f64_constants(dag: &mut Dag, scales: &mut NodeMapOptional<u32>) {
    fold_constants::<f64>(dag, scales);
}

/// Folds 64-bit integer constant subgraphs (BFV programs).
pub fn fold_i64_constants(dag: &mut Dag, scales: &mut NodeMapOptional<u32>) {
    fold_constants::<i64>(dag, scales);
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhelix_dag::DataType;

    fn seeded_scales(dag: &Dag) -> NodeMapOptional<u32> {
        let mut scales = NodeMapOptional::new(dag);
        for source in dag.sources() {
            scales.set(
                source,
                dag.node(source).get::<EncodeAtScale>().unwrap_or(60),
            );
        }
        scales
    }

    #[test]
    fn constant_addition_folds() {
        let mut dag = Dag::new("fold", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let a = dag.make_uniform_constant(2.0);
        let b = dag.make_uniform_constant(3.0);
        let sum = dag.make_node(Op::Add, &[a, b]);
        let mul = dag.make_node(Op::Mul, &[x, sum]);
        dag.make_output("out", mul);

        let mut scales = seeded_scales(&dag);
        fold_f64_constants(&mut dag, &mut scales);

        let folded = dag.node(mul).operand_at(1);
        assert_eq!(dag.node(folded).op, Op::Constant);
        let value = dag.node(folded).get::<ConstValue>().unwrap();
        assert_eq!(value.expand_to(4).unwrap(), vec![5.0; 4]);
    }

    #[test]
    fn folded_rotation_wraps() {
        let mut dag = Dag::new("fold", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let c = dag
            .make_dense_constant(vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let rot = dag.make_left_rotation(c, 1);
        let add = dag.make_node(Op::Add, &[x, rot]);
        dag.make_output("out", add);

        let mut scales = seeded_scales(&dag);
        fold_f64_constants(&mut dag, &mut scales);

        let folded = dag.node(add).operand_at(1);
        let value = dag.node(folded).get::<ConstValue>().unwrap();
        assert_eq!(
            value.expand_to(4).unwrap(),
            vec![2.0, 3.0, 4.0, 1.0]
        );
    }

    #[test]
    fn multiply_sums_operand_scales() {
        let mut dag = Dag::new("fold", 4).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let a = dag.make_uniform_constant(2.0);
        let b = dag.make_uniform_constant(3.0);
        let prod = dag.make_node(Op::Mul, &[a, b]);
        let add = dag.make_node(Op::Add, &[x, prod]);
        dag.make_output("out", add);

        let mut scales = NodeMapOptional::new(&dag);
        scales.set(a, 40);
        scales.set(b, 20);
        scales.set(x, 60);
        fold_f64_constants(&mut dag, &mut scales);

        let folded = dag.node(add).operand_at(1);
        assert_eq!(scales.get(folded), Some(60));
        assert_eq!(
            dag.node(folded).get::<EncodeAtScale>(),
            Some(60)
        );
    }

    #[test]
    fn folding_is_idempotent() {
        let build = || {
            let mut dag = Dag::new("fold", 4).unwrap();
            let x = dag.make_input("x", DataType::Cipher);
            let a = dag.make_uniform_constant(2.0);
            let b = dag.make_uniform_constant(3.0);
            let sum = dag.make_node(Op::Add, &[a, b]);
            let neg = dag.make_node(Op::Negate, &[sum]);
            let mul = dag.make_node(Op::Mul, &[x, neg]);
            dag.make_output("out", mul);
            dag
        };

        let mut once = build();
        let mut scales = seeded_scales(&once);
        fold_f64_constants(&mut once, &mut scales);
        super::super::clean_nodes(&mut once);

        let mut twice = build();
        let mut scales = seeded_scales(&twice);
        fold_f64_constants(&mut twice, &mut scales);
        super::super::clean_nodes(&mut twice);
        let mut scales = seeded_scales(&twice);
        fold_f64_constants(&mut twice, &mut scales);
        super::super::clean_nodes(&mut twice);

        assert_eq!(once, twice);
    }
}
