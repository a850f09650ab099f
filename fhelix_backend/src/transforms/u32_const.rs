//! Lowers `U32Constant` nodes to vector constants of the scheme's element
//! type before scheme-specific transforms run.

use fhelix_dag::attr::{EncodeAtScale, Uint32Const};
use fhelix_dag::{forward_pass, Dag, Op};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
/// The element type `U32Constant` nodes lower to.
pub enum U32Target {
    /// Lower to dense double constants (CKKS).
    Double,
    /// Lower to dense 64-bit integer constants (BFV).
    Int64,
}

/// Replaces every `U32Constant` with an equivalent uniform vector constant
/// of the target element type. The husk is left for the next cleanup pass.
pub fn lower_u32_constants(dag: &mut Dag, target: U32Target) {
    forward_pass(dag, |dag, node| {
        if dag.node(node).op != Op::U32Constant {
            return;
        }

        let value = dag.node(node).get::<Uint32Const>().unwrap_or(0);

        let replacement = match target {
            U32Target::Double => dag.make_uniform_constant(value as f64),
            U32Target::Int64 => dag
                .make_int64_dense_constant(vec![value as i64])
                .expect("a single value divides every slot count"),
        };

        // Baseline scale seeding ran before this pass; fresh constants
        // carry their own.
        let scale = dag
            .node(node)
            .get::<EncodeAtScale>()
            .unwrap_or(dag.scale);
        dag.node_mut(replacement).set::<EncodeAtScale>(scale);

        dag.replace_all_uses_with(node, replacement);
    });
}
