//! Type inference. Must re-run whenever a pass mutates the graph.

use fhelix_dag::attr::Type;
use fhelix_dag::{forward_pass, Dag, DataType, NodeMap, Op};

/// Propagates [`DataType`] forward through `types`: constants are `Raw`,
/// inputs keep their declared type, encodes are `Plain`, and every other
/// node takes the strongest class among its operands
/// (`Cipher` > `Plain` > `Raw`).
pub fn infer_types(dag: &mut Dag, types: &mut NodeMap<DataType>) {
    forward_pass(dag, |dag, node| {
        let ty = match dag.node(node).op {
            Op::Constant | Op::U32Constant => DataType::Raw,
            Op::Input => dag
                .node(node)
                .get::<Type>()
                .unwrap_or(DataType::Cipher),
            Op::Encode => DataType::Plain,
            _ => {
                let mut ty = DataType::Raw;
                for operand in dag.node(node).operands() {
                    match types.get(*operand) {
                        DataType::Cipher => {
                            ty = DataType::Cipher;
                            break;
                        }
                        DataType::Plain => ty = DataType::Plain,
                        _ => {}
                    }
                }
                ty
            }
        };

        types.set(node, ty);
    });
}
