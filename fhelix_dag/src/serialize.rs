//! The serialization schema for node graphs. Nodes are finalized in
//! post-order from the sinks and referenced by their finalized indices,
//! so a message is independent of the arena's sparse numbering.

use std::collections::HashMap;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

use crate::attr::{is_valid_attr, AttrKey, AttrValue};
use crate::{ConstantValue, Dag, DataType, Error, NodeIndex, Op, Result};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/**
 * The serialized payload of one attribute. Deserialization verifies the
 * `(key, value)` pairing before accepting it.
 */
pub enum AttrValueMsg {
    /**
     * An unsigned 32-bit integer payload.
     */
    U32(u32),

    /**
     * A signed 32-bit integer payload.
     */
    I32(i32),

    /**
     * A [`DataType`] payload.
     */
    Type(DataType),

    /**
     * A double vector literal payload.
     */
    Const(ConstantValue<f64>),

    /**
     * A 64-bit integer vector literal payload.
     */
    ConstInt64(ConstantValue<i64>),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/**
 * One serialized attribute.
 */
pub struct AttrMsg {
    /**
     * The attribute key.
     */
    pub key: AttrKey,

    /**
     * The attribute payload.
     */
    pub value: AttrValueMsg,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/**
 * One serialized node: its opcode and the finalized indices of its
 * operands, which always precede it in the message stream.
 */
pub struct NodeMsg {
    /**
     * The operation code; see [`Op::code`].
     */
    pub op: u32,

    /**
     * Operand positions as finalized indices.
     */
    pub operands: Vec<u64>,

    /**
     * The node's attributes.
     */
    pub attrs: Vec<AttrMsg>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/**
 * The serialized node graph of one DAG. Nodes are finalized in post-order
 * from the sinks, so every operand index refers to an earlier entry.
 */
pub struct DagNodesMsg {
    /**
     * The DAG's name.
     */
    pub name: String,

    /**
     * The nodes, operands before users.
     */
    pub nodes: Vec<NodeMsg>,

    /**
     * Input names with their finalized node indices.
     */
    pub inputs: Vec<(String, u64)>,

    /**
     * Output names with their finalized node indices.
     */
    pub outputs: Vec<(String, u64)>,
}

fn attr_to_msg(key: AttrKey, value: &AttrValue) -> AttrMsg {
    let value = match value {
        AttrValue::U32(v) => AttrValueMsg::U32(*v),
        AttrValue::I32(v) => AttrValueMsg::I32(*v),
        AttrValue::Type(v) => AttrValueMsg::Type(*v),
        AttrValue::Const(v) => AttrValueMsg::Const((**v).clone()),
        AttrValue::ConstInt64(v) => AttrValueMsg::ConstInt64((**v).clone()),
    };

    AttrMsg { key, value }
}

fn attr_from_msg(msg: &AttrMsg) -> Result<(AttrKey, AttrValue)> {
    let value = match &msg.value {
        AttrValueMsg::U32(v) => AttrValue::U32(*v),
        AttrValueMsg::I32(v) => AttrValue::I32(*v),
        AttrValueMsg::Type(v) => AttrValue::Type(*v),
        AttrValueMsg::Const(v) => AttrValue::Const(Rc::new(v.clone())),
        AttrValueMsg::ConstInt64(v) => {
            AttrValue::ConstInt64(Rc::new(v.clone()))
        }
    };

    if !is_valid_attr(msg.key, &value) {
        log::warn!(
            "invalid attribute encountered: key {} ({})",
            msg.key,
            crate::attr::attr_name(msg.key)
        );
        return Err(Error::InvalidAttr(msg.key));
    }

    Ok((msg.key, value))
}

/**
 * Serializes `dag`'s node graph. Nodes reachable from the sinks are
 * finalized in post-order and assigned consecutive indices as they are
 * emitted; operand references use those finalized indices, so the message
 * is independent of the arena's sparse numbering.
 */
pub fn serialize_nodes(dag: &Dag) -> DagNodesMsg {
    let mut indices: HashMap<NodeIndex, u64> = HashMap::new();
    let mut nodes = Vec::new();

    for index in dag.post_order() {
        let node = dag.node(index);

        let operands = node
            .operands()
            .iter()
            .map(|o| indices[o])
            .collect::<Vec<_>>();

        let attrs = node
            .attrs()
            .iter()
            .map(|(key, value)| attr_to_msg(*key, value))
            .collect::<Vec<_>>();

        indices.insert(index, nodes.len() as u64);
        nodes.push(NodeMsg {
            op: node.op.code(),
            operands,
            attrs,
        });
    }

    let name_map = |entries: &std::collections::BTreeMap<
        String,
        NodeIndex,
    >|
     -> Vec<(String, u64)> {
        entries
            .iter()
            .filter_map(|(name, node)| {
                indices.get(node).map(|i| (name.clone(), *i))
            })
            .collect()
    };

    DagNodesMsg {
        name: dag.name().to_string(),
        nodes,
        inputs: name_map(dag.local_inputs()),
        outputs: name_map(dag.local_outputs()),
    }
}

/**
 * Rebuilds a node graph into `dag`, which must be freshly constructed.
 * Nodes are allocated in message order, resolving operand references to
 * already-constructed nodes. Returns the created indices in message order.
 */
pub fn deserialize_nodes(
    dag: &mut Dag,
    msg: &DagNodesMsg,
) -> Result<Vec<NodeIndex>> {
    let mut created = Vec::with_capacity(msg.nodes.len());

    for node_msg in &msg.nodes {
        let op = Op::from_code(node_msg.op)
            .ok_or(Error::UnknownOpCode(node_msg.op))?;

        let node = dag.make_node(op, &[]);

        for operand in &node_msg.operands {
            let resolved = *created
                .get(*operand as usize)
                .ok_or(Error::BadOperandIndex(*operand))?;
            dag.add_operand(node, resolved);
        }

        for attr in &node_msg.attrs {
            let (key, value) = attr_from_msg(attr)?;
            if matches!(value, AttrValue::ConstInt64(_)) {
                dag.has_int64 = true;
            }
            dag.node_mut(node).attrs.set_raw(key, value);
        }

        created.push(node);
    }

    for (name, index) in &msg.inputs {
        let resolved = *created
            .get(*index as usize)
            .ok_or(Error::BadOperandIndex(*index))?;
        dag.register_input(name.clone(), resolved);
    }

    for (name, index) in &msg.outputs {
        let resolved = *created
            .get(*index as usize)
            .ok_or(Error::BadOperandIndex(*index))?;
        dag.register_output(name.clone(), resolved);
    }

    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attr::{Attr, EncodeAtScale, Rotation};

    fn sample_dag() -> Dag {
        let mut dag = Dag::new("sample", 8).unwrap();

        let x = dag.make_input("x", DataType::Cipher);
        let c = dag.make_dense_constant(vec![1.0, 2.0]).unwrap();
        let rot = dag.make_left_rotation(x, 3);
        let add = dag.make_node(Op::Add, &[rot, c]);
        let mul = dag.make_node(Op::Mul, &[add, add]);
        dag.make_output("out", mul);
        dag.node_mut(x).set::<EncodeAtScale>(60);

        dag
    }

    #[test]
    fn round_trip_preserves_structure() {
        let dag = sample_dag();

        let msg = serialize_nodes(&dag);

        let mut restored = Dag::new(dag.name(), dag.vec_size()).unwrap();
        deserialize_nodes(&mut restored, &msg).unwrap();

        assert_eq!(dag, restored);
    }

    #[test]
    fn round_trip_survives_byte_encoding() {
        let dag = sample_dag();

        let bytes = bincode::serialize(&serialize_nodes(&dag)).unwrap();
        let msg: DagNodesMsg = bincode::deserialize(&bytes).unwrap();

        let mut restored = Dag::new(dag.name(), dag.vec_size()).unwrap();
        deserialize_nodes(&mut restored, &msg).unwrap();

        assert_eq!(dag, restored);
    }

    #[test]
    fn round_trip_is_independent_of_sparse_indices() {
        let mut dag = Dag::new("sparse", 8).unwrap();
        dag.set_next_node_index(100);
        let x = dag.make_input("x", DataType::Cipher);
        let rot = dag.make_right_rotation(x, 1);
        dag.make_output("out", rot);

        let msg = serialize_nodes(&dag);
        assert_eq!(msg.nodes.len(), 3);

        let mut restored = Dag::new("sparse", 8).unwrap();
        let created = deserialize_nodes(&mut restored, &msg).unwrap();

        assert_eq!(created[0].raw(), 0);
        assert_eq!(dag, restored);
        assert_eq!(
            restored.node(created[1]).get::<Rotation>(),
            Some(1)
        );
    }

    #[test]
    fn unknown_op_codes_are_rejected() {
        let msg = DagNodesMsg {
            name: "bad".into(),
            nodes: vec![NodeMsg {
                op: 99,
                operands: vec![],
                attrs: vec![],
            }],
            inputs: vec![],
            outputs: vec![],
        };

        let mut dag = Dag::new("bad", 4).unwrap();
        let err = deserialize_nodes(&mut dag, &msg).unwrap_err();

        assert_eq!(err, Error::UnknownOpCode(99));
    }

    #[test]
    fn mismatched_attr_payloads_are_rejected() {
        let msg = DagNodesMsg {
            name: "bad".into(),
            nodes: vec![NodeMsg {
                op: Op::Input.code(),
                operands: vec![],
                attrs: vec![AttrMsg {
                    key: crate::attr::Rotation::KEY,
                    value: AttrValueMsg::Type(DataType::Raw),
                }],
            }],
            inputs: vec![],
            outputs: vec![],
        };

        let mut dag = Dag::new("bad", 4).unwrap();
        let err = deserialize_nodes(&mut dag, &msg).unwrap_err();

        assert!(matches!(err, Error::InvalidAttr(_)));
    }
}
