//! The wire schema. Every top-level artifact (programs, parameter/key
//! bundles, encrypted valuations) is wrapped in a `KnownType` envelope
//! carrying the producer tag and format version, and dispatched by its
//! typed body on load.

use serde::{Deserialize, Serialize};

use fhelix_dag::serialize::{deserialize_nodes, serialize_nodes, DagNodesMsg};
use fhelix_dag::{dag_ref, Dag, DagRef, IYFC_FORMAT_VERSION};

use crate::scheme::Backend;
use crate::session::AloInfoMsg;
use crate::{Decision, Error, Result};

/**
 * The producer tag stamped on every envelope.
 */
pub const CREATOR_TAG: &str = "IYFC";

#[derive(Debug, Clone, Serialize, Deserialize)]
/**
 * A serialized DAG: its common settings, and, depending on the
 * serialization flags, the node graph and the scheme/key bundle.
 */
pub struct DagMsg {
    /**
     * The format version the message was written with.
     */
    pub version: u32,

    /**
     * The DAG's name.
     */
    pub name: String,

    /**
     * The slot count.
     */
    pub vec_size: u32,

    /**
     * The default scale.
     */
    pub scale: u32,

    /**
     * Whether the bootstrapping hook is enabled.
     */
    pub enable_bootstrap: bool,

    /**
     * The post-reduction multiplicative depth.
     */
    pub after_reduction_depth: u32,

    /**
     * The node graph, when `need_node_info` was raised.
     */
    pub nodes: Option<DagNodesMsg>,

    /**
     * The scheme/key bundle, when any artifact flag was raised.
     */
    pub alo: Option<AloMsg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/**
 * A serialized DAG group: the group's own message plus one message per
 * child.
 */
pub struct DagGroupMsg {
    /**
     * The group's own settings and artifact bundle.
     */
    pub base: DagMsg,

    /**
     * The children, by name.
     */
    pub children: Vec<(String, DagMsg)>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/**
 * One backend's artifact bundle, tagged with the backend's stable name.
 */
pub struct AloItemMsg {
    /**
     * The backend's stable name.
     */
    pub name: String,

    /**
     * The encoded [`AloInfoMsg`].
     */
    pub info: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/**
 * The scheme-parameter and key bundle of a compiled program.
 */
pub struct AloMsg {
    /**
     * One item per library the program uses.
     */
    pub items: Vec<AloItemMsg>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/**
 * A serialized encrypted input valuation.
 */
pub struct InputMsg {
    /**
     * The backend's stable name.
     */
    pub lib: String,

    /**
     * The backend-typed valuation bytes.
     */
    pub inputs: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/**
 * A serialized encrypted output valuation.
 */
pub struct OutputMsg {
    /**
     * The backend's stable name.
     */
    pub lib: String,

    /**
     * The backend-typed valuation bytes.
     */
    pub outputs: Vec<u8>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/**
 * The typed body of an envelope; loaders dispatch on the variant.
 */
pub enum KnownBody {
    /**
     * A serialized DAG.
     */
    Dag(DagMsg),

    /**
     * A serialized DAG group.
     */
    DagGroup(DagGroupMsg),

    /**
     * A scheme/key bundle on its own.
     */
    Alo(AloMsg),

    /**
     * An encrypted input valuation.
     */
    Input(InputMsg),

    /**
     * An encrypted output valuation.
     */
    Output(OutputMsg),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
/**
 * The envelope around every serialized artifact.
 */
pub struct KnownTypeMsg {
    /**
     * The producer tag; always [`CREATOR_TAG`].
     */
    pub creator: String,

    /**
     * The format version; bumped on incompatible schema changes.
     */
    pub version: u32,

    /**
     * The typed payload.
     */
    pub body: KnownBody,
}

/**
 * Wraps a body in the envelope and encodes it.
 */
pub fn to_bytes(body: KnownBody) -> Result<Vec<u8>> {
    let msg = KnownTypeMsg {
        creator: CREATOR_TAG.to_string(),
        version: IYFC_FORMAT_VERSION,
        body,
    };

    bincode::serialize(&msg).map_err(|e| Error::ParseError(e.to_string()))
}

/**
 * Decodes an envelope and verifies its producer tag and format version.
 */
pub fn from_bytes(bytes: &[u8]) -> Result<KnownBody> {
    let msg: KnownTypeMsg = bincode::deserialize(bytes)
        .map_err(|e| Error::ParseError(e.to_string()))?;

    if msg.creator != CREATOR_TAG || msg.version != IYFC_FORMAT_VERSION {
        return Err(Error::FormatMismatch {
            creator: msg.creator,
            version: msg.version,
        });
    }

    Ok(msg.body)
}

fn alo_msg(dag: &Dag, decision: &Decision) -> Result<AloMsg> {
    let info = decision.alo_info(&dag.serialize_options)?;
    let bytes = bincode::serialize(&info)
        .map_err(|e| Error::ParseError(e.to_string()))?;

    Ok(AloMsg {
        items: vec![AloItemMsg {
            name: decision.backend().name().to_string(),
            info: bytes,
        }],
    })
}

fn wants_alo(dag: &Dag) -> bool {
    let para = &dag.serialize_options;
    para.need_genkey_info
        || para.need_sig_info
        || para.need_exe_ctx
        || para.need_encrypt_ctx
        || para.need_decrypt_ctx
}

/**
 * Builds a DAG message honoring the DAG's serialization flags.
 */
pub fn dag_to_msg(
    dag: &Dag,
    decision: Option<&Decision>,
) -> Result<DagMsg> {
    let nodes = if dag.serialize_options.need_node_info {
        Some(serialize_nodes(dag))
    } else {
        None
    };

    let alo = match (wants_alo(dag), decision) {
        (true, Some(decision)) => Some(alo_msg(dag, decision)?),
        (true, None) => return Err(Error::NotCompiled),
        _ => None,
    };

    Ok(DagMsg {
        version: IYFC_FORMAT_VERSION,
        name: dag.name().to_string(),
        vec_size: dag.vec_size(),
        scale: dag.scale,
        enable_bootstrap: dag.enable_bootstrap,
        after_reduction_depth: dag.after_reduction_depth,
        nodes,
        alo,
    })
}

fn load_alo(msg: &AloMsg) -> Result<Decision> {
    let item = msg
        .items
        .first()
        .ok_or_else(|| Error::ParseError("empty alo bundle".into()))?;

    let backend = Backend::from_name(&item.name).ok_or_else(|| {
        Error::ParseError(format!("unknown backend `{}`", item.name))
    })?;

    let info: AloInfoMsg = bincode::deserialize(&item.info)
        .map_err(|e| Error::ParseError(e.to_string()))?;

    let mut decision = Decision::from_backend(backend);
    decision.load_alo_info(info);
    Ok(decision)
}

/**
 * Rebuilds a DAG (and its decision, when artifacts are present) from a
 * message.
 */
pub fn dag_from_msg(msg: &DagMsg) -> Result<(Dag, Option<Decision>)> {
    if msg.version != IYFC_FORMAT_VERSION {
        return Err(Error::FormatMismatch {
            creator: CREATOR_TAG.to_string(),
            version: msg.version,
        });
    }

    let mut dag = Dag::new(msg.name.clone(), msg.vec_size)
        .map_err(Error::IrError)?;
    dag.scale = msg.scale;
    dag.enable_bootstrap = msg.enable_bootstrap;
    dag.after_reduction_depth = msg.after_reduction_depth;

    if let Some(nodes) = &msg.nodes {
        deserialize_nodes(&mut dag, nodes).map_err(Error::IrError)?;
    }

    let decision = match &msg.alo {
        Some(alo) => Some(load_alo(alo)?),
        None => None,
    };

    Ok((dag, decision))
}

/**
 * Builds a group message: the group's own message plus one per child.
 */
pub fn group_to_msg(
    group: &Dag,
    decision: Option<&Decision>,
) -> Result<DagGroupMsg> {
    let base = dag_to_msg(group, decision)?;

    let mut children = Vec::new();
    for (name, child) in group.children() {
        let mut child = child.borrow_mut();
        // Children share the group's flags but never duplicate the alo
        // bundle; it lives on the group message.
        let saved = child.serialize_options;
        child.serialize_options = group.serialize_options;
        child.serialize_options.need_genkey_info = false;
        child.serialize_options.need_sig_info = false;
        child.serialize_options.need_exe_ctx = false;
        child.serialize_options.need_encrypt_ctx = false;
        child.serialize_options.need_decrypt_ctx = false;

        let msg = dag_to_msg(&child, None)?;
        child.serialize_options = saved;

        children.push((name.clone(), msg));
    }

    Ok(DagGroupMsg { base, children })
}

/**
 * Rebuilds a group and its children from a message, preserving the
 * shared index space.
 */
pub fn group_from_msg(
    msg: &DagGroupMsg,
) -> Result<(Dag, Option<Decision>)> {
    let mut group = Dag::new_group(
        msg.base.name.clone(),
        msg.base.vec_size,
    )
    .map_err(Error::IrError)?;
    group.scale = msg.base.scale;
    group.enable_bootstrap = msg.base.enable_bootstrap;
    group.after_reduction_depth = msg.base.after_reduction_depth;

    for (name, child_msg) in &msg.children {
        // A message saved without node info has nothing to rebuild; the
        // artifacts on the base are what such a copy exists to carry.
        if child_msg.nodes.is_none() {
            continue;
        }

        let (mut child, _) = dag_from_msg_with_base(
            child_msg,
            group.next_node_index(),
        )?;
        child.scale = group.scale;
        group
            .add_child(name.clone(), dag_ref(child))
            .map_err(Error::IrError)?;
    }

    let decision = match &msg.base.alo {
        Some(alo) => Some(load_alo(alo)?),
        None => None,
    };

    Ok((group, decision))
}

fn dag_from_msg_with_base(
    msg: &DagMsg,
    base_index: u64,
) -> Result<(Dag, Option<Decision>)> {
    let mut dag = Dag::new(msg.name.clone(), msg.vec_size)
        .map_err(Error::IrError)?;
    dag.set_next_node_index(base_index);
    dag.scale = msg.scale;
    dag.enable_bootstrap = msg.enable_bootstrap;
    dag.after_reduction_depth = msg.after_reduction_depth;

    if let Some(nodes) = &msg.nodes {
        deserialize_nodes(&mut dag, nodes).map_err(Error::IrError)?;
    }

    Ok((dag, None))
}

/**
 * Serializes a DAG or group, honoring its serialization flags.
 */
pub fn save_dag_to_bytes(
    dag: &Dag,
    decision: Option<&Decision>,
) -> Result<Vec<u8>> {
    let body = if dag.is_group() {
        KnownBody::DagGroup(group_to_msg(dag, decision)?)
    } else {
        KnownBody::Dag(dag_to_msg(dag, decision)?)
    };

    to_bytes(body)
}

/**
 * Loads a DAG or group saved with [`save_dag_to_bytes`].
 */
pub fn load_dag_from_bytes(
    bytes: &[u8],
) -> Result<(DagRef, Option<Decision>)> {
    match from_bytes(bytes)? {
        KnownBody::Dag(msg) => {
            let (dag, decision) = dag_from_msg(&msg)?;
            Ok((dag_ref(dag), decision))
        }
        KnownBody::DagGroup(msg) => {
            let (group, decision) = group_from_msg(&msg)?;
            Ok((dag_ref(group), decision))
        }
        _ => Err(Error::ParseError(
            "envelope does not contain a dag".into(),
        )),
    }
}

/**
 * Serializes the scheme/key bundle alone, honoring the DAG's flags.
 */
pub fn save_keys_to_bytes(
    dag: &Dag,
    decision: &Decision,
) -> Result<Vec<u8>> {
    to_bytes(KnownBody::Alo(alo_msg(dag, decision)?))
}

/**
 * Loads a scheme/key bundle into an existing decision, or builds a fresh
 * one for the named backend.
 */
pub fn load_keys_from_bytes(
    bytes: &[u8],
    decision: Option<&mut Decision>,
) -> Result<Option<Decision>> {
    let msg = match from_bytes(bytes)? {
        KnownBody::Alo(msg) => msg,
        _ => {
            return Err(Error::ParseError(
                "envelope does not contain a key bundle".into(),
            ))
        }
    };

    match decision {
        Some(existing) => {
            let item = msg
                .items
                .first()
                .ok_or_else(|| Error::ParseError("empty alo bundle".into()))?;
            let info: AloInfoMsg = bincode::deserialize(&item.info)
                .map_err(|e| Error::ParseError(e.to_string()))?;
            existing.load_alo_info(info);
            Ok(None)
        }
        None => Ok(Some(load_alo(&msg)?)),
    }
}

/**
 * Serializes the encrypted input valuation.
 */
pub fn save_input_to_bytes(decision: &Decision) -> Result<Vec<u8>> {
    to_bytes(KnownBody::Input(InputMsg {
        lib: decision.backend().name().to_string(),
        inputs: decision.input_bytes()?,
    }))
}

/**
 * Loads an encrypted input valuation into a decision.
 */
pub fn load_input_from_bytes(
    decision: &mut Decision,
    bytes: &[u8],
    replace: bool,
) -> Result<()> {
    match from_bytes(bytes)? {
        KnownBody::Input(msg) => {
            decision.load_input_bytes(&msg.inputs, replace)
        }
        _ => Err(Error::ParseError(
            "envelope does not contain an input valuation".into(),
        )),
    }
}

/**
 * Serializes the encrypted output valuation.
 */
pub fn save_output_to_bytes(decision: &Decision) -> Result<Vec<u8>> {
    to_bytes(KnownBody::Output(OutputMsg {
        lib: decision.backend().name().to_string(),
        outputs: decision.output_bytes()?,
    }))
}

/**
 * Loads an encrypted output valuation into a decision.
 */
pub fn load_output_from_bytes(
    decision: &mut Decision,
    bytes: &[u8],
) -> Result<()> {
    match from_bytes(bytes)? {
        KnownBody::Output(msg) => decision.load_output_bytes(&msg.outputs),
        _ => Err(Error::ParseError(
            "envelope does not contain an output valuation".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhelix_dag::{DagSerializePara, DataType, Op};

    fn sample_dag() -> Dag {
        let mut dag = Dag::new("wire", 8).unwrap();
        let x = dag.make_input("x", DataType::Cipher);
        let mul = dag.make_node(Op::Mul, &[x, x]);
        dag.make_output("out", mul);
        dag
    }

    #[test]
    fn envelopes_carry_the_producer_tag() {
        let mut dag = sample_dag();
        dag.serialize_options = DagSerializePara::new(
            true, false, false, false, false, false,
        );

        let bytes = save_dag_to_bytes(&dag, None).unwrap();
        let msg: KnownTypeMsg = bincode::deserialize(&bytes).unwrap();

        assert_eq!(msg.creator, "IYFC");
        assert_eq!(msg.version, IYFC_FORMAT_VERSION);
    }

    #[test]
    fn tampered_envelopes_are_rejected() {
        let mut dag = sample_dag();
        dag.serialize_options = DagSerializePara::new(
            true, false, false, false, false, false,
        );

        let bytes = save_dag_to_bytes(&dag, None).unwrap();
        let mut msg: KnownTypeMsg = bincode::deserialize(&bytes).unwrap();
        msg.creator = "EVIL".into();
        let bytes = bincode::serialize(&msg).unwrap();

        let err = load_dag_from_bytes(&bytes).unwrap_err();
        assert!(matches!(err, Error::FormatMismatch { .. }));
    }

    #[test]
    fn node_graphs_round_trip_through_the_envelope() {
        let mut dag = sample_dag();
        dag.serialize_options = DagSerializePara::new(
            true, false, false, false, false, false,
        );

        let bytes = save_dag_to_bytes(&dag, None).unwrap();
        let (restored, decision) = load_dag_from_bytes(&bytes).unwrap();

        assert!(decision.is_none());
        assert_eq!(*restored.borrow(), dag);
    }

    #[test]
    fn artifact_flags_without_a_decision_fail() {
        let mut dag = sample_dag();
        dag.serialize_options =
            DagSerializePara::new(true, true, false, false, false, false);

        let err = save_dag_to_bytes(&dag, None).unwrap_err();
        assert_eq!(err, Error::NotCompiled);
    }
}
