#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! fhelix is a homomorphic-encryption compiler and runtime dispatcher.
//! Programs are arithmetic expressions over encrypted vectors, built
//! through operator overloading, lowered through a DAG of typed
//! operations, and dispatched to one of five backend libraries: CKKS and
//! BFV on two libraries each, plus a TFHE-like small-integer library.
//!
//! # Examples
//! ```ignore
//! let dag = init_dag("square");
//! let x = set_input(&dag, "x");
//! set_output(&dag, "out", x.clone() * x + 1.0)?;
//!
//! compile(&dag)?;
//! gen_keys(&dag)?;
//!
//! let mut inputs = Valuation::new();
//! inputs.insert("x".to_string(), Value::F64(2.0));
//! encrypt(&dag, &inputs, false)?;
//! execute(&dag)?;
//!
//! let outputs = decrypt(&dag)?;
//! ```
//!
//! Every artifact (the DAG itself, keys, signatures, and encrypted
//! valuations) serializes independently, so graph construction, key
//! generation, evaluation, and decryption can run in different processes
//! or at different parties.

use std::cell::RefCell;
use std::rc::Rc;

use fhelix_dag::{dag_ref, Dag, DagRef};
use fhelix_runtime::serialization;
use fhelix_runtime::Decision;

pub use fhelix_dag::{
    DagSerializePara, DataType, Expr, NodeIndex, Op, CMP_BIT_LEN,
    CMP_DAG_SIZE, CMP_P,
    DEFAULT_Q_CNT, DEFAULT_SCALE, FFT_N, IYFC_FORMAT_VERSION,
    LEVELS_BEFORE_BOOTSTRAP, MAX_CMP_NUM, MAX_MULT_DEPTH_NO_BOOT,
    MAX_SEAL_BITS, REDUCE_SCALE,
};
pub use fhelix_runtime::{Backend, Error, Result, Valuation, Value};

/**
 * The kinds of artifacts serialized out-of-band, outside the usual
 * envelope, because they can exceed its size limit.
 */
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerializeDataType {
    /**
     * A bootstrapping key.
     */
    BootstrappingKey,
}

struct HandleInner {
    ir: DagRef,
    decision: Option<Decision>,
    parent: Option<DagHandle>,
}

#[derive(Clone)]
/**
 * A shared handle to a program. Cloning is cheap; all clones refer to the
 * same DAG and, after compilation, the same scheme decision. A child of a
 * [`init_dag_group`] group resolves its decision through the group, so
 * every member computes under one key set.
 */
pub struct DagHandle(Rc<RefCell<HandleInner>>);

impl DagHandle {
    fn new(ir: DagRef) -> Self {
        Self(Rc::new(RefCell::new(HandleInner {
            ir,
            decision: None,
            parent: None,
        })))
    }

    fn ir(&self) -> DagRef {
        self.0.borrow().ir.clone()
    }

    fn decision_owner(&self) -> DagHandle {
        let parent = self.0.borrow().parent.clone();
        match parent {
            Some(parent) => parent.decision_owner(),
            None => self.clone(),
        }
    }

    fn with_decision<R>(
        &self,
        f: impl FnOnce(&mut Option<Decision>) -> R,
    ) -> R {
        let owner = self.decision_owner();
        let mut inner = owner.0.borrow_mut();
        f(&mut inner.decision)
    }

    fn require_decision<R>(
        &self,
        f: impl FnOnce(&mut Decision) -> Result<R>,
    ) -> Result<R> {
        self.with_decision(|decision| match decision {
            Some(decision) => f(decision),
            None => Err(Error::NotCompiled),
        })
    }
}

/**
 * Creates an empty program with the default slot count of 1024.
 */
pub fn init_dag(name: impl Into<String>) -> DagHandle {
    init_dag_sized(name, 1024).expect("1024 is a power of two")
}

/**
 * Creates an empty program with an explicit slot count, which must be a
 * non-zero power of two.
 */
pub fn init_dag_sized(
    name: impl Into<String>,
    vec_size: u32,
) -> Result<DagHandle> {
    let dag = Dag::new(name, vec_size).map_err(Error::IrError)?;
    Ok(DagHandle::new(dag_ref(dag)))
}

/**
 * Creates an empty program group with the default slot count. Children
 * attached via [`add_dag`] share one index space, one parameter choice,
 * and one key set.
 */
pub fn init_dag_group(name: impl Into<String>) -> DagHandle {
    init_dag_group_sized(name, 1024).expect("1024 is a power of two")
}

/**
 * Creates an empty program group with an explicit slot count.
 */
pub fn init_dag_group_sized(
    name: impl Into<String>,
    vec_size: u32,
) -> Result<DagHandle> {
    let dag = Dag::new_group(name, vec_size).map_err(Error::IrError)?;
    Ok(DagHandle::new(dag_ref(dag)))
}

/**
 * Attaches `child` to `group`. The child must have been built after
 * advancing its index counter past the group's (see
 * [`set_next_node_index`]), must have at least one input and one output,
 * and its input names must be unique across the group. After attachment
 * the child resolves its scheme decision through the group.
 */
pub fn add_dag(group: &DagHandle, child: &DagHandle) -> Result<()> {
    let child_ir = child.ir();
    let name = child_ir.borrow().name().to_string();

    group
        .ir()
        .borrow_mut()
        .add_child(name, child_ir)
        .map_err(Error::IrError)?;

    child.0.borrow_mut().parent = Some(group.clone());
    Ok(())
}

/**
 * Looks up a child of a group by name. The returned handle shares the
 * group's scheme decision.
 */
pub fn get_child_dag(group: &DagHandle, name: &str) -> Option<DagHandle> {
    let child_ir = group.ir().borrow().child(name)?;
    let handle = DagHandle::new(child_ir);
    handle.0.borrow_mut().parent = Some(group.clone());
    Some(handle)
}

/**
 * Declares a ciphertext input and returns an expression handle for it.
 */
pub fn set_input(dag: &DagHandle, name: impl Into<String>) -> Expr {
    set_input_typed(dag, name, DataType::Cipher)
}

/**
 * Declares an input with an explicit value class.
 */
pub fn set_input_typed(
    dag: &DagHandle,
    name: impl Into<String>,
    ty: DataType,
) -> Expr {
    let ir = dag.ir();
    let node = ir.borrow_mut().make_input(name, ty);
    Expr::new(ir, node)
}

/**
 * Binds `expr` as the named output of the program.
 */
pub fn set_output(
    dag: &DagHandle,
    name: impl Into<String>,
    expr: Expr,
) -> Result<()> {
    dag.ir()
        .borrow_mut()
        .make_output(name, expr.node_index());
    Ok(())
}

/**
 * Compiles the program: runs the transpile pipeline, commits a backend,
 * and selects encryption parameters. Groups compile each child and share
 * one merged parameter set.
 */
pub fn compile(dag: &DagHandle) -> Result<()> {
    let ir = dag.ir();
    let decision = Decision::compile(&mut ir.borrow_mut())?;
    log::debug!(
        "compiled {} for {}",
        ir.borrow().name(),
        decision.backend()
    );
    dag.with_decision(|slot| *slot = Some(decision));
    Ok(())
}

/**
 * Generates the key set for the compiled program.
 */
pub fn gen_keys(dag: &DagHandle) -> Result<()> {
    dag.require_decision(|decision| decision.gen_keys())
}

/**
 * Encodes and encrypts a plaintext valuation into the program's input
 * slots. With `replace`, previously seeded inputs are discarded first;
 * otherwise the valuation merges over them.
 */
pub fn encrypt(
    dag: &DagHandle,
    inputs: &Valuation,
    replace: bool,
) -> Result<()> {
    dag.require_decision(|decision| decision.encrypt(inputs, replace))
}

/**
 * Evaluates the program over its seeded inputs.
 */
pub fn execute(dag: &DagHandle) -> Result<()> {
    let ir = dag.ir();
    dag.require_decision(|decision| decision.execute(&mut ir.borrow_mut()))
}

/**
 * Decrypts every output the program holds.
 */
pub fn decrypt(dag: &DagHandle) -> Result<Valuation> {
    dag.require_decision(|decision| decision.decrypt())
}

/**
 * Selects which artifacts [`save_dag_to_bytes`] includes, in flag order:
 * node graph, key-generation parameters, signature, evaluation context,
 * encryption context, decryption context.
 */
pub fn set_serialize_para(
    dag: &DagHandle,
    need_node_info: bool,
    need_genkey_info: bool,
    need_sig_info: bool,
    need_exe_ctx: bool,
    need_encrypt_ctx: bool,
    need_decrypt_ctx: bool,
) {
    dag.ir().borrow_mut().serialize_options = DagSerializePara::new(
        need_node_info,
        need_genkey_info,
        need_sig_info,
        need_exe_ctx,
        need_encrypt_ctx,
        need_decrypt_ctx,
    );
}

/**
 * Serializes the program per its serialization flags.
 */
pub fn save_dag_to_bytes(dag: &DagHandle) -> Result<Vec<u8>> {
    let ir = dag.ir();
    let ir = ir.borrow();
    dag.with_decision(|decision| {
        serialization::save_dag_to_bytes(&ir, decision.as_ref())
    })
}

/**
 * Loads a program saved with [`save_dag_to_bytes`].
 */
pub fn load_dag_from_bytes(bytes: &[u8]) -> Result<DagHandle> {
    let (ir, decision) = serialization::load_dag_from_bytes(bytes)?;
    let handle = DagHandle::new(ir);
    handle.0.borrow_mut().decision = decision;
    Ok(handle)
}

/**
 * Serializes the scheme parameters and keys alone, per the program's
 * serialization flags.
 */
pub fn save_keys_to_bytes(dag: &DagHandle) -> Result<Vec<u8>> {
    let ir = dag.ir();
    let ir = ir.borrow();
    dag.require_decision(|decision| {
        serialization::save_keys_to_bytes(&ir, decision)
    })
}

/**
 * Loads scheme parameters and keys into the program, merging with any it
 * already holds.
 */
pub fn load_keys_from_bytes(dag: &DagHandle, bytes: &[u8]) -> Result<()> {
    dag.with_decision(|slot| match slot {
        Some(decision) => {
            serialization::load_keys_from_bytes(bytes, Some(decision))?;
            Ok(())
        }
        None => {
            let loaded =
                serialization::load_keys_from_bytes(bytes, None)?;
            *slot = loaded;
            Ok(())
        }
    })
}

/**
 * Serializes the encrypted input valuation.
 */
pub fn save_input_to_bytes(dag: &DagHandle) -> Result<Vec<u8>> {
    dag.require_decision(|decision| {
        serialization::save_input_to_bytes(decision)
    })
}

/**
 * Loads an encrypted input valuation, merging or replacing.
 */
pub fn load_input_from_bytes(
    dag: &DagHandle,
    bytes: &[u8],
    replace: bool,
) -> Result<()> {
    dag.require_decision(|decision| {
        serialization::load_input_from_bytes(decision, bytes, replace)
    })
}

/**
 * Serializes the encrypted output valuation.
 */
pub fn save_output_to_bytes(dag: &DagHandle) -> Result<Vec<u8>> {
    dag.require_decision(|decision| {
        serialization::save_output_to_bytes(decision)
    })
}

/**
 * Loads an encrypted output valuation, merging with held outputs.
 */
pub fn load_output_from_bytes(
    dag: &DagHandle,
    bytes: &[u8],
) -> Result<()> {
    dag.require_decision(|decision| {
        serialization::load_output_from_bytes(decision, bytes)
    })
}

/**
 * Streams an out-of-band artifact to a writer.
 */
pub fn save_by_type(
    dag: &DagHandle,
    kind: SerializeDataType,
    writer: &mut dyn std::io::Write,
) -> Result<()> {
    match kind {
        SerializeDataType::BootstrappingKey => dag
            .require_decision(|decision| {
                decision.save_bootstrap_key(writer)
            }),
    }
}

/**
 * Loads an out-of-band artifact from a reader.
 */
pub fn load_by_type(
    dag: &DagHandle,
    kind: SerializeDataType,
    reader: &mut dyn std::io::Read,
) -> Result<()> {
    match kind {
        SerializeDataType::BootstrappingKey => dag
            .require_decision(|decision| {
                decision.load_bootstrap_key(reader)
            }),
    }
}

/**
 * The stable names of the libraries the compiled program uses.
 */
pub fn lib_info(dag: &DagHandle) -> Vec<String> {
    dag.with_decision(|decision| {
        decision
            .as_ref()
            .map(|d| d.lib_info())
            .unwrap_or_default()
    })
}

/**
 * The index the program's next node will receive.
 */
pub fn next_node_index(dag: &DagHandle) -> u64 {
    dag.ir().borrow().next_node_index()
}

/**
 * Advances the program's index counter. Call this with a group's counter
 * before building a DAG that will join the group, so sibling indices stay
 * disjoint.
 */
pub fn set_next_node_index(dag: &DagHandle, next: u64) {
    dag.ir().borrow_mut().set_next_node_index(next);
}

/**
 * The program's slot count.
 */
pub fn vec_size(dag: &DagHandle) -> u32 {
    dag.ir().borrow().vec_size()
}

/**
 * Overrides the default scale used for sources and the rescale
 * waterline.
 */
pub fn set_scale(dag: &DagHandle, scale: u32) {
    dag.ir().borrow_mut().scale = scale;
}

/**
 * Sets the security level in bits (128, 192, or 256).
 */
pub fn set_sec_level(dag: &DagHandle, level: u32) {
    dag.ir().borrow_mut().sec_level = level;
}

/**
 * Enables the executor's bootstrapping hook on backends that support it.
 */
pub fn enable_bootstrap(dag: &DagHandle, enable: bool) {
    dag.ir().borrow_mut().enable_bootstrap = enable;
}

/**
 * Whether bootstrapping is enabled for this program.
 */
pub fn is_bootstrapping(dag: &DagHandle) -> bool {
    dag.ir().borrow().enable_bootstrap
}

/**
 * Renders the program's graph in DOT format.
 */
pub fn to_graph(dag: &DagHandle) -> String {
    dag.ir().borrow().to_dot()
}
