#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! This crate contains the intermediate representation for the fhelix FHE
//! compiler: typed operation DAGs with named inputs and outputs, dense
//! node-indexed side tables, ready-set traversal for rewrite passes, DAG
//! groups that share one index space, and the serialization schema for the
//! node graph.
//!
//! Programs are built through the operator-overloaded [`Expr`] surface,
//! lowered by the passes in `fhelix_backend`, and evaluated by
//! `fhelix_runtime`.

pub mod attr;
mod constant;
mod dag;
mod data_type;
mod error;
mod expr;
mod group;
mod node;
mod node_map;
mod op;
pub mod serialize;
mod traverse;

use std::cell::RefCell;
use std::rc::Rc;

pub use constant::{ConstantElement, ConstantValue};
pub use dag::{Dag, DagSerializePara};
pub use data_type::DataType;
pub use error::{Error, Result};
pub use expr::Expr;
pub use group::group_make_node;
pub use node::{Node, NodeIndex};
pub use node_map::{NodeMap, NodeMapOptional};
pub use op::Op;
pub use traverse::{backward_pass, forward_pass};

/**
 * A shared handle to a [`Dag`]. Graph construction through [`Expr`] and
 * group membership both require shared ownership; execution is
 * single-threaded, so the interior mutability is a plain `RefCell`.
 */
pub type DagRef = Rc<RefCell<Dag>>;

/**
 * Wraps a DAG in a shared handle.
 */
pub fn dag_ref(dag: Dag) -> DagRef {
    Rc::new(RefCell::new(dag))
}

/**
 * Upper bound on element counts in the comparison front end.
 */
pub const MAX_CMP_NUM: u32 = 1024;

/**
 * Decomposition base used by the comparison front end.
 */
pub const CMP_P: u32 = 7;

/**
 * Digits per number under base-`CMP_P` decomposition.
 */
pub const CMP_BIT_LEN: u32 = 16;

/**
 * Transform length used by the FFT front end.
 */
pub const FFT_N: u32 = 16;

/**
 * Slot count used by comparison DAGs.
 */
pub const CMP_DAG_SIZE: u32 = 16384;

/**
 * Default scale, in bits, for sources and the rescale waterline.
 */
pub const DEFAULT_SCALE: u32 = 60;

/**
 * Scale reduction step applied when retrying parameter selection.
 */
pub const REDUCE_SCALE: u32 = 10;

/**
 * The widest coefficient modulus the SEAL backends accept at 128-bit
 * security; programs needing more switch to the OpenFHE backends.
 */
pub const MAX_SEAL_BITS: u32 = 881;

/**
 * Prime-chain positions reserved for the input and output moduli.
 */
pub const DEFAULT_Q_CNT: u32 = 3;

/**
 * Ciphertext level at which bootstrapping first becomes mandatory.
 */
pub const MAX_MULT_DEPTH_NO_BOOT: u32 = 15;

/**
 * Levels kept in reserve between bootstrapping operations.
 */
pub const LEVELS_BEFORE_BOOTSTRAP: u32 = 6;

/**
 * Serialization format version; bumped on incompatible schema changes.
 */
pub const IYFC_FORMAT_VERSION: u32 = 1;

static_assertions::const_assert!(DEFAULT_SCALE > REDUCE_SCALE);
static_assertions::const_assert!(
    MAX_SEAL_BITS / DEFAULT_SCALE > DEFAULT_Q_CNT
);
