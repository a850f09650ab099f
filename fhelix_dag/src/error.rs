use crate::attr::AttrKey;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
/**
 * Represents an error that can occur while building, mutating, or
 * reloading a DAG.
 */
pub enum Error {
    /**
     * The slot count given to a DAG was zero or not a power of two.
     */
    #[error("vector size must be a non-zero power of two, got {0}")]
    BadVecSize(u64),

    /**
     * A child DAG was added to a group whose index counter overlaps the
     * child's indices. Call `set_next_node_index` before building a new
     * child.
     */
    #[error(
        "child dag minimum index {child} overlaps group next index {group}"
    )]
    GroupIndexOverlap {
        /**
         * The group's next node index at `add_dag` time.
         */
        group: u64,

        /**
         * The child's minimum node index.
         */
        child: u64,
    },

    /**
     * A child DAG with this name is already part of the group.
     */
    #[error("group already contains a dag named `{0}`")]
    GroupDuplicateDag(String),

    /**
     * A child DAG with no inputs or no outputs cannot join a group.
     */
    #[error("group children must have at least one input and one output")]
    EmptyChildDag,

    /**
     * Two group children declare an input with the same name.
     */
    #[error("input name `{0}` is already used by another dag in the group")]
    GroupDuplicateInput(String),

    /**
     * A constant's logical size does not divide the slot count.
     */
    #[error("constant size {size} must evenly divide slot count {slots}")]
    ConstantSize {
        /**
         * The constant's logical size.
         */
        size: usize,

        /**
         * The slot count it was expanded to.
         */
        slots: usize,
    },

    /**
     * An output was bound without an expression.
     */
    #[error("output `{0}` must be bound to an expression")]
    OutputExprNull(String),

    /**
     * A named input does not exist in this DAG.
     */
    #[error("no input named `{0}`")]
    UnknownInput(String),

    /**
     * A serialized program contained an operation code outside the closed
     * set.
     */
    #[error("unknown operation code {0} in serialized dag")]
    UnknownOpCode(u32),

    /**
     * A serialized attribute's key and payload do not form a valid pair.
     */
    #[error("invalid attribute payload for key {0}")]
    InvalidAttr(AttrKey),

    /**
     * A serialized node referenced an operand index that has not been
     * constructed yet.
     */
    #[error("serialized node references unknown operand index {0}")]
    BadOperandIndex(u64),

    /**
     * The envelope's creator tag or format version did not match.
     */
    #[error("serialized message has creator `{creator}` version {version}")]
    FormatMismatch {
        /**
         * The creator tag found in the envelope.
         */
        creator: String,

        /**
         * The format version found in the envelope.
         */
        version: u32,
    },
}

impl Error {
    /**
     * The stable integer code for this error. Codes partition a flat
     * space: 10-29 DAG construction, 31-60 input/output, 101-300
     * serialization.
     */
    pub fn code(&self) -> i32 {
        match self {
            Error::BadVecSize(_) => 10,
            Error::GroupIndexOverlap { .. } => 11,
            Error::GroupDuplicateDag(_) => 12,
            Error::EmptyChildDag => 13,
            Error::GroupDuplicateInput(_) => 14,
            Error::ConstantSize { .. } => 15,
            Error::OutputExprNull(_) => 31,
            Error::UnknownInput(_) => 32,
            Error::UnknownOpCode(_) => 129,
            Error::InvalidAttr(_) => 131,
            Error::BadOperandIndex(_) => 132,
            Error::FormatMismatch { .. } => 133,
        }
    }
}

/**
 * Wrapper around [`Result`](std::result::Result) with this crate's error
 * type.
 */
pub type Result<T> = std::result::Result<T, Error>;
