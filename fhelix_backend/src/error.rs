use fhelix_dag::NodeIndex;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
/**
 * Represents an error that can occur while compiling a DAG for an HE
 * scheme.
 */
pub enum Error {
    /**
     * An issue while mutating the IR.
     */
    #[error("IR error: {0}")]
    IrError(#[from] fhelix_dag::Error),

    /**
     * The scale for a named input was never set.
     */
    #[error("the scale for input `{0}` was not set")]
    InputScaleNotSet(String),

    /**
     * The scale for a constant was never set.
     */
    #[error("the scale for a constant was not set")]
    ConstScaleNotSet,

    /**
     * Addition operands reached validation at different levels. The
     * scheduling passes are expected to prevent this; any firing is a
     * compiler bug.
     */
    #[error(
        "operands of node {node} sit at levels {left} and {right}; \
         the mod-switcher should have aligned them"
    )]
    LevelMismatch {
        /**
         * The node whose operands disagree.
         */
        node: NodeIndex,

        /**
         * The level of the first ciphertext operand.
         */
        left: u32,

        /**
         * The level of a disagreeing ciphertext operand.
         */
        right: u32,
    },

    /**
     * The program's coefficient modulus does not fit the largest
     * standard-parameter entry at the requested security level.
     */
    #[error(
        "bit modulus too large for available parameters: \
         {required} bits requested, {available} available"
    )]
    BitBudgetExceeded {
        /**
         * Total coefficient-modulus bits the program needs.
         */
        required: u32,

        /**
         * The largest total the tables offer at this security level.
         */
        available: u32,
    },

    /**
     * The requested security level has no standard-parameter table.
     */
    #[error("security levels up to 256 bits are supported, got {0}")]
    SecurityLevelUnsupported(u32),
}

impl Error {
    /**
     * The stable integer code for this error; compilation errors share
     * the 550-600 range with the SEAL backends.
     */
    pub fn code(&self) -> i32 {
        match self {
            Error::IrError(e) => e.code(),
            Error::InputScaleNotSet(_) => 556,
            Error::ConstScaleNotSet => 557,
            Error::LevelMismatch { .. } => 558,
            Error::BitBudgetExceeded { .. } => 560,
            Error::SecurityLevelUnsupported(_) => 555,
        }
    }
}

/**
 * Wrapper around [`Result`](std::result::Result) with this crate's error
 * type.
 */
pub type Result<T> = std::result::Result<T, Error>;
