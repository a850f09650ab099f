#[derive(Debug, Clone, PartialEq, thiserror::Error)]
/**
 * Represents an error that can occur while dispatching, executing, or
 * (de)serializing a compiled program.
 */
pub enum Error {
    /**
     * An issue while mutating the IR.
     */
    #[error("IR error: {0}")]
    IrError(#[from] fhelix_dag::Error),

    /**
     * An issue while compiling the program.
     */
    #[error("compile error: {0}")]
    CompileError(#[from] fhelix_backend::Error),

    /**
     * The DAG's expression flags match no supported scheme.
     */
    #[error("invalid input type: no scheme supports this program")]
    InvalidInputType,

    /**
     * The program has not been compiled yet.
     */
    #[error("the dag has no scheme decision; compile it first")]
    NotCompiled,

    /**
     * Parameters needed for key generation are missing.
     */
    #[error("key generation needs the scheme parameters")]
    GenKeyParamsMissing,

    /**
     * Encryption was attempted without the encryption context.
     */
    #[error("encryption needs the public key")]
    EncryptContextMissing,

    /**
     * Execution was attempted without the evaluation context.
     */
    #[error("execution needs the evaluation keys")]
    ExecContextMissing,

    /**
     * Decryption was attempted without the decryption context.
     */
    #[error("decryption needs the secret key")]
    DecryptContextMissing,

    /**
     * Decryption produced no values.
     */
    #[error("decryption produced an empty result")]
    DecryptEmptyResult,

    /**
     * A ciphertext was produced under a different key set.
     */
    #[error("ciphertext key id {cipher} does not match key set {keys}")]
    KeyMismatch {
        /**
         * The id the ciphertext was produced under.
         */
        cipher: u64,

        /**
         * The id of the key set in hand.
         */
        keys: u64,
    },

    /**
     * A rotation step has no Galois key.
     */
    #[error("no rotation key for step {0}")]
    RotationKeyMissing(i32),

    /**
     * Relinearization was requested without relinearization keys.
     */
    #[error("no relinearization keys in the evaluation context")]
    RelinKeysMissing,

    /**
     * An encrypted value had the wrong length for the slot count.
     */
    #[error("input vector length {got} does not match slot count {slots}")]
    InputLengthMismatch {
        /**
         * The provided vector length.
         */
        got: usize,

        /**
         * The compiled slot count.
         */
        slots: usize,
    },

    /**
     * The executor hit an opcode with the wrong operand count or type.
     * The flag latches; further visits re-raise it.
     */
    #[error("executor fault: {0}")]
    ExecutorFault(String),

    /**
     * The backend does not implement the requested operation.
     */
    #[error("{backend} does not support {operation}")]
    UnsupportedOperation {
        /**
         * The backend's stable name.
         */
        backend: &'static str,

        /**
         * The unsupported operation.
         */
        operation: &'static str,
    },

    /**
     * A serialized message could not be parsed.
     */
    #[error("could not parse serialized message: {0}")]
    ParseError(String),

    /**
     * A serialization flag requires an artifact the program does not
     * hold.
     */
    #[error("serialization requires {0}, which is not present")]
    MissingArtifact(&'static str),

    /**
     * The envelope's creator tag or format version did not match.
     */
    #[error("envelope has creator `{creator}` version {version}")]
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
     * The stable integer code for this error, within the partitioned code
     * space: 31-60 input/output, 61-80 decryption, 101-300
     * serialization, 550-600 SEAL-family runtime.
     */
    pub fn code(&self) -> i32 {
        match self {
            Error::IrError(e) => e.code(),
            Error::CompileError(e) => e.code(),
            Error::InvalidInputType => 17,
            Error::NotCompiled => 16,
            Error::GenKeyParamsMissing => 41,
            Error::EncryptContextMissing => 43,
            Error::ExecContextMissing => 554,
            Error::DecryptContextMissing => 64,
            Error::DecryptEmptyResult => 63,
            Error::KeyMismatch { .. } => 65,
            Error::RotationKeyMissing(_) => 559,
            Error::RelinKeysMissing => 561,
            Error::InputLengthMismatch { .. } => 33,
            Error::ExecutorFault(_) => 552,
            Error::UnsupportedOperation { .. } => 553,
            Error::ParseError(_) => 102,
            Error::MissingArtifact(_) => 135,
            Error::FormatMismatch { .. } => 134,
        }
    }
}

/**
 * Wrapper around [`Result`](std::result::Result) with this crate's error
 * type.
 */
pub type Result<T> = std::result::Result<T, Error>;
