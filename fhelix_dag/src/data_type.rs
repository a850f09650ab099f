use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
/**
 * The value class a node produces at runtime.
 *
 * Type inference assigns one of these to every node: constants start out
 * `Raw`, inputs keep their declared type, and internal nodes take the
 * strongest class among their operands (`Cipher` > `Plain` > `Raw`).
 */
pub enum DataType {
    /**
     * Not yet inferred.
     */
    Undef,

    /**
     * An encrypted vector.
     */
    Cipher,

    /**
     * An unencoded vector of plaintext slots.
     */
    Raw,

    /**
     * A backend-encoded plaintext, ready to combine with ciphertexts.
     */
    Plain,
}

impl DataType {
    /**
     * The type's name, as used in diagnostics and DOT dumps.
     */
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Undef => "Undef",
            DataType::Cipher => "Cipher",
            DataType::Raw => "Raw",
            DataType::Plain => "Plain",
        }
    }
}

impl Default for DataType {
    fn default() -> Self {
        DataType::Undef
    }
}

impl std::fmt::Display for DataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
