use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use fhelix_dag::DataType;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
/**
 * How one named input must be prepared for a compiled program: its value
 * class and the scale and level it encodes at.
 */
pub struct EncodingInfo {
    /**
     * The input's declared value class.
     */
    pub data_type: DataType,

    /**
     * The scale, in bits, the input encodes at.
     */
    pub scale: u32,

    /**
     * The absolute level the input encodes at.
     */
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * Per-input metadata needed to encode plaintexts for a compiled program,
 * extracted after the transform pipeline runs.
 */
pub struct Signature {
    /**
     * The slot count inputs are encoded against.
     */
    pub vec_size: u32,

    /**
     * Encoding info per input name.
     */
    pub inputs: BTreeMap<String, EncodingInfo>,
}

impl Signature {
    /**
     * Merges another signature's inputs into this one; used when group
     * children are compiled independently.
     */
    pub fn merge(&mut self, other: &Signature) {
        self.vec_size = self.vec_size.max(other.vec_size);
        for (name, info) in &other.inputs {
            self.inputs.insert(name.clone(), *info);
        }
    }
}
