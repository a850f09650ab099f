use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * A plaintext value crossing the API boundary. Scalars broadcast to the
 * slot count at encryption time; vectors must match it exactly.
 */
pub enum Value {
    /**
     * A double scalar, broadcast to every slot.
     */
    F64(f64),

    /**
     * A 64-bit integer scalar, broadcast to every slot.
     */
    I64(i64),

    /**
     * A small-integer scalar for the TFHE-like backend.
     */
    U8(u8),

    /**
     * A double vector of exactly the slot count.
     */
    VecF64(Vec<f64>),

    /**
     * A 64-bit integer vector of exactly the slot count.
     */
    VecI64(Vec<i64>),
}

impl Value {
    /**
     * Expands this value to `slots` doubles.
     */
    pub fn broadcast_f64(&self, slots: usize) -> Result<Vec<f64>> {
        match self {
            Value::F64(v) => Ok(vec![*v; slots]),
            Value::I64(v) => Ok(vec![*v as f64; slots]),
            Value::U8(v) => Ok(vec![*v as f64; slots]),
            Value::VecF64(v) => {
                check_len(v.len(), slots)?;
                Ok(v.clone())
            }
            Value::VecI64(v) => {
                check_len(v.len(), slots)?;
                Ok(v.iter().map(|x| *x as f64).collect())
            }
        }
    }

    /**
     * Expands this value to `slots` 64-bit integers.
     */
    pub fn broadcast_i64(&self, slots: usize) -> Result<Vec<i64>> {
        match self {
            Value::F64(v) => Ok(vec![*v as i64; slots]),
            Value::I64(v) => Ok(vec![*v; slots]),
            Value::U8(v) => Ok(vec![*v as i64; slots]),
            Value::VecF64(v) => {
                check_len(v.len(), slots)?;
                Ok(v.iter().map(|x| *x as i64).collect())
            }
            Value::VecI64(v) => {
                check_len(v.len(), slots)?;
                Ok(v.clone())
            }
        }
    }
}

fn check_len(got: usize, slots: usize) -> Result<()> {
    if got != slots {
        return Err(Error::InputLengthMismatch { got, slots });
    }
    Ok(())
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::F64(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::I64(v)
    }
}

impl From<u8> for Value {
    fn from(v: u8) -> Self {
        Value::U8(v)
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::VecF64(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::VecI64(v)
    }
}

/**
 * A mapping from input or output names to plaintext values.
 */
pub type Valuation = BTreeMap<String, Value>;
