use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/**
 * Slot element types a constant can hold. Implemented for `f64` and `i64`;
 * the small-integer backend casts from these at execution time.
 */
pub trait ConstantElement: Copy + Default + PartialEq + Serialize {}

impl ConstantElement for f64 {}
impl ConstantElement for i64 {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
/**
 * A vector literal with a logical length that must divide the slot count of
 * the DAG it belongs to.
 *
 * Dense constants tile their stored values across the slots; sparse
 * constants scatter `(index, value)` pairs into every repetition of the
 * logical vector, leaving all other slots zero.
 */
pub enum ConstantValue<T> {
    /**
     * A contiguously stored vector. The stored values may be shorter than
     * the logical size as long as they divide it evenly; expansion tiles
     * them.
     */
    Dense {
        /**
         * The logical vector length.
         */
        size: usize,

        /**
         * The stored values; their length divides `size`.
         */
        values: Vec<T>,
    },

    /**
     * `(slot index, value)` pairs within a logical vector of mostly zeros.
     */
    Sparse {
        /**
         * The logical vector length.
         */
        size: usize,

        /**
         * The non-zero entries; indices are below `size`.
         */
        entries: Vec<(u32, T)>,
    },
}

impl<T: ConstantElement> ConstantValue<T> {
    /**
     * Creates a dense constant. The stored value count must evenly divide
     * the logical size.
     */
    pub fn dense(size: usize, values: Vec<T>) -> Result<Self> {
        if values.is_empty() || size % values.len() != 0 {
            return Err(Error::ConstantSize {
                size: values.len(),
                slots: size,
            });
        }

        Ok(ConstantValue::Dense { size, values })
    }

    /**
     * Creates a sparse constant from `(index, value)` pairs.
     */
    pub fn sparse(size: usize, entries: Vec<(u32, T)>) -> Result<Self> {
        for (i, _) in &entries {
            if *i as usize >= size {
                return Err(Error::ConstantSize {
                    size: *i as usize,
                    slots: size,
                });
            }
        }

        Ok(ConstantValue::Sparse { size, entries })
    }

    /**
     * The logical vector length.
     */
    pub fn size(&self) -> usize {
        match self {
            ConstantValue::Dense { size, .. } => *size,
            ConstantValue::Sparse { size, .. } => *size,
        }
    }

    /**
     * Expands this constant to a vector of `slots` elements. The logical
     * size must divide `slots`.
     */
    pub fn expand_to(&self, slots: usize) -> Result<Vec<T>> {
        let size = self.size();

        if slots < size || slots % size != 0 {
            return Err(Error::ConstantSize { size, slots });
        }

        match self {
            ConstantValue::Dense { values, .. } => {
                let mut result = Vec::with_capacity(slots);

                for _ in 0..slots / values.len() {
                    result.extend_from_slice(values);
                }

                Ok(result)
            }
            ConstantValue::Sparse { size, entries } => {
                let mut result = vec![T::default(); slots];

                for (i, v) in entries {
                    for k in 0..slots / size {
                        result[*i as usize + k * size] = *v;
                    }
                }

                Ok(result)
            }
        }
    }

    /**
     * True when every slot of the expanded constant would be zero.
     */
    pub fn is_zero(&self) -> bool {
        match self {
            ConstantValue::Dense { values, .. } => {
                values.iter().all(|v| *v == T::default())
            }
            ConstantValue::Sparse { entries, .. } => {
                entries.iter().all(|(_, v)| *v == T::default())
            }
        }
    }
}
