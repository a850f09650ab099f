use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
/**
 * The operations a DAG node can perform. This set is closed; serialized
 * programs use the stable numeric codes returned by [`Op::code`].
 *
 * `Equality`, `Greater`, and `Smaller` are reserved codes. Comparison is
 * lowered to polynomial evaluation before a program reaches this IR, so
 * they never appear in a lowered DAG.
 */
pub enum Op {
    /**
     * A named program input. Carries a `Type` attribute and, once a program
     * is compiled, `EncodeAtScale` and `EncodeAtLevel` attributes.
     */
    Input,

    /**
     * Marks its single operand as a named program output.
     */
    Output,

    /**
     * A vector literal. Carries either a `ConstValue` (double) or a
     * `ConstValueInt64` attribute.
     */
    Constant,

    /**
     * A scalar `u32` literal, converted to a `Constant` before
     * scheme-specific lowering.
     */
    U32Constant,

    /**
     * Element-wise negation.
     */
    Negate,

    /**
     * Element-wise addition.
     */
    Add,

    /**
     * Element-wise subtraction.
     */
    Sub,

    /**
     * Element-wise multiplication.
     */
    Mul,

    /**
     * Element-wise division. Only the small-integer backend evaluates this
     * natively; inserting one marks the owning DAG as `short_int`.
     */
    Div,

    /**
     * Reserved comparison code; never present in a lowered DAG.
     */
    Equality,

    /**
     * Reserved comparison code; never present in a lowered DAG.
     */
    Greater,

    /**
     * Reserved comparison code; never present in a lowered DAG.
     */
    Smaller,

    /**
     * Cyclic left rotation by the constant amount in the `Rotation`
     * attribute.
     */
    RotateLeftConst,

    /**
     * Cyclic right rotation by the constant amount in the `Rotation`
     * attribute.
     */
    RotateRightConst,

    /**
     * Reduce the polynomial degree of a ciphertext after multiplication.
     */
    Relinearize,

    /**
     * Drop the top prime of a ciphertext's modulus chain without changing
     * its scale.
     */
    ModSwitch,

    /**
     * Divide a CKKS ciphertext by the top prime, reducing its scale by the
     * amount in the `RescaleDivisor` attribute.
     */
    Rescale,

    /**
     * Encode a raw vector into a backend plaintext using the node's
     * `EncodeAtScale` and `EncodeAtLevel` attributes.
     */
    Encode,
}

impl Op {
    /**
     * The stable numeric code used in serialized programs.
     */
    pub fn code(&self) -> u32 {
        match self {
            Op::Input => 1,
            Op::Output => 2,
            Op::Constant => 3,
            Op::U32Constant => 4,
            Op::Negate => 10,
            Op::Add => 11,
            Op::Sub => 12,
            Op::Mul => 13,
            Op::Div => 14,
            Op::Equality => 15,
            Op::Greater => 16,
            Op::Smaller => 17,
            Op::RotateLeftConst => 18,
            Op::RotateRightConst => 19,
            Op::Relinearize => 50,
            Op::ModSwitch => 51,
            Op::Rescale => 52,
            Op::Encode => 53,
        }
    }

    /**
     * Looks up the operation for a serialized code. Returns `None` for
     * codes outside the closed set.
     */
    pub fn from_code(code: u32) -> Option<Op> {
        Some(match code {
            1 => Op::Input,
            2 => Op::Output,
            3 => Op::Constant,
            4 => Op::U32Constant,
            10 => Op::Negate,
            11 => Op::Add,
            12 => Op::Sub,
            13 => Op::Mul,
            14 => Op::Div,
            15 => Op::Equality,
            16 => Op::Greater,
            17 => Op::Smaller,
            18 => Op::RotateLeftConst,
            19 => Op::RotateRightConst,
            50 => Op::Relinearize,
            51 => Op::ModSwitch,
            52 => Op::Rescale,
            53 => Op::Encode,
            _ => return None,
        })
    }

    /**
     * The operation's name, as used in diagnostics and DOT dumps.
     */
    pub fn name(&self) -> &'static str {
        match self {
            Op::Input => "Input",
            Op::Output => "Output",
            Op::Constant => "Constant",
            Op::U32Constant => "U32Constant",
            Op::Negate => "Negate",
            Op::Add => "Add",
            Op::Sub => "Sub",
            Op::Mul => "Mul",
            Op::Div => "Div",
            Op::Equality => "Equality",
            Op::Greater => "Greater",
            Op::Smaller => "Smaller",
            Op::RotateLeftConst => "RotateLeftConst",
            Op::RotateRightConst => "RotateRightConst",
            Op::Relinearize => "Relinearize",
            Op::ModSwitch => "ModSwitch",
            Op::Rescale => "Rescale",
            Op::Encode => "Encode",
        }
    }

    /**
     * True for operations that are legal with an empty operand list.
     */
    pub fn is_leaf(&self) -> bool {
        matches!(self, Op::Input | Op::Constant | Op::U32Constant)
    }

    /**
     * True for the rotation operations.
     */
    pub fn is_rotation(&self) -> bool {
        matches!(self, Op::RotateLeftConst | Op::RotateRightConst)
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip() {
        let all = [
            Op::Input,
            Op::Output,
            Op::Constant,
            Op::U32Constant,
            Op::Negate,
            Op::Add,
            Op::Sub,
            Op::Mul,
            Op::Div,
            Op::Equality,
            Op::Greater,
            Op::Smaller,
            Op::RotateLeftConst,
            Op::RotateRightConst,
            Op::Relinearize,
            Op::ModSwitch,
            Op::Rescale,
            Op::Encode,
        ];

        for op in all {
            assert_eq!(Op::from_code(op.code()), Some(op));
        }

        assert_eq!(Op::from_code(0), None);
        assert_eq!(Op::from_code(54), None);
    }
}
