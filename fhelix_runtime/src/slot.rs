use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::Value;

/**
 * The slot element type a backend computes over: `f64` for the CKKS
 * engines, `i64` for the BFV engines, `u8` for the small-integer engine.
 * Integer arithmetic wraps; division by zero yields zero.
 */
pub trait SlotValue:
    Copy
    + Default
    + PartialEq
    + std::fmt::Debug
    + Serialize
    + DeserializeOwned
    + 'static
{
    /**
     * Converts a double into this slot type.
     */
    fn from_f64(v: f64) -> Self;

    /**
     * Converts a 64-bit integer into this slot type.
     */
    fn from_i64(v: i64) -> Self;

    /**
     * Slot addition.
     */
    fn slot_add(a: Self, b: Self) -> Self;

    /**
     * Slot subtraction.
     */
    fn slot_sub(a: Self, b: Self) -> Self;

    /**
     * Slot multiplication.
     */
    fn slot_mul(a: Self, b: Self) -> Self;

    /**
     * Slot negation.
     */
    fn slot_neg(a: Self) -> Self;

    /**
     * Slot division; division by zero yields zero.
     */
    fn slot_div(a: Self, b: Self) -> Self;

    /**
     * Packages a decrypted slot vector as an API [`Value`].
     */
    fn into_value(slots: Vec<Self>) -> Value;

    /**
     * Expands an API value to `slots` elements of this type, broadcasting
     * scalars and checking vector lengths.
     */
    fn broadcast(value: &Value, slots: usize) -> crate::Result<Vec<Self>> {
        match value {
            Value::F64(_) | Value::VecF64(_) => Ok(value
                .broadcast_f64(slots)?
                .into_iter()
                .map(Self::from_f64)
                .collect()),
            _ => Ok(value
                .broadcast_i64(slots)?
                .into_iter()
                .map(Self::from_i64)
                .collect()),
        }
    }
}

impl SlotValue for f64 {
    fn from_f64(v: f64) -> Self {
        v
    }

    fn from_i64(v: i64) -> Self {
        v as f64
    }

    fn slot_add(a: f64, b: f64) -> f64 {
        a + b
    }

    fn slot_sub(a: f64, b: f64) -> f64 {
        a - b
    }

    fn slot_mul(a: f64, b: f64) -> f64 {
        a * b
    }

    fn slot_neg(a: f64) -> f64 {
        -a
    }

    fn slot_div(a: f64, b: f64) -> f64 {
        if b == 0.0 {
            0.0
        } else {
            a / b
        }
    }

    fn into_value(slots: Vec<f64>) -> Value {
        Value::VecF64(slots)
    }
}

impl SlotValue for i64 {
    fn from_f64(v: f64) -> Self {
        v as i64
    }

    fn from_i64(v: i64) -> Self {
        v
    }

    fn slot_add(a: i64, b: i64) -> i64 {
        a.wrapping_add(b)
    }

    fn slot_sub(a: i64, b: i64) -> i64 {
        a.wrapping_sub(b)
    }

    fn slot_mul(a: i64, b: i64) -> i64 {
        a.wrapping_mul(b)
    }

    fn slot_neg(a: i64) -> i64 {
        a.wrapping_neg()
    }

    fn slot_div(a: i64, b: i64) -> i64 {
        if b == 0 {
            0
        } else {
            a.wrapping_div(b)
        }
    }

    fn into_value(slots: Vec<i64>) -> Value {
        Value::VecI64(slots)
    }
}

impl SlotValue for u8 {
    fn from_f64(v: f64) -> Self {
        v as u8
    }

    fn from_i64(v: i64) -> Self {
        v as u8
    }

    fn slot_add(a: u8, b: u8) -> u8 {
        a.wrapping_add(b)
    }

    fn slot_sub(a: u8, b: u8) -> u8 {
        a.wrapping_sub(b)
    }

    fn slot_mul(a: u8, b: u8) -> u8 {
        a.wrapping_mul(b)
    }

    fn slot_neg(a: u8) -> u8 {
        a.wrapping_neg()
    }

    fn slot_div(a: u8, b: u8) -> u8 {
        if b == 0 {
            0
        } else {
            a / b
        }
    }

    fn into_value(slots: Vec<u8>) -> Value {
        // The small-integer backend works on scalars; slot zero carries
        // the value.
        Value::U8(slots.first().copied().unwrap_or(0))
    }
}
