//! Slot-level helpers shared by the reference evaluators.

use crate::{SimCiphertext, SimPlaintext, SlotValue};

pub(crate) fn zip_cc<T: SlotValue>(
    mut a: SimCiphertext<T>,
    b: &SimCiphertext<T>,
    f: fn(T, T) -> T,
) -> SimCiphertext<T> {
    for (slot, rhs) in a.slots.iter_mut().zip(b.slots.iter()) {
        *slot = f(*slot, *rhs);
    }
    a.size = a.size.max(b.size);
    a
}

pub(crate) fn zip_cp<T: SlotValue>(
    mut a: SimCiphertext<T>,
    b: &SimPlaintext<T>,
    f: fn(T, T) -> T,
) -> SimCiphertext<T> {
    for (slot, rhs) in a.slots.iter_mut().zip(b.slots.iter()) {
        *slot = f(*slot, *rhs);
    }
    a
}

pub(crate) fn map_slots<T: SlotValue>(
    mut a: SimCiphertext<T>,
    f: fn(T) -> T,
) -> SimCiphertext<T> {
    for slot in a.slots.iter_mut() {
        *slot = f(*slot);
    }
    a
}

/*
 * Positive steps rotate left, negative right; the modulus is the slot
 * length.
 */
pub(crate) fn rotate_slots<T: SlotValue>(
    mut a: SimCiphertext<T>,
    steps: i32,
) -> SimCiphertext<T> {
    let len = a.slots.len();
    if len == 0 {
        return a;
    }

    let steps = steps.rem_euclid(len as i32) as usize;
    a.slots.rotate_left(steps);
    a
}

pub(crate) fn encode_plain<T: SlotValue>(
    raw: &[T],
    scale: u32,
    level: u32,
) -> SimPlaintext<T> {
    SimPlaintext {
        slots: raw.to_vec(),
        scale,
        level,
    }
}

/*
 * The approximate engines add a deterministic sub-tolerance perturbation
 * at encryption time, so tests exercise approximate comparison the way a
 * real CKKS backend would.
 */
pub(crate) fn ckks_noise(index: usize) -> f64 {
    let hashed = (index as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
    ((hashed % 2048) as f64 - 1024.0) * 1e-12
}
