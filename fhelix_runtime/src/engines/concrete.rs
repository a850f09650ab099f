//! The TFHE-like small-integer engine: exact `u8` arithmetic with native
//! division. Noise management is the library's problem (it bootstraps
//! per operation), so levels never move.

use super::sim::{encode_plain, map_slots, rotate_slots, zip_cc, zip_cp};
use crate::{
    Backend, EvalEngine, EvalKeys, PublicKey, Result, SimCiphertext,
    SimPlaintext, SlotValue,
};

/**
 * The small-integer engine, selected whenever a program divides
 * ciphertexts.
 */
pub struct Concrete {
    slots: usize,
}

impl EvalEngine for Concrete {
    type Scalar = u8;

    fn backend() -> Backend {
        Backend::Concrete
    }

    fn new(slots: usize) -> Self {
        Self { slots }
    }

    fn slots(&self) -> usize {
        self.slots
    }

    fn encode(
        &self,
        raw: &[u8],
        scale: u32,
        level: u32,
    ) -> SimPlaintext<u8> {
        encode_plain(raw, scale, level)
    }

    fn encrypt(
        &self,
        plain: &SimPlaintext<u8>,
        key: &PublicKey,
    ) -> SimCiphertext<u8> {
        SimCiphertext {
            key_id: key.key_id,
            slots: plain.slots.clone(),
            scale: plain.scale,
            level: 0,
            size: 2,
        }
    }

    fn add_cc(
        &self,
        a: SimCiphertext<u8>,
        b: &SimCiphertext<u8>,
    ) -> SimCiphertext<u8> {
        zip_cc(a, b, u8::slot_add)
    }

    fn add_cp(
        &self,
        a: SimCiphertext<u8>,
        b: &SimPlaintext<u8>,
    ) -> SimCiphertext<u8> {
        zip_cp(a, b, u8::slot_add)
    }

    fn sub_cc(
        &self,
        a: SimCiphertext<u8>,
        b: &SimCiphertext<u8>,
    ) -> SimCiphertext<u8> {
        zip_cc(a, b, u8::slot_sub)
    }

    fn sub_cp(
        &self,
        a: SimCiphertext<u8>,
        b: &SimPlaintext<u8>,
    ) -> SimCiphertext<u8> {
        zip_cp(a, b, u8::slot_sub)
    }

    fn mul_cc(
        &self,
        a: SimCiphertext<u8>,
        b: &SimCiphertext<u8>,
    ) -> SimCiphertext<u8> {
        zip_cc(a, b, u8::slot_mul)
    }

    fn mul_cp(
        &self,
        a: SimCiphertext<u8>,
        b: &SimPlaintext<u8>,
    ) -> SimCiphertext<u8> {
        zip_cp(a, b, u8::slot_mul)
    }

    fn negate(&self, a: SimCiphertext<u8>) -> SimCiphertext<u8> {
        map_slots(a, u8::slot_neg)
    }

    fn rotate(
        &self,
        a: SimCiphertext<u8>,
        steps: i32,
        eval: &EvalKeys,
    ) -> Result<SimCiphertext<u8>> {
        eval.check_rotation(steps)?;
        Ok(rotate_slots(a, steps))
    }

    fn relinearize(
        &self,
        a: SimCiphertext<u8>,
        _eval: &EvalKeys,
    ) -> Result<SimCiphertext<u8>> {
        Ok(a)
    }

    fn mod_switch(&self, a: SimCiphertext<u8>) -> SimCiphertext<u8> {
        a
    }

    fn rescale(
        &self,
        a: SimCiphertext<u8>,
        _divisor: u32,
    ) -> SimCiphertext<u8> {
        a
    }

    fn div_cc(
        &self,
        a: SimCiphertext<u8>,
        b: &SimCiphertext<u8>,
    ) -> Result<SimCiphertext<u8>> {
        Ok(zip_cc(a, b, u8::slot_div))
    }

    fn div_cp(
        &self,
        a: SimCiphertext<u8>,
        b: &SimPlaintext<u8>,
    ) -> Result<SimCiphertext<u8>> {
        Ok(zip_cp(a, b, u8::slot_div))
    }

    fn div_pc(
        &self,
        a: &SimPlaintext<u8>,
        b: SimCiphertext<u8>,
    ) -> Result<SimCiphertext<u8>> {
        let mut out = b;
        for (slot, lhs) in out.slots.iter_mut().zip(a.slots.iter()) {
            *slot = u8::slot_div(*lhs, *slot);
        }
        Ok(out)
    }
}
