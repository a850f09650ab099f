//! The OpenFHE-style engines. The library manages scales itself, so
//! ciphertext levels rise with every multiplication rather than with
//! compiler-scheduled rescales, and the CKKS variant can refresh a
//! ciphertext by bootstrapping.

use super::sim::{
    ckks_noise, encode_plain, map_slots, rotate_slots, zip_cc, zip_cp,
};
use crate::{
    Backend, BootstrapKey, Error, EvalEngine, EvalKeys, PublicKey, Result,
    SimCiphertext, SimPlaintext, SlotValue,
};

/**
 * CKKS on the OpenFHE-style evaluator: auto-managed scales, per-multiply
 * level growth, and bootstrapping support.
 */
pub struct OpenfheCkks {
    slots: usize,
}

/**
 * BFV on the OpenFHE-style evaluator.
 */
pub struct OpenfheBfv {
    slots: usize,
}

impl EvalEngine for OpenfheCkks {
    type Scalar = f64;

    fn backend() -> Backend {
        Backend::OpenfheCkks
    }

    fn new(slots: usize) -> Self {
        Self { slots }
    }

    fn slots(&self) -> usize {
        self.slots
    }

    fn encode(
        &self,
        raw: &[f64],
        scale: u32,
        level: u32,
    ) -> SimPlaintext<f64> {
        encode_plain(raw, scale, level)
    }

    fn encrypt(
        &self,
        plain: &SimPlaintext<f64>,
        key: &PublicKey,
    ) -> SimCiphertext<f64> {
        let slots = plain
            .slots
            .iter()
            .enumerate()
            .map(|(i, v)| v + ckks_noise(i))
            .collect();

        SimCiphertext {
            key_id: key.key_id,
            slots,
            scale: plain.scale,
            level: 0,
            size: 2,
        }
    }

    fn add_cc(
        &self,
        a: SimCiphertext<f64>,
        b: &SimCiphertext<f64>,
    ) -> SimCiphertext<f64> {
        let level = a.level.max(b.level);
        let mut out = zip_cc(a, b, f64::slot_add);
        out.level = level;
        out
    }

    fn add_cp(
        &self,
        a: SimCiphertext<f64>,
        b: &SimPlaintext<f64>,
    ) -> SimCiphertext<f64> {
        zip_cp(a, b, f64::slot_add)
    }

    fn sub_cc(
        &self,
        a: SimCiphertext<f64>,
        b: &SimCiphertext<f64>,
    ) -> SimCiphertext<f64> {
        let level = a.level.max(b.level);
        let mut out = zip_cc(a, b, f64::slot_sub);
        out.level = level;
        out
    }

    fn sub_cp(
        &self,
        a: SimCiphertext<f64>,
        b: &SimPlaintext<f64>,
    ) -> SimCiphertext<f64> {
        zip_cp(a, b, f64::slot_sub)
    }

    fn mul_cc(
        &self,
        a: SimCiphertext<f64>,
        b: &SimCiphertext<f64>,
    ) -> SimCiphertext<f64> {
        // The library rescales internally; each multiply consumes one
        // level of the depth budget.
        let level = a.level.max(b.level) + 1;
        let mut out = zip_cc(a, b, f64::slot_mul);
        out.level = level;
        out.size = 3;
        out
    }

    fn mul_cp(
        &self,
        a: SimCiphertext<f64>,
        b: &SimPlaintext<f64>,
    ) -> SimCiphertext<f64> {
        zip_cp(a, b, f64::slot_mul)
    }

    fn negate(&self, a: SimCiphertext<f64>) -> SimCiphertext<f64> {
        map_slots(a, f64::slot_neg)
    }

    fn rotate(
        &self,
        a: SimCiphertext<f64>,
        steps: i32,
        eval: &EvalKeys,
    ) -> Result<SimCiphertext<f64>> {
        eval.check_rotation(steps)?;
        Ok(rotate_slots(a, steps))
    }

    fn relinearize(
        &self,
        mut a: SimCiphertext<f64>,
        eval: &EvalKeys,
    ) -> Result<SimCiphertext<f64>> {
        if !eval.relin {
            return Err(Error::RelinKeysMissing);
        }
        a.size = 2;
        Ok(a)
    }

    fn mod_switch(&self, mut a: SimCiphertext<f64>) -> SimCiphertext<f64> {
        a.level += 1;
        a
    }

    fn rescale(
        &self,
        mut a: SimCiphertext<f64>,
        divisor: u32,
    ) -> SimCiphertext<f64> {
        a.scale = a.scale.saturating_sub(divisor);
        a.level += 1;
        a
    }

    fn supports_bootstrap() -> bool {
        true
    }

    fn bootstrap(
        &self,
        mut a: SimCiphertext<f64>,
        key: &BootstrapKey,
    ) -> Result<SimCiphertext<f64>> {
        if a.key_id != key.key_id {
            return Err(Error::KeyMismatch {
                cipher: a.key_id,
                keys: key.key_id,
            });
        }

        // Homomorphic decryption leaves a nearly fresh ciphertext.
        a.level = 1;
        a.size = 2;
        Ok(a)
    }
}

impl EvalEngine for OpenfheBfv {
    type Scalar = i64;

    fn backend() -> Backend {
        Backend::OpenfheBfv
    }

    fn new(slots: usize) -> Self {
        Self { slots }
    }

    fn slots(&self) -> usize {
        self.slots
    }

    fn encode(
        &self,
        raw: &[i64],
        scale: u32,
        level: u32,
    ) -> SimPlaintext<i64> {
        encode_plain(raw, scale, level)
    }

    fn encrypt(
        &self,
        plain: &SimPlaintext<i64>,
        key: &PublicKey,
    ) -> SimCiphertext<i64> {
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
        a: SimCiphertext<i64>,
        b: &SimCiphertext<i64>,
    ) -> SimCiphertext<i64> {
        zip_cc(a, b, i64::slot_add)
    }

    fn add_cp(
        &self,
        a: SimCiphertext<i64>,
        b: &SimPlaintext<i64>,
    ) -> SimCiphertext<i64> {
        zip_cp(a, b, i64::slot_add)
    }

    fn sub_cc(
        &self,
        a: SimCiphertext<i64>,
        b: &SimCiphertext<i64>,
    ) -> SimCiphertext<i64> {
        zip_cc(a, b, i64::slot_sub)
    }

    fn sub_cp(
        &self,
        a: SimCiphertext<i64>,
        b: &SimPlaintext<i64>,
    ) -> SimCiphertext<i64> {
        zip_cp(a, b, i64::slot_sub)
    }

    fn mul_cc(
        &self,
        a: SimCiphertext<i64>,
        b: &SimCiphertext<i64>,
    ) -> SimCiphertext<i64> {
        let level = a.level.max(b.level) + 1;
        let mut out = zip_cc(a, b, i64::slot_mul);
        out.level = level;
        out.size = 3;
        out
    }

    fn mul_cp(
        &self,
        a: SimCiphertext<i64>,
        b: &SimPlaintext<i64>,
    ) -> SimCiphertext<i64> {
        zip_cp(a, b, i64::slot_mul)
    }

    fn negate(&self, a: SimCiphertext<i64>) -> SimCiphertext<i64> {
        map_slots(a, i64::slot_neg)
    }

    fn rotate(
        &self,
        a: SimCiphertext<i64>,
        steps: i32,
        eval: &EvalKeys,
    ) -> Result<SimCiphertext<i64>> {
        eval.check_rotation(steps)?;
        Ok(rotate_slots(a, steps))
    }

    fn relinearize(
        &self,
        mut a: SimCiphertext<i64>,
        eval: &EvalKeys,
    ) -> Result<SimCiphertext<i64>> {
        if !eval.relin {
            return Err(Error::RelinKeysMissing);
        }
        a.size = 2;
        Ok(a)
    }

    fn mod_switch(&self, mut a: SimCiphertext<i64>) -> SimCiphertext<i64> {
        a.level += 1;
        a
    }

    fn rescale(
        &self,
        a: SimCiphertext<i64>,
        _divisor: u32,
    ) -> SimCiphertext<i64> {
        a
    }
}
