//! The SEAL-style engines: explicit scale and level management driven by
//! the `Rescale`, `ModSwitch`, and `Relinearize` nodes the compiler
//! scheduled.

use super::sim::{
    ckks_noise, encode_plain, map_slots, rotate_slots, zip_cc, zip_cp,
};
use crate::{
    Backend, EvalEngine, EvalKeys, PublicKey, Result, SimCiphertext,
    SimPlaintext, SlotValue,
};

/**
 * CKKS on the SEAL-style evaluator: `f64` slots, multiplication sums
 * scales and grows the polynomial size, rescaling divides the scale back
 * down and consumes a level.
 */
pub struct SealCkks {
    slots: usize,
}

/**
 * BFV on the SEAL-style evaluator: exact `i64` slots with wrapping
 * arithmetic; levels stay flat because BFV has no rescale.
 */
pub struct SealBfv {
    slots: usize,
}

impl EvalEngine for SealCkks {
    type Scalar = f64;

    fn backend() -> Backend {
        Backend::SealCkks
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
            level: plain.level,
            size: 2,
        }
    }

    fn add_cc(
        &self,
        a: SimCiphertext<f64>,
        b: &SimCiphertext<f64>,
    ) -> SimCiphertext<f64> {
        zip_cc(a, b, f64::slot_add)
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
        zip_cc(a, b, f64::slot_sub)
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
        let scale = a.scale + b.scale;
        let level = a.level.max(b.level);
        let mut out = zip_cc(a, b, f64::slot_mul);
        out.scale = scale;
        out.level = level;
        out.size = 3;
        out
    }

    fn mul_cp(
        &self,
        a: SimCiphertext<f64>,
        b: &SimPlaintext<f64>,
    ) -> SimCiphertext<f64> {
        let scale = a.scale + b.scale;
        let mut out = zip_cp(a, b, f64::slot_mul);
        out.scale = scale;
        out
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
            return Err(crate::Error::RelinKeysMissing);
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
}

impl EvalEngine for SealBfv {
    type Scalar = i64;

    fn backend() -> Backend {
        Backend::SealBfv
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
            level: plain.level,
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
        let mut out = zip_cc(a, b, i64::slot_mul);
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
            return Err(crate::Error::RelinKeysMissing);
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
        // BFV has no rescale; the compiler never schedules one.
        a
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SecretKey;

    fn keys() -> (PublicKey, SecretKey, EvalKeys) {
        (
            PublicKey { key_id: 7 },
            SecretKey { key_id: 7, seed: 1 },
            EvalKeys {
                key_id: 7,
                rotations: [2].into_iter().collect(),
                relin: true,
            },
        )
    }

    #[test]
    fn ckks_round_trip_is_approximate() {
        let engine = SealCkks::new(4);
        let (pk, sk, _) = keys();

        let plain = engine.encode(&[1.5, -2.5, 0.0, 9.0], 60, 0);
        let cipher = engine.encrypt(&plain, &pk);
        let decrypted = engine.decrypt(&cipher, &sk).unwrap();

        for (got, want) in decrypted.iter().zip([1.5, -2.5, 0.0, 9.0]) {
            assert!((got - want).abs() < 1e-3);
        }
    }

    #[test]
    fn bfv_round_trip_is_exact() {
        let engine = SealBfv::new(4);
        let (pk, sk, _) = keys();

        let plain = engine.encode(&[1, -2, 0, 9], 60, 0);
        let cipher = engine.encrypt(&plain, &pk);

        assert_eq!(engine.decrypt(&cipher, &sk).unwrap(), vec![1, -2, 0, 9]);
    }

    #[test]
    fn decryption_checks_the_key_set() {
        let engine = SealBfv::new(2);
        let (pk, _, _) = keys();

        let cipher = engine.encrypt(&engine.encode(&[1, 2], 60, 0), &pk);
        let wrong = SecretKey { key_id: 8, seed: 2 };

        assert!(engine.decrypt(&cipher, &wrong).is_err());
    }

    #[test]
    fn multiplication_tracks_scale_and_size() {
        let engine = SealCkks::new(2);
        let (pk, _, eval) = keys();

        let a = engine.encrypt(&engine.encode(&[2.0, 3.0], 60, 0), &pk);
        let b = engine.encrypt(&engine.encode(&[4.0, 5.0], 60, 0), &pk);

        let prod = engine.mul_cc(a, &b);
        assert_eq!(prod.scale, 120);
        assert_eq!(prod.size, 3);

        let relin = engine.relinearize(prod, &eval).unwrap();
        assert_eq!(relin.size, 2);

        let rescaled = engine.rescale(relin, 60);
        assert_eq!(rescaled.scale, 60);
        assert_eq!(rescaled.level, 1);
    }

    #[test]
    fn rotations_need_their_galois_key() {
        let engine = SealCkks::new(4);
        let (pk, _, eval) = keys();

        let c =
            engine.encrypt(&engine.encode(&[1.0, 2.0, 3.0, 4.0], 60, 0), &pk);

        let rotated = engine.rotate(c.clone(), 2, &eval).unwrap();
        assert!((rotated.slots[0] - 3.0).abs() < 1e-6);

        assert!(engine.rotate(c, 1, &eval).is_err());
    }
}
