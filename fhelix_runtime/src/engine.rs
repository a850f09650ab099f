use serde::{Deserialize, Serialize};

use crate::{Backend, Error, Result, SlotValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * A backend ciphertext in the reference evaluators: the slot payload plus
 * the bookkeeping a real lattice ciphertext carries: the key identity it
 * was produced under, its scale and level in the modulus chain, and its
 * polynomial component count (two fresh, three after a multiplication
 * until relinearized).
 *
 * The cryptographic kernels themselves are external collaborators; these
 * evaluators exercise every compiler and runtime contract against honest
 * bookkeeping.
 */
pub struct SimCiphertext<T> {
    /**
     * The key set this ciphertext belongs to.
     */
    pub key_id: u64,

    /**
     * The slot payload.
     */
    pub slots: Vec<T>,

    /**
     * The current scale in bits.
     */
    pub scale: u32,

    /**
     * The current level in the modulus chain.
     */
    pub level: u32,

    /**
     * Polynomial component count.
     */
    pub size: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * A backend-encoded plaintext: slots with the scale and level they were
 * encoded at.
 */
pub struct SimPlaintext<T> {
    /**
     * The slot payload.
     */
    pub slots: Vec<T>,

    /**
     * The scale the payload was encoded at.
     */
    pub scale: u32,

    /**
     * The level the payload was encoded at.
     */
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * The value living at a node during execution.
 */
pub enum RuntimeValue<T> {
    /**
     * A backend ciphertext.
     */
    Cipher(SimCiphertext<T>),

    /**
     * A backend plaintext.
     */
    Plain(SimPlaintext<T>),

    /**
     * An unencoded slot vector.
     */
    Raw(Vec<T>),
}

impl<T> RuntimeValue<T> {
    /**
     * True for the ciphertext variant.
     */
    pub fn is_cipher(&self) -> bool {
        matches!(self, RuntimeValue::Cipher(_))
    }

    /**
     * True for the plaintext variant.
     */
    pub fn is_plain(&self) -> bool {
        matches!(self, RuntimeValue::Plain(_))
    }

    /**
     * True for the raw variant.
     */
    pub fn is_raw(&self) -> bool {
        matches!(self, RuntimeValue::Raw(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * The public (encryption) key.
 */
pub struct PublicKey {
    /**
     * The key set this key belongs to.
     */
    pub key_id: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * The secret (decryption) key.
 */
pub struct SecretKey {
    /**
     * The key set this key belongs to.
     */
    pub key_id: u64,

    /**
     * The key material seed.
     */
    pub seed: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * The evaluation keys: relinearization plus one Galois key per rotation
 * step the compiled program performs.
 */
pub struct EvalKeys {
    /**
     * The key set these keys belong to.
     */
    pub key_id: u64,

    /**
     * The rotation steps covered by Galois keys.
     */
    pub rotations: std::collections::BTreeSet<i32>,

    /**
     * Whether relinearization keys were generated.
     */
    pub relin: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * A bootstrapping key. Serialized out-of-band as a raw byte stream
 * because real ones exceed the envelope's size limit.
 */
pub struct BootstrapKey {
    /**
     * The key set this key belongs to.
     */
    pub key_id: u64,

    /**
     * The key material.
     */
    pub material: Vec<u8>,
}

impl EvalKeys {
    /**
     * Fails unless a Galois key covers `step`.
     */
    pub fn check_rotation(&self, step: i32) -> Result<()> {
        if step == 0 || self.rotations.contains(&step) {
            Ok(())
        } else {
            Err(Error::RotationKeyMissing(step))
        }
    }
}

/**
 * The eight-odd primitive operations a backend must provide, plus
 * encoding, encryption, and key-sensitive bookkeeping. The executor is
 * written once against this trait and instantiated per backend.
 *
 * Operations consume their first ciphertext so storage moves instead of
 * copying when the executor's out-degree counting marks an operand dead.
 */
pub trait EvalEngine {
    /**
     * The slot element type.
     */
    type Scalar: SlotValue;

    /**
     * The backend this engine implements.
     */
    fn backend() -> Backend;

    /**
     * Creates an engine computing over `slots` slots.
     */
    fn new(slots: usize) -> Self;

    /**
     * The engine's slot count.
     */
    fn slots(&self) -> usize;

    /**
     * Encodes a raw vector at the given scale and level.
     */
    fn encode(
        &self,
        raw: &[Self::Scalar],
        scale: u32,
        level: u32,
    ) -> SimPlaintext<Self::Scalar>;

    /**
     * Encrypts an encoded plaintext under `key`.
     */
    fn encrypt(
        &self,
        plain: &SimPlaintext<Self::Scalar>,
        key: &PublicKey,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Decrypts a ciphertext under `key`. Fails when the ciphertext was
     * produced under a different key set.
     */
    fn decrypt(
        &self,
        cipher: &SimCiphertext<Self::Scalar>,
        key: &SecretKey,
    ) -> Result<Vec<Self::Scalar>> {
        if cipher.key_id != key.key_id {
            return Err(Error::KeyMismatch {
                cipher: cipher.key_id,
                keys: key.key_id,
            });
        }
        Ok(cipher.slots.clone())
    }

    /**
     * Ciphertext + ciphertext.
     */
    fn add_cc(
        &self,
        a: SimCiphertext<Self::Scalar>,
        b: &SimCiphertext<Self::Scalar>,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Ciphertext + plaintext.
     */
    fn add_cp(
        &self,
        a: SimCiphertext<Self::Scalar>,
        b: &SimPlaintext<Self::Scalar>,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Ciphertext - ciphertext.
     */
    fn sub_cc(
        &self,
        a: SimCiphertext<Self::Scalar>,
        b: &SimCiphertext<Self::Scalar>,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Ciphertext - plaintext.
     */
    fn sub_cp(
        &self,
        a: SimCiphertext<Self::Scalar>,
        b: &SimPlaintext<Self::Scalar>,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Ciphertext * ciphertext. The result has three polynomial
     * components until relinearized.
     */
    fn mul_cc(
        &self,
        a: SimCiphertext<Self::Scalar>,
        b: &SimCiphertext<Self::Scalar>,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Ciphertext * plaintext.
     */
    fn mul_cp(
        &self,
        a: SimCiphertext<Self::Scalar>,
        b: &SimPlaintext<Self::Scalar>,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Element-wise negation.
     */
    fn negate(
        &self,
        a: SimCiphertext<Self::Scalar>,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Galois rotation by `steps` (positive left, negative right).
     */
    fn rotate(
        &self,
        a: SimCiphertext<Self::Scalar>,
        steps: i32,
        eval: &EvalKeys,
    ) -> Result<SimCiphertext<Self::Scalar>>;

    /**
     * Reduces the ciphertext back to two polynomial components.
     */
    fn relinearize(
        &self,
        a: SimCiphertext<Self::Scalar>,
        eval: &EvalKeys,
    ) -> Result<SimCiphertext<Self::Scalar>>;

    /**
     * Drops the top prime without changing scale.
     */
    fn mod_switch(
        &self,
        a: SimCiphertext<Self::Scalar>,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Divides out `divisor` bits of scale and drops a level.
     */
    fn rescale(
        &self,
        a: SimCiphertext<Self::Scalar>,
        divisor: u32,
    ) -> SimCiphertext<Self::Scalar>;

    /**
     * Ciphertext / ciphertext. Only the small-integer backend divides
     * natively.
     */
    fn div_cc(
        &self,
        _a: SimCiphertext<Self::Scalar>,
        _b: &SimCiphertext<Self::Scalar>,
    ) -> Result<SimCiphertext<Self::Scalar>> {
        Err(Error::UnsupportedOperation {
            backend: Self::backend().name(),
            operation: "division",
        })
    }

    /**
     * Ciphertext / plaintext.
     */
    fn div_cp(
        &self,
        _a: SimCiphertext<Self::Scalar>,
        _b: &SimPlaintext<Self::Scalar>,
    ) -> Result<SimCiphertext<Self::Scalar>> {
        Err(Error::UnsupportedOperation {
            backend: Self::backend().name(),
            operation: "division",
        })
    }

    /**
     * Plaintext / ciphertext.
     */
    fn div_pc(
        &self,
        _a: &SimPlaintext<Self::Scalar>,
        _b: SimCiphertext<Self::Scalar>,
    ) -> Result<SimCiphertext<Self::Scalar>> {
        Err(Error::UnsupportedOperation {
            backend: Self::backend().name(),
            operation: "division",
        })
    }

    /**
     * Whether this engine can refresh ciphertexts.
     */
    fn supports_bootstrap() -> bool {
        false
    }

    /**
     * Refreshes a ciphertext's noise budget.
     */
    fn bootstrap(
        &self,
        _a: SimCiphertext<Self::Scalar>,
        _key: &BootstrapKey,
    ) -> Result<SimCiphertext<Self::Scalar>> {
        Err(Error::UnsupportedOperation {
            backend: Self::backend().name(),
            operation: "bootstrapping",
        })
    }
}
