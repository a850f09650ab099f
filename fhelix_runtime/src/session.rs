//! Per-backend compiled state: parameters, signature, keys, and the
//! encrypted input/output valuations. The artifacts are all optional so
//! that different parties can hold different subsets: a key-generation
//! party needs only the parameters, an evaluating party only the
//! evaluation context, a decrypting party only the secret key.

use std::collections::BTreeMap;
use std::marker::PhantomData;

use rand::Rng;
use serde::{Deserialize, Serialize};

use fhelix_backend::{EncryptionParams, Signature, Transpiled};
use fhelix_dag::{Dag, DagSerializePara, DataType};

use crate::executor::Executor;
use crate::{
    BootstrapKey, Error, EvalEngine, EvalKeys, PublicKey, Result,
    RuntimeValue, SecretKey, SlotValue, Valuation,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * The scheme-parameter and key bundle a program serializes, gated by
 * [`DagSerializePara`] flags.
 */
pub struct AloInfoMsg {
    /**
     * The scheme parameters (the `genkey_info` flag).
     */
    pub params: Option<EncryptionParams>,

    /**
     * The per-input signature (the `sig_info` flag).
     */
    pub signature: Option<Signature>,

    /**
     * The evaluation keys (the `exe_ctx` flag).
     */
    pub eval: Option<EvalKeys>,

    /**
     * The public key (the `encrypt_ctx` flag).
     */
    pub public: Option<PublicKey>,

    /**
     * The secret key (the `decrypt_ctx` flag).
     */
    pub secret: Option<SecretKey>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
/**
 * A serialized encrypted valuation.
 */
pub struct ValuationMsg<T> {
    /**
     * The named runtime values.
     */
    pub entries: Vec<(String, RuntimeValue<T>)>,
}

/**
 * The compiled state for one backend `E`.
 */
pub struct Session<E: EvalEngine> {
    /**
     * The selected encryption parameters.
     */
    pub params: Option<EncryptionParams>,

    /**
     * The per-input encoding signature.
     */
    pub signature: Option<Signature>,

    /**
     * The evaluation keys.
     */
    pub eval_keys: Option<EvalKeys>,

    /**
     * The public key.
     */
    pub public_key: Option<PublicKey>,

    /**
     * The secret key.
     */
    pub secret_key: Option<SecretKey>,

    /**
     * The bootstrapping key, present only on backends that support it.
     */
    pub bootstrap_key: Option<BootstrapKey>,

    /**
     * Encrypted inputs, seeded by `encrypt` or loaded from a peer.
     */
    pub enc_inputs: BTreeMap<String, RuntimeValue<E::Scalar>>,

    /**
     * Encrypted outputs left by `execute` or loaded from a peer.
     */
    pub enc_outputs: BTreeMap<String, RuntimeValue<E::Scalar>>,

    _engine: PhantomData<E>,
}

impl<E: EvalEngine> std::fmt::Debug for Session<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("params", &self.params)
            .field("signature", &self.signature)
            .field("eval_keys", &self.eval_keys)
            .field("public_key", &self.public_key)
            .field("secret_key", &self.secret_key)
            .field("bootstrap_key", &self.bootstrap_key)
            .field("enc_inputs", &self.enc_inputs)
            .field("enc_outputs", &self.enc_outputs)
            .finish()
    }
}

impl<E: EvalEngine> Session<E> {
    /**
     * Creates an empty session; artifacts arrive by deserialization.
     */
    pub fn empty() -> Self {
        Self {
            params: None,
            signature: None,
            eval_keys: None,
            public_key: None,
            secret_key: None,
            bootstrap_key: None,
            enc_inputs: BTreeMap::new(),
            enc_outputs: BTreeMap::new(),
            _engine: PhantomData,
        }
    }

    /**
     * Creates a session from a freshly transpiled program.
     */
    pub fn from_transpiled(transpiled: Transpiled) -> Self {
        let mut session = Self::empty();
        session.params = Some(transpiled.params);
        session.signature = Some(transpiled.signature);
        session
    }

    fn slots(&self) -> Result<usize> {
        self.signature
            .as_ref()
            .map(|s| s.vec_size as usize)
            .ok_or(Error::MissingArtifact("signature"))
    }

    fn engine(&self) -> Result<E> {
        Ok(E::new(self.slots()?))
    }

    /**
     * Generates the key set for the selected parameters: public, secret,
     * and evaluation keys covering the compiled rotation steps, plus a
     * bootstrapping key on backends that can refresh ciphertexts.
     */
    pub fn gen_keys(&mut self) -> Result<()> {
        let params =
            self.params.as_ref().ok_or(Error::GenKeyParamsMissing)?;

        let mut rng = rand::thread_rng();
        let key_id: u64 = rng.gen();
        let seed: u64 = rng.gen();

        self.public_key = Some(PublicKey { key_id });
        self.secret_key = Some(SecretKey { key_id, seed });
        self.eval_keys = Some(EvalKeys {
            key_id,
            rotations: params.rotations().clone(),
            relin: true,
        });

        if E::supports_bootstrap() {
            let material = (0..32).map(|_| rng.gen()).collect();
            self.bootstrap_key = Some(BootstrapKey { key_id, material });
        }

        Ok(())
    }

    /**
     * Encodes and encrypts a plaintext valuation per the signature,
     * merging into (or, with `replace`, supplanting) any previously
     * seeded inputs.
     */
    pub fn encrypt(
        &mut self,
        inputs: &Valuation,
        replace: bool,
    ) -> Result<()> {
        let signature = self
            .signature
            .clone()
            .ok_or(Error::MissingArtifact("signature"))?;
        let public = self
            .public_key
            .clone()
            .ok_or(Error::EncryptContextMissing)?;

        let engine = self.engine()?;
        let slots = engine.slots();

        if replace {
            self.enc_inputs.clear();
        }

        for (name, value) in inputs {
            let info = signature.inputs.get(name).ok_or_else(|| {
                Error::IrError(fhelix_dag::Error::UnknownInput(name.clone()))
            })?;

            let raw = E::Scalar::broadcast(value, slots)?;

            let encrypted = match info.data_type {
                DataType::Cipher => {
                    let plain =
                        engine.encode(&raw, info.scale, info.level);
                    RuntimeValue::Cipher(engine.encrypt(&plain, &public))
                }
                DataType::Plain => RuntimeValue::Plain(
                    engine.encode(&raw, info.scale, info.level),
                ),
                _ => RuntimeValue::Raw(raw),
            };

            self.enc_inputs.insert(name.clone(), encrypted);
        }

        Ok(())
    }

    /**
     * Evaluates `dag` over the seeded inputs and merges the results into
     * the output valuation.
     */
    pub fn execute(&mut self, dag: &mut Dag) -> Result<()> {
        let eval =
            self.eval_keys.clone().ok_or(Error::ExecContextMissing)?;
        let engine = self.engine()?;

        let executor = Executor::new(
            &engine,
            &eval,
            self.bootstrap_key.as_ref(),
            dag.enable_bootstrap,
            dag.after_reduction_depth,
        );

        let outputs = executor.run(dag, &self.enc_inputs)?;
        self.enc_outputs.extend(outputs);

        Ok(())
    }

    /**
     * Decrypts every held output into a plaintext valuation.
     */
    pub fn decrypt(&self) -> Result<Valuation> {
        let secret = self
            .secret_key
            .as_ref()
            .ok_or(Error::DecryptContextMissing)?;

        if self.enc_outputs.is_empty() {
            return Err(Error::DecryptEmptyResult);
        }

        let engine = self.engine()?;
        let mut valuation = Valuation::new();

        for (name, value) in &self.enc_outputs {
            let slots = match value {
                RuntimeValue::Cipher(c) => engine.decrypt(c, secret)?,
                RuntimeValue::Plain(p) => p.slots.clone(),
                RuntimeValue::Raw(raw) => raw.clone(),
            };
            valuation.insert(name.clone(), E::Scalar::into_value(slots));
        }

        Ok(valuation)
    }

    /**
     * Bundles the artifacts the serialization flags ask for. A raised
     * flag whose artifact is absent is an error.
     */
    pub fn alo_info(&self, para: &DagSerializePara) -> Result<AloInfoMsg> {
        fn want<T: Clone>(
            flag: bool,
            value: &Option<T>,
            what: &'static str,
        ) -> Result<Option<T>> {
            if !flag {
                return Ok(None);
            }
            value
                .clone()
                .map(Some)
                .ok_or(Error::MissingArtifact(what))
        }

        Ok(AloInfoMsg {
            params: want(
                para.need_genkey_info,
                &self.params,
                "scheme parameters",
            )?,
            signature: want(
                para.need_sig_info,
                &self.signature,
                "signature",
            )?,
            eval: want(para.need_exe_ctx, &self.eval_keys, "evaluation keys")?,
            public: want(
                para.need_encrypt_ctx,
                &self.public_key,
                "public key",
            )?,
            secret: want(
                para.need_decrypt_ctx,
                &self.secret_key,
                "secret key",
            )?,
        })
    }

    /**
     * Merges a deserialized artifact bundle into this session. Present
     * artifacts overwrite; absent ones leave existing state alone.
     */
    pub fn load_alo_info(&mut self, msg: AloInfoMsg) {
        if let Some(params) = msg.params {
            self.params = Some(params);
        }
        if let Some(signature) = msg.signature {
            self.signature = Some(signature);
        }
        if let Some(eval) = msg.eval {
            self.eval_keys = Some(eval);
        }
        if let Some(public) = msg.public {
            self.public_key = Some(public);
        }
        if let Some(secret) = msg.secret {
            self.secret_key = Some(secret);
        }
    }

    /**
     * The encrypted input valuation as a message.
     */
    pub fn input_msg(&self) -> ValuationMsg<E::Scalar> {
        ValuationMsg {
            entries: self
                .enc_inputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /**
     * Loads an encrypted input valuation, merging or replacing.
     */
    pub fn load_input_msg(
        &mut self,
        msg: ValuationMsg<E::Scalar>,
        replace: bool,
    ) {
        if replace {
            self.enc_inputs.clear();
        }
        self.enc_inputs.extend(msg.entries);
    }

    /**
     * The encrypted output valuation as a message.
     */
    pub fn output_msg(&self) -> ValuationMsg<E::Scalar> {
        ValuationMsg {
            entries: self
                .enc_outputs
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /**
     * Loads an encrypted output valuation, merging with held outputs.
     */
    pub fn load_output_msg(&mut self, msg: ValuationMsg<E::Scalar>) {
        self.enc_outputs.extend(msg.entries);
    }
}

