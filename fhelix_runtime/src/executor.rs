//! The scheme-parametric graph interpreter. Written once over
//! [`EvalEngine`] and instantiated per backend.

use std::collections::BTreeMap;

use log::trace;

use fhelix_dag::attr::{
    ConstValue, ConstValueInt64, EncodeAtLevel, EncodeAtScale,
    RescaleDivisor, Rotation,
};
use fhelix_dag::{
    forward_pass, Dag, NodeIndex, NodeMap, NodeMapOptional, Op,
    LEVELS_BEFORE_BOOTSTRAP, MAX_MULT_DEPTH_NO_BOOT,
};

use crate::{
    BootstrapKey, Error, EvalEngine, EvalKeys, Result, RuntimeValue,
    SimCiphertext, SlotValue,
};

/**
 * Evaluates a compiled DAG. Before traversal the executor counts each
 * node's out-degree; during traversal an operand whose remaining-use
 * count reaches zero is moved into the consuming operation instead of
 * copied, and dead non-output values are freed eagerly.
 *
 * A fatal fault (an opcode with the wrong operand count or type) latches:
 * every later visit short-circuits, and [`Executor::run`] reports the
 * first fault. Traversal does not rewind or compensate.
 */
pub struct Executor<'a, E: EvalEngine> {
    engine: &'a E,
    eval: &'a EvalKeys,
    bootstrap: Option<&'a BootstrapKey>,
    enable_bootstrap: bool,
    final_depth: u32,
}

impl<'a, E: EvalEngine> Executor<'a, E> {
    /**
     * Creates an executor borrowing the engine and evaluation keys.
     * `final_depth` is the program's post-reduction multiplicative depth,
     * used by the bootstrapping thresholds.
     */
    pub fn new(
        engine: &'a E,
        eval: &'a EvalKeys,
        bootstrap: Option<&'a BootstrapKey>,
        enable_bootstrap: bool,
        final_depth: u32,
    ) -> Self {
        Self {
            engine,
            eval,
            bootstrap,
            enable_bootstrap,
            final_depth,
        }
    }

    /**
     * Runs the DAG forward, seeding `inputs` into the input nodes, and
     * returns the values left in the named output nodes.
     */
    pub fn run(
        &self,
        dag: &mut Dag,
        inputs: &BTreeMap<String, RuntimeValue<E::Scalar>>,
    ) -> Result<BTreeMap<String, RuntimeValue<E::Scalar>>> {
        let mut remaining: NodeMap<u32> = NodeMap::new(dag);
        for node in dag.node_indices() {
            remaining.set(node, dag.node(node).num_uses() as u32);
        }

        let mut values: NodeMapOptional<RuntimeValue<E::Scalar>> =
            NodeMapOptional::new(dag);
        for (name, node) in dag.inputs() {
            if let Some(value) = inputs.get(name) {
                values.set(*node, value.clone());
            }
        }

        let mut fault: Option<Error> = None;

        forward_pass(dag, |dag, node| {
            if fault.is_some() {
                return;
            }
            if let Err(err) = self.visit(dag, node, &mut values, &mut remaining)
            {
                fault = Some(err);
            }
        });

        if let Some(err) = fault {
            return Err(err);
        }

        let mut outputs = BTreeMap::new();
        for (name, node) in dag.outputs() {
            if let Some(value) = values.get(*node) {
                outputs.insert(name.clone(), value);
            }
        }

        Ok(outputs)
    }

    fn visit(
        &self,
        dag: &Dag,
        node: NodeIndex,
        values: &mut NodeMapOptional<RuntimeValue<E::Scalar>>,
        remaining: &mut NodeMap<u32>,
    ) -> Result<()> {
        let op = dag.node(node).op;
        trace!("execute {node} = {op}");

        if op == Op::Input {
            // Unseeded inputs are legal as long as nothing consumes them;
            // a use of one faults when it finds no operand value.
            return Ok(());
        }

        let args = dag.node(node).operands().to_vec();

        // An operand whose last use this is may donate its storage.
        let mut eligible = vec![false; args.len()];
        for (i, arg) in args.iter().enumerate() {
            let left = remaining.get(*arg).saturating_sub(1);
            remaining.set(*arg, left);
            if left == 0 {
                eligible[i] = true;
            }
        }

        let result = self.dispatch(dag, node, &args, &eligible, values)?;
        values.set(node, result);

        // Free anything that just died and was not moved.
        for (i, arg) in args.iter().enumerate() {
            if eligible[i]
                && values.has(*arg)
                && dag.node(*arg).op != Op::Output
            {
                values.unset(*arg);
            }
        }

        Ok(())
    }

    fn arg(
        &self,
        values: &mut NodeMapOptional<RuntimeValue<E::Scalar>>,
        node: NodeIndex,
        eligible: bool,
    ) -> Result<RuntimeValue<E::Scalar>> {
        let value = if eligible {
            values.take(node)
        } else {
            values.get(node)
        };

        value.ok_or_else(|| {
            Error::ExecutorFault(format!("operand {node} has no value"))
        })
    }

    fn dispatch(
        &self,
        dag: &Dag,
        node: NodeIndex,
        args: &[NodeIndex],
        eligible: &[bool],
        values: &mut NodeMapOptional<RuntimeValue<E::Scalar>>,
    ) -> Result<RuntimeValue<E::Scalar>> {
        let op = dag.node(node).op;
        let fault = |msg: &str| {
            Err(Error::ExecutorFault(format!("{op} at {node}: {msg}")))
        };

        match op {
            Op::Constant => self.expand_constant(dag, node),
            Op::Encode => {
                if args.len() != 1 {
                    return fault("expected one operand");
                }
                let scale =
                    dag.node(node).get::<EncodeAtScale>().unwrap_or(0);
                let level =
                    dag.node(node).get::<EncodeAtLevel>().unwrap_or(0);

                match self.arg(values, args[0], eligible[0])? {
                    RuntimeValue::Raw(raw) => Ok(RuntimeValue::Plain(
                        self.engine.encode(&raw, scale, level),
                    )),
                    _ => fault("operand is not raw"),
                }
            }
            Op::Add | Op::Sub | Op::Mul | Op::Div => {
                if args.len() != 2 {
                    return fault("expected two operands");
                }
                let a = self.arg(values, args[0], eligible[0])?;
                let b = self.arg(values, args[1], eligible[1])?;
                self.binary(op, a, b, node)
            }
            Op::RotateLeftConst | Op::RotateRightConst => {
                if args.len() != 1 {
                    return fault("expected one operand");
                }
                let amount =
                    dag.node(node).get::<Rotation>().unwrap_or(0) as i32;
                let steps = if op == Op::RotateRightConst {
                    -amount
                } else {
                    amount
                };

                match self.arg(values, args[0], eligible[0])? {
                    RuntimeValue::Raw(raw) => {
                        Ok(RuntimeValue::Raw(rotate_raw(raw, steps)))
                    }
                    RuntimeValue::Cipher(c) => Ok(RuntimeValue::Cipher(
                        self.engine.rotate(c, steps, self.eval)?,
                    )),
                    RuntimeValue::Plain(_) => {
                        fault("rotation of a plaintext is unsupported")
                    }
                }
            }
            Op::Negate => {
                if args.len() != 1 {
                    return fault("expected one operand");
                }
                match self.arg(values, args[0], eligible[0])? {
                    RuntimeValue::Raw(mut raw) => {
                        for slot in raw.iter_mut() {
                            *slot = E::Scalar::slot_neg(*slot);
                        }
                        Ok(RuntimeValue::Raw(raw))
                    }
                    RuntimeValue::Cipher(c) => {
                        Ok(RuntimeValue::Cipher(self.engine.negate(c)))
                    }
                    RuntimeValue::Plain(_) => {
                        fault("negation of a plaintext is unsupported")
                    }
                }
            }
            Op::Relinearize => {
                if args.len() != 1 {
                    return fault("expected one operand");
                }
                match self.arg(values, args[0], eligible[0])? {
                    RuntimeValue::Cipher(c) => Ok(RuntimeValue::Cipher(
                        self.engine.relinearize(c, self.eval)?,
                    )),
                    _ => fault("operand is not a ciphertext"),
                }
            }
            Op::ModSwitch => {
                if args.len() != 1 {
                    return fault("expected one operand");
                }
                match self.arg(values, args[0], eligible[0])? {
                    RuntimeValue::Cipher(c) => {
                        Ok(RuntimeValue::Cipher(self.engine.mod_switch(c)))
                    }
                    _ => fault("operand is not a ciphertext"),
                }
            }
            Op::Rescale => {
                if args.len() != 1 {
                    return fault("expected one operand");
                }
                let divisor =
                    dag.node(node).get::<RescaleDivisor>().unwrap_or(0);
                match self.arg(values, args[0], eligible[0])? {
                    RuntimeValue::Cipher(c) => Ok(RuntimeValue::Cipher(
                        self.engine.rescale(c, divisor),
                    )),
                    _ => fault("operand is not a ciphertext"),
                }
            }
            Op::Output => {
                if args.len() != 1 {
                    return fault("expected one operand");
                }
                self.arg(values, args[0], eligible[0])
            }
            _ => fault("opcode is not executable"),
        }
    }

    fn expand_constant(
        &self,
        dag: &Dag,
        node: NodeIndex,
    ) -> Result<RuntimeValue<E::Scalar>> {
        let slots = self.engine.slots();

        if let Some(constant) = dag.node(node).get::<ConstValue>() {
            let raw = constant
                .expand_to(slots)
                .map_err(Error::IrError)?
                .into_iter()
                .map(E::Scalar::from_f64)
                .collect();
            return Ok(RuntimeValue::Raw(raw));
        }

        if let Some(constant) = dag.node(node).get::<ConstValueInt64>() {
            let raw = constant
                .expand_to(slots)
                .map_err(Error::IrError)?
                .into_iter()
                .map(E::Scalar::from_i64)
                .collect();
            return Ok(RuntimeValue::Raw(raw));
        }

        Err(Error::ExecutorFault(format!(
            "constant {node} carries no value"
        )))
    }

    fn binary(
        &self,
        op: Op,
        a: RuntimeValue<E::Scalar>,
        b: RuntimeValue<E::Scalar>,
        node: NodeIndex,
    ) -> Result<RuntimeValue<E::Scalar>> {
        use RuntimeValue::*;

        let fault = |msg: &str| {
            Err(Error::ExecutorFault(format!("{op} at {node}: {msg}")))
        };

        match (op, a, b) {
            // Raw operands compute slot-wise with no backend involved.
            (_, Raw(mut a), Raw(b)) => {
                if a.len() != b.len() {
                    return fault("raw operand lengths differ");
                }
                let f: fn(E::Scalar, E::Scalar) -> E::Scalar = match op {
                    Op::Add => E::Scalar::slot_add,
                    Op::Sub => E::Scalar::slot_sub,
                    Op::Mul => E::Scalar::slot_mul,
                    _ => E::Scalar::slot_div,
                };
                for (slot, rhs) in a.iter_mut().zip(b) {
                    *slot = f(*slot, rhs);
                }
                Ok(Raw(a))
            }

            (Op::Add, Cipher(a), Cipher(b)) => {
                Ok(Cipher(self.engine.add_cc(a, &b)))
            }
            (Op::Add, Cipher(a), Plain(b)) | (Op::Add, Plain(b), Cipher(a)) => {
                Ok(Cipher(self.engine.add_cp(a, &b)))
            }

            (Op::Sub, Cipher(a), Cipher(b)) => {
                Ok(Cipher(self.engine.sub_cc(a, &b)))
            }
            (Op::Sub, Cipher(a), Plain(b)) => {
                Ok(Cipher(self.engine.sub_cp(a, &b)))
            }
            (Op::Sub, Plain(a), Cipher(b)) => {
                // plain - cipher rewrites as negate-then-add.
                let negated = self.engine.negate(b);
                Ok(Cipher(self.engine.add_cp(negated, &a)))
            }

            (Op::Mul, Cipher(a), Cipher(b)) => {
                let product = self.engine.mul_cc(a, &b);
                Ok(Cipher(self.maybe_bootstrap(product)?))
            }
            (Op::Mul, Cipher(a), Plain(b)) | (Op::Mul, Plain(b), Cipher(a)) => {
                Ok(Cipher(self.engine.mul_cp(a, &b)))
            }

            (Op::Div, Cipher(a), Cipher(b)) => {
                Ok(Cipher(self.engine.div_cc(a, &b)?))
            }
            (Op::Div, Cipher(a), Plain(b)) => {
                Ok(Cipher(self.engine.div_cp(a, &b)?))
            }
            (Op::Div, Plain(a), Cipher(b)) => {
                Ok(Cipher(self.engine.div_pc(&a, b)?))
            }

            _ => fault("unsupported operand mix"),
        }
    }

    /*
     * The bootstrapping hook. After a cipher multiplication, refresh when
     * the level first crosses the no-bootstrap ceiling or comes within
     * two of the final depth.
     */
    fn maybe_bootstrap(
        &self,
        cipher: SimCiphertext<E::Scalar>,
    ) -> Result<SimCiphertext<E::Scalar>> {
        if !self.enable_bootstrap || !E::supports_bootstrap() {
            return Ok(cipher);
        }

        let level = cipher.level;
        let reserve =
            self.final_depth.saturating_sub(LEVELS_BEFORE_BOOTSTRAP);
        let ceiling = self.final_depth.saturating_sub(2);

        let crossed_first =
            level >= MAX_MULT_DEPTH_NO_BOOT && level < reserve;
        let near_final = level >= ceiling;

        if crossed_first || near_final {
            let key = self
                .bootstrap
                .ok_or(Error::MissingArtifact("bootstrapping key"))?;
            trace!("bootstrapping at level {level}");
            return self.engine.bootstrap(cipher, key);
        }

        Ok(cipher)
    }
}

fn rotate_raw<T: SlotValue>(mut raw: Vec<T>, steps: i32) -> Vec<T> {
    let len = raw.len();
    if len == 0 {
        return raw;
    }
    let steps = steps.rem_euclid(len as i32) as usize;
    raw.rotate_left(steps);
    raw
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engines::SealBfv;
    use crate::PublicKey;
    use fhelix_dag::DataType;

    fn eval_keys() -> EvalKeys {
        EvalKeys {
            key_id: 1,
            rotations: (-8..8).collect(),
            relin: true,
        }
    }

    fn cipher_of(engine: &SealBfv, values: &[i64]) -> RuntimeValue<i64> {
        let pk = PublicKey { key_id: 1 };
        RuntimeValue::Cipher(
            engine.encrypt(&engine.encode(values, 0, 0), &pk),
        )
    }

    #[test]
    fn straight_line_program_executes() {
        let mut dag = Dag::new("exec", 4).unwrap();
        let x = dag.make_input("x", DataType::Cipher);
        let c = dag.make_int64_dense_constant(vec![1]).unwrap();
        let encode = dag.make_node(Op::Encode, &[c]);
        let mul = dag.make_node(Op::Mul, &[x, x]);
        let add = dag.make_node(Op::Add, &[mul, encode]);
        dag.make_output("out", add);

        let engine = SealBfv::new(4);
        let eval = eval_keys();
        let executor = Executor::new(&engine, &eval, None, false, 1);

        let mut inputs = BTreeMap::new();
        inputs.insert("x".to_string(), cipher_of(&engine, &[2, 2, 2, 2]));

        let outputs = executor.run(&mut dag, &inputs).unwrap();
        match outputs.get("out").unwrap() {
            RuntimeValue::Cipher(c) => {
                assert_eq!(c.slots, vec![5, 5, 5, 5])
            }
            other => panic!("expected a ciphertext, got {other:?}"),
        }
    }

    #[test]
    fn rotation_by_zero_is_a_no_op() {
        let mut dag = Dag::new("exec", 4).unwrap();
        let x = dag.make_input("x", DataType::Cipher);
        let rot = dag.make_left_rotation(x, 0);
        dag.make_output("out", rot);

        let engine = SealBfv::new(4);
        let eval = eval_keys();
        let executor = Executor::new(&engine, &eval, None, false, 0);

        let mut inputs = BTreeMap::new();
        inputs.insert("x".to_string(), cipher_of(&engine, &[1, 2, 3, 4]));

        let outputs = executor.run(&mut dag, &inputs).unwrap();
        match outputs.get("out").unwrap() {
            RuntimeValue::Cipher(c) => {
                assert_eq!(c.slots, vec![1, 2, 3, 4])
            }
            other => panic!("expected a ciphertext, got {other:?}"),
        }
    }

    #[test]
    fn raw_rotation_wraps_cyclically() {
        let mut dag = Dag::new("exec", 4).unwrap();
        let c = dag
            .make_int64_dense_constant(vec![1, 2, 3, 4])
            .unwrap();
        let rot = dag.make_right_rotation(c, 1);
        dag.make_output("out", rot);

        let engine = SealBfv::new(4);
        let eval = eval_keys();
        let executor = Executor::new(&engine, &eval, None, false, 0);

        let outputs = executor.run(&mut dag, &BTreeMap::new()).unwrap();
        match outputs.get("out").unwrap() {
            RuntimeValue::Raw(raw) => assert_eq!(raw, &vec![4, 1, 2, 3]),
            other => panic!("expected raw slots, got {other:?}"),
        }
    }

    #[test]
    fn missing_inputs_fault_the_executor() {
        let mut dag = Dag::new("exec", 4).unwrap();
        let x = dag.make_input("x", DataType::Cipher);
        let neg = dag.make_node(Op::Negate, &[x]);
        dag.make_output("out", neg);

        let engine = SealBfv::new(4);
        let eval = eval_keys();
        let executor = Executor::new(&engine, &eval, None, false, 0);

        let err = executor.run(&mut dag, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, Error::ExecutorFault(_)));
    }

    #[test]
    fn dead_intermediates_are_freed() {
        let mut dag = Dag::new("exec", 4).unwrap();
        let x = dag.make_input("x", DataType::Cipher);
        let m1 = dag.make_node(Op::Mul, &[x, x]);
        let m2 = dag.make_node(Op::Mul, &[m1, m1]);
        dag.make_output("out", m2);

        let engine = SealBfv::new(4);
        let eval = eval_keys();
        let executor = Executor::new(&engine, &eval, None, false, 2);

        let mut inputs = BTreeMap::new();
        inputs.insert("x".to_string(), cipher_of(&engine, &[3, 3, 3, 3]));

        let outputs = executor.run(&mut dag, &inputs).unwrap();
        match outputs.get("out").unwrap() {
            RuntimeValue::Cipher(c) => {
                assert_eq!(c.slots, vec![81, 81, 81, 81])
            }
            other => panic!("expected a ciphertext, got {other:?}"),
        }
    }
}
