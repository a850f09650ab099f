use fhelix::*;

#[test]
fn integer_square_plus_one_is_exact() {
    let dag = init_dag("bfv_square");
    let x = set_input(&dag, "x");
    set_output(&dag, "out", x.clone() * x + 1i64).unwrap();

    compile(&dag).unwrap();
    assert_eq!(lib_info(&dag), vec!["seal_bfv".to_string()]);

    gen_keys(&dag).unwrap();

    let mut inputs = Valuation::new();
    inputs.insert("x".to_string(), Value::VecI64(vec![2; 1024]));
    encrypt(&dag, &inputs, false).unwrap();
    execute(&dag).unwrap();

    let outputs = decrypt(&dag).unwrap();
    assert_eq!(
        outputs.get("out"),
        Some(&Value::VecI64(vec![5; 1024]))
    );
}

#[test]
fn deep_integer_chains_upgrade_to_openfhe() {
    let dag = init_dag("bfv_deep");
    let x = set_input(&dag, "x");

    let mut acc = x.clone() * x.clone() - x.clone();
    for _ in 1..12 {
        acc = acc * x.clone() - x.clone();
    }
    set_output(&dag, "out", acc - 1i64).unwrap();

    compile(&dag).unwrap();
    assert_eq!(lib_info(&dag), vec!["openfhe_bfv".to_string()]);

    gen_keys(&dag).unwrap();

    let mut inputs = Valuation::new();
    inputs.insert("x".to_string(), Value::I64(2));
    encrypt(&dag, &inputs, false).unwrap();
    execute(&dag).unwrap();

    // 2*2 - 2 = 2 at every step, minus the trailing 1.
    let outputs = decrypt(&dag).unwrap();
    assert_eq!(
        outputs.get("out"),
        Some(&Value::VecI64(vec![1; 1024]))
    );
}

#[test]
fn scalar_inputs_broadcast_to_every_slot() {
    let dag = init_dag_sized("bfv_scalar", 16).unwrap();
    let x = set_input(&dag, "x");
    set_output(&dag, "out", x * 7i64).unwrap();

    compile(&dag).unwrap();
    gen_keys(&dag).unwrap();

    let mut inputs = Valuation::new();
    inputs.insert("x".to_string(), Value::I64(3));
    encrypt(&dag, &inputs, false).unwrap();
    execute(&dag).unwrap();

    let outputs = decrypt(&dag).unwrap();
    assert_eq!(outputs.get("out"), Some(&Value::VecI64(vec![21; 16])));
}

#[test]
fn wrong_length_vectors_are_rejected() {
    let dag = init_dag_sized("bfv_len", 16).unwrap();
    let x = set_input(&dag, "x");
    set_output(&dag, "out", x + 1i64).unwrap();

    compile(&dag).unwrap();
    gen_keys(&dag).unwrap();

    let mut inputs = Valuation::new();
    inputs.insert("x".to_string(), Value::VecI64(vec![1; 8]));

    let err = encrypt(&dag, &inputs, false).unwrap_err();
    assert!(matches!(err, Error::InputLengthMismatch { .. }));
}
