//! Artifacts round-trip through their envelopes: programs structurally,
//! valuations exactly, and key bundles across parties.

use fhelix::*;

fn sample_program() -> DagHandle {
    let dag = init_dag_sized("roundtrip", 8).unwrap();
    let x = set_input(&dag, "x");
    let y = set_input(&dag, "y");
    set_output(&dag, "out", (x.clone() << 2u32) * y + x - 1.5).unwrap();
    dag
}

#[test]
fn dag_round_trip_preserves_results() {
    let dag = sample_program();

    set_serialize_para(&dag, true, false, false, false, false, false);
    let bytes = save_dag_to_bytes(&dag).unwrap();
    let restored = load_dag_from_bytes(&bytes).unwrap();

    // Both copies compile and agree on results.
    let run = |dag: &DagHandle| -> Valuation {
        compile(dag).unwrap();
        gen_keys(dag).unwrap();
        let mut inputs = Valuation::new();
        inputs.insert(
            "x".to_string(),
            Value::VecF64(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]),
        );
        inputs.insert("y".to_string(), Value::F64(2.0));
        encrypt(dag, &inputs, false).unwrap();
        execute(dag).unwrap();
        decrypt(dag).unwrap()
    };

    let original = run(&dag);
    let reloaded = run(&restored);

    let (a, b) = match (
        original.get("out").unwrap(),
        reloaded.get("out").unwrap(),
    ) {
        (Value::VecF64(a), Value::VecF64(b)) => (a.clone(), b.clone()),
        other => panic!("expected double vectors, got {other:?}"),
    };

    for (a, b) in a.iter().zip(b.iter()) {
        assert!((a - b).abs() < 1e-3);
    }
}

#[test]
fn serialization_round_trip_twice_is_stable() {
    let dag = sample_program();
    set_serialize_para(&dag, true, false, false, false, false, false);

    let once = save_dag_to_bytes(&dag).unwrap();
    let restored = load_dag_from_bytes(&once).unwrap();
    set_serialize_para(&restored, true, false, false, false, false, false);
    let twice = save_dag_to_bytes(&restored).unwrap();

    let again = load_dag_from_bytes(&twice).unwrap();
    set_serialize_para(&again, true, false, false, false, false, false);
    let thrice = save_dag_to_bytes(&again).unwrap();

    // After one normalizing pass, the byte stream is a fixed point.
    assert_eq!(twice, thrice);
}

#[test]
fn inputs_travel_between_parties() {
    let dag = init_dag_sized("parties", 4).unwrap();
    let x = set_input(&dag, "x");
    set_output(&dag, "out", x.clone() * x).unwrap();

    compile(&dag).unwrap();
    gen_keys(&dag).unwrap();

    // The data owner encrypts and serializes.
    let mut inputs = Valuation::new();
    inputs.insert("x".to_string(), Value::VecF64(vec![1.0, 2.0, 3.0, 4.0]));
    encrypt(&dag, &inputs, false).unwrap();
    let input_bytes = save_input_to_bytes(&dag).unwrap();

    // The evaluator holds the same program but no plaintext.
    set_serialize_para(&dag, true, true, true, true, true, true);
    let program_bytes = save_dag_to_bytes(&dag).unwrap();
    let evaluator = load_dag_from_bytes(&program_bytes).unwrap();

    load_input_from_bytes(&evaluator, &input_bytes, true).unwrap();
    execute(&evaluator).unwrap();

    let outputs = decrypt(&evaluator).unwrap();
    match outputs.get("out").unwrap() {
        Value::VecF64(v) => {
            for (got, want) in v.iter().zip([1.0, 4.0, 9.0, 16.0]) {
                assert!((got - want).abs() < 1e-3);
            }
        }
        other => panic!("expected a double vector, got {other:?}"),
    }
}

#[test]
fn missing_artifacts_fail_serialization() {
    let dag = sample_program();
    compile(&dag).unwrap();

    // Secret key requested but keys were never generated.
    set_serialize_para(&dag, false, false, false, false, false, true);
    let err = save_dag_to_bytes(&dag).unwrap_err();
    assert!(matches!(err, Error::MissingArtifact(_)));
}

#[test]
fn bootstrap_keys_stream_out_of_band() {
    let dag = init_dag("boot");
    let x = set_input(&dag, "x");

    let mut acc = x.clone() * x.clone() - x.clone();
    for _ in 1..12 {
        acc = acc * x.clone() - x.clone();
    }
    set_output(&dag, "out", acc).unwrap();
    enable_bootstrap(&dag, true);

    compile(&dag).unwrap();
    assert_eq!(lib_info(&dag), vec!["openfhe_ckks".to_string()]);
    gen_keys(&dag).unwrap();

    let mut stream = Vec::new();
    save_by_type(&dag, SerializeDataType::BootstrappingKey, &mut stream)
        .unwrap();
    assert!(!stream.is_empty());

    // A fresh copy of the program picks the key up from the stream.
    set_serialize_para(&dag, true, true, true, true, true, true);
    let bytes = save_dag_to_bytes(&dag).unwrap();
    let other = load_dag_from_bytes(&bytes).unwrap();
    load_by_type(
        &other,
        SerializeDataType::BootstrappingKey,
        &mut stream.as_slice(),
    )
    .unwrap();
}
