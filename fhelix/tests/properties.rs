//! Property tests: encode/encrypt/decrypt round trips and agreement with
//! plaintext evaluation over randomly generated programs.

use fhelix::*;
use proptest::prelude::*;

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    #[test]
    fn ckks_round_trip_is_within_tolerance(
        values in proptest::collection::vec(-1000.0..1000.0f64, 16)
    ) {
        let dag = init_dag_sized("prop_ckks", 16).unwrap();
        let x = set_input(&dag, "x");
        set_output(&dag, "out", x).unwrap();

        compile(&dag).unwrap();
        gen_keys(&dag).unwrap();

        let mut inputs = Valuation::new();
        inputs.insert("x".to_string(), Value::VecF64(values.clone()));
        encrypt(&dag, &inputs, false).unwrap();
        execute(&dag).unwrap();

        let outputs = decrypt(&dag).unwrap();
        match outputs.get("out").unwrap() {
            Value::VecF64(got) => {
                for (got, want) in got.iter().zip(&values) {
                    prop_assert!((got - want).abs() < 1e-3);
                }
            }
            other => prop_assert!(false, "unexpected value {other:?}"),
        }
    }

    #[test]
    fn bfv_round_trip_is_exact(
        values in proptest::collection::vec(-1_000_000..1_000_000i64, 16)
    ) {
        let dag = init_dag_sized("prop_bfv", 16).unwrap();
        let x = set_input(&dag, "x");
        set_output(&dag, "out", x + 0i64).unwrap();

        compile(&dag).unwrap();
        gen_keys(&dag).unwrap();

        let mut inputs = Valuation::new();
        inputs.insert("x".to_string(), Value::VecI64(values.clone()));
        encrypt(&dag, &inputs, false).unwrap();
        execute(&dag).unwrap();

        let outputs = decrypt(&dag).unwrap();
        prop_assert_eq!(
            outputs.get("out"),
            Some(&Value::VecI64(values))
        );
    }

    #[test]
    fn affine_programs_match_plaintext_evaluation(
        values in proptest::collection::vec(-100.0..100.0f64, 8),
        a in -10.0..10.0f64,
        b in -10.0..10.0f64,
    ) {
        let dag = init_dag_sized("prop_affine", 8).unwrap();
        let x = set_input(&dag, "x");
        set_output(&dag, "out", x.clone() * x * a + b).unwrap();

        compile(&dag).unwrap();
        gen_keys(&dag).unwrap();

        let mut inputs = Valuation::new();
        inputs.insert("x".to_string(), Value::VecF64(values.clone()));
        encrypt(&dag, &inputs, false).unwrap();
        execute(&dag).unwrap();

        let outputs = decrypt(&dag).unwrap();
        match outputs.get("out").unwrap() {
            Value::VecF64(got) => {
                for (got, x) in got.iter().zip(&values) {
                    let want = x * x * a + b;
                    prop_assert!(
                        (got - want).abs() < 1e-2,
                        "got {got}, want {want}"
                    );
                }
            }
            other => prop_assert!(false, "unexpected value {other:?}"),
        }
    }
}
