//! Two DAGs in one group share a single key set and parameter choice;
//! artifacts move between parties as serialized messages.

use fhelix::*;
use float_cmp::approx_eq;

#[test]
fn group_members_share_keys_and_parameters() {
    let group = init_dag_group("group");

    // First child: out = lhs^3 + 1.
    let cube = init_dag("child_cube");
    let lhs = set_input(&cube, "lhs");
    set_output(&cube, "cube_result", lhs.clone() * lhs.clone() * lhs + 1.0)
        .unwrap();
    add_dag(&group, &cube).unwrap();

    // Second child: out = rot1(y) + y^2. Its indices must start past the
    // group's counter.
    let avg = init_dag("child_avg");
    set_next_node_index(&avg, next_node_index(&group));
    let inverse_cnt = set_input(&avg, "inverse_cnt");
    set_output(
        &avg,
        "plus_result",
        1.0 * (inverse_cnt.clone() >> 1u32)
            + inverse_cnt.clone() * inverse_cnt,
    )
    .unwrap();
    add_dag(&group, &avg).unwrap();

    compile(&group).unwrap();
    assert_eq!(lib_info(&group), vec!["seal_ckks".to_string()]);

    // Key generation happens at a separate party: serialize parameters
    // and signature, reload, and generate there.
    set_serialize_para(&group, false, true, true, false, false, false);
    let genkey_bytes = save_dag_to_bytes(&group).unwrap();
    let keys_dag = load_dag_from_bytes(&genkey_bytes).unwrap();
    gen_keys(&keys_dag).unwrap();

    // The evaluating party gets the public and evaluation contexts only.
    set_serialize_para(&keys_dag, false, false, false, true, true, false);
    let exec_bytes = save_keys_to_bytes(&keys_dag).unwrap();
    load_keys_from_bytes(&group, &exec_bytes).unwrap();

    // Run the first child.
    let input1: Vec<f64> = (0..1024).map(|i| (i % 17) as f64).collect();
    let mut inputs = Valuation::new();
    inputs.insert("lhs".to_string(), Value::VecF64(input1.clone()));
    encrypt(&cube, &inputs, false).unwrap();
    execute(&cube).unwrap();

    // Ship the encrypted result back to the key holder and decrypt.
    let out_bytes = save_output_to_bytes(&cube).unwrap();
    load_output_from_bytes(&keys_dag, &out_bytes).unwrap();
    let outputs = decrypt(&keys_dag).unwrap();

    let got = match outputs.get("cube_result").unwrap() {
        Value::VecF64(v) => v.clone(),
        other => panic!("expected a double vector, got {other:?}"),
    };
    for (got, x) in got.iter().zip(&input1) {
        assert!(approx_eq!(f64, *got, x * x * x + 1.0, epsilon = 1e-2));
    }

    // Run the second child under the same keys.
    let input2: Vec<f64> = (0..1024).map(|i| (i % 2) as f64).collect();
    let mut inputs = Valuation::new();
    inputs.insert("inverse_cnt".to_string(), Value::VecF64(input2.clone()));
    encrypt(&avg, &inputs, true).unwrap();
    execute(&avg).unwrap();

    let out_bytes = save_output_to_bytes(&avg).unwrap();
    load_output_from_bytes(&keys_dag, &out_bytes).unwrap();
    let outputs = decrypt(&keys_dag).unwrap();

    let got = match outputs.get("plus_result").unwrap() {
        Value::VecF64(v) => v.clone(),
        other => panic!("expected a double vector, got {other:?}"),
    };

    // rot1 shifts right: slot i sees input2[i - 1 mod n].
    let n = input2.len();
    for i in 0..n {
        let rotated = input2[(i + n - 1) % n];
        let expected = rotated + input2[i] * input2[i];
        assert!(approx_eq!(f64, got[i], expected, epsilon = 1e-2));
    }
}

#[test]
fn children_are_reachable_by_name() {
    let group = init_dag_group("group");

    let child = init_dag("child");
    let x = set_input(&child, "x");
    set_output(&child, "out", x.clone() * x).unwrap();
    add_dag(&group, &child).unwrap();

    assert!(get_child_dag(&group, "child").is_some());
    assert!(get_child_dag(&group, "missing").is_none());
}

#[test]
fn group_rejects_overlapping_children() {
    let group = init_dag_group("group");

    let a = init_dag("a");
    let x = set_input(&a, "a_in");
    set_output(&a, "a_out", x.clone() + x).unwrap();
    add_dag(&group, &a).unwrap();

    // Forgetting set_next_node_index gives colliding indices.
    let b = init_dag("b");
    let y = set_input(&b, "b_in");
    set_output(&b, "b_out", y.clone() + y).unwrap();

    let err = add_dag(&group, &b).unwrap_err();
    assert!(matches!(
        err,
        Error::IrError(fhelix_dag::Error::GroupIndexOverlap { .. })
    ));
}
