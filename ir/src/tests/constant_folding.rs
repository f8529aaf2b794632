use pretty_assertions::assert_eq;
use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{partially_constant_circuit, random_bool_payloads};
use crate::passes::{eliminate_dead_nodes, fold_constants};
use crate::{
    CircuitBuilder, DataType, Payload, PayloadValue, PrimitiveOperation, PrimitiveType, evaluate,
};

#[test]
fn folds_the_constant_tower_and_keeps_the_mixed_gate() {
    let (mut circuit, [and1, xor2]) = partially_constant_circuit();
    fold_constants(&mut circuit).unwrap();

    // and(i1, i2, true) has non-constant inputs; no identity elimination is
    // performed, so it survives structurally untouched
    let and_node = circuit.node(and1).unwrap();
    assert_eq!(and_node.operation(), PrimitiveOperation::And);
    assert_eq!(and_node.num_inputs(), 3);

    // xor(xor(true, false), true) collapses to false
    let xor_node = circuit.node(xor2).unwrap();
    assert!(xor_node.is_constant());
    assert_eq!(xor_node.payload(), Some(&Payload::scalar(PayloadValue::Bool(false))));
    assert!(xor_node.inputs().is_empty());

    // the folded tower dissolves under dead-node elimination; the mixed
    // gate keeps its three producers
    eliminate_dead_nodes(&mut circuit).unwrap();
    assert_eq!(circuit.num_nodes(), 7);
    assert!(circuit.node(and1).is_ok());
}

#[test]
fn folding_preserves_semantics_on_random_inputs() {
    let (mut circuit, _) = partially_constant_circuit();
    let original = circuit.clone();
    fold_constants(&mut circuit).unwrap();

    let mut rng = StdRng::seed_from_u64(7);
    for _ in 0..32 {
        let inputs = random_bool_payloads(&mut rng, 2);
        assert_eq!(
            evaluate(&original, &inputs, None).unwrap(),
            evaluate(&circuit, &inputs, None).unwrap(),
        );
    }
}

#[test]
fn every_all_constant_node_becomes_constant() {
    // a circuit without inputs folds down to constants everywhere
    let mut builder = CircuitBuilder::new("all_constant");
    let a = builder.add_constant(PrimitiveType::UInt32, PayloadValue::UInt(20));
    let b = builder.add_constant(PrimitiveType::UInt32, PayloadValue::UInt(22));
    let sum = builder.add_node(PrimitiveOperation::Add, &[a, b]).unwrap();
    let doubled = builder.add_node(PrimitiveOperation::Add, &[sum, sum]).unwrap();
    let cmp = builder.add_node(PrimitiveOperation::Gt, &[doubled, a]).unwrap();
    builder.add_output(&[doubled]).unwrap();
    builder.add_output(&[cmp]).unwrap();
    let mut circuit = builder.finish().unwrap();

    fold_constants(&mut circuit).unwrap();
    for node in circuit.iter() {
        if node.operation().is_opaque_to_folding() {
            continue;
        }
        assert!(node.is_constant(), "node {} was not folded", node.id());
    }
    assert_eq!(
        circuit.node(doubled).unwrap().payload(),
        Some(&Payload::scalar(PayloadValue::UInt(84)))
    );
    assert_eq!(
        circuit.node(cmp).unwrap().payload(),
        Some(&Payload::scalar(PayloadValue::Bool(true)))
    );

    // folding plus elimination reduces a fully-constant circuit to its
    // outputs and their constants
    eliminate_dead_nodes(&mut circuit).unwrap();
    assert_eq!(circuit.num_nodes(), 4);
}

#[test]
fn folds_signed_arithmetic_and_comparisons() {
    let mut builder = CircuitBuilder::new("signed");
    let a = builder.add_constant(PrimitiveType::Int16, PayloadValue::Int(-300));
    let b = builder.add_constant(PrimitiveType::Int16, PayloadValue::Int(44));
    let sub = builder.add_node(PrimitiveOperation::Sub, &[a, b]).unwrap();
    let neg = builder.add_node(PrimitiveOperation::Neg, &[sub]).unwrap();
    let lt = builder.add_node(PrimitiveOperation::Lt, &[a, b]).unwrap();
    builder.add_output(&[neg]).unwrap();
    builder.add_output(&[lt]).unwrap();
    let mut circuit = builder.finish().unwrap();

    fold_constants(&mut circuit).unwrap();
    assert_eq!(
        circuit.node(neg).unwrap().payload(),
        Some(&Payload::scalar(PayloadValue::Int(344)))
    );
    assert_eq!(
        circuit.node(lt).unwrap().payload(),
        Some(&Payload::scalar(PayloadValue::Bool(true)))
    );
    assert_eq!(
        circuit.node(lt).unwrap().output_types(),
        &[DataType::scalar(PrimitiveType::Bool)]
    );
}

#[test]
fn folds_split_into_a_little_endian_bool_vector() {
    let mut builder = CircuitBuilder::new("split_fold");
    let c = builder.add_constant(PrimitiveType::UInt8, PayloadValue::UInt(0b1011_0011));
    let split = builder.add_node(PrimitiveOperation::Split, &[c]).unwrap();
    builder.add_output_with_offsets(&[(split, Some(0))]).unwrap();
    let mut circuit = builder.finish().unwrap();

    fold_constants(&mut circuit).unwrap();
    let node = circuit.node(split).unwrap();
    assert!(node.is_constant());
    let expected: Vec<PayloadValue> = [true, true, false, false, true, true, false, true]
        .into_iter()
        .map(PayloadValue::Bool)
        .collect();
    assert_eq!(node.payload(), Some(&Payload::vector(expected, vec![8])));
    assert_eq!(
        node.output_types(),
        &[DataType::with_shape(PrimitiveType::Bool, vec![8])]
    );
}

#[test]
fn folds_merge_through_split_offsets() {
    // split a constant byte, feed the bits back through offset reads in
    // reversed order, and merge big-endian: the byte must round-trip
    let mut builder = CircuitBuilder::new("split_merge");
    let c = builder.add_constant(PrimitiveType::UInt8, PayloadValue::UInt(179));
    let split = builder.add_node(PrimitiveOperation::Split, &[c]).unwrap();
    let reversed: Vec<_> = (0..8).rev().map(|bit| (split, Some(bit as u32))).collect();
    let merge = builder
        .add_typed_node(
            PrimitiveOperation::Merge,
            &reversed,
            vec![DataType::scalar(PrimitiveType::UInt8)],
        )
        .unwrap();
    builder.add_output(&[merge]).unwrap();
    let mut circuit = builder.finish().unwrap();

    fold_constants(&mut circuit).unwrap();
    assert_eq!(
        circuit.node(merge).unwrap().payload(),
        Some(&Payload::scalar(PayloadValue::UInt(179)))
    );
}

#[test]
fn folds_mux_to_the_type_of_its_choices() {
    let mut builder = CircuitBuilder::new("mux_fold");
    let cond = builder.add_constant(PrimitiveType::Bool, PayloadValue::Bool(false));
    let a = builder.add_constant(PrimitiveType::Int32, PayloadValue::Int(-1));
    let b = builder.add_constant(PrimitiveType::Int32, PayloadValue::Int(99));
    let mux = builder.add_node(PrimitiveOperation::Mux, &[cond, a, b]).unwrap();
    builder.add_output(&[mux]).unwrap();
    let mut circuit = builder.finish().unwrap();

    fold_constants(&mut circuit).unwrap();
    let node = circuit.node(mux).unwrap();
    assert_eq!(node.payload(), Some(&Payload::scalar(PayloadValue::Int(99))));
    assert_eq!(node.output_types(), &[DataType::scalar(PrimitiveType::Int32)]);
}

#[test]
fn unsupported_pairs_abort_without_mutating_the_node() {
    let mut builder = CircuitBuilder::new("float_and");
    let a = builder.add_constant(PrimitiveType::Float, PayloadValue::Float(1.0));
    let b = builder.add_constant(PrimitiveType::Float, PayloadValue::Float(2.0));
    let and = builder.add_node(PrimitiveOperation::And, &[a, b]).unwrap();
    builder.add_output(&[and]).unwrap();
    let mut circuit = builder.finish().unwrap();

    assert!(fold_constants(&mut circuit).is_err());
    let node = circuit.node(and).unwrap();
    assert_eq!(node.operation(), PrimitiveOperation::And);
    assert_eq!(node.num_inputs(), 2);
    assert!(node.payload().is_none());
}
