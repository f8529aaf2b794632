//! End-to-end tests for the optimization passes, built on shared circuit
//! fixtures.

mod constant_folding;
mod dead_nodes;

use rand::Rng;

use crate::{
    Circuit, CircuitBuilder, DataType, NodeId, Payload, PayloadValue, PrimitiveOperation,
    PrimitiveType,
};

/// Scenario fixture: two boolean inputs, one partially-constant `and`, and
/// a fully-constant xor tower.
///
/// ```text
/// and1 = and(i1, i2, true)          -> output
/// xor2 = xor(xor(true, false), true) -> output
/// ```
pub(crate) fn partially_constant_circuit() -> (Circuit, [NodeId; 2]) {
    let bool_ty = DataType::scalar(PrimitiveType::Bool);
    let mut builder = CircuitBuilder::new("test_boolean");
    let i1 = builder.add_input(bool_ty.clone());
    let i2 = builder.add_input(bool_ty.clone());
    let c1 = builder.add_constant(PrimitiveType::Bool, PayloadValue::Bool(true));
    let and1 = builder.add_node(PrimitiveOperation::And, &[i1, i2, c1]).unwrap();
    builder.add_output(&[and1]).unwrap();
    let c2 = builder.add_constant(PrimitiveType::Bool, PayloadValue::Bool(false));
    let xor1 = builder.add_node(PrimitiveOperation::Xor, &[c1, c2]).unwrap();
    let c3 = builder.add_constant(PrimitiveType::Bool, PayloadValue::Bool(true));
    let xor2 = builder.add_node(PrimitiveOperation::Xor, &[xor1, c3]).unwrap();
    builder.add_output(&[xor2]).unwrap();
    (builder.finish().unwrap(), [and1, xor2])
}

/// A left-deep chain of `length` binary xor gates over `length + 1` boolean
/// inputs, ending in one output.
pub(crate) fn xor_chain(length: usize) -> Circuit {
    let bool_ty = DataType::scalar(PrimitiveType::Bool);
    let mut builder = CircuitBuilder::new("xor_chain");
    let mut acc = builder.add_input(bool_ty.clone());
    for _ in 0..length {
        let next = builder.add_input(bool_ty.clone());
        acc = builder.add_node(PrimitiveOperation::Xor, &[acc, next]).unwrap();
    }
    builder.add_output(&[acc]).unwrap();
    builder.finish().unwrap()
}

/// `copies` disjoint instances of the gadget `xor(and(a, b), or(c, d))`,
/// each over four fresh boolean inputs and feeding its own output.
pub(crate) fn gadget_bank(copies: usize) -> Circuit {
    let bool_ty = DataType::scalar(PrimitiveType::Bool);
    let mut builder = CircuitBuilder::new("gadget_bank");
    for _ in 0..copies {
        let a = builder.add_input(bool_ty.clone());
        let b = builder.add_input(bool_ty.clone());
        let c = builder.add_input(bool_ty.clone());
        let d = builder.add_input(bool_ty.clone());
        let and = builder.add_node(PrimitiveOperation::And, &[a, b]).unwrap();
        let or = builder.add_node(PrimitiveOperation::Or, &[c, d]).unwrap();
        let root = builder.add_node(PrimitiveOperation::Xor, &[and, or]).unwrap();
        builder.add_output(&[root]).unwrap();
    }
    builder.finish().unwrap()
}

pub(crate) fn random_bool_payloads(rng: &mut impl Rng, count: usize) -> Vec<Payload> {
    (0..count).map(|_| Payload::scalar(PayloadValue::Bool(rng.random()))).collect()
}
