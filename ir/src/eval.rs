use std::collections::BTreeMap;

use crate::{
    Circuit, IrError, Module, Node, NodeId, Payload, PayloadValue, PrimitiveOperation,
    PrimitiveType, policies,
};

/// Evaluates a circuit on concrete inputs, returning one payload per output
/// node.
///
/// `inputs` supplies one payload per circuit argument, in the order of
/// [`Circuit::input_ids`]. A module is only required when the circuit calls
/// subcircuits. `Loop`, `SelectOffset` and `Custom` nodes are not evaluable.
///
/// This is an executable reference for the operation semantics; the
/// optimization passes are checked against it, not built on it.
pub fn evaluate(
    circuit: &Circuit,
    inputs: &[Payload],
    module: Option<&Module>,
) -> Result<Vec<Payload>, IrError> {
    if inputs.len() != circuit.input_ids().len() {
        return Err(IrError::InvariantViolation(format!(
            "circuit `{}` takes {} inputs, got {}",
            circuit.name(),
            circuit.input_ids().len(),
            inputs.len()
        )));
    }
    let input_positions: BTreeMap<NodeId, usize> = circuit
        .input_ids()
        .iter()
        .enumerate()
        .map(|(position, &id)| (id, position))
        .collect();

    let mut values: BTreeMap<NodeId, Payload> = BTreeMap::new();

    for node in circuit.iter() {
        let value = match node.operation() {
            PrimitiveOperation::Input => {
                let position = input_positions.get(&node.id()).copied().ok_or_else(|| {
                    IrError::InvariantViolation(format!(
                        "input node {} missing from the input list",
                        node.id()
                    ))
                })?;
                inputs[position].clone()
            }
            PrimitiveOperation::Constant => node
                .payload()
                .cloned()
                .ok_or_else(|| {
                    IrError::InvariantViolation(format!(
                        "constant node {} has no payload",
                        node.id()
                    ))
                })?,
            PrimitiveOperation::Output => {
                gather_as_payload(&gather_operands(node, &values)?)
            }
            PrimitiveOperation::CallSubcircuit => {
                let module = module.ok_or_else(|| {
                    IrError::InvariantViolation(format!(
                        "node {} calls a subcircuit but no module was supplied",
                        node.id()
                    ))
                })?;
                evaluate_call(node, &values, module)?
            }
            PrimitiveOperation::Loop
            | PrimitiveOperation::SelectOffset
            | PrimitiveOperation::Custom => {
                return Err(IrError::InvariantViolation(format!(
                    "node {} has operation `{}` which cannot be evaluated",
                    node.id(),
                    node.operation()
                )));
            }
            op => {
                let operands = gather_operands(node, &values)?;
                let ty = dispatch_type(circuit, node)?;
                policies::apply(op, ty, &operands)?
            }
        };
        values.insert(node.id(), value);
    }

    circuit
        .output_ids()
        .iter()
        .map(|id| {
            values.get(id).cloned().ok_or_else(|| {
                IrError::InvariantViolation(format!("output node {id} was never evaluated"))
            })
        })
        .collect()
}

/// Resolves the input edges of `node` into scalar operand values.
fn gather_operands(
    node: &Node,
    values: &BTreeMap<NodeId, Payload>,
) -> Result<Vec<PayloadValue>, IrError> {
    node.input_edges()
        .map(|(producer, offset)| {
            let payload = values.get(&producer).ok_or_else(|| {
                IrError::InvariantViolation(format!(
                    "node {} reads node {producer} before its definition",
                    node.id()
                ))
            })?;
            payload.element(offset)
        })
        .collect()
}

fn gather_as_payload(elements: &[PayloadValue]) -> Payload {
    if let [single] = elements {
        Payload::scalar(*single)
    } else {
        Payload::vector(elements.to_vec(), vec![elements.len()])
    }
}

fn evaluate_call(
    node: &Node,
    values: &BTreeMap<NodeId, Payload>,
    module: &Module,
) -> Result<Payload, IrError> {
    let callee_name = node.subcircuit_name().ok_or_else(|| {
        IrError::InvariantViolation(format!("call node {} names no subcircuit", node.id()))
    })?;
    let callee = module
        .circuit(callee_name)
        .ok_or_else(|| IrError::MissingSubcircuit(callee_name.to_string()))?;
    let arguments: Vec<Payload> = gather_operands(node, values)?
        .into_iter()
        .map(Payload::scalar)
        .collect();
    let outputs = evaluate(callee, &arguments, Some(module))?;
    // flatten the callee outputs into one element vector; consumers address
    // individual elements through input offsets
    let flat: Vec<PayloadValue> =
        outputs.iter().flat_map(|payload| payload.elements().iter().copied()).collect();
    Ok(gather_as_payload(&flat))
}

/// The element type an operation is dispatched on: the first operand's
/// declared type, except for `mux` (typed by its choices) and `merge`
/// (typed by its declared packing target).
fn dispatch_type(circuit: &Circuit, node: &Node) -> Result<PrimitiveType, IrError> {
    let producer_ty = |index: usize| -> Result<PrimitiveType, IrError> {
        let producer = *node.inputs().get(index).ok_or_else(|| {
            IrError::InvariantViolation(format!(
                "node {} has no operand {index}",
                node.id()
            ))
        })?;
        circuit.node(producer)?.element_type().ok_or_else(|| {
            IrError::InvariantViolation(format!("node {producer} declares no output type"))
        })
    };
    match node.operation() {
        PrimitiveOperation::Mux => producer_ty(1),
        PrimitiveOperation::Merge => node.element_type().ok_or_else(|| {
            IrError::InvariantViolation(format!(
                "merge node {} declares no target type",
                node.id()
            ))
        }),
        _ => producer_ty(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CircuitBuilder, DataType};
    use PrimitiveType as Ty;

    #[test]
    fn evaluates_gates_and_offset_reads() {
        let mut builder = CircuitBuilder::new("byte_tricks");
        let x = builder.add_input(DataType::scalar(Ty::UInt8));
        let split = builder.add_node(PrimitiveOperation::Split, &[x]).unwrap();
        // xor of the low two bits
        let low_bits = builder
            .add_node_with_offsets(PrimitiveOperation::Xor, &[(split, Some(0)), (split, Some(1))])
            .unwrap();
        builder.add_output(&[low_bits]).unwrap();
        let circuit = builder.finish().unwrap();

        let out = evaluate(&circuit, &[Payload::scalar(PayloadValue::UInt(0b10))], None).unwrap();
        assert_eq!(out, vec![Payload::scalar(PayloadValue::Bool(true))]);
    }

    #[test]
    fn evaluates_calls_through_the_module() {
        let mut helper = CircuitBuilder::new("xor2");
        let a = helper.add_input(DataType::scalar(Ty::Bool));
        let b = helper.add_input(DataType::scalar(Ty::Bool));
        let xor = helper.add_node(PrimitiveOperation::Xor, &[a, b]).unwrap();
        helper.add_output(&[xor]).unwrap();

        let mut main = CircuitBuilder::new("main");
        let p = main.add_input(DataType::scalar(Ty::Bool));
        let q = main.add_input(DataType::scalar(Ty::Bool));
        let call = main
            .add_call("xor2", &[(p, None), (q, None)], vec![DataType::scalar(Ty::Bool)])
            .unwrap();
        main.add_output(&[call]).unwrap();

        let mut module = Module::new("main");
        module.add_circuit(main.finish().unwrap()).unwrap();
        module.add_circuit(helper.finish().unwrap()).unwrap();

        let inputs = [
            Payload::scalar(PayloadValue::Bool(true)),
            Payload::scalar(PayloadValue::Bool(false)),
        ];
        let out = evaluate(module.entry_circuit().unwrap(), &inputs, Some(&module)).unwrap();
        assert_eq!(out, vec![Payload::scalar(PayloadValue::Bool(true))]);
    }
}
