use pretty_assertions::assert_eq;

use crate::passes::{eliminate_dead_nodes, eliminate_dead_nodes_in_module};
use crate::{Circuit, CircuitBuilder, DataType, Module, PrimitiveOperation, PrimitiveType};

/// Two gates over the same inputs, only one published.
fn unused_branch_circuit() -> Circuit {
    let bool_ty = DataType::scalar(PrimitiveType::Bool);
    let mut builder = CircuitBuilder::new("unused_branch");
    let a = builder.add_input(bool_ty.clone());
    let b = builder.add_input(bool_ty.clone());
    let n1 = builder.add_node(PrimitiveOperation::And, &[a, b]).unwrap();
    let _n2 = builder.add_node(PrimitiveOperation::Or, &[a, b]).unwrap();
    builder.add_output(&[n1]).unwrap();
    builder.finish().unwrap()
}

#[test]
fn removes_the_unused_branch() {
    let mut circuit = unused_branch_circuit();
    assert_eq!(circuit.num_nodes(), 5);
    eliminate_dead_nodes(&mut circuit).unwrap();

    // `or` is gone; its inputs survive through the live `and`
    assert_eq!(circuit.num_nodes(), 4);
    let ops: Vec<PrimitiveOperation> = circuit.iter().map(|n| n.operation()).collect();
    assert_eq!(
        ops,
        vec![
            PrimitiveOperation::Input,
            PrimitiveOperation::Input,
            PrimitiveOperation::And,
            PrimitiveOperation::Output,
        ]
    );
}

#[test]
fn elimination_is_idempotent() {
    let mut once = unused_branch_circuit();
    eliminate_dead_nodes(&mut once).unwrap();
    let mut twice = once.clone();
    eliminate_dead_nodes(&mut twice).unwrap();
    assert_eq!(once, twice);
}

#[test]
fn outputs_and_their_closure_are_preserved() {
    let mut circuit = unused_branch_circuit();
    let outputs_before = circuit.output_ids().to_vec();
    eliminate_dead_nodes(&mut circuit).unwrap();
    assert_eq!(circuit.output_ids(), outputs_before.as_slice());
    for &output in circuit.output_ids() {
        // the whole transitive closure of each output is still present
        let mut stack = vec![output];
        while let Some(id) = stack.pop() {
            let node = circuit.node(id).expect("closure node survives");
            stack.extend(node.inputs().iter().copied());
        }
    }
}

#[test]
fn unreferenced_inputs_are_removed() {
    let bool_ty = DataType::scalar(PrimitiveType::Bool);
    let mut builder = CircuitBuilder::new("spare_input");
    let a = builder.add_input(bool_ty.clone());
    let spare = builder.add_input(bool_ty.clone());
    let not = builder.add_node(PrimitiveOperation::Not, &[a]).unwrap();
    builder.add_output(&[not]).unwrap();
    let mut circuit = builder.finish().unwrap();

    eliminate_dead_nodes(&mut circuit).unwrap();
    assert!(circuit.get(spare).is_none());
    assert_eq!(circuit.input_ids(), &[a]);
}

/// A module of `total` circuits where the entry transitively calls only
/// the first `live` helpers.
fn module_with_helpers(total: usize, live: usize) -> Module {
    let bool_ty = DataType::scalar(PrimitiveType::Bool);
    let mut module = Module::new("main");

    for index in 0..total {
        let name = format!("helper_{index}");
        let mut builder = CircuitBuilder::new(&name);
        let a = builder.add_input(bool_ty.clone());
        // helpers form a call chain so liveness has to propagate
        let result = if index + 1 < live {
            builder
                .add_call(format!("helper_{}", index + 1), &[(a, None)], vec![bool_ty.clone()])
                .unwrap()
        } else {
            builder.add_node(PrimitiveOperation::Not, &[a]).unwrap()
        };
        builder.add_output(&[result]).unwrap();
        module.add_circuit(builder.finish().unwrap()).unwrap();
    }

    let mut builder = CircuitBuilder::new("main");
    let a = builder.add_input(bool_ty.clone());
    let call = builder.add_call("helper_0", &[(a, None)], vec![bool_ty.clone()]).unwrap();
    builder.add_output(&[call]).unwrap();
    module.add_circuit(builder.finish().unwrap()).unwrap();
    module
}

#[test]
fn prunes_circuits_unreachable_from_the_entry() {
    let mut module = module_with_helpers(11, 3);
    assert_eq!(module.num_circuits(), 12);
    module.validate().unwrap();

    eliminate_dead_nodes_in_module(&mut module, true).unwrap();

    // entry plus the three transitively called helpers survive
    assert_eq!(module.num_circuits(), 4);
    let names: Vec<&str> = module.names().collect();
    assert_eq!(names, vec!["helper_0", "helper_1", "helper_2", "main"]);
    module.validate().unwrap();
}

#[test]
fn keeps_unreachable_circuits_without_the_flag() {
    let mut module = module_with_helpers(11, 3);
    eliminate_dead_nodes_in_module(&mut module, false).unwrap();
    assert_eq!(module.num_circuits(), 12);
}
