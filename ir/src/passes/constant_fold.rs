//! Constant folding: a forward walk that collapses every operator node
//! whose inputs are all constants into a constant node of its own.
//!
//! Folding composes with dead-node elimination: the producers of a folded
//! node stay in the graph (they may feed other consumers) and are cleaned
//! up by a subsequent elimination pass.

use std::collections::BTreeMap;

use fuse_pass::Pass;
use log::debug;

use crate::{
    Circuit, DataType, IrError, Module, NodeId, Payload, PayloadValue, PrimitiveOperation,
    PrimitiveType, policies,
};

/// Folds the constants inside the circuit.
///
/// Nodes are visited in topological order. `Input`, `Output`,
/// `CallSubcircuit`, `Loop`, `SelectOffset` and `Custom` nodes are skipped;
/// a node whose inputs are all constants is evaluated and rewritten in
/// place into a `Constant`. Evaluation failures (an unsupported
/// `(operation, element type)` pair, a malformed offset, a zero divisor)
/// abort the pass before the offending node is mutated.
pub fn fold_constants(circuit: &mut Circuit) -> Result<(), IrError> {
    let mut constants: BTreeMap<NodeId, Payload> = BTreeMap::new();
    let mut folded = 0usize;

    let ids: Vec<NodeId> = circuit.ids().collect();
    for id in ids {
        let node = circuit.node(id)?;
        if node.operation().is_opaque_to_folding() {
            continue;
        }
        if node.is_constant() {
            let payload = node.payload().cloned().ok_or_else(|| {
                IrError::InvariantViolation(format!("constant node {id} has no payload"))
            })?;
            constants.insert(id, payload);
            continue;
        }
        if node.inputs().is_empty() {
            continue;
        }

        // gather the operand values; one non-constant input means there is
        // nothing to fold here
        let mut operands = Vec::with_capacity(node.num_inputs());
        let mut all_constant = true;
        for (producer, offset) in node.input_edges() {
            match constants.get(&producer) {
                Some(payload) => operands.push(payload.element(offset)?),
                None => {
                    all_constant = false;
                    break;
                }
            }
        }
        if !all_constant {
            continue;
        }

        let (payload, data_type) = fold_node(circuit, id, &operands)?;
        circuit.node_mut(id)?.fold_to_constant(payload.clone(), data_type);
        constants.insert(id, payload);
        folded += 1;
    }

    debug!("constant folding rewrote {folded} nodes in `{}`", circuit.name());
    Ok(())
}

/// Folds the constants of every circuit in the module, independently.
pub fn fold_constants_in_module(module: &mut Module) -> Result<(), IrError> {
    let names: Vec<String> = module.names().map(str::to_string).collect();
    for name in names {
        let circuit = module
            .circuit_mut(&name)
            .expect("circuit disappeared while folding");
        fold_constants(circuit)?;
    }
    Ok(())
}

/// Evaluates one all-constant node, returning the replacement payload and
/// its declared type without touching the graph.
fn fold_node(
    circuit: &Circuit,
    id: NodeId,
    operands: &[PayloadValue],
) -> Result<(Payload, DataType), IrError> {
    use PrimitiveOperation as Op;

    let node = circuit.node(id)?;
    let op = node.operation();

    // the operand element type is declared by the first input's constant
    let constant_type_of = |index: usize| -> Result<PrimitiveType, IrError> {
        let producer = node.inputs()[index];
        circuit.node(producer)?.element_type().ok_or_else(|| {
            IrError::InvariantViolation(format!("constant node {producer} declares no type"))
        })
    };
    let operand_ty = constant_type_of(0)?;

    match op {
        _ if op.is_accumulating() || op.inverted_base().is_some() => {
            let payload = policies::apply(op, operand_ty, operands)?;
            Ok((payload, DataType::scalar(operand_ty)))
        }
        _ if op.is_comparison() => {
            if operands.len() != 2 {
                return Err(IrError::InvariantViolation(format!(
                    "comparison node {id} has {} operands",
                    operands.len()
                )));
            }
            let payload = policies::apply(op, operand_ty, operands)?;
            Ok((payload, DataType::scalar(PrimitiveType::Bool)))
        }
        Op::Not | Op::Neg => {
            let payload = policies::apply(op, operand_ty, operands)?;
            Ok((payload, DataType::scalar(operand_ty)))
        }
        Op::Mux => {
            if operands.len() != 3 {
                return Err(IrError::InvariantViolation(format!(
                    "mux node {id} has {} operands",
                    operands.len()
                )));
            }
            // the condition is boolean; the result takes the type of the
            // choice operands
            let choice_ty = constant_type_of(1)?;
            let payload = policies::apply(op, choice_ty, operands)?;
            Ok((payload, DataType::scalar(choice_ty)))
        }
        Op::Split => {
            let payload = policies::apply(op, operand_ty, operands)?;
            let width = operand_ty.num_bits();
            Ok((payload, DataType::with_shape(PrimitiveType::Bool, vec![width])))
        }
        Op::Merge => {
            // pack into the node's declared target type
            let target = node.element_type().ok_or_else(|| {
                IrError::InvariantViolation(format!("merge node {id} declares no target type"))
            })?;
            let payload = policies::apply(op, target, operands)?;
            Ok((payload, DataType::scalar(target)))
        }
        _ => unreachable!("opaque and constant nodes are filtered before folding"),
    }
}

/// [`Pass`] adapter over [`fold_constants`].
pub struct ConstantFolding;

impl Pass for ConstantFolding {
    type Input<'a> = Circuit;
    type Output<'a> = Circuit;
    type Error = IrError;

    fn run<'a>(&mut self, mut circuit: Self::Input<'a>) -> Result<Self::Output<'a>, IrError> {
        fold_constants(&mut circuit)?;
        Ok(circuit)
    }
}

/// [`Pass`] adapter over [`fold_constants_in_module`].
pub struct ModuleConstantFolding;

impl Pass for ModuleConstantFolding {
    type Input<'a> = Module;
    type Output<'a> = Module;
    type Error = IrError;

    fn run<'a>(&mut self, mut module: Self::Input<'a>) -> Result<Self::Output<'a>, IrError> {
        fold_constants_in_module(&mut module)?;
        Ok(module)
    }
}
