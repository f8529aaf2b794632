//! Dead-node elimination: reverse reachability from the outputs, with
//! optional pruning of circuits never called from the entry point.

use std::collections::{BTreeSet, VecDeque};

use fuse_pass::Pass;
use log::debug;

use crate::{Circuit, IrError, Module, NodeId, PrimitiveOperation};

/// Removes every node that is not transitively reachable from one of the
/// circuit's outputs. Outputs themselves are always preserved; inputs that
/// feed no live node are removed like any other dead node.
pub fn eliminate_dead_nodes(circuit: &mut Circuit) -> Result<(), IrError> {
    let (live, _) = mark_live_nodes(circuit)?;
    let before = circuit.num_nodes();
    circuit.retain(&live);
    debug!(
        "dead-node elimination removed {} of {before} nodes in `{}`",
        before - circuit.num_nodes(),
        circuit.name()
    );
    Ok(())
}

/// Runs dead-node elimination over every circuit reachable from the module's
/// entry point. Each circuit is visited exactly once, and callees discovered
/// on live call nodes are queued for a visit of their own. When
/// `remove_unused_circuits` is set, circuits never reached from the entry
/// point are deleted from the module.
pub fn eliminate_dead_nodes_in_module(
    module: &mut Module,
    remove_unused_circuits: bool,
) -> Result<(), IrError> {
    let mut working_set = VecDeque::new();
    working_set.push_back(module.entry_circuit()?.name().to_string());

    let mut live_circuits: BTreeSet<String> = BTreeSet::new();
    while let Some(name) = working_set.pop_front() {
        if !live_circuits.insert(name.clone()) {
            continue;
        }
        let circuit = module
            .circuit_mut(&name)
            .ok_or_else(|| IrError::MissingSubcircuit(name.clone()))?;
        let (live, callees) = mark_live_nodes(circuit)?;
        circuit.retain(&live);
        working_set.extend(callees);
    }

    if remove_unused_circuits {
        let unused: Vec<String> = module
            .names()
            .filter(|name| !live_circuits.contains(*name))
            .map(str::to_string)
            .collect();
        for name in unused {
            debug!("removing unused circuit `{name}`");
            module.remove_circuit(&name);
        }
    }
    Ok(())
}

/// Marks the nodes reachable backwards from the outputs, returning the live
/// set together with the subcircuits named by live call nodes.
fn mark_live_nodes(circuit: &Circuit) -> Result<(BTreeSet<NodeId>, BTreeSet<String>), IrError> {
    let mut live: BTreeSet<NodeId> = BTreeSet::new();
    let mut callees: BTreeSet<String> = BTreeSet::new();
    let mut stack: Vec<NodeId> = Vec::new();

    for &output in circuit.output_ids() {
        if live.insert(output) {
            stack.push(output);
        }
    }
    while let Some(id) = stack.pop() {
        let node = circuit.node(id)?;
        if node.operation() == PrimitiveOperation::CallSubcircuit {
            let callee = node.subcircuit_name().ok_or_else(|| {
                IrError::InvariantViolation(format!("call node {id} names no subcircuit"))
            })?;
            callees.insert(callee.to_string());
        }
        for &producer in node.inputs() {
            if live.insert(producer) {
                stack.push(producer);
            }
        }
    }
    Ok((live, callees))
}

/// [`Pass`] adapter over [`eliminate_dead_nodes`].
pub struct DeadNodeElimination;

impl Pass for DeadNodeElimination {
    type Input<'a> = Circuit;
    type Output<'a> = Circuit;
    type Error = IrError;

    fn run<'a>(&mut self, mut circuit: Self::Input<'a>) -> Result<Self::Output<'a>, IrError> {
        eliminate_dead_nodes(&mut circuit)?;
        Ok(circuit)
    }
}

/// [`Pass`] adapter over [`eliminate_dead_nodes_in_module`].
pub struct ModuleDeadNodeElimination {
    pub remove_unused_circuits: bool,
}

impl Pass for ModuleDeadNodeElimination {
    type Input<'a> = Module;
    type Output<'a> = Module;
    type Error = IrError;

    fn run<'a>(&mut self, mut module: Self::Input<'a>) -> Result<Self::Output<'a>, IrError> {
        eliminate_dead_nodes_in_module(&mut module, self.remove_unused_circuits)?;
        Ok(module)
    }
}
