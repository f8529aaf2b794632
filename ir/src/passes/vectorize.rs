//! Instruction vectorization: collapses deep chains of one associative
//! operator into a single multi-input node.
//!
//! Legal because `and`/`or`/`xor` are associative and commutative, and
//! because an edge is only flattened through a producer with exactly one
//! consumer, so no other reader loses its value. The bypassed intermediates
//! become unreachable and are removed by a following dead-node elimination.

use fuse_pass::Pass;
use log::debug;

use crate::{Circuit, IrError, NodeId, PrimitiveOperation, PrimitiveType};

/// Fuses chains of `op` nodes into single multi-input nodes.
///
/// An input edge of an `op` node is flattened iff its producer also has
/// operation `op`, has exactly one consuming edge, reads no offset, and
/// lies within `max_depth` of the rewritten node. A node is rewritten only
/// when its flattened input count reaches `min_gates`. `allow_cross_type`
/// permits flattening through producers whose declared element type differs
/// from the rewritten node's.
///
/// For `Not`, chains collapse in pairs instead (double negation cancels);
/// a node is rewired only when the bypassed chain is at least `min_gates`
/// long. Other operations are rejected.
pub fn vectorize_instructions(
    circuit: &mut Circuit,
    op: PrimitiveOperation,
    min_gates: usize,
    max_depth: usize,
    allow_cross_type: bool,
) -> Result<(), IrError> {
    match op {
        PrimitiveOperation::And | PrimitiveOperation::Or | PrimitiveOperation::Xor => {}
        PrimitiveOperation::Not => {
            return collapse_not_chains(circuit, min_gates, max_depth);
        }
        _ => {
            return Err(IrError::InvariantViolation(format!(
                "vectorization is defined for `and`, `or`, `xor` and `not`, not `{op}`"
            )));
        }
    }

    let consumers = circuit.consumer_edge_counts();

    // plan all rewrites against the unmodified graph so `max_depth` bounds
    // the lookthrough, then apply them; every rewrite preserves its node's
    // value, so the plans stay consistent with each other
    let mut rewrites: Vec<(NodeId, Vec<(NodeId, Option<u32>)>)> = Vec::new();
    for node in circuit.iter() {
        if node.operation() != op {
            continue;
        }
        let mut leaves: Vec<(NodeId, Option<u32>)> = Vec::new();
        flatten(
            circuit,
            &consumers,
            op,
            node.element_type(),
            allow_cross_type,
            max_depth,
            node.id(),
            0,
            &mut leaves,
        )?;
        if leaves.len() >= min_gates && leaves.len() > node.num_inputs() {
            rewrites.push((node.id(), leaves));
        }
    }

    let rewritten = rewrites.len();
    for (id, leaves) in rewrites {
        circuit.node_mut(id)?.set_input_edges(leaves);
    }

    debug!("vectorization rewrote {rewritten} `{op}` chains in `{}`", circuit.name());
    Ok(())
}

/// Collects the leaf edges of the same-op tree hanging below `id`,
/// left to right, recursing through fusable producers only.
#[allow(clippy::too_many_arguments)]
fn flatten(
    circuit: &Circuit,
    consumers: &std::collections::BTreeMap<NodeId, usize>,
    op: PrimitiveOperation,
    node_ty: Option<PrimitiveType>,
    allow_cross_type: bool,
    max_depth: usize,
    id: NodeId,
    depth: usize,
    leaves: &mut Vec<(NodeId, Option<u32>)>,
) -> Result<(), IrError> {
    let edges: Vec<(NodeId, Option<u32>)> = circuit.node(id)?.input_edges().collect();
    for (producer, offset) in edges {
        let child = circuit.node(producer)?;
        let fusable = offset.is_none()
            && child.operation() == op
            && depth < max_depth
            && consumers.get(&producer).copied().unwrap_or(0) == 1
            && (allow_cross_type || child.element_type() == node_ty);
        if fusable {
            flatten(
                circuit,
                consumers,
                op,
                node_ty,
                allow_cross_type,
                max_depth,
                producer,
                depth + 1,
                leaves,
            )?;
        } else {
            leaves.push((producer, offset));
        }
    }
    Ok(())
}

/// Rewires `not` nodes past pairs of single-consumer `not` producers.
fn collapse_not_chains(
    circuit: &mut Circuit,
    min_gates: usize,
    max_depth: usize,
) -> Result<(), IrError> {
    let consumers = circuit.consumer_edge_counts();
    let ids: Vec<NodeId> = circuit.ids().collect();
    let mut rewritten = 0usize;

    for id in ids {
        let node = circuit.node(id)?;
        if node.operation() != PrimitiveOperation::Not || node.num_inputs() != 1 {
            continue;
        }

        // follow pairs of single-consumer nots downwards; every pair
        // bypassed preserves the value
        let mut target = node.inputs()[0];
        let mut bypassed = 0usize;
        loop {
            if bypassed + 2 > max_depth {
                break;
            }
            let Some(next) = unwrap_single_not(circuit, &consumers, target)? else { break };
            let Some(next_next) = unwrap_single_not(circuit, &consumers, next)? else { break };
            target = next_next;
            bypassed += 2;
        }

        if bypassed > 0 && bypassed >= min_gates {
            circuit.node_mut(id)?.set_inputs(vec![target]);
            rewritten += 1;
        }
    }

    debug!("vectorization bypassed double negations on {rewritten} nodes in `{}`", circuit.name());
    Ok(())
}

/// If `id` is a single-consumer unary `not` without an offset read, returns
/// its operand.
fn unwrap_single_not(
    circuit: &Circuit,
    consumers: &std::collections::BTreeMap<NodeId, usize>,
    id: NodeId,
) -> Result<Option<NodeId>, IrError> {
    let node = circuit.node(id)?;
    let eligible = node.operation() == PrimitiveOperation::Not
        && node.num_inputs() == 1
        && node.input_offsets().is_none()
        && consumers.get(&id).copied().unwrap_or(0) == 1;
    Ok(eligible.then(|| node.inputs()[0]))
}

/// [`Pass`] adapter over [`vectorize_instructions`].
pub struct InstructionVectorization {
    pub op: PrimitiveOperation,
    pub min_gates: usize,
    pub max_depth: usize,
    pub allow_cross_type: bool,
}

impl Pass for InstructionVectorization {
    type Input<'a> = Circuit;
    type Output<'a> = Circuit;
    type Error = IrError;

    fn run<'a>(&mut self, mut circuit: Self::Input<'a>) -> Result<Self::Output<'a>, IrError> {
        vectorize_instructions(
            &mut circuit,
            self.op,
            self.min_gates,
            self.max_depth,
            self.allow_cross_type,
        )?;
        Ok(circuit)
    }
}
