use std::collections::{BTreeMap, BTreeSet};

use crate::{IrError, Node, NodeId};

/// A finite, acyclic dataflow graph of typed nodes with distinguished input
/// and output lists.
///
/// Nodes live in a contiguous arena where a node's [`NodeId`] is its slot
/// index; removal leaves an empty slot behind so every surviving identifier
/// stays valid. Since the only way to build a circuit is through the
/// [`crate::CircuitBuilder`], which appends nodes whose inputs refer to
/// earlier slots, slot order is the canonical topological order, and
/// removal-only mutation preserves it.
#[derive(Debug, Clone, PartialEq)]
pub struct Circuit {
    name: String,
    nodes: Vec<Option<Node>>,
    input_ids: Vec<NodeId>,
    output_ids: Vec<NodeId>,
}

impl Circuit {
    pub(crate) fn from_parts(
        name: String,
        nodes: Vec<Option<Node>>,
        input_ids: Vec<NodeId>,
        output_ids: Vec<NodeId>,
    ) -> Self {
        Self { name, nodes, input_ids, output_ids }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The circuit's arguments, in declaration order. These are exactly the
    /// nodes whose operation is `Input`.
    pub fn input_ids(&self) -> &[NodeId] {
        &self.input_ids
    }

    pub fn output_ids(&self) -> &[NodeId] {
        &self.output_ids
    }

    /// Number of live nodes.
    pub fn num_nodes(&self) -> usize {
        self.nodes.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(Option::as_ref)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, IrError> {
        self.get(id).ok_or_else(|| {
            IrError::InvariantViolation(format!("node {id} does not exist in circuit `{}`", self.name))
        })
    }

    pub fn node_mut(&mut self, id: NodeId) -> Result<&mut Node, IrError> {
        let name = &self.name;
        self.nodes
            .get_mut(id.index())
            .and_then(Option::as_mut)
            .ok_or_else(|| {
                IrError::InvariantViolation(format!("node {id} does not exist in circuit `{name}`"))
            })
    }

    /// Iterates the live nodes in topological (insertion) order.
    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter_map(Option::as_ref)
    }

    /// The live node identifiers in topological (insertion) order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.iter().map(Node::id)
    }

    /// Drops every node whose identifier is not in `live`.
    ///
    /// The caller guarantees that `live` is downward-closed under "used-by":
    /// no surviving node may reference a dropped one. Slot order (and with it
    /// the topological order) of the survivors is untouched; the input list
    /// is re-filtered so it keeps naming only live nodes.
    pub fn retain(&mut self, live: &BTreeSet<NodeId>) {
        for slot in &mut self.nodes {
            if slot.as_ref().is_some_and(|node| !live.contains(&node.id())) {
                *slot = None;
            }
        }
        self.input_ids.retain(|id| live.contains(id));
        debug_assert!(self.output_ids.iter().all(|id| live.contains(id)));
    }

    /// The consumers of every node, computed on demand.
    pub fn node_successors(&self) -> BTreeMap<NodeId, BTreeSet<NodeId>> {
        let mut successors: BTreeMap<NodeId, BTreeSet<NodeId>> = BTreeMap::new();
        for node in self.iter() {
            for &producer in node.inputs() {
                successors.entry(producer).or_default().insert(node.id());
            }
        }
        successors
    }

    /// Number of consuming edges per node (a node reading the same producer
    /// twice counts twice), computed on demand.
    pub fn consumer_edge_counts(&self) -> BTreeMap<NodeId, usize> {
        let mut counts: BTreeMap<NodeId, usize> = BTreeMap::new();
        for node in self.iter() {
            for &producer in node.inputs() {
                *counts.entry(producer).or_default() += 1;
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CircuitBuilder, DataType, PrimitiveOperation, PrimitiveType};

    fn two_gate_circuit() -> Circuit {
        let mut builder = CircuitBuilder::new("two_gates");
        let a = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let b = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let and = builder.add_node(PrimitiveOperation::And, &[a, b]).unwrap();
        let or = builder.add_node(PrimitiveOperation::Or, &[a, b]).unwrap();
        builder.add_output(&[and]).unwrap();
        builder.add_output(&[or]).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let circuit = two_gate_circuit();
        let ids: Vec<u64> = circuit.ids().map(NodeId::as_u64).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn retain_keeps_slot_order_and_prunes_inputs() {
        let mut circuit = two_gate_circuit();
        // keep only input `a`, the and gate, and the first output
        let live: BTreeSet<NodeId> =
            [0u64, 1, 2, 4].into_iter().map(NodeId::from).collect();
        circuit.output_ids = vec![NodeId::from(4u64)];
        circuit.retain(&live);

        assert_eq!(circuit.num_nodes(), 4);
        assert!(circuit.get(NodeId::from(3u64)).is_none());
        let ids: Vec<u64> = circuit.ids().map(NodeId::as_u64).collect();
        assert_eq!(ids, vec![0, 1, 2, 4]);
        assert_eq!(circuit.input_ids().len(), 2);
    }

    #[test]
    fn successor_map_counts_consumers() {
        let circuit = two_gate_circuit();
        let successors = circuit.node_successors();
        // both gates consume both inputs
        assert_eq!(successors[&NodeId::from(0u64)].len(), 2);
        assert_eq!(successors[&NodeId::from(1u64)].len(), 2);
        let counts = circuit.consumer_edge_counts();
        assert_eq!(counts[&NodeId::from(2u64)], 1);
    }
}
