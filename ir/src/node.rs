use std::fmt;

use crate::{DataType, Payload, PrimitiveOperation, PrimitiveType};

/// A unique identifier for a node in a [`crate::Circuit`].
///
/// The raw value of this identifier is the node's slot in the owning
/// circuit's arena, so identifiers stay valid across node removal and are
/// ordered the same way the nodes were appended.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl From<u64> for NodeId {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<usize> for NodeId {
    fn from(raw: usize) -> Self {
        Self(raw as u64)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A single operation instance in a circuit.
///
/// Input edges are ordered; when `input_offsets` is present it has the same
/// length as `inputs` and the i-th edge reads element `input_offsets[i]` of
/// the producer's output vector. Only `Constant` nodes carry a payload and
/// only `CallSubcircuit` nodes carry a subcircuit name.
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    id: NodeId,
    operation: PrimitiveOperation,
    inputs: Vec<NodeId>,
    input_offsets: Option<Vec<u32>>,
    subcircuit: Option<String>,
    output_types: Vec<DataType>,
    payload: Option<Payload>,
}

impl Node {
    pub(crate) fn new(
        id: NodeId,
        operation: PrimitiveOperation,
        inputs: Vec<NodeId>,
        input_offsets: Option<Vec<u32>>,
        subcircuit: Option<String>,
        output_types: Vec<DataType>,
        payload: Option<Payload>,
    ) -> Self {
        Self { id, operation, inputs, input_offsets, subcircuit, output_types, payload }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn operation(&self) -> PrimitiveOperation {
        self.operation
    }

    pub fn inputs(&self) -> &[NodeId] {
        &self.inputs
    }

    pub fn num_inputs(&self) -> usize {
        self.inputs.len()
    }

    pub fn input_offsets(&self) -> Option<&[u32]> {
        self.input_offsets.as_deref()
    }

    /// The input edges as `(producer, offset)` pairs.
    pub fn input_edges(&self) -> impl Iterator<Item = (NodeId, Option<u32>)> + '_ {
        self.inputs.iter().enumerate().map(|(i, &producer)| {
            let offset = self.input_offsets.as_ref().map(|offsets| offsets[i]);
            (producer, offset)
        })
    }

    pub fn subcircuit_name(&self) -> Option<&str> {
        self.subcircuit.as_deref()
    }

    pub fn output_types(&self) -> &[DataType] {
        &self.output_types
    }

    /// The primitive element type of the node's first output, if declared.
    pub fn element_type(&self) -> Option<PrimitiveType> {
        self.output_types.first().map(|dt| dt.primitive)
    }

    /// Total number of scalar elements across all declared outputs.
    pub fn num_output_elements(&self) -> usize {
        self.output_types.iter().map(DataType::num_elements).sum()
    }

    pub fn payload(&self) -> Option<&Payload> {
        self.payload.as_ref()
    }

    pub fn is_constant(&self) -> bool {
        self.operation == PrimitiveOperation::Constant
    }

    pub fn set_operation(&mut self, operation: PrimitiveOperation) {
        self.operation = operation;
    }

    /// Replaces the input edges, dropping any offsets.
    pub fn set_inputs(&mut self, inputs: Vec<NodeId>) {
        self.inputs = inputs;
        self.input_offsets = None;
    }

    /// Replaces the input edges with `(producer, offset)` pairs. Offsets are
    /// stored only if at least one edge carries one.
    pub fn set_input_edges(&mut self, edges: Vec<(NodeId, Option<u32>)>) {
        if edges.iter().any(|(_, offset)| offset.is_some()) {
            let (inputs, offsets) = edges
                .into_iter()
                .map(|(producer, offset)| (producer, offset.unwrap_or(0)))
                .unzip();
            self.inputs = inputs;
            self.input_offsets = Some(offsets);
        } else {
            self.inputs = edges.into_iter().map(|(producer, _)| producer).collect();
            self.input_offsets = None;
        }
    }

    pub fn set_output_types(&mut self, output_types: Vec<DataType>) {
        self.output_types = output_types;
    }

    /// Rewrites this node into a `Constant` in one step: the inputs are
    /// cleared and the payload and declared type are replaced.
    pub fn fold_to_constant(&mut self, payload: Payload, data_type: DataType) {
        self.operation = PrimitiveOperation::Constant;
        self.inputs.clear();
        self.input_offsets = None;
        self.subcircuit = None;
        self.payload = Some(payload);
        self.output_types = vec![data_type];
    }

    /// Rewrites this node into a `CallSubcircuit` reading the given edges.
    /// The declared output types are kept: the call publishes exactly what
    /// the node used to produce.
    pub fn convert_to_call(&mut self, subcircuit: String, edges: Vec<(NodeId, Option<u32>)>) {
        self.operation = PrimitiveOperation::CallSubcircuit;
        self.subcircuit = Some(subcircuit);
        self.payload = None;
        self.set_input_edges(edges);
    }
}
