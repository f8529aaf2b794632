use crate::{
    Circuit, DataType, IrError, Node, NodeId, Payload, PayloadValue, PrimitiveOperation,
    PrimitiveType,
};

/// The only way to build a [`Circuit`].
///
/// The builder appends nodes one at a time and hands out their identifiers;
/// since an edge can only name an identifier the builder already returned,
/// the finished arena is free of dangling references and forward edges, and
/// slot order is a valid topological order. [`CircuitBuilder::finish`]
/// checks the remaining invariants that appending alone cannot enforce.
pub struct CircuitBuilder {
    name: String,
    nodes: Vec<Node>,
    input_ids: Vec<NodeId>,
    output_ids: Vec<NodeId>,
}

impl CircuitBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            nodes: Vec::new(),
            input_ids: Vec::new(),
            output_ids: Vec::new(),
        }
    }

    fn next_id(&self) -> NodeId {
        NodeId::from(self.nodes.len())
    }

    fn push(&mut self, node: Node) -> NodeId {
        let id = node.id();
        self.nodes.push(node);
        id
    }

    fn check_edges(&self, edges: &[(NodeId, Option<u32>)]) -> Result<(), IrError> {
        for (producer, _) in edges {
            if producer.index() >= self.nodes.len() {
                return Err(IrError::InvariantViolation(format!(
                    "input {producer} does not refer to an existing node in circuit `{}`",
                    self.name
                )));
            }
        }
        Ok(())
    }

    /// The declared scalar element type of `producer`, used to infer the
    /// type of gates built on top of it.
    fn element_type_of(&self, producer: NodeId) -> Result<PrimitiveType, IrError> {
        self.nodes[producer.index()].element_type().ok_or_else(|| {
            IrError::InvariantViolation(format!("node {producer} declares no output type"))
        })
    }

    /// Appends an `Input` node publishing one circuit argument.
    pub fn add_input(&mut self, data_type: DataType) -> NodeId {
        let id = self.next_id();
        let node = Node::new(id, PrimitiveOperation::Input, Vec::new(), None, None, vec![data_type], None);
        self.input_ids.push(id);
        self.push(node)
    }

    /// Appends a `Constant` node holding one scalar of type `ty`.
    pub fn add_constant(&mut self, ty: PrimitiveType, value: PayloadValue) -> NodeId {
        let id = self.next_id();
        let node = Node::new(
            id,
            PrimitiveOperation::Constant,
            Vec::new(),
            None,
            None,
            vec![DataType::scalar(ty)],
            Some(Payload::scalar(value)),
        );
        self.push(node)
    }

    /// Appends a `Constant` node holding a flat vector with the given shape.
    pub fn add_constant_vector(
        &mut self,
        ty: PrimitiveType,
        values: Vec<PayloadValue>,
        shape: Vec<usize>,
    ) -> NodeId {
        let id = self.next_id();
        let node = Node::new(
            id,
            PrimitiveOperation::Constant,
            Vec::new(),
            None,
            None,
            vec![DataType::with_shape(ty, shape.clone())],
            Some(Payload::vector(values, shape)),
        );
        self.push(node)
    }

    /// Appends an operator node reading whole (non-offset) inputs. The
    /// output type is inferred from the operation: comparisons produce
    /// `bool`, `split` produces a `bool` vector of the operand's width,
    /// `mux` takes its choices' type, and everything else keeps the first
    /// operand's element type. `merge` nodes have no inferable target and
    /// go through [`CircuitBuilder::add_typed_node`] instead.
    pub fn add_node(
        &mut self,
        operation: PrimitiveOperation,
        inputs: &[NodeId],
    ) -> Result<NodeId, IrError> {
        let edges: Vec<_> = inputs.iter().map(|&id| (id, None)).collect();
        self.add_node_with_offsets(operation, &edges)
    }

    /// Appends an operator node whose edges may read single elements of
    /// vector producers.
    pub fn add_node_with_offsets(
        &mut self,
        operation: PrimitiveOperation,
        edges: &[(NodeId, Option<u32>)],
    ) -> Result<NodeId, IrError> {
        self.check_edges(edges)?;
        let first = edges.first().ok_or_else(|| {
            IrError::InvariantViolation(format!("`{operation}` node added without inputs"))
        })?;
        let operand_ty = self.element_type_of(first.0)?;
        let output_types = match operation {
            op if op.is_comparison() => vec![DataType::scalar(PrimitiveType::Bool)],
            PrimitiveOperation::Split => {
                vec![DataType::with_shape(PrimitiveType::Bool, vec![operand_ty.num_bits()])]
            }
            PrimitiveOperation::Mux => {
                // the result takes the type of the choice operands
                let ty = self.element_type_of(edges.get(1).unwrap_or(first).0)?;
                vec![DataType::scalar(ty)]
            }
            _ => vec![DataType::scalar(operand_ty)],
        };
        self.add_typed_node(operation, edges, output_types)
    }

    /// Appends an operator node with explicitly declared output types.
    pub fn add_typed_node(
        &mut self,
        operation: PrimitiveOperation,
        edges: &[(NodeId, Option<u32>)],
        output_types: Vec<DataType>,
    ) -> Result<NodeId, IrError> {
        self.check_edges(edges)?;
        let id = self.next_id();
        let mut node = Node::new(id, operation, Vec::new(), None, None, output_types, None);
        node.set_input_edges(edges.to_vec());
        Ok(self.push(node))
    }

    /// Appends a `CallSubcircuit` node. Each edge feeds one scalar argument
    /// of the callee; the declared output types publish what the callee
    /// returns. The callee's existence is a module-level invariant checked
    /// by [`crate::Module::validate`].
    pub fn add_call(
        &mut self,
        subcircuit: impl Into<String>,
        edges: &[(NodeId, Option<u32>)],
        output_types: Vec<DataType>,
    ) -> Result<NodeId, IrError> {
        self.check_edges(edges)?;
        let id = self.next_id();
        let mut node = Node::new(
            id,
            PrimitiveOperation::CallSubcircuit,
            Vec::new(),
            None,
            Some(subcircuit.into()),
            output_types,
            None,
        );
        node.set_input_edges(edges.to_vec());
        Ok(self.push(node))
    }

    /// Appends an `Output` node publishing the given values, and registers
    /// it in the circuit's output list.
    pub fn add_output(&mut self, inputs: &[NodeId]) -> Result<NodeId, IrError> {
        let edges: Vec<_> = inputs.iter().map(|&id| (id, None)).collect();
        self.add_output_with_offsets(&edges)
    }

    pub fn add_output_with_offsets(
        &mut self,
        edges: &[(NodeId, Option<u32>)],
    ) -> Result<NodeId, IrError> {
        self.check_edges(edges)?;
        let output_types = edges
            .iter()
            .map(|&(producer, _)| {
                // an offset read publishes a single element of the producer
                Ok(DataType::scalar(self.element_type_of(producer)?))
            })
            .collect::<Result<Vec<_>, IrError>>()?;
        let id = self.next_id();
        let mut node =
            Node::new(id, PrimitiveOperation::Output, Vec::new(), None, None, output_types, None);
        node.set_input_edges(edges.to_vec());
        self.output_ids.push(id);
        Ok(self.push(node))
    }

    /// Appends a node from fully spelled-out parts. This is the entry point
    /// deserializers use to rebuild a circuit record by record; `Input` and
    /// `Output` operations are registered in the respective lists in append
    /// order.
    #[allow(clippy::too_many_arguments)]
    pub fn add_raw_node(
        &mut self,
        operation: PrimitiveOperation,
        inputs: Vec<NodeId>,
        input_offsets: Option<Vec<u32>>,
        subcircuit: Option<String>,
        output_types: Vec<DataType>,
        payload: Option<Payload>,
    ) -> Result<NodeId, IrError> {
        if let Some(offsets) = &input_offsets {
            if offsets.len() != inputs.len() {
                return Err(IrError::InvariantViolation(format!(
                    "{} offsets supplied for {} inputs",
                    offsets.len(),
                    inputs.len()
                )));
            }
        }
        let edges: Vec<_> = inputs.iter().map(|&id| (id, None)).collect();
        self.check_edges(&edges)?;
        let id = self.next_id();
        match operation {
            PrimitiveOperation::Input => self.input_ids.push(id),
            PrimitiveOperation::Output => self.output_ids.push(id),
            _ => {}
        }
        let node = Node::new(id, operation, inputs, input_offsets, subcircuit, output_types, payload);
        Ok(self.push(node))
    }

    /// Finalizes the circuit, checking the invariants that appending alone
    /// does not enforce: constants carry a payload agreeing with their
    /// declared type, calls name a subcircuit, and the input list is exactly
    /// the set of `Input` nodes.
    pub fn finish(self) -> Result<Circuit, IrError> {
        for node in &self.nodes {
            match node.operation() {
                PrimitiveOperation::Constant => {
                    let payload = node.payload().ok_or_else(|| {
                        IrError::InvariantViolation(format!(
                            "constant node {} has no payload",
                            node.id()
                        ))
                    })?;
                    let declared = node.output_types().first().ok_or_else(|| {
                        IrError::InvariantViolation(format!(
                            "constant node {} declares no type",
                            node.id()
                        ))
                    })?;
                    if !node.inputs().is_empty() {
                        return Err(IrError::InvariantViolation(format!(
                            "constant node {} has inputs",
                            node.id()
                        )));
                    }
                    if payload.num_elements() != declared.num_elements() {
                        return Err(IrError::InvariantViolation(format!(
                            "constant node {} holds {} elements but declares {}",
                            node.id(),
                            payload.num_elements(),
                            declared.num_elements()
                        )));
                    }
                    payload_matches_type(node.id(), payload, declared.primitive)?;
                }
                PrimitiveOperation::CallSubcircuit => {
                    if node.subcircuit_name().is_none() {
                        return Err(IrError::InvariantViolation(format!(
                            "call node {} names no subcircuit",
                            node.id()
                        )));
                    }
                }
                PrimitiveOperation::Input => {
                    if !self.input_ids.contains(&node.id()) {
                        return Err(IrError::InvariantViolation(format!(
                            "input node {} missing from the input list",
                            node.id()
                        )));
                    }
                }
                _ => {}
            }
        }
        let nodes = self.nodes.into_iter().map(Some).collect();
        Ok(Circuit::from_parts(self.name, nodes, self.input_ids, self.output_ids))
    }
}

fn payload_matches_type(
    id: NodeId,
    payload: &Payload,
    primitive: PrimitiveType,
) -> Result<(), IrError> {
    let ok = payload.elements().iter().all(|value| match value {
        PayloadValue::Bool(_) => primitive == PrimitiveType::Bool,
        PayloadValue::Int(_) => primitive.is_signed_int(),
        PayloadValue::UInt(_) => primitive.is_unsigned_int(),
        PayloadValue::Float(_) => primitive == PrimitiveType::Float,
        PayloadValue::Double(_) => primitive == PrimitiveType::Double,
    });
    if ok {
        Ok(())
    } else {
        Err(IrError::InvariantViolation(format!(
            "constant node {id} holds a payload not encoded as `{primitive}`"
        )))
    }
}
