//! Zero-copy read views over serialized circuits and modules.
//!
//! A view borrows the byte buffer and decodes fields on access; nothing is
//! unpacked up front. Read-only analyses can traverse a view directly;
//! mutation requires the explicit O(n) [`CircuitView::unpack`] into the
//! object model.

use std::collections::{BTreeMap, BTreeSet};

use fuse_ir::{
    Circuit, CircuitBuilder, DataType, Module, NodeId, Payload, PayloadValue, PrimitiveOperation,
};

use crate::BufferError;
use crate::format::{
    CIRCUIT_MAGIC, Cursor, FLAG_OFFSETS, FLAG_PAYLOAD, FLAG_SUBCIRCUIT, FORMAT_VERSION,
    MODULE_MAGIC, PAYLOAD_BOOL, PAYLOAD_F32, PAYLOAD_F64, PAYLOAD_INT, PAYLOAD_UINT,
    PAYLOAD_VECTOR, operation_from_tag, primitive_from_tag, security_from_tag,
};

/// A read-only view over one serialized circuit.
#[derive(Clone, Copy)]
pub struct CircuitView<'a> {
    data: &'a [u8],
    name: &'a str,
    num_nodes: usize,
    num_inputs: usize,
    num_outputs: usize,
    io_offset: usize,
    index_offset: usize,
}

impl<'a> CircuitView<'a> {
    /// Validates the header and tables of a circuit buffer.
    pub fn parse(data: &'a [u8]) -> Result<Self, BufferError> {
        let mut cursor = Cursor::new(data);
        if cursor.take(4)? != CIRCUIT_MAGIC {
            return Err(BufferError::BadMagic { expected: "FSC1" });
        }
        let version = cursor.read_u16()?;
        if version != FORMAT_VERSION {
            return Err(BufferError::UnsupportedVersion(version));
        }
        cursor.read_u16()?; // reserved
        let num_nodes = cursor.read_u32()? as usize;
        let num_inputs = cursor.read_u32()? as usize;
        let num_outputs = cursor.read_u32()? as usize;
        let name_len = cursor.read_u32()? as usize;
        let name = cursor.read_str(name_len)?;
        let io_offset = cursor.position();
        cursor.take((num_inputs + num_outputs) * 8)?;
        let index_offset = cursor.position();
        cursor.take(num_nodes * 4)?;
        Ok(Self { data, name, num_nodes, num_inputs, num_outputs, io_offset, index_offset })
    }

    pub fn name(&self) -> &'a str {
        self.name
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn input_ids(&self) -> impl Iterator<Item = u64> + 'a {
        read_u64_table(self.data, self.io_offset, self.num_inputs)
    }

    pub fn output_ids(&self) -> impl Iterator<Item = u64> + 'a {
        read_u64_table(self.data, self.io_offset + self.num_inputs * 8, self.num_outputs)
    }

    /// The `index`-th node record, in topological order.
    pub fn node(&self, index: usize) -> Result<NodeView<'a>, BufferError> {
        if index >= self.num_nodes {
            return Err(BufferError::Malformed(format!(
                "node index {index} out of range for {} nodes",
                self.num_nodes
            )));
        }
        let mut cursor = Cursor::at(self.data, self.index_offset + index * 4);
        let record_offset = cursor.read_u32()? as usize;
        NodeView::parse(self.data, record_offset)
    }

    pub fn iter(&self) -> impl Iterator<Item = Result<NodeView<'a>, BufferError>> + '_ {
        (0..self.num_nodes).map(|index| self.node(index))
    }

    /// The consumers of every node, computed straight off the buffer.
    pub fn node_successors(&self) -> Result<BTreeMap<u64, BTreeSet<u64>>, BufferError> {
        let mut successors: BTreeMap<u64, BTreeSet<u64>> = BTreeMap::new();
        for node in self.iter() {
            let node = node?;
            for producer in node.inputs() {
                successors.entry(producer).or_default().insert(node.id());
            }
        }
        Ok(successors)
    }

    /// Rebuilds the mutable object model from the buffer; the explicit,
    /// O(n) conversion out of the read-only world.
    pub fn unpack(&self) -> Result<Circuit, BufferError> {
        let mut builder = CircuitBuilder::new(self.name);
        for (position, node) in self.iter().enumerate() {
            let node = node?;
            if node.id() != position as u64 {
                return Err(BufferError::Malformed(format!(
                    "record {position} carries id {}, expected the canonical numbering",
                    node.id()
                )));
            }
            let inputs: Vec<NodeId> = node.inputs().map(NodeId::from).collect();
            let offsets = node.input_offsets().map(|offsets| offsets.collect());
            builder.add_raw_node(
                node.operation(),
                inputs,
                offsets,
                node.subcircuit_name()?.map(str::to_string),
                node.output_types()?,
                node.payload()?,
            )?;
        }
        let circuit = builder.finish()?;

        // the io tables are re-derived from the records; stored tables must
        // agree with them
        let stored_inputs: Vec<NodeId> = self.input_ids().map(NodeId::from).collect();
        let stored_outputs: Vec<NodeId> = self.output_ids().map(NodeId::from).collect();
        if circuit.input_ids() != stored_inputs || circuit.output_ids() != stored_outputs {
            return Err(BufferError::Malformed(
                "stored io tables disagree with the node records".to_string(),
            ));
        }
        Ok(circuit)
    }
}

fn read_u64_table(data: &[u8], offset: usize, count: usize) -> impl Iterator<Item = u64> + '_ {
    // bounds were checked when the view was parsed
    data[offset..offset + count * 8]
        .chunks_exact(8)
        .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
}

/// A read-only view over one node record.
#[derive(Clone, Copy)]
pub struct NodeView<'a> {
    id: u64,
    operation: PrimitiveOperation,
    flags: u8,
    num_inputs: usize,
    num_output_types: usize,
    inputs_bytes: &'a [u8],
    offsets_bytes: Option<&'a [u8]>,
    /// Output types, optional subcircuit name and optional payload; bounded
    /// by the record length, so unknown trailing fields are skipped.
    tail: &'a [u8],
}

impl<'a> NodeView<'a> {
    fn parse(data: &'a [u8], record_offset: usize) -> Result<Self, BufferError> {
        let mut cursor = Cursor::at(data, record_offset);
        let record_len = cursor.read_u32()? as usize;
        let record = cursor.take(record_len)?;

        let mut cursor = Cursor::new(record);
        let id = cursor.read_u64()?;
        let operation = operation_from_tag(cursor.read_u8()?)?;
        let flags = cursor.read_u8()?;
        let num_inputs = cursor.read_u16()? as usize;
        let num_output_types = cursor.read_u16()? as usize;
        cursor.read_u16()?; // reserved
        let inputs_bytes = cursor.take(num_inputs * 8)?;
        let offsets_bytes = if flags & FLAG_OFFSETS != 0 {
            Some(cursor.take(num_inputs * 4)?)
        } else {
            None
        };
        let tail = &record[cursor.position()..];
        Ok(Self {
            id,
            operation,
            flags,
            num_inputs,
            num_output_types,
            inputs_bytes,
            offsets_bytes,
            tail,
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn operation(&self) -> PrimitiveOperation {
        self.operation
    }

    pub fn num_inputs(&self) -> usize {
        self.num_inputs
    }

    /// The producer ids, decoded straight out of the record bytes.
    pub fn inputs(&self) -> impl Iterator<Item = u64> + 'a {
        self.inputs_bytes
            .chunks_exact(8)
            .map(|chunk| u64::from_le_bytes(chunk.try_into().unwrap()))
    }

    pub fn input_offsets(&self) -> Option<impl Iterator<Item = u32> + 'a> {
        self.offsets_bytes.map(|bytes| {
            bytes.chunks_exact(4).map(|chunk| u32::from_le_bytes(chunk.try_into().unwrap()))
        })
    }

    pub fn output_types(&self) -> Result<Vec<DataType>, BufferError> {
        let mut cursor = Cursor::new(self.tail);
        (0..self.num_output_types).map(|_| read_data_type(&mut cursor)).collect()
    }

    pub fn subcircuit_name(&self) -> Result<Option<&'a str>, BufferError> {
        if self.flags & FLAG_SUBCIRCUIT == 0 {
            return Ok(None);
        }
        let mut cursor = Cursor::new(self.tail);
        for _ in 0..self.num_output_types {
            read_data_type(&mut cursor)?;
        }
        let len = cursor.read_u16()? as usize;
        Ok(Some(cursor.read_str(len)?))
    }

    pub fn payload(&self) -> Result<Option<Payload>, BufferError> {
        if self.flags & FLAG_PAYLOAD == 0 {
            return Ok(None);
        }
        let mut cursor = Cursor::new(self.tail);
        for _ in 0..self.num_output_types {
            read_data_type(&mut cursor)?;
        }
        if self.flags & FLAG_SUBCIRCUIT != 0 {
            let len = cursor.read_u16()? as usize;
            cursor.take(len)?;
        }
        Ok(Some(read_payload(&mut cursor)?))
    }
}

fn read_data_type(cursor: &mut Cursor<'_>) -> Result<DataType, BufferError> {
    let primitive = primitive_from_tag(cursor.read_u8()?)?;
    let security = security_from_tag(cursor.read_u8()?)?;
    let rank = cursor.read_u16()? as usize;
    let shape = (0..rank)
        .map(|_| Ok(cursor.read_u32()? as usize))
        .collect::<Result<Vec<_>, BufferError>>()?;
    let mut data_type = DataType::with_shape(primitive, shape);
    if let Some(security) = security {
        data_type = data_type.with_security(security);
    }
    Ok(data_type)
}

fn read_value_body(cursor: &mut Cursor<'_>, tag: u8) -> Result<PayloadValue, BufferError> {
    Ok(match tag {
        PAYLOAD_BOOL => PayloadValue::Bool(cursor.read_u8()? != 0),
        PAYLOAD_INT => PayloadValue::Int(cursor.read_u64()? as i64),
        PAYLOAD_UINT => PayloadValue::UInt(cursor.read_u64()?),
        PAYLOAD_F32 => PayloadValue::Float(f32::from_le_bytes(cursor.take(4)?.try_into().unwrap())),
        PAYLOAD_F64 => PayloadValue::Double(f64::from_le_bytes(cursor.take(8)?.try_into().unwrap())),
        value => return Err(BufferError::InvalidTag { what: "payload", value }),
    })
}

fn read_payload(cursor: &mut Cursor<'_>) -> Result<Payload, BufferError> {
    let tag = cursor.read_u8()?;
    if tag & PAYLOAD_VECTOR == 0 {
        return Ok(Payload::Scalar(read_value_body(cursor, tag)?));
    }
    let element_tag = tag & !PAYLOAD_VECTOR;
    let rank = cursor.read_u16()? as usize;
    let shape = (0..rank)
        .map(|_| Ok(cursor.read_u32()? as usize))
        .collect::<Result<Vec<_>, BufferError>>()?;
    let count = cursor.read_u32()? as usize;
    let values = (0..count)
        .map(|_| read_value_body(cursor, element_tag))
        .collect::<Result<Vec<_>, BufferError>>()?;
    Ok(Payload::Vector(values, shape))
}

/// A read-only view over a serialized module.
pub struct ModuleView<'a> {
    entry: &'a str,
    directory: Vec<(&'a str, &'a [u8])>,
}

impl<'a> ModuleView<'a> {
    pub fn parse(data: &'a [u8]) -> Result<Self, BufferError> {
        let mut cursor = Cursor::new(data);
        if cursor.take(4)? != MODULE_MAGIC {
            return Err(BufferError::BadMagic { expected: "FSM1" });
        }
        let version = cursor.read_u16()?;
        if version != FORMAT_VERSION {
            return Err(BufferError::UnsupportedVersion(version));
        }
        cursor.read_u16()?; // reserved
        let num_circuits = cursor.read_u32()? as usize;
        let entry_len = cursor.read_u32()? as usize;
        let entry = cursor.read_str(entry_len)?;

        let mut directory = Vec::with_capacity(num_circuits);
        for _ in 0..num_circuits {
            let name_len = cursor.read_u32()? as usize;
            let name = cursor.read_str(name_len)?;
            let offset = cursor.read_u32()? as usize;
            let len = cursor.read_u32()? as usize;
            let slice = Cursor::at(data, offset).take(len)?;
            directory.push((name, slice));
        }
        Ok(Self { entry, directory })
    }

    pub fn entry_name(&self) -> &'a str {
        self.entry
    }

    pub fn num_circuits(&self) -> usize {
        self.directory.len()
    }

    pub fn circuit_names(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.directory.iter().map(|(name, _)| *name)
    }

    pub fn circuit(&self, name: &str) -> Result<CircuitView<'a>, BufferError> {
        let (_, slice) = self
            .directory
            .iter()
            .find(|(entry_name, _)| *entry_name == name)
            .ok_or_else(|| BufferError::Malformed(format!("module has no circuit `{name}`")))?;
        CircuitView::parse(slice)
    }

    pub fn entry_circuit(&self) -> Result<CircuitView<'a>, BufferError> {
        self.circuit(self.entry)
    }

    /// Rebuilds the mutable object model for the whole module.
    pub fn unpack(&self) -> Result<Module, BufferError> {
        let mut module = Module::new(self.entry);
        for name in self.circuit_names() {
            module.add_circuit(self.circuit(name)?.unpack()?)?;
        }
        Ok(module)
    }
}
