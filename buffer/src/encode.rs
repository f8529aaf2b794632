//! Encoding from the object model into the flat buffer layout.
//!
//! A circuit buffer is laid out as a fixed header, the name, the input and
//! output id tables, a node offset index, and one length-prefixed record
//! per node:
//!
//! ```text
//! magic "FSC1" | version u16 | reserved u16
//! num_nodes u32 | num_inputs u32 | num_outputs u32 | name_len u32
//! name bytes
//! input ids   num_inputs  x u64
//! output ids  num_outputs x u64
//! node index  num_nodes   x u32   (absolute record offsets)
//! node records
//! ```
//!
//! A node record is `record_len u32` followed by `record_len` bytes:
//!
//! ```text
//! id u64 | op u8 | flags u8 | num_inputs u16 | num_output_types u16 | reserved u16
//! inputs      num_inputs x u64
//! offsets     (flag) num_inputs x u32
//! out types   num_output_types x { primitive u8, security u8, rank u16, dims rank x u32 }
//! subcircuit  (flag) u16 length + bytes
//! payload     (flag) tagged constant encoding
//! ```
//!
//! A module buffer is a header, the entry name, a directory of named
//! circuit slices, and the concatenated circuit buffers:
//!
//! ```text
//! magic "FSM1" | version u16 | reserved u16 | num_circuits u32
//! entry_len u32 | entry bytes
//! directory num_circuits x { name_len u32, name bytes, offset u32, len u32 }
//! circuit buffers
//! ```

use std::collections::BTreeMap;

use fuse_ir::{Circuit, DataType, Module, Node, NodeId, Payload, PayloadValue};

use crate::BufferError;
use crate::format::{
    CIRCUIT_MAGIC, FLAG_OFFSETS, FLAG_PAYLOAD, FLAG_SUBCIRCUIT, FORMAT_VERSION, MODULE_MAGIC,
    PAYLOAD_BOOL, PAYLOAD_F32, PAYLOAD_F64, PAYLOAD_INT, PAYLOAD_UINT, PAYLOAD_VECTOR, WriteLe,
    operation_tag, primitive_tag, security_tag,
};

/// Serializes a circuit, renumbering the live nodes to the compact
/// identifiers `0..n` in topological order. Two structurally equal circuits
/// therefore encode to identical bytes regardless of their removal history.
pub fn encode_circuit(circuit: &Circuit) -> Result<Vec<u8>, BufferError> {
    // canonical renumber of the survivors
    let renumber: BTreeMap<NodeId, u64> = circuit
        .ids()
        .enumerate()
        .map(|(new, old)| (old, new as u64))
        .collect();
    let remap = |id: &NodeId| -> Result<u64, BufferError> {
        renumber.get(id).copied().ok_or_else(|| {
            BufferError::Malformed(format!("edge references removed node {id}"))
        })
    };

    let name = circuit.name().as_bytes();
    let mut buffer = Vec::new();
    buffer.extend_from_slice(CIRCUIT_MAGIC);
    buffer.put_u16(FORMAT_VERSION);
    buffer.put_u16(0);
    buffer.put_u32(renumber.len() as u32);
    buffer.put_u32(circuit.input_ids().len() as u32);
    buffer.put_u32(circuit.output_ids().len() as u32);
    buffer.put_u32(name.len() as u32);
    buffer.extend_from_slice(name);
    for id in circuit.input_ids() {
        buffer.put_u64(remap(id)?);
    }
    for id in circuit.output_ids() {
        buffer.put_u64(remap(id)?);
    }

    // reserve the node index, then backpatch it record by record
    let index_start = buffer.len();
    buffer.resize(index_start + renumber.len() * 4, 0);
    for (position, node) in circuit.iter().enumerate() {
        let record_offset = buffer.len() as u32;
        buffer[index_start + position * 4..index_start + position * 4 + 4]
            .copy_from_slice(&record_offset.to_le_bytes());
        encode_node(&mut buffer, node, &remap)?;
    }
    Ok(buffer)
}

/// Serializes a module: every circuit buffer is embedded whole and listed
/// in a directory by name.
pub fn encode_module(module: &Module) -> Result<Vec<u8>, BufferError> {
    let encoded: Vec<(&str, Vec<u8>)> = module
        .names()
        .map(|name| {
            let circuit = module.circuit(name).expect("listed circuit exists");
            Ok((name, encode_circuit(circuit)?))
        })
        .collect::<Result<_, BufferError>>()?;

    let entry = module.entry_name().as_bytes();
    let mut buffer = Vec::new();
    buffer.extend_from_slice(MODULE_MAGIC);
    buffer.put_u16(FORMAT_VERSION);
    buffer.put_u16(0);
    buffer.put_u32(encoded.len() as u32);
    buffer.put_u32(entry.len() as u32);
    buffer.extend_from_slice(entry);

    let directory_len: usize = encoded.iter().map(|(name, _)| 4 + name.len() + 8).sum();
    let mut circuit_offset = buffer.len() + directory_len;
    for (name, bytes) in &encoded {
        buffer.put_u32(name.len() as u32);
        buffer.extend_from_slice(name.as_bytes());
        buffer.put_u32(circuit_offset as u32);
        buffer.put_u32(bytes.len() as u32);
        circuit_offset += bytes.len();
    }
    for (_, bytes) in &encoded {
        buffer.extend_from_slice(bytes);
    }
    Ok(buffer)
}

fn encode_node(
    buffer: &mut Vec<u8>,
    node: &Node,
    remap: &impl Fn(&NodeId) -> Result<u64, BufferError>,
) -> Result<(), BufferError> {
    let mut flags = 0u8;
    if node.input_offsets().is_some() {
        flags |= FLAG_OFFSETS;
    }
    if node.subcircuit_name().is_some() {
        flags |= FLAG_SUBCIRCUIT;
    }
    if node.payload().is_some() {
        flags |= FLAG_PAYLOAD;
    }

    let mut record = Vec::new();
    record.put_u64(remap(&node.id())?);
    record.put_u8(operation_tag(node.operation()));
    record.put_u8(flags);
    record.put_u16(node.num_inputs() as u16);
    record.put_u16(node.output_types().len() as u16);
    record.put_u16(0);
    for id in node.inputs() {
        record.put_u64(remap(id)?);
    }
    if let Some(offsets) = node.input_offsets() {
        for &offset in offsets {
            record.put_u32(offset);
        }
    }
    for data_type in node.output_types() {
        encode_data_type(&mut record, data_type);
    }
    if let Some(name) = node.subcircuit_name() {
        record.put_u16(name.len() as u16);
        record.extend_from_slice(name.as_bytes());
    }
    if let Some(payload) = node.payload() {
        encode_payload(&mut record, payload)?;
    }

    buffer.put_u32(record.len() as u32);
    buffer.extend_from_slice(&record);
    Ok(())
}

fn encode_data_type(buffer: &mut Vec<u8>, data_type: &DataType) {
    buffer.put_u8(primitive_tag(data_type.primitive));
    buffer.put_u8(security_tag(data_type.security));
    buffer.put_u16(data_type.shape.len() as u16);
    for &dim in &data_type.shape {
        buffer.put_u32(dim as u32);
    }
}

fn value_tag(value: &PayloadValue) -> u8 {
    match value {
        PayloadValue::Bool(_) => PAYLOAD_BOOL,
        PayloadValue::Int(_) => PAYLOAD_INT,
        PayloadValue::UInt(_) => PAYLOAD_UINT,
        PayloadValue::Float(_) => PAYLOAD_F32,
        PayloadValue::Double(_) => PAYLOAD_F64,
    }
}

fn encode_value_body(buffer: &mut Vec<u8>, value: &PayloadValue) {
    match value {
        PayloadValue::Bool(v) => buffer.put_u8(*v as u8),
        PayloadValue::Int(v) => buffer.put_u64(*v as u64),
        PayloadValue::UInt(v) => buffer.put_u64(*v),
        PayloadValue::Float(v) => buffer.extend_from_slice(&v.to_le_bytes()),
        PayloadValue::Double(v) => buffer.extend_from_slice(&v.to_le_bytes()),
    }
}

/// The self-describing constant encoding: a tag byte, then either one
/// scalar body or a shape descriptor plus the homogeneous element bodies.
fn encode_payload(buffer: &mut Vec<u8>, payload: &Payload) -> Result<(), BufferError> {
    match payload {
        Payload::Scalar(value) => {
            buffer.put_u8(value_tag(value));
            encode_value_body(buffer, value);
        }
        Payload::Vector(values, shape) => {
            let first = values.first().ok_or_else(|| {
                BufferError::Malformed("vector payload with no elements".to_string())
            })?;
            let tag = value_tag(first);
            if values.iter().any(|value| value_tag(value) != tag) {
                return Err(BufferError::Malformed(
                    "vector payload mixes element encodings".to_string(),
                ));
            }
            buffer.put_u8(PAYLOAD_VECTOR | tag);
            buffer.put_u16(shape.len() as u16);
            for &dim in shape {
                buffer.put_u32(dim as u32);
            }
            buffer.put_u32(values.len() as u32);
            for value in values {
                encode_value_body(buffer, value);
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use fuse_ir::{CircuitBuilder, PrimitiveType};

    /// A one-node circuit pins the exact byte layout.
    #[test]
    fn single_input_circuit_bytes() {
        let mut builder = CircuitBuilder::new("t");
        builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let circuit = builder.finish().unwrap();
        let bytes = encode_circuit(&circuit).unwrap();

        #[rustfmt::skip]
        let expected: Vec<u8> = vec![
            b'F', b'S', b'C', b'1',      // magic
            1, 0,                        // version
            0, 0,                        // reserved
            1, 0, 0, 0,                  // num_nodes
            1, 0, 0, 0,                  // num_inputs
            0, 0, 0, 0,                  // num_outputs
            1, 0, 0, 0,                  // name_len
            b't',                        // name
            0, 0, 0, 0, 0, 0, 0, 0,      // input id 0
            37, 0, 0, 0,                 // node index: record at offset 37
            20, 0, 0, 0,                 // record_len
            0, 0, 0, 0, 0, 0, 0, 0,      // id 0
            21,                          // op = input
            0,                           // flags
            0, 0,                        // num_inputs
            1, 0,                        // num_output_types
            0, 0,                        // reserved
            0,                           // primitive = bool
            0,                           // security = none
            0, 0,                        // rank
        ];
        assert_eq!(bytes, expected);
    }

    #[test]
    fn renumbering_compacts_removed_slots() {
        let mut builder = CircuitBuilder::new("compact");
        let a = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let b = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let keep = builder.add_node(fuse_ir::PrimitiveOperation::And, &[a, b]).unwrap();
        let _dead = builder.add_node(fuse_ir::PrimitiveOperation::Or, &[a, b]).unwrap();
        builder.add_output(&[keep]).unwrap();
        let mut with_hole = builder.finish().unwrap();
        fuse_ir::passes::eliminate_dead_nodes(&mut with_hole).unwrap();

        let mut builder = CircuitBuilder::new("compact");
        let a = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let b = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let keep = builder.add_node(fuse_ir::PrimitiveOperation::And, &[a, b]).unwrap();
        builder.add_output(&[keep]).unwrap();
        let compact = builder.finish().unwrap();

        assert_eq!(encode_circuit(&with_hole).unwrap(), encode_circuit(&compact).unwrap());
    }

    #[test]
    fn mixed_vector_payloads_are_rejected() {
        let mut record = Vec::new();
        let mixed = Payload::vector(
            vec![PayloadValue::Bool(true), PayloadValue::UInt(1)],
            vec![2],
        );
        assert!(encode_payload(&mut record, &mixed).is_err());
    }
}
