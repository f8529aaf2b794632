use std::collections::{BTreeMap, BTreeSet};

use crate::{Circuit, IrError, Node, PrimitiveOperation};

/// A named collection of circuits with one entry point; the unit of
/// serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    circuits: BTreeMap<String, Circuit>,
    entry: String,
}

impl Module {
    /// Creates an empty module. The entry circuit can be added afterwards;
    /// [`Module::validate`] checks that it eventually exists.
    pub fn new(entry: impl Into<String>) -> Self {
        Self { circuits: BTreeMap::new(), entry: entry.into() }
    }

    pub fn entry_name(&self) -> &str {
        &self.entry
    }

    pub fn set_entry(&mut self, entry: impl Into<String>) -> Result<(), IrError> {
        let entry = entry.into();
        if !self.circuits.contains_key(&entry) {
            return Err(IrError::InvariantViolation(format!(
                "entry circuit `{entry}` is not in the module"
            )));
        }
        self.entry = entry;
        Ok(())
    }

    pub fn entry_circuit(&self) -> Result<&Circuit, IrError> {
        self.circuits.get(&self.entry).ok_or_else(|| {
            IrError::InvariantViolation(format!("entry circuit `{}` is not in the module", self.entry))
        })
    }

    /// Inserts a circuit under its own name, rejecting duplicates.
    pub fn add_circuit(&mut self, circuit: Circuit) -> Result<(), IrError> {
        let name = circuit.name().to_string();
        if self.circuits.contains_key(&name) {
            return Err(IrError::InvariantViolation(format!(
                "module already contains a circuit named `{name}`"
            )));
        }
        self.circuits.insert(name, circuit);
        Ok(())
    }

    pub fn remove_circuit(&mut self, name: &str) -> Option<Circuit> {
        self.circuits.remove(name)
    }

    pub fn circuit(&self, name: &str) -> Option<&Circuit> {
        self.circuits.get(name)
    }

    pub fn circuit_mut(&mut self, name: &str) -> Option<&mut Circuit> {
        self.circuits.get_mut(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.circuits.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.circuits.keys().map(String::as_str)
    }

    pub fn num_circuits(&self) -> usize {
        self.circuits.len()
    }

    /// The caller-to-callee edges between circuits, computed on demand.
    pub fn call_graph(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.circuits
            .iter()
            .map(|(name, circuit)| {
                let callees = circuit
                    .iter()
                    .filter_map(Node::subcircuit_name)
                    .map(str::to_string)
                    .collect();
                (name.clone(), callees)
            })
            .collect()
    }

    /// Checks the cross-circuit invariants: the entry exists, every call
    /// names a circuit in the module, and call arities line up with the
    /// callee's published interface.
    pub fn validate(&self) -> Result<(), IrError> {
        self.entry_circuit()?;
        for circuit in self.circuits.values() {
            for node in circuit.iter() {
                if node.operation() != PrimitiveOperation::CallSubcircuit {
                    continue;
                }
                let callee_name = node.subcircuit_name().ok_or_else(|| {
                    IrError::InvariantViolation(format!(
                        "call node {} in `{}` names no subcircuit",
                        node.id(),
                        circuit.name()
                    ))
                })?;
                let callee = self
                    .circuits
                    .get(callee_name)
                    .ok_or_else(|| IrError::MissingSubcircuit(callee_name.to_string()))?;
                if node.num_inputs() != callee.input_ids().len() {
                    return Err(IrError::InvariantViolation(format!(
                        "call node {} in `{}` feeds {} elements into `{callee_name}` which takes {}",
                        node.id(),
                        circuit.name(),
                        node.num_inputs(),
                        callee.input_ids().len()
                    )));
                }
                let callee_elements: usize = callee
                    .output_ids()
                    .iter()
                    .filter_map(|&id| callee.get(id))
                    .map(Node::num_output_elements)
                    .sum();
                if node.num_output_elements() != callee_elements {
                    return Err(IrError::InvariantViolation(format!(
                        "call node {} in `{}` publishes {} elements but `{callee_name}` returns {}",
                        node.id(),
                        circuit.name(),
                        node.num_output_elements(),
                        callee_elements
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CircuitBuilder, DataType, PrimitiveType};

    fn identity_circuit(name: &str) -> Circuit {
        let mut builder = CircuitBuilder::new(name);
        let a = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        builder.add_output(&[a]).unwrap();
        builder.finish().unwrap()
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let mut module = Module::new("main");
        module.add_circuit(identity_circuit("main")).unwrap();
        assert!(module.add_circuit(identity_circuit("main")).is_err());
    }

    #[test]
    fn validate_requires_known_callees() {
        let mut builder = CircuitBuilder::new("main");
        let a = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let call = builder
            .add_call("helper", &[(a, None)], vec![DataType::scalar(PrimitiveType::Bool)])
            .unwrap();
        builder.add_output(&[call]).unwrap();

        let mut module = Module::new("main");
        module.add_circuit(builder.finish().unwrap()).unwrap();
        assert!(matches!(module.validate(), Err(IrError::MissingSubcircuit(name)) if name == "helper"));

        module.add_circuit(identity_circuit("helper")).unwrap();
        module.validate().unwrap();
    }

    #[test]
    fn call_graph_lists_callees() {
        let mut builder = CircuitBuilder::new("main");
        let a = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let call = builder
            .add_call("helper", &[(a, None)], vec![DataType::scalar(PrimitiveType::Bool)])
            .unwrap();
        builder.add_output(&[call]).unwrap();

        let mut module = Module::new("main");
        module.add_circuit(builder.finish().unwrap()).unwrap();
        module.add_circuit(identity_circuit("helper")).unwrap();

        let graph = module.call_graph();
        assert!(graph["main"].contains("helper"));
        assert!(graph["helper"].is_empty());
    }
}
