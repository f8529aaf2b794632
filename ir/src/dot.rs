//! Graphviz Dot dump of a circuit, for debugging. Display on
//! <https://dreampuf.github.io/GraphvizOnline> or using
//! `dot -Tsvg circuit.dot > circuit.svg`.

use std::fmt::Write;

use crate::{Circuit, Node, PrimitiveOperation};

impl Circuit {
    /// Renders the live nodes and their edges in Dot format.
    pub fn to_dot(&self) -> Result<String, std::fmt::Error> {
        let mut f = String::new();
        writeln!(f, "digraph \"{}\" {{", self.name())?;
        for node in self.iter() {
            writeln!(f, "  {} [label=\"{}\"]", node.id(), node_label(node))?;
            for (producer, offset) in node.input_edges() {
                match offset {
                    Some(offset) => {
                        writeln!(f, "  {} -> {} [label=\"{}\"]", producer, node.id(), offset)?
                    }
                    None => writeln!(f, "  {} -> {}", producer, node.id())?,
                }
            }
        }
        writeln!(f, "}}")?;
        Ok(f)
    }
}

fn node_label(node: &Node) -> String {
    match node.operation() {
        PrimitiveOperation::Constant => match node.payload() {
            Some(payload) => format!("const {payload:?}"),
            None => "const".to_string(),
        },
        PrimitiveOperation::CallSubcircuit => {
            format!("call {}", node.subcircuit_name().unwrap_or("?"))
        }
        op => op.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use crate::{CircuitBuilder, DataType, PrimitiveOperation, PrimitiveType};

    #[test]
    fn dot_lists_every_edge() {
        let mut builder = CircuitBuilder::new("tiny");
        let a = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let b = builder.add_input(DataType::scalar(PrimitiveType::Bool));
        let and = builder.add_node(PrimitiveOperation::And, &[a, b]).unwrap();
        builder.add_output(&[and]).unwrap();
        let dot = builder.finish().unwrap().to_dot().unwrap();
        assert!(dot.contains("digraph \"tiny\""));
        assert!(dot.contains("0 -> 2"));
        assert!(dot.contains("1 -> 2"));
        assert!(dot.contains("[label=\"and\"]"));
    }
}
