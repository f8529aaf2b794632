mod builder;
mod circuit;
mod dot;
mod eval;
mod module;
mod node;
mod ops;
mod payload;
mod policies;
mod types;

pub mod passes;
#[cfg(test)]
mod tests;

pub use self::{
    builder::CircuitBuilder,
    circuit::Circuit,
    eval::evaluate,
    module::Module,
    node::{Node, NodeId},
    ops::PrimitiveOperation,
    payload::{Payload, PayloadValue},
    policies::{Accumulator, apply, merge_bits, split_bits},
    types::{DataType, PrimitiveType, SecurityLevel},
};

/// Errors raised by the object model and the passes.
///
/// All of these abort the current pass; none are retried or downgraded.
#[derive(Debug, thiserror::Error)]
pub enum IrError {
    /// The graph violated a structural precondition (dangling edge,
    /// mismatched offsets, wrong arity, non-topological order). The caller
    /// must fix the producer of the graph, not the pass.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// An evaluation was requested for an `(operation, element type)` pair
    /// that has no defined semantics, e.g. `and` on `f32`.
    #[error("operation `{op}` is not defined for element type `{ty}`")]
    UnsupportedOperationForType {
        op: PrimitiveOperation,
        ty: PrimitiveType,
    },

    /// A `CallSubcircuit` node names a circuit that is not in the module.
    #[error("call to unknown subcircuit `{0}`")]
    MissingSubcircuit(String),

    /// Folding or evaluating a division whose divisor is a zero constant.
    #[error("division by a zero constant")]
    DivisionByZero,
}
