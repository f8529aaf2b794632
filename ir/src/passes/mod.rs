//! The canonical analysis and transformation passes.
//!
//! Each pass is exposed as a free function mutating its circuit or module in
//! place, plus an adapter implementing [`fuse_pass::Pass`] so passes can be
//! chained into pipelines. The usual pipeline order is vectorization, then
//! constant folding, then dead-node elimination.

mod constant_fold;
mod dead_nodes;
mod replace_subcircuits;
mod vectorize;

pub use self::constant_fold::{
    ConstantFolding, ModuleConstantFolding, fold_constants, fold_constants_in_module,
};
pub use self::dead_nodes::{
    DeadNodeElimination, ModuleDeadNodeElimination, eliminate_dead_nodes,
    eliminate_dead_nodes_in_module,
};
pub use self::replace_subcircuits::{ReplaceFrequentSubcircuits, replace_frequent_subcircuits};
pub use self::vectorize::{InstructionVectorization, vectorize_instructions};
