//! Frequent-subcircuit replacement: mines recurring subgraphs of the entry
//! circuit and factors the most profitable pattern into a named subcircuit
//! plus `CallSubcircuit` sites.
//!
//! The pass is anytime: the wall-clock budget is checked between candidate
//! evaluations, and when it elapses the best rewrite found so far is
//! committed. Running out of budget is not an error.

use std::collections::{BTreeMap, BTreeSet};
use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::{Duration, Instant};

use fuse_pass::Pass;
use log::{debug, trace};

use crate::{
    Circuit, CircuitBuilder, DataType, IrError, Module, Node, NodeId, PrimitiveOperation,
};

/// Patterns of fewer nodes than this cannot pay for their call overhead.
const MIN_PATTERN_NODES: usize = 2;

/// Bias against large patterns in the score, approximating the fixed cost
/// of one call site per occurrence.
const EPSILON: f64 = 0.5;

/// How deep the top-down strategy follows single-consumer chains.
const TOP_DOWN_DEPTH: usize = 64;

/// Mines the module's entry circuit for repeated subgraphs and rewrites the
/// best-scoring pattern into calls to a freshly minted subcircuit.
///
/// `try_modes` selects how many mining strategies to attempt (top-down from
/// maximal roots, then bottom-up enumerations of small depth);
/// `time_budget` bounds the whole pass.
pub fn replace_frequent_subcircuits(
    module: &mut Module,
    try_modes: usize,
    time_budget: Duration,
) -> Result<(), IrError> {
    let deadline = Instant::now() + time_budget;
    let entry_name = module.entry_circuit()?.name().to_string();

    let winner = {
        let circuit = module.circuit(&entry_name).expect("entry circuit exists");
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
        for strategy in strategies(try_modes) {
            if Instant::now() >= deadline {
                debug!("subcircuit replacement budget elapsed during mining");
                break;
            }
            mine(circuit, strategy, deadline, &mut candidates)?;
        }
        select_winner(candidates)
    };
    let Some(winner) = winner else {
        debug!("no profitable pattern found in `{entry_name}`");
        return Ok(());
    };

    // choose the non-overlapping occurrences greedily in discovery order
    let mut consumed: BTreeSet<NodeId> = BTreeSet::new();
    let mut committed: Vec<&Occurrence> = Vec::new();
    for occurrence in &winner.occurrences {
        if Instant::now() >= deadline && !committed.is_empty() {
            debug!("subcircuit replacement budget elapsed after {} occurrences", committed.len());
            break;
        }
        if occurrence.members().any(|id| consumed.contains(&id)) {
            continue;
        }
        consumed.extend(occurrence.members());
        committed.push(occurrence);
    }
    if committed.len() < 2 {
        debug!("pattern in `{entry_name}` has no two disjoint occurrences");
        return Ok(());
    }

    let subcircuit_name = {
        let circuit = module.circuit(&entry_name).expect("entry circuit exists");
        let name = pattern_name(module, &winner.key);
        let minted = mint_subcircuit(circuit, committed[0], &name)?;
        module.add_circuit(minted)?;
        name
    };

    let circuit = module.circuit_mut(&entry_name).expect("entry circuit exists");
    let mut interior: BTreeSet<NodeId> = BTreeSet::new();
    for occurrence in &committed {
        circuit
            .node_mut(occurrence.root)?
            .convert_to_call(subcircuit_name.clone(), occurrence.leaves.clone());
        interior.extend(occurrence.interior.iter().copied());
    }
    let live: BTreeSet<NodeId> = circuit.ids().filter(|id| !interior.contains(id)).collect();
    circuit.retain(&live);

    debug!(
        "replaced {} occurrences of a {}-node pattern in `{entry_name}` with calls to `{subcircuit_name}`",
        committed.len(),
        winner.num_pattern_nodes
    );
    Ok(())
}

#[derive(Debug, Clone, Copy)]
enum Strategy {
    /// Expand from roots whose value escapes the pattern (their consumer is
    /// not a fusable gate), following single-consumer edges all the way
    /// down.
    TopDown { depth: usize },
    /// Enumerate a fixed-depth tree at every gate.
    BottomUp { depth: usize },
}

fn strategies(try_modes: usize) -> impl Iterator<Item = Strategy> {
    [
        Strategy::TopDown { depth: TOP_DOWN_DEPTH },
        Strategy::BottomUp { depth: 2 },
        Strategy::BottomUp { depth: 3 },
    ]
    .into_iter()
    .take(try_modes.clamp(1, 3))
}

/// One match of a pattern: the root stays in place and becomes the call
/// site, the interior nodes are deleted, and the leaf edges become the call
/// arguments in canonical order.
#[derive(Debug, Clone)]
struct Occurrence {
    root: NodeId,
    interior: Vec<NodeId>,
    leaves: Vec<(NodeId, Option<u32>)>,
}

impl Occurrence {
    fn members(&self) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::once(self.root).chain(self.interior.iter().copied())
    }
}

#[derive(Debug)]
struct Candidate {
    key: String,
    num_pattern_nodes: usize,
    occurrences: Vec<Occurrence>,
}

impl Candidate {
    /// Approximates the gates removed if all occurrences are replaced by a
    /// single call.
    fn score(&self) -> f64 {
        (self.occurrences.len() - 1) as f64 * (self.num_pattern_nodes as f64 - EPSILON)
    }
}

/// A gate that may appear inside a pattern: a real computation with a
/// single scalar output.
fn is_pattern_gate(node: &Node) -> bool {
    !node.operation().is_opaque_to_folding()
        && node.operation() != PrimitiveOperation::Constant
        && node.output_types().len() == 1
        && node.output_types()[0].is_scalar()
}

fn mine(
    circuit: &Circuit,
    strategy: Strategy,
    deadline: Instant,
    candidates: &mut BTreeMap<String, Candidate>,
) -> Result<(), IrError> {
    let consumers = circuit.consumer_edge_counts();
    let successors = circuit.node_successors();
    let outputs: BTreeSet<NodeId> = circuit.output_ids().iter().copied().collect();

    let depth = match strategy {
        Strategy::TopDown { depth } | Strategy::BottomUp { depth } => depth,
    };

    for node in circuit.iter() {
        if Instant::now() >= deadline {
            return Ok(());
        }
        if !is_pattern_gate(node) {
            continue;
        }
        if let Strategy::TopDown { .. } = strategy {
            // a root is maximal when its value escapes: either it has more
            // than one consuming edge or its sole consumer is not a gate
            let escapes = match consumers.get(&node.id()).copied().unwrap_or(0) {
                1 => {
                    let consumer = successors[&node.id()].first().copied().expect("one consumer");
                    !is_pattern_gate(circuit.node(consumer)?)
                }
                _ => true,
            };
            if !escapes {
                continue;
            }
        }

        let mut key = String::new();
        let mut interior = Vec::new();
        let mut leaves = Vec::new();
        extract(circuit, &consumers, &outputs, node.id(), 0, depth, &mut key, &mut interior, &mut leaves)?;
        let occurrence = Occurrence { root: node.id(), interior, leaves };
        let num_pattern_nodes = 1 + occurrence.interior.len();
        trace!("candidate `{key}` rooted at {}", node.id());
        candidates
            .entry(key.clone())
            .or_insert_with(|| Candidate { key, num_pattern_nodes, occurrences: Vec::new() })
            .occurrences
            .push(occurrence);
    }
    Ok(())
}

/// Builds the canonical key of the tree hanging below `id` while recording
/// the interior nodes and leaf edges in traversal order. Two subgraphs get
/// the same key iff they compute the same expression up to renaming of the
/// leaf positions.
#[allow(clippy::too_many_arguments)]
fn extract(
    circuit: &Circuit,
    consumers: &BTreeMap<NodeId, usize>,
    outputs: &BTreeSet<NodeId>,
    id: NodeId,
    depth: usize,
    depth_limit: usize,
    key: &mut String,
    interior: &mut Vec<NodeId>,
    leaves: &mut Vec<(NodeId, Option<u32>)>,
) -> Result<(), IrError> {
    let node = circuit.node(id)?;
    key.push_str(&node.operation().to_string());
    if let Some(ty) = node.element_type() {
        // distinguish same-shaped trees over different element types
        key.push(':');
        key.push_str(&ty.to_string());
    }
    key.push('(');
    for (index, (producer, offset)) in node.input_edges().enumerate() {
        if index > 0 {
            key.push(',');
        }
        let child = circuit.node(producer)?;
        let absorbable = offset.is_none()
            && depth < depth_limit
            && is_pattern_gate(child)
            && consumers.get(&producer).copied().unwrap_or(0) == 1
            && !outputs.contains(&producer);
        if absorbable {
            interior.push(producer);
            extract(
                circuit, consumers, outputs, producer, depth + 1, depth_limit, key, interior,
                leaves,
            )?;
        } else {
            key.push('_');
            leaves.push((producer, offset));
        }
    }
    key.push(')');
    Ok(())
}

fn select_winner(candidates: BTreeMap<String, Candidate>) -> Option<Candidate> {
    candidates
        .into_values()
        .filter(|c| c.num_pattern_nodes >= MIN_PATTERN_NODES && c.occurrences.len() >= 2)
        .filter(|c| c.score() > 0.0)
        .max_by(|a, b| {
            a.score()
                .partial_cmp(&b.score())
                .expect("scores are finite")
                // ties break toward the smaller, cheaper-to-verify pattern
                .then(b.num_pattern_nodes.cmp(&a.num_pattern_nodes))
        })
}

/// A collision-stable name for the minted subcircuit, derived from the
/// pattern key and deduplicated against the module.
fn pattern_name(module: &Module, key: &str) -> String {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    let mut name = format!("pattern_{:016x}", hasher.finish());
    while module.contains(&name) {
        name.push('_');
    }
    name
}

/// Copies one occurrence into a standalone circuit: every leaf edge becomes
/// an input (in canonical order), the root becomes the single output.
fn mint_subcircuit(
    circuit: &Circuit,
    occurrence: &Occurrence,
    name: &str,
) -> Result<Circuit, IrError> {
    let members: BTreeSet<NodeId> = occurrence.members().collect();
    let mut builder = CircuitBuilder::new(name);
    let root = clone_pattern_node(circuit, &members, occurrence.root, &mut builder)?;
    builder.add_output(&[root])?;
    builder.finish()
}

/// Recursively copies a pattern node, materializing leaf edges as fresh
/// inputs. Traversal order matches [`extract`], so the minted circuit's
/// input order agrees with the call sites' argument order.
fn clone_pattern_node(
    circuit: &Circuit,
    members: &BTreeSet<NodeId>,
    id: NodeId,
    builder: &mut CircuitBuilder,
) -> Result<NodeId, IrError> {
    let node = circuit.node(id)?;
    let mut edges: Vec<(NodeId, Option<u32>)> = Vec::with_capacity(node.num_inputs());
    for (producer, offset) in node.input_edges() {
        if offset.is_none() && members.contains(&producer) {
            let cloned = clone_pattern_node(circuit, members, producer, builder)?;
            edges.push((cloned, None));
        } else {
            let ty = circuit.node(producer)?.element_type().ok_or_else(|| {
                IrError::InvariantViolation(format!("node {producer} declares no output type"))
            })?;
            let input = builder.add_input(DataType::scalar(ty));
            edges.push((input, None));
        }
    }
    builder.add_typed_node(node.operation(), &edges, node.output_types().to_vec())
}

/// [`Pass`] adapter over [`replace_frequent_subcircuits`].
pub struct ReplaceFrequentSubcircuits {
    pub try_modes: usize,
    pub time_budget: Duration,
}

impl Pass for ReplaceFrequentSubcircuits {
    type Input<'a> = Module;
    type Output<'a> = Module;
    type Error = IrError;

    fn run<'a>(&mut self, mut module: Self::Input<'a>) -> Result<Self::Output<'a>, IrError> {
        replace_frequent_subcircuits(&mut module, self.try_modes, self.time_budget)?;
        Ok(module)
    }
}
