//! Per-function backward liveness analysis and interference graph
//! construction, feeding the iterated register coalescing allocator in
//! `regalloc.rs`.
//!
//! Only `Storage::Local` values are nodes in the graph — literals are
//! immediates, and `Named`/`StringLiteral` values address static
//! storage directly and never occupy a register.

use crate::il::{Command, ILFunction, ILValue, Storage, ValueId};
use std::collections::{HashMap, HashSet};

fn local_id(v: &ILValue) -> Option<ValueId> {
    match v.storage {
        Storage::Local(id) => Some(id),
        _ => None,
    }
}

fn def_id(cmd: &Command) -> Option<ValueId> {
    cmd.def().and_then(local_id)
}

fn use_ids(cmd: &Command) -> HashSet<ValueId> {
    cmd.uses().into_iter().filter_map(local_id).collect()
}

/// Per-instruction live-in/live-out sets, indexed the same way as
/// `ILFunction::commands`.
pub struct Liveness {
    pub live_in: Vec<HashSet<ValueId>>,
    pub live_out: Vec<HashSet<ValueId>>,
}

fn successors(func: &ILFunction, labels: &HashMap<&str, usize>) -> Vec<Vec<usize>> {
    let n = func.commands.len();
    let mut succ = vec![Vec::new(); n];
    for (i, cmd) in func.commands.iter().enumerate() {
        let fallthrough = i + 1 < n;
        match cmd {
            Command::Jump(target) => {
                if let Some(&t) = labels.get(target.as_str()) {
                    succ[i].push(t);
                }
            }
            Command::JumpZero { target, .. } | Command::JumpNotZero { target, .. } => {
                if fallthrough {
                    succ[i].push(i + 1);
                }
                if let Some(&t) = labels.get(target.as_str()) {
                    succ[i].push(t);
                }
            }
            Command::Return(_) => {}
            _ => {
                if fallthrough {
                    succ[i].push(i + 1);
                }
            }
        }
    }
    succ
}

/// Iterate the standard backward dataflow equations to a fixpoint:
/// `live_out[i] = union of live_in[s] for successors s`,
/// `live_in[i] = use[i] ∪ (live_out[i] - def[i])`.
pub fn analyze(func: &ILFunction) -> Liveness {
    let n = func.commands.len();
    let mut labels = HashMap::new();
    for (i, cmd) in func.commands.iter().enumerate() {
        if let Command::Label(name) = cmd {
            labels.insert(name.as_str(), i);
        }
    }
    let succ = successors(func, &labels);
    let defs: Vec<Option<ValueId>> = func.commands.iter().map(def_id).collect();
    let uses: Vec<HashSet<ValueId>> = func.commands.iter().map(use_ids).collect();

    let mut live_in = vec![HashSet::new(); n];
    let mut live_out = vec![HashSet::new(); n];

    loop {
        let mut changed = false;
        for i in (0..n).rev() {
            let mut out = HashSet::new();
            for &s in &succ[i] {
                out.extend(live_in[s].iter().copied());
            }
            if out != live_out[i] {
                live_out[i] = out;
                changed = true;
            }
            let mut inn = uses[i].clone();
            for &v in &live_out[i] {
                if Some(v) != defs[i] {
                    inn.insert(v);
                }
            }
            if inn != live_in[i] {
                live_in[i] = inn;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    Liveness { live_in, live_out }
}

/// An undirected interference edge, normalized so `(a, b)` and `(b, a)`
/// compare equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Edge(pub ValueId, pub ValueId);

impl Edge {
    fn new(a: ValueId, b: ValueId) -> Self {
        if a <= b {
            Edge(a, b)
        } else {
            Edge(b, a)
        }
    }
}

#[derive(Debug, Default)]
pub struct InterferenceGraph {
    pub nodes: HashSet<ValueId>,
    pub edges: HashSet<Edge>,
    /// Candidate moves for coalescing: `(dest, src)` pairs from `Set`
    /// commands whose values never simultaneously interfere.
    pub move_edges: HashSet<Edge>,
    /// Per-instruction sets of values live across a register-clobbering
    /// instruction (`DIV`/`MOD`/shifts/calls) — the allocator must not
    /// place these in a register the instruction overwrites.
    pub clobbered_at: Vec<HashSet<ValueId>>,
    pub adjacency: HashMap<ValueId, HashSet<ValueId>>,
}

impl InterferenceGraph {
    fn add_edge(&mut self, a: ValueId, b: ValueId) {
        if a == b {
            return;
        }
        self.edges.insert(Edge::new(a, b));
        self.adjacency.entry(a).or_default().insert(b);
        self.adjacency.entry(b).or_default().insert(a);
    }

    pub fn degree(&self, v: ValueId) -> usize {
        self.adjacency.get(&v).map(|s| s.len()).unwrap_or(0)
    }

    pub fn neighbors(&self, v: ValueId) -> impl Iterator<Item = ValueId> + '_ {
        self.adjacency.get(&v).into_iter().flatten().copied()
    }

    pub fn interferes(&self, a: ValueId, b: ValueId) -> bool {
        a != b && self.edges.contains(&Edge::new(a, b))
    }
}

/// Build the interference graph from a function's liveness results.
pub fn build(func: &ILFunction, liveness: &Liveness) -> InterferenceGraph {
    let mut graph = InterferenceGraph::default();
    for id in 0..func.next_value_id {
        graph.nodes.insert(id);
    }

    for (i, cmd) in func.commands.iter().enumerate() {
        if cmd.clobbers_fixed_registers() {
            graph.clobbered_at.push(liveness.live_out[i].clone());
        } else {
            graph.clobbered_at.push(HashSet::new());
        }

        let Some(d) = def_id(cmd) else { continue };
        if let Command::Set { src, .. } = cmd {
            if let Some(s) = local_id(src) {
                if s != d {
                    graph.move_edges.insert(Edge::new(d, s));
                }
            }
        }
        let move_src = if let Command::Set { src, .. } = cmd {
            local_id(src)
        } else {
            None
        };
        for &live in &liveness.live_out[i] {
            if live == d {
                continue;
            }
            if Some(live) == move_src {
                continue;
            }
            graph.add_edge(d, live);
        }
    }

    graph
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{ArithOp, ILValue};
    use crate::types::Type;
    use std::rc::Rc;

    fn int_local(f: &mut ILFunction) -> ILValue {
        f.fresh_local(Rc::new(Type::int()))
    }

    #[test]
    fn overlapping_locals_interfere() {
        let mut f = ILFunction::new("f");
        let a = int_local(&mut f);
        let b = int_local(&mut f);
        let c = int_local(&mut f);
        f.push(Command::Set {
            dest: a.clone(),
            src: ILValue::literal(1, Rc::new(Type::int())),
        });
        f.push(Command::Set {
            dest: b.clone(),
            src: ILValue::literal(2, Rc::new(Type::int())),
        });
        f.push(Command::Arith {
            op: ArithOp::Add,
            dest: c,
            lhs: a.clone(),
            rhs: b.clone(),
            is_unsigned: false,
        });
        let liveness = analyze(&f);
        let graph = build(&f, &liveness);
        assert!(graph.interferes(0, 1));
    }

    #[test]
    fn move_source_and_dest_do_not_interfere_when_only_live_through_the_move() {
        let mut f = ILFunction::new("f");
        let a = int_local(&mut f);
        let b = int_local(&mut f);
        f.push(Command::Set {
            dest: b.clone(),
            src: a.clone(),
        });
        f.push(Command::Return(Some(b)));
        let liveness = analyze(&f);
        let graph = build(&f, &liveness);
        assert!(!graph.interferes(0, 1));
        assert!(graph.move_edges.contains(&Edge::new(0, 1)));
    }

    #[test]
    fn div_marks_live_values_as_clobbered_at_that_point() {
        let mut f = ILFunction::new("f");
        let a = int_local(&mut f);
        let b = int_local(&mut f);
        let d = int_local(&mut f);
        f.push(Command::Arith {
            op: ArithOp::Div,
            dest: d.clone(),
            lhs: a.clone(),
            rhs: b,
            is_unsigned: false,
        });
        f.push(Command::Return(Some(a)));
        let liveness = analyze(&f);
        let graph = build(&f, &liveness);
        assert!(graph.clobbered_at[0].contains(&0));
    }
}
