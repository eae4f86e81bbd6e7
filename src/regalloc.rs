//! Iterated register coalescing (Briggs' conservative criterion), turning
//! the interference graph from `liveness.rs` into a `ValueId -> Spot`
//! assignment: Build is `liveness::build`; this module does Simplify,
//! Coalesce, Freeze, Potential Spill, Select, and Rewrite.
//!
//! Fixed-register clobbers (`DIV`/`MOD` pinning `RAX`/`RDX`, shifts
//! pinning `RCX`, calls clobbering the caller-saved set) are modeled as
//! a per-node forbidden-color set rather than literal precolored graph
//! nodes — equivalent in effect, simpler to drive through Select.

use crate::il::{ArithOp, Command, ILFunction, ValueId};
use crate::liveness::{self, Liveness};
use crate::types::Type;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Reg {
    Rax,
    Rbx,
    Rcx,
    Rdx,
    Rsi,
    Rdi,
    R8,
    R9,
    R10,
    R11,
    R12,
    R13,
    R14,
    R15,
}

/// Registers available to the allocator, ordered so the caller-saved
/// set (cheaper to use, nothing to save/restore in the prologue) is
/// tried first. `r10`/`r11` are deliberately withheld — `emit::x86`
/// reserves them as scratch registers for reloading stack-spilled
/// operands mid-instruction.
pub const ALLOCATABLE: [Reg; 12] = [
    Reg::Rax,
    Reg::Rcx,
    Reg::Rdx,
    Reg::Rsi,
    Reg::Rdi,
    Reg::R8,
    Reg::R9,
    Reg::Rbx,
    Reg::R12,
    Reg::R13,
    Reg::R14,
    Reg::R15,
];

impl Reg {
    pub fn is_callee_saved(self) -> bool {
        matches!(self, Reg::Rbx | Reg::R12 | Reg::R13 | Reg::R14 | Reg::R15)
    }

    pub fn name(self, width: u8) -> &'static str {
        match (self, width) {
            (Reg::Rax, 8) => "rax",
            (Reg::Rax, 4) => "eax",
            (Reg::Rax, 1) => "al",
            (Reg::Rbx, 8) => "rbx",
            (Reg::Rbx, 4) => "ebx",
            (Reg::Rbx, 1) => "bl",
            (Reg::Rcx, 8) => "rcx",
            (Reg::Rcx, 4) => "ecx",
            (Reg::Rcx, 1) => "cl",
            (Reg::Rdx, 8) => "rdx",
            (Reg::Rdx, 4) => "edx",
            (Reg::Rdx, 1) => "dl",
            (Reg::Rsi, 8) => "rsi",
            (Reg::Rsi, 4) => "esi",
            (Reg::Rsi, 1) => "sil",
            (Reg::Rdi, 8) => "rdi",
            (Reg::Rdi, 4) => "edi",
            (Reg::Rdi, 1) => "dil",
            (Reg::R8, 8) => "r8",
            (Reg::R8, 4) => "r8d",
            (Reg::R8, 1) => "r8b",
            (Reg::R9, 8) => "r9",
            (Reg::R9, 4) => "r9d",
            (Reg::R9, 1) => "r9b",
            (Reg::R10, 8) => "r10",
            (Reg::R10, 4) => "r10d",
            (Reg::R10, 1) => "r10b",
            (Reg::R11, 8) => "r11",
            (Reg::R11, 4) => "r11d",
            (Reg::R11, 1) => "r11b",
            (Reg::R12, 8) => "r12",
            (Reg::R12, 4) => "r12d",
            (Reg::R12, 1) => "r12b",
            (Reg::R13, 8) => "r13",
            (Reg::R13, 4) => "r13d",
            (Reg::R13, 1) => "r13b",
            (Reg::R14, 8) => "r14",
            (Reg::R14, 4) => "r14d",
            (Reg::R14, 1) => "r14b",
            (Reg::R15, 8) => "r15",
            (Reg::R15, 4) => "r15d",
            (Reg::R15, 1) => "r15b",
            _ => "eax",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spot {
    Register(Reg),
    /// Byte offset from `rbp`, always negative (locals grow downward).
    Stack(i32),
}

pub struct AllocationResult {
    pub assignment: HashMap<ValueId, Spot>,
    pub frame_size: u32,
    pub used_callee_saved: Vec<Reg>,
}

const CALLER_SAVED_CLOBBER: [Reg; 9] = [
    Reg::Rax,
    Reg::Rcx,
    Reg::Rdx,
    Reg::Rsi,
    Reg::Rdi,
    Reg::R8,
    Reg::R9,
    Reg::R10,
    Reg::R11,
];

/// Registers a specific instruction pins, beyond the ordinary def/use
/// the IL already records (§4.6: DIV/MOD need `RAX`/`RDX`, shifts need
/// the count in `CL`, calls clobber the whole caller-saved set).
fn instruction_clobbers(cmd: &Command) -> Vec<Reg> {
    match cmd {
        Command::Arith {
            op: ArithOp::Div | ArithOp::Mod,
            ..
        } => vec![Reg::Rax, Reg::Rdx],
        Command::Arith {
            op: ArithOp::LShift | ArithOp::RShift,
            ..
        } => vec![Reg::Rcx],
        Command::Call { .. } => CALLER_SAVED_CLOBBER.to_vec(),
        Command::StructMemberCopy { .. } => vec![Reg::Rsi, Reg::Rdi, Reg::Rcx],
        Command::Zero { .. } => vec![Reg::Rax, Reg::Rdi, Reg::Rcx],
        _ => Vec::new(),
    }
}

fn value_types(func: &ILFunction) -> HashMap<ValueId, Rc<Type>> {
    let mut types = HashMap::new();
    for p in &func.params {
        if let crate::il::Storage::Local(id) = p.storage {
            types.insert(id, p.ty.clone());
        }
    }
    for cmd in &func.commands {
        if let Some(d) = cmd.def() {
            if let crate::il::Storage::Local(id) = d.storage {
                types.insert(id, d.ty.clone());
            }
        }
    }
    types
}

struct Coalescer {
    alias: HashMap<ValueId, ValueId>,
}

impl Coalescer {
    fn new(nodes: &HashSet<ValueId>) -> Self {
        Coalescer {
            alias: nodes.iter().map(|&n| (n, n)).collect(),
        }
    }

    fn find(&mut self, x: ValueId) -> ValueId {
        let mut root = x;
        while self.alias[&root] != root {
            root = self.alias[&root];
        }
        let mut cur = x;
        while self.alias[&cur] != root {
            let next = self.alias[&cur];
            self.alias.insert(cur, root);
            cur = next;
        }
        root
    }

    fn union(&mut self, a: ValueId, b: ValueId) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            self.alias.insert(rb, ra);
        }
    }
}

/// `ValueId`s that are the destination of some command. A local that is
/// never a `def()` only ever appears as the `addr` of a `READAT`/`SETAT`
/// or the `src` of an `ADDROF` — it names a stack object directly, not a
/// value living in a register, and so can never be colored.
pub fn defined_ids(func: &ILFunction) -> HashSet<ValueId> {
    func.commands
        .iter()
        .filter_map(|c| c.def())
        .filter_map(|v| match v.storage {
            crate::il::Storage::Local(id) => Some(id),
            _ => None,
        })
        .collect()
}

/// Allocate registers/stack slots for one function's virtual registers.
pub fn allocate(func: &ILFunction) -> AllocationResult {
    let liveness = liveness::analyze(func);
    let graph = liveness::build(func, &liveness);
    let types = value_types(func);
    let k = ALLOCATABLE.len();
    let defined = defined_ids(func);

    let mut forbidden: HashMap<ValueId, HashSet<Reg>> = HashMap::new();
    for (i, cmd) in func.commands.iter().enumerate() {
        let clobbers = instruction_clobbers(cmd);
        if clobbers.is_empty() {
            continue;
        }
        for &live in &liveness.live_out[i] {
            forbidden.entry(live).or_default().extend(clobbers.iter().copied());
        }
    }

    let mut coalescer = Coalescer::new(&graph.nodes);
    let mut colors: HashMap<ValueId, Spot> = HashMap::new();
    let mut frame_size: u32 = 0;

    // Addressable stack objects (locals, param slots) are pinned to
    // memory up front and never enter the coloring process at all.
    let mut pinned: Vec<ValueId> = graph.nodes.iter().copied().filter(|n| !defined.contains(n)).collect();
    pinned.sort_unstable();
    for n in pinned {
        let ty = types.get(&n).cloned().unwrap_or_else(|| Rc::new(Type::long()));
        let size = if ty.is_complete() { ty.size() as u32 } else { 8 };
        let align = if ty.is_complete() { ty.align() as u32 } else { 8 };
        frame_size = round_up(frame_size + size, align);
        colors.insert(n, Spot::Stack(-(frame_size as i32)));
    }

    let mut active: HashSet<ValueId> = graph.nodes.iter().copied().filter(|n| defined.contains(n)).collect();
    let mut stack: Vec<ValueId> = Vec::new();
    let mut coalesced_moves: HashSet<liveness::Edge> = HashSet::new();
    let mut frozen_moves: HashSet<liveness::Edge> = HashSet::new();

    let rep_neighbors = |coalescer: &mut Coalescer, active: &HashSet<ValueId>, node: ValueId| -> HashSet<ValueId> {
        let mut out = HashSet::new();
        for orig in &graph.nodes {
            if !active.contains(orig) {
                continue;
            }
            if coalescer.find(*orig) != node {
                continue;
            }
            for n in graph.neighbors(*orig) {
                let rn = coalescer.find(n);
                if active.contains(&n) && rn != node {
                    out.insert(rn);
                }
            }
        }
        out
    };

    while active.len() > 1 {
        // 1. Simplify: remove a non-move-related low-degree node.
        let simplify_candidate = active.iter().copied().find(|&n| {
            let deg = rep_neighbors(&mut coalescer, &active, n).len();
            deg < k && !is_move_related(&graph, &mut coalescer, n, &active, &coalesced_moves, &frozen_moves)
        });
        if let Some(n) = simplify_candidate {
            active.remove(&n);
            stack.push(n);
            continue;
        }

        // 2. Coalesce: try each remaining move edge under Briggs' test.
        let coalesce_candidate = graph.move_edges.iter().find_map(|e| {
            if coalesced_moves.contains(e) || frozen_moves.contains(e) {
                return None;
            }
            let a = coalescer.find(e.0);
            let b = coalescer.find(e.1);
            if a == b || !active.contains(&a) || !active.contains(&b) {
                return None;
            }
            if graph.interferes(a, b) {
                return None;
            }
            let mut combined = rep_neighbors(&mut coalescer, &active, a);
            combined.extend(rep_neighbors(&mut coalescer, &active, b));
            let significant = combined.iter().filter(|&&n| rep_neighbors(&mut coalescer, &active, n).len() >= k).count();
            if significant < k {
                Some((*e, a, b))
            } else {
                None
            }
        });
        if let Some((e, a, b)) = coalesce_candidate {
            coalescer.union(a, b);
            coalesced_moves.insert(e);
            active.remove(&b.max(a));
            active.insert(coalescer.find(a));
            continue;
        }

        // 3. Freeze: give up on a low-degree move-related node's moves
        // so Simplify can make progress on it next round.
        let freeze_candidate = active.iter().copied().find(|&n| rep_neighbors(&mut coalescer, &active, n).len() < k);
        if let Some(n) = freeze_candidate {
            for e in &graph.move_edges {
                if coalescer.find(e.0) == n || coalescer.find(e.1) == n {
                    frozen_moves.insert(*e);
                }
            }
            continue;
        }

        // 4. Potential spill: push the highest-degree node; Select
        // decides whether it actually needs a memory operand.
        let spill = active
            .iter()
            .copied()
            .max_by_key(|&n| rep_neighbors(&mut coalescer, &active, n).len())
            .unwrap();
        active.remove(&spill);
        stack.push(spill);
    }
    if let Some(&last) = active.iter().next() {
        stack.push(last);
    }

    // Select: pop in reverse push order, choosing the lowest-numbered
    // free register; actual spills fall back to a stack slot.
    let mut used_callee_saved: HashSet<Reg> = HashSet::new();

    while let Some(n) = stack.pop() {
        let rep = coalescer.find(n);
        let mut taken: HashSet<Reg> = forbidden.get(&n).cloned().unwrap_or_default();
        for orig in &graph.nodes {
            if coalescer.find(*orig) != rep || *orig == n {
                continue;
            }
            taken.extend(forbidden.get(orig).cloned().unwrap_or_default());
        }
        for neighbor in graph.neighbors(n) {
            if let Some(&Spot::Register(r)) = colors.get(&coalescer.find(neighbor)) {
                taken.insert(r);
            }
        }
        let chosen = ALLOCATABLE.iter().copied().find(|r| !taken.contains(r));
        let spot = match chosen {
            Some(r) => {
                if r.is_callee_saved() {
                    used_callee_saved.insert(r);
                }
                Spot::Register(r)
            }
            None => {
                let ty = types.get(&n).cloned().unwrap_or_else(|| Rc::new(Type::long()));
                let size = if ty.is_complete() { ty.size() as u32 } else { 8 };
                let align = if ty.is_complete() { ty.align() as u32 } else { 8 };
                frame_size = round_up(frame_size + size, align);
                Spot::Stack(-(frame_size as i32))
            }
        };
        colors.insert(n, spot);
        colors.entry(rep).or_insert(spot);
    }

    // Every original node resolves through its representative's color.
    let mut assignment = HashMap::new();
    for &n in &graph.nodes {
        let rep = coalescer.find(n);
        if let Some(&spot) = colors.get(&rep).or_else(|| colors.get(&n)) {
            assignment.insert(n, spot);
        }
    }

    let mut used_callee_saved: Vec<Reg> = used_callee_saved.into_iter().collect();
    used_callee_saved.sort_by_key(|r| format!("{:?}", r));

    AllocationResult {
        assignment,
        frame_size: round_up(frame_size, 16),
        used_callee_saved,
    }
}

fn is_move_related(
    graph: &liveness::InterferenceGraph,
    coalescer: &mut Coalescer,
    node: ValueId,
    active: &HashSet<ValueId>,
    coalesced: &HashSet<liveness::Edge>,
    frozen: &HashSet<liveness::Edge>,
) -> bool {
    graph.move_edges.iter().any(|e| {
        if coalesced.contains(e) || frozen.contains(e) {
            return false;
        }
        let a = coalescer.find(e.0);
        let b = coalescer.find(e.1);
        (a == node || b == node) && active.contains(&a) && active.contains(&b)
    })
}

fn round_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::il::{ArithOp, ILValue};
    use crate::types::Type;
    use std::rc::Rc;

    #[test]
    fn disjoint_locals_can_share_a_register() {
        let mut f = ILFunction::new("f");
        let a = f.fresh_local(Rc::new(Type::int()));
        f.push(Command::Set {
            dest: a.clone(),
            src: ILValue::literal(1, Rc::new(Type::int())),
        });
        f.push(Command::Return(Some(a)));
        let result = allocate(&f);
        assert!(matches!(result.assignment.get(&0), Some(Spot::Register(_))));
    }

    #[test]
    fn interfering_locals_get_distinct_spots() {
        let mut f = ILFunction::new("f");
        let a = f.fresh_local(Rc::new(Type::int()));
        let b = f.fresh_local(Rc::new(Type::int()));
        let c = f.fresh_local(Rc::new(Type::int()));
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
            dest: c.clone(),
            lhs: a,
            rhs: b,
            is_unsigned: false,
        });
        f.push(Command::Return(Some(c)));
        let result = allocate(&f);
        assert_ne!(result.assignment[&0], result.assignment[&1]);
    }

    #[test]
    fn a_value_live_across_a_div_avoids_rax_and_rdx() {
        let mut f = ILFunction::new("f");
        let a = f.fresh_local(Rc::new(Type::int()));
        let b = f.fresh_local(Rc::new(Type::int()));
        let q = f.fresh_local(Rc::new(Type::int()));
        let sum = f.fresh_local(Rc::new(Type::int()));
        f.push(Command::Set {
            dest: a.clone(),
            src: ILValue::literal(10, Rc::new(Type::int())),
        });
        f.push(Command::Set {
            dest: b.clone(),
            src: ILValue::literal(3, Rc::new(Type::int())),
        });
        f.push(Command::Arith {
            op: ArithOp::Div,
            dest: q.clone(),
            lhs: a.clone(),
            rhs: b,
            is_unsigned: false,
        });
        f.push(Command::Arith {
            op: ArithOp::Add,
            dest: sum.clone(),
            lhs: a,
            rhs: q,
            is_unsigned: false,
        });
        f.push(Command::Return(Some(sum)));
        let result = allocate(&f);
        if let Some(Spot::Register(r)) = result.assignment.get(&0) {
            assert!(!matches!(r, Reg::Rax | Reg::Rdx));
        }
    }
}
