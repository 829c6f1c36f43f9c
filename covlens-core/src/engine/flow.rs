//! Probe placement and coverage propagation for one method body.
//!
//! Two passes over the decoded instructions. The first marks every label
//! (an offset that is a jump target, exception boundary, or line start) as a
//! successor, a target, a multi-target, or the start of a line that invokes a
//! method. The second assigns probe ids exactly where the recording agent
//! inserts them and, in the same walk, builds the instruction graph that
//! executed probes are propagated through.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use super::classfile::Code;
use super::insn::{Flow, Insn};
use crate::exec::ExecutionData;
use crate::types::Counter;

#[derive(Debug, Default, Clone, Copy)]
struct LabelInfo {
    target: bool,
    successor: bool,
    multi_target: bool,
    method_invocation_line: bool,
    probe: Option<u32>,
}

impl LabelInfo {
    fn set_target(&mut self) {
        if self.target || self.successor {
            self.multi_target = true;
        } else {
            self.target = true;
        }
    }

    fn set_successor(&mut self) {
        self.successor = true;
        if self.target {
            self.multi_target = true;
        }
    }

    fn needs_probe(&self) -> bool {
        self.successor && (self.multi_target || self.method_invocation_line)
    }
}

/// Coverage of one method body.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MethodCoverage {
    pub instructions: Counter,
    pub branches: Counter,
    /// Source line → whether any instruction on it was covered.
    pub lines: BTreeMap<u16, bool>,
}

impl MethodCoverage {
    pub fn is_covered(&self) -> bool {
        self.instructions.covered > 0
    }
}

/// Analyse one method. `next_probe` is the class-wide probe counter and is
/// advanced past every probe this method owns.
pub fn analyze_method(
    code: &Code,
    insns: &[Insn],
    next_probe: &mut u32,
    data: Option<&ExecutionData>,
) -> MethodCoverage {
    let mut labels = mark_labels(code, insns);
    let lines = line_starts(code);
    let mut builder = Builder::new(data);
    let mut pending: Vec<u32> = Vec::new();
    let mut label_insn: HashMap<u32, usize> = HashMap::new();
    let mut jumps: Vec<(usize, u32, u32)> = Vec::new();
    let mut current_line = None;
    let mut next_id = || {
        let id = *next_probe;
        *next_probe += 1;
        id
    };

    for insn in insns {
        if let Some(info) = labels.get(&insn.offset).copied() {
            if info.needs_probe() {
                let id = next_id();
                if let Some(current) = builder.current {
                    builder.add_probe(current, id, 0);
                }
                builder.current = None;
            }
            pending.push(insn.offset);
            if !info.successor {
                builder.current = None;
            }
        }
        if let Some(&line) = lines.get(&insn.offset) {
            current_line = Some(line);
        }

        let idx = builder.add_instruction(current_line);
        for label in pending.drain(..) {
            label_insn.insert(label, idx);
        }

        match &insn.flow {
            Flow::Next | Flow::Invoke => {}
            Flow::Exit => builder.add_probe(idx, next_id(), 0),
            Flow::Branch(target) | Flow::Goto(target) => {
                if labels.get(target).is_some_and(|l| l.multi_target) {
                    builder.add_probe(idx, next_id(), 1);
                } else {
                    jumps.push((idx, *target, 1));
                }
            }
            Flow::Switch { default, targets } => {
                let all: Vec<u32> = std::iter::once(*default)
                    .chain(targets.iter().copied())
                    .collect();
                let with_probes = assign_switch_probes(&mut labels, &all, &mut next_id);
                let mut done = HashSet::new();
                let mut branch = 0u32;
                for label in all {
                    if with_probes {
                        if done.insert(label) {
                            match labels.get(&label).and_then(|l| l.probe) {
                                Some(id) => builder.add_probe(idx, id, branch),
                                None => jumps.push((idx, label, branch)),
                            }
                        }
                        branch += 1;
                    } else if done.insert(label) {
                        jumps.push((idx, label, branch));
                        branch += 1;
                    }
                }
            }
        }
    }

    for (source, target, branch) in jumps {
        if let Some(&target) = label_insn.get(&target) {
            builder.add_branch_to(source, target, branch);
        }
    }
    builder.finish()
}

/// Label positions and their control-flow roles.
fn mark_labels(code: &Code, insns: &[Insn]) -> HashMap<u32, LabelInfo> {
    let mut labels: HashMap<u32, LabelInfo> = HashMap::new();
    for line in &code.line_numbers {
        labels.entry(line.start_pc).or_default();
    }
    for entry in &code.exception_table {
        labels.entry(entry.end).or_default();
        labels.entry(entry.start).or_default().set_target();
        labels.entry(entry.handler).or_default().set_target();
    }

    let line_pcs: HashSet<u32> = code.line_numbers.iter().map(|l| l.start_pc).collect();
    let mut successor = false;
    let mut first = true;
    let mut line_start = None;

    for insn in insns {
        if let Some(info) = labels.get_mut(&insn.offset) {
            if first {
                info.set_target();
            }
            if successor {
                info.set_successor();
            }
        }
        if line_pcs.contains(&insn.offset) {
            line_start = Some(insn.offset);
        }
        match &insn.flow {
            Flow::Next => successor = true,
            Flow::Invoke => {
                successor = true;
                if let Some(start) = line_start {
                    labels.entry(start).or_default().method_invocation_line = true;
                }
            }
            Flow::Exit => successor = false,
            Flow::Branch(target) => {
                labels.entry(*target).or_default().set_target();
                successor = true;
            }
            Flow::Goto(target) => {
                labels.entry(*target).or_default().set_target();
                successor = false;
            }
            Flow::Switch { default, targets } => {
                let mut done = HashSet::new();
                for label in std::iter::once(*default).chain(targets.iter().copied()) {
                    if done.insert(label) {
                        labels.entry(label).or_default().set_target();
                    }
                }
                successor = false;
            }
        }
        first = false;
    }
    labels
}

/// Give every distinct multi-target switch label a probe. Returns whether any was assigned.
fn assign_switch_probes(
    labels: &mut HashMap<u32, LabelInfo>,
    all: &[u32],
    next_id: &mut impl FnMut() -> u32,
) -> bool {
    let mut any = false;
    let mut done = HashSet::new();
    for &label in all {
        if done.insert(label) {
            let info = labels.entry(label).or_default();
            if info.multi_target {
                info.probe = Some(next_id());
                any = true;
            }
        }
    }
    any
}

/// Line in effect from each offset; the last table entry for an offset wins.
fn line_starts(code: &Code) -> HashMap<u32, u16> {
    code.line_numbers
        .iter()
        .map(|l| (l.start_pc, l.line))
        .collect()
}

#[derive(Debug)]
struct Node {
    line: Option<u16>,
    branches: u32,
    covered: BTreeSet<u32>,
    predecessor: Option<(usize, u32)>,
}

struct Builder<'a> {
    nodes: Vec<Node>,
    current: Option<usize>,
    data: Option<&'a ExecutionData>,
}

impl<'a> Builder<'a> {
    fn new(data: Option<&'a ExecutionData>) -> Self {
        Self {
            nodes: Vec::new(),
            current: None,
            data,
        }
    }

    fn add_instruction(&mut self, line: Option<u16>) -> usize {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            line,
            branches: 0,
            covered: BTreeSet::new(),
            predecessor: None,
        });
        if let Some(previous) = self.current {
            self.add_branch_to(previous, idx, 0);
        }
        self.current = Some(idx);
        idx
    }

    fn add_branch_to(&mut self, source: usize, target: usize, branch: u32) {
        self.nodes[source].branches += 1;
        self.nodes[target].predecessor = Some((source, branch));
        if !self.nodes[target].covered.is_empty() {
            self.propagate(source, branch);
        }
    }

    fn add_probe(&mut self, source: usize, id: u32, branch: u32) {
        self.nodes[source].branches += 1;
        let executed = self.data.is_some_and(|d| d.probe(id as usize));
        if executed {
            self.propagate(source, branch);
        }
    }

    /// Mark `branch` of `idx` covered, then walk predecessors until an
    /// already-covered instruction is reached.
    fn propagate(&mut self, mut idx: usize, mut branch: u32) {
        loop {
            let node = &mut self.nodes[idx];
            let was_covered = !node.covered.is_empty();
            node.covered.insert(branch);
            if was_covered {
                return;
            }
            match node.predecessor {
                Some((previous, previous_branch)) => {
                    idx = previous;
                    branch = previous_branch;
                }
                None => return,
            }
        }
    }

    fn finish(self) -> MethodCoverage {
        let mut coverage = MethodCoverage::default();
        for node in &self.nodes {
            let covered = !node.covered.is_empty();
            coverage.instructions.increment(covered);
            if node.branches >= 2 {
                let hit = node.covered.len() as u64;
                coverage
                    .branches
                    .add(Counter::new(hit, u64::from(node.branches).saturating_sub(hit)));
            }
            if let Some(line) = node.line {
                *coverage.lines.entry(line).or_insert(false) |= covered;
            }
        }
        coverage
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::classfile::{ExceptionEntry, LineNumber};
    use crate::engine::insn::decode;

    fn code(bytes: &[u8], lines: &[(u32, u16)]) -> Code {
        Code {
            bytes: bytes.to_vec(),
            exception_table: Vec::new(),
            line_numbers: lines
                .iter()
                .map(|&(start_pc, line)| LineNumber { start_pc, line })
                .collect(),
        }
    }

    fn run(code: &Code, probes: &[bool]) -> (MethodCoverage, u32) {
        let insns = decode(&code.bytes).unwrap();
        let data = ExecutionData::new(1, "t/T", probes.to_vec());
        let mut next = 0;
        let coverage = analyze_method(code, &insns, &mut next, Some(&data));
        (coverage, next)
    }

    /// `int check(int x) { if (x > 0) return 1; return 0; }`
    fn check_method() -> Code {
        code(
            &[0x1b, 0x9e, 0x00, 0x05, 0x04, 0xac, 0x03, 0xac],
            &[(0, 20), (4, 21), (6, 23)],
        )
    }

    #[test]
    fn straight_line_method_has_one_probe() {
        let c = code(&[0xb1], &[(0, 5)]);
        let (cov, probes) = run(&c, &[true]);
        assert_eq!(probes, 1);
        assert_eq!(cov.instructions, Counter::new(1, 0));
        assert_eq!(cov.branches, Counter::new(0, 0));
        assert_eq!(cov.lines.get(&5), Some(&true));
    }

    #[test]
    fn conditional_with_one_side_executed() {
        let (cov, probes) = run(&check_method(), &[true, false]);
        assert_eq!(probes, 2);
        assert_eq!(cov.instructions, Counter::new(4, 2));
        assert_eq!(cov.branches, Counter::new(1, 1));
        let covered_lines: Vec<u16> = cov.lines.iter().filter(|(_, c)| **c).map(|(l, _)| *l).collect();
        assert_eq!(covered_lines, vec![20, 21]);
        assert_eq!(cov.lines.len(), 3);
    }

    #[test]
    fn conditional_with_both_sides_executed() {
        let (cov, _) = run(&check_method(), &[true, true]);
        assert_eq!(cov.instructions, Counter::new(6, 0));
        assert_eq!(cov.branches, Counter::new(2, 0));
    }

    #[test]
    fn no_execution_data_means_nothing_covered() {
        let c = check_method();
        let insns = decode(&c.bytes).unwrap();
        let mut next = 0;
        let cov = analyze_method(&c, &insns, &mut next, None);
        assert_eq!(cov.instructions, Counter::new(0, 6));
        assert_eq!(cov.branches, Counter::new(0, 2));
        assert!(!cov.is_covered());
    }

    #[test]
    fn loop_places_probes_on_back_edge() {
        // for (int i = 0; i < 3; i++) {}
        let c = code(
            &[
                0x03, 0x3c, 0x1b, 0x06, 0xa2, 0x00, 0x09, 0x84, 0x01, 0x01, 0xa7, 0xff, 0xf8, 0xb1,
            ],
            &[(0, 30), (2, 31), (7, 32), (13, 34)],
        );
        let (cov, probes) = run(&c, &[true, true, true]);
        assert_eq!(probes, 3);
        assert_eq!(cov.instructions, Counter::new(8, 0));
        assert_eq!(cov.branches, Counter::new(2, 0));

        // Loop entered but never completed: the exit is not covered.
        let (cov, _) = run(&c, &[true, false, false]);
        assert_eq!(cov.instructions, Counter::new(2, 6));
    }

    #[test]
    fn invocation_line_gets_its_own_probe() {
        // 0 iconst_0; 1 istore_1; 2 aload_0; 3 invokevirtual #1; 6 return
        let c = code(&[0x03, 0x3c, 0x2a, 0xb6, 0x00, 0x01, 0xb1], &[(0, 1), (2, 2)]);
        let (cov, probes) = run(&c, &[true, false]);
        assert_eq!(probes, 2);
        assert_eq!(cov.instructions, Counter::new(2, 3));
        assert_eq!(cov.lines.get(&1), Some(&true));
        assert_eq!(cov.lines.get(&2), Some(&false));
    }

    #[test]
    fn switch_without_probes_counts_each_target() {
        let mut bytes = vec![0x1b, 0xaa, 0x00, 0x00];
        for v in [27i32, 0, 1, 23, 25] {
            bytes.extend_from_slice(&v.to_be_bytes());
        }
        bytes.extend_from_slice(&[0x00, 0xb1, 0x00, 0xb1, 0xb1]);
        let c = code(&bytes, &[]);
        let (cov, probes) = run(&c, &[false, true, false]);
        assert_eq!(probes, 3);
        assert_eq!(cov.instructions, Counter::new(4, 3));
        assert_eq!(cov.branches, Counter::new(1, 2));
        assert!(cov.lines.is_empty());
    }

    #[test]
    fn exception_handler_is_reachable_only_through_its_probe() {
        // try { m(); } catch (e) { return; } return;
        // 0 aload_0; 1 invokevirtual; 4 goto +4 -> 8; 7 athrow(handler stand-in); 8 return
        let mut c = code(&[0x2a, 0xb6, 0x00, 0x01, 0xa7, 0x00, 0x04, 0xbf, 0xb1], &[(0, 1)]);
        c.exception_table.push(ExceptionEntry {
            start: 0,
            end: 4,
            handler: 7,
        });
        let (cov, probes) = run(&c, &[false, true]);
        // athrow and return probes only; the goto target is a single-entry label.
        assert_eq!(probes, 2);
        assert_eq!(cov.instructions, Counter::new(4, 1));
    }

    #[test]
    fn out_of_range_probes_are_not_executed() {
        let (cov, _) = run(&check_method(), &[]);
        assert_eq!(cov.instructions.covered, 0);
    }
}
