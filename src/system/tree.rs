use std::collections::HashMap;

use serde::Serialize;

use super::process::ProcessRecord;

/// Parent -> children forest. Owns every record it was built from; records
/// are only ever moved between forests, never shared.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ProcessForest {
    roots: Vec<ProcessRecord>,
}

/// A forest node visited in depth-first order, with what a tree view needs
/// to draw connector lines.
#[derive(Debug)]
pub struct FlatEntry<'a> {
    pub record: &'a ProcessRecord,
    pub depth: usize,
    pub is_last: bool,
    /// For every ancestor level, whether that ancestor was the last sibling.
    pub ancestors_last: Vec<bool>,
}

/// Attach every record under the record whose pid equals its parent pid.
/// Records whose parent is absent stay at the top level. Children already
/// attached to an input record are kept.
pub fn build_forest(flat: Vec<ProcessRecord>) -> ProcessForest {
    #[cfg(feature = "perf-tracing")]
    let _span = tracing::debug_span!("tree.build_forest").entered();

    let len = flat.len();
    let mut by_pid: HashMap<u32, usize> = HashMap::with_capacity(len);
    for (slot, record) in flat.iter().enumerate() {
        by_pid.entry(record.pid).or_insert(slot);
    }

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); len];
    let mut has_parent = vec![false; len];
    for (slot, record) in flat.iter().enumerate() {
        if let Some(&parent) = by_pid.get(&record.ppid)
            && parent != slot
        {
            children[parent].push(slot);
            has_parent[slot] = true;
        }
    }

    let mut slots: Vec<Option<ProcessRecord>> = flat.into_iter().map(Some).collect();
    let mut roots = Vec::new();
    for slot in 0..len {
        if !has_parent[slot]
            && let Some(root) = assemble(slot, &mut slots, &children)
        {
            roots.push(root);
        }
    }
    // Anything left over sits on a parent-pid cycle and can never be reached
    // from a root; promote it so the forest still owns it.
    for slot in 0..len {
        if let Some(root) = assemble(slot, &mut slots, &children) {
            roots.push(root);
        }
    }

    ProcessForest { roots }
}

fn assemble(
    slot: usize,
    slots: &mut [Option<ProcessRecord>],
    children: &[Vec<usize>],
) -> Option<ProcessRecord> {
    let mut record = slots[slot].take()?;
    for &child in &children[slot] {
        if let Some(node) = assemble(child, slots, children) {
            record.children.push(node);
        }
    }
    Some(record)
}

/// The record matching `pid` with all of its descendants. Everything else
/// in `forest` is dropped here.
pub fn subtree(forest: ProcessForest, pid: u32) -> ProcessForest {
    let (selected, _rest) = split_subtree(forest, pid);
    selected
}

/// Detach the subtree rooted at `pid`. Returns `(selected, remainder)`; the
/// remainder keeps its original shape minus the detached branch, so callers
/// that still need those records keep ownership of them.
pub fn split_subtree(mut forest: ProcessForest, pid: u32) -> (ProcessForest, ProcessForest) {
    let selected = detach(&mut forest.roots, pid)
        .map(|root| vec![root])
        .unwrap_or_default();
    (ProcessForest { roots: selected }, forest)
}

fn detach(records: &mut Vec<ProcessRecord>, pid: u32) -> Option<ProcessRecord> {
    if let Some(pos) = records.iter().position(|r| r.pid == pid) {
        return Some(records.remove(pos));
    }
    records
        .iter_mut()
        .find_map(|record| detach(&mut record.children, pid))
}

impl ProcessForest {
    pub fn from_roots(roots: Vec<ProcessRecord>) -> Self {
        ProcessForest { roots }
    }

    pub fn roots(&self) -> &[ProcessRecord] {
        &self.roots
    }

    pub fn roots_mut(&mut self) -> &mut Vec<ProcessRecord> {
        &mut self.roots
    }

    pub fn into_roots(self) -> Vec<ProcessRecord> {
        self.roots
    }

    /// Total number of records in the forest.
    pub fn len(&self) -> usize {
        self.roots.iter().map(ProcessRecord::subtree_len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn find(&self, pid: u32) -> Option<&ProcessRecord> {
        fn walk(records: &[ProcessRecord], pid: u32) -> Option<&ProcessRecord> {
            records.iter().find_map(|r| {
                if r.pid == pid {
                    Some(r)
                } else {
                    walk(&r.children, pid)
                }
            })
        }
        walk(&self.roots, pid)
    }

    /// Depth-first view for tree rendering.
    pub fn flatten(&self) -> Vec<FlatEntry<'_>> {
        let mut out = Vec::with_capacity(self.len());
        let count = self.roots.len();
        for (i, root) in self.roots.iter().enumerate() {
            flatten_into(root, 0, i + 1 == count, Vec::new(), &mut out);
        }
        out
    }

    /// Take the forest apart again, depth first, detaching every child list.
    pub fn into_flat(self) -> Vec<ProcessRecord> {
        let mut out = Vec::new();
        let mut stack: Vec<ProcessRecord> = self.roots.into_iter().rev().collect();
        while let Some(mut record) = stack.pop() {
            let children = std::mem::take(&mut record.children);
            stack.extend(children.into_iter().rev());
            out.push(record);
        }
        out
    }
}

fn flatten_into<'a>(
    record: &'a ProcessRecord,
    depth: usize,
    is_last: bool,
    ancestors_last: Vec<bool>,
    out: &mut Vec<FlatEntry<'a>>,
) {
    let mut chain = ancestors_last.clone();
    out.push(FlatEntry {
        record,
        depth,
        is_last,
        ancestors_last,
    });
    chain.push(is_last);
    let count = record.children.len();
    for (i, child) in record.children.iter().enumerate() {
        flatten_into(child, depth + 1, i + 1 == count, chain.clone(), out);
    }
}
