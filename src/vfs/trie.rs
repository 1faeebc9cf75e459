// src/vfs/trie.rs

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::Path;

use crate::vfs::snapshot::Snapshot;

#[derive(Debug, Default)]
struct Node {
    snapshot: Option<Snapshot>,
    children: BTreeMap<OsString, Node>,
}

impl Node {
    fn is_empty(&self) -> bool {
        self.snapshot.is_none() && self.children.is_empty()
    }

    fn count(&self) -> usize {
        usize::from(self.snapshot.is_some())
            + self.children.values().map(Node::count).sum::<usize>()
    }
}

/// Path-component trie of snapshots.
///
/// Removing a subtree detaches one node, so the cost is proportional to the
/// entries below it rather than to the whole map.
#[derive(Debug, Default)]
pub struct SnapshotTrie {
    root: Node,
    len: usize,
}

fn key_of(path: &Path) -> Vec<OsString> {
    path.components()
        .map(|c| c.as_os_str().to_os_string())
        .collect()
}

impl SnapshotTrie {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.root = Node::default();
        self.len = 0;
    }

    pub fn get(&self, path: &Path) -> Option<&Snapshot> {
        let mut node = &self.root;
        for part in key_of(path) {
            node = node.children.get(&part)?;
        }
        node.snapshot.as_ref()
    }

    pub fn insert(&mut self, path: &Path, snapshot: Snapshot) -> Option<Snapshot> {
        let mut node = &mut self.root;
        for part in key_of(path) {
            node = node.children.entry(part).or_default();
        }
        let previous = node.snapshot.replace(snapshot);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Remove the entry for exactly `path`, leaving descendants alone.
    pub fn remove(&mut self, path: &Path) -> Option<Snapshot> {
        let key = key_of(path);
        let removed = remove_entry(&mut self.root, &key);
        if removed.is_some() {
            self.len -= 1;
        }
        removed
    }

    /// Remove `path` and every entry below it. Returns how many were removed.
    pub fn remove_subtree(&mut self, path: &Path) -> usize {
        let key = key_of(path);
        let removed = match key.split_last() {
            None => {
                let n = self.root.count();
                self.root = Node::default();
                n
            }
            Some((last, parents)) => detach_subtree(&mut self.root, parents, last),
        };
        self.len -= removed;
        removed
    }

    /// Every recorded path, in component order.
    pub fn paths(&self) -> Vec<std::path::PathBuf> {
        let mut out = Vec::with_capacity(self.len);
        collect_paths(&self.root, Path::new(""), &mut out);
        out
    }
}

fn remove_entry(node: &mut Node, key: &[OsString]) -> Option<Snapshot> {
    match key.split_first() {
        None => node.snapshot.take(),
        Some((head, rest)) => {
            let child = node.children.get_mut(head)?;
            let removed = remove_entry(child, rest);
            if child.is_empty() {
                node.children.remove(head);
            }
            removed
        }
    }
}

fn detach_subtree(node: &mut Node, parents: &[OsString], last: &OsString) -> usize {
    match parents.split_first() {
        None => node.children.remove(last).map_or(0, |sub| sub.count()),
        Some((head, rest)) => {
            let Some(child) = node.children.get_mut(head) else {
                return 0;
            };
            let removed = detach_subtree(child, rest, last);
            if child.is_empty() {
                node.children.remove(head);
            }
            removed
        }
    }
}

fn collect_paths(node: &Node, prefix: &Path, out: &mut Vec<std::path::PathBuf>) {
    if node.snapshot.is_some() {
        out.push(prefix.to_path_buf());
    }
    for (part, child) in &node.children {
        collect_paths(child, &prefix.join(part), out);
    }
}
