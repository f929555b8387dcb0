//! Reply-tree assembly from the flat record list delivered by a fetch.
//!
//! The builder never mutates an existing forest: every refresh or filter
//! change produces a fresh one. Ordering follows the fetch order only.

use std::collections::HashMap;

use crate::reddit::CommentRecord;

#[derive(Debug, Clone, PartialEq)]
pub struct CommentNode {
    pub record: CommentRecord,
    pub children: Vec<CommentNode>,
}

impl CommentNode {
    fn leaf(record: CommentRecord) -> Self {
        Self {
            record,
            children: Vec::new(),
        }
    }
}

/// Case-insensitive substring match against author or body.
pub fn matches_filter(record: &CommentRecord, filter_lower: &str) -> bool {
    filter_lower.is_empty()
        || record.author.to_lowercase().contains(filter_lower)
        || record.body.to_lowercase().contains(filter_lower)
}

/// Builds the forest for `records` after dropping those that fail `filter`.
///
/// A record whose parent is missing from the surviving set becomes a root.
/// Self references and parent cycles are broken the same way, so every
/// surviving record appears exactly once.
pub fn build(records: &[CommentRecord], filter: &str) -> Vec<CommentNode> {
    let filter_lower = filter.trim().to_lowercase();
    let survivors: Vec<&CommentRecord> = records
        .iter()
        .filter(|record| matches_filter(record, &filter_lower))
        .collect();
    if survivors.is_empty() {
        return Vec::new();
    }

    let mut index_by_id: HashMap<&str, usize> = HashMap::with_capacity(survivors.len());
    for (idx, record) in survivors.iter().enumerate() {
        index_by_id.entry(record.id.as_str()).or_insert(idx);
    }

    let mut parent: Vec<Option<usize>> = survivors
        .iter()
        .enumerate()
        .map(|(idx, record)| {
            let parent_id = record.parent_id.trim();
            if parent_id.is_empty() {
                return None;
            }
            index_by_id
                .get(parent_id)
                .copied()
                .filter(|&parent_idx| parent_idx != idx)
        })
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); survivors.len()];
    for (idx, parent_idx) in parent.iter().enumerate() {
        if let Some(parent_idx) = parent_idx {
            children[*parent_idx].push(idx);
        }
    }

    // Anything not reachable from a root sits on a cycle; cut it loose.
    let mut reachable = vec![false; survivors.len()];
    for idx in 0..survivors.len() {
        if parent[idx].is_none() {
            mark_subtree(idx, &children, &mut reachable);
        }
    }
    for idx in 0..survivors.len() {
        if reachable[idx] {
            continue;
        }
        if let Some(parent_idx) = parent[idx].take() {
            children[parent_idx].retain(|&child| child != idx);
        }
        mark_subtree(idx, &children, &mut reachable);
    }

    let roots: Vec<usize> = (0..survivors.len())
        .filter(|&idx| parent[idx].is_none())
        .collect();

    // Children are assembled before their parents via a post-order walk.
    let mut built: Vec<Option<CommentNode>> = vec![None; survivors.len()];
    for idx in post_order(&roots, &children) {
        let mut node = CommentNode::leaf(survivors[idx].clone());
        node.children = children[idx]
            .iter()
            .filter_map(|&child| built[child].take())
            .collect();
        built[idx] = Some(node);
    }

    roots
        .into_iter()
        .filter_map(|idx| built[idx].take())
        .collect()
}

/// Number of nodes in the forest.
pub fn count(roots: &[CommentNode]) -> usize {
    roots
        .iter()
        .map(|node| 1 + count(&node.children))
        .sum()
}

fn mark_subtree(start: usize, children: &[Vec<usize>], reachable: &mut [bool]) {
    let mut stack = vec![start];
    while let Some(idx) = stack.pop() {
        if reachable[idx] {
            continue;
        }
        reachable[idx] = true;
        stack.extend(children[idx].iter().copied());
    }
}

fn post_order(roots: &[usize], children: &[Vec<usize>]) -> Vec<usize> {
    let mut order = Vec::with_capacity(children.len());
    let mut stack: Vec<(usize, bool)> = roots.iter().rev().map(|&idx| (idx, false)).collect();
    while let Some((idx, expanded)) = stack.pop() {
        if expanded {
            order.push(idx);
            continue;
        }
        stack.push((idx, true));
        stack.extend(children[idx].iter().rev().map(|&child| (child, false)));
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, parent: &str, author: &str, body: &str) -> CommentRecord {
        CommentRecord {
            id: id.to_string(),
            author: author.to_string(),
            body: body.to_string(),
            created_utc: 0.0,
            score: 1,
            parent_id: parent.to_string(),
            order: 0,
        }
    }

    fn preorder_ids(roots: &[CommentNode], out: &mut Vec<String>) {
        for node in roots {
            out.push(node.record.id.clone());
            preorder_ids(&node.children, out);
        }
    }

    #[test]
    fn empty_input_builds_empty_forest() {
        assert!(build(&[], "").is_empty());
    }

    #[test]
    fn root_with_single_reply() {
        let records = vec![
            record("a", "", "alice", "root"),
            record("b", "a", "bob", "reply"),
        ];
        let roots = build(&records, "");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].record.id, "a");
        assert_eq!(roots[0].children.len(), 1);
        assert_eq!(roots[0].children[0].record.id, "b");
    }

    #[test]
    fn child_before_parent_keeps_input_order() {
        let records = vec![
            record("c", "a", "carol", "late reply"),
            record("a", "", "alice", "root"),
            record("b", "a", "bob", "reply"),
            record("d", "", "dan", "second root"),
        ];
        let roots = build(&records, "");
        let mut ids = Vec::new();
        preorder_ids(&roots, &mut ids);
        assert_eq!(ids, vec!["a", "c", "b", "d"]);
    }

    #[test]
    fn unresolved_parent_is_promoted() {
        let records = vec![
            record("a", "", "alice", "root"),
            record("x", "missing", "xena", "orphan"),
        ];
        let roots = build(&records, "");
        let ids: Vec<_> = roots.iter().map(|n| n.record.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "x"]);
    }

    #[test]
    fn filtered_parent_promotes_children() {
        let records = vec![
            record("a", "", "alice", "kickoff"),
            record("b", "a", "bob", "GOAL for the home side"),
            record("c", "b", "carol", "what a goal"),
        ];
        let roots = build(&records, "  Goal ");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].record.id, "b");
        assert_eq!(roots[0].children[0].record.id, "c");
    }

    #[test]
    fn filter_matches_author_case_insensitively() {
        let records = vec![
            record("a", "", "Alice", "one"),
            record("b", "", "bob", "two"),
        ];
        let roots = build(&records, "ALI");
        assert_eq!(roots.len(), 1);
        assert_eq!(roots[0].record.id, "a");
    }

    #[test]
    fn filter_without_matches_is_empty() {
        let records = vec![record("a", "", "alice", "root")];
        assert!(build(&records, "zzz").is_empty());
    }

    #[test]
    fn self_reference_becomes_root() {
        let records = vec![record("a", "a", "alice", "loop")];
        let roots = build(&records, "");
        assert_eq!(roots.len(), 1);
        assert!(roots[0].children.is_empty());
    }

    #[test]
    fn cycles_are_broken_without_dropping_records() {
        let records = vec![
            record("a", "b", "alice", "one"),
            record("b", "a", "bob", "two"),
            record("c", "", "carol", "three"),
        ];
        let roots = build(&records, "");
        assert_eq!(count(&roots), 3);
        let ids: Vec<_> = roots.iter().map(|n| n.record.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
        assert_eq!(roots[0].children[0].record.id, "b");
    }

    #[test]
    fn deep_chains_do_not_recurse_in_builder() {
        let mut records = vec![record("0", "", "a", "root")];
        for i in 1..1500 {
            records.push(record(&i.to_string(), &(i - 1).to_string(), "a", "x"));
        }
        let roots = build(&records, "");
        assert_eq!(roots.len(), 1);
    }
}
