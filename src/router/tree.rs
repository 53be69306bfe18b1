//! Segment trie holding the routes of one method table.
//!
//! At every node the matcher tries, in order: the static child for the current
//! segment, the param child, then the wildcard. A failed static branch falls
//! back to the param and wildcard branches of the same node, so `/a/b/c` still
//! reaches `/a/:x/c` when `/a/b` exists but has no `c` below it.

use std::collections::HashMap;
use std::sync::Arc;

use super::pattern::PathSegment;
use super::record::RouteRecord;
use crate::context::Parameters;

/// A successful lookup: the selected record and its parameter bindings.
#[derive(Debug, Clone)]
pub struct RouteMatch {
    pub record: Arc<RouteRecord>,
    pub params: Parameters,
}

#[derive(Debug, Default)]
struct Node {
    statics: HashMap<String, Node>,
    // Shared by every pattern with a param at this depth, whatever its name.
    param: Option<Box<Node>>,
    wildcard: Option<Arc<RouteRecord>>,
    record: Option<Arc<RouteRecord>>,
}

/// Trie of routes keyed by compiled segments.
#[derive(Debug, Default)]
pub struct RouteTree {
    root: Node,
    len: usize,
}

impl RouteTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `record` at the node its pattern resolves to.
    ///
    /// Returns the record previously stored at that exact node, which the new
    /// one replaces.
    pub fn insert(&mut self, record: Arc<RouteRecord>) -> Option<Arc<RouteRecord>> {
        let mut node = &mut self.root;
        let mut slot = None;

        for seg in record.pattern().segments() {
            match seg {
                PathSegment::Static(lit) => {
                    node = node.statics.entry(lit.clone()).or_default();
                }
                PathSegment::Param(_) => {
                    node = &mut **node.param.get_or_insert_with(Box::default);
                }
                // Compiled patterns only carry `*` last.
                PathSegment::Wildcard => {
                    slot = Some(&mut node.wildcard);
                    break;
                }
            }
        }

        let slot = match slot {
            Some(slot) => slot,
            None => &mut node.record,
        };
        let previous = slot.replace(record);
        if previous.is_none() {
            self.len += 1;
        }
        previous
    }

    /// Find the route for a split request path.
    pub fn find(&self, path: &[&str]) -> Option<RouteMatch> {
        let mut captured = Vec::new();
        let record = find_in(&self.root, path, &mut captured)?;
        Some(RouteMatch {
            params: record.pattern().bind(&captured),
            record: Arc::clone(record),
        })
    }

    /// Number of live records.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

fn find_in<'n, 'p>(
    node: &'n Node,
    path: &[&'p str],
    captured: &mut Vec<&'p str>,
) -> Option<&'n Arc<RouteRecord>> {
    let Some((&segment, rest)) = path.split_first() else {
        return node.record.as_ref().or(node.wildcard.as_ref());
    };

    if let Some(child) = node.statics.get(segment) {
        if let Some(found) = find_in(child, rest, captured) {
            return Some(found);
        }
    }

    if let Some(child) = &node.param {
        captured.push(segment);
        if let Some(found) = find_in(child, rest, captured) {
            return Some(found);
        }
        captured.pop();
    }

    node.wildcard.as_ref()
}
