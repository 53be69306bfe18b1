//! Router-level middleware, matched by path prefix.

use super::pattern::Pattern;
use super::record::MiddlewareRecord;
use crate::middleware::MiddlewareHandler;

/// Ordered `(prefix, middleware)` registrations.
///
/// Resolution is independent of the request method and returns every
/// registration whose prefix covers the path, in registration order.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareIndex {
    records: Vec<MiddlewareRecord>,
}

impl MiddlewareIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `middleware` under `prefix`.
    pub fn register(&mut self, prefix: Pattern, middleware: MiddlewareHandler) {
        self.records.push(MiddlewareRecord::new(prefix, middleware));
    }

    pub(crate) fn push(&mut self, record: MiddlewareRecord) {
        self.records.push(record);
    }

    /// The middleware chain for a split request path.
    pub fn resolve(&self, path: &[&str]) -> Vec<MiddlewareHandler> {
        self.records
            .iter()
            .filter(|r| r.prefix().is_prefix_of(path))
            .map(|r| r.middleware().clone())
            .collect()
    }

    pub fn records(&self) -> &[MiddlewareRecord] {
        &self.records
    }

    pub(crate) fn into_records(self) -> Vec<MiddlewareRecord> {
        self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
