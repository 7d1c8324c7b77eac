use dashmap::DashSet;

/// Concurrent set of keys already seen during one session.
///
/// Emitted outputs and scheduled visits are tracked separately: emitting a
/// reference must not stop that same reference from being fetched.
#[derive(Debug, Default)]
pub struct DedupFilter {
    emitted: DashSet<String>,
    visits: DashSet<String>,
}

impl DedupFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `key` as emitted. Returns `true` when it had already been
    /// emitted, in which case the record must be dropped.
    ///
    /// Check and insert are one atomic step: under concurrent calls with the
    /// same key exactly one caller sees `false`.
    pub fn test_and_insert(&self, key: &str) -> bool {
        Self::seen(&self.emitted, key)
    }

    /// Same as [`test_and_insert`](Self::test_and_insert) for URLs handed to
    /// the fetcher.
    pub fn test_and_insert_visit(&self, url: &str) -> bool {
        Self::seen(&self.visits, url)
    }

    pub fn emitted_count(&self) -> usize {
        self.emitted.len()
    }

    pub fn visit_count(&self) -> usize {
        self.visits.len()
    }

    fn seen(set: &DashSet<String>, key: &str) -> bool {
        if set.contains(key) {
            return true;
        }
        !set.insert(key.to_string())
    }
}
