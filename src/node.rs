/// Per-node current value, version counter, and bounded update history.
///
/// A node remembers enough of its own past to answer "give me the delta
/// from version V" without ever growing unbounded: history entries are
/// evicted oldest-first once their encoded size exceeds the configured
/// byte budget, at which point `oldest_version` moves forward and callers
/// behind that point fall back to a full value instead of a delta.
use crate::delta::{apply_ops_value, delta, ops_from_array, Op};
use crate::json::Value;
use crate::version::{Version, FIRST_VERSION};
use std::collections::BTreeMap;
use std::fmt;

/// An ordered set of (domain, value) string pairs. Two names compare equal
/// iff they carry the same pairs regardless of the order they were added
/// in — a `BTreeMap` gives that for free, along with a canonical iteration
/// order for hashing and display.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct NodeName(BTreeMap<String, String>);

impl NodeName {
    pub fn new() -> Self {
        NodeName(BTreeMap::new())
    }

    /// Add a (domain, value) pair. Domains are unique within a name;
    /// re-adding a domain replaces its value.
    pub fn with(mut self, domain: impl Into<String>, value: impl Into<String>) -> Self {
        self.0.insert(domain.into(), value.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, domain: &str) -> Option<&str> {
        self.0.get(domain).map(String::as_str)
    }

    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for NodeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, (k, v)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}={}", k, v)?;
        }
        write!(f, ")")
    }
}

/// A predicate over node names, used to select a node's configuration.
pub enum NodeGroup {
    /// Matches every node.
    All,
    /// Matches nodes that carry the given (domain, value) pair.
    HasPair { domain: String, value: String },
    /// Matches nodes that carry the domain, regardless of value.
    HasDomain(String),
    /// Matches a node if any of the given groups match.
    AnyOf(Vec<NodeGroup>),
}

impl NodeGroup {
    /// The union of `groups`: matches a name if any one of them does,
    /// mirroring the original implementation's compositional
    /// `node_group::operator+`.
    pub fn any_of(groups: Vec<NodeGroup>) -> Self {
        NodeGroup::AnyOf(groups)
    }

    pub fn in_group(&self, name: &NodeName) -> bool {
        match self {
            NodeGroup::All => true,
            NodeGroup::HasPair { domain, value } => name.get(domain) == Some(value.as_str()),
            NodeGroup::HasDomain(domain) => name.get(domain).is_some(),
            NodeGroup::AnyOf(groups) => groups.iter().any(|g| g.in_group(name)),
        }
    }
}

/// One retained step of history: the version the delta was computed
/// against, and the edit operations array produced by [`delta`].
#[derive(Debug, Clone)]
struct HistoryEntry {
    from_version: Version,
    ops: Value,
}

impl HistoryEntry {
    fn size(&self) -> usize {
        self.ops.size()
    }
}

/// The current value of a node, its version, and enough history to answer
/// `get_update_from` without always falling back to the full value.
pub struct Node {
    current_version: Version,
    oldest_version: Version,
    data: Value,
    history: Vec<HistoryEntry>,
}

impl Node {
    /// Construct a fresh node at the given starting version, with empty
    /// history.
    pub fn new(version: Version, value: Value) -> Self {
        Node {
            current_version: version,
            oldest_version: version,
            data: value,
            history: Vec::new(),
        }
    }

    pub fn current_version(&self) -> Version {
        self.current_version
    }

    pub fn oldest_version(&self) -> Version {
        self.oldest_version
    }

    pub fn data(&self) -> &Value {
        &self.data
    }

    fn history_size(&self) -> usize {
        self.history.iter().map(HistoryEntry::size).sum()
    }

    /// Replace this node's value. A no-op (no version bump, no history
    /// change) if `new_value` structurally equals the current data.
    pub fn update(&mut self, new_value: Value, max_history_bytes: usize) {
        if new_value == self.data {
            return;
        }

        let (ok, ops) = delta(&self.data, &new_value, max_history_bytes);
        if ok {
            self.history.push(HistoryEntry {
                from_version: self.current_version,
                ops,
            });
        } else {
            self.history.clear();
        }

        self.current_version = self.current_version.next();
        self.data = new_value;

        while self.history_size() > max_history_bytes {
            let evicted = self.history.remove(0);
            tracing::debug!(
                version = %evicted.from_version,
                "evicted node history entry to stay within history budget"
            );
        }
        self.oldest_version = self
            .history
            .first()
            .map(|e| e.from_version)
            .unwrap_or(self.current_version);
    }

    /// Reconstruct an update for a subscriber last known to be at version
    /// `v`. Returns `(true, deltas)` if the concatenated history entries
    /// from `v` onward form a valid edit script, `(false, data)`
    /// otherwise (the subscriber is either already current, or far enough
    /// behind that history no longer reaches back to them).
    pub fn get_update_from(&self, v: Version) -> (bool, Value) {
        if v == self.current_version {
            return (false, self.data.clone());
        }
        if v < self.oldest_version {
            return (false, self.data.clone());
        }

        let mut combined: Vec<Op> = Vec::new();
        for entry in &self.history {
            if entry.from_version >= v {
                if let Ok(mut ops) = ops_from_array(&entry.ops) {
                    combined.append(&mut ops);
                }
            }
        }
        let combined_value = Value::array(combined.iter().map(Op::to_json).collect());
        (true, combined_value)
    }
}
