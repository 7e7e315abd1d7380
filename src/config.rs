/// Node configuration and the ordered list used to resolve it.
///
/// A subscribed node's behaviour — whether it requires authorization, how
/// large an update may be, its keep-alive and idle timeouts — comes from
/// a [`Configuration`] chosen by matching the node's name against an
/// ordered [`ConfigurationList`]. The first matching group wins; nodes
/// that match nothing get the list's default.
use crate::error::{PubsubError, PubsubResult};
use crate::node::{NodeGroup, NodeName};
use std::sync::Arc;
use std::time::Duration;

/// Immutable, shareable configuration for a group of nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct Configuration {
    pub authorization_required: bool,
    pub max_update_size: usize,
    pub keep_alive_timeout: Duration,
    pub io_timeout: Duration,
    pub max_idle_time: Duration,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            authorization_required: true,
            max_update_size: 64 * 1024,
            keep_alive_timeout: Duration::from_secs(60),
            io_timeout: Duration::from_secs(10),
            max_idle_time: Duration::from_secs(300),
        }
    }
}

struct Entry {
    group: NodeGroup,
    configuration: Arc<Configuration>,
}

/// An ordered list of (group, configuration) pairs plus a fallback
/// default, used to resolve the configuration for any given node name.
pub struct ConfigurationList {
    entries: Vec<Entry>,
    default: Arc<Configuration>,
}

impl ConfigurationList {
    pub fn new(default: Configuration) -> Self {
        ConfigurationList {
            entries: Vec::new(),
            default: Arc::new(default),
        }
    }

    /// Add a configuration for a group. Groups are matched in the order
    /// they were added; an earlier group shadows a later one for names
    /// that match both.
    pub fn add_configuration(&mut self, group: NodeGroup, configuration: Configuration) {
        self.entries.push(Entry {
            group,
            configuration: Arc::new(configuration),
        });
    }

    /// Remove the first entry whose group predicate is the one that was
    /// added, identified here by matching node name: removes the first
    /// entry whose group matches `sample`. Raises a domain error if no
    /// entry's group matches.
    ///
    /// The source this was ported from loops with a condition that looks
    /// inverted and would never remove anything; this is the intended
    /// semantics, recovered from the surrounding design rather than from
    /// that loop.
    pub fn remove_configuration(&mut self, sample: &NodeName) -> PubsubResult<()> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.group.in_group(sample))
            .ok_or_else(|| PubsubError::NoSuchConfiguration(sample.to_string()))?;
        self.entries.remove(pos);
        Ok(())
    }

    /// Resolve the configuration for a node name: the first matching
    /// group's configuration, or the default.
    pub fn get_configuration(&self, name: &NodeName) -> Arc<Configuration> {
        self.entries
            .iter()
            .find(|e| e.group.in_group(name))
            .map(|e| Arc::clone(&e.configuration))
            .unwrap_or_else(|| Arc::clone(&self.default))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_matching_group_wins() {
        let mut list = ConfigurationList::new(Configuration::default());
        list.add_configuration(
            NodeGroup::HasDomain("room".to_string()),
            Configuration {
                authorization_required: false,
                ..Configuration::default()
            },
        );
        list.add_configuration(NodeGroup::All, Configuration::default());

        let room = NodeName::new().with("room", "1");
        let other = NodeName::new().with("user", "alice");

        assert!(!list.get_configuration(&room).authorization_required);
        assert!(list.get_configuration(&other).authorization_required);
    }

    #[test]
    fn unmatched_name_gets_the_default() {
        let list = ConfigurationList::new(Configuration::default());
        let name = NodeName::new().with("room", "1");
        assert_eq!(*list.get_configuration(&name), Configuration::default());
    }

    #[test]
    fn remove_configuration_drops_first_matching_entry() {
        let mut list = ConfigurationList::new(Configuration::default());
        list.add_configuration(
            NodeGroup::HasDomain("room".to_string()),
            Configuration {
                max_update_size: 10,
                ..Configuration::default()
            },
        );
        let room = NodeName::new().with("room", "1");
        assert_eq!(list.get_configuration(&room).max_update_size, 10);

        list.remove_configuration(&room).unwrap();
        assert_eq!(
            list.get_configuration(&room).max_update_size,
            Configuration::default().max_update_size
        );
    }

    #[test]
    fn remove_configuration_with_no_match_is_a_domain_error() {
        let mut list = ConfigurationList::new(Configuration::default());
        let name = NodeName::new().with("room", "1");
        assert!(matches!(
            list.remove_configuration(&name),
            Err(PubsubError::NoSuchConfiguration(_))
        ));
    }
}
