//! Replacement graph over the ClusterServiceVersions of one namespace
//!
//! Each CSV's `replaces` field induces a linked chain of versions. The graph
//! is recomputed per reconcile over a single namespace list snapshot; at
//! realistic set sizes the O(n) scans are cheap and a snapshot keeps the
//! answers consistent within one tick.

use kube::ResourceExt;

use crate::crd::ClusterServiceVersion;

/// Adjacency view over a namespace's CSV set via the `replaces` field
pub struct ReplacementGraph<'a> {
    csvs: &'a [ClusterServiceVersion],
}

impl<'a> ReplacementGraph<'a> {
    /// Build a graph over one namespace list snapshot
    pub fn new(csvs: &'a [ClusterServiceVersion]) -> Self {
        Self { csvs }
    }

    /// The CSV that `csv` declares it replaces, when present in the set
    pub fn predecessor(&self, csv: &ClusterServiceVersion) -> Option<&'a ClusterServiceVersion> {
        let replaces = csv.spec.replaces.as_deref()?;
        self.csvs.iter().find(|other| other.name_any() == replaces)
    }

    /// The CSV declaring that it replaces `csv`
    ///
    /// If several CSVs claim to replace the same one, the set is malformed;
    /// the first match in list order is returned deterministically and the
    /// inconsistency is left for ownership arbitration to surface.
    pub fn successor(&self, csv: &ClusterServiceVersion) -> Option<&'a ClusterServiceVersion> {
        let name = csv.name_any();
        self.csvs
            .iter()
            .find(|other| other.spec.replaces.as_deref() == Some(name.as_str()))
    }

    /// Returns true if following successors from `from` reaches `to`
    pub fn chain_starts_at(
        &self,
        from: &ClusterServiceVersion,
        to: &ClusterServiceVersion,
    ) -> bool {
        let target = to.name_any();
        let mut hops = 0;
        let mut current = from;
        while let Some(next) = self.successor(current) {
            if next.name_any() == target {
                return true;
            }
            // a malformed set can contain a cycle; bound the walk
            hops += 1;
            if hops > self.csvs.len() {
                return false;
            }
            current = next;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::ClusterServiceVersionSpec;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn csv(name: &str, replaces: Option<&str>) -> ClusterServiceVersion {
        ClusterServiceVersion {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            spec: ClusterServiceVersionSpec {
                replaces: replaces.map(String::from),
                ..Default::default()
            },
            status: None,
        }
    }

    #[test]
    fn test_predecessor_follows_replaces_field() {
        let set = vec![csv("v1", None), csv("v2", Some("v1"))];
        let graph = ReplacementGraph::new(&set);

        assert_eq!(graph.predecessor(&set[1]).unwrap().name_any(), "v1");
        assert!(graph.predecessor(&set[0]).is_none());
    }

    #[test]
    fn test_predecessor_requires_presence_in_set() {
        let set = vec![csv("v2", Some("v1"))];
        let graph = ReplacementGraph::new(&set);
        assert!(graph.predecessor(&set[0]).is_none());
    }

    #[test]
    fn test_successor_finds_replacing_csv() {
        let set = vec![csv("v1", None), csv("v2", Some("v1")), csv("v3", Some("v2"))];
        let graph = ReplacementGraph::new(&set);

        assert_eq!(graph.successor(&set[0]).unwrap().name_any(), "v2");
        assert_eq!(graph.successor(&set[1]).unwrap().name_any(), "v3");
        assert!(graph.successor(&set[2]).is_none());
    }

    #[test]
    fn test_ambiguous_successor_resolves_deterministically() {
        let set = vec![csv("v1", None), csv("fork-a", Some("v1")), csv("fork-b", Some("v1"))];
        let graph = ReplacementGraph::new(&set);

        // first match in list order wins, every time
        assert_eq!(graph.successor(&set[0]).unwrap().name_any(), "fork-a");
        assert_eq!(graph.successor(&set[0]).unwrap().name_any(), "fork-a");
    }

    #[test]
    fn test_chain_walk_reaches_transitive_successor() {
        let set = vec![csv("v1", None), csv("v2", Some("v1")), csv("v3", Some("v2"))];
        let graph = ReplacementGraph::new(&set);

        assert!(graph.chain_starts_at(&set[0], &set[2]));
        assert!(graph.chain_starts_at(&set[1], &set[2]));
        assert!(!graph.chain_starts_at(&set[2], &set[0]));
    }

    #[test]
    fn test_chain_walk_terminates_on_cycles() {
        let set = vec![csv("a", Some("b")), csv("b", Some("a")), csv("c", None)];
        let graph = ReplacementGraph::new(&set);

        assert!(!graph.chain_starts_at(&set[0], &set[2]));
    }
}
