//! CRD ownership arbitration
//!
//! Two ClusterServiceVersions in one namespace may own the same CRD only
//! when a replacement chain links them; an upgrade hands ownership from the
//! old version to the new without a gap. Any other double claim is a
//! conflict that fails the candidate.

use kube::ResourceExt;

use crate::controller::replace::ReplacementGraph;
use crate::crd::ClusterServiceVersion;
use crate::Error;

/// Check a candidate CSV's owned CRDs against the rest of its namespace
///
/// For every other CSV owning one of the candidate's CRDs, the successor
/// chain starting at that owner must reach the candidate or the candidate's
/// declared predecessor; otherwise the two claims are unlinked and the
/// candidate must not install.
pub fn crd_owner_conflicts(
    candidate: &ClusterServiceVersion,
    csvs_in_namespace: &[ClusterServiceVersion],
) -> Result<(), Error> {
    let graph = ReplacementGraph::new(csvs_in_namespace);
    let candidate_name = candidate.name_any();

    for crd in &candidate.spec.custom_resource_definitions.owned {
        for other in csvs_in_namespace {
            let other_name = other.name_any();
            if other_name == candidate_name || !other.owns_crd(&crd.name) {
                continue;
            }

            if !chain_links(candidate, other, &graph, csvs_in_namespace.len()) {
                return Err(Error::ownership_conflict(
                    candidate_name,
                    other_name,
                    crd.name.clone(),
                ));
            }
        }
    }
    Ok(())
}

/// Walk the successor chain from `other`; the claims are linked if the walk
/// reaches the candidate itself or the CSV the candidate replaces.
fn chain_links(
    candidate: &ClusterServiceVersion,
    other: &ClusterServiceVersion,
    graph: &ReplacementGraph<'_>,
    set_len: usize,
) -> bool {
    let candidate_name = candidate.name_any();
    let mut current = other;
    let mut hops = 0;
    loop {
        let current_name = current.name_any();
        if candidate.spec.replaces.as_deref() == Some(current_name.as_str()) {
            return true;
        }
        if current_name == candidate_name {
            return true;
        }
        match graph.successor(current) {
            Some(next) => {
                hops += 1;
                if hops > set_len {
                    // malformed cycle with no link to the candidate
                    return false;
                }
                current = next;
            }
            None => return false,
        }
    }
}
