//! Requirement verification for ClusterServiceVersions
//!
//! Before a CSV may install, every CRD it owns or requires must exist on the
//! cluster. Each check produces a requirement status recorded on the CSV;
//! the CSV is requirement-met only when all of them are present.

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use tracing::debug;

use crate::controller::client::ClusterClient;
use crate::crd::{ClusterServiceVersion, RequirementStatus};
use crate::resolver::{CRD_GROUP, CRD_KIND, CRD_VERSION};

/// Check every owned and required CRD of a CSV against the cluster
///
/// Returns the met conjunction and one status per CRD description. Lookup
/// failures count as not-present; requirements are transient and re-checked
/// on the next tick.
pub async fn requirement_status(
    client: &dyn ClusterClient,
    csv: &ClusterServiceVersion,
) -> (bool, Vec<RequirementStatus>) {
    let mut met = true;
    let descriptions = csv.all_crd_descriptions();
    let mut statuses = Vec::with_capacity(descriptions.len());

    for desc in descriptions {
        let found: Option<CustomResourceDefinition> = match client.get_crd(&desc.name).await {
            Ok(found) => found,
            Err(e) => {
                debug!(crd = %desc.name, error = %e, "requirement lookup failed");
                None
            }
        };

        let mut status = RequirementStatus {
            group: CRD_GROUP.to_string(),
            version: CRD_VERSION.to_string(),
            kind: CRD_KIND.to_string(),
            name: desc.name.clone(),
            present: false,
            uuid: None,
        };
        match found {
            Some(crd) => {
                status.present = true;
                status.uuid = crd.metadata.uid.clone();
            }
            None => met = false,
        }
        statuses.push(status);
    }

    (met, statuses)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::client::MockClusterClient;
    use crate::crd::{
        ClusterServiceVersionSpec, CrdDescription, CustomResourceDefinitions,
    };
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn csv(owned: &[&str], required: &[&str]) -> ClusterServiceVersion {
        ClusterServiceVersion {
            metadata: ObjectMeta {
                name: Some("etcd".to_string()),
                namespace: Some("ns".to_string()),
                ..Default::default()
            },
            spec: ClusterServiceVersionSpec {
                replaces: None,
                custom_resource_definitions: CustomResourceDefinitions {
                    owned: owned
                        .iter()
                        .map(|n| CrdDescription {
                            name: n.to_string(),
                            version: "v1".to_string(),
                            kind: n.to_string(),
                        })
                        .collect(),
                    required: required
                        .iter()
                        .map(|n| CrdDescription {
                            name: n.to_string(),
                            version: "v1".to_string(),
                            kind: n.to_string(),
                        })
                        .collect(),
                },
                install: Default::default(),
            },
            status: None,
        }
    }

    fn crd_on_cluster(name: &str, uid: &str) -> CustomResourceDefinition {
        CustomResourceDefinition {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                uid: Some(uid.to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_all_present_is_met_and_records_uids() {
        let mut client = MockClusterClient::new();
        client
            .expect_get_crd()
            .returning(|name| Ok(Some(crd_on_cluster(name, "uid-1"))));

        let (met, statuses) = requirement_status(&client, &csv(&["Owned"], &["Required"])).await;

        assert!(met);
        assert_eq!(statuses.len(), 2);
        for status in &statuses {
            assert!(status.present);
            assert_eq!(status.uuid.as_deref(), Some("uid-1"));
            assert_eq!(status.kind, "CustomResourceDefinition");
        }
    }

    #[tokio::test]
    async fn test_one_absent_crd_fails_the_conjunction() {
        let mut client = MockClusterClient::new();
        client.expect_get_crd().returning(|name| {
            if name == "Present" {
                Ok(Some(crd_on_cluster(name, "uid-2")))
            } else {
                Ok(None)
            }
        });

        let (met, statuses) = requirement_status(&client, &csv(&["Present"], &["Absent"])).await;

        assert!(!met);
        let absent = statuses.iter().find(|s| s.name == "Absent").unwrap();
        assert!(!absent.present);
        assert!(absent.uuid.is_none());
    }

    #[tokio::test]
    async fn test_lookup_errors_count_as_not_present() {
        let mut client = MockClusterClient::new();
        client.expect_get_crd().returning(|_| {
            Err(crate::Error::serialization("api unavailable"))
        });

        let (met, statuses) = requirement_status(&client, &csv(&[], &["Required"])).await;

        assert!(!met);
        assert!(!statuses[0].present);
    }

    #[tokio::test]
    async fn test_no_requirements_is_trivially_met() {
        let client = MockClusterClient::new();
        let (met, statuses) = requirement_status(&client, &csv(&[], &[])).await;
        assert!(met);
        assert!(statuses.is_empty());
    }
}
