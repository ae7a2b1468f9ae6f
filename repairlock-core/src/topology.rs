//! Local identity and the one-time namespace bootstrap.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{RepairError, Result, StoreContext};
use crate::records::RecordKey;
use crate::store::RecordStore;

/// Replicas requested per data center when the namespace is first created.
pub const DEFAULT_REPLICATION_FACTOR: u8 = 3;

/// Data center → replication factor.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct ReplicationMap(pub BTreeMap<String, u8>);

impl ReplicationMap {
    /// One entry per distinct, non-blank data center name.
    pub fn from_data_centers<'a>(
        data_centers: impl IntoIterator<Item = &'a str>,
        factor: u8,
    ) -> Self {
        let distinct: BTreeSet<&str> = data_centers
            .into_iter()
            .map(str::trim)
            .filter(|dc| !dc.is_empty())
            .collect();
        Self(
            distinct
                .into_iter()
                .map(|dc| (dc.to_string(), factor))
                .collect(),
        )
    }

    pub fn data_centers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Description of a namespace, written once by the first node to run.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NamespaceManifest {
    pub namespace: String,
    pub replication: ReplicationMap,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Builds the local record key. The data center is mandatory: without it
/// there is nothing to scope the lease to.
pub fn resolve_identity(nodename: &str, data_center: Option<&str>) -> Result<RecordKey> {
    let nodename = nodename.trim();
    if nodename.is_empty() {
        return Err(RepairError::Topology("node name is empty".into()));
    }
    match data_center.map(str::trim).filter(|dc| !dc.is_empty()) {
        Some(dc) => Ok(RecordKey::new(nodename, dc)),
        None => Err(RepairError::Topology(format!(
            "no data center configured for {nodename}; is the node still bootstrapping?"
        ))),
    }
}

/// Makes sure the namespace manifest exists, creating it from the local and
/// peer data centers on first run. Returns whether this call created it.
pub async fn bootstrap(
    store: &dyn RecordStore,
    namespace: &str,
    identity: &RecordKey,
    peer_data_centers: &[String],
) -> Result<bool> {
    let replication = ReplicationMap::from_data_centers(
        std::iter::once(identity.data_center.as_str())
            .chain(peer_data_centers.iter().map(String::as_str)),
        DEFAULT_REPLICATION_FACTOR,
    );
    let manifest = NamespaceManifest {
        namespace: namespace.to_string(),
        replication,
        created_by: identity.to_string(),
        created_at: Utc::now(),
    };

    let created = store
        .ensure_namespace(&manifest)
        .await
        .during("bootstrapping the namespace")?;
    if created {
        info!(
            namespace,
            data_centers = ?manifest.replication.data_centers().collect::<Vec<_>>(),
            "namespace bootstrapped"
        );
    } else {
        debug!(namespace, "namespace already bootstrapped");
    }
    Ok(created)
}
