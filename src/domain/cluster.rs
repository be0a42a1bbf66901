//! Concurrent collection of snapshots across configured instances

use std::{sync::Arc, time::Duration};

use serde::Serialize;
use serde_json::Value;
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, error, info, warn};

use crate::config::{InstanceConfig, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_MAX_CONCURRENCY};
use crate::domain::snapshot::Snapshot;
use crate::monit_client::{sentinel_document, StatusFetcher};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterOptions {
    /// Upper bound for each individual fetch.
    pub fetch_timeout: Duration,
    pub max_concurrency: usize,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            fetch_timeout: Duration::from_secs(DEFAULT_FETCH_TIMEOUT_SECS),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

/// Snapshots in configuration order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Cluster {
    pub snapshots: Vec<Snapshot>,
}

impl Cluster {
    /// Fetches and decodes every instance concurrently.
    ///
    /// A slow or failing instance only degrades its own snapshot. Dropping the
    /// returned future aborts fetches still in flight.
    pub async fn gather(
        fetcher: Arc<dyn StatusFetcher>,
        instances: &[InstanceConfig],
        options: &ClusterOptions,
    ) -> Self {
        let semaphore = Arc::new(Semaphore::new(options.max_concurrency.max(1)));
        let fetch_timeout = options.fetch_timeout;
        let mut join_set = JoinSet::new();

        for (index, instance) in instances.iter().cloned().enumerate() {
            let fetcher = Arc::clone(&fetcher);
            let semaphore = Arc::clone(&semaphore);

            join_set.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let raw = match tokio::time::timeout(fetch_timeout, fetcher.fetch(&instance)).await
                {
                    Ok(raw) => raw,
                    Err(_) => {
                        warn!(
                            instance = %instance.identity(),
                            timeout_ms = fetch_timeout.as_millis(),
                            "status fetch timed out"
                        );
                        sentinel_document(
                            "Timeout",
                            &format!("no response within {} ms", fetch_timeout.as_millis()),
                        )
                    }
                };
                (index, Snapshot::for_instance(&instance, &raw))
            });
        }

        let mut slots: Vec<Option<Snapshot>> = instances.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((index, snapshot)) => {
                    debug!(instance = %snapshot.instance, "snapshot decoded");
                    slots[index] = Some(snapshot);
                }
                Err(err) => error!(error = %err, "status fetch task failed"),
            }
        }

        let snapshots: Vec<Snapshot> = slots
            .into_iter()
            .zip(instances)
            .map(|(slot, instance)| {
                slot.unwrap_or_else(|| {
                    Snapshot::for_instance(
                        instance,
                        &sentinel_document("TaskFailed", "status fetch task did not complete"),
                    )
                })
            })
            .collect();

        let cluster = Self { snapshots };
        info!(
            instances = cluster.snapshots.len(),
            services = cluster
                .snapshots
                .iter()
                .map(Snapshot::service_count)
                .sum::<usize>(),
            unavailable = cluster.unavailable().len(),
            "cluster snapshot collected"
        );
        cluster
    }

    /// Identities of instances whose data is unavailable.
    pub fn unavailable(&self) -> Vec<&str> {
        self.snapshots
            .iter()
            .filter(|snapshot| !snapshot.is_available())
            .map(|snapshot| snapshot.instance.as_str())
            .collect()
    }

    pub fn to_json(&self, verbose: bool) -> serde_json::Result<Value> {
        self.snapshots
            .iter()
            .map(|snapshot| snapshot.to_json(verbose))
            .collect::<serde_json::Result<Vec<_>>>()
            .map(Value::Array)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;

    use super::*;

    const HEALTHY: &str = r#"<monit><service type="5"><name>box</name><status>0</status></service></monit>"#;

    /// Serves canned documents keyed by host, with an optional delay.
    struct ScriptedFetcher {
        documents: HashMap<String, (Duration, String)>,
    }

    impl ScriptedFetcher {
        fn new(entries: &[(&str, u64, &str)]) -> Arc<Self> {
            Arc::new(Self {
                documents: entries
                    .iter()
                    .map(|(host, delay_ms, body)| {
                        (
                            host.to_string(),
                            (Duration::from_millis(*delay_ms), body.to_string()),
                        )
                    })
                    .collect(),
            })
        }
    }

    #[async_trait]
    impl StatusFetcher for ScriptedFetcher {
        async fn fetch(&self, instance: &InstanceConfig) -> String {
            match self.documents.get(&instance.host) {
                Some((delay, body)) => {
                    tokio::time::sleep(*delay).await;
                    body.clone()
                }
                None => sentinel_document("Connect", "Connection refused"),
            }
        }
    }

    struct PanickingFetcher;

    #[async_trait]
    impl StatusFetcher for PanickingFetcher {
        async fn fetch(&self, _instance: &InstanceConfig) -> String {
            panic!("fetcher exploded");
        }
    }

    fn instances(hosts: &[&str]) -> Vec<InstanceConfig> {
        hosts
            .iter()
            .map(|host| InstanceConfig::new(*host, 2812))
            .collect()
    }

    #[tokio::test]
    async fn preserves_configuration_order_regardless_of_completion() {
        let fetcher = ScriptedFetcher::new(&[("slow", 80, HEALTHY), ("fast", 0, HEALTHY)]);

        let cluster = Cluster::gather(
            fetcher,
            &instances(&["slow", "fast", "down"]),
            &ClusterOptions::default(),
        )
        .await;

        let order: Vec<&str> = cluster
            .snapshots
            .iter()
            .map(|snapshot| snapshot.instance.as_str())
            .collect();
        assert_eq!(order, ["slow:2812", "fast:2812", "down:2812"]);
        assert_eq!(cluster.unavailable(), ["down:2812"]);
        assert_eq!(
            cluster.snapshots[2]
                .system
                .as_error()
                .expect("error record")
                .message,
            "Connection refused"
        );
    }

    #[tokio::test]
    async fn timeout_degrades_only_the_slow_instance() {
        let fetcher = ScriptedFetcher::new(&[("stuck", 5_000, HEALTHY), ("ok", 0, HEALTHY)]);
        let options = ClusterOptions {
            fetch_timeout: Duration::from_millis(50),
            max_concurrency: 4,
        };

        let cluster = Cluster::gather(fetcher, &instances(&["stuck", "ok"]), &options).await;

        assert!(!cluster.snapshots[0].is_available());
        assert!(cluster.snapshots[0]
            .system
            .as_error()
            .expect("error record")
            .message
            .starts_with("no response within"));
        assert!(cluster.snapshots[1].is_available());
    }

    #[tokio::test]
    async fn single_permit_still_completes_all_instances() {
        let fetcher = ScriptedFetcher::new(&[("a", 5, HEALTHY), ("b", 5, HEALTHY), ("c", 5, HEALTHY)]);
        let options = ClusterOptions {
            fetch_timeout: Duration::from_secs(1),
            max_concurrency: 1,
        };

        let cluster = Cluster::gather(fetcher, &instances(&["a", "b", "c"]), &options).await;

        assert_eq!(cluster.snapshots.len(), 3);
        assert!(cluster.unavailable().is_empty());
    }

    #[tokio::test]
    async fn panicking_fetch_degrades_its_slot() {
        let cluster = Cluster::gather(
            Arc::new(PanickingFetcher),
            &instances(&["a"]),
            &ClusterOptions::default(),
        )
        .await;

        let error = cluster.snapshots[0].system.as_error().expect("error record");
        assert_eq!(error.message, "status fetch task did not complete");
    }

    #[tokio::test]
    async fn empty_instance_list_yields_empty_cluster() {
        let cluster = Cluster::gather(
            ScriptedFetcher::new(&[]),
            &[],
            &ClusterOptions::default(),
        )
        .await;

        assert!(cluster.snapshots.is_empty());
        assert_eq!(cluster.to_json(false).expect("serializes"), Value::Array(vec![]));
    }
}
