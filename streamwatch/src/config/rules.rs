//! Detector rule snapshots.
//!
//! Monitor loops read keyword and object lists through a [`RuleStore`]: an
//! immutable, versioned [`RuleSnapshot`] swapped atomically behind a lock.
//! Each cycle clones the `Arc` once, so a cycle always sees one consistent
//! version while admins keep editing. [`RuleRefresher`] reloads the lists
//! from the database on an interval and whenever a rule change is published.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::events::ConfigEventBroadcaster;
use crate::Result;
use crate::database::repositories::RuleRepository;

/// One immutable version of the rule lists.
#[derive(Debug, Clone, Serialize)]
pub struct RuleSnapshot {
    /// Monotonic version; bumped only when the lists actually change.
    pub version: u64,
    /// Keywords for chat and audio detectors, as entered by admins.
    pub keywords: Vec<String>,
    /// Object labels for the visual detector.
    pub objects: Vec<String>,
    pub loaded_at: DateTime<Utc>,
}

impl RuleSnapshot {
    pub fn empty() -> Self {
        Self {
            version: 0,
            keywords: Vec::new(),
            objects: Vec::new(),
            loaded_at: Utc::now(),
        }
    }

    /// Build a snapshot directly (tests and fixed configurations).
    pub fn new(
        version: u64,
        keywords: impl IntoIterator<Item = impl Into<String>>,
        objects: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            version,
            keywords: keywords.into_iter().map(Into::into).collect(),
            objects: objects.into_iter().map(Into::into).collect(),
            loaded_at: Utc::now(),
        }
    }

    /// First keyword contained in `text`, compared case-insensitively.
    pub fn match_keyword(&self, text: &str) -> Option<&str> {
        let haystack = text.to_lowercase();
        self.keywords
            .iter()
            .map(String::as_str)
            .find(|kw| !kw.is_empty() && haystack.contains(&kw.to_lowercase()))
    }

    /// Whether `label` is one of the flagged objects, compared case-insensitively.
    pub fn is_flagged_object(&self, label: &str) -> bool {
        self.objects.iter().any(|o| o.eq_ignore_ascii_case(label))
    }
}

/// Concurrently readable holder of the current [`RuleSnapshot`].
pub struct RuleStore {
    current: RwLock<Arc<RuleSnapshot>>,
}

impl RuleStore {
    pub fn new() -> Self {
        Self::with_snapshot(RuleSnapshot::empty())
    }

    pub fn with_snapshot(snapshot: RuleSnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// The snapshot to use for one detection cycle.
    pub fn snapshot(&self) -> Arc<RuleSnapshot> {
        self.current.read().clone()
    }

    pub fn version(&self) -> u64 {
        self.current.read().version
    }

    /// Install new lists, keeping their order. Returns the new version when
    /// the content or the order changed.
    pub fn replace(&self, keywords: Vec<String>, objects: Vec<String>) -> Option<u64> {
        let keywords = dedup_in_order(keywords);
        let objects = dedup_in_order(objects);

        let mut guard = self.current.write();
        if guard.keywords == keywords && guard.objects == objects {
            return None;
        }

        let version = guard.version + 1;
        *guard = Arc::new(RuleSnapshot {
            version,
            keywords,
            objects,
            loaded_at: Utc::now(),
        });
        Some(version)
    }
}

/// Drop repeated entries, keeping the first occurrence.
fn dedup_in_order(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(values.len());
    values
        .into_iter()
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

impl Default for RuleStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Reloads the [`RuleStore`] from the rule repository.
pub struct RuleRefresher {
    store: Arc<RuleStore>,
    repo: Arc<dyn RuleRepository>,
    events: ConfigEventBroadcaster,
    interval: Duration,
}

impl RuleRefresher {
    pub fn new(
        store: Arc<RuleStore>,
        repo: Arc<dyn RuleRepository>,
        events: ConfigEventBroadcaster,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            repo,
            events,
            interval,
        }
    }

    /// Load both lists and install them. Returns the new version when something changed.
    pub async fn refresh(&self) -> Result<Option<u64>> {
        let keywords = self
            .repo
            .list_keywords()
            .await?
            .into_iter()
            .map(|k| k.keyword)
            .collect();
        let objects = self
            .repo
            .list_objects()
            .await?
            .into_iter()
            .map(|o| o.object_name)
            .collect();

        let changed = self.store.replace(keywords, objects);
        if let Some(version) = changed {
            let snapshot = self.store.snapshot();
            info!(
                version,
                keywords = snapshot.keywords.len(),
                objects = snapshot.objects.len(),
                "Detector rules reloaded"
            );
        }
        Ok(changed)
    }

    /// Run the refresh loop until `cancel` fires.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.events.subscribe();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;

                    _ = cancel.cancelled() => {
                        debug!("Rule refresher shutting down");
                        break;
                    }
                    event = rx.recv() => match event {
                        Ok(event) if event.affects_rules() => {
                            debug!("Refreshing rules: {}", event.description());
                        }
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            debug!(skipped, "Rule event receiver lagged, refreshing");
                        }
                        Err(RecvError::Closed) => {
                            debug!("Config event channel closed, falling back to interval refresh");
                            rx = self.events.subscribe();
                            continue;
                        }
                    },
                    _ = ticker.tick() => {}
                }

                if let Err(e) = self.refresh().await {
                    warn!(error = %e, "Failed to refresh detector rules; keeping previous snapshot");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ConfigUpdateEvent;
    use crate::database;
    use crate::database::models::{ChatKeywordDbModel, FlaggedObjectDbModel};
    use crate::database::repositories::SqlxRuleRepository;

    #[test]
    fn test_match_keyword_case_insensitive_substring() {
        let rules = RuleSnapshot::new(1, ["gun", "knife"], Vec::<String>::new());
        assert_eq!(rules.match_keyword("there is a GUN here"), Some("gun"));
        assert_eq!(rules.match_keyword("pocketknife"), Some("knife"));
        assert_eq!(rules.match_keyword("hello world"), None);
    }

    #[test]
    fn test_empty_rules_match_nothing() {
        let rules = RuleSnapshot::empty();
        assert_eq!(rules.match_keyword("gun"), None);
        assert!(!rules.is_flagged_object("knife"));
    }

    #[test]
    fn test_replace_bumps_version_only_on_change() {
        let store = RuleStore::new();
        assert_eq!(store.version(), 0);

        let v = store.replace(vec!["gun".into(), "knife".into()], vec!["rifle".into()]);
        assert_eq!(v, Some(1));

        let v = store.replace(vec!["gun".into(), "knife".into()], vec!["rifle".into()]);
        assert_eq!(v, None);
        assert_eq!(store.version(), 1);

        // A reorder changes which keyword is reported first.
        let v = store.replace(vec!["knife".into(), "gun".into()], vec!["rifle".into()]);
        assert_eq!(v, Some(2));

        let v = store.replace(vec!["gun".into()], vec!["rifle".into()]);
        assert_eq!(v, Some(3));
    }

    #[test]
    fn test_replace_keeps_rule_order() {
        let store = RuleStore::new();
        store.replace(
            vec!["knife".into(), "gun".into(), "knife".into()],
            vec!["rifle".into(), "bottle".into()],
        );

        let snapshot = store.snapshot();
        assert_eq!(snapshot.keywords, vec!["knife".to_string(), "gun".to_string()]);
        assert_eq!(snapshot.objects, vec!["rifle".to_string(), "bottle".to_string()]);
        assert_eq!(snapshot.match_keyword("a gun and a knife"), Some("knife"));
    }

    #[test]
    fn test_snapshot_is_stable_across_replace() {
        let store = RuleStore::new();
        store.replace(vec!["gun".into()], vec![]);
        let held = store.snapshot();
        store.replace(vec!["knife".into()], vec![]);

        assert_eq!(held.keywords, vec!["gun".to_string()]);
        assert_eq!(store.snapshot().keywords, vec!["knife".to_string()]);
    }

    #[tokio::test]
    async fn test_refresher_reacts_to_change_event() {
        let pool = database::init_pool_with_size("sqlite::memory:", 1)
            .await
            .unwrap();
        database::run_migrations(&pool).await.unwrap();
        let repo = Arc::new(SqlxRuleRepository::new(pool));

        let store = Arc::new(RuleStore::new());
        let events = ConfigEventBroadcaster::new();
        let refresher = RuleRefresher::new(
            store.clone(),
            repo.clone(),
            events.clone(),
            Duration::from_secs(3600),
        );
        let cancel = CancellationToken::new();
        let handle = refresher.start(cancel.clone());

        repo.create_keyword(&ChatKeywordDbModel::new("gun"))
            .await
            .unwrap();
        repo.create_object(&FlaggedObjectDbModel::new("knife"))
            .await
            .unwrap();
        events.publish(ConfigUpdateEvent::KeywordsUpdated);

        let mut snapshot = store.snapshot();
        for _ in 0..100 {
            if snapshot.version > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
            snapshot = store.snapshot();
        }

        assert_eq!(snapshot.keywords, vec!["gun".to_string()]);
        assert!(snapshot.is_flagged_object("KNIFE"));

        cancel.cancel();
        handle.await.unwrap();
    }
}
