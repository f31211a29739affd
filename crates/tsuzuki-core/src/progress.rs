//! Saving, merging, looking up and pruning progress records.

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::config::{ResumeConfig, RetentionConfig};
use crate::error::TsuzukiError;
use crate::identity::{content_key_for, legacy_keys};
use crate::messages::SaveProgressRequest;
use crate::models::{percent_complete, ContentType, StoredProgressRecord};
use crate::normalize::{identity_text, url_identity};
use crate::storage::ProgressStore;

/// What a save did to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveOutcome {
    pub content_key: String,
    /// Legacy keys removed and dropped from the index.
    pub migrated: Vec<String>,
    /// Other episodes of the same series that were pruned.
    pub superseded: Vec<String>,
}

/// Whether a stored record is worth offering to resume.
pub fn should_offer_resume(record: &StoredProgressRecord, policy: &ResumeConfig) -> bool {
    record.current_time > policy.min_seconds && record.percent_complete < policy.max_percent
}

/// Store merger and query front-end over a [`ProgressStore`].
pub struct ProgressService<S> {
    store: S,
    retention: RetentionConfig,
}

impl<S: ProgressStore> ProgressService<S> {
    pub fn new(store: S, retention: RetentionConfig) -> Self {
        Self { store, retention }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Write the record for `request` and reconcile the rest of the store.
    ///
    /// Episodes also migrate away legacy keys and prune every other episodic
    /// record of the same series on the same platform, so only the newest
    /// episode is kept. Re-running with identical input leaves the store
    /// unchanged.
    pub fn save(
        &mut self,
        request: &SaveProgressRequest,
        now: DateTime<Utc>,
    ) -> Result<SaveOutcome, TsuzukiError> {
        let mut meta = request.metadata.clone();
        meta.escalate_content_type();
        let key = content_key_for(&meta);

        let record = StoredProgressRecord {
            content_key: key.clone(),
            url: meta.url.clone(),
            title: meta.title.clone(),
            current_time: request.current_time,
            duration: request.duration,
            percent_complete: percent_complete(request.current_time, request.duration),
            last_watched: now,
            platform: meta.platform.clone(),
            content_type: meta.content_type,
            episode_number: meta.episode_number,
            season_number: meta.season_number,
            series_title: meta.series_title.clone(),
            episode_name: meta.episode_name.clone(),
            original_title: (!meta.original_title.is_empty()).then(|| meta.original_title.clone()),
        };
        self.store.put(&record)?;

        let mut tracked = self.store.tracked_keys()?;
        if !tracked.contains(&key) {
            tracked.push(key.clone());
        }

        let mut outcome = SaveOutcome {
            content_key: key.clone(),
            migrated: Vec::new(),
            superseded: Vec::new(),
        };

        if meta.content_type == ContentType::Episode {
            for legacy in legacy_keys(&meta) {
                let removed = self.store.remove(&legacy)?;
                let was_tracked = tracked.contains(&legacy);
                if removed || was_tracked {
                    tracked.retain(|k| *k != legacy);
                    outcome.migrated.push(legacy);
                }
            }

            let series = identity_text(&record.series_name());
            let platform = identity_text(&record.platform);
            for other in self.store.all_records()? {
                if other.content_key == key
                    || identity_text(&other.platform) != platform
                    || identity_text(&other.series_name()) != series
                    || !other.looks_episodic()
                {
                    continue;
                }
                self.store.remove(&other.content_key)?;
                tracked.retain(|k| *k != other.content_key);
                outcome.superseded.push(other.content_key);
            }
        }

        self.store.set_tracked_keys(&tracked)?;

        if !outcome.migrated.is_empty() || !outcome.superseded.is_empty() {
            info!(
                key = %key,
                migrated = outcome.migrated.len(),
                superseded = outcome.superseded.len(),
                "Merged progress records"
            );
        } else {
            debug!(key = %key, time = request.current_time, "Saved progress");
        }
        Ok(outcome)
    }

    /// Find the stored record for a page URL.
    ///
    /// Exact `origin + path` match among tracked records first, then substring
    /// containment either way, then the same two passes over every record in
    /// the store.
    pub fn get_progress(&self, url: &str) -> Result<Option<StoredProgressRecord>, TsuzukiError> {
        let wanted = url_identity(url);
        if wanted.is_empty() {
            return Ok(None);
        }

        let mut tracked = Vec::new();
        for key in self.store.tracked_keys()? {
            if let Some(record) = self.store.get(&key)? {
                tracked.push(record);
            }
        }
        if let Some(found) = match_url(&wanted, tracked) {
            return Ok(Some(found));
        }

        debug!(url = %wanted, "No tracked match, scanning whole store");
        Ok(match_url(&wanted, self.store.all_records()?))
    }

    /// Drop records that are both older than the retention window and
    /// essentially finished. Returns the removed keys.
    pub fn prune_finished(&mut self, now: DateTime<Utc>) -> Result<Vec<String>, TsuzukiError> {
        let cutoff = now - Duration::days(i64::from(self.retention.max_age_days));
        let mut removed = Vec::new();
        for record in self.store.all_records()? {
            if record.last_watched < cutoff && record.percent_complete >= self.retention.completed_percent {
                self.store.remove(&record.content_key)?;
                removed.push(record.content_key);
            }
        }
        if !removed.is_empty() {
            let mut tracked = self.store.tracked_keys()?;
            tracked.retain(|k| !removed.contains(k));
            self.store.set_tracked_keys(&tracked)?;
            info!(count = removed.len(), "Pruned finished progress records");
        }
        Ok(removed)
    }

    pub fn tracked_keys(&self) -> Result<Vec<String>, TsuzukiError> {
        self.store.tracked_keys()
    }
}

fn match_url(wanted: &str, records: Vec<StoredProgressRecord>) -> Option<StoredProgressRecord> {
    let identities: Vec<String> = records.iter().map(|r| url_identity(&r.url)).collect();
    if let Some(pos) = identities.iter().position(|id| id == wanted) {
        return records.into_iter().nth(pos);
    }
    let pos = identities
        .iter()
        .position(|id| !id.is_empty() && (id.contains(wanted) || wanted.contains(id.as_str())))?;
    records.into_iter().nth(pos)
}
