//! Document-retrieval boundary and an in-memory implementation backed by a dataset file

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::path::Path;
use uuid::Uuid;

use crate::data::{
    ActivityEvent, Artist, Dataset, GoalState, ListenerRecord, NewArtist, TextItem,
    TrackingSnapshot,
};
use crate::error::{AnalyticsError, Result};
use crate::recommendations::Recommendation;

/// Everything the services need to fetch or persist.
///
/// Fetches return owned copies; an unknown artist yields empty collections,
/// not an error.
pub trait AudienceStore: Send + Sync {
    fn listeners(&self, artist_id: &str) -> Result<Vec<ListenerRecord>>;

    fn activity(&self, artist_id: &str) -> Result<Vec<ActivityEvent>>;

    fn comments(&self, artist_id: &str) -> Result<Vec<TextItem>>;

    /// Ascending by date
    fn snapshots(&self, artist_id: &str) -> Result<Vec<TrackingSnapshot>>;

    fn insert_snapshot(&self, snapshot: TrackingSnapshot) -> Result<()>;

    /// Established artists eligible as mentors
    fn artists(&self) -> Result<Vec<Artist>>;

    fn new_artist(&self, artist_id: &str) -> Result<Option<NewArtist>>;

    fn insert_new_artist(&self, artist: NewArtist) -> Result<()>;

    /// Replace goals wholesale and stamp `last_updated`
    fn update_goals(&self, artist_id: &str, goals: GoalState, now: DateTime<Utc>) -> Result<()>;

    fn touch(&self, artist_id: &str, now: DateTime<Utc>) -> Result<()>;

    fn recommendations(&self, artist_id: &str) -> Result<Vec<Recommendation>>;

    fn recommendation(&self, id: Uuid) -> Result<Option<Recommendation>>;

    /// Insert or overwrite by id
    fn save_recommendation(&self, recommendation: Recommendation) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    listeners: DashMap<String, Vec<ListenerRecord>>,
    activity: DashMap<String, Vec<ActivityEvent>>,
    comments: DashMap<String, Vec<TextItem>>,
    snapshots: DashMap<String, Vec<TrackingSnapshot>>,
    artists: DashMap<String, Artist>,
    new_artists: DashMap<String, NewArtist>,
    recommendations: DashMap<Uuid, Recommendation>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_dataset(dataset: Dataset) -> Self {
        let store = Self::new();

        for listener in dataset.listeners {
            store
                .listeners
                .entry(listener.artist_id.clone())
                .or_default()
                .push(listener);
        }
        for event in dataset.activity {
            store
                .activity
                .entry(event.artist_id.clone())
                .or_default()
                .push(event);
        }
        for comment in dataset.comments {
            store
                .comments
                .entry(comment.artist_id.clone())
                .or_default()
                .push(comment);
        }
        for snapshot in dataset.snapshots {
            store
                .snapshots
                .entry(snapshot.artist_id.clone())
                .or_default()
                .push(snapshot);
        }
        for mut entry in store.snapshots.iter_mut() {
            entry.value_mut().sort_by_key(|s| s.date);
        }
        for artist in dataset.artists {
            store.artists.insert(artist.artist_id.clone(), artist);
        }
        for artist in dataset.new_artists {
            store.new_artists.insert(artist.artist_id.clone(), artist);
        }
        for rec in dataset.recommendations {
            store.recommendations.insert(rec.id, rec);
        }

        tracing::debug!(
            artists = store.artists.len(),
            new_artists = store.new_artists.len(),
            "in-memory store populated"
        );
        store
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::from_dataset(Dataset::from_json_file(path)?))
    }

    fn with_new_artist(&self, artist_id: &str, f: impl FnOnce(&mut NewArtist)) -> Result<()> {
        let mut artist = self
            .new_artists
            .get_mut(artist_id)
            .ok_or_else(|| AnalyticsError::NotFound(format!("artist {}", artist_id)))?;
        f(artist.value_mut());
        Ok(())
    }
}

fn cloned<T: Clone>(map: &DashMap<String, Vec<T>>, artist_id: &str) -> Vec<T> {
    map.get(artist_id).map(|v| v.clone()).unwrap_or_default()
}

impl AudienceStore for InMemoryStore {
    fn listeners(&self, artist_id: &str) -> Result<Vec<ListenerRecord>> {
        Ok(cloned(&self.listeners, artist_id))
    }

    fn activity(&self, artist_id: &str) -> Result<Vec<ActivityEvent>> {
        Ok(cloned(&self.activity, artist_id))
    }

    fn comments(&self, artist_id: &str) -> Result<Vec<TextItem>> {
        Ok(cloned(&self.comments, artist_id))
    }

    fn snapshots(&self, artist_id: &str) -> Result<Vec<TrackingSnapshot>> {
        Ok(cloned(&self.snapshots, artist_id))
    }

    fn insert_snapshot(&self, snapshot: TrackingSnapshot) -> Result<()> {
        let mut entry = self.snapshots.entry(snapshot.artist_id.clone()).or_default();
        // Keep ascending order; same-day entries stay in insertion order
        let at = entry.partition_point(|s| s.date <= snapshot.date);
        entry.insert(at, snapshot);
        Ok(())
    }

    fn artists(&self) -> Result<Vec<Artist>> {
        let mut artists: Vec<Artist> = self.artists.iter().map(|a| a.value().clone()).collect();
        artists.sort_by(|a, b| a.artist_id.cmp(&b.artist_id));
        Ok(artists)
    }

    fn new_artist(&self, artist_id: &str) -> Result<Option<NewArtist>> {
        Ok(self.new_artists.get(artist_id).map(|a| a.value().clone()))
    }

    fn insert_new_artist(&self, artist: NewArtist) -> Result<()> {
        self.new_artists.insert(artist.artist_id.clone(), artist);
        Ok(())
    }

    fn update_goals(&self, artist_id: &str, goals: GoalState, now: DateTime<Utc>) -> Result<()> {
        self.with_new_artist(artist_id, |artist| {
            artist.goals = goals;
            artist.last_updated = Some(now);
        })
    }

    fn touch(&self, artist_id: &str, now: DateTime<Utc>) -> Result<()> {
        self.with_new_artist(artist_id, |artist| artist.last_updated = Some(now))
    }

    fn recommendations(&self, artist_id: &str) -> Result<Vec<Recommendation>> {
        let mut recs: Vec<Recommendation> = self
            .recommendations
            .iter()
            .filter(|r| r.artist_id == artist_id)
            .map(|r| r.value().clone())
            .collect();
        recs.sort_by_key(|r| r.created_at);
        Ok(recs)
    }

    fn recommendation(&self, id: Uuid) -> Result<Option<Recommendation>> {
        Ok(self.recommendations.get(&id).map(|r| r.value().clone()))
    }

    fn save_recommendation(&self, recommendation: Recommendation) -> Result<()> {
        self.recommendations.insert(recommendation.id, recommendation);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SnapshotMetrics;
    use chrono::NaiveDate;

    fn snapshot(artist_id: &str, day: u32, followers: u64) -> TrackingSnapshot {
        TrackingSnapshot {
            artist_id: artist_id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            metrics: SnapshotMetrics {
                followers,
                streams: followers * 10,
                engagement_rate: 0.05,
            },
            notes: None,
            milestones_hit: Vec::new(),
            progress_score: 0.0,
            recommendations_followed: Vec::new(),
        }
    }

    #[test]
    fn test_dataset_grouped_by_artist() {
        let dataset = Dataset {
            listeners: vec![
                ListenerRecord {
                    listener_id: "l1".into(),
                    artist_id: "a1".into(),
                    ..Default::default()
                },
                ListenerRecord {
                    listener_id: "l2".into(),
                    artist_id: "a2".into(),
                    ..Default::default()
                },
            ],
            snapshots: vec![snapshot("a1", 9, 30), snapshot("a1", 2, 10)],
            ..Default::default()
        };
        let store = InMemoryStore::from_dataset(dataset);

        assert_eq!(store.listeners("a1").unwrap().len(), 1);
        assert!(store.listeners("missing").unwrap().is_empty());

        let followers: Vec<u64> = store
            .snapshots("a1")
            .unwrap()
            .iter()
            .map(|s| s.metrics.followers)
            .collect();
        assert_eq!(followers, vec![10, 30]);
    }

    #[test]
    fn test_insert_snapshot_keeps_order() {
        let store = InMemoryStore::new();
        store.insert_snapshot(snapshot("a1", 10, 100)).unwrap();
        store.insert_snapshot(snapshot("a1", 3, 30)).unwrap();
        store.insert_snapshot(snapshot("a1", 10, 110)).unwrap();

        let followers: Vec<u64> = store
            .snapshots("a1")
            .unwrap()
            .iter()
            .map(|s| s.metrics.followers)
            .collect();
        assert_eq!(followers, vec![30, 100, 110]);
    }

    #[test]
    fn test_update_goals_unknown_artist() {
        let store = InMemoryStore::new();
        let err = store
            .update_goals("ghost", GoalState::default(), Utc::now())
            .unwrap_err();
        assert!(matches!(err, AnalyticsError::NotFound(_)));
    }
}
