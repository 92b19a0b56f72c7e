//! Story document repository.

use std::collections::HashMap;

use fabula_models::{AssetHandles, StoryId, StoryRecord, StoryStatus};
use tracing::debug;

use crate::client::FirestoreClient;
use crate::error::{FirestoreError, FirestoreResult};
use crate::retry::with_retry;
use crate::types::{Document, FromFirestoreValue, MapValue, ToFirestoreValue, Value};

const COLLECTION: &str = "stories";

/// Repository over the `stories` collection.
#[derive(Clone)]
pub struct StoryRepository {
    client: FirestoreClient,
}

impl StoryRepository {
    pub fn new(client: FirestoreClient) -> Self {
        Self { client }
    }

    /// Create the story document. Fails if the ID already exists.
    pub async fn create(&self, record: &StoryRecord) -> FirestoreResult<()> {
        let fields = record_to_fields(record);
        with_retry(self.client.retry_config(), "story_create", || {
            let fields = fields.clone();
            async move {
                self.client
                    .create_document(COLLECTION, record.id.as_str(), fields)
                    .await
            }
        })
        .await?;
        debug!(story_id = %record.id, "story document created");
        Ok(())
    }

    /// Fetch a story by ID.
    pub async fn get(&self, id: &StoryId) -> FirestoreResult<Option<StoryRecord>> {
        let doc = with_retry(self.client.retry_config(), "story_get", || async {
            self.client.get_document(COLLECTION, id.as_str()).await
        })
        .await?;

        doc.map(|d| document_to_record(id, &d)).transpose()
    }

    /// Persist the full mutable field set of the record.
    pub async fn update(&self, record: &StoryRecord) -> FirestoreResult<()> {
        let fields = record_to_fields(record);
        let mask = mutable_field_mask();
        with_retry(self.client.retry_config(), "story_update", || {
            let fields = fields.clone();
            let mask = mask.clone();
            async move {
                self.client
                    .update_document(COLLECTION, record.id.as_str(), fields, Some(mask))
                    .await
            }
        })
        .await?;
        Ok(())
    }

    /// Mark the story completed with its published asset URLs.
    pub async fn mark_completed(&self, record: &StoryRecord) -> FirestoreResult<()> {
        debug_assert_eq!(record.status, StoryStatus::Completed);
        self.update(record).await
    }

    /// Mark the story failed with an error message.
    pub async fn mark_failed(&self, record: &StoryRecord) -> FirestoreResult<()> {
        debug_assert_eq!(record.status, StoryStatus::Failed);
        self.update(record).await
    }

    /// Delete a story document. Absent documents are a no-op.
    pub async fn delete(&self, id: &StoryId) -> FirestoreResult<()> {
        with_retry(self.client.retry_config(), "story_delete", || async {
            self.client.delete_document(COLLECTION, id.as_str()).await
        })
        .await
    }
}

/// Fields written on every update (everything except the identity and
/// creation timestamp).
fn mutable_field_mask() -> Vec<String> {
    [
        "title",
        "prompt_text",
        "status",
        "image_urls",
        "audio_url",
        "video_url",
        "asset_handles",
        "error_message",
        "updated_at",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn handles_to_value(handles: &AssetHandles) -> Value {
    let mut fields = HashMap::new();
    fields.insert("images".to_string(), handles.images.to_firestore_value());
    fields.insert("audio".to_string(), handles.audio.to_firestore_value());
    fields.insert("video".to_string(), handles.video.to_firestore_value());
    Value::MapValue(MapValue {
        fields: Some(fields),
    })
}

fn handles_from_value(value: &Value) -> AssetHandles {
    let Value::MapValue(map) = value else {
        return AssetHandles::default();
    };
    let Some(fields) = &map.fields else {
        return AssetHandles::default();
    };
    AssetHandles {
        images: fields
            .get("images")
            .and_then(Vec::<String>::from_firestore_value)
            .unwrap_or_default(),
        audio: fields
            .get("audio")
            .and_then(Option::<String>::from_firestore_value)
            .flatten(),
        video: fields
            .get("video")
            .and_then(Option::<String>::from_firestore_value)
            .flatten(),
    }
}

/// Map a record into Firestore fields.
fn record_to_fields(record: &StoryRecord) -> HashMap<String, Value> {
    let mut fields = HashMap::new();
    fields.insert("user_id".to_string(), record.user_id.to_firestore_value());
    fields.insert("title".to_string(), record.title.to_firestore_value());
    fields.insert(
        "prompt_text".to_string(),
        record.prompt_text.to_firestore_value(),
    );
    fields.insert(
        "status".to_string(),
        record.status.as_str().to_firestore_value(),
    );
    fields.insert(
        "image_urls".to_string(),
        record.image_urls.to_firestore_value(),
    );
    fields.insert("audio_url".to_string(), record.audio_url.to_firestore_value());
    fields.insert("video_url".to_string(), record.video_url.to_firestore_value());
    fields.insert(
        "asset_handles".to_string(),
        handles_to_value(&record.asset_handles),
    );
    fields.insert(
        "error_message".to_string(),
        record.error_message.to_firestore_value(),
    );
    fields.insert(
        "created_at".to_string(),
        record.created_at.to_firestore_value(),
    );
    fields.insert(
        "updated_at".to_string(),
        record.updated_at.to_firestore_value(),
    );
    fields
}

/// Map a Firestore document back into a record.
fn document_to_record(id: &StoryId, doc: &Document) -> FirestoreResult<StoryRecord> {
    let status_str: String = doc
        .get("status")
        .ok_or_else(|| FirestoreError::invalid_response("missing status field"))?;
    let status = StoryStatus::parse(&status_str)
        .ok_or_else(|| FirestoreError::invalid_response(format!("unknown status: {status_str}")))?;

    Ok(StoryRecord {
        id: id.clone(),
        user_id: doc
            .get("user_id")
            .ok_or_else(|| FirestoreError::invalid_response("missing user_id field"))?,
        title: doc.get("title").unwrap_or_default(),
        prompt_text: doc.get("prompt_text").unwrap_or_default(),
        status,
        image_urls: doc.get("image_urls").unwrap_or_default(),
        audio_url: doc.get::<Option<String>>("audio_url").flatten(),
        video_url: doc.get::<Option<String>>("video_url").flatten(),
        asset_handles: doc
            .fields
            .as_ref()
            .and_then(|f| f.get("asset_handles"))
            .map(handles_from_value)
            .unwrap_or_default(),
        error_message: doc.get::<Option<String>>("error_message").flatten(),
        created_at: doc
            .get("created_at")
            .ok_or_else(|| FirestoreError::invalid_response("missing created_at field"))?,
        updated_at: doc
            .get("updated_at")
            .ok_or_else(|| FirestoreError::invalid_response("missing updated_at field"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record() -> StoryRecord {
        let record = StoryRecord::new("user42", "The Lighthouse", "A keeper finds an old map.");
        record.complete(
            vec!["https://cdn/1.png".into(), "https://cdn/2.png".into()],
            Some("https://cdn/n.mp3".into()),
            None,
            AssetHandles {
                images: vec!["stories/x/images/1.png".into()],
                audio: Some("stories/x/audio/n.mp3".into()),
                video: None,
            },
        )
    }

    #[test]
    fn test_record_field_round_trip() {
        let record = sample_record();
        let fields = record_to_fields(&record);
        let doc = Document::new(fields);
        let back = document_to_record(&record.id, &doc).unwrap();

        assert_eq!(back.user_id, record.user_id);
        assert_eq!(back.status, StoryStatus::Completed);
        assert_eq!(back.image_urls, record.image_urls);
        assert_eq!(back.audio_url, record.audio_url);
        assert_eq!(back.video_url, None);
        assert_eq!(back.asset_handles, record.asset_handles);
        assert_eq!(back.error_message, None);
    }

    #[test]
    fn test_unknown_status_rejected() {
        let record = sample_record();
        let mut fields = record_to_fields(&record);
        fields.insert("status".to_string(), "archived".to_firestore_value());
        let doc = Document::new(fields);
        assert!(document_to_record(&record.id, &doc).is_err());
    }

    #[test]
    fn test_mutable_mask_excludes_identity() {
        let mask = mutable_field_mask();
        assert!(!mask.contains(&"user_id".to_string()));
        assert!(!mask.contains(&"created_at".to_string()));
        assert!(mask.contains(&"status".to_string()));
        assert!(mask.contains(&"error_message".to_string()));
    }
}
