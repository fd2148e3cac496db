use std::collections::HashSet;

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::{DateTime, NaiveDateTime};
use tracing::{error, warn};
use uuid::Uuid;

pub const PROFILE_PICTURE_PREFIX: &str = "profile-pictures/";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectEntry {
    pub key: String,
    pub last_modified: Option<NaiveDateTime>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync + 'static {
    async fn put_object(&self, key: &str, bytes: Vec<u8>, content_type: Option<String>)
        -> Result<()>;

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>>;

    async fn delete_object(&self, key: &str) -> Result<()>;
}

pub struct S3Storage {
    client: S3Client,
    bucket: String,
}

impl S3Storage {
    pub fn new(client: S3Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: Option<String>,
    ) -> Result<()> {
        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes));

        if let Some(content_type) = content_type {
            request = request.content_type(content_type);
        }

        request
            .send()
            .await
            .context("failed to upload object to S3")?;

        Ok(())
    }

    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
        let mut entries = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let response = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .context("failed to list objects in S3")?;

            entries.extend(response.contents().iter().filter_map(|object| {
                let key = object.key()?.to_string();
                let last_modified = object
                    .last_modified()
                    .and_then(|at| DateTime::from_timestamp(at.secs(), at.subsec_nanos()))
                    .map(|at| at.naive_utc());
                Some(ObjectEntry { key, last_modified })
            }));

            match response.next_continuation_token() {
                Some(token) if response.is_truncated().unwrap_or(false) => {
                    continuation = Some(token.to_string());
                }
                _ => break,
            }
        }

        Ok(entries)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .context("failed to delete object from S3")?;
        Ok(())
    }
}

/// Uploads `bytes` under `key`, then runs `commit`. When `commit` fails the
/// object is deleted again before the error is returned.
pub async fn put_then_commit<T, E, F>(
    storage: &dyn ObjectStorage,
    key: &str,
    bytes: Vec<u8>,
    content_type: Option<String>,
    commit: F,
) -> Result<T, E>
where
    F: FnOnce() -> Result<T, E>,
    E: From<anyhow::Error>,
{
    storage
        .put_object(key, bytes, content_type)
        .await
        .map_err(|err| {
            error!(error = ?err, %key, "object upload failed");
            E::from(err)
        })?;

    match commit() {
        Ok(value) => Ok(value),
        Err(err) => {
            if let Err(cleanup) = storage.delete_object(key).await {
                warn!(error = ?cleanup, %key, "failed to remove uncommitted object");
            }
            Err(err)
        }
    }
}

/// Stored keys no profile references, limited to objects written before
/// `cutoff`. Objects without a modification time are kept.
pub fn orphaned_keys<'a>(
    stored: &'a [ObjectEntry],
    referenced: &HashSet<String>,
    cutoff: NaiveDateTime,
) -> Vec<&'a str> {
    stored
        .iter()
        .filter(|entry| !referenced.contains(&entry.key))
        .filter(|entry| entry.last_modified.is_some_and(|at| at < cutoff))
        .map(|entry| entry.key.as_str())
        .collect()
}

pub fn profile_picture_key(employee_id: Uuid, extension: &str) -> String {
    format!(
        "{PROFILE_PICTURE_PREFIX}{employee_id}/{}.{extension}",
        Uuid::new_v4()
    )
}

/// Public bucket URL with a cache-busting `v` parameter taken from the
/// profile's last update.
pub fn public_url(base_url: &str, key: &str, version: NaiveDateTime) -> String {
    format!(
        "{}/{}?v={}",
        base_url.trim_end_matches('/'),
        key.trim_start_matches('/'),
        version.and_utc().timestamp()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryStorage {
        objects: Mutex<HashMap<String, Vec<u8>>>,
    }

    impl MemoryStorage {
        fn len(&self) -> usize {
            self.objects.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ObjectStorage for MemoryStorage {
        async fn put_object(
            &self,
            key: &str,
            bytes: Vec<u8>,
            _content_type: Option<String>,
        ) -> Result<()> {
            self.objects.lock().unwrap().insert(key.to_string(), bytes);
            Ok(())
        }

        async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectEntry>> {
            Ok(self
                .objects
                .lock()
                .unwrap()
                .keys()
                .filter(|key| key.starts_with(prefix))
                .map(|key| ObjectEntry {
                    key: key.clone(),
                    last_modified: None,
                })
                .collect())
        }

        async fn delete_object(&self, key: &str) -> Result<()> {
            self.objects.lock().unwrap().remove(key);
            Ok(())
        }
    }

    fn at(timestamp: i64) -> NaiveDateTime {
        DateTime::from_timestamp(timestamp, 0)
            .expect("valid timestamp")
            .naive_utc()
    }

    #[tokio::test]
    async fn failed_commit_removes_uploaded_object() {
        let storage = MemoryStorage::default();
        let result: Result<()> = put_then_commit(
            &storage,
            "profile-pictures/a.png",
            vec![1, 2, 3],
            None,
            || Err(anyhow::anyhow!("profile row vanished")),
        )
        .await;

        assert!(result.is_err());
        assert_eq!(storage.len(), 0);
    }

    #[tokio::test]
    async fn successful_commit_keeps_uploaded_object() {
        let storage = MemoryStorage::default();
        let result: Result<u8> = put_then_commit(
            &storage,
            "profile-pictures/a.png",
            vec![1, 2, 3],
            Some("image/png".to_string()),
            || Ok(7),
        )
        .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(storage.len(), 1);
    }

    #[test]
    fn orphans_skip_referenced_and_recent_objects() {
        let cutoff = at(1_700_000_000);
        let stored = vec![
            ObjectEntry {
                key: "profile-pictures/referenced.png".to_string(),
                last_modified: Some(cutoff - Duration::days(3)),
            },
            ObjectEntry {
                key: "profile-pictures/stale.png".to_string(),
                last_modified: Some(cutoff - Duration::hours(2)),
            },
            ObjectEntry {
                key: "profile-pictures/in-flight.png".to_string(),
                last_modified: Some(cutoff + Duration::minutes(5)),
            },
            ObjectEntry {
                key: "profile-pictures/unknown-age.png".to_string(),
                last_modified: None,
            },
        ];
        let referenced: HashSet<String> =
            HashSet::from(["profile-pictures/referenced.png".to_string()]);

        assert_eq!(
            orphaned_keys(&stored, &referenced, cutoff),
            vec!["profile-pictures/stale.png"]
        );
    }

    #[test]
    fn picture_keys_are_scoped_per_employee() {
        let employee_id = Uuid::new_v4();
        let key = profile_picture_key(employee_id, "png");
        assert!(key.starts_with(&format!("{PROFILE_PICTURE_PREFIX}{employee_id}/")));
        assert!(key.ends_with(".png"));
        assert_ne!(key, profile_picture_key(employee_id, "png"));
    }

    #[test]
    fn public_url_appends_version() {
        let version = at(1_700_000_000);
        assert_eq!(
            public_url("https://cdn.example.com/bucket/", "/profile-pictures/a.png", version),
            "https://cdn.example.com/bucket/profile-pictures/a.png?v=1700000000"
        );
    }
}
