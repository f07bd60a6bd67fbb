use anyhow::Context;
use bytes::Bytes;
use tracing::warn;
use uuid::Uuid;

use crate::error::{ApiError, FieldError};
use crate::storage::{ObjectStorage, StoredObject};

/// Upload ceiling for profile images.
pub const MAX_AVATAR_BYTES: usize = 5 * 1024 * 1024;

pub struct AvatarUpload {
    pub body: Bytes,
    pub content_type: String,
}

fn ext_from_mime(ct: &str) -> Option<&'static str> {
    match ct {
        "image/jpeg" | "image/jpg" => Some("jpg"),
        "image/png" => Some("png"),
        _ => None,
    }
}

/// Check the upload against the avatar constraints, reporting every
/// violation at once.
pub fn validate_avatar(upload: &AvatarUpload) -> Result<(), ApiError> {
    let mut errors = Vec::new();
    if ext_from_mime(&upload.content_type).is_none() {
        errors.push(FieldError::new(
            "image",
            "Only image files (jpg, jpeg, png) are allowed",
        ));
    }
    if upload.body.len() > MAX_AVATAR_BYTES {
        errors.push(FieldError::new(
            "image",
            "Image size should be less than 5MB",
        ));
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ApiError::Validation(errors))
    }
}

fn avatar_key(user_name: &str, content_type: &str) -> String {
    let ext = ext_from_mime(content_type).unwrap_or("bin");
    format!("avatars/{}/{}.{}", user_name, Uuid::new_v4(), ext)
}

/// Validate and persist a profile image, returning the stored reference.
pub async fn store_avatar(
    storage: &dyn ObjectStorage,
    user_name: &str,
    upload: AvatarUpload,
) -> Result<StoredObject, ApiError> {
    validate_avatar(&upload)?;
    let key = avatar_key(user_name, &upload.content_type);
    let stored = storage
        .upload(&key, upload.body, &upload.content_type)
        .await
        .with_context(|| format!("upload avatar {key}"))?;
    Ok(stored)
}

/// Best-effort removal of an uploaded avatar whose account never
/// materialized. A failed delete only leaks the object; the caller's own
/// error stays the one reported.
pub async fn discard_avatar(storage: &dyn ObjectStorage, external_id: &str) {
    if let Err(error) = storage.delete(external_id).await {
        warn!(external_id = %external_id, error = %error, "orphaned avatar cleanup failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::async_trait;

    struct FakeStorage;

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn upload(
            &self,
            key: &str,
            _body: Bytes,
            _content_type: &str,
        ) -> anyhow::Result<StoredObject> {
            Ok(StoredObject {
                url: format!("https://cdn.test/{key}"),
                external_id: key.to_string(),
            })
        }

        async fn delete(&self, _external_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn upload(content_type: &str, size: usize) -> AvatarUpload {
        AvatarUpload {
            body: Bytes::from(vec![0u8; size]),
            content_type: content_type.to_string(),
        }
    }

    #[test]
    fn test_ext_from_mime() {
        assert_eq!(ext_from_mime("image/jpeg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/jpg"), Some("jpg"));
        assert_eq!(ext_from_mime("image/png"), Some("png"));
        assert_eq!(ext_from_mime("image/webp"), None);
        assert_eq!(ext_from_mime("application/octet-stream"), None);
    }

    #[test]
    fn rejects_unknown_formats() {
        let err = validate_avatar(&upload("image/gif", 10)).unwrap_err();
        match err {
            ApiError::Validation(errors) => assert_eq!(
                errors,
                vec![FieldError::new(
                    "image",
                    "Only image files (jpg, jpeg, png) are allowed"
                )]
            ),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn rejects_oversized_uploads() {
        let err = validate_avatar(&upload("image/png", MAX_AVATAR_BYTES + 1)).unwrap_err();
        match err {
            ApiError::Validation(errors) => assert_eq!(
                errors,
                vec![FieldError::new("image", "Image size should be less than 5MB")]
            ),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn accepts_an_image_at_the_size_limit() {
        assert!(validate_avatar(&upload("image/png", MAX_AVATAR_BYTES)).is_ok());
    }

    #[test]
    fn avatar_keys_are_scoped_to_the_user() {
        let key = avatar_key("alice", "image/png");
        assert!(key.starts_with("avatars/alice/"));
        assert!(key.ends_with(".png"));
    }

    #[tokio::test]
    async fn store_avatar_returns_the_public_reference() {
        let stored = store_avatar(&FakeStorage, "alice", upload("image/jpeg", 128))
            .await
            .unwrap();
        assert!(stored.url.starts_with("https://cdn.test/avatars/alice/"));
        assert!(stored.external_id.starts_with("avatars/alice/"));
        assert!(stored.external_id.ends_with(".jpg"));
    }

    #[tokio::test]
    async fn store_avatar_refuses_invalid_uploads() {
        let err = store_avatar(&FakeStorage, "alice", upload("image/gif", 128))
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[tokio::test]
    async fn discard_avatar_deletes_the_stored_object() {
        use std::sync::Mutex;

        struct RecordingStorage(Mutex<Vec<String>>);

        #[async_trait]
        impl ObjectStorage for RecordingStorage {
            async fn upload(
                &self,
                key: &str,
                _body: Bytes,
                _content_type: &str,
            ) -> anyhow::Result<StoredObject> {
                Ok(StoredObject {
                    url: format!("https://cdn.test/{key}"),
                    external_id: key.to_string(),
                })
            }

            async fn delete(&self, external_id: &str) -> anyhow::Result<()> {
                self.0.lock().unwrap().push(external_id.to_string());
                Ok(())
            }
        }

        let storage = RecordingStorage(Mutex::new(Vec::new()));
        discard_avatar(&storage, "avatars/alice/orphan.png").await;
        assert_eq!(
            *storage.0.lock().unwrap(),
            vec!["avatars/alice/orphan.png".to_string()]
        );
    }

    #[tokio::test]
    async fn discard_avatar_swallows_delete_failures() {
        struct BrokenStorage;

        #[async_trait]
        impl ObjectStorage for BrokenStorage {
            async fn upload(
                &self,
                _key: &str,
                _body: Bytes,
                _content_type: &str,
            ) -> anyhow::Result<StoredObject> {
                anyhow::bail!("unreachable in this test")
            }

            async fn delete(&self, _external_id: &str) -> anyhow::Result<()> {
                anyhow::bail!("bucket unavailable")
            }
        }

        // Only logged; the caller still reports its own failure.
        discard_avatar(&BrokenStorage, "avatars/alice/orphan.png").await;
    }
}
