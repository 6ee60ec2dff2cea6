use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, RequestBuilder, StatusCode};

use super::{ObjectStore, ObjectStoreError, PutOptions};

/// Supabase storage API backend (bucket objects over HTTP).
pub struct SupabaseStore {
    base_url: String,
    bucket: String,
    client: Client,
    service_key: String,
}

impl SupabaseStore {
    pub fn new(base_url: &str, service_key: &str, bucket: &str) -> Result<Self, anyhow::Error> {
        let client = Client::builder().build()?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            bucket: bucket.to_string(),
            client,
            service_key: service_key.to_string(),
        })
    }

    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/object/{}/{}",
            self.base_url, self.bucket, key
        )
    }

    fn bucket_url(&self) -> String {
        format!("{}/storage/v1/object/{}", self.base_url, self.bucket)
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .bearer_auth(&self.service_key)
            .header("apikey", &self.service_key)
    }
}

/// The response body stays in the logs; callers only see the action and status.
async fn backend_error(action: &str, resp: reqwest::Response) -> ObjectStoreError {
    let status = resp.status();
    let body = resp.text().await.unwrap_or_default();
    tracing::warn!(action, status = %status, body = %body, "Storage request rejected");
    status_error(action, status)
}

fn status_error(action: &str, status: StatusCode) -> ObjectStoreError {
    ObjectStoreError::Backend(format!("Storage {action} failed ({status})"))
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    async fn put(
        &self,
        key: &str,
        data: Bytes,
        options: &PutOptions,
    ) -> Result<(), ObjectStoreError> {
        let resp = self
            .authorized(self.client.post(self.object_url(key)))
            .header("Content-Type", &options.content_type)
            .header("Cache-Control", options.cache_control_header())
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if !resp.status().is_success() {
            return Err(backend_error("upload", resp).await);
        }

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, ObjectStoreError> {
        let resp = self
            .authorized(self.client.get(self.object_url(key)))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }

        if !resp.status().is_success() {
            return Err(backend_error("download", resp).await);
        }

        resp.bytes()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))
    }

    async fn delete(&self, key: &str) -> Result<(), ObjectStoreError> {
        let resp = self
            .authorized(self.client.delete(self.bucket_url()))
            .json(&serde_json::json!({ "prefixes": [key] }))
            .send()
            .await
            .map_err(|e| ObjectStoreError::Backend(e.to_string()))?;

        // 404 is fine -- object already gone
        if !resp.status().is_success() && resp.status() != StatusCode::NOT_FOUND {
            return Err(backend_error("delete", resp).await);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls() {
        let store = SupabaseStore::new("https://proj.supabase.co/", "key", "files").unwrap();
        assert_eq!(
            store.object_url("abc.png"),
            "https://proj.supabase.co/storage/v1/object/files/abc.png"
        );
        assert_eq!(
            store.bucket_url(),
            "https://proj.supabase.co/storage/v1/object/files"
        );
    }

    #[test]
    fn test_status_error_omits_response_body() {
        let err = status_error("upload", StatusCode::BAD_REQUEST);
        assert_eq!(
            err.to_string(),
            "Backend error: Storage upload failed (400 Bad Request)"
        );
    }

    #[test]
    fn test_cache_control_header() {
        let options = PutOptions {
            content_type: "image/png".to_string(),
            cache_control: 3600,
        };
        assert_eq!(options.cache_control_header(), "max-age=3600");
    }
}
