use crate::config::PhotoConfig;
use crate::keyspace;

/// Retrieval URL for a stored photo. Local development addresses the object
/// store directly; production serves `/uploads/*` through the CDN as a
/// relative path.
pub fn photo_url(config: &PhotoConfig, key: &str) -> String {
    match &config.endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint, config.bucket, key),
        None => format!("/{}", key),
    }
}

/// Object key for a fresh upload, namespaced by uploader.
pub fn upload_key(user_id: &str, file_name: &str) -> String {
    let ext = file_name.rsplit('.').next().filter(|e| !e.is_empty());
    format!(
        "uploads/{}/{}.{}",
        user_id,
        keyspace::new_id(),
        ext.unwrap_or("jpg")
    )
}

/// Short-lived upload URL for the given object key. Signing is delegated to
/// the storage endpoint; this layer only decides where uploads go.
pub fn upload_url(config: &PhotoConfig, key: &str, content_type: &str) -> String {
    let base = match &config.endpoint {
        Some(endpoint) => format!("{}/{}/{}", endpoint, config.bucket, key),
        None => format!("/{}", key),
    };
    format!("{}?contentType={}", base, content_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> PhotoConfig {
        PhotoConfig {
            endpoint: Some("http://localhost:9000".to_string()),
            bucket: "brewlog-photos".to_string(),
        }
    }

    #[test]
    fn dev_urls_hit_the_endpoint_directly() {
        let url = photo_url(&dev_config(), "uploads/u1/abc.jpg");
        assert_eq!(url, "http://localhost:9000/brewlog-photos/uploads/u1/abc.jpg");
    }

    #[test]
    fn production_urls_are_relative() {
        let config = PhotoConfig {
            endpoint: None,
            bucket: "brewlog-photos".to_string(),
        };
        assert_eq!(photo_url(&config, "uploads/u1/abc.jpg"), "/uploads/u1/abc.jpg");
    }

    #[test]
    fn upload_keys_keep_the_extension() {
        let key = upload_key("u1", "latte.png");
        assert!(key.starts_with("uploads/u1/"));
        assert!(key.ends_with(".png"));
        assert!(upload_key("u1", "trailing-dot.").ends_with(".jpg"));
    }
}
