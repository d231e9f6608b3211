//! OpenDAL Operator factory for strand storage backends

use anyhow::{Context, Result};
use opendal::Operator;
use strand_core::config::{StorageBackend, StorageConfig};

/// Static S3 credentials
#[derive(Debug, Clone)]
pub struct S3Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl S3Credentials {
    /// Read `AWS_ACCESS_KEY_ID` / `AWS_SECRET_ACCESS_KEY`, if both are set.
    pub fn from_env() -> Option<Self> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").ok()?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").ok()?;
        Some(S3Credentials {
            access_key_id,
            secret_access_key,
        })
    }
}

/// Build an operator for the configured backend.
///
/// S3 credentials come from the environment; use [`build_s3_operator`] to
/// pass them explicitly.
pub fn build_operator(cfg: &StorageConfig) -> Result<Operator> {
    match cfg.backend {
        StorageBackend::Memory => {
            let op = Operator::new(opendal::services::Memory::default())
                .context("creating OpenDAL memory operator")?
                .finish();
            Ok(op)
        }
        StorageBackend::Fs => {
            let root = cfg
                .root
                .as_ref()
                .context("storage.root is required for the fs backend")?;
            let builder = opendal::services::Fs::default().root(&root.to_string_lossy());
            let op = Operator::new(builder)
                .context("creating OpenDAL fs operator")?
                .layer(opendal::layers::LoggingLayer::default())
                .finish();
            Ok(op)
        }
        StorageBackend::S3 => build_s3_operator(cfg, S3Credentials::from_env()),
    }
}

/// Build an OpenDAL Operator for S3 (or any S3-compatible endpoint).
///
/// If `enforce_tls` is true and the endpoint uses HTTP, this returns an error.
/// Otherwise, a warning is logged for non-HTTPS endpoints.
pub fn build_s3_operator(cfg: &StorageConfig, creds: Option<S3Credentials>) -> Result<Operator> {
    if cfg.endpoint.starts_with("http://") {
        if cfg.enforce_tls {
            anyhow::bail!(
                "S3 endpoint uses plaintext HTTP ({}), but enforce_tls is enabled. \
                 Use an HTTPS endpoint or set storage.enforce_tls = false for local development.",
                cfg.endpoint
            );
        }
        tracing::warn!(
            endpoint = %cfg.endpoint,
            "S3 endpoint uses plaintext HTTP; credentials are transmitted unencrypted"
        );
    }

    // opendal 0.55: builders consume `self`; path-style addressing is the default
    let mut builder = opendal::services::S3::default()
        .endpoint(&cfg.endpoint)
        .region(&cfg.region)
        .bucket(&cfg.bucket);
    if let Some(creds) = creds {
        builder = builder
            .access_key_id(&creds.access_key_id)
            .secret_access_key(&creds.secret_access_key);
    } else {
        tracing::debug!("no static S3 credentials, deferring to the default chain");
    }

    let op = Operator::new(builder)
        .context("creating OpenDAL S3 operator")?
        .layer(opendal::layers::LoggingLayer::default())
        .layer(
            opendal::layers::RetryLayer::new()
                .with_max_times(5)
                .with_jitter(),
        )
        .finish();

    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn creds() -> Option<S3Credentials> {
        Some(S3Credentials {
            access_key_id: "key".into(),
            secret_access_key: "secret".into(),
        })
    }

    #[test]
    fn memory_is_the_default_backend() {
        let op = build_operator(&StorageConfig::default());
        assert!(op.is_ok(), "memory operator construction should succeed");
    }

    #[test]
    fn fs_backend_requires_root() {
        let cfg = StorageConfig {
            backend: StorageBackend::Fs,
            ..Default::default()
        };
        let err = build_operator(&cfg).unwrap_err();
        assert!(err.to_string().contains("storage.root"));
    }

    #[test]
    fn fs_backend_with_root() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = StorageConfig {
            backend: StorageBackend::Fs,
            root: Some(dir.path().to_path_buf()),
            ..Default::default()
        };
        assert!(build_operator(&cfg).is_ok());
    }

    #[test]
    fn s3_http_without_enforce_tls_is_allowed() {
        let cfg = StorageConfig {
            backend: StorageBackend::S3,
            endpoint: "http://localhost:8333".into(),
            enforce_tls: false,
            ..Default::default()
        };
        assert!(build_s3_operator(&cfg, creds()).is_ok());
    }

    #[test]
    fn s3_http_with_enforce_tls_fails() {
        let cfg = StorageConfig {
            backend: StorageBackend::S3,
            endpoint: "http://insecure:8333".into(),
            enforce_tls: true,
            ..Default::default()
        };
        let result = build_s3_operator(&cfg, creds());
        assert!(result.is_err(), "HTTP + enforce_tls must fail");
        assert!(
            result.unwrap_err().to_string().contains("enforce_tls"),
            "error message should mention enforce_tls"
        );
    }

    #[test]
    fn s3_https_with_enforce_tls() {
        let cfg = StorageConfig {
            backend: StorageBackend::S3,
            endpoint: "https://s3.example.com".into(),
            enforce_tls: true,
            ..Default::default()
        };
        assert!(build_s3_operator(&cfg, creds()).is_ok());
    }
}
