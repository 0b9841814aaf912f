// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! TLS configuration.
//!
//! HTTPS is enabled when both `TLS_CERT_PATH` and `TLS_KEY_PATH` are set.
//! Otherwise the service listens on plain HTTP and expects a terminating
//! proxy in front of it (cookies stay `Secure` unless `COOKIE_SECURE=false`).

use axum_server::tls_rustls::RustlsConfig;

use crate::config::TlsPaths;

#[derive(Debug, thiserror::Error)]
pub enum TlsError {
    #[error("rustls crypto provider already installed with a different backend")]
    Provider,

    #[error("failed to load certificate {cert} / key {key}: {source}")]
    Load {
        cert: String,
        key: String,
        #[source]
        source: std::io::Error,
    },
}

/// Install the ring crypto provider for rustls.
///
/// Must run before any TLS configuration is built. Calling it twice is
/// harmless as long as the ring provider is the one installed.
pub fn install_crypto_provider() -> Result<(), TlsError> {
    if rustls::crypto::CryptoProvider::get_default().is_some() {
        return Ok(());
    }
    match rustls::crypto::ring::default_provider().install_default() {
        Ok(()) => Ok(()),
        // Lost a race with another installer.
        Err(_) if rustls::crypto::CryptoProvider::get_default().is_some() => Ok(()),
        Err(_) => Err(TlsError::Provider),
    }
}

/// Build the rustls server configuration from PEM files.
pub async fn load_rustls_config(paths: &TlsPaths) -> Result<RustlsConfig, TlsError> {
    RustlsConfig::from_pem_file(&paths.cert, &paths.key)
        .await
        .map_err(|source| TlsError::Load {
            cert: paths.cert.display().to_string(),
            key: paths.key.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_install_is_repeatable() {
        install_crypto_provider().unwrap();
        install_crypto_provider().unwrap();
    }

    #[tokio::test]
    async fn missing_files_are_reported() {
        install_crypto_provider().unwrap();
        let paths = TlsPaths {
            cert: "/nonexistent/cert.pem".into(),
            key: "/nonexistent/key.pem".into(),
        };
        let err = load_rustls_config(&paths).await.unwrap_err();
        assert!(err.to_string().contains("/nonexistent/cert.pem"));
    }
}
