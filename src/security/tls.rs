//! In-band TLS upgrade support (spec §4.10): certificate loading from a
//! directory, hot reload keyed off the certificate file's mtime, and the
//! acceptor handed to a connection task once it negotiates `startTLS`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::SystemTime;

use rustls::ServerConfig as RustlsServerConfig;
use rustls_pemfile::{Item, certs, read_one};
use rustls_pki_types::{CertificateDer, PrivateKeyDer};
use thiserror::Error;
use tokio_rustls::TlsAcceptor;

/// `TLS_CERT_ROTATION_MAX_RETRIES` (spec §4.10): caps consecutive failed
/// reload attempts so a certificate directory stuck mid-rewrite (e.g. a
/// renewal hook that hasn't finished writing) can't be retried forever.
pub const TLS_CERT_ROTATION_MAX_RETRIES: u32 = 10;

#[derive(Debug, Error)]
pub enum TlsError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("no certificates found in {0}")]
    NoCertificates(String),
    #[error("no supported private key (pkcs8/pkcs1/sec1) found in {0}")]
    NoPrivateKey(String),
    #[error("neither fullchain.pem nor cert.pem was found in {0}")]
    MissingCertFiles(String),
    #[error("invalid certificate/private key pair: {0}")]
    InvalidKeyPair(#[from] rustls::Error),
    #[error(
        "certificate rotation exceeded {TLS_CERT_ROTATION_MAX_RETRIES} consecutive failed attempts"
    )]
    RotationRetriesExhausted,
}

struct Loaded {
    config: Arc<RustlsServerConfig>,
    cert_mtime: SystemTime,
}

/// Shared, hot-swappable TLS context (spec §5: "the TLS context is shared
/// read-only across accepted connections until a reload swaps it atomically
/// — publish-new-pointer pattern"). Cloning is cheap; every clone observes
/// reloads performed through any handle.
#[derive(Clone)]
pub struct TlsContext {
    cert_path: PathBuf,
    key_path: PathBuf,
    inner: Arc<RwLock<Loaded>>,
    consecutive_failures: Arc<AtomicUsize>,
}

impl TlsContext {
    /// Loads `privkey.pem` alongside `fullchain.pem` (falling back to
    /// `cert.pem`) from `dir` and builds the initial rustls config.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, TlsError> {
        let dir = dir.as_ref();
        let cert_path = resolve_cert_path(dir)?;
        let key_path = dir.join("privkey.pem");
        let config = build_config(&cert_path, &key_path)?;
        let cert_mtime = mtime(&cert_path)?;
        Ok(Self {
            cert_path,
            key_path,
            inner: Arc::new(RwLock::new(Loaded {
                config: Arc::new(config),
                cert_mtime,
            })),
            consecutive_failures: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The rustls config currently in force.
    #[must_use]
    pub fn current(&self) -> Arc<RustlsServerConfig> {
        self.inner
            .read()
            .expect("tls context lock poisoned")
            .config
            .clone()
    }

    /// An acceptor built from the config currently in force, for the next
    /// in-band upgrade (spec §4.1: "perform in-band upgrade on the
    /// transport before the next frame is read").
    #[must_use]
    pub fn acceptor(&self) -> TlsAcceptor {
        TlsAcceptor::from(self.current())
    }

    /// Re-reads the certificate file's mtime and rebuilds the context if it
    /// changed. Returns `Ok(true)` on a completed reload, `Ok(false)` if the
    /// certificate was unchanged. A failed reload leaves the previous
    /// context in force and counts against the retry cap (spec §4.10:
    /// "TLS reload errors: logged; the previous context remains in force").
    pub fn reload_if_changed(&self) -> Result<bool, TlsError> {
        let current_mtime = mtime(&self.cert_path)?;
        let unchanged = {
            let guard = self.inner.read().expect("tls context lock poisoned");
            guard.cert_mtime == current_mtime
        };
        if unchanged {
            return Ok(false);
        }

        if self.consecutive_failures.load(Ordering::Relaxed) >= TLS_CERT_ROTATION_MAX_RETRIES as usize
        {
            return Err(TlsError::RotationRetriesExhausted);
        }

        match build_config(&self.cert_path, &self.key_path) {
            Ok(config) => {
                let mut guard = self.inner.write().expect("tls context lock poisoned");
                guard.config = Arc::new(config);
                guard.cert_mtime = current_mtime;
                self.consecutive_failures.store(0, Ordering::Relaxed);
                Ok(true)
            }
            Err(err) => {
                self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
                Err(err)
            }
        }
    }
}

fn resolve_cert_path(dir: &Path) -> Result<PathBuf, TlsError> {
    let fullchain = dir.join("fullchain.pem");
    if fullchain.is_file() {
        return Ok(fullchain);
    }
    let cert = dir.join("cert.pem");
    if cert.is_file() {
        return Ok(cert);
    }
    Err(TlsError::MissingCertFiles(dir.display().to_string()))
}

fn mtime(path: &Path) -> Result<SystemTime, TlsError> {
    fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(|source| TlsError::Io {
            path: path.display().to_string(),
            source,
        })
}

fn build_config(cert_path: &Path, key_path: &Path) -> Result<RustlsServerConfig, TlsError> {
    let cert_chain = load_cert_chain(cert_path)?;
    let private_key = load_private_key(key_path)?;

    // Minimum TLS 1.2 (spec §4.10's fixed cipher/version floor); the default
    // crypto provider already restricts cipher suites to ECDHE+AEAD.
    let config = RustlsServerConfig::builder_with_protocol_versions(&[
        &rustls::version::TLS12,
        &rustls::version::TLS13,
    ])
    .with_no_client_auth()
    .with_single_cert(cert_chain, private_key)?;

    Ok(config)
}

fn load_cert_chain(cert_path: &Path) -> Result<Vec<CertificateDer<'static>>, TlsError> {
    let data = fs::read(cert_path).map_err(|source| TlsError::Io {
        path: cert_path.display().to_string(),
        source,
    })?;
    let mut reader = data.as_slice();
    let chain: Vec<CertificateDer<'static>> =
        certs(&mut reader)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| TlsError::Io {
                path: cert_path.display().to_string(),
                source,
            })?;
    if chain.is_empty() {
        return Err(TlsError::NoCertificates(cert_path.display().to_string()));
    }
    Ok(chain)
}

fn load_private_key(key_path: &Path) -> Result<PrivateKeyDer<'static>, TlsError> {
    let data = fs::read(key_path).map_err(|source| TlsError::Io {
        path: key_path.display().to_string(),
        source,
    })?;
    let mut reader = data.as_slice();
    while let Some(item) = read_one(&mut reader).map_err(|source| TlsError::Io {
        path: key_path.display().to_string(),
        source,
    })? {
        let der: PrivateKeyDer<'static> = match item {
            Item::Pkcs8Key(key) => key.into(),
            Item::Pkcs1Key(key) => key.into(),
            Item::Sec1Key(key) => key.into(),
            _ => continue,
        };
        return Ok(der);
    }
    Err(TlsError::NoPrivateKey(key_path.display().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_cert_path_prefers_fullchain() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fullchain.pem"), b"fullchain").unwrap();
        fs::write(dir.path().join("cert.pem"), b"cert").unwrap();
        assert_eq!(
            resolve_cert_path(dir.path()).unwrap(),
            dir.path().join("fullchain.pem")
        );
    }

    #[test]
    fn resolve_cert_path_falls_back_to_cert_pem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("cert.pem"), b"cert").unwrap();
        assert_eq!(
            resolve_cert_path(dir.path()).unwrap(),
            dir.path().join("cert.pem")
        );
    }

    #[test]
    fn resolve_cert_path_errors_when_neither_file_present() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            resolve_cert_path(dir.path()),
            Err(TlsError::MissingCertFiles(_))
        ));
    }

    #[test]
    fn loading_rejects_empty_certificate_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("fullchain.pem"), b"").unwrap();
        fs::write(dir.path().join("privkey.pem"), b"").unwrap();
        assert!(matches!(
            TlsContext::load(dir.path()),
            Err(TlsError::NoCertificates(_))
        ));
    }
}
