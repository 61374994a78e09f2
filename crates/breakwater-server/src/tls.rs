//! TLS material loading for `serve_tls`.
//!
//! PEM certificate chains and private keys are read at serve time and
//! turned into a [`TlsAcceptor`]; every failure maps to
//! [`ServerError::TlsConfig`] so a misconfigured server fails before its
//! first accept rather than on its first handshake.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;

use crate::server::ServerError;

/// Builds a TLS acceptor from PEM certificate and key files.
pub(crate) fn acceptor(cert_path: &Path, key_path: &Path) -> Result<TlsAcceptor, ServerError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut config = ServerConfig::builder()
        .with_no_client_auth()
        .with_single_cert(certs, key)
        .map_err(|err| ServerError::TlsConfig(format!("unusable certificate or key: {err}")))?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    Ok(TlsAcceptor::from(Arc::new(config)))
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, ServerError> {
    let file = File::open(path).map_err(|err| {
        ServerError::TlsConfig(format!("could not open certificate {}: {err}", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| {
            ServerError::TlsConfig(format!(
                "could not parse certificate {}: {err}",
                path.display()
            ))
        })?;
    if certs.is_empty() {
        return Err(ServerError::TlsConfig(format!(
            "no certificates found in {}",
            path.display()
        )));
    }

    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, ServerError> {
    let file = File::open(path).map_err(|err| {
        ServerError::TlsConfig(format!("could not open private key {}: {err}", path.display()))
    })?;
    let mut reader = BufReader::new(file);

    loop {
        let item = rustls_pemfile::read_one(&mut reader).map_err(|err| {
            ServerError::TlsConfig(format!(
                "could not parse private key {}: {err}",
                path.display()
            ))
        })?;
        match item {
            Some(rustls_pemfile::Item::Pkcs1Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Pkcs8Key(key)) => return Ok(key.into()),
            Some(rustls_pemfile::Item::Sec1Key(key)) => return Ok(key.into()),
            Some(_) => {}
            None => break,
        }
    }

    Err(ServerError::TlsConfig(format!(
        "no private key found in {}",
        path.display()
    )))
}
