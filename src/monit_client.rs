use std::{collections::HashMap, fs, path::Path, time::Duration};

use async_trait::async_trait;
use quick_xml::escape::escape;
use reqwest::{Certificate, Client, Identity};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{InstanceConfig, Scheme};

/// Retrieves the raw status document of one monit instance.
///
/// Implementations never fail: transport faults are reported as a sentinel
/// error document (see [`sentinel_document`]) so decoding sees one input shape.
#[async_trait]
pub trait StatusFetcher: Send + Sync {
    async fn fetch(&self, instance: &InstanceConfig) -> String;
}

#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("failed to read {path}: {message}")]
    Io { path: String, message: String },
    #[error("{0}")]
    Tls(String),
    #[error("{0}")]
    Timeout(String),
    #[error("{0}")]
    Connect(String),
    #[error("{status}")]
    HttpStatus { status: String },
    #[error("{0}")]
    Request(String),
    #[error("{0}")]
    Body(String),
}

impl FetchError {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io { .. } => "Io",
            Self::Tls(_) => "Tls",
            Self::Timeout(_) => "Timeout",
            Self::Connect(_) => "Connect",
            Self::HttpStatus { .. } => "HttpStatus",
            Self::Request(_) => "Request",
            Self::Body(_) => "Body",
        }
    }

    pub fn into_sentinel(self) -> String {
        sentinel_document(self.kind(), &self.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        let message = err.to_string();
        if err.is_timeout() {
            Self::Timeout(message)
        } else if err.is_connect() {
            Self::Connect(message)
        } else if err.is_body() || err.is_decode() {
            Self::Body(message)
        } else {
            Self::Request(message)
        }
    }
}

/// Builds the minimal document substituted when no status document could be
/// obtained.
pub fn sentinel_document(kind: &str, message: &str) -> String {
    format!(
        r#"<error status="3" name="{}" message="{}" />"#,
        escape(kind),
        escape(message)
    )
}

/// Fetches `/_status?format=xml` over HTTP(S) with basic auth.
///
/// One client is built per configured instance up front, so TLS material is
/// read from disk once. A client that failed to build keeps reporting the
/// same fault.
#[derive(Debug)]
pub struct HttpStatusFetcher {
    timeout: Duration,
    clients: HashMap<String, Result<Client, FetchError>>,
}

impl HttpStatusFetcher {
    pub fn new(instances: &[InstanceConfig], timeout: Duration) -> Self {
        let clients = instances
            .iter()
            .map(|instance| {
                let client = build_client(instance, timeout);
                if let Err(err) = &client {
                    warn!(
                        instance = %instance.identity(),
                        fault = err.kind(),
                        error = %err,
                        "failed to prepare HTTP client"
                    );
                }
                (instance.identity(), client)
            })
            .collect();

        Self { timeout, clients }
    }

    fn client_for(&self, instance: &InstanceConfig) -> Result<Client, FetchError> {
        match self.clients.get(&instance.identity()) {
            Some(prepared) => prepared.clone(),
            None => build_client(instance, self.timeout),
        }
    }

    async fn try_fetch(&self, instance: &InstanceConfig) -> Result<String, FetchError> {
        let client = self.client_for(instance)?;
        let mut request = client.get(instance.status_url());
        if let Some(username) = &instance.username {
            request = request.basic_auth(username, instance.password.as_ref());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::HttpStatus {
                status: status.to_string(),
            });
        }

        Ok(response.text().await?)
    }
}

#[async_trait]
impl StatusFetcher for HttpStatusFetcher {
    async fn fetch(&self, instance: &InstanceConfig) -> String {
        match self.try_fetch(instance).await {
            Ok(body) => {
                debug!(
                    instance = %instance.identity(),
                    bytes = body.len(),
                    "fetched status document"
                );
                body
            }
            Err(err) => {
                warn!(
                    instance = %instance.identity(),
                    fault = err.kind(),
                    error = %err,
                    "status fetch failed"
                );
                err.into_sentinel()
            }
        }
    }
}

fn build_client(instance: &InstanceConfig, timeout: Duration) -> Result<Client, FetchError> {
    let mut builder = Client::builder().timeout(timeout);

    if instance.scheme == Scheme::Https {
        let tls = &instance.tls;
        if let Some(ca_file) = &tls.ca_file {
            let ca_pem = read_pem(ca_file)?;
            let ca_cert = Certificate::from_pem(&ca_pem).map_err(|err| {
                FetchError::Tls(format!("invalid CA certificate {}: {err}", ca_file.display()))
            })?;
            builder = builder.add_root_certificate(ca_cert);
        }

        if let (Some(cert_file), Some(key_file)) = (&tls.cert_file, &tls.key_file) {
            let mut identity_pem = read_pem(cert_file)?;
            identity_pem.extend_from_slice(&read_pem(key_file)?);
            let identity = Identity::from_pem(&identity_pem).map_err(|err| {
                FetchError::Tls(format!("invalid client certificate or key: {err}"))
            })?;
            builder = builder.identity(identity);
        }

        if !tls.verify_peer {
            builder = builder.danger_accept_invalid_certs(true);
        }
    }

    builder
        .build()
        .map_err(|err| FetchError::Tls(format!("failed to build HTTP client: {err}")))
}

fn read_pem(path: &Path) -> Result<Vec<u8>, FetchError> {
    fs::read(path).map_err(|err| FetchError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use roxmltree::Document;

    use super::*;

    #[test]
    fn sentinel_is_well_formed_with_hostile_message() {
        let document = sentinel_document("Connect", r#"refused <"peer"> & 'gone'"#);

        let parsed = Document::parse(&document).expect("sentinel parses");
        let root = parsed.root_element();
        assert!(root.has_tag_name("error"));
        assert_eq!(root.attribute("status"), Some("3"));
        assert_eq!(root.attribute("name"), Some("Connect"));
        assert_eq!(
            root.attribute("message"),
            Some(r#"refused <"peer"> & 'gone'"#)
        );
    }

    #[test]
    fn fetch_error_sentinel_carries_kind() {
        let document = FetchError::HttpStatus {
            status: "401 Unauthorized".to_string(),
        }
        .into_sentinel();

        let parsed = Document::parse(&document).expect("sentinel parses");
        assert_eq!(parsed.root_element().attribute("name"), Some("HttpStatus"));
        assert_eq!(
            parsed.root_element().attribute("message"),
            Some("401 Unauthorized")
        );
    }

    #[tokio::test]
    async fn unreadable_ca_file_yields_io_sentinel() {
        let mut instance = InstanceConfig::new("127.0.0.1", 2812);
        instance.scheme = Scheme::Https;
        instance.tls.ca_file = Some("/nonexistent/monit-ca.pem".into());

        let fetcher =
            HttpStatusFetcher::new(std::slice::from_ref(&instance), Duration::from_secs(1));
        let document = fetcher.fetch(&instance).await;

        let parsed = Document::parse(&document).expect("sentinel parses");
        assert_eq!(parsed.root_element().attribute("name"), Some("Io"));
    }

    #[tokio::test]
    async fn tls_material_is_read_once_at_construction() {
        let ca_path = std::env::temp_dir().join(format!("monit-ca-{}.pem", std::process::id()));
        let _ = fs::remove_file(&ca_path);

        let mut secure = InstanceConfig::new("127.0.0.1", 2812);
        secure.name = Some("secure".to_string());
        secure.scheme = Scheme::Https;
        secure.tls.ca_file = Some(ca_path.clone());
        let plain = InstanceConfig::new("127.0.0.1", 2813);

        let fetcher = HttpStatusFetcher::new(&[secure.clone(), plain], Duration::from_secs(1));
        assert_eq!(fetcher.clients.len(), 2);
        assert!(matches!(
            fetcher.clients.get("secure"),
            Some(Err(FetchError::Io { .. }))
        ));
        assert!(matches!(fetcher.clients.get("127.0.0.1:2813"), Some(Ok(_))));

        fs::write(&ca_path, "not a certificate").expect("write ca file");
        let document = fetcher.fetch(&secure).await;
        let _ = fs::remove_file(&ca_path);

        let parsed = Document::parse(&document).expect("sentinel parses");
        assert_eq!(parsed.root_element().attribute("name"), Some("Io"));
    }

    #[tokio::test]
    async fn refused_connection_yields_sentinel() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("local addr").port();
        drop(listener);

        let instance = InstanceConfig::new("127.0.0.1", port);
        let fetcher = HttpStatusFetcher::new(&[], Duration::from_secs(2));
        let document = fetcher.fetch(&instance).await;

        let parsed = Document::parse(&document).expect("sentinel parses");
        assert!(parsed.root_element().has_tag_name("error"));
        assert_eq!(parsed.root_element().attribute("status"), Some("3"));
    }
}
