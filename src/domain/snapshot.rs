//! One decoded status document for one monit instance

use roxmltree::Document;
use serde::Serialize;
use serde_json::Value;
use tracing::warn;

use crate::config::InstanceConfig;
use crate::domain::classify::{classify, Classification};
use crate::domain::services::{
    ErrorRecord, File, Filesystem, Host, Process, Record, System, ERROR_STATUS,
};

pub const MISSING_SYSTEM_MESSAGE: &str = "status document contains no system service";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Snapshot {
    pub instance: String,
    pub system: Record<System>,
    pub filesystems: Vec<Record<Filesystem>>,
    pub files: Vec<Record<File>>,
    pub processes: Vec<Record<Process>>,
    pub hosts: Vec<Record<Host>>,
    #[serde(skip)]
    pub raw: String,
    #[serde(skip)]
    pub config: Option<InstanceConfig>,
}

impl Snapshot {
    /// Decodes `raw` into a snapshot. Never fails: unparsable text and sentinel
    /// error documents both yield an error `system` record.
    pub fn decode(instance: impl Into<String>, raw: &str) -> Self {
        let instance = instance.into();
        let classification = match Document::parse(raw) {
            Ok(document) => classify(&document),
            Err(err) => {
                warn!(instance = %instance, error = %err, "status document is not valid XML");
                Classification::failed(format!("invalid status document: {err}"))
            }
        };

        let Classification {
            system,
            filesystems,
            files,
            processes,
            hosts,
        } = classification;

        let system = system.unwrap_or_else(|| {
            warn!(instance = %instance, "no system service in status document");
            Record::Error(ErrorRecord::new(MISSING_SYSTEM_MESSAGE))
        });

        Self {
            instance,
            system,
            filesystems,
            files,
            processes,
            hosts,
            raw: raw.to_string(),
            config: None,
        }
    }

    pub fn for_instance(config: &InstanceConfig, raw: &str) -> Self {
        Self {
            config: Some(config.clone()),
            ..Self::decode(config.identity(), raw)
        }
    }

    /// `false` when the system record is degraded to status 3, whatever the cause.
    pub fn is_available(&self) -> bool {
        self.system.status() != Some(ERROR_STATUS)
    }

    pub fn service_count(&self) -> usize {
        1 + self.filesystems.len() + self.files.len() + self.processes.len() + self.hosts.len()
    }

    /// Plain JSON form. Verbose output adds the raw document and the
    /// connection settings with the password redacted.
    pub fn to_json(&self, verbose: bool) -> serde_json::Result<Value> {
        let mut value = serde_json::to_value(self)?;
        if verbose {
            if let Value::Object(map) = &mut value {
                map.insert("raw".to_string(), Value::String(self.raw.clone()));
                let config = match &self.config {
                    Some(config) => serde_json::to_value(config.redacted())?,
                    None => Value::Null,
                };
                map.insert("config".to_string(), config);
            }
        }
        Ok(value)
    }
}
