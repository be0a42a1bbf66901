//! Classification of a parsed status document into per-kind collections

use roxmltree::{Document, Node};
use tracing::{debug, trace, warn};

use crate::domain::services::{
    build, ErrorRecord, File, Filesystem, Host, Process, Record, ServiceKind, System,
};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    pub system: Option<Record<System>>,
    pub filesystems: Vec<Record<Filesystem>>,
    pub files: Vec<Record<File>>,
    pub processes: Vec<Record<Process>>,
    pub hosts: Vec<Record<Host>>,
}

impl Classification {
    /// Result for a document that could not be obtained or parsed at all.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            system: Some(Record::Error(ErrorRecord::new(message))),
            ..Self::default()
        }
    }
}

/// Returns the `message` attribute of a sentinel `<error>` root, if the
/// document is one.
pub fn sentinel_message<'d>(document: &'d Document<'_>) -> Option<&'d str> {
    let root = document.root_element();
    if !root.has_tag_name("error") {
        return None;
    }
    Some(root.attribute("message").unwrap_or("unknown error"))
}

pub fn classify(document: &Document<'_>) -> Classification {
    if let Some(message) = sentinel_message(document) {
        warn!(
            fault = document.root_element().attribute("name").unwrap_or("unknown"),
            detail = message,
            "status document is an error sentinel"
        );
        return Classification::failed(message);
    }

    let mut classification = Classification::default();
    for node in document.descendants().filter(is_service_node) {
        match ServiceKind::of_node(node) {
            Some(ServiceKind::System) => {
                if classification.system.is_some() {
                    debug!("status document has more than one system service; keeping the last");
                }
                classification.system = Some(build(node));
            }
            Some(ServiceKind::Filesystem) => classification.filesystems.push(build(node)),
            Some(ServiceKind::File) => classification.files.push(build(node)),
            Some(ServiceKind::Process) => classification.processes.push(build(node)),
            Some(ServiceKind::Host) => classification.hosts.push(build(node)),
            Some(ServiceKind::Directory) | None => {
                trace!(
                    declared = node.attribute("type").unwrap_or(""),
                    "skipping service without a schema"
                );
            }
        }
    }

    classification
}

fn is_service_node(node: &Node<'_, '_>) -> bool {
    node.is_element() && node.has_tag_name("service")
}
