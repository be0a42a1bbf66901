//! Typed service records decoded from `<service>` nodes
//!
//! Each record type is declared once together with its schema table, so the
//! struct fields and the extraction table cannot drift apart.

use std::fmt;

use roxmltree::Node;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::domain::extract::{extract, take, FieldMap};
use crate::domain::schema::{Coercion, FieldSpec};

/// Status code carried by every error record.
pub const ERROR_STATUS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceKind {
    Filesystem,
    Directory,
    File,
    Process,
    Host,
    System,
}

impl ServiceKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Filesystem),
            1 => Some(Self::Directory),
            2 => Some(Self::File),
            3 => Some(Self::Process),
            4 => Some(Self::Host),
            5 => Some(Self::System),
            _ => None,
        }
    }

    /// Reads the `type` attribute of a `<service>` node.
    pub fn of_node(node: Node<'_, '_>) -> Option<Self> {
        node.attribute("type")
            .and_then(|value| value.trim().parse::<i64>().ok())
            .and_then(Self::from_code)
    }

}

impl fmt::Display for ServiceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Filesystem => "filesystem",
            Self::Directory => "directory",
            Self::File => "file",
            Self::Process => "process",
            Self::Host => "host",
            Self::System => "system",
        };
        f.write_str(name)
    }
}

/// Common surface of the per-kind record structs.
pub trait ServiceRecord: Sized {
    const KIND: ServiceKind;
    const SCHEMA: &'static [FieldSpec];

    fn from_fields(fields: FieldMap) -> Self;
    fn status(&self) -> Option<i64>;
}

macro_rules! coerced_type {
    (Text) => {
        String
    };
    (Integer) => {
        i64
    };
    (Float) => {
        f64
    };
}

macro_rules! service_record {
    (
        $(#[$meta:meta])*
        $kind:ident => pub struct $record:ident {
            $( $field:ident : $coercion:ident = $locator:literal ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize)]
        pub struct $record {
            pub name: Option<String>,
            pub status: Option<i64>,
            pub monitored: Option<i64>,
            $( pub $field: Option<coerced_type!($coercion)>, )*
        }

        impl ServiceRecord for $record {
            const KIND: ServiceKind = ServiceKind::$kind;
            const SCHEMA: &'static [FieldSpec] = &[
                FieldSpec::new("name", "name", Coercion::Text),
                FieldSpec::new("status", "status", Coercion::Integer),
                FieldSpec::new("monitored", "monitor", Coercion::Integer),
                $( FieldSpec::new(stringify!($field), $locator, Coercion::$coercion), )*
            ];

            fn from_fields(mut fields: FieldMap) -> Self {
                Self {
                    name: take(&mut fields, "name"),
                    status: take(&mut fields, "status"),
                    monitored: take(&mut fields, "monitored"),
                    $( $field: take(&mut fields, stringify!($field)), )*
                }
            }

            fn status(&self) -> Option<i64> {
                self.status
            }
        }
    };
}

service_record! {
    /// The monitored host itself, plus server and platform metadata.
    System => pub struct System {
        la01: Float = "system/load/avg01",
        la05: Float = "system/load/avg05",
        la15: Float = "system/load/avg15",
        cpu_user: Float = "system/cpu/user",
        cpu_system: Float = "system/cpu/system",
        cpu_wait: Float = "system/cpu/wait",
        memory: Float = "system/memory/percent",
        memory_kilobyte: Integer = "system/memory/kilobyte",
        swap: Float = "system/swap/percent",
        swap_kilobyte: Integer = "system/swap/kilobyte",
        uptime: Integer = "//server/uptime",
        poll: Integer = "//server/poll",
        localhostname: Text = "//server/localhostname",
        monit_version: Text = "//server/version",
        platform_name: Text = "//platform/name",
        platform_release: Text = "//platform/release",
        platform_version: Text = "//platform/version",
        platform_machine: Text = "//platform/machine",
        cpus: Integer = "//platform/cpu",
        total_memory: Integer = "//platform/memory",
        total_swap: Integer = "//platform/swap",
    }
}

service_record! {
    Filesystem => pub struct Filesystem {
        percent: Float = "block/percent",
        usage: Float = "block/usage",
        total: Float = "block/total",
        inode_percent: Float = "inode/percent",
        inode_usage: Integer = "inode/usage",
        inode_total: Integer = "inode/total",
        mode: Text = "mode",
        flags: Integer = "flags",
    }
}

service_record! {
    File => pub struct File {
        size: Integer = "size",
        mode: Text = "mode",
        uid: Integer = "uid",
        gid: Integer = "gid",
        timestamp: Integer = "timestamp",
        checksum: Text = "checksum",
    }
}

service_record! {
    Process => pub struct Process {
        pid: Integer = "pid",
        ppid: Integer = "ppid",
        uptime: Integer = "uptime",
        children: Integer = "children",
        memory: Float = "memory/percent",
        memory_total: Float = "memory/percenttotal",
        memory_kilobyte: Integer = "memory/kilobyte",
        memory_kilobyte_total: Integer = "memory/kilobytetotal",
        cpu: Float = "cpu/percent",
        cpu_total: Float = "cpu/percenttotal",
    }
}

service_record! {
    /// Remote host reachability, from port and ICMP checks.
    Host => pub struct Host {
        response_time: Float = "port/responsetime",
        port: Integer = "port/portnumber",
        protocol: Text = "port/protocol",
        icmp_response_time: Float = "icmp/responsetime",
    }
}

/// Degraded stand-in for a record or a whole document that could not be decoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub name: String,
    pub status: i64,
    pub message: String,
}

impl ErrorRecord {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            name: "Error".to_string(),
            status: ERROR_STATUS,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Record<T> {
    Service(T),
    Error(ErrorRecord),
}

impl<T: ServiceRecord> Record<T> {
    pub fn status(&self) -> Option<i64> {
        match self {
            Self::Service(record) => record.status(),
            Self::Error(record) => Some(record.status),
        }
    }

    pub fn as_service(&self) -> Option<&T> {
        match self {
            Self::Service(record) => Some(record),
            Self::Error(_) => None,
        }
    }

    pub fn as_error(&self) -> Option<&ErrorRecord> {
        match self {
            Self::Service(_) => None,
            Self::Error(record) => Some(record),
        }
    }
}

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("expected a <service> element, found <{found}>")]
    UnexpectedElement { found: String },
    #[error("service declares type {declared} but was decoded as {expected}")]
    KindMismatch {
        expected: ServiceKind,
        declared: ServiceKind,
    },
}

impl RecordError {
    pub fn class(&self) -> &'static str {
        match self {
            Self::UnexpectedElement { .. } => "unexpected_element",
            Self::KindMismatch { .. } => "kind_mismatch",
        }
    }
}

fn try_build<S: ServiceRecord>(node: Node<'_, '_>) -> Result<S, RecordError> {
    if !node.is_element() || !node.has_tag_name("service") {
        return Err(RecordError::UnexpectedElement {
            found: node.tag_name().name().to_string(),
        });
    }

    if let Some(declared) = ServiceKind::of_node(node) {
        if declared != S::KIND {
            return Err(RecordError::KindMismatch {
                expected: S::KIND,
                declared,
            });
        }
    }

    Ok(S::from_fields(extract(node, S::SCHEMA)))
}

/// Builds one record. Faults are logged and turned into an error record so a
/// bad node never aborts decoding of its siblings.
pub fn build<S: ServiceRecord>(node: Node<'_, '_>) -> Record<S> {
    match try_build::<S>(node) {
        Ok(record) => Record::Service(record),
        Err(err) => {
            let pos = node.document().text_pos_at(node.range().start);
            let position = format!("{}:{}", pos.row, pos.col);
            error!(
                kind = %S::KIND,
                fault = err.class(),
                position = %position,
                error = %err,
                "failed to build service record"
            );
            Record::Error(ErrorRecord::new(err.to_string()))
        }
    }
}
