//! Hub messages
//!
//! A message is an envelope `{ "type": kind, "payload": ... }`. The payload
//! type is fixed by the kind, so the envelope is an adjacently tagged enum.

use crate::progress::{RemediationResult, StepProgress};
use crate::status::{ClusterStatus, OperatorStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Message sent to every connected observer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    ClusterStatus(ClusterStatus),
    OperatorStatus(OperatorStatus),
    InstallProgress(StepProgress),
    UninstallProgress(StepProgress),
    ScanStatus(WatchEvent),
    CheckResult(WatchEvent),
    Remediation(WatchEvent),
    RemediationResult(RemediationResult),
    Error(ErrorPayload),
}

/// Discriminant of [`Message`], used for routing and metric labels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    ClusterStatus,
    OperatorStatus,
    InstallProgress,
    UninstallProgress,
    ScanStatus,
    CheckResult,
    Remediation,
    RemediationResult,
    Error,
}

impl MessageKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::ClusterStatus => "cluster_status",
            MessageKind::OperatorStatus => "operator_status",
            MessageKind::InstallProgress => "install_progress",
            MessageKind::UninstallProgress => "uninstall_progress",
            MessageKind::ScanStatus => "scan_status",
            MessageKind::CheckResult => "check_result",
            MessageKind::Remediation => "remediation",
            MessageKind::RemediationResult => "remediation_result",
            MessageKind::Error => "error",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Message {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Message::ClusterStatus(_) => MessageKind::ClusterStatus,
            Message::OperatorStatus(_) => MessageKind::OperatorStatus,
            Message::InstallProgress(_) => MessageKind::InstallProgress,
            Message::UninstallProgress(_) => MessageKind::UninstallProgress,
            Message::ScanStatus(_) => MessageKind::ScanStatus,
            Message::CheckResult(_) => MessageKind::CheckResult,
            Message::Remediation(_) => MessageKind::Remediation,
            Message::RemediationResult(_) => MessageKind::RemediationResult,
            Message::Error(_) => MessageKind::Error,
        }
    }

    /// Wraps a watch event in the message kind its resource maps to.
    ///
    /// Only the watch-driven kinds accept an event; any other kind yields `None`.
    #[must_use]
    pub fn from_watch_event(kind: MessageKind, event: WatchEvent) -> Option<Self> {
        match kind {
            MessageKind::ScanStatus => Some(Message::ScanStatus(event)),
            MessageKind::CheckResult => Some(Message::CheckResult(event)),
            MessageKind::Remediation => Some(Message::Remediation(event)),
            _ => None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Message::Error(ErrorPayload {
            message: message.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub message: String,
}

/// Kind of change reported by a watch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum WatchEventKind {
    Added,
    Modified,
    Deleted,
}

/// A resource change, projected down to a few kind-specific fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEvent {
    pub event_type: WatchEventKind,
    pub resource_type: String,
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, Value>,
}
