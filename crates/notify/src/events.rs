//! Notification event types for the faultline platform.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Severity levels for alerts and notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    /// Card accent color for this severity.
    #[must_use]
    pub const fn color(&self) -> u32 {
        match self {
            Self::Info => 0x0034_98db,     // Blue
            Self::Warning => 0x00f3_9c12,  // Orange
            Self::Critical => 0x00e7_4c3c, // Red
        }
    }

    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Critical => "Critical",
        }
    }
}

/// Events that can trigger notifications.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotifyEvent {
    /// An exception cluster crossed the notification threshold.
    ExceptionCluster {
        cluster_id: String,
        service_name: String,
        exception_type: String,
        exception_message: String,
        occurrences: u64,
        severity: Severity,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },

    /// A root-cause analysis finished for a cluster.
    RcaGenerated {
        cluster_id: String,
        service_name: String,
        root_cause_file: String,
        root_cause_symbol: String,
        confidence: f64,
        #[serde(default = "Utc::now")]
        timestamp: DateTime<Utc>,
    },
}

impl NotifyEvent {
    /// Short headline used as the card title.
    #[must_use]
    pub fn title(&self) -> String {
        match self {
            Self::ExceptionCluster { exception_type, occurrences, .. } => {
                format!("Exception Cluster: {exception_type} ({occurrences}x)")
            }
            Self::RcaGenerated { cluster_id, .. } => {
                format!("RCA Ready: {cluster_id}")
            }
        }
    }

    #[must_use]
    pub fn severity(&self) -> Severity {
        match self {
            Self::ExceptionCluster { severity, .. } => *severity,
            Self::RcaGenerated { .. } => Severity::Info,
        }
    }
}
