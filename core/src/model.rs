//! Queue records: service requests, category metadata and service points.

use crate::{
    policy::SchedulingPolicy,
    types::{CategoryCode, RequestId, ServicePointId, Timestamp},
};
use serde::{Deserialize, Serialize};

/// Well-known category codes. Other codes are allowed and rank last.
pub mod category {
    pub const URGENT: &str = "URGENT";
    pub const ELDERLY: &str = "ELDERLY";
    pub const APPOINTMENT: &str = "APPOINTMENT";
    pub const GENERAL: &str = "GENERAL";
}

/// Fixed ordinal ranking used when explicit weights are absent.
/// Lower is served first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CategoryRank {
    Urgent = 0,
    Elderly = 1,
    Appointment = 2,
    General = 3,
    Other = 4,
}

impl CategoryRank {
    pub fn of(code: &str) -> Self {
        match code {
            category::URGENT => Self::Urgent,
            category::ELDERLY => Self::Elderly,
            category::APPOINTMENT => Self::Appointment,
            category::GENERAL => Self::General,
            _ => Self::Other,
        }
    }

    /// Weight implied by the rank when a category has no configured weight.
    pub fn fallback_weight(&self) -> u8 {
        match self {
            Self::Urgent => 10,
            Self::Elderly => 8,
            Self::Appointment => 6,
            Self::General => 4,
            Self::Other => 2,
        }
    }

    /// Urgent and elderly tickets form the "priority share" of a pool.
    pub fn is_priority_class(&self) -> bool {
        matches!(self, Self::Urgent | Self::Elderly)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Waiting,
    Active,
    Completed,
    Skipped,
    Cancelled,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Waiting => "WAITING",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Skipped => "SKIPPED",
            Self::Cancelled => "CANCELLED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(Self::Waiting),
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            "SKIPPED" => Some(Self::Skipped),
            "CANCELLED" => Some(Self::Cancelled),
            _ => None,
        }
    }
}

/// Marks a request as generated by a simulation run or as a real ticket.
/// The engine only ever reads and writes `Synthetic` rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    Synthetic,
    Real,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Synthetic => "synthetic",
            Self::Real => "real",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "synthetic" => Some(Self::Synthetic),
            "real" => Some(Self::Real),
            _ => None,
        }
    }
}

/// One unit of work ("queue ticket").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceRequest {
    pub id: RequestId,
    /// Per-category, per-day sequence number, starting at 1.
    pub sequence: u32,
    pub category: CategoryCode,
    pub status: RequestStatus,
    pub created_at: Timestamp,
    pub called_at: Option<Timestamp>,
    pub completed_at: Option<Timestamp>,
    pub skipped_at: Option<Timestamp>,
    pub service_point_id: Option<ServicePointId>,
    pub provenance: Provenance,
}

impl ServiceRequest {
    /// Display label such as `U007`.
    pub fn ticket_label(&self) -> String {
        let prefix = self.category.chars().next().unwrap_or('Q');
        format!("{prefix}{:03}", self.sequence)
    }

    /// Minutes between arrival and being called, if called.
    pub fn wait_minutes(&self) -> Option<f64> {
        self.called_at
            .map(|called| crate::types::minutes_between(self.created_at, called))
    }

    /// Timestamp ordering and status/timestamp agreement.
    pub fn is_consistent(&self) -> bool {
        if let Some(called) = self.called_at {
            if called < self.created_at {
                return false;
            }
        }
        if let (Some(called), Some(done)) = (self.called_at, self.completed_at) {
            if done < called {
                return false;
            }
        }
        if self.completed_at.is_some() && self.skipped_at.is_some() {
            return false;
        }
        match self.status {
            RequestStatus::Waiting => {
                self.called_at.is_none() && self.completed_at.is_none() && self.skipped_at.is_none()
            }
            RequestStatus::Active => self.called_at.is_some() && self.completed_at.is_none(),
            RequestStatus::Completed => self.called_at.is_some() && self.completed_at.is_some(),
            RequestStatus::Skipped => self.skipped_at.is_some(),
            RequestStatus::Cancelled => self.completed_at.is_none(),
        }
    }
}

/// Per-category metadata. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TypeConfig {
    pub code: CategoryCode,
    pub name: String,
    /// 1–10; higher is served earlier under PRIORITY.
    pub priority_weight: Option<u8>,
    /// Suggested initial policy; used when simulation.json names none.
    #[serde(default)]
    pub default_policy: Option<SchedulingPolicy>,
    pub enabled: bool,
}

impl TypeConfig {
    pub fn effective_weight(&self) -> u8 {
        self.priority_weight
            .map(|w| w.clamp(1, 10))
            .unwrap_or_else(|| CategoryRank::of(&self.code).fallback_weight())
    }
}

/// A capability-tagged resource requests are routed to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServicePoint {
    pub id: ServicePointId,
    pub name: String,
    /// Category codes this service point serves.
    pub capabilities: Vec<CategoryCode>,
    pub enabled: bool,
}

impl ServicePoint {
    pub fn supports(&self, category: &str) -> bool {
        self.capabilities.iter().any(|c| c == category)
    }
}

/// Category → service point mapping entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryRoute {
    pub category: CategoryCode,
    pub service_point_id: ServicePointId,
}
