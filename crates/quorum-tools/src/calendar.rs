use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::ToolError;

/// What to do against the calendar.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CalendarAction {
    Schedule {
        title: String,
        attendees: Vec<String>,
        start: String,
        duration_minutes: u32,
    },
    CheckAvailability {
        attendees: Vec<String>,
        window_start: String,
        window_end: String,
    },
    FindTimes {
        attendees: Vec<String>,
        duration_minutes: u32,
    },
    GetCalendar {
        day: String,
    },
}

impl CalendarAction {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Schedule { .. } => "schedule",
            Self::CheckAvailability { .. } => "check_availability",
            Self::FindTimes { .. } => "find_times",
            Self::GetCalendar { .. } => "get_calendar",
        }
    }

    /// Scheduling writes external state; everything else is a read.
    pub fn is_mutation(&self) -> bool {
        matches!(self, Self::Schedule { .. })
    }
}

/// Action-shaped result from the calendar adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarOutcome {
    pub action: String,
    /// Human-readable outcome ("booked for Tuesday 14:00", "3 slots free").
    pub detail: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

/// Adapter over the calendar API.
#[async_trait]
pub trait Calendar: Send + Sync {
    async fn perform(&self, action: &CalendarAction) -> Result<CalendarOutcome, ToolError>;
}
