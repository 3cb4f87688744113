//! Tool registry: a uniform async façade over the four tool families the
//! engine can reach — semantic retrieval, web retrieval, ticket/doc-system
//! retrieval, and calendar operations. New tools are added by extending the
//! closed sum, not by open subclassing.

pub mod calendar;
pub mod registry;
pub mod semantic;
pub mod tickets;
pub mod types;
pub mod web;

pub use calendar::{Calendar, CalendarAction, CalendarOutcome};
pub use registry::ToolRegistry;
pub use semantic::{SemanticHit, SemanticIndex, SemanticResults};
pub use tickets::{TicketsDocsClient, TicketsResult, WorkItem, WorkItemType};
pub use types::{ToolError, ToolInvocation, ToolKind, ToolOutcome, ToolPayload};
pub use web::{Citation, WebAnswer, WebSearcher};
