use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{Category, DiscussionTemplate, ReportState};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Discussion {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub description: String,
    pub template: Option<DiscussionTemplate>,
    pub created_at: NaiveDateTime,
}

impl Discussion {
    pub fn new(owner_id: Uuid, name: &str, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id,
            name: name.to_string(),
            description: description.to_string(),
            template: None,
            created_at: chrono::Local::now().naive_local(),
        }
    }

    pub fn with_template(mut self, template: DiscussionTemplate) -> Self {
        self.template = Some(template);
        self
    }
}

/// A single contribution. Position in the discussion is the alignment key
/// for dimension extraction, so content is never edited after a report run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub discussion_id: Uuid,
    pub content: String,
    pub created_at: NaiveDateTime,
}

impl Message {
    pub fn new(discussion_id: Uuid, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            discussion_id,
            content: content.to_string(),
            created_at: chrono::Local::now().naive_local(),
        }
    }
}

/// Externally observable report columns of a discussion record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReportStatus {
    pub state: Option<ReportState>,
    pub report_progress: Option<f64>,
    pub report: Option<serde_json::Value>,
    pub error: Option<String>,
    pub job_id: Option<Uuid>,
    pub category: Option<Category>,
    pub updated_at: Option<NaiveDateTime>,
}

impl ReportStatus {
    pub fn is_in_progress(&self) -> bool {
        self.state.is_some_and(|s| s.is_in_progress())
    }
}
