//! Shared fixtures for report pipeline tests.

use serde_json::{json, Value};
use uuid::Uuid;

use super::prompt::tagged_block;
use crate::db::{self, Database};
use crate::models::enums::{Category, DiscussionTemplate};
use crate::models::{Discussion, Message};
use crate::pipeline::structuring::{MockStructuredClient, StructuredRequest};

/// Extraction output that echoes the message and picks the category's
/// first option.
pub fn echo_output(category: Category, text: &str) -> Value {
    let mut value = json!({
        "theme": "Search",
        "sentiment": "POSITIVE",
        "emotion": "ANTICIPATION",
        "is_critical_opinion": false,
        "risk_flag": false,
        "confidence": 0.8,
        "relevancy": 0.9,
        "is_against": "NO",
        "evidence_type": "DATA",
        "text": text,
    });
    value[category.dimension_field()] = json!(category.dimension_options()[0]);
    value
}

fn category_of(request: &StructuredRequest) -> Option<Category> {
    Category::ALL
        .iter()
        .copied()
        .find(|c| request.schema_name == format!("{}_dimensions", c.as_str().to_lowercase()))
}

/// Answers classification with `inferred` and extraction by echoing.
pub fn echo_client(inferred: Category) -> MockStructuredClient {
    MockStructuredClient::new(move |request| match category_of(request) {
        Some(category) => {
            let text = tagged_block(&request.user, "message").unwrap_or_default();
            Ok(echo_output(category, text))
        }
        None => Ok(json!({ "category": inferred.as_str() })),
    })
}

/// Insert a discussion owned by a fresh owner, with one message per text.
pub fn seed(db: &Database, template: Option<DiscussionTemplate>, texts: &[&str]) -> Discussion {
    let mut discussion = Discussion::new(Uuid::new_v4(), "Q3 roadmap", "What should ship first?");
    discussion.template = template;
    let conn = db.conn().unwrap();
    db::insert_discussion(&conn, &discussion).unwrap();
    for text in texts {
        db::insert_message(&conn, &Message::new(discussion.id, text)).unwrap();
    }
    discussion
}
