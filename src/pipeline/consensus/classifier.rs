//! Category resolution: template table or one inference call.

use schemars::JsonSchema;
use serde::Deserialize;

use super::error::PipelineError;
use super::prompt::{build_classification_prompt, CLASSIFIER_SYSTEM_PROMPT};
use crate::models::enums::Category;
use crate::models::Discussion;
use crate::pipeline::structuring::{decode, StructuredClient, StructuredRequest};

pub const CATEGORY_SCHEMA_NAME: &str = "category_output";

/// Output contract of the inference call.
#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CategoryOutput {
    pub category: Category,
}

/// How the category was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Mapped from the discussion's template; no external call.
    Template,
    /// Returned by the classification call.
    Inferred,
}

impl Resolution {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Template => "template",
            Self::Inferred => "inferred",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedCategory {
    pub category: Category,
    pub resolution: Resolution,
}

/// Resolve exactly one category for `discussion`.
///
/// A novel or malformed label from the model is a validation failure; it
/// is never mapped onto a nearby category.
pub fn resolve_category(
    discussion: &Discussion,
    client: &dyn StructuredClient,
) -> Result<ResolvedCategory, PipelineError> {
    if let Some(template) = discussion.template {
        return Ok(ResolvedCategory {
            category: template.category(),
            resolution: Resolution::Template,
        });
    }

    let request = StructuredRequest::for_type::<CategoryOutput>(
        CATEGORY_SCHEMA_NAME,
        CLASSIFIER_SYSTEM_PROMPT.to_string(),
        build_classification_prompt(&discussion.name, &discussion.description),
    );
    let value = client.complete(&request)?;
    let output: CategoryOutput = decode(CATEGORY_SCHEMA_NAME, value)?;

    Ok(ResolvedCategory {
        category: output.category,
        resolution: Resolution::Inferred,
    })
}
