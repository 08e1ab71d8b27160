//! Per-message dimension extraction.
//!
//! One structured call per message, dispatched to the schema of the
//! resolved category. Every output is validated, the redaction contract is
//! enforced against the source message, and the consistency flags are
//! recomputed locally. One invalid output fails the whole stage.

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;

use super::control::JobControl;
use super::error::PipelineError;
use super::prompt::{build_extraction_prompt, extraction_system_prompt};
use super::types::*;
use crate::models::enums::*;
use crate::models::{Discussion, Message};
use crate::pipeline::safety::{is_redaction_of, scrub};
use crate::pipeline::structuring::{
    check_unit_interval, count_injection_lines, decode, LlmError, StructuredClient, StructuredRequest,
};

/// Theme used when the model leaves it empty.
pub const DEFAULT_THEME: &str = "General";

/// Decoded output of one extraction call, before local enforcement.
pub trait ExtractionOutput: DeserializeOwned + JsonSchema {
    const SCHEMA_NAME: &'static str;

    fn into_parts(self) -> (CommonDimensions, CategoryDimension);
}

macro_rules! extraction_output {
    ($(#[$meta:meta])* $name:ident, $schema:literal, $field:ident: $ty:ty => $variant:ident) => {
        $(#[$meta])*
        #[derive(Debug, Deserialize, JsonSchema)]
        #[serde(deny_unknown_fields)]
        pub struct $name {
            #[serde(default)]
            pub theme: Option<String>,
            pub sentiment: Sentiment,
            pub emotion: Option<Emotion>,
            pub is_critical_opinion: bool,
            pub risk_flag: bool,
            #[schemars(range(min = 0.0, max = 1.0))]
            pub confidence: f64,
            #[schemars(range(min = 0.0, max = 1.0))]
            pub relevancy: f64,
            pub is_against: IsAgainst,
            pub evidence_type: EvidenceType,
            #[serde(default)]
            pub stance_sentiment_mismatch: Option<bool>,
            #[serde(default)]
            pub confidence_evidence_mismatch: Option<bool>,
            pub text: String,
            pub $field: $ty,
        }

        impl ExtractionOutput for $name {
            const SCHEMA_NAME: &'static str = $schema;

            fn into_parts(self) -> (CommonDimensions, CategoryDimension) {
                let common = CommonDimensions {
                    theme: self.theme.unwrap_or_default(),
                    sentiment: self.sentiment,
                    emotion: self.emotion,
                    is_critical_opinion: self.is_critical_opinion,
                    risk_flag: self.risk_flag,
                    confidence: self.confidence,
                    relevancy: self.relevancy,
                    is_against: self.is_against,
                    evidence_type: self.evidence_type,
                    stance_sentiment_mismatch: self.stance_sentiment_mismatch.unwrap_or(false),
                    confidence_evidence_mismatch: self.confidence_evidence_mismatch.unwrap_or(false),
                    text: self.text,
                };
                (common, CategoryDimension::$variant(self.$field))
            }
        }
    };
}

extraction_output!(
    BinaryProposalOutput,
    "binary_proposal_dimensions",
    is_agreeing: IsAgreeing => IsAgreeing
);
extraction_output!(
    PrioritizationRankingOutput,
    "prioritization_ranking_dimensions",
    priority_class: PriorityClass => PriorityClass
);
extraction_output!(
    BrainstormingIdeationOutput,
    "brainstorming_ideation_dimensions",
    actionability: Actionability => Actionability
);
extraction_output!(
    FeedbackRetrospectiveOutput,
    "feedback_retrospective_dimensions",
    impact_direction: ImpactDirection => ImpactDirection
);
extraction_output!(
    ForecastingPlanningOutput,
    "forecasting_planning_dimensions",
    delivery_status: DeliveryStatus => DeliveryStatus
);

/// Schema and decoder for one category.
pub struct SchemaEntry {
    pub schema_name: &'static str,
    build: fn(String, String) -> StructuredRequest,
    decode: fn(Value) -> Result<(CommonDimensions, CategoryDimension), LlmError>,
}

impl SchemaEntry {
    fn of<T: ExtractionOutput>() -> Self {
        Self {
            schema_name: T::SCHEMA_NAME,
            build: |system, user| StructuredRequest::for_type::<T>(T::SCHEMA_NAME, system, user),
            decode: |value| decode::<T>(T::SCHEMA_NAME, value).map(T::into_parts),
        }
    }

    pub fn request(&self, system: String, user: String) -> StructuredRequest {
        (self.build)(system, user)
    }

    pub fn decode(&self, value: Value) -> Result<(CommonDimensions, CategoryDimension), LlmError> {
        (self.decode)(value)
    }
}

/// Fixed dispatch table from category to extraction schema.
pub fn schema_entry(category: Category) -> SchemaEntry {
    match category {
        Category::BinaryProposal => SchemaEntry::of::<BinaryProposalOutput>(),
        Category::PrioritizationRanking => SchemaEntry::of::<PrioritizationRankingOutput>(),
        Category::BrainstormingIdeation => SchemaEntry::of::<BrainstormingIdeationOutput>(),
        Category::FeedbackRetrospective => SchemaEntry::of::<FeedbackRetrospectiveOutput>(),
        Category::ForecastingPlanning => SchemaEntry::of::<ForecastingPlanningOutput>(),
    }
}

/// Extract one dimension record per message, in message order.
pub fn extract_dimensions(
    category: Category,
    discussion: &Discussion,
    messages: &[Message],
    client: &dyn StructuredClient,
    control: &JobControl,
    concurrency: usize,
) -> Result<Vec<DimensionRecord>, PipelineError> {
    if messages.is_empty() {
        return Ok(Vec::new());
    }

    let entry = schema_entry(category);
    let system = extraction_system_prompt(category);
    let requests: Vec<StructuredRequest> = messages
        .iter()
        .enumerate()
        .map(|(index, message)| {
            let suspicious = count_injection_lines(&message.content);
            if suspicious > 0 {
                tracing::warn!(
                    discussion_id = %discussion.id,
                    message_index = index,
                    suspicious_lines = suspicious,
                    "Message contains instruction-like lines"
                );
            }
            entry.request(
                system.clone(),
                build_extraction_prompt(category, &discussion.name, &message.content),
            )
        })
        .collect();

    let values = client.complete_batch(&requests, &control.batch_options(concurrency))?;
    if values.len() != messages.len() {
        return Err(PipelineError::Validation(format!(
            "expected {} extraction outputs, got {}",
            messages.len(),
            values.len()
        )));
    }

    let mut records = Vec::with_capacity(messages.len());
    for (index, (value, message)) in values.into_iter().zip(messages).enumerate() {
        let (common, dimension) = entry.decode(value).map_err(|e| {
            PipelineError::Validation(format!("message {index}: {}", PipelineError::from(e)))
        })?;
        let common = enforce(entry.schema_name, index, common, &message.content)?;

        if common.risk_flag {
            tracing::info!(
                discussion_id = %discussion.id,
                message_index = index,
                "Redacted content in extracted message"
            );
        }

        records.push(DimensionRecord {
            message_index: index,
            message_id: message.id,
            common,
            dimension,
        });
    }

    Ok(records)
}

/// Apply the local contract to one decoded output.
fn enforce(
    schema_name: &str,
    index: usize,
    mut common: CommonDimensions,
    source: &str,
) -> Result<CommonDimensions, PipelineError> {
    let invalid = |detail: String| PipelineError::Validation(format!("message {index}: {detail}"));

    check_unit_interval(schema_name, "confidence", common.confidence)
        .map_err(|e| invalid(e.to_string()))?;
    check_unit_interval(schema_name, "relevancy", common.relevancy)
        .map_err(|e| invalid(e.to_string()))?;

    if common.risk_flag {
        if common.text == source || !is_redaction_of(&common.text, source) {
            return Err(invalid(
                "risk_flag is set but the text is not a redaction of the message".into(),
            ));
        }
    } else if common.text != source {
        return Err(invalid(
            "risk_flag is clear but the text differs from the message".into(),
        ));
    }

    let scrubbed = scrub(&common.text);
    if scrubbed.changed() {
        tracing::debug!(
            message_index = index,
            kinds = ?scrubbed.kinds.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
            "Local scrubber redacted spans"
        );
        common.text = scrubbed.text;
        common.risk_flag = true;
    }

    let theme = common.theme.split_whitespace().collect::<Vec<_>>().join(" ");
    common.theme = if theme.is_empty() {
        DEFAULT_THEME.to_string()
    } else {
        theme
    };

    if common.relevancy < OFF_TOPIC_RELEVANCY {
        common.is_critical_opinion = false;
    }

    common.stance_sentiment_mismatch = stance_sentiment_mismatch(common.is_against, common.sentiment);
    common.confidence_evidence_mismatch =
        confidence_evidence_mismatch(common.confidence, common.evidence_type);

    Ok(common)
}
