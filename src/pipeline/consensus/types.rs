use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::*;

/// Lower bound of the HIGH confidence band.
pub const HIGH_CONFIDENCE: f64 = 0.75;

/// Below this relevancy a message is off-topic and never a critical opinion.
pub const OFF_TOPIC_RELEVANCY: f64 = 0.4;

/// Dimensions shared by every category.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CommonDimensions {
    pub theme: String,
    pub sentiment: Sentiment,
    pub emotion: Option<Emotion>,
    pub is_critical_opinion: bool,
    pub risk_flag: bool,
    pub confidence: f64,
    pub relevancy: f64,
    pub is_against: IsAgainst,
    pub evidence_type: EvidenceType,
    pub stance_sentiment_mismatch: bool,
    pub confidence_evidence_mismatch: bool,
    /// Message text, verbatim unless `risk_flag` is set.
    pub text: String,
}

impl CommonDimensions {
    pub fn has_consistency_flag(&self) -> bool {
        self.stance_sentiment_mismatch || self.confidence_evidence_mismatch
    }
}

/// The single category-specific discriminant of a record.
///
/// Serialized externally tagged, so a flattened record carries exactly one
/// of `is_agreeing`, `priority_class`, `actionability`, `impact_direction`
/// or `delivery_status`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CategoryDimension {
    IsAgreeing(IsAgreeing),
    PriorityClass(PriorityClass),
    Actionability(Actionability),
    ImpactDirection(ImpactDirection),
    DeliveryStatus(DeliveryStatus),
}

impl CategoryDimension {
    pub fn category(&self) -> Category {
        match self {
            Self::IsAgreeing(_) => Category::BinaryProposal,
            Self::PriorityClass(_) => Category::PrioritizationRanking,
            Self::Actionability(_) => Category::BrainstormingIdeation,
            Self::ImpactDirection(_) => Category::FeedbackRetrospective,
            Self::DeliveryStatus(_) => Category::ForecastingPlanning,
        }
    }

    /// Label of the chosen option, e.g. `"MUST"`.
    pub fn option(&self) -> &'static str {
        match self {
            Self::IsAgreeing(v) => v.as_str(),
            Self::PriorityClass(v) => v.as_str(),
            Self::Actionability(v) => v.as_str(),
            Self::ImpactDirection(v) => v.as_str(),
            Self::DeliveryStatus(v) => v.as_str(),
        }
    }
}

/// One analysed message. Record `i` belongs to message `i`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DimensionRecord {
    pub message_index: usize,
    pub message_id: Uuid,
    #[serde(flatten)]
    pub common: CommonDimensions,
    #[serde(flatten)]
    pub dimension: CategoryDimension,
}

/// True when the stance and the sentiment point in opposite directions.
pub fn stance_sentiment_mismatch(is_against: IsAgainst, sentiment: Sentiment) -> bool {
    match is_against {
        IsAgainst::Yes => sentiment != Sentiment::Negative,
        IsAgainst::No => sentiment == Sentiment::Negative,
        IsAgainst::Mixed => false,
    }
}

/// True when a HIGH confidence claim rests on the weakest evidence kind.
pub fn confidence_evidence_mismatch(confidence: f64, evidence: EvidenceType) -> bool {
    confidence >= HIGH_CONFIDENCE && evidence == EvidenceType::Assumption
}

// ═══════════════════════════════════════════════════════════════════════
// REPORT: row-oriented tables, payload and narrative
// ═══════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeRow {
    pub theme_label: String,
    pub count: usize,
    pub dominant_option: String,
    /// Share of records in the theme that chose the dominant option.
    pub dom_share: f64,
    /// Weighted share of the dominant option.
    pub consensus: f64,
    pub avg_confidence: f64,
    pub total_weight: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SentimentRow {
    pub theme_label: String,
    pub positive: usize,
    pub neutral: usize,
    pub negative: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EmotionRow {
    pub theme_label: String,
    pub anticipation: usize,
    pub joy: usize,
    pub trust: usize,
    pub surprise: usize,
    pub anger: usize,
    pub fear: usize,
    pub sadness: usize,
    pub disgust: usize,
    pub none: usize,
}

impl EmotionRow {
    pub fn add(&mut self, emotion: Option<Emotion>) {
        let slot = match emotion {
            Some(Emotion::Anticipation) => &mut self.anticipation,
            Some(Emotion::Joy) => &mut self.joy,
            Some(Emotion::Trust) => &mut self.trust,
            Some(Emotion::Surprise) => &mut self.surprise,
            Some(Emotion::Anger) => &mut self.anger,
            Some(Emotion::Fear) => &mut self.fear,
            Some(Emotion::Sadness) => &mut self.sadness,
            Some(Emotion::Disgust) => &mut self.disgust,
            None => &mut self.none,
        };
        *slot += 1;
    }

    pub fn total(&self) -> usize {
        self.anticipation
            + self.joy
            + self.trust
            + self.surprise
            + self.anger
            + self.fear
            + self.sadness
            + self.disgust
            + self.none
    }
}

/// A record's text with the weight that ranked it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WeightedText {
    pub message_index: usize,
    pub theme: String,
    pub option: String,
    pub evidence_type: EvidenceType,
    pub weight: f64,
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TopicSummary {
    pub agreed_topics: Vec<String>,
    pub disagreed_topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvidenceDigest {
    pub top10_weighted_texts: Vec<WeightedText>,
    pub against_top7: Vec<WeightedText>,
    pub highlights_top3: Vec<WeightedText>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThemeScore {
    pub theme: String,
    pub score: f64,
}

/// Category-specific reading of the weighted option distribution.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CategoryInsight {
    /// `verdict` is APPROVE, REJECT, SPLIT or UNDECIDED.
    BinaryVerdict {
        verdict: String,
        yes_share: f64,
        no_share: f64,
        maybe_share: f64,
    },
    /// Themes ranked by weighted MoSCoW score (MUST=3 … WONT=0).
    PrioritizedThemes { ranking: Vec<ThemeScore> },
    QuickWins {
        quick_wins: Vec<String>,
        big_bets: Vec<String>,
    },
    /// `net_impact` in [-1, 1]: weighted HELPED minus weighted HURT.
    NetImpact {
        net_impact: f64,
        direction: ImpactDirection,
    },
    /// Weighted share of AT_RISK and BLOCKED.
    DeliveryRisk {
        risk_share: f64,
        blocked_themes: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payload {
    pub category: Category,
    /// Name of the category-specific field, e.g. `priority_class`.
    pub dimension: String,
    /// Every option of the category, zero-filled.
    pub option_counts: BTreeMap<String, usize>,
    pub option_weights: BTreeMap<String, f64>,
    pub summary: TopicSummary,
    pub evidence: EvidenceDigest,
    pub insight: CategoryInsight,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Summary {
    pub main_summary: String,
    pub conflicting_statement: String,
    pub top_weighted_points: Vec<String>,
}

/// Persisted consensus report.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Report {
    pub theme_board: Vec<ThemeRow>,
    pub sentiment_table: Vec<SentimentRow>,
    pub emotion_table: Vec<EmotionRow>,
    pub payload: Payload,
    pub summary: Summary,
}
