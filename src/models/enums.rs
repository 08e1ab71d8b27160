use crate::db::DatabaseError;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern.
///
/// The string form doubles as the serde/JSON Schema label, so the wire
/// format, the database column and the LLM output contract never drift.
macro_rules! str_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
        )]
        pub enum $name {
            $(#[serde(rename = $s)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$(Self::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(
    /// Topic category of a discussion. Gates which extraction schema applies.
    Category {
        BinaryProposal => "BINARY_PROPOSAL",
        PrioritizationRanking => "PRIORITIZATION_RANKING",
        BrainstormingIdeation => "BRAINSTORMING_IDEATION",
        FeedbackRetrospective => "FEEDBACK_RETROSPECTIVE",
        ForecastingPlanning => "FORECASTING_PLANNING",
    }
);

impl Category {
    /// Name of the category-specific field every dimension record carries.
    pub fn dimension_field(&self) -> &'static str {
        match self {
            Self::BinaryProposal => "is_agreeing",
            Self::PrioritizationRanking => "priority_class",
            Self::BrainstormingIdeation => "actionability",
            Self::FeedbackRetrospective => "impact_direction",
            Self::ForecastingPlanning => "delivery_status",
        }
    }

    /// Allowed labels of the category-specific field, in declaration order.
    pub fn dimension_options(&self) -> Vec<&'static str> {
        match self {
            Self::BinaryProposal => IsAgreeing::ALL.iter().map(|v| v.as_str()).collect(),
            Self::PrioritizationRanking => PriorityClass::ALL.iter().map(|v| v.as_str()).collect(),
            Self::BrainstormingIdeation => Actionability::ALL.iter().map(|v| v.as_str()).collect(),
            Self::FeedbackRetrospective => ImpactDirection::ALL.iter().map(|v| v.as_str()).collect(),
            Self::ForecastingPlanning => DeliveryStatus::ALL.iter().map(|v| v.as_str()).collect(),
        }
    }

    /// Human-readable label for narrative text.
    pub fn label(&self) -> &'static str {
        match self {
            Self::BinaryProposal => "a yes/no proposal",
            Self::PrioritizationRanking => "a prioritization exercise",
            Self::BrainstormingIdeation => "a brainstorming session",
            Self::FeedbackRetrospective => "a feedback retrospective",
            Self::ForecastingPlanning => "a forecasting and planning discussion",
        }
    }
}

str_enum!(
    /// Pre-assigned discussion template chosen at creation time.
    DiscussionTemplate {
        FeaturePrioritization => "FEATURE_PRIORITIZATION",
        PolicyFeedback => "POLICY_FEEDBACK",
        ToolAdoption => "TOOL_ADOPTION",
    }
);

impl DiscussionTemplate {
    /// Fixed template → category table used by the classifier fast path.
    pub fn category(&self) -> Category {
        match self {
            Self::FeaturePrioritization => Category::PrioritizationRanking,
            Self::PolicyFeedback => Category::FeedbackRetrospective,
            Self::ToolAdoption => Category::BinaryProposal,
        }
    }
}

str_enum!(
    /// Persisted state of the report job for a discussion.
    ReportState {
        Pending => "PENDING",
        CategoryResolved => "CATEGORY_RESOLVED",
        DimensionsExtracted => "DIMENSIONS_EXTRACTED",
        Complete => "COMPLETE",
        Failed => "FAILED",
    }
);

impl ReportState {
    /// Progress fraction persisted alongside the state. `None` for FAILED.
    pub fn progress(&self) -> Option<f64> {
        match self {
            Self::Pending => Some(0.0),
            Self::CategoryResolved => Some(0.1),
            Self::DimensionsExtracted => Some(0.5),
            Self::Complete => Some(1.0),
            Self::Failed => None,
        }
    }

    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Pending | Self::CategoryResolved | Self::DimensionsExtracted
        )
    }
}

str_enum!(Sentiment {
    Positive => "POSITIVE",
    Neutral => "NEUTRAL",
    Negative => "NEGATIVE",
});

str_enum!(Emotion {
    Anticipation => "ANTICIPATION",
    Joy => "JOY",
    Trust => "TRUST",
    Surprise => "SURPRISE",
    Anger => "ANGER",
    Fear => "FEAR",
    Sadness => "SADNESS",
    Disgust => "DISGUST",
});

str_enum!(
    /// Stance against the main proposition.
    IsAgainst {
        Yes => "YES",
        No => "NO",
        Mixed => "MIXED",
    }
);

str_enum!(
    /// Strongest evidence kind present in a message, strongest first.
    EvidenceType {
        Data => "DATA",
        Benchmark => "BENCHMARK",
        Citation => "CITATION",
        ExpertOpinion => "EXPERT_OPINION",
        Anecdote => "ANECDOTE",
        Assumption => "ASSUMPTION",
    }
);

impl EvidenceType {
    /// Evidence strength used when weighting points for the report.
    pub fn weight(&self) -> f64 {
        match self {
            Self::Data => 1.0,
            Self::Benchmark => 0.9,
            Self::Citation => 0.8,
            Self::ExpertOpinion => 0.7,
            Self::Anecdote => 0.5,
            Self::Assumption => 0.3,
        }
    }
}

str_enum!(IsAgreeing {
    Yes => "YES",
    No => "NO",
    Maybe => "MAYBE",
});

str_enum!(
    /// MoSCoW priority class.
    PriorityClass {
        Must => "MUST",
        Should => "SHOULD",
        Could => "COULD",
        Wont => "WONT",
    }
);

str_enum!(Actionability {
    QuickWin => "QUICK_WIN",
    NeedsResearch => "NEEDS_RESEARCH",
    BigBet => "BIG_BET",
    NotUseful => "NOT_USEFUL",
});

str_enum!(ImpactDirection {
    Helped => "HELPED",
    Neutral => "NEUTRAL",
    Hurt => "HURT",
});

str_enum!(DeliveryStatus {
    Ahead => "AHEAD",
    OnTrack => "ON_TRACK",
    AtRisk => "AT_RISK",
    Blocked => "BLOCKED",
});
