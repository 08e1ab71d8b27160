//! Reduction of dimension records into the consensus report.
//!
//! Deterministic: the same records always yield the same report. All text
//! in the report is record text, which is already redacted.

use std::collections::{BTreeMap, HashMap};

use super::error::PipelineError;
use super::types::*;
use crate::models::enums::*;
use crate::models::Discussion;
use crate::pipeline::structuring::truncate_to_max_chars;

/// Label of the cross-theme row appended to the sentiment and emotion tables.
pub const OVERALL_LABEL: &str = "(all themes)";

const TOP_WEIGHTED_POINTS: usize = 5;
const TOP_WEIGHTED_TEXTS: usize = 10;
const AGAINST_TEXTS: usize = 7;
const HIGHLIGHTS: usize = 3;
const AGREED_CONSENSUS: f64 = 0.7;
const DISAGREED_CONSENSUS: f64 = 0.6;
const QUOTE_CHARS: usize = 200;

/// Influence of one record on the report.
pub fn record_weight(common: &CommonDimensions) -> f64 {
    let mut weight = common.confidence
        * common.evidence_type.weight()
        * (0.5 + 0.5 * common.relevancy);
    if common.is_critical_opinion {
        weight *= 1.5;
    }
    if common.has_consistency_flag() {
        weight *= 0.8;
    }
    weight
}

fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

fn pct(share: f64) -> i64 {
    (share * 100.0).round() as i64
}

/// Per-option tally in declaration order.
struct Tally {
    options: Vec<&'static str>,
    counts: Vec<usize>,
    weights: Vec<f64>,
}

impl Tally {
    fn new(category: Category) -> Self {
        let options = category.dimension_options();
        let n = options.len();
        Self {
            options,
            counts: vec![0; n],
            weights: vec![0.0; n],
        }
    }

    fn add(&mut self, option: &str, weight: f64) {
        if let Some(i) = self.options.iter().position(|o| *o == option) {
            self.counts[i] += 1;
            self.weights[i] += weight;
        }
    }

    fn total_count(&self) -> usize {
        self.counts.iter().sum()
    }

    fn total_weight(&self) -> f64 {
        self.weights.iter().sum()
    }

    /// Weighted shares, falling back to count shares when all weights are 0.
    fn shares(&self) -> Vec<f64> {
        let total_w = self.total_weight();
        if total_w > 0.0 {
            return self.weights.iter().map(|w| w / total_w).collect();
        }
        let total_c = self.total_count();
        if total_c == 0 {
            return vec![0.0; self.options.len()];
        }
        self.counts.iter().map(|c| *c as f64 / total_c as f64).collect()
    }

    fn share_of(&self, option: &str) -> f64 {
        self.options
            .iter()
            .position(|o| *o == option)
            .map(|i| self.shares()[i])
            .unwrap_or(0.0)
    }

    /// Most chosen option; ties go to the heavier, then the earlier declared.
    fn dominant(&self) -> usize {
        let mut best = 0;
        for i in 1..self.options.len() {
            let better_count = self.counts[i] > self.counts[best];
            let tie_heavier = self.counts[i] == self.counts[best] && self.weights[i] > self.weights[best];
            if better_count || tie_heavier {
                best = i;
            }
        }
        best
    }
}

struct ThemeGroup<'a> {
    label: String,
    records: Vec<&'a DimensionRecord>,
}

/// Group by case-insensitive theme, keeping first-seen order and label.
fn group_by_theme(records: &[DimensionRecord]) -> Vec<ThemeGroup<'_>> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<ThemeGroup<'_>> = Vec::new();
    for record in records {
        let key = record.common.theme.to_lowercase();
        let slot = *index.entry(key).or_insert_with(|| {
            groups.push(ThemeGroup {
                label: record.common.theme.clone(),
                records: Vec::new(),
            });
            groups.len() - 1
        });
        groups[slot].records.push(record);
    }
    groups
}

fn theme_tally(category: Category, group: &ThemeGroup<'_>) -> Tally {
    let mut tally = Tally::new(category);
    for record in &group.records {
        tally.add(record.dimension.option(), record_weight(&record.common));
    }
    tally
}

fn theme_row(category: Category, group: &ThemeGroup<'_>) -> ThemeRow {
    let tally = theme_tally(category, group);
    let count = group.records.len();
    let dominant = tally.dominant();
    let dom_share = tally.counts[dominant] as f64 / count as f64;
    let total_weight = tally.total_weight();
    let consensus = if total_weight > 0.0 {
        tally.weights[dominant] / total_weight
    } else {
        dom_share
    };
    let avg_confidence =
        group.records.iter().map(|r| r.common.confidence).sum::<f64>() / count as f64;

    ThemeRow {
        theme_label: group.label.clone(),
        count,
        dominant_option: tally.options[dominant].to_string(),
        dom_share: round4(dom_share),
        consensus: round4(consensus),
        avg_confidence: round4(avg_confidence),
        total_weight: round4(total_weight),
    }
}

fn sentiment_row<'a>(label: &str, records: impl Iterator<Item = &'a DimensionRecord>) -> SentimentRow {
    let mut row = SentimentRow {
        theme_label: label.to_string(),
        ..SentimentRow::default()
    };
    for record in records {
        match record.common.sentiment {
            Sentiment::Positive => row.positive += 1,
            Sentiment::Neutral => row.neutral += 1,
            Sentiment::Negative => row.negative += 1,
        }
    }
    row
}

fn emotion_row<'a>(label: &str, records: impl Iterator<Item = &'a DimensionRecord>) -> EmotionRow {
    let mut row = EmotionRow {
        theme_label: label.to_string(),
        ..EmotionRow::default()
    };
    for record in records {
        row.add(record.common.emotion);
    }
    row
}

fn weighted_text(record: &DimensionRecord) -> WeightedText {
    WeightedText {
        message_index: record.message_index,
        theme: record.common.theme.clone(),
        option: record.dimension.option().to_string(),
        evidence_type: record.common.evidence_type,
        weight: round4(record_weight(&record.common)),
        text: record.common.text.clone(),
    }
}

/// Records by weight, heaviest first; ties keep message order.
fn rank_records(records: &[DimensionRecord]) -> Vec<&DimensionRecord> {
    let mut ranked: Vec<&DimensionRecord> = records.iter().collect();
    ranked.sort_by(|a, b| {
        record_weight(&b.common)
            .total_cmp(&record_weight(&a.common))
            .then(a.message_index.cmp(&b.message_index))
    });
    ranked
}

fn category_insight(
    category: Category,
    overall: &Tally,
    groups: &[ThemeGroup<'_>],
    rows: &[ThemeRow],
) -> CategoryInsight {
    match category {
        Category::BinaryProposal => {
            let yes = overall.share_of(IsAgreeing::Yes.as_str());
            let no = overall.share_of(IsAgreeing::No.as_str());
            let maybe = overall.share_of(IsAgreeing::Maybe.as_str());
            let verdict = if overall.total_count() == 0 {
                "UNDECIDED"
            } else if yes >= 0.6 {
                "APPROVE"
            } else if no >= 0.6 {
                "REJECT"
            } else if yes + no >= maybe {
                "SPLIT"
            } else {
                "UNDECIDED"
            };
            CategoryInsight::BinaryVerdict {
                verdict: verdict.to_string(),
                yes_share: round4(yes),
                no_share: round4(no),
                maybe_share: round4(maybe),
            }
        }
        Category::PrioritizationRanking => {
            let mut ranking: Vec<ThemeScore> = groups
                .iter()
                .map(|group| {
                    let score_of = |r: &DimensionRecord| match r.dimension {
                        CategoryDimension::PriorityClass(PriorityClass::Must) => 3.0,
                        CategoryDimension::PriorityClass(PriorityClass::Should) => 2.0,
                        CategoryDimension::PriorityClass(PriorityClass::Could) => 1.0,
                        _ => 0.0,
                    };
                    let total_w: f64 = group.records.iter().map(|r| record_weight(&r.common)).sum();
                    let score = if total_w > 0.0 {
                        group
                            .records
                            .iter()
                            .map(|r| score_of(*r) * record_weight(&r.common))
                            .sum::<f64>()
                            / total_w
                    } else {
                        group.records.iter().map(|r| score_of(*r)).sum::<f64>()
                            / group.records.len() as f64
                    };
                    ThemeScore {
                        theme: group.label.clone(),
                        score: round4(score),
                    }
                })
                .collect();
            ranking.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.theme.cmp(&b.theme)));
            CategoryInsight::PrioritizedThemes { ranking }
        }
        Category::BrainstormingIdeation => {
            let themes_with = |option: Actionability| {
                rows.iter()
                    .filter(|r| r.dominant_option == option.as_str())
                    .map(|r| r.theme_label.clone())
                    .collect::<Vec<_>>()
            };
            CategoryInsight::QuickWins {
                quick_wins: themes_with(Actionability::QuickWin),
                big_bets: themes_with(Actionability::BigBet),
            }
        }
        Category::FeedbackRetrospective => {
            let net = overall.share_of(ImpactDirection::Helped.as_str())
                - overall.share_of(ImpactDirection::Hurt.as_str());
            let direction = if net > 0.1 {
                ImpactDirection::Helped
            } else if net < -0.1 {
                ImpactDirection::Hurt
            } else {
                ImpactDirection::Neutral
            };
            CategoryInsight::NetImpact {
                net_impact: round4(net),
                direction,
            }
        }
        Category::ForecastingPlanning => {
            let risk_share = overall.share_of(DeliveryStatus::AtRisk.as_str())
                + overall.share_of(DeliveryStatus::Blocked.as_str());
            let blocked: Vec<String> = rows
                .iter()
                .filter(|row| {
                    groups
                        .iter()
                        .find(|g| g.label == row.theme_label)
                        .is_some_and(|g| {
                            g.records.iter().any(|r| {
                                r.dimension == CategoryDimension::DeliveryStatus(DeliveryStatus::Blocked)
                            })
                        })
                })
                .map(|row| row.theme_label.clone())
                .collect();
            CategoryInsight::DeliveryRisk {
                risk_share: round4(risk_share),
                blocked_themes: blocked,
            }
        }
    }
}

fn quote(text: &str) -> String {
    format!("\"{}\"", truncate_to_max_chars(text, QUOTE_CHARS))
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

fn main_summary(
    discussion: &Discussion,
    category: Category,
    records: &[DimensionRecord],
    rows: &[ThemeRow],
    overall: &Tally,
) -> String {
    let Some(top) = rows.first() else {
        return format!(
            "No messages were available to analyse in \"{}\".",
            discussion.name
        );
    };

    let n = records.len() as f64;
    let sentiment = sentiment_row("", records.iter());
    let leading = overall.dominant();

    let mut summary = format!(
        "Analysed {} in \"{}\" as {}. The theme carrying the most weight is \"{}\" ({}). \
         Sentiment is {}% positive, {}% neutral and {}% negative. \
         The leading {} is {} with {}% of weighted support.",
        plural(records.len(), "message"),
        discussion.name,
        category.label(),
        top.theme_label,
        plural(top.count, "message"),
        pct(sentiment.positive as f64 / n),
        pct(sentiment.neutral as f64 / n),
        pct(sentiment.negative as f64 / n),
        category.dimension_field(),
        overall.options[leading],
        pct(overall.shares()[leading]),
    );

    let redacted = records.iter().filter(|r| r.common.risk_flag).count();
    if redacted > 0 {
        summary.push_str(&format!(
            " {} contained content that was redacted.",
            plural(redacted, "message")
        ));
    }
    summary
}

/// Heaviest record of `option` inside a theme group.
fn strongest<'a>(group: &ThemeGroup<'a>, option: &str) -> Option<&'a DimensionRecord> {
    group
        .records
        .iter()
        .copied()
        .filter(|r| r.dimension.option() == option)
        .max_by(|a, b| {
            record_weight(&a.common)
                .total_cmp(&record_weight(&b.common))
                .then(b.message_index.cmp(&a.message_index))
        })
}

fn conflicting_statement(
    category: Category,
    records: &[DimensionRecord],
    groups: &[ThemeGroup<'_>],
) -> String {
    // Most contested theme: the largest runner-up share.
    let mut best: Option<(f64, &ThemeGroup<'_>, usize, usize, Vec<f64>)> = None;
    for group in groups.iter().filter(|g| g.records.len() >= 2) {
        let tally = theme_tally(category, group);
        let shares = tally.shares();
        let mut order: Vec<usize> = (0..shares.len()).filter(|i| tally.counts[*i] > 0).collect();
        if order.len() < 2 {
            continue;
        }
        order.sort_by(|a, b| shares[*b].total_cmp(&shares[*a]).then(a.cmp(b)));
        let runner_up = shares[order[1]];
        if best.as_ref().map_or(true, |(s, ..)| runner_up > *s) {
            best = Some((runner_up, group, order[0], order[1], shares));
        }
    }

    if let Some((_, group, first, second, shares)) = best {
        let options = category.dimension_options();
        let mut statement = format!(
            "The sharpest disagreement is on \"{}\": {} holds {}% of the weight against {}% for {}.",
            group.label,
            options[first],
            pct(shares[first]),
            pct(shares[second]),
            options[second],
        );
        if let (Some(a), Some(b)) = (strongest(group, options[first]), strongest(group, options[second])) {
            statement.push_str(&format!(
                " One side: {}. The other: {}.",
                quote(&a.common.text),
                quote(&b.common.text)
            ));
        }
        return statement;
    }

    let against: Vec<&DimensionRecord> = rank_records(records)
        .into_iter()
        .filter(|r| r.common.is_against == IsAgainst::Yes)
        .collect();
    let supporting = records
        .iter()
        .filter(|r| r.common.is_against == IsAgainst::No)
        .count();
    if let Some(objection) = against.first() {
        if supporting > 0 {
            let verb = |n: usize, one: &'static str, many: &'static str| if n == 1 { one } else { many };
            return format!(
                "{} {} the proposition while {} {} it. Strongest objection: {}.",
                plural(against.len(), "message"),
                verb(against.len(), "opposes", "oppose"),
                supporting,
                verb(supporting, "supports", "support"),
                quote(&objection.common.text)
            );
        }
    }

    "No significant disagreement was found among the messages.".to_string()
}

/// Build the consensus report for `records` under `category`.
///
/// Records must be in message order and carry the category's discriminant.
pub fn aggregate(
    discussion: &Discussion,
    category: Category,
    records: &[DimensionRecord],
) -> Result<Report, PipelineError> {
    for (i, record) in records.iter().enumerate() {
        if record.message_index != i {
            return Err(PipelineError::Validation(format!(
                "record {i} is aligned to message {}",
                record.message_index
            )));
        }
        if record.dimension.category() != category {
            return Err(PipelineError::Validation(format!(
                "record {i} carries {} under {category}",
                record.dimension.category().dimension_field()
            )));
        }
    }

    let groups = group_by_theme(records);

    let mut theme_board: Vec<ThemeRow> = groups.iter().map(|g| theme_row(category, g)).collect();
    theme_board.sort_by(|a, b| {
        b.total_weight
            .total_cmp(&a.total_weight)
            .then(b.count.cmp(&a.count))
            .then(a.theme_label.cmp(&b.theme_label))
    });

    let ordered_groups: Vec<&ThemeGroup<'_>> = theme_board
        .iter()
        .filter_map(|row| groups.iter().find(|g| g.label == row.theme_label))
        .collect();

    let mut sentiment_table: Vec<SentimentRow> = ordered_groups
        .iter()
        .map(|g| sentiment_row(&g.label, g.records.iter().copied()))
        .collect();
    let mut emotion_table: Vec<EmotionRow> = ordered_groups
        .iter()
        .map(|g| emotion_row(&g.label, g.records.iter().copied()))
        .collect();
    if !records.is_empty() {
        sentiment_table.push(sentiment_row(OVERALL_LABEL, records.iter()));
        emotion_table.push(emotion_row(OVERALL_LABEL, records.iter()));
    }

    let mut overall = Tally::new(category);
    for record in records {
        overall.add(record.dimension.option(), record_weight(&record.common));
    }

    let option_counts: BTreeMap<String, usize> = overall
        .options
        .iter()
        .zip(&overall.counts)
        .map(|(o, c)| (o.to_string(), *c))
        .collect();
    let option_weights: BTreeMap<String, f64> = overall
        .options
        .iter()
        .zip(&overall.weights)
        .map(|(o, w)| (o.to_string(), round4(*w)))
        .collect();

    let summary_topics = TopicSummary {
        agreed_topics: theme_board
            .iter()
            .filter(|r| r.count >= 2 && r.consensus >= AGREED_CONSENSUS)
            .map(|r| r.theme_label.clone())
            .collect(),
        disagreed_topics: theme_board
            .iter()
            .filter(|r| r.count >= 2 && r.consensus < DISAGREED_CONSENSUS)
            .map(|r| r.theme_label.clone())
            .collect(),
    };

    let ranked = rank_records(records);
    let evidence = EvidenceDigest {
        top10_weighted_texts: ranked.iter().take(TOP_WEIGHTED_TEXTS).map(|r| weighted_text(r)).collect(),
        against_top7: ranked
            .iter()
            .filter(|r| r.common.is_against == IsAgainst::Yes)
            .take(AGAINST_TEXTS)
            .map(|r| weighted_text(r))
            .collect(),
        highlights_top3: ranked
            .iter()
            .filter(|r| r.common.is_critical_opinion)
            .take(HIGHLIGHTS)
            .map(|r| weighted_text(r))
            .collect(),
    };

    let insight = category_insight(category, &overall, &groups, &theme_board);

    let summary = Summary {
        main_summary: main_summary(discussion, category, records, &theme_board, &overall),
        conflicting_statement: conflicting_statement(category, records, &groups),
        top_weighted_points: ranked
            .iter()
            .take(TOP_WEIGHTED_POINTS)
            .map(|r| r.common.text.clone())
            .collect(),
    };

    Ok(Report {
        theme_board,
        sentiment_table,
        emotion_table,
        payload: Payload {
            category,
            dimension: category.dimension_field().to_string(),
            option_counts,
            option_weights,
            summary: summary_topics,
            evidence,
            insight,
        },
        summary,
    })
}
