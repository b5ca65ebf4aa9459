//! Rolling per-mode quality feedback aggregation.
//!
//! Each completed job's quality analysis folds into one cumulative
//! record per content mode: rolling score averages, per-dimension
//! trends, clustered issues, and deduplicated strengths. All functions
//! here are pure; persistence lives in the repository layer.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Limits
// ---------------------------------------------------------------------------

/// Issue clusters retained per mode after sorting.
pub const MAX_ISSUE_CLUSTERS: usize = 20;
/// Example strings retained per issue cluster.
pub const MAX_CLUSTER_EXAMPLES: usize = 5;
/// Strength entries retained per mode.
pub const MAX_STRENGTHS: usize = 10;

/// Score delta beyond which a dimension counts as moving. Deltas at
/// exactly the boundary resolve to stable.
pub const TREND_DELTA: f64 = 0.3;

// ---------------------------------------------------------------------------
// Scores and trends
// ---------------------------------------------------------------------------

/// Six quality dimensions scored 0-10 by the reviewer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QualityScores {
    pub accuracy: f64,
    pub clarity: f64,
    pub completeness: f64,
    pub relevance: f64,
    pub structure: f64,
    pub engagement: f64,
}

impl QualityScores {
    /// All-zero scores, used when resetting a mode's record.
    pub fn zero() -> Self {
        Self {
            accuracy: 0.0,
            clarity: 0.0,
            completeness: 0.0,
            relevance: 0.0,
            structure: 0.0,
            engagement: 0.0,
        }
    }

    /// Unweighted mean across the six dimensions.
    pub fn average(&self) -> f64 {
        (self.accuracy
            + self.clarity
            + self.completeness
            + self.relevance
            + self.structure
            + self.engagement)
            / 6.0
    }

    fn map2(self, other: Self, f: impl Fn(f64, f64) -> f64) -> Self {
        Self {
            accuracy: f(self.accuracy, other.accuracy),
            clarity: f(self.clarity, other.clarity),
            completeness: f(self.completeness, other.completeness),
            relevance: f(self.relevance, other.relevance),
            structure: f(self.structure, other.structure),
            engagement: f(self.engagement, other.engagement),
        }
    }
}

/// Direction a score dimension is moving across generations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Stable,
    Declining,
}

/// Per-dimension trends matching [`QualityScores`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreTrends {
    pub accuracy: Trend,
    pub clarity: Trend,
    pub completeness: Trend,
    pub relevance: Trend,
    pub structure: Trend,
    pub engagement: Trend,
}

impl ScoreTrends {
    /// All dimensions stable (first sample, or after a reset).
    pub fn stable() -> Self {
        Self {
            accuracy: Trend::Stable,
            clarity: Trend::Stable,
            completeness: Trend::Stable,
            relevance: Trend::Stable,
            structure: Trend::Stable,
            engagement: Trend::Stable,
        }
    }
}

/// Incremental rolling average: fold one `sample` into an average over
/// `prior_count` samples, rounded to one decimal.
///
/// Applied once per sample from the first sample onward, this equals the
/// unweighted arithmetic mean of all samples seen so far (modulo the
/// per-step rounding).
pub fn rolling_average(old: f64, sample: f64, prior_count: i32) -> f64 {
    let n = f64::from(prior_count.max(0));
    round1(old * (n / (n + 1.0)) + sample * (1.0 / (n + 1.0)))
}

/// Classify a score delta into a [`Trend`]. Strict comparison: a delta
/// of exactly `±TREND_DELTA` is stable.
pub fn trend_for_delta(delta: f64) -> Trend {
    if delta > TREND_DELTA {
        Trend::Improving
    } else if delta < -TREND_DELTA {
        Trend::Declining
    } else {
        Trend::Stable
    }
}

fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

// ---------------------------------------------------------------------------
// Issues
// ---------------------------------------------------------------------------

/// Issue severity. Declaration order defines the ordering used when
/// merging clusters (critical outranks high outranks medium outranks low).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// A single quality problem reported by the reviewer for one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityIssue {
    /// Issue category (e.g. `"factual"`, `"tone"`).
    pub category: String,
    pub severity: Severity,
    /// Agent whose output exhibited the issue.
    pub agent: String,
    pub description: String,
    pub suggested_fix: String,
    /// Short excerpts demonstrating the issue.
    pub examples: Vec<String>,
}

/// A recurring issue aggregated across jobs, keyed by `(agent, category)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueCluster {
    pub agent: String,
    pub category: String,
    /// Highest severity seen across merged occurrences.
    pub severity: Severity,
    /// Latest description.
    pub description: String,
    /// Latest suggested fix.
    pub suggested_fix: String,
    /// Deduplicated examples, capped at [`MAX_CLUSTER_EXAMPLES`].
    pub examples: Vec<String>,
    /// How many jobs reported this issue.
    pub frequency: u32,
}

impl IssueCluster {
    fn from_issue(issue: &QualityIssue) -> Self {
        let mut examples = issue.examples.clone();
        examples.dedup();
        examples.truncate(MAX_CLUSTER_EXAMPLES);
        Self {
            agent: issue.agent.clone(),
            category: issue.category.clone(),
            severity: issue.severity,
            description: issue.description.clone(),
            suggested_fix: issue.suggested_fix.clone(),
            examples,
            frequency: 1,
        }
    }

    /// Fold a newly reported occurrence into this cluster.
    fn absorb(&mut self, issue: &QualityIssue) {
        self.frequency += 1;
        self.severity = self.severity.max(issue.severity);
        self.description = issue.description.clone();
        self.suggested_fix = issue.suggested_fix.clone();
        for example in &issue.examples {
            if self.examples.len() >= MAX_CLUSTER_EXAMPLES {
                break;
            }
            if !self.examples.contains(example) {
                self.examples.push(example.clone());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Analysis and cumulative record
// ---------------------------------------------------------------------------

/// Per-job quality assessment produced by the review step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAnalysis {
    pub scores: QualityScores,
    pub issues: Vec<QualityIssue>,
    pub strengths: Vec<String>,
    pub summary: String,
}

/// The rolling per-mode feedback state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Current rolling averages.
    pub scores: QualityScores,
    /// Averages before the most recent sample was folded in.
    pub previous_scores: QualityScores,
    pub trends: ScoreTrends,
    pub issue_clusters: Vec<IssueCluster>,
    pub strengths: Vec<String>,
    pub summary: String,
    /// Number of analyses folded into this record.
    pub generation_count: i32,
}

impl FeedbackRecord {
    /// Record for a mode's first analysis.
    pub fn first(analysis: &QualityAnalysis) -> Self {
        Self {
            scores: analysis.scores,
            previous_scores: analysis.scores,
            trends: ScoreTrends::stable(),
            issue_clusters: cluster_issues(Vec::new(), &analysis.issues),
            strengths: merge_strengths(&[], &analysis.strengths),
            summary: analysis.summary.clone(),
            generation_count: 1,
        }
    }

    /// Empty record used after an explicit feedback reset.
    pub fn reset() -> Self {
        Self {
            scores: QualityScores::zero(),
            previous_scores: QualityScores::zero(),
            trends: ScoreTrends::stable(),
            issue_clusters: Vec::new(),
            strengths: Vec::new(),
            summary: String::new(),
            generation_count: 0,
        }
    }
}

/// Fold one analysis into an existing record (or start a fresh one).
pub fn merge_analysis(existing: Option<&FeedbackRecord>, analysis: &QualityAnalysis) -> FeedbackRecord {
    let Some(old) = existing else {
        return FeedbackRecord::first(analysis);
    };
    // A cleared record behaves like no record at all.
    if old.generation_count == 0 {
        return FeedbackRecord::first(analysis);
    }

    let n = old.generation_count;
    let scores = old
        .scores
        .map2(analysis.scores, |o, s| rolling_average(o, s, n));
    let deltas = scores.map2(old.scores, |new, prev| new - prev);
    let trends = ScoreTrends {
        accuracy: trend_for_delta(deltas.accuracy),
        clarity: trend_for_delta(deltas.clarity),
        completeness: trend_for_delta(deltas.completeness),
        relevance: trend_for_delta(deltas.relevance),
        structure: trend_for_delta(deltas.structure),
        engagement: trend_for_delta(deltas.engagement),
    };

    FeedbackRecord {
        scores,
        previous_scores: old.scores,
        trends,
        issue_clusters: cluster_issues(old.issue_clusters.clone(), &analysis.issues),
        strengths: merge_strengths(&old.strengths, &analysis.strengths),
        summary: analysis.summary.clone(),
        generation_count: n + 1,
    }
}

/// Merge new issues into existing clusters keyed by `(agent, category)`,
/// then sort by frequency descending (severity descending as tiebreak)
/// and truncate to [`MAX_ISSUE_CLUSTERS`].
pub fn cluster_issues(mut clusters: Vec<IssueCluster>, issues: &[QualityIssue]) -> Vec<IssueCluster> {
    for issue in issues {
        match clusters
            .iter_mut()
            .find(|c| c.agent == issue.agent && c.category == issue.category)
        {
            Some(cluster) => cluster.absorb(issue),
            None => clusters.push(IssueCluster::from_issue(issue)),
        }
    }
    clusters.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then(b.severity.cmp(&a.severity))
    });
    clusters.truncate(MAX_ISSUE_CLUSTERS);
    clusters
}

/// Union of old and new strengths, deduplicated case-insensitively and
/// capped at [`MAX_STRENGTHS`]. Earlier entries win on duplicates.
pub fn merge_strengths(old: &[String], new: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::new();
    for strength in old.iter().chain(new.iter()) {
        if merged.len() >= MAX_STRENGTHS {
            break;
        }
        let lowered = strength.to_lowercase();
        if !merged.iter().any(|s| s.to_lowercase() == lowered) {
            merged.push(strength.clone());
        }
    }
    merged
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
