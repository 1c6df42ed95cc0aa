// src/models/quiz.rs

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{config::MIN_REVIEW_REASON_LEN, error::FieldIssue};

/// Question kind: choose one of several answers, or true/false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizKind {
    #[default]
    Multiple,
    Boolean,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    #[default]
    Easy,
    Medium,
    Hard,
}

/// Moderation state of a quiz.
///
/// Every submission starts as `Pending`. The only legal transitions are
/// `Pending -> Approved` and `Pending -> Rejected`; the other states are terminal
/// as far as moderation is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QuizStatus {
    Draft,
    Pending,
    Approved,
    Rejected,
    Archived,
}

impl QuizStatus {
    pub const ALL: [QuizStatus; 5] = [
        QuizStatus::Draft,
        QuizStatus::Pending,
        QuizStatus::Approved,
        QuizStatus::Rejected,
        QuizStatus::Archived,
    ];

    /// Whether the moderation flow may move a quiz from `self` to `next`.
    pub fn can_transition_to(self, next: QuizStatus) -> bool {
        matches!(
            (self, next),
            (QuizStatus::Pending, QuizStatus::Approved) | (QuizStatus::Pending, QuizStatus::Rejected)
        )
    }
}

/// A reviewer's verdict on a pending quiz.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewDecision {
    Approve,
    Reject,
}

impl ReviewDecision {
    pub fn target_status(self) -> QuizStatus {
        match self {
            ReviewDecision::Approve => QuizStatus::Approved,
            ReviewDecision::Reject => QuizStatus::Rejected,
        }
    }

    /// Audit action name, e.g. `quiz.approve`.
    pub fn audit_action(self) -> &'static str {
        match self {
            ReviewDecision::Approve => "quiz.approve",
            ReviewDecision::Reject => "quiz.reject",
        }
    }
}

macro_rules! text_enum {
    ($ty:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(self) -> &'static str {
                match self {
                    $($ty::$variant => $text,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok($ty::$variant),)+
                    other => Err(format!("unknown {} value '{}'", stringify!($ty), other)),
                }
            }
        }
    };
}

text_enum!(QuizKind { Multiple => "multiple", Boolean => "boolean" });
text_enum!(Difficulty { Easy => "easy", Medium => "medium", Hard => "hard" });
text_enum!(QuizStatus {
    Draft => "draft",
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
    Archived => "archived",
});
text_enum!(ReviewDecision { Approve => "approve", Reject => "reject" });

/// Who submitted the quiz and when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmissionInfo {
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
}

/// Outcome of a review, shared by quizzes and submissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewInfo {
    /// Administrator id.
    pub reviewed_by: i64,
    pub reviewed_at: DateTime<Utc>,
    pub decision: QuizStatus,
    pub reason: Option<String>,
}

/// Popularity bookkeeping updated by the serve-count ledger.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServeMetrics {
    pub served_count: i64,
    pub last_served_at: Option<DateTime<Utc>>,
}

/// A crowd-sourced quiz item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quiz {
    pub id: i64,
    pub question: String,
    #[serde(rename = "type")]
    pub kind: QuizKind,
    /// Always lower-cased and trimmed.
    pub category: String,
    /// Empty for boolean questions.
    pub answers: Vec<String>,
    pub correct_answer: i32,
    pub difficulty: Difficulty,
    pub author: String,
    pub status: QuizStatus,
    pub submission: SubmissionInfo,
    pub review: Option<ReviewInfo>,
    pub metadata: ServeMetrics,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// DTO for submitting a new quiz.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SubmitQuizRequest {
    #[validate(length(min = 10, max = 1000, message = "Question must be between 10 and 1000 characters."))]
    pub question: String,

    #[serde(rename = "type", default)]
    pub kind: QuizKind,

    #[validate(length(min = 3, max = 100, message = "Category must be between 3 and 100 characters."))]
    pub category: String,

    #[serde(default)]
    #[validate(length(max = 6, message = "At most 6 answers are allowed."), custom(function = validate_answers))]
    pub answers: Vec<String>,

    #[validate(range(min = 0, message = "Correct answer index cannot be negative."))]
    pub correct_answer: i32,

    #[validate(length(min = 2, max = 100, message = "Author must be between 2 and 100 characters."))]
    pub author: String,

    #[serde(default)]
    pub difficulty: Difficulty,
}

fn validate_answers(answers: &[String]) -> Result<(), validator::ValidationError> {
    for answer in answers {
        if answer.is_empty() {
            return Err(validator::ValidationError::new("empty_answer")
                .with_message("Answers cannot be empty.".into()));
        }
        if answer.chars().count() > 500 {
            return Err(validator::ValidationError::new("answer_too_long")
                .with_message("Answers must be at most 500 characters.".into()));
        }
    }
    Ok(())
}

impl SubmitQuizRequest {
    /// Trims text fields and lower-cases the category.
    pub fn normalized(mut self) -> Self {
        self.question = self.question.trim().to_string();
        self.category = normalize_category(&self.category);
        self.author = self.author.trim().to_string();
        self.answers = self.answers.iter().map(|a| a.trim().to_string()).collect();
        self
    }

    /// Checks the answer layout against the question kind.
    ///
    /// * `multiple`: 2..=6 answers, `correct_answer` indexes one of them.
    /// * `boolean`: no answers, `correct_answer` is 0 (false) or 1 (true).
    pub fn shape_issues(&self) -> Vec<FieldIssue> {
        let mut issues = Vec::new();
        match self.kind {
            QuizKind::Multiple => {
                if self.answers.len() < 2 {
                    issues.push(FieldIssue::new(
                        "answers",
                        "Multiple choice questions require at least 2 answers",
                    ));
                }
                if self.correct_answer < 0 || self.correct_answer as usize >= self.answers.len() {
                    issues.push(FieldIssue::new(
                        "correct_answer",
                        "Correct answer index must reference one of the provided answers",
                    ));
                }
            }
            QuizKind::Boolean => {
                if !self.answers.is_empty() {
                    issues.push(FieldIssue::new(
                        "answers",
                        "Boolean questions should not include answers",
                    ));
                }
                if !matches!(self.correct_answer, 0 | 1) {
                    issues.push(FieldIssue::new(
                        "correct_answer",
                        "Boolean questions require correct_answer to be 0 (false) or 1 (true)",
                    ));
                }
            }
        }
        issues
    }
}

pub fn normalize_category(category: &str) -> String {
    category.trim().to_lowercase()
}

/// Body of a review call. The decision comes from the route.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewRequest {
    pub reason: Option<String>,
}

impl ReviewRequest {
    /// Trimmed reason, or `None` if absent or blank.
    pub fn reason(&self) -> Option<String> {
        self.reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
    }

    pub fn reason_issue(reason: Option<&str>) -> Option<FieldIssue> {
        match reason {
            Some(r) if r.chars().count() < MIN_REVIEW_REASON_LEN => Some(FieldIssue::new(
                "reason",
                format!("Please provide a reason with at least {} characters", MIN_REVIEW_REASON_LEN),
            )),
            _ => None,
        }
    }
}

/// Partial predicate over approved quizzes. `None` fields are unconstrained.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct QuizFilters {
    pub category: Option<String>,
    pub difficulty: Option<Difficulty>,
    #[serde(rename = "type")]
    pub kind: Option<QuizKind>,
    /// Case-insensitive substring of the author name.
    pub author: Option<String>,
}

impl QuizFilters {
    /// Trims text filters, lower-cases the category and drops blank values.
    pub fn normalized(self) -> Self {
        let clean = |value: Option<String>| {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        Self {
            category: clean(self.category).map(|c| c.to_lowercase()),
            difficulty: self.difficulty,
            kind: self.kind,
            author: clean(self.author),
        }
    }

    /// Whether an approved quiz satisfies every specified filter.
    /// Quizzes that are not approved never match.
    pub fn matches(&self, quiz: &Quiz) -> bool {
        if quiz.status != QuizStatus::Approved {
            return false;
        }
        if let Some(category) = &self.category {
            if quiz.category != category.to_lowercase() {
                return false;
            }
        }
        if let Some(difficulty) = self.difficulty {
            if quiz.difficulty != difficulty {
                return false;
            }
        }
        if let Some(kind) = self.kind {
            if quiz.kind != kind {
                return false;
            }
        }
        if let Some(author) = &self.author {
            if !quiz.author.to_lowercase().contains(&author.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// Distinct filterable values across approved quizzes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSnapshot {
    pub categories: Vec<String>,
    pub authors: Vec<String>,
    pub difficulties: Vec<String>,
    pub types: Vec<String>,
}

/// Result of a random draw.
#[derive(Debug, Clone, Serialize)]
pub struct RandomQuiz {
    pub quiz: Option<Quiz>,
    pub filters: FilterSnapshot,
}

/// A value and how many quizzes carry it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: String,
    pub count: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: i64,
    pub approved: i64,
    pub rejected: i64,
    pub draft: i64,
    pub archived: i64,
    pub total: i64,
}

impl StatusCounts {
    pub fn add(&mut self, status: QuizStatus, count: i64) {
        match status {
            QuizStatus::Draft => self.draft += count,
            QuizStatus::Pending => self.pending += count,
            QuizStatus::Approved => self.approved += count,
            QuizStatus::Rejected => self.rejected += count,
            QuizStatus::Archived => self.archived += count,
        }
        self.total += count;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SubmissionStats {
    pub pending: i64,
    pub total: i64,
}

/// Catalog-wide aggregate counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct QuizStats {
    pub counts: StatusCounts,
    pub by_difficulty: Vec<ValueCount>,
    /// Approved quizzes only, most frequent first.
    pub by_category: Vec<ValueCount>,
    pub submissions: SubmissionStats,
}

/// Pagination query for listings.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct PageQuery {
    #[serde(default = "default_page")]
    #[validate(range(min = 1, message = "Page must be at least 1."))]
    pub page: u32,

    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 100, message = "Limit must be between 1 and 100."))]
    pub limit: u32,
}

fn default_page() -> u32 {
    1
}

fn default_limit() -> u32 {
    crate::config::DEFAULT_PAGE_LIMIT
}

impl Default for PageQuery {
    fn default() -> Self {
        Self {
            page: default_page(),
            limit: default_limit(),
        }
    }
}

impl PageQuery {
    pub fn offset(&self) -> i64 {
        (i64::from(self.page) - 1) * i64::from(self.limit)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub page: u32,
    pub limit: u32,
    pub total: i64,
    pub total_pages: i64,
}

impl Pagination {
    pub fn new(query: &PageQuery, total: i64) -> Self {
        let limit = i64::from(query.limit.max(1));
        let total_pages = ((total + limit - 1) / limit).max(1);
        Self {
            page: query.page,
            limit: query.limit,
            total,
            total_pages,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingPage {
    pub quizzes: Vec<Quiz>,
    pub pagination: Pagination,
}
