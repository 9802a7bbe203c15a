//! Domain models for Expensa

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of a single expense
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpenseStatus {
    /// Not claimed by any report
    Draft,
    /// Claimed by exactly one drafted or pending report
    Mapped,
    /// Released from a report by an explicit save
    Pending,
    Approved,
    Rejected,
}

impl ExpenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Mapped => "mapped",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

impl std::str::FromStr for ExpenseStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "mapped" => Ok(Self::Mapped),
            "pending" => Ok(Self::Pending),
            // Older rows used "accepted" for the complement of a partial rejection
            "approved" | "accepted" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(format!("Unknown expense status: {}", s)),
        }
    }
}

impl std::fmt::Display for ExpenseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An individual spend record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Expense {
    pub id: i64,
    /// Owning user
    pub user_id: i64,
    pub title: String,
    pub amount: Decimal,
    pub category: String,
    pub date: Option<NaiveDate>,
    pub location: Option<String>,
    pub description: Option<String>,
    /// Reference to the uploaded bill image
    pub image: Option<String>,
    pub status: ExpenseStatus,
    pub created_at: DateTime<Utc>,
}

/// New expense for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewExpense {
    pub title: String,
    pub amount: Decimal,
    pub category: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
}

/// A spending rule for one category on a tier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCategory {
    /// Always lowercase
    pub title: String,
    pub max_amount: Decimal,
    pub enabled: bool,
}

impl TierCategory {
    pub fn new(title: &str, max_amount: Decimal, enabled: bool) -> Self {
        Self {
            title: title.trim().to_lowercase(),
            max_amount,
            enabled,
        }
    }

    /// Title with the first letter capitalised, for display
    pub fn display_title(&self) -> String {
        let mut chars = self.title.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

/// A budget policy profile assigned to users
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tier {
    pub id: i64,
    pub title: String,
    /// Calendar-month cap on committed spend
    pub total_amount: Decimal,
    /// Rank in the approval chain; approvers sit one level above
    pub level: i64,
    pub categories: Vec<TierCategory>,
    pub created_at: DateTime<Utc>,
}

impl Tier {
    /// Look up a category by title, ignoring case
    pub fn category(&self, title: &str) -> Option<&TierCategory> {
        let wanted = title.trim().to_lowercase();
        self.categories.iter().find(|c| c.title == wanted)
    }
}

/// New tier for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTier {
    pub title: String,
    pub level: i64,
    pub categories: Vec<TierCategory>,
    pub total_amount: Decimal,
}

impl NewTier {
    /// Build a tier whose total cap is the sum of its category caps
    pub fn new(title: &str, level: i64, categories: Vec<TierCategory>) -> Self {
        let total_amount = categories.iter().map(|c| c.max_amount).sum();
        Self {
            title: title.to_string(),
            level,
            categories,
            total_amount,
        }
    }
}

/// Whether a user only submits or also approves
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    #[default]
    Submitter,
    Approver,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submitter => "submitter",
            Self::Approver => "approver",
        }
    }
}

impl std::str::FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "submitter" => Ok(Self::Submitter),
            "approver" => Ok(Self::Approver),
            _ => Err(format!("Unknown user type: {}", s)),
        }
    }
}

impl std::fmt::Display for UserType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An employee who submits (and possibly approves) expenses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub employee_id: Option<String>,
    pub name: String,
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub designation: Option<String>,
    pub user_type: UserType,
    pub tier_id: Option<i64>,
    /// Explicitly assigned approver, if any
    pub approver_id: Option<i64>,
    pub location: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// New user for insertion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewUser {
    pub name: String,
    #[serde(default)]
    pub employee_id: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub mobile: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub user_type: UserType,
    #[serde(default)]
    pub tier_id: Option<i64>,
    #[serde(default)]
    pub approver_id: Option<i64>,
    #[serde(default)]
    pub location: Option<String>,
}

/// A back-office administrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Admin {
    pub id: i64,
    pub name: String,
    pub email: Option<String>,
    pub designation: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

/// New admin for insertion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewAdmin {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
}

/// Which collection an actor reference points into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    User,
    Admin,
}

impl ActorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl std::str::FromStr for ActorKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            _ => Err(format!("Unknown actor kind: {}", s)),
        }
    }
}

impl std::fmt::Display for ActorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Reference to either a user or an admin (approver, reimburser, event creator)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub kind: ActorKind,
    pub id: i64,
}

impl ActorRef {
    pub fn user(id: i64) -> Self {
        Self {
            kind: ActorKind::User,
            id,
        }
    }

    pub fn admin(id: i64) -> Self {
        Self {
            kind: ActorKind::Admin,
            id,
        }
    }
}

impl std::fmt::Display for ActorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Event lifecycle, advanced by an external sweep
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    #[default]
    Scheduled,
    InProgress,
    Done,
}

impl EventStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        }
    }
}

impl std::str::FromStr for EventStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "scheduled" => Ok(Self::Scheduled),
            "in_progress" | "inprogress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            _ => Err(format!("Unknown event status: {}", s)),
        }
    }
}

/// An event expenses can be reported against
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub event_name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: EventStatus,
    pub creator: ActorRef,
    pub staff: Vec<i64>,
    pub created_at: DateTime<Utc>,
}

impl Event {
    /// Reports against admin-created events skip budget checks
    pub fn is_admin_event(&self) -> bool {
        self.creator.kind == ActorKind::Admin
    }

    /// Creator or staff member
    pub fn has_participant(&self, user_id: i64) -> bool {
        self.creator == ActorRef::user(user_id) || self.staff.contains(&user_id)
    }
}

/// New event for insertion
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewEvent {
    pub event_name: String,
    pub description: Option<String>,
    pub location: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub creator: ActorRef,
    pub staff: Vec<i64>,
}

/// Report lifecycle
///
/// `drafted -> pending -> {approved, rejected}`, `approved -> reimbursed`.
/// `rejected` and `reimbursed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Drafted,
    Pending,
    Approved,
    Rejected,
    Reimbursed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Drafted => "drafted",
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Reimbursed => "reimbursed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rejected | Self::Reimbursed)
    }

    /// Drafted and pending reports still hold their expenses as `mapped`
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Drafted | Self::Pending)
    }

    /// Approved spend that counts against the monthly cap
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Approved | Self::Reimbursed)
    }

    pub fn can_transition_to(&self, next: ReportStatus) -> bool {
        matches!(
            (self, next),
            (Self::Drafted, Self::Pending)
                | (Self::Pending, Self::Approved)
                | (Self::Pending, Self::Rejected)
                | (Self::Approved, Self::Reimbursed)
        )
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "drafted" => Ok(Self::Drafted),
            "pending" => Ok(Self::Pending),
            "approved" | "accepted" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "reimbursed" => Ok(Self::Reimbursed),
            _ => Err(format!("Unknown report status: {}", s)),
        }
    }
}

impl std::fmt::Display for ReportStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A bundle of expenses undergoing approval as a single unit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    /// Human-readable code, e.g. `Rep#007`
    pub report_id: String,
    pub title: String,
    pub description: Option<String>,
    pub report_date: NaiveDate,
    pub location: Option<String>,
    /// Ordered membership
    pub expense_ids: Vec<i64>,
    pub status: ReportStatus,
    pub user_id: i64,
    pub event_id: Option<i64>,
    pub approver: Option<ActorRef>,
    /// Append-only decision log
    pub reasons: Vec<String>,
    pub reimburser: Option<ActorRef>,
    pub description_finance: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-supplied report metadata for submission
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub report_date: Option<NaiveDate>,
    #[serde(default)]
    pub event_id: Option<i64>,
    /// Create as `drafted` instead of `pending`
    #[serde(default)]
    pub draft: bool,
}

/// Fully resolved row for report insertion
#[derive(Debug, Clone)]
pub struct NewReport {
    pub title: String,
    pub description: Option<String>,
    pub report_date: NaiveDate,
    pub location: Option<String>,
    pub expense_ids: Vec<i64>,
    pub status: ReportStatus,
    pub user_id: i64,
    pub event_id: Option<i64>,
}

/// Partial update of an open report
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReportUpdate {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub report_date: Option<NaiveDate>,
    /// Replacement expense set
    #[serde(default, rename = "expenses")]
    pub expense_ids: Option<Vec<i64>>,
    /// Only `pending` (submitting a draft) is accepted
    #[serde(default)]
    pub status: Option<ReportStatus>,
}

/// What happens to expenses removed from a report by an update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum UpdateMode {
    /// Explicit save: released expenses become `pending`
    Save,
    /// Anything else: released expenses go back to `draft`
    #[default]
    Draft,
}

impl UpdateMode {
    pub fn released_status(&self) -> ExpenseStatus {
        match self {
            Self::Save => ExpenseStatus::Pending,
            Self::Draft => ExpenseStatus::Draft,
        }
    }
}

/// Report plus its resolved expenses and computed totals
#[derive(Debug, Clone, Serialize)]
pub struct ReportDetail {
    #[serde(flatten)]
    pub report: Report,
    pub expenses: Vec<Expense>,
    pub total_amount: Decimal,
    pub expense_count: usize,
}

impl ReportDetail {
    pub fn new(report: Report, expenses: Vec<Expense>) -> Self {
        let total_amount = expenses.iter().map(|e| e.amount).sum();
        let expense_count = expenses.len();
        Self {
            report,
            expenses,
            total_amount,
            expense_count,
        }
    }
}

/// Listing row for reports
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: i64,
    pub report_id: String,
    pub title: String,
    pub status: ReportStatus,
    pub user_id: i64,
    pub total_amount: Decimal,
    pub expense_count: usize,
    pub report_date: NaiveDate,
}

/// Approve or reject
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionAction {
    Approve,
    Reject,
}

impl DecisionAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Approve => "approve",
            Self::Reject => "reject",
        }
    }
}

impl std::str::FromStr for DecisionAction {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "approve" => Ok(Self::Approve),
            "reject" => Ok(Self::Reject),
            _ => Err(format!("Unknown action: {}", s)),
        }
    }
}

/// A status-change record for a user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: i64,
    pub report_id: i64,
    pub user_id: i64,
    pub status: ReportStatus,
    pub is_read: bool,
    pub created_at: DateTime<Utc>,
}

/// New notification for insertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewNotification {
    pub report_id: i64,
    pub user_id: i64,
    pub status: ReportStatus,
}

/// One page of a listing
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: i64,
    pub total: i64,
}

/// Current-month spend against the tier cap
#[derive(Debug, Clone, Serialize)]
pub struct WalletSummary {
    pub total_amount: Decimal,
    pub total_expenses: Decimal,
    pub expenses: Vec<Expense>,
    pub categories: Vec<TierCategory>,
}

/// Who may approve reports for a tier
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "approvers", rename_all = "lowercase")]
pub enum Approvers {
    Users(Vec<User>),
    Admins(Vec<Admin>),
}
