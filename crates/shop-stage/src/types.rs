use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

// ---------------------------------------------------------------------------
// Stage
// ---------------------------------------------------------------------------

/// Pipeline stage of a work order.
///
/// Every variant except [`Stage::Canceled`] is a member of [`Stage::SEQUENCE`].
/// Canceled is terminal and out-of-band: it has no position in the ordering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Reception,
    Diagnostic,
    PendingQuote,
    AwaitingApproval,
    AttentionRequired,
    InRepair,
    QualityControl,
    ReadyForDelivery,
    Delivered,
    Canceled,
}

impl Stage {
    /// The ordered repair pipeline. Position in this array is the stage index.
    pub const SEQUENCE: [Stage; 9] = [
        Stage::Reception,
        Stage::Diagnostic,
        Stage::PendingQuote,
        Stage::AwaitingApproval,
        Stage::AttentionRequired,
        Stage::InRepair,
        Stage::QualityControl,
        Stage::ReadyForDelivery,
        Stage::Delivered,
    ];

    /// Position in [`Stage::SEQUENCE`]. `None` for Canceled.
    pub fn index(&self) -> Option<usize> {
        Self::SEQUENCE.iter().position(|s| s == self)
    }

    /// Signed rank used for "has it advanced past X" comparisons.
    /// Canceled ranks as -1, i.e. before the start of the sequence.
    pub fn rank(&self) -> isize {
        self.index().map(|i| i as isize).unwrap_or(-1)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Reception => "reception",
            Stage::Diagnostic => "diagnostic",
            Stage::PendingQuote => "pending_quote",
            Stage::AwaitingApproval => "awaiting_approval",
            Stage::AttentionRequired => "attention_required",
            Stage::InRepair => "in_repair",
            Stage::QualityControl => "quality_control",
            Stage::ReadyForDelivery => "ready_for_delivery",
            Stage::Delivered => "delivered",
            Stage::Canceled => "canceled",
        }
    }

    /// Lenient parse of a stored stage string.
    ///
    /// Case-insensitive; `-` and spaces are accepted in place of `_`.
    /// Both spellings of canceled are recognized.
    pub fn parse(s: &str) -> Option<Stage> {
        let norm = s
            .trim()
            .to_ascii_lowercase()
            .replace(|c: char| c == '-' || c == ' ', "_");
        if norm == "cancelled" {
            return Some(Stage::Canceled);
        }
        Self::SEQUENCE
            .iter()
            .chain(std::iter::once(&Stage::Canceled))
            .copied()
            .find(|st| st.as_str() == norm)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stage value as found in storage.
///
/// Stored data may carry values this crate does not recognize. Those are kept
/// verbatim so they can be reported and written back unchanged.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StoredStage {
    Known(Stage),
    Unknown(String),
}

impl StoredStage {
    pub fn known(&self) -> Option<Stage> {
        match self {
            StoredStage::Known(s) => Some(*s),
            StoredStage::Unknown(_) => None,
        }
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, StoredStage::Known(Stage::Canceled))
    }

    /// Unknown values rank as -1 so they never block advancement.
    pub fn rank(&self) -> isize {
        self.known().map(|s| s.rank()).unwrap_or(-1)
    }

    pub fn as_str(&self) -> &str {
        match self {
            StoredStage::Known(s) => s.as_str(),
            StoredStage::Unknown(raw) => raw,
        }
    }
}

impl From<String> for StoredStage {
    fn from(raw: String) -> Self {
        match Stage::parse(&raw) {
            Some(s) => StoredStage::Known(s),
            None => StoredStage::Unknown(raw),
        }
    }
}

impl From<&str> for StoredStage {
    fn from(raw: &str) -> Self {
        StoredStage::from(raw.to_string())
    }
}

impl From<Stage> for StoredStage {
    fn from(s: Stage) -> Self {
        StoredStage::Known(s)
    }
}

impl From<StoredStage> for String {
    fn from(s: StoredStage) -> Self {
        match s {
            StoredStage::Known(st) => st.as_str().to_string(),
            StoredStage::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for StoredStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Work order status
// ---------------------------------------------------------------------------

/// Lifecycle flag of a work order, orthogonal to its pipeline stage.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum WorkOrderStatus {
    #[default]
    Open,
    Invoiced,
    Canceled,
    Other(String),
}

impl WorkOrderStatus {
    pub fn is_canceled(&self) -> bool {
        matches!(self, WorkOrderStatus::Canceled)
    }
}

impl From<String> for WorkOrderStatus {
    fn from(raw: String) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" => WorkOrderStatus::Open,
            "invoiced" => WorkOrderStatus::Invoiced,
            "canceled" | "cancelled" => WorkOrderStatus::Canceled,
            _ => WorkOrderStatus::Other(raw),
        }
    }
}

impl From<WorkOrderStatus> for String {
    fn from(s: WorkOrderStatus) -> Self {
        match s {
            WorkOrderStatus::Open => "open".to_string(),
            WorkOrderStatus::Invoiced => "invoiced".to_string(),
            WorkOrderStatus::Canceled => "canceled".to_string(),
            WorkOrderStatus::Other(raw) => raw,
        }
    }
}

// ---------------------------------------------------------------------------
// Quotes
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub id: String,
    pub status: QuoteStatus,
}

impl Quote {
    pub fn new(id: impl Into<String>, status: QuoteStatus) -> Self {
        Self {
            id: id.into(),
            status,
        }
    }
}

/// Quote lookup handed to the resolver. May be incomplete.
pub type QuotesById = BTreeMap<String, Quote>;

/// Index quotes by id. Later duplicates replace earlier ones.
pub fn index_quotes<I>(quotes: I) -> QuotesById
where
    I: IntoIterator<Item = Quote>,
{
    quotes.into_iter().map(|q| (q.id.clone(), q)).collect()
}

// ---------------------------------------------------------------------------
// Work order
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WorkOrder {
    pub id: String,
    pub stage: StoredStage,
    #[serde(default)]
    pub status: WorkOrderStatus,
    /// Intake diagnostics. Absent and empty are treated the same.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostic_data: Option<Map<String, Value>>,
    #[serde(default)]
    pub linked_quote_ids: Vec<String>,
}

impl WorkOrder {
    pub fn new(id: impl Into<String>, stage: impl Into<StoredStage>) -> Self {
        Self {
            id: id.into(),
            stage: stage.into(),
            status: WorkOrderStatus::Open,
            diagnostic_data: None,
            linked_quote_ids: Vec::new(),
        }
    }

    pub fn with_status(mut self, status: WorkOrderStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_diagnostic(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.diagnostic_data
            .get_or_insert_with(Map::new)
            .insert(key.into(), value.into());
        self
    }

    pub fn with_quotes<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.linked_quote_ids = ids.into_iter().map(Into::into).collect();
        self
    }

    pub fn has_diagnostic_data(&self) -> bool {
        self.diagnostic_data
            .as_ref()
            .map(|m| !m.is_empty())
            .unwrap_or(false)
    }
}

// ---------------------------------------------------------------------------
// Resolution output
// ---------------------------------------------------------------------------

/// Caller-visible diagnostic. Never changes the decision path.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageNote {
    /// A linked quote id has no entry in the supplied lookup.
    UnresolvedReference { quote_id: String },
    /// The stored stage is not a recognized stage value.
    UnknownStageValue { value: String },
}

impl fmt::Display for StageNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageNote::UnresolvedReference { quote_id } => {
                write!(f, "unresolved quote reference: {quote_id}")
            }
            StageNote::UnknownStageValue { value } => {
                write!(f, "unknown stored stage value: {value:?}")
            }
        }
    }
}

/// Which decision rule produced the stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionRule {
    Canceled,
    NoDiagnosticData,
    NoLinkedQuotes,
    /// Approved quote present and the order had not reached repair yet.
    ApprovedAdvance,
    /// Approved quote present but the order is already at or past repair.
    ApprovedHold,
    Rejected,
    Sent,
    AllDraft,
    /// Every linked quote id was missing from the lookup.
    NoResolvableQuotes,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResolution {
    pub stage: Stage,
    pub rule: ResolutionRule,
    pub notes: Vec<StageNote>,
}

impl StageResolution {
    pub fn has_notes(&self) -> bool {
        !self.notes.is_empty()
    }

    pub fn unresolved_quote_ids(&self) -> Vec<&str> {
        self.notes
            .iter()
            .filter_map(|n| match n {
                StageNote::UnresolvedReference { quote_id } => Some(quote_id.as_str()),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_indexes_are_positions() {
        for (i, s) in Stage::SEQUENCE.iter().enumerate() {
            assert_eq!(s.index(), Some(i));
        }
        assert_eq!(Stage::Canceled.index(), None);
        assert_eq!(Stage::Canceled.rank(), -1);
        assert!(Stage::InRepair.rank() > Stage::AttentionRequired.rank());
    }

    #[test]
    fn parse_is_lenient_and_roundtrips_as_str() {
        for s in Stage::SEQUENCE {
            assert_eq!(Stage::parse(s.as_str()), Some(s));
        }
        assert_eq!(Stage::parse("  In-Repair "), Some(Stage::InRepair));
        assert_eq!(Stage::parse("Ready for delivery"), Some(Stage::ReadyForDelivery));
        assert_eq!(Stage::parse("CANCELLED"), Some(Stage::Canceled));
        assert_eq!(Stage::parse("limbo"), None);
    }

    #[test]
    fn stored_stage_keeps_unknown_values_verbatim() {
        let v: StoredStage = serde_json::from_str("\"Limbo \"").unwrap();
        assert_eq!(v, StoredStage::Unknown("Limbo ".to_string()));
        assert_eq!(v.rank(), -1);
        assert_eq!(serde_json::to_string(&v).unwrap(), "\"Limbo \"");

        let k: StoredStage = serde_json::from_str("\"quality_control\"").unwrap();
        assert_eq!(k, StoredStage::Known(Stage::QualityControl));
    }

    #[test]
    fn work_order_defaults_when_fields_absent() {
        let wo: WorkOrder = serde_json::from_str(r#"{"id":"wo-1","stage":"reception"}"#).unwrap();
        assert_eq!(wo.status, WorkOrderStatus::Open);
        assert!(!wo.has_diagnostic_data());
        assert!(wo.linked_quote_ids.is_empty());

        let wo: WorkOrder = serde_json::from_str(
            r#"{"id":"wo-2","stage":"diagnostic","status":"Cancelled","diagnostic_data":{}}"#,
        )
        .unwrap();
        assert!(wo.status.is_canceled());
        assert!(!wo.has_diagnostic_data());
    }
}
