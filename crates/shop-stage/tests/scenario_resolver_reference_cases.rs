//! Reference scenarios for the stage resolver.
//!
//! Each case pins one decision rule with the smallest input that exercises it.

use serde_json::json;
use shop_stage::*;

fn diagnosed(id: &str, stage: impl Into<StoredStage>) -> WorkOrder {
    WorkOrder::new(id, stage).with_diagnostic("notes", "ok")
}

#[test]
fn empty_diagnostics_resolve_to_reception() {
    let mut wo = WorkOrder::new("wo-a", Stage::Diagnostic);
    wo.diagnostic_data = Some(serde_json::Map::new());

    let r = resolve_stage(&wo, &QuotesById::new());
    assert_eq!(r.stage, Stage::Reception);
    assert_eq!(r.rule, ResolutionRule::NoDiagnosticData);
    assert!(r.notes.is_empty());
}

#[test]
fn diagnosed_without_quotes_is_pending_quote() {
    let wo = diagnosed("wo-b", Stage::Diagnostic);

    let r = resolve_stage(&wo, &QuotesById::new());
    assert_eq!(r.stage, Stage::PendingQuote);
    assert_eq!(r.rule, ResolutionRule::NoLinkedQuotes);
}

#[test]
fn sent_quote_moves_to_awaiting_approval() {
    let wo = diagnosed("wo-c", Stage::PendingQuote).with_quotes(["q1"]);
    let quotes = index_quotes([Quote::new("q1", QuoteStatus::Sent)]);

    let r = resolve_stage(&wo, &quotes);
    assert_eq!(r.stage, Stage::AwaitingApproval);
    assert_eq!(r.rule, ResolutionRule::Sent);
}

#[test]
fn approved_quote_advances_to_in_repair() {
    let wo = diagnosed("wo-d", Stage::PendingQuote).with_quotes(["q1"]);
    let quotes = index_quotes([Quote::new("q1", QuoteStatus::Approved)]);

    let r = resolve_stage(&wo, &quotes);
    assert_eq!(r.stage, Stage::InRepair);
    assert_eq!(r.rule, ResolutionRule::ApprovedAdvance);
}

#[test]
fn approved_and_rejected_past_repair_holds_current_stage() {
    let wo = diagnosed("wo-e", Stage::ReadyForDelivery).with_quotes(["q1", "q2"]);
    let quotes = index_quotes([
        Quote::new("q1", QuoteStatus::Approved),
        Quote::new("q2", QuoteStatus::Rejected),
    ]);

    let r = resolve_stage(&wo, &quotes);
    assert_eq!(r.stage, Stage::ReadyForDelivery);
    assert_eq!(r.rule, ResolutionRule::ApprovedHold);
}

#[test]
fn missing_quote_is_reported_and_falls_back_to_pending_quote() {
    let wo = diagnosed("wo-f", Stage::PendingQuote).with_quotes(["q1"]);

    let r = resolve_stage(&wo, &QuotesById::new());
    assert_eq!(r.stage, Stage::PendingQuote);
    assert_eq!(
        r.notes,
        vec![StageNote::UnresolvedReference {
            quote_id: "q1".to_string()
        }]
    );
    // Same stage as all-draft, but the trace keeps the cases apart.
    assert_eq!(r.rule, ResolutionRule::NoResolvableQuotes);
}

#[test]
fn resolver_reads_work_orders_from_json_records() {
    let wo: WorkOrder = serde_json::from_value(json!({
        "id": "wo-json",
        "stage": "awaiting_approval",
        "status": "open",
        "diagnostic_data": {"mileage": 120000, "notes": "brake noise"},
        "linked_quote_ids": ["q-10"]
    }))
    .unwrap();
    let quotes = index_quotes([Quote::new("q-10", QuoteStatus::Rejected)]);

    let r = resolve_stage(&wo, &quotes);
    assert_eq!(r.stage, Stage::AttentionRequired);
    assert_eq!(r.rule, ResolutionRule::Rejected);
}
