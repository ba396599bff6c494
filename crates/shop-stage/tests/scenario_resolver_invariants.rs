//! Resolver invariants that must hold for every input, checked across the
//! full stage space.

use shop_stage::*;

fn all_stored_stages() -> Vec<StoredStage> {
    let mut v: Vec<StoredStage> = Stage::SEQUENCE.iter().copied().map(StoredStage::from).collect();
    v.push(StoredStage::Known(Stage::Canceled));
    v.push(StoredStage::from("workshop-limbo"));
    v
}

fn quote_mixes() -> Vec<Vec<QuoteStatus>> {
    use QuoteStatus::*;
    vec![
        vec![],
        vec![Draft],
        vec![Sent],
        vec![Approved],
        vec![Rejected],
        vec![Draft, Sent],
        vec![Rejected, Sent],
        vec![Approved, Rejected],
        vec![Rejected, Approved, Draft],
    ]
}

fn order_with(stage: StoredStage, statuses: &[QuoteStatus]) -> (WorkOrder, QuotesById) {
    let ids: Vec<String> = (0..statuses.len()).map(|i| format!("q{i}")).collect();
    let quotes = index_quotes(
        ids.iter()
            .zip(statuses)
            .map(|(id, st)| Quote::new(id.clone(), *st)),
    );
    let wo = WorkOrder::new("wo", stage)
        .with_diagnostic("notes", "ok")
        .with_quotes(ids);
    (wo, quotes)
}

#[test]
fn canceled_status_always_wins() {
    for stage in all_stored_stages() {
        for mix in quote_mixes() {
            let (wo, quotes) = order_with(stage.clone(), &mix);
            let wo = wo.with_status(WorkOrderStatus::Canceled);
            assert_eq!(resolve_stage(&wo, &quotes).stage, Stage::Canceled);
        }
    }
}

#[test]
fn canceled_stage_wins_even_with_open_status() {
    let (wo, quotes) = order_with(StoredStage::Known(Stage::Canceled), &[QuoteStatus::Approved]);
    let r = resolve_stage(&wo, &quotes);
    assert_eq!(r.stage, Stage::Canceled);
    assert_eq!(r.rule, ResolutionRule::Canceled);
}

#[test]
fn missing_diagnostics_dominate_quotes() {
    for stage in all_stored_stages().into_iter().filter(|s| !s.is_canceled()) {
        for mix in quote_mixes() {
            let (mut wo, quotes) = order_with(stage.clone(), &mix);
            wo.diagnostic_data = None;
            assert_eq!(resolve_stage(&wo, &quotes).stage, Stage::Reception);
        }
    }
}

#[test]
fn approval_never_regresses_from_in_repair_or_later() {
    let in_repair = Stage::InRepair.rank();
    for stage in Stage::SEQUENCE.iter().filter(|s| s.rank() >= in_repair) {
        for mix in quote_mixes().into_iter().filter(|m| m.contains(&QuoteStatus::Approved)) {
            let (wo, quotes) = order_with(StoredStage::Known(*stage), &mix);
            let r = resolve_stage(&wo, &quotes);
            assert_eq!(r.stage, *stage, "stage {stage} regressed with {mix:?}");
            assert!(r.stage.rank() >= stage.rank());
        }
    }
}

#[test]
fn approval_outranks_rejection() {
    for stage in Stage::SEQUENCE.iter().filter(|s| s.rank() < Stage::InRepair.rank()) {
        let (wo, quotes) = order_with(
            StoredStage::Known(*stage),
            &[QuoteStatus::Rejected, QuoteStatus::Approved],
        );
        assert_eq!(resolve_stage(&wo, &quotes).stage, Stage::InRepair);
    }
}

#[test]
fn rejection_outranks_sent_and_sent_outranks_draft() {
    let (wo, quotes) = order_with(
        StoredStage::Known(Stage::AwaitingApproval),
        &[QuoteStatus::Sent, QuoteStatus::Rejected],
    );
    assert_eq!(resolve_stage(&wo, &quotes).stage, Stage::AttentionRequired);

    let (wo, quotes) = order_with(
        StoredStage::Known(Stage::PendingQuote),
        &[QuoteStatus::Draft, QuoteStatus::Sent],
    );
    assert_eq!(resolve_stage(&wo, &quotes).stage, Stage::AwaitingApproval);

    let (wo, quotes) = order_with(
        StoredStage::Known(Stage::AwaitingApproval),
        &[QuoteStatus::Draft],
    );
    let r = resolve_stage(&wo, &quotes);
    assert_eq!(r.stage, Stage::PendingQuote);
    assert_eq!(r.rule, ResolutionRule::AllDraft);
}

#[test]
fn unknown_stored_stage_is_reported_and_does_not_block_advancement() {
    let (wo, quotes) = order_with(StoredStage::from("En Taller"), &[QuoteStatus::Approved]);
    let r = resolve_stage(&wo, &quotes);
    assert_eq!(r.stage, Stage::InRepair);
    assert_eq!(
        r.notes,
        vec![StageNote::UnknownStageValue {
            value: "En Taller".to_string()
        }]
    );
}

#[test]
fn missing_references_are_skipped_not_fatal() {
    let wo = WorkOrder::new("wo", Stage::PendingQuote)
        .with_diagnostic("notes", "ok")
        .with_quotes(["gone", "q-ok", "gone"]);
    let quotes = index_quotes([Quote::new("q-ok", QuoteStatus::Sent)]);

    let r = resolve_stage(&wo, &quotes);
    assert_eq!(r.stage, Stage::AwaitingApproval);
    // Reported once per distinct id.
    assert_eq!(r.unresolved_quote_ids(), vec!["gone"]);
}

#[test]
fn resolution_is_idempotent() {
    for stage in all_stored_stages() {
        for mix in quote_mixes() {
            let (mut wo, mut quotes) = order_with(stage.clone(), &mix);
            wo.linked_quote_ids.push("missing".to_string());
            quotes.remove("q0");
            let a = resolve_stage(&wo, &quotes);
            let b = resolve_stage(&wo, &quotes);
            assert_eq!(a, b);
        }
    }
}

#[test]
fn resolved_stage_is_always_a_valid_member() {
    for stage in all_stored_stages() {
        for mix in quote_mixes() {
            let (wo, quotes) = order_with(stage.clone(), &mix);
            let r = resolve_stage(&wo, &quotes);
            assert!(r.stage.index().is_some() || r.stage == Stage::Canceled);
        }
    }
}
