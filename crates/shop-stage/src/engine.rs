use crate::{
    QuoteStatus, QuotesById, ResolutionRule, Stage, StageNote, StageResolution, StoredStage,
    WorkOrder,
};

fn push_note_once(notes: &mut Vec<StageNote>, n: StageNote) {
    if !notes.contains(&n) {
        notes.push(n);
    }
}

/// Statuses observed across the resolvable linked quotes.
#[derive(Default)]
struct QuoteEvidence {
    approved: bool,
    rejected: bool,
    sent: bool,
    resolved: usize,
}

impl QuoteEvidence {
    fn collect(ids: &[String], quotes_by_id: &QuotesById, notes: &mut Vec<StageNote>) -> Self {
        let mut ev = QuoteEvidence::default();
        for id in ids {
            let Some(quote) = quotes_by_id.get(id) else {
                push_note_once(
                    notes,
                    StageNote::UnresolvedReference {
                        quote_id: id.clone(),
                    },
                );
                continue;
            };
            ev.resolved += 1;
            match quote.status {
                QuoteStatus::Approved => ev.approved = true,
                QuoteStatus::Rejected => ev.rejected = true,
                QuoteStatus::Sent => ev.sent = true,
                QuoteStatus::Draft => {}
            }
        }
        ev
    }
}

/// Compute the stage a work order should occupy.
///
/// Rules, first match wins:
/// 1. canceled status or canceled stage => Canceled
/// 2. no diagnostic data => Reception
/// 3. no linked quotes => PendingQuote
/// 4. by linked quote statuses: any approved => InRepair unless already at or
///    past InRepair (then hold); else any rejected => AttentionRequired; else
///    any sent => AwaitingApproval; else PendingQuote
///
/// Missing quote references are skipped and reported in `notes`. An
/// unrecognized stored stage is reported and ranks before the sequence start.
pub fn resolve_stage(order: &WorkOrder, quotes_by_id: &QuotesById) -> StageResolution {
    let mut notes: Vec<StageNote> = Vec::new();

    if let StoredStage::Unknown(value) = &order.stage {
        push_note_once(
            &mut notes,
            StageNote::UnknownStageValue {
                value: value.clone(),
            },
        );
    }

    let (stage, rule) = decide(order, quotes_by_id, &mut notes);

    StageResolution { stage, rule, notes }
}

fn decide(
    order: &WorkOrder,
    quotes_by_id: &QuotesById,
    notes: &mut Vec<StageNote>,
) -> (Stage, ResolutionRule) {
    // 1) Canceled dominates everything.
    if order.status.is_canceled() || order.stage.is_canceled() {
        return (Stage::Canceled, ResolutionRule::Canceled);
    }

    // 2) Diagnostic absence dominates quote state.
    if !order.has_diagnostic_data() {
        return (Stage::Reception, ResolutionRule::NoDiagnosticData);
    }

    // 3) Diagnosed but nothing quoted yet.
    if order.linked_quote_ids.is_empty() {
        return (Stage::PendingQuote, ResolutionRule::NoLinkedQuotes);
    }

    // 4) Quote evidence, strongest first.
    let ev = QuoteEvidence::collect(&order.linked_quote_ids, quotes_by_id, notes);

    if ev.approved {
        return match order.stage.known() {
            Some(current) if current.rank() >= Stage::InRepair.rank() => {
                (current, ResolutionRule::ApprovedHold)
            }
            _ => (Stage::InRepair, ResolutionRule::ApprovedAdvance),
        };
    }
    if ev.rejected {
        return (Stage::AttentionRequired, ResolutionRule::Rejected);
    }
    if ev.sent {
        return (Stage::AwaitingApproval, ResolutionRule::Sent);
    }
    if ev.resolved == 0 {
        return (Stage::PendingQuote, ResolutionRule::NoResolvableQuotes);
    }
    (Stage::PendingQuote, ResolutionRule::AllDraft)
}
