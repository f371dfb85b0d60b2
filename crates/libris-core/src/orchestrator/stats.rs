use super::decision::{DispatchDecision, Source};
use crate::shared::IntentLabel;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};

/// Lock-free dispatch counters, shared by every turn.
#[derive(Debug, Default)]
pub struct DispatchStats {
    total: AtomicU64,
    knowledge: AtomicU64,
    generative: AtomicU64,
    blended: AtomicU64,
    clarification: AtomicU64,
    fallback: AtomicU64,
    unknown_intent: AtomicU64,
    short_circuits: AtomicU64,
    generation_failures: AtomicU64,
    generations_cancelled: AtomicU64,
    deadline_expirations: AtomicU64,
    fatal_errors: AtomicU64,
}

/// Point-in-time view served by `/ai/stats`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_turns: u64,
    pub knowledge: u64,
    pub generative: u64,
    pub blended: u64,
    pub clarification: u64,
    pub fallback: u64,
    pub unknown_intent: u64,
    pub short_circuits: u64,
    pub generation_failures: u64,
    pub generations_cancelled: u64,
    pub deadline_expirations: u64,
    pub fatal_errors: u64,
    /// Share of turns whose intent was unknown, in percent.
    pub unknown_intent_pct: f64,
    /// Share of turns answered by knowledge, generation or a blend, in percent.
    pub answered_pct: f64,
}

fn pct(part: u64, total: u64) -> f64 {
    if total == 0 {
        return 0.0;
    }
    ((part as f64 / total as f64) * 10_000.0).round() / 100.0
}

impl DispatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, decision: &DispatchDecision) {
        self.total.fetch_add(1, Ordering::Relaxed);
        let counter = match decision.source {
            Source::Knowledge => &self.knowledge,
            Source::Generative => &self.generative,
            Source::Blended => &self.blended,
            Source::Clarification => &self.clarification,
            Source::None => &self.fallback,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        if decision.intent.label == IntentLabel::Unknown {
            self.unknown_intent.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub(crate) fn short_circuit(&self) {
        self.short_circuits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn generation_failed(&self) {
        self.generation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn generation_cancelled(&self) {
        self.generations_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn deadline_expired(&self) {
        self.deadline_expirations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn fatal(&self) {
        self.fatal_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        let total = load(&self.total);
        let knowledge = load(&self.knowledge);
        let generative = load(&self.generative);
        let blended = load(&self.blended);
        let unknown_intent = load(&self.unknown_intent);
        StatsSnapshot {
            total_turns: total,
            knowledge,
            generative,
            blended,
            clarification: load(&self.clarification),
            fallback: load(&self.fallback),
            unknown_intent,
            short_circuits: load(&self.short_circuits),
            generation_failures: load(&self.generation_failures),
            generations_cancelled: load(&self.generations_cancelled),
            deadline_expirations: load(&self.deadline_expirations),
            fatal_errors: load(&self.fatal_errors),
            unknown_intent_pct: pct(unknown_intent, total),
            answered_pct: pct(knowledge + generative + blended, total),
        }
    }

    pub fn reset(&self) {
        for c in [
            &self.total,
            &self.knowledge,
            &self.generative,
            &self.blended,
            &self.clarification,
            &self.fallback,
            &self.unknown_intent,
            &self.short_circuits,
            &self.generation_failures,
            &self.generations_cancelled,
            &self.deadline_expirations,
            &self.fatal_errors,
        ] {
            c.store(0, Ordering::Relaxed);
        }
        tracing::info!(target: "libris::dispatch", "dispatch statistics reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::Intent;

    #[test]
    fn percentages_follow_recorded_turns() {
        let stats = DispatchStats::new();
        stats.record(&DispatchDecision::new(Source::Knowledge, "a", Intent::new(IntentLabel::CatalogLookup, 0.9)));
        stats.record(&DispatchDecision::new(Source::Clarification, "b", Intent::unknown()));
        stats.record(&DispatchDecision::new(Source::Blended, "c", Intent::unknown()));
        stats.record(&DispatchDecision::new(Source::Generative, "d", Intent::new(IntentLabel::Recommendation, 0.7)));

        let snap = stats.snapshot();
        assert_eq!(snap.total_turns, 4);
        assert_eq!(snap.clarification, 1);
        assert_eq!(snap.unknown_intent_pct, 50.0);
        assert_eq!(snap.answered_pct, 75.0);
    }

    #[test]
    fn reset_zeroes_everything() {
        let stats = DispatchStats::new();
        stats.record(&DispatchDecision::new(Source::Knowledge, "a", Intent::unknown()));
        stats.generation_failed();
        stats.reset();
        let snap = stats.snapshot();
        assert_eq!(snap.total_turns, 0);
        assert_eq!(snap.generation_failures, 0);
        assert_eq!(snap.answered_pct, 0.0);
    }
}
