//! Switch decision engine.
//!
//! Runs at checkpoints (and off-schedule after retry exhaustion or a sharp
//! quality drop) and decides whether the active agent stays or is replaced.
//!
//! A candidate replaces the current agent only if it is expected to improve
//! quality, the remaining budget covers a full call to it, and the
//! relative quality gain beats the relative cost increase scaled by the
//! policy sensitivity:
//!
//! ```text
//! improvement / current.quality > (cost_delta / current.cost) * sensitivity
//! ```

use crate::cost_model::{CostQualityModel, Estimate};
use crate::policy::{HrmPolicy, SwitchingStrategy};
use crate::registry::AgentProfile;
use baton_abstraction::SwitchReason;
use serde::Serialize;
use tracing::debug;

/// Values closer than this are ties.
const TIE_EPSILON: f64 = 1e-9;

/// What prompted a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchTrigger {
    /// Scheduled checkpoint.
    Checkpoint,
    /// The active agent exhausted its retry budget.
    AgentExhausted,
    /// Quality fell sharply since the previous iteration.
    QualityDrop,
}

impl SwitchTrigger {
    fn reason(self) -> SwitchReason {
        match self {
            Self::Checkpoint => SwitchReason::QualityGap,
            Self::AgentExhausted => SwitchReason::AgentExhausted,
            Self::QualityDrop => SwitchReason::QualityDrop,
        }
    }
}

/// Inputs to one decision. Only completed iterations feed `current_quality`.
#[derive(Debug, Clone)]
pub struct SwitchContext<'a> {
    /// Active agent.
    pub current_agent: &'a str,
    /// Quality of the latest completed iteration.
    pub current_quality: f64,
    /// Budget left under the cost ceiling.
    pub remaining_budget: f64,
    /// Switches the task may still make.
    pub switches_remaining: u32,
    /// What prompted the decision.
    pub trigger: SwitchTrigger,
    /// Compatible agents in registration order, the active one included.
    pub candidates: &'a [AgentProfile],
}

/// A proposed replacement.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SwitchPlan {
    /// Agent to switch to.
    pub to_agent: String,
    /// Reason code.
    pub reason: SwitchReason,
    /// Gate threshold minus current quality.
    pub quality_gap: f64,
    /// Expected quality gain over the active agent.
    pub quality_improvement: f64,
    /// Expected per-call cost difference.
    pub cost_delta: f64,
}

/// Why the active agent stays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum KeepReason {
    /// Quality already meets the gate.
    QualityMet,
    /// The task used up its switch budget.
    SwitchBudgetExhausted,
    /// No candidate passed the cost-benefit test.
    NoViableCandidate,
}

/// Outcome of a decision.
#[derive(Debug, Clone, PartialEq)]
pub enum SwitchDecision {
    /// Keep the active agent.
    Keep(KeepReason),
    /// Replace the active agent.
    Switch(SwitchPlan),
    /// Manual mode: the plan is only a recommendation.
    Recommend(SwitchPlan),
}

/// Expected gain of one candidate over the active agent.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateGain {
    /// Expected quality improvement.
    pub quality_improvement: f64,
    /// Expected per-call cost difference.
    pub cost_delta: f64,
}

/// Applies the cost-benefit ratio test to one candidate.
///
/// Returns the gain if the candidate is worth switching to.
#[must_use]
pub fn cost_benefit(
    current: &Estimate,
    candidate: &Estimate,
    remaining_budget: f64,
    sensitivity: f64,
) -> Option<CandidateGain> {
    let quality_improvement = candidate.quality - current.quality;
    let cost_delta = candidate.cost - current.cost;

    if quality_improvement <= 0.0 || candidate.cost > remaining_budget {
        return None;
    }

    let relative_quality = if current.quality > TIE_EPSILON {
        quality_improvement / current.quality
    } else {
        f64::INFINITY
    };
    let relative_cost = if current.cost > TIE_EPSILON {
        cost_delta / current.cost
    } else if cost_delta > 0.0 {
        f64::INFINITY
    } else {
        0.0
    };
    let bar = if sensitivity == 0.0 { 0.0 } else { relative_cost * sensitivity };

    (relative_quality > bar).then_some(CandidateGain { quality_improvement, cost_delta })
}

/// Decides whether to keep or replace the active agent.
pub struct SwitchDecisionEngine<'a> {
    policy: &'a HrmPolicy,
    model: &'a CostQualityModel,
}

impl<'a> SwitchDecisionEngine<'a> {
    /// Creates an engine over a policy snapshot and the shared model.
    #[must_use]
    pub fn new(policy: &'a HrmPolicy, model: &'a CostQualityModel) -> Self {
        Self { policy, model }
    }

    /// Makes a decision.
    #[must_use]
    pub fn decide(&self, ctx: &SwitchContext<'_>) -> SwitchDecision {
        let quality_gap = self.policy.quality_gate_threshold - ctx.current_quality;
        if quality_gap <= 0.0 {
            return SwitchDecision::Keep(KeepReason::QualityMet);
        }

        let manual = self.policy.strategy == SwitchingStrategy::Manual;
        if ctx.switches_remaining == 0 && !manual {
            debug!(current_agent = ctx.current_agent, "Switch budget exhausted, keeping agent");
            return SwitchDecision::Keep(KeepReason::SwitchBudgetExhausted);
        }

        let plan = match self.policy.strategy {
            SwitchingStrategy::RoundRobin => self.next_in_rotation(ctx, quality_gap),
            SwitchingStrategy::SpeedOptimized => self.best_candidate(ctx, quality_gap, true),
            _ => self.best_candidate(ctx, quality_gap, false),
        };

        match plan {
            None => SwitchDecision::Keep(KeepReason::NoViableCandidate),
            Some(plan) if manual => SwitchDecision::Recommend(plan),
            Some(plan) => SwitchDecision::Switch(plan),
        }
    }

    /// Highest quality improvement among candidates passing the ratio test;
    /// ties go to the lowest cost delta, then registration order. With
    /// `fastest`, the lowest expected latency wins among passing candidates.
    fn best_candidate(
        &self,
        ctx: &SwitchContext<'_>,
        quality_gap: f64,
        fastest: bool,
    ) -> Option<SwitchPlan> {
        let current = self.model.estimate(ctx.current_agent);
        let sensitivity = self.policy.effective_sensitivity();

        let mut best: Option<(&AgentProfile, CandidateGain, f64)> = None;
        for profile in ctx.candidates.iter().filter(|p| p.id != ctx.current_agent) {
            let estimate = self.model.estimate(&profile.id);
            let Some(gain) = cost_benefit(&current, &estimate, ctx.remaining_budget, sensitivity)
            else {
                continue;
            };
            debug!(
                candidate = %profile.id,
                quality_improvement = gain.quality_improvement,
                cost_delta = gain.cost_delta,
                "Candidate passed cost-benefit test"
            );

            let better = match &best {
                None => true,
                Some((_, _, latency)) if fastest => estimate.latency_ms < latency - TIE_EPSILON,
                Some((_, incumbent, _)) => {
                    let diff = gain.quality_improvement - incumbent.quality_improvement;
                    diff > TIE_EPSILON
                        || (diff.abs() <= TIE_EPSILON
                            && gain.cost_delta < incumbent.cost_delta - TIE_EPSILON)
                }
            };
            if better {
                best = Some((profile, gain, estimate.latency_ms));
            }
        }

        best.map(|(profile, gain, _)| SwitchPlan {
            to_agent: profile.id.clone(),
            reason: ctx.trigger.reason(),
            quality_gap,
            quality_improvement: gain.quality_improvement,
            cost_delta: gain.cost_delta,
        })
    }

    /// Next compatible agent after the active one, wrapping around.
    fn next_in_rotation(&self, ctx: &SwitchContext<'_>, quality_gap: f64) -> Option<SwitchPlan> {
        let next = match ctx.candidates.iter().position(|p| p.id == ctx.current_agent) {
            Some(i) => ctx.candidates.get((i + 1) % ctx.candidates.len()),
            None => ctx.candidates.first(),
        }?;
        if next.id == ctx.current_agent {
            return None;
        }

        let current = self.model.estimate(ctx.current_agent);
        let estimate = self.model.estimate(&next.id);
        if estimate.cost > ctx.remaining_budget {
            debug!(candidate = %next.id, cost = estimate.cost, "Next agent in rotation is over budget");
            return None;
        }
        Some(SwitchPlan {
            to_agent: next.id.clone(),
            reason: SwitchReason::RoundRobin,
            quality_gap,
            quality_improvement: estimate.quality - current.quality,
            cost_delta: estimate.cost - current.cost,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use baton_abstraction::CapabilitySet;

    fn profiles(ids: &[&str]) -> Vec<AgentProfile> {
        ids.iter()
            .enumerate()
            .map(|(order, id)| AgentProfile {
                id: (*id).to_string(),
                capabilities: CapabilitySet::new(),
                order,
            })
            .collect()
    }

    fn model(entries: &[(&str, f64, f64, f64)]) -> CostQualityModel {
        let model = CostQualityModel::default();
        for (id, cost, quality, latency) in entries {
            model.seed(id, Estimate::prior(*cost, *quality, *latency));
        }
        model
    }

    fn ctx<'a>(current: &'a str, quality: f64, candidates: &'a [AgentProfile]) -> SwitchContext<'a> {
        SwitchContext {
            current_agent: current,
            current_quality: quality,
            remaining_budget: 100.0,
            switches_remaining: 2,
            trigger: SwitchTrigger::Checkpoint,
            candidates,
        }
    }

    #[test]
    fn test_keeps_agent_when_gate_met() {
        let policy = HrmPolicy::default();
        let model = model(&[("a", 1.0, 0.5, 1.0), ("b", 1.0, 0.9, 1.0)]);
        let candidates = profiles(&["a", "b"]);
        let decision = SwitchDecisionEngine::new(&policy, &model).decide(&ctx("a", 0.9, &candidates));
        assert_eq!(decision, SwitchDecision::Keep(KeepReason::QualityMet));
    }

    #[test]
    fn test_switches_to_better_candidate() {
        let policy = HrmPolicy::default();
        let model = model(&[("a", 1.0, 0.5, 1.0), ("b", 1.2, 0.8, 1.0)]);
        let candidates = profiles(&["a", "b"]);
        let decision = SwitchDecisionEngine::new(&policy, &model).decide(&ctx("a", 0.6, &candidates));

        let SwitchDecision::Switch(plan) = decision else {
            panic!("expected a switch, got {decision:?}");
        };
        assert_eq!(plan.to_agent, "b");
        assert_eq!(plan.reason, SwitchReason::QualityGap);
        assert!((plan.quality_gap - 0.25).abs() < 1e-9);
        assert!((plan.quality_improvement - 0.3).abs() < 1e-9);
        assert!((plan.cost_delta - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_ratio_test_rejects_expensive_marginal_gain() {
        // +4% quality for +400% cost.
        let current = Estimate::prior(1.0, 0.5, 1.0);
        let candidate = Estimate::prior(5.0, 0.52, 1.0);
        assert!(cost_benefit(&current, &candidate, 100.0, 0.8).is_none());
        // Near-zero sensitivity accepts any positive improvement.
        assert!(cost_benefit(&current, &candidate, 100.0, 0.0).is_some());
    }

    #[test]
    fn test_budget_must_cover_full_call() {
        let current = Estimate::prior(1.0, 0.2, 1.0);
        let candidate = Estimate::prior(3.0, 0.9, 1.0);
        // Covers the 2.0 delta but not the 3.0 call.
        assert!(cost_benefit(&current, &candidate, 2.5, 0.8).is_none());
        assert!(cost_benefit(&current, &candidate, 3.0, 0.8).is_some());
    }

    #[test]
    fn test_cheaper_and_better_always_passes() {
        let current = Estimate::prior(2.0, 0.5, 1.0);
        let candidate = Estimate::prior(1.0, 0.6, 1.0);
        let gain = cost_benefit(&current, &candidate, 1.0, 5.0).unwrap();
        assert!(gain.cost_delta < 0.0);
    }

    #[test]
    fn test_unaffordable_candidate_is_not_chosen() {
        let policy = HrmPolicy::default();
        let model = model(&[("eco", 2.0, 0.5, 1.0), ("pro", 3.5, 0.95, 1.0)]);
        let candidates = profiles(&["eco", "pro"]);
        let mut context = ctx("eco", 0.5, &candidates);
        context.remaining_budget = 3.0;
        let decision = SwitchDecisionEngine::new(&policy, &model).decide(&context);
        assert_eq!(decision, SwitchDecision::Keep(KeepReason::NoViableCandidate));
    }

    #[test]
    fn test_round_robin_skips_unaffordable_rotation() {
        let policy = HrmPolicy { strategy: SwitchingStrategy::RoundRobin, ..HrmPolicy::default() };
        let model = model(&[("a", 1.0, 0.6, 1.0), ("b", 9.0, 0.1, 1.0)]);
        let candidates = profiles(&["a", "b"]);
        let mut context = ctx("a", 0.5, &candidates);
        context.remaining_budget = 4.0;
        let decision = SwitchDecisionEngine::new(&policy, &model).decide(&context);
        assert_eq!(decision, SwitchDecision::Keep(KeepReason::NoViableCandidate));
    }

    #[test]
    fn test_ties_break_on_cost_then_registration_order() {
        let policy = HrmPolicy::default();
        let model = model(&[
            ("a", 1.0, 0.5, 1.0),
            ("b", 1.1, 0.8, 1.0),
            ("c", 1.05, 0.8, 1.0),
            ("d", 1.05, 0.8, 1.0),
        ]);
        let candidates = profiles(&["a", "b", "c", "d"]);
        let decision = SwitchDecisionEngine::new(&policy, &model).decide(&ctx("a", 0.5, &candidates));
        let SwitchDecision::Switch(plan) = decision else {
            panic!("expected a switch");
        };
        assert_eq!(plan.to_agent, "c");
    }

    #[test]
    fn test_exhausted_switch_budget_keeps_agent() {
        let policy = HrmPolicy::default();
        let model = model(&[("a", 1.0, 0.3, 1.0), ("b", 1.0, 0.9, 1.0)]);
        let candidates = profiles(&["a", "b"]);
        let mut context = ctx("a", 0.3, &candidates);
        context.switches_remaining = 0;
        let decision = SwitchDecisionEngine::new(&policy, &model).decide(&context);
        assert_eq!(decision, SwitchDecision::Keep(KeepReason::SwitchBudgetExhausted));
    }

    #[test]
    fn test_manual_only_recommends() {
        let policy = HrmPolicy { strategy: SwitchingStrategy::Manual, ..HrmPolicy::default() };
        let model = model(&[("a", 1.0, 0.3, 1.0), ("b", 1.0, 0.9, 1.0)]);
        let candidates = profiles(&["a", "b"]);
        let decision = SwitchDecisionEngine::new(&policy, &model).decide(&ctx("a", 0.3, &candidates));
        assert!(matches!(decision, SwitchDecision::Recommend(ref plan) if plan.to_agent == "b"));
    }

    #[test]
    fn test_round_robin_ignores_formula() {
        let policy = HrmPolicy { strategy: SwitchingStrategy::RoundRobin, ..HrmPolicy::default() };
        // "b" is worse and pricier; rotation still picks it after "a".
        let model = model(&[("a", 1.0, 0.6, 1.0), ("b", 9.0, 0.1, 1.0), ("c", 1.0, 0.9, 1.0)]);
        let candidates = profiles(&["a", "b", "c"]);
        let engine = SwitchDecisionEngine::new(&policy, &model);

        let SwitchDecision::Switch(plan) = engine.decide(&ctx("a", 0.5, &candidates)) else {
            panic!("expected rotation");
        };
        assert_eq!(plan.to_agent, "b");
        assert_eq!(plan.reason, SwitchReason::RoundRobin);

        let SwitchDecision::Switch(plan) = engine.decide(&ctx("c", 0.5, &candidates)) else {
            panic!("expected rotation");
        };
        assert_eq!(plan.to_agent, "a");
    }

    #[test]
    fn test_speed_optimized_prefers_fastest_viable() {
        let policy =
            HrmPolicy { strategy: SwitchingStrategy::SpeedOptimized, ..HrmPolicy::default() };
        let model = model(&[
            ("a", 1.0, 0.5, 5_000.0),
            ("b", 1.0, 0.95, 9_000.0),
            ("c", 1.0, 0.7, 1_000.0),
        ]);
        let candidates = profiles(&["a", "b", "c"]);
        let SwitchDecision::Switch(plan) =
            SwitchDecisionEngine::new(&policy, &model).decide(&ctx("a", 0.5, &candidates))
        else {
            panic!("expected a switch");
        };
        assert_eq!(plan.to_agent, "c");
    }

    #[test]
    fn test_cost_optimized_is_stricter_than_quality_first() {
        // +20% quality for +50% cost: passes at 0.08 (quality_first), fails at 1.6.
        let model = model(&[("a", 2.0, 0.5, 1.0), ("b", 3.0, 0.6, 1.0)]);
        let candidates = profiles(&["a", "b"]);

        let strict = HrmPolicy { strategy: SwitchingStrategy::CostOptimized, ..HrmPolicy::default() };
        let decision = SwitchDecisionEngine::new(&strict, &model).decide(&ctx("a", 0.5, &candidates));
        assert_eq!(decision, SwitchDecision::Keep(KeepReason::NoViableCandidate));

        let eager = HrmPolicy { strategy: SwitchingStrategy::QualityFirst, ..HrmPolicy::default() };
        let decision = SwitchDecisionEngine::new(&eager, &model).decide(&ctx("a", 0.5, &candidates));
        assert!(matches!(decision, SwitchDecision::Switch(_)));
    }

    #[test]
    fn test_trigger_sets_reason() {
        let policy = HrmPolicy::default();
        let model = model(&[("a", 1.0, 0.2, 1.0), ("b", 1.0, 0.8, 1.0)]);
        let candidates = profiles(&["a", "b"]);
        let mut context = ctx("a", 0.0, &candidates);
        context.trigger = SwitchTrigger::AgentExhausted;
        let SwitchDecision::Switch(plan) = SwitchDecisionEngine::new(&policy, &model).decide(&context)
        else {
            panic!("expected a switch");
        };
        assert_eq!(plan.reason, SwitchReason::AgentExhausted);
    }
}
