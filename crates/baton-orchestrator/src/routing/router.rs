//! Initial agent selection.

use super::types::{ComplexityBucket, RouteRationale, RoutingDecision};
use crate::cost_model::{CostQualityModel, Estimate};
use crate::policy::{HrmPolicy, SwitchingStrategy};
use crate::registry::AgentProfile;
use crate::switching::cost_benefit;
use baton_abstraction::Capability;
use tracing::debug;

/// Picks the starting agent for a task.
///
/// Routing is a starting guess, not a commitment: the executor may switch
/// away at the first checkpoint.
pub struct Router<'a> {
    policy: &'a HrmPolicy,
    model: &'a CostQualityModel,
}

impl<'a> Router<'a> {
    /// Creates a router over a policy snapshot and the shared model.
    #[must_use]
    pub fn new(policy: &'a HrmPolicy, model: &'a CostQualityModel) -> Self {
        Self { policy, model }
    }

    /// Chooses among `candidates` (compatible agents in registration order).
    ///
    /// Returns `None` only when `candidates` is empty.
    #[must_use]
    pub fn route(
        &self,
        bucket: ComplexityBucket,
        high_risk: bool,
        candidates: &[AgentProfile],
    ) -> Option<RoutingDecision> {
        let scored: Vec<(&AgentProfile, Estimate)> = candidates
            .iter()
            .map(|profile| (profile, self.model.estimate(&profile.id)))
            .collect();
        let first = scored.first()?;

        let (profile, rationale) = match self.policy.strategy {
            SwitchingStrategy::Manual => {
                let configured = self
                    .policy
                    .default_agent
                    .as_deref()
                    .and_then(|id| scored.iter().find(|(p, _)| p.id == id));
                match configured {
                    Some((profile, _)) => (*profile, RouteRationale::Configured),
                    None => (first.0, RouteRationale::RegistrationOrder),
                }
            }
            SwitchingStrategy::RoundRobin => (first.0, RouteRationale::RegistrationOrder),
            SwitchingStrategy::QualityFirst => highest_quality(&scored),
            SwitchingStrategy::SpeedOptimized if bucket != ComplexityBucket::Complex && !high_risk => {
                self.fastest_above_floor(&scored)
            }
            _ => self.by_bucket(bucket, high_risk, &scored),
        };

        debug!(
            agent_id = %profile.id,
            bucket = %bucket,
            high_risk,
            strategy = %self.policy.strategy,
            rationale = ?rationale,
            "Routed task"
        );

        Some(RoutingDecision { agent_id: profile.id.clone(), rationale })
    }

    fn by_bucket<'p>(
        &self,
        bucket: ComplexityBucket,
        high_risk: bool,
        scored: &[(&'p AgentProfile, Estimate)],
    ) -> (&'p AgentProfile, RouteRationale) {
        if high_risk || bucket == ComplexityBucket::Complex {
            let capable: Vec<_> = scored
                .iter()
                .filter(|(p, _)| p.capabilities.contains(&Capability::Quality))
                .copied()
                .collect();
            return if capable.is_empty() {
                highest_quality(scored)
            } else {
                (highest_quality(&capable).0, RouteRationale::QualityCapable)
            };
        }

        let Some((baseline, baseline_estimate)) = self.cheapest_above_floor(scored) else {
            return highest_quality(scored);
        };
        if bucket == ComplexityBucket::Simple {
            return (baseline, RouteRationale::CheapestAboveFloor);
        }

        // Medium: upgrade from the cheapest viable agent only if the upgrade
        // passes the same cost-benefit test used at checkpoints.
        let sensitivity = self.policy.effective_sensitivity();
        let mut best: Option<(&'p AgentProfile, f64)> = None;
        for (profile, estimate) in scored {
            if profile.id == baseline.id {
                continue;
            }
            let Some(gain) =
                cost_benefit(&baseline_estimate, estimate, self.policy.max_cost, sensitivity)
            else {
                continue;
            };
            if best.is_none_or(|(_, improvement)| gain.quality_improvement > improvement) {
                best = Some((*profile, gain.quality_improvement));
            }
        }

        match best {
            Some((profile, _)) => (profile, RouteRationale::CostBenefit),
            None => (baseline, RouteRationale::CheapestAboveFloor),
        }
    }

    fn cheapest_above_floor<'p>(
        &self,
        scored: &[(&'p AgentProfile, Estimate)],
    ) -> Option<(&'p AgentProfile, Estimate)> {
        scored
            .iter()
            .filter(|(_, e)| e.quality >= self.policy.min_quality_floor)
            .fold(None, |best: Option<(&AgentProfile, Estimate)>, (p, e)| match best {
                Some((_, b)) if b.cost <= e.cost => best,
                _ => Some((*p, *e)),
            })
    }

    fn fastest_above_floor<'p>(
        &self,
        scored: &[(&'p AgentProfile, Estimate)],
    ) -> (&'p AgentProfile, RouteRationale) {
        let fastest = scored
            .iter()
            .filter(|(_, e)| e.quality >= self.policy.min_quality_floor)
            .fold(None, |best: Option<(&AgentProfile, f64)>, (p, e)| match best {
                Some((_, latency)) if latency <= e.latency_ms => best,
                _ => Some((*p, e.latency_ms)),
            });
        match fastest {
            Some((profile, _)) => (profile, RouteRationale::Fastest),
            None => highest_quality(scored),
        }
    }
}

/// Highest expected quality; earliest registration wins ties.
fn highest_quality<'p>(scored: &[(&'p AgentProfile, Estimate)]) -> (&'p AgentProfile, RouteRationale) {
    let mut best = scored[0];
    for candidate in &scored[1..] {
        if candidate.1.quality > best.1.quality {
            best = *candidate;
        }
    }
    (best.0, RouteRationale::HighestQuality)
}
