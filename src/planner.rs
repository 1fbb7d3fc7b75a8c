//! Planner orchestration: batch and incremental modes.
//!
//! Batch mode generates every candidate sequence, filters, simulates, and
//! scores them with beam search and early termination, returning the best
//! plan in one call. Incremental mode persists the generated sequences and
//! evaluates a bounded batch per call, so the search survives restarts and
//! amortizes across cycles.

use std::collections::HashMap;
use std::collections::HashSet;

use chrono::Utc;
use futures::future::join_all;
use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::constants::{EVAL_BATCH_SIZE, MIN_SEQUENCES_TO_EVALUATE, PLATEAU_THRESHOLD};
use crate::context::PortfolioContext;
use crate::error::Result;
use crate::hash::portfolio_hash;
use crate::metrics::{MetricsProvider, SymbolMetrics};
use crate::models::{
    ActionCandidate, CooldownSets, HolisticPlan, HolisticStep, Opportunities, PendingOrder,
    Position, Security, TradeSide, tags,
};
use crate::narrative::{plan_narrative, step_narrative};
use crate::opportunities::{
    OpportunityInputs, identify_opportunities, identify_opportunities_from_weights,
};
use crate::scoring::diversification::{diversification_subscore, portfolio_score};
use crate::scoring::end_state::score_end_state;
use crate::sequences::{GeneratedSequence, generate_action_sequences};
use crate::simulate::simulate_sequence;
use crate::store::{PlannerStore, StoredEvaluation};

/// Everything a planning call consumes besides the context itself.
#[derive(Debug, Clone, Copy)]
pub struct PlanInputs<'a> {
    /// Current positions
    pub positions: &'a [Position],
    /// Security universe
    pub securities: &'a [Security],
    /// Available EUR cash
    pub available_cash: f64,
    /// Latest native prices
    pub current_prices: &'a HashMap<String, f64>,
    /// Optimizer target weights; triggers weight-driven identification
    pub target_weights: Option<&'a HashMap<String, f64>>,
    /// Trade cooldown sets
    pub cooldowns: &'a CooldownSets,
    /// Cash balances per currency (portfolio fingerprint input)
    pub cash_balances: &'a [(String, f64)],
    /// Unfilled orders (portfolio fingerprint input)
    pub pending_orders: &'a [PendingOrder],
}

/// Sequences dropped by the early feasibility filter, by reason.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterCounts {
    /// Same symbol appeared twice in one sequence
    pub duplicates: usize,
    /// Average per-action priority below the threshold
    pub priority: usize,
    /// A buy exceeded running cash
    pub cash: usize,
    /// A buy/sell on a symbol whose flags forbid it
    pub flags: usize,
    /// A sell larger than the held quantity
    pub position: usize,
}

impl FilterCounts {
    /// Total dropped sequences.
    pub fn total(&self) -> usize {
        self.duplicates + self.priority + self.cash + self.flags + self.position
    }
}

/// Drop sequences that could never execute.
///
/// Checks, in order: duplicate symbols, average priority against the
/// threshold, then a forward walk verifying permissions, held quantity for
/// sells, and that running cash never goes negative.
pub fn filter_feasible(
    sequences: Vec<GeneratedSequence>,
    positions: &[Position],
    securities: &[Security],
    available_cash: f64,
    config: &PlannerConfig,
) -> (Vec<GeneratedSequence>, FilterCounts) {
    let securities_by_symbol: HashMap<&str, &Security> =
        securities.iter().map(|s| (s.symbol.as_str(), s)).collect();
    let positions_by_symbol: HashMap<&str, &Position> =
        positions.iter().map(|p| (p.symbol.as_str(), p)).collect();

    let mut counts = FilterCounts::default();
    let mut feasible = Vec::with_capacity(sequences.len());

    'sequences: for sequence in sequences {
        if sequence.actions.is_empty() {
            continue;
        }

        let symbols: HashSet<&str> = sequence.actions.iter().map(|c| c.symbol.as_str()).collect();
        if symbols.len() != sequence.actions.len() {
            counts.duplicates += 1;
            continue;
        }

        if sequence.avg_priority() < config.priority_threshold {
            counts.priority += 1;
            continue;
        }

        let mut running_cash = available_cash;
        for action in &sequence.actions {
            let security = securities_by_symbol.get(action.symbol.as_str());
            match action.side {
                TradeSide::Buy => {
                    if !security.is_some_and(|s| s.allow_buy) {
                        counts.flags += 1;
                        continue 'sequences;
                    }
                    if action.value_eur > running_cash {
                        counts.cash += 1;
                        continue 'sequences;
                    }
                    running_cash -= action.value_eur;
                }
                TradeSide::Sell => {
                    if !security.is_some_and(|s| s.allow_sell) {
                        counts.flags += 1;
                        continue 'sequences;
                    }
                    let held = positions_by_symbol.get(action.symbol.as_str());
                    if !held.is_some_and(|p| p.quantity >= action.quantity) {
                        counts.position += 1;
                        continue 'sequences;
                    }
                    running_cash += action.value_eur;
                }
            }
        }

        feasible.push(sequence);
    }

    (feasible, counts)
}

/// One beam entry; ordered by score, ties broken by sequence hash for
/// deterministic beam contents.
struct BeamEntry {
    sequence: GeneratedSequence,
    score: f64,
    breakdown: HashMap<String, f64>,
    hash: String,
}

struct Beam {
    entries: Vec<BeamEntry>,
    width: usize,
}

impl Beam {
    fn new(width: usize) -> Self {
        Self {
            entries: Vec::with_capacity(width + 1),
            width,
        }
    }

    fn worst_score(&self) -> f64 {
        self.entries.last().map(|e| e.score).unwrap_or(f64::MIN)
    }

    /// Whether this score would enter the beam.
    fn admits(&self, score: f64) -> bool {
        self.entries.len() < self.width || score > self.worst_score()
    }

    fn insert(&mut self, entry: BeamEntry) {
        self.entries.push(entry);
        self.entries.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.hash.cmp(&b.hash))
        });
        self.entries.truncate(self.width);
    }

    fn best(&self) -> Option<&BeamEntry> {
        self.entries.first()
    }
}

/// The holistic planner.
///
/// Owns the configuration and the metrics seam; all other collaborators are
/// passed per call.
pub struct HolisticPlanner<M: MetricsProvider> {
    config: PlannerConfig,
    metrics: M,
}

impl<M: MetricsProvider> HolisticPlanner<M> {
    /// Create a planner with a validated configuration.
    pub fn new(config: PlannerConfig, metrics: M) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, metrics })
    }

    /// The active configuration.
    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Batch mode: generate, evaluate, and return the best plan in one call.
    pub async fn create_plan(
        &self,
        context: &PortfolioContext,
        inputs: &PlanInputs<'_>,
    ) -> Result<HolisticPlan> {
        if context.positions.is_empty() && inputs.available_cash <= 0.0 {
            return Ok(HolisticPlan::empty(
                portfolio_score(context).total,
                "Portfolio is empty. Nothing to plan.",
                false,
            ));
        }

        let current_score = portfolio_score(context);
        let opportunities = self.identify(context, inputs).await?;
        if opportunities.is_empty() {
            return Ok(HolisticPlan::empty(
                current_score.total,
                "Portfolio is well-balanced. No actions recommended at this time.",
                true,
            ));
        }

        let generated = generate_action_sequences(
            &opportunities,
            inputs.available_cash,
            inputs.securities,
            &self.config,
        );
        let total_generated = generated.len();
        let (sequences, counts) = filter_feasible(
            generated,
            inputs.positions,
            inputs.securities,
            inputs.available_cash,
            &self.config,
        );
        if counts.total() > 0 {
            info!(
                kept = sequences.len(),
                generated = total_generated,
                duplicates = counts.duplicates,
                priority = counts.priority,
                cash = counts.cash,
                flags = counts.flags,
                position = counts.position,
                "early feasibility filter"
            );
        }

        if sequences.is_empty() {
            return Ok(HolisticPlan::empty(
                current_score.total,
                "Portfolio is well-balanced. No actions recommended at this time.",
                true,
            ));
        }

        // Pre-simulate every sequence once: the end states drive both metric
        // prefetching and scoring.
        let mut simulated: Vec<(GeneratedSequence, PortfolioContext, f64)> = sequences
            .into_iter()
            .map(|sequence| {
                let (end_context, end_cash) = simulate_sequence(
                    &sequence.actions,
                    context,
                    inputs.available_cash,
                    inputs.securities,
                );
                (sequence, end_context, end_cash)
            })
            .collect();

        let mut end_symbols: HashSet<String> = HashSet::new();
        for (_, end_context, _) in &simulated {
            end_symbols.extend(end_context.positions.keys().cloned());
        }
        let metrics_cache = self.fetch_metrics(end_symbols).await?;
        info!(symbols = metrics_cache.len(), "prefetched metrics");

        // Highest estimated priority first; hash as a stable tiebreaker.
        simulated.sort_by(|(a, _, _), (b, _, _)| {
            b.priority()
                .partial_cmp(&a.priority())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.hash().cmp(&b.hash()))
        });

        // Beam search over batches of EVAL_BATCH_SIZE concurrent evaluations.
        let total = simulated.len();
        let min_to_evaluate = MIN_SEQUENCES_TO_EVALUATE.min(total);
        let mut beam = Beam::new(self.config.beam_width);
        let mut best_score = f64::MIN;
        let mut plateau_count = 0usize;
        let mut evaluated = 0usize;

        let mut iter = simulated.into_iter();
        'search: loop {
            let batch: Vec<_> = iter.by_ref().take(EVAL_BATCH_SIZE).collect();
            if batch.is_empty() {
                break;
            }

            let evaluations = join_all(batch.into_iter().map(|(sequence, end_context, _)| {
                let metrics_cache = &metrics_cache;
                async move {
                    let div = diversification_subscore(&end_context);
                    let scored = score_end_state(
                        &end_context.positions,
                        end_context.total_value,
                        div,
                        &end_context.stock_scores,
                        metrics_cache,
                    );
                    (sequence, scored)
                }
            }))
            .await;

            let mut beam_updated = false;
            for (sequence, scored) in evaluations {
                evaluated += 1;
                if beam.admits(scored.score) {
                    let hash = sequence.hash();
                    if scored.score > best_score {
                        best_score = scored.score;
                        plateau_count = 0;
                        debug!(score = scored.score, %hash, "new best sequence");
                    }
                    beam.insert(BeamEntry {
                        sequence,
                        score: scored.score,
                        breakdown: scored.breakdown,
                        hash,
                    });
                    beam_updated = true;
                } else {
                    plateau_count += 1;
                }
            }

            if evaluated >= min_to_evaluate && !beam_updated && plateau_count >= PLATEAU_THRESHOLD
            {
                info!(
                    evaluated,
                    total, plateau_count, "early termination: beam converged"
                );
                break 'search;
            }
        }

        let Some(best) = beam.best() else {
            return Ok(HolisticPlan::empty(
                current_score.total,
                "No beneficial actions identified.",
                true,
            ));
        };

        Ok(self.assemble_plan(
            &best.sequence.actions,
            best.score,
            best.breakdown.clone(),
            current_score.total,
            context,
            &opportunities,
            inputs.available_cash,
        ))
    }

    /// Incremental mode: progress the persisted search by one batch and
    /// return the best plan found so far (`None` until something has been
    /// evaluated).
    pub async fn create_plan_incremental(
        &self,
        context: &PortfolioContext,
        inputs: &PlanInputs<'_>,
        store: &dyn PlannerStore,
    ) -> Result<Option<HolisticPlan>> {
        let current_hash = portfolio_hash(
            inputs.positions,
            inputs.securities,
            inputs.cash_balances,
            inputs.pending_orders,
        );

        // Portfolio-change invalidation: drop work for any stale fingerprint.
        for stale in store.list_portfolio_hashes().await? {
            if stale != current_hash {
                info!(
                    old = %&stale[..8.min(stale.len())],
                    new = %&current_hash[..8],
                    "portfolio changed, deleting stale sequences"
                );
                store.delete_sequences_for_portfolio(&stale).await?;
            }
        }

        if !store.has_sequences(&current_hash).await? {
            let opportunities = self.identify(context, inputs).await?;
            let generated = generate_action_sequences(
                &opportunities,
                inputs.available_cash,
                inputs.securities,
                &self.config,
            );
            let (feasible, counts) = filter_feasible(
                generated,
                inputs.positions,
                inputs.securities,
                inputs.available_cash,
                &self.config,
            );
            info!(
                sequences = feasible.len(),
                dropped = counts.total(),
                portfolio = %&current_hash[..8],
                "generated sequences for incremental processing"
            );
            store
                .ensure_sequences_generated(&current_hash, &feasible)
                .await?;
        }

        let batch = store
            .get_next_sequences(&current_hash, self.config.batch_size)
            .await?;

        if !batch.is_empty() {
            let mut metrics_cache: HashMap<String, SymbolMetrics> = HashMap::new();
            let mut best_in_batch: Option<(String, f64)> = None;

            for stored in &batch {
                let end_score = if store
                    .has_evaluation(&stored.sequence_hash, &current_hash)
                    .await?
                {
                    debug!(sequence = %&stored.sequence_hash[..8], "evaluation exists, skipping");
                    store
                        .get_evaluation(&stored.sequence_hash, &current_hash)
                        .await?
                        .map(|e| e.end_score)
                } else {
                    let (end_context, end_cash) = simulate_sequence(
                        &stored.actions,
                        context,
                        inputs.available_cash,
                        inputs.securities,
                    );
                    for symbol in end_context.positions.keys() {
                        if !metrics_cache.contains_key(symbol) {
                            let metrics = self.metrics.metrics_for(symbol).await?;
                            metrics_cache.insert(symbol.clone(), metrics);
                        }
                    }
                    let div = diversification_subscore(&end_context);
                    let scored = score_end_state(
                        &end_context.positions,
                        end_context.total_value,
                        div,
                        &end_context.stock_scores,
                        &metrics_cache,
                    );
                    store
                        .insert_evaluation(&StoredEvaluation {
                            sequence_hash: stored.sequence_hash.clone(),
                            portfolio_hash: current_hash.clone(),
                            end_score: scored.score,
                            breakdown: scored.breakdown,
                            end_cash,
                            end_positions: end_context.positions.clone(),
                            div_score: div * 100.0,
                            total_value: end_context.total_value,
                            evaluated_at: Utc::now(),
                        })
                        .await?;
                    Some(scored.score)
                };

                store
                    .mark_sequence_completed(&stored.sequence_hash, &current_hash, Utc::now())
                    .await?;

                if let Some(score) = end_score {
                    let improved = best_in_batch
                        .as_ref()
                        .is_none_or(|(_, best)| score > *best);
                    if improved {
                        best_in_batch = Some((stored.sequence_hash.clone(), score));
                    }
                }
            }

            if let Some((sequence_hash, score)) = best_in_batch {
                let replaced = store
                    .update_best_result(&current_hash, &sequence_hash, score)
                    .await?;
                if replaced {
                    info!(score, sequence = %&sequence_hash[..8], "new best sequence");
                }
            }
        }

        self.best_plan_from_store(context, &current_hash, store, inputs.available_cash)
            .await
    }

    /// Reconstruct the best plan from persisted state alone.
    async fn best_plan_from_store(
        &self,
        context: &PortfolioContext,
        portfolio_hash: &str,
        store: &dyn PlannerStore,
        available_cash: f64,
    ) -> Result<Option<HolisticPlan>> {
        let Some(best) = store.get_best_result(portfolio_hash).await? else {
            return Ok(None);
        };
        let Some(sequence) = store
            .get_sequence(portfolio_hash, &best.best_sequence_hash)
            .await?
        else {
            return Ok(None);
        };
        let Some(evaluation) = store
            .get_evaluation(&best.best_sequence_hash, portfolio_hash)
            .await?
        else {
            return Ok(None);
        };

        let current_score = portfolio_score(context);
        Ok(Some(self.assemble_plan(
            &sequence.actions,
            evaluation.end_score,
            evaluation.breakdown,
            current_score.total,
            context,
            &Opportunities::default(),
            available_cash,
        )))
    }

    async fn identify(
        &self,
        context: &PortfolioContext,
        inputs: &PlanInputs<'_>,
    ) -> Result<Opportunities> {
        // Metrics for held symbols feed windfall detection in heuristic mode.
        let held_metrics = self
            .fetch_metrics(context.positions.keys().cloned().collect())
            .await?;

        let opportunity_inputs = OpportunityInputs {
            context,
            positions: inputs.positions,
            securities: inputs.securities,
            current_prices: inputs.current_prices,
            available_cash: inputs.available_cash,
            cooldowns: inputs.cooldowns,
            metrics: &held_metrics,
        };

        let opportunities = match inputs.target_weights.filter(|tw| !tw.is_empty()) {
            Some(target_weights) => {
                info!("using optimizer target weights for opportunity identification");
                identify_opportunities_from_weights(
                    &opportunity_inputs,
                    target_weights,
                    &self.config,
                )
            }
            None => {
                info!("using heuristic opportunity identification");
                identify_opportunities(&opportunity_inputs, &self.config)
            }
        };
        Ok(opportunities)
    }

    async fn fetch_metrics(
        &self,
        symbols: HashSet<String>,
    ) -> Result<HashMap<String, SymbolMetrics>> {
        let mut sorted: Vec<String> = symbols.into_iter().collect();
        sorted.sort();
        let fetched = join_all(
            sorted
                .iter()
                .map(|symbol| self.metrics.metrics_for(symbol)),
        )
        .await;

        let mut cache = HashMap::with_capacity(sorted.len());
        for (symbol, result) in sorted.into_iter().zip(fetched) {
            cache.insert(symbol, result?);
        }
        Ok(cache)
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble_plan(
        &self,
        actions: &[ActionCandidate],
        end_score: f64,
        breakdown: HashMap<String, f64>,
        current_score: f64,
        context: &PortfolioContext,
        opportunities: &Opportunities,
        available_cash: f64,
    ) -> HolisticPlan {
        let steps: Vec<HolisticStep> = actions
            .iter()
            .enumerate()
            .map(|(i, action)| HolisticStep {
                step_number: i + 1,
                side: action.side,
                symbol: action.symbol.clone(),
                name: action.name.clone(),
                quantity: action.quantity,
                estimated_price: action.price,
                estimated_value: action.value_eur,
                currency: action.currency.clone(),
                reason: action.reason.clone(),
                narrative: step_narrative(action, context, opportunities),
                is_windfall: action.has_tag(tags::WINDFALL),
                is_averaging_down: action.has_tag(tags::AVERAGING_DOWN),
                contributes_to: action.tags.clone(),
            })
            .collect();

        let cash_required: f64 = steps
            .iter()
            .filter(|s| s.side == TradeSide::Buy)
            .map(|s| s.estimated_value)
            .sum();
        let cash_generated: f64 = steps
            .iter()
            .filter(|s| s.side == TradeSide::Sell)
            .map(|s| s.estimated_value)
            .sum();
        let feasible = cash_required <= available_cash + cash_generated;

        let end_state_score = round2(end_score * 100.0);
        let improvement = round2(end_state_score - current_score);
        let narrative_summary = plan_narrative(&steps, current_score, end_state_score);

        HolisticPlan {
            steps,
            current_score,
            end_state_score,
            improvement,
            narrative_summary,
            score_breakdown: breakdown,
            cash_required: round2(cash_required),
            cash_generated: round2(cash_generated),
            feasible,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
