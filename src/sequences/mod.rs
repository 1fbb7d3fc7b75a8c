//! Candidate sequence generation.
//!
//! Runs the ten pattern templates plus bounded combinatorial enumeration at
//! every depth from 1 to `max_plan_depth`, then deduplicates. Every emitted
//! sequence satisfies the structural invariants: sells strictly before buys,
//! no duplicate symbols, length within the depth cap, running cash never
//! negative.

mod patterns;
mod select;

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::PlannerConfig;
use crate::hash::sequence_hash;
use crate::models::{ActionCandidate, Opportunities, Security, TradeSide};

use patterns::CandidatePools;
use select::select_diverse;

/// The strategy that produced a sequence; persisted for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    /// Direct buys funded from cash
    DirectBuy,
    /// Profit-taking sells reinvested
    ProfitTaking,
    /// Rebalance sells into rebalance buys
    Rebalance,
    /// Averaging-down focus
    AveragingDown,
    /// Single highest-priority action
    SingleBest,
    /// Multiple sells into multiple buys
    MultiSell,
    /// Half sells, half buys
    Mixed,
    /// Opportunity buys first
    OpportunityFirst,
    /// Deep rebalance on both sides
    DeepRebalance,
    /// All sells, then strategic buys
    CashGeneration,
    /// Combinatorial enumeration
    Combinatorial,
}

impl PatternKind {
    /// Database representation.
    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::DirectBuy => "direct_buy",
            PatternKind::ProfitTaking => "profit_taking",
            PatternKind::Rebalance => "rebalance",
            PatternKind::AveragingDown => "averaging_down",
            PatternKind::SingleBest => "single_best",
            PatternKind::MultiSell => "multi_sell",
            PatternKind::Mixed => "mixed",
            PatternKind::OpportunityFirst => "opportunity_first",
            PatternKind::DeepRebalance => "deep_rebalance",
            PatternKind::CashGeneration => "cash_generation",
            PatternKind::Combinatorial => "combinatorial",
        }
    }
}

impl std::fmt::Display for PatternKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A generated candidate sequence with its provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedSequence {
    /// Ordered actions (sells first, then buys)
    pub actions: Vec<ActionCandidate>,
    /// Template that produced the sequence
    pub pattern: PatternKind,
}

impl GeneratedSequence {
    /// Sequence depth (number of actions).
    pub fn depth(&self) -> usize {
        self.actions.len()
    }

    /// Sum of action priorities; the sort key for evaluation order.
    pub fn priority(&self) -> f64 {
        self.actions.iter().map(|c| c.priority).sum()
    }

    /// Average per-action priority, compared against the priority threshold.
    pub fn avg_priority(&self) -> f64 {
        if self.actions.is_empty() {
            return 0.0;
        }
        self.priority() / self.actions.len() as f64
    }

    /// Deterministic fingerprint of the ordered `(symbol, side, quantity)`
    /// tuples.
    pub fn hash(&self) -> String {
        sequence_hash(&self.actions)
    }
}

/// Generate all candidate sequences for the given opportunities.
///
/// Patterns and combinatorial enumeration run at every depth in
/// `1..=max_plan_depth`; the union is deduplicated on the ordered
/// `(symbol, side)` tuples and sequences containing the same symbol twice are
/// dropped.
pub fn generate_action_sequences(
    opportunities: &Opportunities,
    available_cash: f64,
    securities: &[Security],
    config: &PlannerConfig,
) -> Vec<GeneratedSequence> {
    let securities_by_symbol: HashMap<&str, &Security> =
        securities.iter().map(|s| (s.symbol.as_str(), s)).collect();

    let mut all_sequences: Vec<GeneratedSequence> = Vec::new();
    for depth in 1..=config.max_plan_depth {
        all_sequences.extend(generate_at_depth(
            opportunities,
            available_cash,
            depth,
            &securities_by_symbol,
            config,
        ));
    }

    let mut unique: Vec<GeneratedSequence> = Vec::new();
    let mut seen: HashSet<Vec<(String, TradeSide)>> = HashSet::new();
    for sequence in all_sequences {
        if sequence.actions.is_empty() {
            continue;
        }
        let symbols: Vec<&str> = sequence.actions.iter().map(|c| c.symbol.as_str()).collect();
        let distinct: HashSet<&str> = symbols.iter().copied().collect();
        if distinct.len() != symbols.len() {
            debug!(?symbols, "dropping sequence with duplicate symbols");
            continue;
        }
        let key: Vec<(String, TradeSide)> = sequence
            .actions
            .iter()
            .map(|c| (c.symbol.clone(), c.side))
            .collect();
        if seen.insert(key) {
            unique.push(sequence);
        }
    }

    info!(
        sequences = unique.len(),
        max_depth = config.max_plan_depth,
        combinatorial = config.enable_combinatorial,
        "generated unique candidate sequences"
    );
    for (i, sequence) in unique.iter().take(5).enumerate() {
        let actions: Vec<String> = sequence.actions.iter().map(ActionCandidate::summary).collect();
        debug!(rank = i + 1, pattern = %sequence.pattern, ?actions, "candidate sequence");
    }
    unique
}

fn generate_at_depth(
    opportunities: &Opportunities,
    available_cash: f64,
    max_steps: usize,
    securities_by_symbol: &HashMap<&str, &Security>,
    config: &PlannerConfig,
) -> Vec<GeneratedSequence> {
    let shortlist = |list: &[ActionCandidate]| -> Vec<ActionCandidate> {
        if config.enable_diverse_selection {
            select_diverse(
                list,
                config.max_opportunities_per_category,
                securities_by_symbol,
                config.diversity_weight,
            )
        } else {
            list.iter()
                .take(config.max_opportunities_per_category)
                .cloned()
                .collect()
        }
    };

    let top_profit_taking = shortlist(&opportunities.profit_taking);
    let top_averaging = shortlist(&opportunities.averaging_down);
    let top_rebalance_sells = shortlist(&opportunities.rebalance_sells);
    let top_rebalance_buys = shortlist(&opportunities.rebalance_buys);
    let top_opportunity = shortlist(&opportunities.opportunity_buys);

    let pools = CandidatePools {
        profit_taking: &top_profit_taking,
        averaging_down: &top_averaging,
        rebalance_sells: &top_rebalance_sells,
        rebalance_buys: &top_rebalance_buys,
        opportunity_buys: &top_opportunity,
    };

    let builders: [(
        PatternKind,
        fn(&CandidatePools<'_>, f64, usize) -> Option<Vec<ActionCandidate>>,
    ); 10] = [
        (PatternKind::DirectBuy, patterns::direct_buy),
        (PatternKind::ProfitTaking, patterns::profit_taking),
        (PatternKind::Rebalance, patterns::rebalance),
        (PatternKind::AveragingDown, patterns::averaging_down),
        (PatternKind::SingleBest, patterns::single_best),
        (PatternKind::MultiSell, patterns::multi_sell),
        (PatternKind::Mixed, patterns::mixed),
        (PatternKind::OpportunityFirst, patterns::opportunity_first),
        (PatternKind::DeepRebalance, patterns::deep_rebalance),
        (PatternKind::CashGeneration, patterns::cash_generation),
    ];

    let mut sequences: Vec<GeneratedSequence> = builders
        .into_iter()
        .filter_map(|(pattern, builder)| {
            builder(&pools, available_cash, max_steps)
                .map(|actions| GeneratedSequence { actions, pattern })
        })
        .collect();

    if config.enable_combinatorial {
        let all_sells: Vec<ActionCandidate> = top_profit_taking
            .iter()
            .chain(&top_rebalance_sells)
            .cloned()
            .collect();
        let all_buys: Vec<ActionCandidate> = top_averaging
            .iter()
            .chain(&top_rebalance_buys)
            .chain(&top_opportunity)
            .cloned()
            .collect();

        if !all_sells.is_empty() || !all_buys.is_empty() {
            sequences.extend(
                generate_combinations(&all_sells, &all_buys, max_steps, config)
                    .into_iter()
                    .map(|actions| GeneratedSequence {
                        actions,
                        pattern: PatternKind::Combinatorial,
                    }),
            );
        }
    }

    sequences
}

/// Enumerate sell×buy combinations with rigid ordering and pruning.
///
/// Candidates below the priority threshold are excluded, the pools are
/// truncated to `combinatorial_max_candidates`, and enumeration stops once
/// `combinatorial_max_combinations_per_depth` sequences exist for this depth.
fn generate_combinations(
    sells: &[ActionCandidate],
    buys: &[ActionCandidate],
    max_steps: usize,
    config: &PlannerConfig,
) -> Vec<Vec<ActionCandidate>> {
    let max_sells = config.combinatorial_max_sells.min(max_steps / 2);
    let max_buys = config.combinatorial_max_buys.min(max_steps);
    let max_combinations = config.combinatorial_max_combinations_per_depth;

    let filtered_sells: Vec<&ActionCandidate> = sells
        .iter()
        .filter(|c| c.priority >= config.priority_threshold)
        .take(config.combinatorial_max_candidates)
        .collect();
    let filtered_buys: Vec<&ActionCandidate> = buys
        .iter()
        .filter(|c| c.priority >= config.priority_threshold)
        .take(config.combinatorial_max_candidates)
        .collect();

    let mut sequences: Vec<Vec<ActionCandidate>> = Vec::new();

    'outer: for num_sells in 1..=max_sells.min(filtered_sells.len()) {
        for sell_combo in combinations(&filtered_sells, num_sells) {
            if sequences.len() >= max_combinations {
                break 'outer;
            }
            let remaining_steps = max_steps.saturating_sub(sell_combo.len());
            if remaining_steps == 0 {
                continue;
            }
            let buy_cap = max_buys.min(remaining_steps).min(filtered_buys.len());
            for num_buys in 1..=buy_cap {
                for buy_combo in combinations(&filtered_buys, num_buys) {
                    if sequences.len() >= max_combinations {
                        break 'outer;
                    }
                    let sequence: Vec<ActionCandidate> = sell_combo
                        .iter()
                        .chain(buy_combo.iter())
                        .map(|c| (**c).clone())
                        .collect();
                    if sequence.len() <= max_steps {
                        sequences.push(sequence);
                    }
                }
            }
        }
    }

    sequences
}

/// All k-element combinations of `items`, in lexicographic index order.
fn combinations<'a, T>(items: &'a [&'a T], k: usize) -> Vec<Vec<&'a T>> {
    let n = items.len();
    if k == 0 || k > n {
        return vec![];
    }
    let mut result = Vec::new();
    let mut indices: Vec<usize> = (0..k).collect();
    loop {
        result.push(indices.iter().map(|&i| items[i]).collect());
        // Advance the rightmost index that still has room.
        let mut i = k;
        loop {
            if i == 0 {
                return result;
            }
            i -= 1;
            if indices[i] != i + n - k {
                break;
            }
        }
        indices[i] += 1;
        for j in i + 1..k {
            indices[j] = indices[j - 1] + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::tags;

    fn candidate(side: TradeSide, symbol: &str, value: f64, priority: f64) -> ActionCandidate {
        ActionCandidate {
            side,
            symbol: symbol.to_string(),
            name: symbol.to_string(),
            quantity: 1,
            price: value,
            value_eur: value,
            currency: "EUR".to_string(),
            priority,
            reason: "test".to_string(),
            tags: vec![tags::REBALANCE.to_string()],
        }
    }

    fn sample_opportunities() -> Opportunities {
        Opportunities {
            profit_taking: vec![candidate(TradeSide::Sell, "WIN", 2_000.0, 9.0)],
            averaging_down: vec![candidate(TradeSide::Buy, "DIP", 1_000.0, 7.0)],
            rebalance_sells: vec![candidate(TradeSide::Sell, "OVER", 1_500.0, 6.0)],
            rebalance_buys: vec![candidate(TradeSide::Buy, "UNDER", 1_200.0, 5.0)],
            opportunity_buys: vec![candidate(TradeSide::Buy, "OPP", 800.0, 4.0)],
        }
    }

    #[test]
    fn test_generate_produces_unique_valid_sequences() {
        let opps = sample_opportunities();
        let config = PlannerConfig::default();
        let sequences = generate_action_sequences(&opps, 1_000.0, &[], &config);
        assert!(!sequences.is_empty());

        let mut seen = HashSet::new();
        for seq in &sequences {
            assert!(seq.depth() >= 1 && seq.depth() <= config.max_plan_depth);
            // Ordering invariant.
            let first_buy = seq
                .actions
                .iter()
                .position(|c| c.side == TradeSide::Buy);
            if let Some(idx) = first_buy {
                assert!(seq.actions[idx..].iter().all(|c| c.side == TradeSide::Buy));
            }
            // No duplicate symbols.
            let symbols: HashSet<&str> =
                seq.actions.iter().map(|c| c.symbol.as_str()).collect();
            assert_eq!(symbols.len(), seq.actions.len());
            // Dedup on (symbol, side) tuples.
            let key: Vec<(String, TradeSide)> = seq
                .actions
                .iter()
                .map(|c| (c.symbol.clone(), c.side))
                .collect();
            assert!(seen.insert(key), "duplicate sequence emitted");
        }
    }

    #[test]
    fn test_empty_opportunities_yield_no_sequences() {
        let config = PlannerConfig::default();
        let sequences =
            generate_action_sequences(&Opportunities::default(), 1_000.0, &[], &config);
        assert!(sequences.is_empty());
    }

    #[test]
    fn test_single_candidate_universe() {
        // One sell candidate: the single-best template (and equivalents that
        // dedup into it) produce exactly one unique length-1 sequence.
        let opps = Opportunities {
            profit_taking: vec![candidate(TradeSide::Sell, "ONLY", 1_000.0, 5.0)],
            ..Default::default()
        };
        let config = PlannerConfig::default();
        let sequences = generate_action_sequences(&opps, 0.0, &[], &config);
        assert_eq!(sequences.len(), 1);
        assert_eq!(sequences[0].depth(), 1);
        assert_eq!(sequences[0].actions[0].symbol, "ONLY");
    }

    #[test]
    fn test_combinatorial_cap_respected() {
        let sells: Vec<ActionCandidate> = (0..6)
            .map(|i| candidate(TradeSide::Sell, &format!("S{i}"), 500.0, 5.0))
            .collect();
        let buys: Vec<ActionCandidate> = (0..6)
            .map(|i| candidate(TradeSide::Buy, &format!("B{i}"), 400.0, 5.0))
            .collect();
        let config = PlannerConfig::builder()
            .combinatorial_max_combinations_per_depth(10)
            .build()
            .unwrap();
        let combos = generate_combinations(&sells, &buys, 5, &config);
        assert!(combos.len() <= 10);
        for combo in &combos {
            let first_buy = combo.iter().position(|c| c.side == TradeSide::Buy).unwrap();
            assert!(combo[first_buy..].iter().all(|c| c.side == TradeSide::Buy));
        }
    }

    #[test]
    fn test_combinatorial_priority_threshold() {
        let sells = vec![
            candidate(TradeSide::Sell, "HIGH", 500.0, 5.0),
            candidate(TradeSide::Sell, "LOW", 500.0, 0.1),
        ];
        let buys = vec![candidate(TradeSide::Buy, "B", 400.0, 5.0)];
        let config = PlannerConfig::default();
        let combos = generate_combinations(&sells, &buys, 5, &config);
        assert!(
            combos
                .iter()
                .all(|combo| combo.iter().all(|c| c.symbol != "LOW"))
        );
    }

    #[test]
    fn test_combinations_helper() {
        let a = 1;
        let b = 2;
        let c = 3;
        let items: Vec<&i32> = vec![&a, &b, &c];
        let pairs = combinations(&items, 2);
        assert_eq!(pairs.len(), 3);
        assert!(combinations(&items, 0).is_empty());
        assert!(combinations(&items, 4).is_empty());
    }

    #[test]
    fn test_sequence_priority_and_hash() {
        let seq = GeneratedSequence {
            actions: vec![
                candidate(TradeSide::Sell, "A", 1_000.0, 6.0),
                candidate(TradeSide::Buy, "B", 1_000.0, 4.0),
            ],
            pattern: PatternKind::Rebalance,
        };
        assert!((seq.priority() - 10.0).abs() < f64::EPSILON);
        assert!((seq.avg_priority() - 5.0).abs() < f64::EPSILON);
        assert_eq!(seq.hash().len(), 32);
        assert_eq!(seq.pattern.as_str(), "rebalance");
    }
}
