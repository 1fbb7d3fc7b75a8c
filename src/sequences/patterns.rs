//! The ten deterministic pattern templates.
//!
//! Every builder receives the per-category candidate shortlists and returns
//! at most one sequence. All templates enforce the rigid ordering invariant
//! (sells first, then buys) and never let running cash go negative: a buy is
//! only appended while the accumulated cash covers it.

use crate::models::{ActionCandidate, TradeSide};

/// Per-category candidate shortlists fed into the templates.
#[derive(Debug, Clone, Copy)]
pub(crate) struct CandidatePools<'a> {
    pub profit_taking: &'a [ActionCandidate],
    pub averaging_down: &'a [ActionCandidate],
    pub rebalance_sells: &'a [ActionCandidate],
    pub rebalance_buys: &'a [ActionCandidate],
    pub opportunity_buys: &'a [ActionCandidate],
}

impl<'a> CandidatePools<'a> {
    fn all_candidates(&self) -> impl Iterator<Item = &'a ActionCandidate> {
        self.profit_taking
            .iter()
            .chain(self.averaging_down)
            .chain(self.rebalance_sells)
            .chain(self.rebalance_buys)
            .chain(self.opportunity_buys)
    }
}

fn non_empty(sequence: Vec<ActionCandidate>) -> Option<Vec<ActionCandidate>> {
    if sequence.is_empty() { None } else { Some(sequence) }
}

/// Append buys from `buys` while cash and step budget allow.
fn fill_with_buys(
    sequence: &mut Vec<ActionCandidate>,
    buys: impl IntoIterator<Item = ActionCandidate>,
    cash: &mut f64,
    max_steps: usize,
) {
    for candidate in buys {
        if candidate.value_eur <= *cash && sequence.len() < max_steps {
            *cash -= candidate.value_eur;
            sequence.push(candidate);
        }
    }
}

/// Pattern 1: direct buys only, funded entirely from available cash.
pub(crate) fn direct_buy(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    if available_cash <= 0.0 {
        return None;
    }
    let mut sequence = Vec::new();
    let mut cash = available_cash;
    fill_with_buys(
        &mut sequence,
        pools
            .averaging_down
            .iter()
            .chain(pools.rebalance_buys)
            .chain(pools.opportunity_buys)
            .cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
}

/// Pattern 2: take profits, then reinvest in averaging/rebalance buys.
pub(crate) fn profit_taking(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    if pools.profit_taking.is_empty() {
        return None;
    }
    let mut sequence: Vec<ActionCandidate> = pools
        .profit_taking
        .iter()
        .take(max_steps)
        .cloned()
        .collect();
    let mut cash = available_cash + sequence.iter().map(|c| c.value_eur).sum::<f64>();
    fill_with_buys(
        &mut sequence,
        pools
            .averaging_down
            .iter()
            .chain(pools.rebalance_buys)
            .cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
}

/// Pattern 3: sell overweight, buy underweight.
pub(crate) fn rebalance(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    if pools.rebalance_sells.is_empty() {
        return None;
    }
    let mut sequence: Vec<ActionCandidate> = pools
        .rebalance_sells
        .iter()
        .take(max_steps)
        .cloned()
        .collect();
    let mut cash = available_cash + sequence.iter().map(|c| c.value_eur).sum::<f64>();
    fill_with_buys(
        &mut sequence,
        pools.rebalance_buys.iter().cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
}

/// Pattern 4: averaging-down focus, with one profit-taking sell when cash is
/// short.
pub(crate) fn averaging_down(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    let first_buy = pools.averaging_down.first()?;
    let mut sequence = Vec::new();
    let mut cash = available_cash;

    if cash < first_buy.value_eur {
        if let Some(sell) = pools.profit_taking.first() {
            cash += sell.value_eur;
            sequence.push(sell.clone());
        }
    }
    fill_with_buys(
        &mut sequence,
        pools.averaging_down.iter().cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
}

/// Pattern 5: the single highest-priority action overall.
pub(crate) fn single_best(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    if max_steps < 1 {
        return None;
    }
    let best = pools.all_candidates().max_by(|a, b| {
        a.priority
            .partial_cmp(&b.priority)
            .unwrap_or(std::cmp::Ordering::Equal)
    })?;
    match best.side {
        TradeSide::Buy if best.value_eur <= available_cash => Some(vec![best.clone()]),
        TradeSide::Sell => Some(vec![best.clone()]),
        TradeSide::Buy => None,
    }
}

/// Pattern 6: all sell categories combined, then multiple buys.
pub(crate) fn multi_sell(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    let mut sequence: Vec<ActionCandidate> = pools
        .profit_taking
        .iter()
        .chain(pools.rebalance_sells)
        .take(max_steps)
        .cloned()
        .collect();
    if sequence.is_empty() {
        return None;
    }
    let mut cash = available_cash + sequence.iter().map(|c| c.value_eur).sum::<f64>();
    fill_with_buys(
        &mut sequence,
        pools
            .averaging_down
            .iter()
            .chain(pools.rebalance_buys)
            .chain(pools.opportunity_buys)
            .cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
}

/// Pattern 7: mixed strategy: up to half the budget in sells, buys fill the
/// remainder.
pub(crate) fn mixed(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    let mut sequence = Vec::new();
    let mut cash = available_cash;

    let max_sells = (max_steps / 2).max(1);
    for candidate in pools
        .profit_taking
        .iter()
        .chain(pools.rebalance_sells)
        .take(max_sells)
    {
        if sequence.len() < max_steps {
            cash += candidate.value_eur;
            sequence.push(candidate.clone());
        }
    }
    fill_with_buys(
        &mut sequence,
        pools
            .averaging_down
            .iter()
            .chain(pools.rebalance_buys)
            .chain(pools.opportunity_buys)
            .cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
}

/// Pattern 8: opportunity buys first, averaging/rebalance buys fill the rest.
pub(crate) fn opportunity_first(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    if pools.opportunity_buys.is_empty() {
        return None;
    }
    let mut sequence = Vec::new();
    let mut cash = available_cash;
    fill_with_buys(
        &mut sequence,
        pools.opportunity_buys.iter().cloned(),
        &mut cash,
        max_steps,
    );
    fill_with_buys(
        &mut sequence,
        pools
            .averaging_down
            .iter()
            .chain(pools.rebalance_buys)
            .cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
}

/// Pattern 9: multiple rebalance sells into multiple rebalance buys.
pub(crate) fn deep_rebalance(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    if pools.rebalance_sells.is_empty() || pools.rebalance_buys.is_empty() {
        return None;
    }
    let mut sequence = Vec::new();
    let mut cash = available_cash;

    let max_sells = (max_steps / 2).max(1);
    for candidate in pools.rebalance_sells.iter().take(max_sells) {
        if sequence.len() < max_steps {
            cash += candidate.value_eur;
            sequence.push(candidate.clone());
        }
    }
    fill_with_buys(
        &mut sequence,
        pools.rebalance_buys.iter().cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
}

/// Pattern 10: generate cash from every available sell, then deploy it into
/// strategic buys (opportunity first, then averaging, then rebalance).
pub(crate) fn cash_generation(
    pools: &CandidatePools<'_>,
    available_cash: f64,
    max_steps: usize,
) -> Option<Vec<ActionCandidate>> {
    let mut sequence: Vec<ActionCandidate> = pools
        .profit_taking
        .iter()
        .chain(pools.rebalance_sells)
        .take(max_steps)
        .cloned()
        .collect();
    if sequence.is_empty() {
        return None;
    }
    let mut cash = available_cash + sequence.iter().map(|c| c.value_eur).sum::<f64>();
    fill_with_buys(
        &mut sequence,
        pools
            .opportunity_buys
            .iter()
            .chain(pools.averaging_down)
            .chain(pools.rebalance_buys)
            .cloned(),
        &mut cash,
        max_steps,
    );
    non_empty(sequence)
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

    fn pools<'a>(
        profit_taking: &'a [ActionCandidate],
        averaging_down: &'a [ActionCandidate],
        rebalance_sells: &'a [ActionCandidate],
        rebalance_buys: &'a [ActionCandidate],
        opportunity_buys: &'a [ActionCandidate],
    ) -> CandidatePools<'a> {
        CandidatePools {
            profit_taking,
            averaging_down,
            rebalance_sells,
            rebalance_buys,
            opportunity_buys,
        }
    }

    fn assert_sells_before_buys(sequence: &[ActionCandidate]) {
        let first_buy = sequence.iter().position(|c| c.side == TradeSide::Buy);
        if let Some(idx) = first_buy {
            assert!(
                sequence[idx..].iter().all(|c| c.side == TradeSide::Buy),
                "interleaved sells and buys"
            );
        }
    }

    fn assert_cash_never_negative(sequence: &[ActionCandidate], starting_cash: f64) {
        let mut cash = starting_cash;
        for action in sequence {
            match action.side {
                TradeSide::Sell => cash += action.value_eur,
                TradeSide::Buy => cash -= action.value_eur,
            }
            assert!(cash >= -1e-9, "running cash went negative: {cash}");
        }
    }

    #[test]
    fn test_direct_buy_respects_cash() {
        let buys = vec![
            candidate(TradeSide::Buy, "A", 600.0, 5.0),
            candidate(TradeSide::Buy, "B", 600.0, 4.0),
        ];
        let p = pools(&[], &buys, &[], &[], &[]);
        let seq = direct_buy(&p, 1_000.0, 5).unwrap();
        assert_eq!(seq.len(), 1);
        assert_eq!(seq[0].symbol, "A");
        assert_cash_never_negative(&seq, 1_000.0);
    }

    #[test]
    fn test_direct_buy_none_without_cash() {
        let buys = vec![candidate(TradeSide::Buy, "A", 100.0, 5.0)];
        let p = pools(&[], &buys, &[], &[], &[]);
        assert!(direct_buy(&p, 0.0, 5).is_none());
    }

    #[test]
    fn test_profit_taking_reinvests() {
        let sells = vec![candidate(TradeSide::Sell, "WIN", 2_000.0, 9.0)];
        let buys = vec![candidate(TradeSide::Buy, "DIP", 1_500.0, 5.0)];
        let p = pools(&sells, &buys, &[], &[], &[]);
        let seq = profit_taking(&p, 0.0, 5).unwrap();
        assert_eq!(seq.len(), 2);
        assert_sells_before_buys(&seq);
        assert_cash_never_negative(&seq, 0.0);
    }

    #[test]
    fn test_rebalance_pairs_sell_and_buy() {
        let sells = vec![candidate(TradeSide::Sell, "OVER", 2_000.0, 8.0)];
        let buys = vec![candidate(TradeSide::Buy, "UNDER", 2_000.0, 8.0)];
        let p = pools(&[], &[], &sells, &buys, &[]);
        let seq = rebalance(&p, 0.0, 5).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0].symbol, "OVER");
        assert_eq!(seq[1].symbol, "UNDER");
    }

    #[test]
    fn test_averaging_down_sells_when_cash_short() {
        let avg = vec![candidate(TradeSide::Buy, "DIP", 1_000.0, 6.0)];
        let pt = vec![candidate(TradeSide::Sell, "WIN", 1_200.0, 7.0)];
        let p = pools(&pt, &avg, &[], &[], &[]);
        let seq = averaging_down(&p, 100.0, 5).unwrap();
        assert_eq!(seq.len(), 2);
        assert_eq!(seq[0].side, TradeSide::Sell);
        assert_cash_never_negative(&seq, 100.0);
    }

    #[test]
    fn test_single_best_prefers_priority() {
        let sells = vec![candidate(TradeSide::Sell, "S", 500.0, 3.0)];
        let buys = vec![candidate(TradeSide::Buy, "B", 500.0, 9.0)];
        let p = pools(&sells, &buys, &[], &[], &[]);
        // Affordable buy wins on priority.
        let seq = single_best(&p, 1_000.0, 5).unwrap();
        assert_eq!(seq[0].symbol, "B");
        // Unaffordable buy: no sequence (the sell is not the best candidate).
        assert!(single_best(&p, 100.0, 5).is_none());
    }

    #[test]
    fn test_mixed_caps_sells_at_half_depth() {
        let sells: Vec<ActionCandidate> = (0..4)
            .map(|i| candidate(TradeSide::Sell, &format!("S{i}"), 100.0, 5.0))
            .collect();
        let p = pools(&sells, &[], &[], &[], &[]);
        let seq = mixed(&p, 0.0, 4).unwrap();
        assert_eq!(seq.len(), 2);
    }

    #[test]
    fn test_cash_generation_orders_strategic_buys() {
        let sells = vec![candidate(TradeSide::Sell, "S", 3_000.0, 5.0)];
        let opp = vec![candidate(TradeSide::Buy, "OPP", 1_000.0, 2.0)];
        let avg = vec![candidate(TradeSide::Buy, "AVG", 1_000.0, 8.0)];
        let p = pools(&sells, &avg, &[], &[], &opp);
        let seq = cash_generation(&p, 0.0, 3).unwrap();
        assert_eq!(seq.len(), 3);
        // Opportunity buys lead the buy section regardless of priority.
        assert_eq!(seq[1].symbol, "OPP");
        assert_eq!(seq[2].symbol, "AVG");
    }

    #[test]
    fn test_deep_rebalance_requires_both_sides() {
        let sells = vec![candidate(TradeSide::Sell, "S", 1_000.0, 5.0)];
        let p = pools(&[], &[], &sells, &[], &[]);
        assert!(deep_rebalance(&p, 0.0, 5).is_none());
    }

    #[test]
    fn test_all_patterns_respect_ordering_and_cash() {
        let pt = vec![candidate(TradeSide::Sell, "PT", 1_500.0, 9.0)];
        let rs = vec![candidate(TradeSide::Sell, "RS", 1_000.0, 6.0)];
        let avg = vec![candidate(TradeSide::Buy, "AVG", 800.0, 7.0)];
        let rb = vec![candidate(TradeSide::Buy, "RB", 900.0, 5.0)];
        let opp = vec![candidate(TradeSide::Buy, "OPP", 700.0, 4.0)];
        let p = pools(&pt, &avg, &rs, &rb, &opp);

        let builders: [fn(&CandidatePools<'_>, f64, usize) -> Option<Vec<ActionCandidate>>; 10] = [
            direct_buy,
            profit_taking,
            rebalance,
            averaging_down,
            single_best,
            multi_sell,
            mixed,
            opportunity_first,
            deep_rebalance,
            cash_generation,
        ];
        for builder in builders {
            if let Some(seq) = builder(&p, 500.0, 5) {
                assert!(!seq.is_empty());
                assert!(seq.len() <= 5);
                assert_sells_before_buys(&seq);
                assert_cash_never_negative(&seq, 500.0);
            }
        }
    }
}
