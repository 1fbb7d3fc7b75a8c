//! Human-readable narratives for actions and plans.
//!
//! Pure functions of their inputs; identical inputs always produce identical
//! text. Branching keys off the candidate's tags.

use crate::context::PortfolioContext;
use crate::models::{ActionCandidate, HolisticStep, Opportunities, TradeSide, tags};

/// Narrative for a single action: what it is, why, and what it enables.
pub fn step_narrative(
    action: &ActionCandidate,
    context: &PortfolioContext,
    opportunities: &Opportunities,
) -> String {
    match action.side {
        TradeSide::Sell => sell_narrative(action, opportunities),
        TradeSide::Buy => buy_narrative(action, context),
    }
}

fn sell_narrative(action: &ActionCandidate, opportunities: &Opportunities) -> String {
    let mut parts = vec![format!(
        "Sell €{:.0} of {} ({})",
        action.value_eur, action.name, action.symbol
    )];

    if action.has_tag(tags::WINDFALL) {
        parts.push(format!(
            "This position has experienced windfall gains beyond normal growth. {}.",
            action.reason
        ));
        parts.push(
            "Taking profits locks in gains and frees capital for better opportunities."
                .to_string(),
        );
    } else if action.has_tag(tags::PROFIT_TAKING) {
        parts.push(format!("Reason: {}.", action.reason));
        parts.push("This reduces risk by converting paper gains to realized profits.".to_string());
    } else if action.has_tag(tags::REBALANCE) {
        match overweight_group(&action.tags) {
            Some(group) => {
                parts.push(format!("The portfolio is overweight in {group}."));
                parts.push(
                    "Trimming this position improves geographic diversification.".to_string(),
                );
            }
            None => parts.push(format!("Reason: {}.", action.reason)),
        }
    } else {
        parts.push(format!("Reason: {}.", action.reason));
    }

    // What the freed cash enables.
    let top_buy = opportunities
        .averaging_down
        .first()
        .or_else(|| opportunities.rebalance_buys.first())
        .or_else(|| opportunities.opportunity_buys.first());
    if let Some(buy) = top_buy {
        parts.push(format!(
            "This frees capital to invest in {}, which offers better risk-adjusted returns.",
            buy.name
        ));
    }

    parts.join(" ")
}

fn buy_narrative(action: &ActionCandidate, context: &PortfolioContext) -> String {
    let mut parts = vec![format!(
        "Buy €{:.0} of {} ({})",
        action.value_eur, action.name, action.symbol
    )];

    if action.has_tag(tags::AVERAGING_DOWN) {
        parts.push(
            "This quality stock is temporarily down, presenting an opportunity to lower the \
             average cost basis."
                .to_string(),
        );
        parts.push(format!("{}.", action.reason));
        parts.push("Averaging down on quality dips is a proven long-term strategy.".to_string());
    } else if action.has_tag(tags::REBALANCE) {
        match underweight_group(&action.tags) {
            Some(group) => {
                parts.push(format!("The portfolio is underweight in {group}."));
                parts.push(
                    "This purchase improves geographic diversification and reduces concentration \
                     risk."
                        .to_string(),
                );
            }
            None => parts.push(format!("Reason: {}.", action.reason)),
        }
    } else if action.has_tag(tags::QUALITY) || action.has_tag(tags::OPPORTUNITY) {
        parts.push(format!("{}.", action.reason));
        parts.push(
            "High-quality stocks with good fundamentals tend to outperform over the long term."
                .to_string(),
        );
    } else {
        parts.push(format!("Reason: {}.", action.reason));
    }

    let dividend_yield = context.dividend_of(&action.symbol);
    if dividend_yield > 0.03 {
        parts.push(format!(
            "This stock also provides a {:.1}% dividend yield for income.",
            dividend_yield * 100.0
        ));
    }

    parts.join(" ")
}

fn overweight_group(action_tags: &[String]) -> Option<String> {
    action_tags
        .iter()
        .find_map(|t| t.strip_prefix("overweight_"))
        .map(str::to_uppercase)
}

fn underweight_group(action_tags: &[String]) -> Option<String> {
    action_tags
        .iter()
        .find_map(|t| t.strip_prefix("underweight_"))
        .map(str::to_uppercase)
}

/// Plan-level summary: chief pattern, sell/buy totals, and score delta.
pub fn plan_narrative(steps: &[HolisticStep], current_score: f64, end_score: f64) -> String {
    if steps.is_empty() {
        return "No actions recommended. The portfolio is well-positioned.".to_string();
    }

    let sells: Vec<&HolisticStep> = steps.iter().filter(|s| s.side == TradeSide::Sell).collect();
    let buys: Vec<&HolisticStep> = steps.iter().filter(|s| s.side == TradeSide::Buy).collect();
    let windfall_sells = sells.iter().filter(|s| s.is_windfall).count();
    let averaging_buys = buys.iter().filter(|s| s.is_averaging_down).count();
    let improvement = end_score - current_score;

    let mut parts: Vec<String> = Vec::new();

    if windfall_sells > 0 && averaging_buys > 0 {
        parts.push(
            "This plan takes profits from windfall gains and reinvests in quality stocks that \
             are temporarily down."
                .to_string(),
        );
    } else if windfall_sells > 0 {
        parts.push(
            "This plan captures windfall profits from positions that have exceeded their \
             historical growth rates."
                .to_string(),
        );
    } else if averaging_buys > 0 {
        parts.push(
            "This plan focuses on averaging down on quality positions that are temporarily \
             undervalued."
                .to_string(),
        );
    } else if !sells.is_empty() && !buys.is_empty() {
        parts.push(
            "This plan rebalances the portfolio by trimming overweight positions and adding to \
             underweight areas."
                .to_string(),
        );
    } else if !buys.is_empty() {
        parts.push("This plan deploys available cash into high-quality opportunities.".to_string());
    } else {
        parts.push("This plan reduces risk by taking profits from selected positions.".to_string());
    }

    parts.push(format!("The plan consists of {} action(s):", steps.len()));

    if !sells.is_empty() {
        let total: f64 = sells.iter().map(|s| s.estimated_value).sum();
        let symbols: Vec<&str> = sells.iter().map(|s| s.symbol.as_str()).collect();
        parts.push(format!("• Sell €{:.0} from {}", total, symbols.join(", ")));
    }
    if !buys.is_empty() {
        let total: f64 = buys.iter().map(|s| s.estimated_value).sum();
        let symbols: Vec<&str> = buys.iter().map(|s| s.symbol.as_str()).collect();
        parts.push(format!("• Buy €{:.0} in {}", total, symbols.join(", ")));
    }

    if improvement > 0.0 {
        parts.push(format!(
            "Expected portfolio improvement: +{improvement:.1} points (from {current_score:.1} \
             to {end_score:.1})."
        ));
    } else if improvement < 0.0 {
        parts.push(format!(
            "Note: Short-term score may decrease by {:.1} points, but this positions the \
             portfolio for better long-term growth.",
            improvement.abs()
        ));
    } else {
        parts.push(format!(
            "This maintains the current portfolio score of {current_score:.1} while improving \
             diversification."
        ));
    }

    parts.join(" ")
}

/// Explain an individually negative action that enables a better sequence
/// outcome. Empty when there is no trade-off to explain.
pub fn tradeoff_explanation(
    action: &ActionCandidate,
    individual_impact: f64,
    sequence_impact: f64,
) -> String {
    if individual_impact >= 0.0 || sequence_impact <= individual_impact {
        return String::new();
    }

    let verb = match action.side {
        TradeSide::Sell => "Selling",
        TradeSide::Buy => "Buying",
    };
    format!(
        "{verb} {} in isolation would reduce the portfolio score by {:.1} points. However, as \
         part of this sequence, it enables an overall improvement of {:.1} points. The \
         short-term sacrifice creates a better long-term outcome.",
        action.name,
        individual_impact.abs(),
        sequence_impact
    )
}
