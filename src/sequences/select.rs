//! Diversity-aware candidate selection.
//!
//! Before the pattern templates run, each category shortlist is reduced to
//! `max_opportunities_per_category` entries. Pure priority ranking tends to
//! pick five candidates from the same country; clustering by country, then
//! industry, then symbol prefix spreads the shortlist across the universe
//! while still favoring priority.

use std::collections::HashMap;

use crate::models::{ActionCandidate, Security};

/// Cluster key for a candidate: country, else industry, else symbol prefix.
fn cluster_key(candidate: &ActionCandidate, securities: &HashMap<&str, &Security>) -> String {
    if let Some(security) = securities.get(candidate.symbol.as_str()) {
        if let Some(country) = &security.country {
            return format!("COUNTRY:{country}");
        }
        if let Some(industry) = &security.industry {
            return format!("INDUSTRY:{industry}");
        }
    }
    let prefix: String = candidate.symbol.chars().take(3).collect();
    format!("SYMBOL:{prefix}")
}

/// Select up to `max_count` diverse candidates from a priority-sorted list.
///
/// Clusters candidates, takes the top entries of each cluster (clusters
/// ranked by total priority), then re-scores the selection with
/// `(1 − w) · priority/100 + w · 1/(1 + 0.5 · same_cluster_count)` where `w`
/// is `diversity_weight`.
pub(crate) fn select_diverse(
    opportunities: &[ActionCandidate],
    max_count: usize,
    securities: &HashMap<&str, &Security>,
    diversity_weight: f64,
) -> Vec<ActionCandidate> {
    if opportunities.is_empty() || max_count == 0 {
        return vec![];
    }
    if opportunities.len() <= max_count {
        return opportunities.to_vec();
    }

    let mut clusters: HashMap<String, Vec<&ActionCandidate>> = HashMap::new();
    for opp in opportunities {
        clusters
            .entry(cluster_key(opp, securities))
            .or_default()
            .push(opp);
    }

    let per_cluster = (max_count / clusters.len()).max(1);
    let mut ranked_clusters: Vec<(&String, &Vec<&ActionCandidate>)> = clusters.iter().collect();
    ranked_clusters.sort_by(|(key_a, a), (key_b, b)| {
        let sum_a: f64 = a.iter().map(|c| c.priority).sum();
        let sum_b: f64 = b.iter().map(|c| c.priority).sum();
        sum_b
            .partial_cmp(&sum_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| key_a.cmp(key_b))
    });

    let mut selected: Vec<ActionCandidate> = Vec::new();
    for (_, cluster) in &ranked_clusters {
        selected.extend(cluster.iter().take(per_cluster).map(|c| (*c).clone()));
        if selected.len() >= max_count {
            break;
        }
    }

    // Top up from the untaken remainder, best priority first.
    if selected.len() < max_count {
        let mut remaining: Vec<&ActionCandidate> = opportunities
            .iter()
            .filter(|opp| !selected.iter().any(|s| s == *opp))
            .collect();
        remaining.sort_by(|a, b| {
            b.priority
                .partial_cmp(&a.priority)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        selected.extend(
            remaining
                .into_iter()
                .take(max_count - selected.len())
                .cloned(),
        );
    }

    let diversity_score = |opp: &ActionCandidate| -> f64 {
        let key = cluster_key(opp, securities);
        let same_cluster = selected
            .iter()
            .filter(|other| *other != opp && cluster_key(other, securities) == key)
            .count();
        let diversity_bonus = 1.0 / (1.0 + same_cluster as f64 * 0.5);
        let priority_score = if opp.priority > 0.0 {
            opp.priority / 100.0
        } else {
            0.0
        };
        (1.0 - diversity_weight) * priority_score + diversity_weight * diversity_bonus
    };

    let mut rescored: Vec<(f64, ActionCandidate)> = selected
        .iter()
        .map(|opp| (diversity_score(opp), opp.clone()))
        .collect();
    rescored.sort_by(|(score_a, a), (score_b, b)| {
        score_b
            .partial_cmp(score_a)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.symbol.cmp(&b.symbol))
    });

    rescored
        .into_iter()
        .take(max_count)
        .map(|(_, opp)| opp)
        .collect()
}
