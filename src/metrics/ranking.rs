use serde::{Deserialize, Serialize};

use super::aggregator::CloserCounters;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingMetric {
    Realized,
    ContractPaid,
    PaidPerRealized,
    NoShowRate,
}

impl RankingMetric {
    pub const ALL: [RankingMetric; 4] = [
        RankingMetric::Realized,
        RankingMetric::ContractPaid,
        RankingMetric::PaidPerRealized,
        RankingMetric::NoShowRate,
    ];

    /// Lower is better only for the no-show rate.
    pub fn ascending(self) -> bool {
        matches!(self, RankingMetric::NoShowRate)
    }

    pub fn value(self, counters: &CloserCounters) -> f64 {
        match self {
            RankingMetric::Realized => f64::from(counters.realized),
            RankingMetric::ContractPaid => f64::from(counters.contract_paid),
            RankingMetric::PaidPerRealized => {
                ratio(counters.contract_paid.into(), counters.realized.into())
            }
            RankingMetric::NoShowRate => ratio(counters.no_show.into(), counters.scheduled.into()),
        }
    }
}

/// Zero when the denominator is zero.
pub fn ratio(numerator: u64, denominator: u64) -> f64 {
    if denominator == 0 {
        0.0
    } else {
        numerator as f64 / denominator as f64
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloserRanks {
    pub realized: u32,
    pub contract_paid: u32,
    pub paid_per_realized: u32,
    pub no_show_rate: u32,
}

impl CloserRanks {
    fn set(&mut self, metric: RankingMetric, rank: u32) {
        match metric {
            RankingMetric::Realized => self.realized = rank,
            RankingMetric::ContractPaid => self.contract_paid = rank,
            RankingMetric::PaidPerRealized => self.paid_per_realized = rank,
            RankingMetric::NoShowRate => self.no_show_rate = rank,
        }
    }
}

/// 1-based positions for one metric, aligned with `counters`. Ties keep input
/// order, so every position is distinct.
pub fn rank_positions(counters: &[&CloserCounters], metric: RankingMetric) -> Vec<u32> {
    let values: Vec<f64> = counters.iter().map(|c| metric.value(c)).collect();
    let mut order: Vec<usize> = (0..values.len()).collect();
    if metric.ascending() {
        order.sort_by(|&a, &b| values[a].total_cmp(&values[b]));
    } else {
        order.sort_by(|&a, &b| values[b].total_cmp(&values[a]));
    }

    let mut positions = vec![0; values.len()];
    for (position, index) in order.into_iter().enumerate() {
        positions[index] = position as u32 + 1;
    }
    positions
}

pub fn rank_all(counters: &[&CloserCounters]) -> Vec<CloserRanks> {
    let mut ranks = vec![CloserRanks::default(); counters.len()];
    for metric in RankingMetric::ALL {
        for (slot, position) in ranks.iter_mut().zip(rank_positions(counters, metric)) {
            slot.set(metric, position);
        }
    }
    ranks
}
