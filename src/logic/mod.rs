pub mod pricing;
pub mod drift;

use rustc_hash::FxHashMap;

use crate::models::TradeReport;

pub use self::drift::{DriftOutcome, DriftParams};
pub use self::pricing::PricingParams;

/// 单个物品在一个批次内的聚合结果
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Aggregate {
    pub units: u64,
    /// Σ(单价 × 件数)，用于计算批次加权均价
    pub weighted_base_sum: f64,
}

impl Aggregate {
    /// 批次加权均价，下限为 0
    pub fn average_base_price(&self) -> f64 {
        if self.units == 0 {
            return 0.0;
        }
        (self.weighted_base_sum / self.units as f64).max(0.0)
    }
}

/// 按物品聚合一个批次
///
/// 空白 ID 或件数非正的记录直接丢弃；非有限单价只计件数，不计权重。
pub fn aggregate_batch(batch: &[TradeReport]) -> FxHashMap<String, Aggregate> {
    let mut by_item: FxHashMap<String, Aggregate> =
        FxHashMap::with_capacity_and_hasher(batch.len(), Default::default());

    for report in batch {
        if report.item_id.trim().is_empty() || report.units <= 0 {
            continue;
        }
        let units = report.units as u64;
        let agg = by_item.entry(report.item_id.clone()).or_default();
        agg.units = agg.units.saturating_add(units);
        if report.unit_base_price.is_finite() {
            agg.weighted_base_sum += report.unit_base_price * units as f64;
        }
    }

    by_item
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sums_units_and_weights_per_item() {
        let batch = vec![
            TradeReport::new("ore", 10, 2.0),
            TradeReport::new("gem", 1, 100.0),
            TradeReport::new("ore", 30, 4.0),
        ];
        let agg = aggregate_batch(&batch);

        assert_eq!(agg.len(), 2);
        let ore = agg["ore"];
        assert_eq!(ore.units, 40);
        assert!((ore.average_base_price() - 3.5).abs() < 1e-12);
        assert_eq!(agg["gem"].units, 1);
    }

    #[test]
    fn drops_blank_ids_and_non_positive_units() {
        let batch = vec![
            TradeReport::new("itemA", 0, 5.0),
            TradeReport::new("itemB", -3, 5.0),
            TradeReport::new("   ", 4, 5.0),
            TradeReport::new("", 4, 5.0),
        ];
        assert!(aggregate_batch(&batch).is_empty());
    }

    #[test]
    fn negative_prices_floor_average_at_zero() {
        let agg = aggregate_batch(&[TradeReport::new("scrap", 5, -2.0)]);
        assert_eq!(agg["scrap"].average_base_price(), 0.0);
    }

    #[test]
    fn non_finite_price_counts_units_only() {
        let agg = aggregate_batch(&[
            TradeReport::new("ore", 2, f64::NAN),
            TradeReport::new("ore", 2, 3.0),
        ]);
        assert_eq!(agg["ore"].units, 4);
        assert!((agg["ore"].average_base_price() - 1.5).abs() < 1e-12);
    }
}
