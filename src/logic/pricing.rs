//! 成交冲击：卖出压价、买入抬价，以及不落地的投影预览

use chrono::{DateTime, Utc};

use super::Aggregate;
use super::drift::DriftParams;
use crate::models::{PriceEntry, TradeSide};

pub mod constants {
    pub const SALE_DELTA_PER_UNIT: f64 = 0.0040;
    pub const PURCHASE_DELTA_PER_UNIT: f64 = 0.0012;
    pub const MIN_MOD_PRICE: f64 = 0.01;
    pub const MAX_MOD_PRICE: f64 = 1.99;
    pub const DRIFT_TARGET: f64 = 1.99;
    /// 从最低乘数漂移到目标所需的小时数 (28 天)
    pub const DRIFT_HOURS_TO_TARGET: f64 = 672.0;
}

/// 乘数调整参数
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PricingParams {
    pub sale_delta_per_unit: f64,
    pub purchase_delta_per_unit: f64,
    pub min_mod_price: f64,
    pub max_mod_price: f64,
    pub drift: DriftParams,
}

impl Default for PricingParams {
    fn default() -> Self {
        use constants::*;
        Self {
            sale_delta_per_unit: SALE_DELTA_PER_UNIT,
            purchase_delta_per_unit: PURCHASE_DELTA_PER_UNIT,
            min_mod_price: MIN_MOD_PRICE,
            max_mod_price: MAX_MOD_PRICE,
            drift: DriftParams::from_horizon(DRIFT_TARGET, MIN_MOD_PRICE, MAX_MOD_PRICE, DRIFT_HOURS_TO_TARGET),
        }
    }
}

impl PricingParams {
    /// 限幅到 `[min, max]`；非有限值回落为中性乘数再限幅
    #[inline]
    pub fn clamp(&self, value: f64) -> f64 {
        let value = if value.is_finite() { value } else { crate::models::NEUTRAL_MOD_PRICE };
        value.clamp(self.min_mod_price, self.max_mod_price)
    }

    pub fn delta_per_unit(&self, side: TradeSide) -> f64 {
        match side {
            TradeSide::Sale => self.sale_delta_per_unit,
            TradeSide::Purchase => self.purchase_delta_per_unit,
        }
    }

    /// 对当前乘数施加 `units` 件成交的冲击
    pub fn apply_units(&self, current: f64, side: TradeSide, units: u64) -> f64 {
        let delta = units as f64 * self.delta_per_unit(side);
        match side {
            TradeSide::Sale => self.clamp(current - delta),
            TradeSide::Purchase => self.clamp(current + delta),
        }
    }

    /// 投影预览，不修改任何状态。`units <= 0` 时原样返回。
    pub fn project(&self, current: f64, side: TradeSide, units: i64) -> f64 {
        if units <= 0 {
            return current;
        }
        self.apply_units(current, side, units as u64)
    }
}

impl PriceEntry {
    /// 先补齐漂移，再施加本批次冲击；返回 (卖出增量, 买入增量)
    pub fn apply_trade(
        &mut self,
        params: &PricingParams,
        side: TradeSide,
        agg: &Aggregate,
        now: DateTime<Utc>,
    ) -> (u64, u64) {
        self.apply_drift(&params.drift, now);

        self.mod_price = params.apply_units(self.mod_price, side, agg.units);
        self.base_price = agg.average_base_price();
        self.last_update = Some(now);

        let (sold, bought) = match side {
            TradeSide::Sale => (agg.units, 0),
            TradeSide::Purchase => (0, agg.units),
        };
        self.sold_units = self.sold_units.saturating_add(sold);
        self.bought_units = self.bought_units.saturating_add(bought);
        (sold, bought)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};
    use proptest::prelude::*;

    fn assert_close(a: f64, b: f64) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap()
    }

    #[test]
    fn sale_of_hundred_units_from_neutral() {
        let p = PricingParams::default();
        assert_close(p.project(1.0, TradeSide::Sale, 100), 0.60);
    }

    #[test]
    fn purchase_clamps_at_max() {
        let p = PricingParams::default();
        assert_eq!(p.project(1.95, TradeSide::Purchase, 50), 1.99);
    }

    #[test]
    fn sale_clamps_at_floor() {
        let p = PricingParams::default();
        assert_eq!(p.project(0.05, TradeSide::Sale, 1_000), 0.01);
    }

    #[test]
    fn non_positive_units_project_current() {
        let p = PricingParams::default();
        assert_eq!(p.project(0.73, TradeSide::Sale, 0), 0.73);
        assert_eq!(p.project(0.73, TradeSide::Purchase, -4), 0.73);
    }

    #[test]
    fn apply_trade_updates_counters_and_base_price() {
        let p = PricingParams::default();
        let mut entry = PriceEntry::default();
        let agg = Aggregate { units: 10, weighted_base_sum: 45.0 };

        let deltas = entry.apply_trade(&p, TradeSide::Purchase, &agg, t0());

        assert_eq!(deltas, (0, 10));
        assert_eq!(entry.bought_units, 10);
        assert_eq!(entry.sold_units, 0);
        assert_close(entry.base_price, 4.5);
        assert_close(entry.mod_price, 1.012);
        assert_eq!(entry.last_update, Some(t0()));
    }

    #[test]
    fn apply_trade_drifts_before_delta() {
        let p = PricingParams::default();
        let mut entry = PriceEntry { mod_price: 0.5, last_update: Some(t0()), ..Default::default() };
        let now = t0() + TimeDelta::hours(100);
        let agg = Aggregate { units: 10, weighted_base_sum: 10.0 };

        entry.apply_trade(&p, TradeSide::Sale, &agg, now);

        let expected = 0.5 + 100.0 * p.drift.rate_per_hour - 10.0 * 0.0040;
        assert_close(entry.mod_price, expected);
        assert_eq!(entry.last_update, Some(now));
    }

    proptest! {
        #[test]
        fn multiplier_stays_bounded(
            trades in proptest::collection::vec((any::<bool>(), 0u64..2_000), 0..64)
        ) {
            let p = PricingParams::default();
            let mut current = 1.0;
            for (is_sale, units) in trades {
                let side = if is_sale { TradeSide::Sale } else { TradeSide::Purchase };
                current = p.apply_units(current, side, units);
                prop_assert!(current >= p.min_mod_price && current <= p.max_mod_price);
            }
        }

        #[test]
        fn sale_moves_down_by_exact_delta(current in 0.01f64..1.99, units in 1u64..400) {
            let p = PricingParams::default();
            let next = p.apply_units(current, TradeSide::Sale, units);
            let expected = (current - units as f64 * 0.0040).max(0.01);
            prop_assert!((next - expected).abs() < 1e-9);
        }

        #[test]
        fn purchase_moves_up_by_exact_delta(current in 0.01f64..1.99, units in 1u64..400) {
            let p = PricingParams::default();
            let next = p.apply_units(current, TradeSide::Purchase, units);
            let expected = (current + units as f64 * 0.0012).min(1.99);
            prop_assert!((next - expected).abs() < 1e-9);
        }
    }
}
