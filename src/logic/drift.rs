//! 时间漂移：无人交易时乘数随时间线性回升到目标值
//!
//! 漂移只在写路径上惰性结算 (成交、周期清扫)，读路径不推进。
//! 规则：
//! - 从未结算过的条目只记录时间戳，不追溯漂移；
//! - 经过时间 `<= 0` (时钟回拨或同一时刻) 直接跳过，不改时间戳；
//! - 乘数只会向上靠近目标，绝不越过目标，也绝不下调。

use chrono::{DateTime, Utc};

use crate::models::{PriceEntry, StoredEntry};

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DriftParams {
    pub target: f64,
    pub rate_per_hour: f64,
    pub min_mod_price: f64,
    pub max_mod_price: f64,
}

/// 单次漂移结算的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriftOutcome {
    /// 首次结算，仅记录时间戳
    Stamped,
    /// 经过时间非正，未做任何修改
    Skipped,
    /// 已推进 (数值可能因已达目标而不变)
    Advanced,
}

impl DriftParams {
    /// `rate = (target - min) / hours_to_target`
    pub fn from_horizon(target: f64, min_mod_price: f64, max_mod_price: f64, hours_to_target: f64) -> Self {
        Self {
            target,
            rate_per_hour: (target - min_mod_price) / hours_to_target,
            min_mod_price,
            max_mod_price,
        }
    }

    /// 经过 `hours` 小时后的乘数
    pub fn drifted(&self, current: f64, hours: f64) -> f64 {
        if !(hours > 0.0) || !(current < self.target) {
            return current;
        }
        (current + hours * self.rate_per_hour)
            .clamp(self.min_mod_price, self.max_mod_price)
            .min(self.target)
    }
}

#[inline]
pub fn elapsed_hours(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

impl PriceEntry {
    pub fn apply_drift(&mut self, params: &DriftParams, now: DateTime<Utc>) -> DriftOutcome {
        let Some(last) = self.last_update else {
            self.last_update = Some(now);
            return DriftOutcome::Stamped;
        };

        let hours = elapsed_hours(last, now);
        if hours <= 0.0 {
            return DriftOutcome::Skipped;
        }

        self.mod_price = params.drifted(self.mod_price, hours);
        self.last_update = Some(now);
        DriftOutcome::Advanced
    }
}

impl StoredEntry {
    /// 存储侧的同一套漂移规则；Unix 纪元时间戳视为"从未结算"
    pub fn apply_drift(&mut self, params: &DriftParams, now: DateTime<Utc>) -> DriftOutcome {
        let last = self.last_update.with_timezone(&Utc);
        if last == DateTime::<Utc>::UNIX_EPOCH {
            self.last_update = now.fixed_offset();
            return DriftOutcome::Stamped;
        }

        let hours = elapsed_hours(last, now);
        if hours <= 0.0 {
            return DriftOutcome::Skipped;
        }

        self.mod_price = params.drifted(self.mod_price, hours);
        self.last_update = now.fixed_offset();
        DriftOutcome::Advanced
    }
}
