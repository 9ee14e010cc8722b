use std::{env, fs, io, path::Path, time::Duration};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::{Validate, ValidationError};

use crate::error::ConfigError;
use crate::logic::pricing::constants;
use crate::logic::{DriftParams, PricingParams};
use crate::models::NEUTRAL_MOD_PRICE;

pub const CONFIG_ENV: &str = "MARKET_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "market.json";

/// 服务配置；所有字段均有默认值，配置文件只需覆盖需要改动的部分
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase", default)]
#[validate(schema(function = "validate_bounds"))]
pub struct MarketConfig {
    #[validate(range(exclusive_min = 0.0))]
    pub sale_delta_per_unit: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub purchase_delta_per_unit: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub min_mod_price: f64,
    pub max_mod_price: f64,
    pub drift_target: f64,
    #[validate(range(exclusive_min = 0.0))]
    pub drift_hours_to_target: f64,
    /// 周期清扫间隔 (秒)，上限 30 天
    #[validate(range(min = 1, max = 2_592_000))]
    pub drift_persist_interval_secs: u64,
    #[validate(range(min = 1))]
    pub sweep_poll_millis: u64,
    #[validate(range(min = 1))]
    pub persist_batch_rows: usize,
    #[validate(range(min = 1))]
    pub persist_flush_millis: u64,
    #[validate(range(min = 1))]
    pub channel_capacity: usize,
    pub port: u16,
    #[validate(length(min = 1))]
    pub store_path: String,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            sale_delta_per_unit: constants::SALE_DELTA_PER_UNIT,
            purchase_delta_per_unit: constants::PURCHASE_DELTA_PER_UNIT,
            min_mod_price: constants::MIN_MOD_PRICE,
            max_mod_price: constants::MAX_MOD_PRICE,
            drift_target: constants::DRIFT_TARGET,
            drift_hours_to_target: constants::DRIFT_HOURS_TO_TARGET,
            drift_persist_interval_secs: 600,
            sweep_poll_millis: 1_000,
            persist_batch_rows: 256,
            persist_flush_millis: 500,
            channel_capacity: 2_000,
            port: 9981,
            store_path: "market.bin".into(),
        }
    }
}

fn validate_bounds(cfg: &MarketConfig) -> Result<(), ValidationError> {
    if !(cfg.min_mod_price < cfg.max_mod_price) {
        return Err(ValidationError::new("mod_price_bounds"));
    }
    if !(cfg.min_mod_price <= NEUTRAL_MOD_PRICE && NEUTRAL_MOD_PRICE <= cfg.max_mod_price) {
        return Err(ValidationError::new("neutral_out_of_bounds"));
    }
    if !(cfg.min_mod_price <= cfg.drift_target && cfg.drift_target <= cfg.max_mod_price) {
        return Err(ValidationError::new("drift_target_out_of_bounds"));
    }
    Ok(())
}

impl MarketConfig {
    /// 读取 JSON 配置；文件不存在时使用默认值
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let config = match fs::read_to_string(path) {
            Ok(raw) => serde_json::from_str::<MarketConfig>(&raw)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("📄 未找到配置文件 {}，使用默认配置", path.display());
                MarketConfig::default()
            }
            Err(e) => return Err(e.into()),
        };
        config.validate()?;
        Ok(config)
    }

    /// 路径取自 `MARKET_CONFIG`，缺省为 `market.json`
    pub fn from_env() -> Result<Self, ConfigError> {
        let path = env::var(CONFIG_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load(path)
    }

    pub fn pricing_params(&self) -> PricingParams {
        PricingParams {
            sale_delta_per_unit: self.sale_delta_per_unit,
            purchase_delta_per_unit: self.purchase_delta_per_unit,
            min_mod_price: self.min_mod_price,
            max_mod_price: self.max_mod_price,
            drift: DriftParams::from_horizon(
                self.drift_target,
                self.min_mod_price,
                self.max_mod_price,
                self.drift_hours_to_target,
            ),
        }
    }

    pub fn drift_persist_interval(&self) -> TimeDelta {
        TimeDelta::seconds(self.drift_persist_interval_secs as i64)
    }

    pub fn sweep_poll(&self) -> Duration {
        Duration::from_millis(self.sweep_poll_millis)
    }

    pub fn persist_flush(&self) -> Duration {
        Duration::from_millis(self.persist_flush_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_constants() {
        let cfg = MarketConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.pricing_params(), PricingParams::default());
        assert_eq!(cfg.drift_persist_interval(), TimeDelta::minutes(10));
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = MarketConfig::load(dir.path().join("absent.json")).unwrap();
        assert_eq!(cfg, MarketConfig::default());
    }

    #[test]
    fn partial_file_overrides_only_given_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"port": 7000, "driftPersistIntervalSecs": 60}}"#).unwrap();

        let cfg = MarketConfig::load(file.path()).unwrap();
        assert_eq!(cfg.port, 7000);
        assert_eq!(cfg.drift_persist_interval_secs, 60);
        assert_eq!(cfg.sale_delta_per_unit, 0.0040);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(MarketConfig::load(file.path()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn inverted_bounds_are_rejected() {
        let cfg = MarketConfig { min_mod_price: 2.0, max_mod_price: 1.0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn target_outside_bounds_is_rejected() {
        let cfg = MarketConfig { drift_target: 2.5, ..Default::default() };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn bounds_excluding_neutral_are_rejected() {
        let cfg = MarketConfig {
            min_mod_price: 1.2,
            max_mod_price: 1.9,
            drift_target: 1.9,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());

        let widened = MarketConfig { min_mod_price: 0.5, ..cfg };
        assert!(widened.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected() {
        let cfg = MarketConfig { drift_persist_interval_secs: 0, ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
