//! 错误类型：只在存储边界与启动配置处出现，查询/成交接口本身从不失败。
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("io: {0}")] Io(#[from] std::io::Error),
    #[error("encode: {0}")] Encode(#[from] bincode::error::EncodeError),
    #[error("decode: {0}")] Decode(#[from] bincode::error::DecodeError),
    #[error("unsupported snapshot version {0}")] UnsupportedVersion(u32),
    #[error("storage unavailable: {0}")] Unavailable(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("config io: {0}")] Io(#[from] std::io::Error),
    #[error("config parse: {0}")] Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")] Invalid(#[from] validator::ValidationErrors),
}

#[derive(Error, Debug)]
pub enum MarketError {
    #[error(transparent)] Config(#[from] ConfigError),
    #[error("io: {0}")] Io(#[from] std::io::Error),
}
