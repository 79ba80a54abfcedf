//! 코어 설정
//!
//! 기본값은 `Default`로 두고, 운영 환경에서는 `.env`/환경 변수로 덮어씁니다.

use std::env;
use std::str::FromStr;

use crate::money::BPS_DENOMINATOR;

/// 설정 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("환경 변수 {key} 값이 올바르지 않음: {value}")]
    InvalidValue { key: &'static str, value: String },
    #[error("설정 검증 실패: {0}")]
    Invalid(String),
}

/// 코어 설정
#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// sqlx 연결 문자열 (예: "sqlite://companion.db", "sqlite::memory:")
    pub database_url: String,
    pub max_connections: u32,
    /// 잠금 대기 시간 (밀리초)
    pub busy_timeout_ms: u64,
    /// 플랫폼 수수료 (basis point, 1000 = 10%)
    pub commission_bps: u32,
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            max_connections: 5,
            busy_timeout_ms: 5_000,
            commission_bps: 1_000,
            default_page_size: 10,
            max_page_size: 100,
        }
    }
}

impl CoreConfig {
    /// 메모리 DB 설정 (테스트/데모용)
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// `.env` 파일과 환경 변수에서 설정 로드
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();

        let defaults = Self::default();
        let config = Self {
            database_url: env::var("COMPANION_DATABASE_URL").unwrap_or(defaults.database_url),
            max_connections: env_or("COMPANION_DB_MAX_CONNECTIONS", defaults.max_connections)?,
            busy_timeout_ms: env_or("COMPANION_DB_BUSY_TIMEOUT_MS", defaults.busy_timeout_ms)?,
            commission_bps: env_or("COMPANION_COMMISSION_BPS", defaults.commission_bps)?,
            default_page_size: env_or("COMPANION_DEFAULT_PAGE_SIZE", defaults.default_page_size)?,
            max_page_size: env_or("COMPANION_MAX_PAGE_SIZE", defaults.max_page_size)?,
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.commission_bps > BPS_DENOMINATOR {
            return Err(ConfigError::Invalid(format!(
                "수수료는 {} bps를 넘을 수 없습니다 (설정값: {})",
                BPS_DENOMINATOR, self.commission_bps
            )));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::Invalid("최대 연결 수는 1 이상이어야 합니다".into()));
        }
        if self.default_page_size == 0 || self.default_page_size > self.max_page_size {
            return Err(ConfigError::Invalid(format!(
                "기본 페이지 크기({})는 1 이상, 최대 페이지 크기({}) 이하여야 합니다",
                self.default_page_size, self.max_page_size
            )));
        }
        Ok(())
    }

    /// 동행인 몫 비율 (bps)
    pub fn companion_share_bps(&self) -> u32 {
        BPS_DENOMINATOR.saturating_sub(self.commission_bps)
    }

    pub fn is_in_memory(&self) -> bool {
        self.database_url.contains(":memory:") || self.database_url.contains("mode=memory")
    }
}

fn env_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue { key, value }),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CoreConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_in_memory());
        assert_eq!(config.companion_share_bps(), 9_000);
    }

    #[test]
    fn test_rejects_commission_over_100_percent() {
        let config = CoreConfig {
            commission_bps: 10_001,
            ..CoreConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_rejects_default_page_over_max() {
        let config = CoreConfig {
            default_page_size: 50,
            max_page_size: 20,
            ..CoreConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
