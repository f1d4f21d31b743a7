//! Configuration module for Tradeguard.
//!
//! Every business threshold used by the gates is reachable through an
//! environment variable; unset or unparsable values fall back to the
//! defaults from the component configs.

use crate::application::anti_tilt::AntiTiltConfig;
use crate::application::fragmenter::FragmenterConfig;
use crate::application::governor::GovernorConfig;
use crate::application::nemesis::NemesisConfig;
use crate::application::news_blackout::NewsBlackoutConfig;
use crate::application::risk_gate::RiskGateConfig;
use crate::infrastructure::circuit_breaker::BreakerConfig;
use chrono::Duration as ChronoDuration;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Aggregated governance configuration.
#[derive(Debug, Clone)]
pub struct GovernorEnvConfig {
    pub risk: RiskGateConfig,
    pub anti_tilt: AntiTiltConfig,
    pub news: NewsBlackoutConfig,
    pub nemesis: NemesisConfig,
    pub breaker: BreakerConfig,
    pub fragmenter: FragmenterConfig,
    pub governor: GovernorConfig,
    /// Cadence of the supervised calendar refresh task.
    pub calendar_refresh: Duration,
}

impl GovernorEnvConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        config.risk.max_risk_per_trade =
            env_parse("MAX_RISK_PER_TRADE_PCT", config.risk.max_risk_per_trade);
        config.risk.max_daily_drawdown =
            env_parse("MAX_DAILY_DRAWDOWN_PCT", config.risk.max_daily_drawdown);
        config.risk.max_total_drawdown =
            env_parse("MAX_TOTAL_DRAWDOWN_PCT", config.risk.max_total_drawdown);
        config.risk.max_open_positions =
            env_parse("MAX_OPEN_POSITIONS", config.risk.max_open_positions);
        config.risk.unit_value = env_parse("UNIT_VALUE_PER_LOT", config.risk.unit_value);

        config.anti_tilt.loss_threshold =
            env_parse("ANTI_TILT_LOSSES", config.anti_tilt.loss_threshold);
        config.anti_tilt.lockout = ChronoDuration::hours(env_parse(
            "ANTI_TILT_HOURS",
            config.anti_tilt.lockout.num_hours(),
        ));

        config.news.buffer = ChronoDuration::minutes(env_parse(
            "NEWS_FILTER_MINUTES",
            config.news.buffer.num_minutes(),
        ));

        config.nemesis.trigger_threshold =
            env_parse("NEMESIS_TRIGGER_COUNT", config.nemesis.trigger_threshold);
        config.nemesis.cooldown = ChronoDuration::seconds(env_parse(
            "NEMESIS_COOLDOWN_SECONDS",
            config.nemesis.cooldown.num_seconds(),
        ));
        config.nemesis.ledger_capacity =
            env_parse("NEMESIS_LEDGER_CAPACITY", config.nemesis.ledger_capacity);
        config.nemesis.volatility_threshold = env_parse(
            "NEMESIS_VOLATILITY_THRESHOLD",
            config.nemesis.volatility_threshold,
        );

        config.breaker.failure_threshold =
            env_parse("CB_FAILURE_THRESHOLD", config.breaker.failure_threshold);
        config.breaker.recovery_timeout = Duration::from_secs(env_parse(
            "CB_RECOVERY_TIMEOUT_SECS",
            config.breaker.recovery_timeout.as_secs(),
        ));
        config.breaker.half_open_max_trials = env_parse(
            "CB_HALF_OPEN_MAX_TRIALS",
            config.breaker.half_open_max_trials,
        );

        config.fragmenter.fragmentation_threshold = env_parse(
            "FRAGMENTATION_THRESHOLD",
            config.fragmenter.fragmentation_threshold,
        );
        config.fragmenter.fragment_delay_min_secs = env_parse(
            "FRAGMENT_DELAY_MIN_SECS",
            config.fragmenter.fragment_delay_min_secs,
        );
        config.fragmenter.fragment_delay_max_secs = env_parse(
            "FRAGMENT_DELAY_MAX_SECS",
            config.fragmenter.fragment_delay_max_secs,
        );

        config.governor.max_volume = env_parse("MAX_ORDER_VOLUME", config.governor.max_volume);

        config.calendar_refresh = Duration::from_secs(env_parse(
            "CALENDAR_REFRESH_SECONDS",
            config.calendar_refresh.as_secs(),
        ));

        config
    }
}

impl GovernorEnvConfig {
    fn default_calendar_refresh() -> Duration {
        Duration::from_secs(60)
    }
}

impl std::default::Default for GovernorEnvConfig {
    fn default() -> Self {
        Self {
            risk: RiskGateConfig::default(),
            anti_tilt: AntiTiltConfig::default(),
            news: NewsBlackoutConfig::default(),
            nemesis: NemesisConfig::default(),
            breaker: BreakerConfig::default(),
            fragmenter: FragmenterConfig::default(),
            governor: GovernorConfig::default(),
            calendar_refresh: Self::default_calendar_refresh(),
        }
    }
}

fn env_parse<T: FromStr + std::fmt::Display>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(raw) => match raw.parse() {
            Ok(value) => value,
            Err(_) => {
                warn!("Config: invalid {key}='{raw}', using default {default}");
                default
            }
        },
        Err(_) => default,
    }
}
