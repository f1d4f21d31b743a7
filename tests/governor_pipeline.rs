use chrono::{Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tradeguard::application::bootstrap::GovernorRuntime;
use tradeguard::config::GovernorEnvConfig;
use tradeguard::domain::errors::RejectCode;
use tradeguard::domain::types::{
    CalendarEvent, ImpactLevel, LossContext, OrderRequest, OrderSide,
};
use tradeguard::infrastructure::mock::{
    InMemoryStateStore, MockCalendarSource, MockExecutionService, MockNotificationService,
};

fn test_config() -> GovernorEnvConfig {
    let mut config = GovernorEnvConfig::default();
    config.fragmenter.small_delay_min_secs = 0.0;
    config.fragmenter.small_delay_max_secs = 0.001;
    config.fragmenter.fragment_delay_min_secs = 0.0;
    config.fragmenter.fragment_delay_max_secs = 0.001;
    config
}

async fn runtime() -> GovernorRuntime {
    GovernorRuntime::start(
        test_config(),
        Arc::new(MockExecutionService::new()),
        Arc::new(MockCalendarSource::new()),
        Some(Arc::new(MockNotificationService::new())),
        Some(Arc::new(InMemoryStateStore::new())),
    )
    .await
}

fn order(volume: Decimal, stop_loss: Option<Decimal>) -> OrderRequest {
    OrderRequest {
        symbol: "XAUUSD".to_string(),
        side: OrderSide::Buy,
        volume,
        entry_price: None,
        stop_loss,
        take_profit: None,
    }
}

const MARKET: Decimal = dec!(2080);

#[tokio::test]
async fn missing_stop_loss_is_the_only_check_run() {
    let runtime = runtime().await;
    let decision = runtime
        .governor()
        .evaluate(&order(dec!(0.02), None), MARKET, Utc::now());

    assert!(!decision.allowed);
    assert_eq!(decision.reject, Some(RejectCode::MissingStopLoss));
    assert_eq!(decision.checks.len(), 1);
    assert_eq!(decision.checks[0].check, "stop_loss");
}

#[tokio::test]
async fn oversized_risk_is_denied() {
    // equity 100k, SL distance 50, 1 lot, unit value 100 -> 5.0% > 1.0%
    let runtime = runtime().await;
    let decision = runtime
        .governor()
        .evaluate(&order(dec!(1), Some(dec!(2030))), MARKET, Utc::now());

    assert_eq!(decision.reject, Some(RejectCode::RiskPerTradeExceeded));
    assert_eq!(decision.checks.len(), 2);
    assert!(decision.checks[0].passed);
    assert!(decision.rejection_reason().unwrap().contains("5.00%"));
}

#[tokio::test]
async fn clean_order_passes_all_eight_checks() {
    let runtime = runtime().await;
    let decision = runtime
        .governor()
        .evaluate(&order(dec!(0.02), Some(dec!(2030))), MARKET, Utc::now());

    assert!(decision.allowed);
    assert_eq!(decision.reject, None);
    let names: Vec<&str> = decision.checks.iter().map(|c| c.check).collect();
    assert_eq!(
        names,
        vec![
            "stop_loss",
            "risk_per_trade",
            "anti_tilt",
            "news_blackout",
            "nemesis",
            "daily_drawdown",
            "total_drawdown",
            "max_positions",
        ]
    );
}

#[tokio::test]
async fn daily_drawdown_blocks_after_losses() {
    let runtime = runtime().await;
    runtime
        .on_trade_closed("t1", dec!(-4500), None, Utc::now())
        .await;
    // a single loss does not tilt-lock (threshold 2)
    let decision = runtime
        .governor()
        .evaluate(&order(dec!(0.02), Some(dec!(2030))), MARKET, Utc::now());

    assert_eq!(decision.reject, Some(RejectCode::DailyDrawdownLimit));
    assert!(
        decision
            .rejection_reason()
            .unwrap()
            .contains("4.50%")
    );
}

#[tokio::test]
async fn anti_tilt_outranks_drawdown_checks() {
    let runtime = runtime().await;
    let now = Utc::now();
    // Two consecutive losses: enough for both a 4.5%+ daily drawdown and a
    // tilt lockout. The pipeline must stop at anti-tilt.
    runtime.on_trade_closed("t1", dec!(-2250), None, now).await;
    runtime.on_trade_closed("t2", dec!(-2250), None, now).await;

    let decision = runtime
        .governor()
        .evaluate(&order(dec!(0.02), Some(dec!(2030))), MARKET, now);

    assert_eq!(decision.reject, Some(RejectCode::AntiTiltActive));
    assert!(
        !decision
            .checks
            .iter()
            .any(|c| c.check == "daily_drawdown"),
        "drawdown must not be recomputed for a locked-out account"
    );

    // Lockout expires after 24h; the drawdown denial then surfaces.
    let later = now + Duration::hours(24);
    let decision = runtime
        .governor()
        .evaluate(&order(dec!(0.02), Some(dec!(2030))), MARKET, later);
    assert_eq!(decision.reject, Some(RejectCode::DailyDrawdownLimit));
}

#[tokio::test]
async fn news_blackout_denies_inside_window() {
    let runtime = runtime().await;
    let now = Utc::now();
    runtime.news().refresh(vec![CalendarEvent {
        name: "FOMC Rate Decision".to_string(),
        impact: ImpactLevel::High,
        time: now + Duration::minutes(10),
    }]);

    let decision = runtime
        .governor()
        .evaluate(&order(dec!(0.02), Some(dec!(2030))), MARKET, now);
    assert_eq!(decision.reject, Some(RejectCode::NewsBlackoutActive));
    assert!(
        decision
            .rejection_reason()
            .unwrap()
            .contains("FOMC Rate Decision")
    );

    // Outside the 30-minute buffer the order goes through.
    let decision = runtime.governor().evaluate(
        &order(dec!(0.02), Some(dec!(2030))),
        MARKET,
        now + Duration::minutes(41),
    );
    assert!(decision.allowed);
}

#[tokio::test]
async fn nemesis_meditation_denies_admission() {
    let runtime = runtime().await;
    let now = Utc::now();
    let black_swan = LossContext {
        volatility: 0.01,
        news_event: true,
        trend_reversal: false,
    };
    for i in 0..3 {
        runtime
            .nemesis()
            .report_loss(&format!("t{i}"), dec!(120), &black_swan, now)
            .await;
    }

    let decision = runtime
        .governor()
        .evaluate(&order(dec!(0.02), Some(dec!(2030))), MARKET, now);
    assert_eq!(decision.reject, Some(RejectCode::NemesisLockoutActive));

    // Meditation is over after the 1h cooldown.
    let decision = runtime.governor().evaluate(
        &order(dec!(0.02), Some(dec!(2030))),
        MARKET,
        now + Duration::hours(1),
    );
    assert!(decision.allowed);
}

#[tokio::test]
async fn spread_out_defeats_do_not_lock() {
    let runtime = runtime().await;
    let now = Utc::now();
    let contexts = [
        LossContext {
            news_event: true,
            ..LossContext::default()
        },
        LossContext {
            trend_reversal: true,
            ..LossContext::default()
        },
        LossContext {
            volatility: 0.08,
            ..LossContext::default()
        },
    ];
    for (i, context) in contexts.iter().enumerate() {
        runtime
            .nemesis()
            .report_loss(&format!("t{i}"), dec!(50), context, now)
            .await;
    }
    assert!(!runtime.nemesis().is_locked(now));
}

#[tokio::test]
async fn malformed_orders_never_reach_the_gates() {
    let runtime = runtime().await;
    let now = Utc::now();

    for bad in [
        order(dec!(0), Some(dec!(2030))),
        order(dec!(-1), Some(dec!(2030))),
        order(dec!(0.001), Some(dec!(2030))), // finer than lot precision
        order(dec!(500), Some(dec!(2030))),   // above the volume cap
    ] {
        let decision = runtime.governor().evaluate(&bad, MARKET, now);
        assert_eq!(decision.reject, Some(RejectCode::InvalidOrder));
        assert_eq!(decision.checks.len(), 1);
        assert_eq!(decision.checks[0].check, "order");
    }

    let mut no_symbol = order(dec!(0.02), Some(dec!(2030)));
    no_symbol.symbol = "  ".to_string();
    let decision = runtime.governor().evaluate(&no_symbol, MARKET, now);
    assert_eq!(decision.reject, Some(RejectCode::InvalidOrder));
}

#[tokio::test]
async fn max_positions_is_the_last_gate() {
    let runtime = runtime().await;
    runtime.risk().set_open_positions(3);
    let decision = runtime
        .governor()
        .evaluate(&order(dec!(0.02), Some(dec!(2030))), MARKET, Utc::now());
    assert_eq!(decision.reject, Some(RejectCode::MaxPositionsReached));
    assert_eq!(decision.checks.len(), 8);
}

#[tokio::test]
async fn evaluation_is_repeatable() {
    // evaluate must not mutate gate state: same inputs, same answer.
    let runtime = runtime().await;
    let now = Utc::now();
    let proposal = order(dec!(0.02), Some(dec!(2030)));
    for _ in 0..5 {
        let decision = runtime.governor().evaluate(&proposal, MARKET, now);
        assert!(decision.allowed);
        assert_eq!(decision.checks.len(), 8);
    }
}
