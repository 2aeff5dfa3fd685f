//! End-to-end lifecycle cycles with fake sources, feeds, executor and pricing

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use safe_sniper::config::{DiscoveryConfig, RiskConfig};
use safe_sniper::discovery::{CandidateToken, DiscoveryFeed, TokenDiscoverer};
use safe_sniper::engine::{LifecycleSettings, PositionLifecycleController};
use safe_sniper::position::{ExitTrigger, Position, PositionLedger, PositionState, PricingSource};
use safe_sniper::risk::{RiskAggregator, SignalResult, SignalSource, SourceId, TokenAddress};
use safe_sniper::trading::{BuyReceipt, SellReceipt, TradeExecutor};
use safe_sniper::{Error, Result};

fn address(i: usize) -> String {
    format!("Tok{:0>41}", i)
}

struct FixedFeed {
    addresses: Vec<String>,
}

#[async_trait]
impl DiscoveryFeed for FixedFeed {
    fn name(&self) -> &'static str {
        "fixed"
    }

    async fn poll(&self) -> Result<Vec<CandidateToken>> {
        Ok(self
            .addresses
            .iter()
            .map(|a| CandidateToken::new(TokenAddress::new(a.clone()).unwrap(), "fixed"))
            .collect())
    }
}

struct FixedSource {
    id: SourceId,
    score: f64,
}

#[async_trait]
impl SignalSource for FixedSource {
    fn id(&self) -> SourceId {
        self.id
    }

    async fn evaluate(&self, _token: &TokenAddress) -> Result<SignalResult> {
        Ok(SignalResult::evaluated(self.id, self.score, self.score >= 0.6, "fixed"))
    }
}

#[derive(Default)]
struct FakeExecutor {
    buys: AtomicUsize,
    sells: AtomicUsize,
    fail_buys: bool,
    fail_sells: bool,
    /// Report sell proceeds the ledger must refuse
    nan_proceeds: bool,
}

#[async_trait]
impl TradeExecutor for FakeExecutor {
    async fn buy(&self, _token: &TokenAddress, _usd: f64, _slippage_bps: u32) -> Result<BuyReceipt> {
        let n = self.buys.fetch_add(1, Ordering::SeqCst);
        if self.fail_buys {
            return Err(Error::buy_failed("insufficient balance"));
        }
        Ok(BuyReceipt {
            tx_ref: format!("buy-{}", n),
            token_amount: 1_000_000,
        })
    }

    async fn sell(&self, _token: &TokenAddress, _amount: u64, _slippage_bps: u32) -> Result<SellReceipt> {
        let n = self.sells.fetch_add(1, Ordering::SeqCst);
        if self.fail_sells {
            return Err(Error::sell_failed("no route"));
        }
        Ok(SellReceipt {
            tx_ref: format!("sell-{}", n),
            usd_received: self.nan_proceeds.then_some(f64::NAN),
        })
    }
}

/// Values every position at a settable price; tokens without a price fail
struct FakePricing {
    values: Mutex<HashMap<String, f64>>,
    default_value: Mutex<Option<f64>>,
}

impl FakePricing {
    fn flat(value: f64) -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            default_value: Mutex::new(Some(value)),
        }
    }

    fn failing() -> Self {
        Self {
            values: Mutex::new(HashMap::new()),
            default_value: Mutex::new(None),
        }
    }

    fn set(&self, token: &str, value: f64) {
        self.values.lock().unwrap().insert(token.to_string(), value);
    }

    /// Drop every price so all quotes fail from now on
    fn break_quotes(&self) {
        self.values.lock().unwrap().clear();
        *self.default_value.lock().unwrap() = None;
    }
}

#[async_trait]
impl PricingSource for FakePricing {
    async fn current_value(&self, position: &Position) -> Result<f64> {
        let values = self.values.lock().unwrap();
        values
            .get(position.token.as_str())
            .copied()
            .or(*self.default_value.lock().unwrap())
            .ok_or_else(|| Error::unavailable("fake", "no price"))
    }
}

fn settings() -> LifecycleSettings {
    settings_with_backoff(Duration::from_secs(3600))
}

fn settings_with_backoff(error_backoff: Duration) -> LifecycleSettings {
    LifecycleSettings {
        trade_amount_usd: 35.0,
        target_price_ratio: 1.025,
        stop_loss_ratio: Some(0.85),
        slippage_bps: 50,
        poll_interval: Duration::from_secs(3600),
        error_backoff,
    }
}

fn aggregator(score: f64) -> RiskAggregator {
    let mut aggregator = RiskAggregator::new(&RiskConfig::default());
    for id in SourceId::ALL {
        aggregator.register_source(Arc::new(FixedSource { id, score }));
    }
    aggregator
}

fn controller(
    tokens: usize,
    score: f64,
    executor: Arc<FakeExecutor>,
    pricing: Arc<FakePricing>,
) -> PositionLifecycleController {
    controller_with_settings(tokens, score, executor, pricing, settings())
}

fn controller_with_settings(
    tokens: usize,
    score: f64,
    executor: Arc<FakeExecutor>,
    pricing: Arc<FakePricing>,
    settings: LifecycleSettings,
) -> PositionLifecycleController {
    let mut discoverer = TokenDiscoverer::new(&DiscoveryConfig::default(), Duration::from_secs(1));
    discoverer.register_feed(Arc::new(FixedFeed {
        addresses: (0..tokens).map(address).collect(),
    }));

    PositionLifecycleController::new(
        discoverer,
        aggregator(score),
        PositionLedger::new(4, 140.0, 5),
        executor,
        pricing,
        settings,
    )
}

#[tokio::test]
async fn test_fifth_safe_candidate_skipped_and_not_retried() {
    let executor = Arc::new(FakeExecutor::default());
    let mut ctl = controller(5, 0.9, executor.clone(), Arc::new(FakePricing::flat(35.0)));

    let report = ctl.run_cycle().await.unwrap();
    assert_eq!(report.discovered, 5);
    assert_eq!(report.safe, 5);
    assert_eq!(report.opened, 4);
    assert_eq!(report.skipped_capacity, 1);
    assert_eq!(ctl.ledger().live_count(), 4);
    assert!(ctl.ledger().committed_capital() <= 140.0);

    let second = ctl.run_cycle().await.unwrap();
    assert_eq!(second.discovered, 0);
    assert_eq!(second.opened, 0);
    assert_eq!(second.skipped_capacity, 0);
    assert_eq!(executor.buys.load(Ordering::SeqCst), 4);

    let skipped = TokenAddress::new(address(4)).unwrap();
    assert!(!ctl.ledger().is_tracked(&skipped));
}

#[tokio::test]
async fn test_unsafe_candidates_never_bought() {
    let executor = Arc::new(FakeExecutor::default());
    let mut ctl = controller(3, 0.2, executor.clone(), Arc::new(FakePricing::flat(35.0)));

    let report = ctl.run_cycle().await.unwrap();
    assert_eq!(report.assessed, 3);
    assert_eq!(report.safe, 0);
    assert_eq!(executor.buys.load(Ordering::SeqCst), 0);
    assert_eq!(ctl.ledger().live_count(), 0);
}

#[tokio::test]
async fn test_take_profit_closes_with_realized_profit() {
    let executor = Arc::new(FakeExecutor::default());
    let pricing = Arc::new(FakePricing::flat(35.0));
    let mut ctl = controller(1, 0.9, executor.clone(), pricing.clone());
    let token = TokenAddress::new(address(0)).unwrap();

    let report = ctl.run_cycle().await.unwrap();
    assert_eq!(report.opened, 1);
    assert_eq!(report.exits_triggered, 0);
    assert_eq!(ctl.ledger().get(&token).unwrap().state, PositionState::Open);

    pricing.set(token.as_str(), 36.0);
    let report = ctl.run_cycle().await.unwrap();
    assert_eq!(report.exits_triggered, 1);
    assert_eq!(report.closed, 1);

    let position = ctl.ledger().get(&token).unwrap();
    assert_eq!(position.state, PositionState::Closed);
    assert_eq!(position.exit_trigger, Some(ExitTrigger::TakeProfit));
    assert!((position.realized_profit_usd.unwrap() - 1.0).abs() < 1e-9);
    assert_eq!(position.sell_tx_ref.as_deref(), Some("sell-0"));
    assert_eq!(ctl.ledger().committed_capital(), 0.0);
    assert_eq!(ctl.ledger().stats().winners, 1);
}

#[tokio::test]
async fn test_stop_loss_closes_at_a_loss() {
    let executor = Arc::new(FakeExecutor::default());
    let pricing = Arc::new(FakePricing::flat(35.0));
    let mut ctl = controller(1, 0.9, executor, pricing.clone());
    let token = TokenAddress::new(address(0)).unwrap();

    ctl.run_cycle().await.unwrap();
    pricing.set(token.as_str(), 28.0);
    ctl.run_cycle().await.unwrap();

    let position = ctl.ledger().get(&token).unwrap();
    assert_eq!(position.state, PositionState::Closed);
    assert_eq!(position.exit_trigger, Some(ExitTrigger::StopLoss));
    assert!((position.realized_profit_usd.unwrap() + 7.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_repeated_sell_failure_marks_failed() {
    let executor = Arc::new(FakeExecutor {
        fail_sells: true,
        ..Default::default()
    });
    let pricing = Arc::new(FakePricing::flat(40.0));
    let mut ctl = controller(1, 0.9, executor.clone(), pricing);
    let token = TokenAddress::new(address(0)).unwrap();

    // Cycle 1 opens; monitoring in the same cycle already triggers the exit
    let first = ctl.run_cycle().await.unwrap();
    assert_eq!(first.opened, 1);
    assert_eq!(first.exits_triggered, 1);
    assert_eq!(first.sell_failures, 1);
    assert_eq!(ctl.ledger().get(&token).unwrap().state, PositionState::Closing);

    for _ in 0..3 {
        let report = ctl.run_cycle().await.unwrap();
        assert_eq!(report.sell_failures, 1);
        assert_eq!(report.failed, 0);
    }

    let last = ctl.run_cycle().await.unwrap();
    assert_eq!(last.failed, 1);

    let position = ctl.ledger().get(&token).unwrap();
    assert_eq!(position.state, PositionState::Failed);
    assert_eq!(position.sell_attempts, 5);
    assert_eq!(position.last_sell_error.as_deref(), Some("sell execution failed: no route"));
    assert_eq!(executor.sells.load(Ordering::SeqCst), 5);

    // Failed positions are not retried
    let after = ctl.run_cycle().await.unwrap();
    assert_eq!(after.sell_failures, 0);
    assert_eq!(executor.sells.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn test_closing_position_retries_sell_while_pricing_fails() {
    let executor = Arc::new(FakeExecutor {
        fail_sells: true,
        ..Default::default()
    });
    let pricing = Arc::new(FakePricing::flat(40.0));
    let mut ctl = controller(1, 0.9, executor.clone(), pricing.clone());
    let token = TokenAddress::new(address(0)).unwrap();

    ctl.run_cycle().await.unwrap();
    let position = ctl.ledger().get(&token).unwrap();
    assert_eq!(position.state, PositionState::Closing);
    assert_eq!(position.sell_attempts, 1);

    // No route left to quote: the sell is still retried every cycle
    pricing.break_quotes();
    for _ in 0..4 {
        let report = ctl.run_cycle().await.unwrap();
        assert_eq!(report.pricing_failures, 1);
        assert_eq!(report.sell_failures, 1);
    }

    let position = ctl.ledger().get(&token).unwrap();
    assert_eq!(position.state, PositionState::Failed);
    assert_eq!(position.sell_attempts, 5);
    assert_eq!(executor.sells.load(Ordering::SeqCst), 5);
    assert_eq!(ctl.ledger().live_count(), 0);
}

#[tokio::test]
async fn test_closing_position_sold_at_last_known_value_when_pricing_fails() {
    let token = TokenAddress::new(address(0)).unwrap();
    let mut ledger = PositionLedger::new(4, 140.0, 5);
    ledger
        .open(token.clone(), 35.0, 1_000_000, 1.025, "buy-0".into())
        .unwrap();
    ledger.record_value(&token, 40.0).unwrap();
    ledger.begin_close(&token, ExitTrigger::TakeProfit).unwrap();

    let mut discoverer = TokenDiscoverer::new(&DiscoveryConfig::default(), Duration::from_secs(1));
    discoverer.register_feed(Arc::new(FixedFeed { addresses: vec![] }));
    let executor = Arc::new(FakeExecutor::default());
    let mut ctl = PositionLifecycleController::new(
        discoverer,
        aggregator(0.9),
        ledger,
        executor.clone(),
        Arc::new(FakePricing::failing()),
        settings(),
    );

    let report = ctl.run_cycle().await.unwrap();
    assert_eq!(report.pricing_failures, 1);
    assert_eq!(report.closed, 1);

    let position = ctl.ledger().get(&token).unwrap();
    assert_eq!(position.state, PositionState::Closed);
    assert!((position.realized_profit_usd.unwrap() - 5.0).abs() < 1e-9);
    assert_eq!(executor.sells.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_buy_records_nothing() {
    let executor = Arc::new(FakeExecutor {
        fail_buys: true,
        ..Default::default()
    });
    let mut ctl = controller(1, 0.9, executor.clone(), Arc::new(FakePricing::flat(35.0)));

    let report = ctl.run_cycle().await.unwrap();
    assert_eq!(report.safe, 1);
    assert_eq!(report.buy_failures, 1);
    assert_eq!(report.opened, 0);
    assert_eq!(executor.buys.load(Ordering::SeqCst), 1);
    assert_eq!(ctl.ledger().live_count(), 0);
    assert_eq!(ctl.ledger().committed_capital(), 0.0);
    assert!(!ctl.ledger().is_tracked(&TokenAddress::new(address(0)).unwrap()));
}

#[tokio::test]
async fn test_ledger_refusal_faults_the_cycle() {
    let executor = Arc::new(FakeExecutor {
        nan_proceeds: true,
        ..Default::default()
    });
    let mut ctl = controller(1, 0.9, executor.clone(), Arc::new(FakePricing::flat(40.0)));
    let token = TokenAddress::new(address(0)).unwrap();

    let err = ctl.run_cycle().await.unwrap_err();
    assert!(matches!(err, Error::LoopFault(_)), "{:?}", err);

    // The refused close leaves the position closing with its capital still committed
    let position = ctl.ledger().get(&token).unwrap();
    assert_eq!(position.state, PositionState::Closing);
    assert_eq!(ctl.ledger().committed_capital(), 35.0);
}

#[tokio::test]
async fn test_run_backs_off_and_continues_after_fault() {
    let executor = Arc::new(FakeExecutor {
        nan_proceeds: true,
        ..Default::default()
    });
    let mut ctl = controller_with_settings(
        1,
        0.9,
        executor.clone(),
        Arc::new(FakePricing::flat(40.0)),
        settings_with_backoff(Duration::from_millis(10)),
    );

    let shutdown = CancellationToken::new();
    let stopper = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        stopper.cancel();
    });

    tokio::time::timeout(Duration::from_secs(5), ctl.run(shutdown))
        .await
        .expect("run should return once cancelled");

    // Every cycle faults on the close; the loop keeps retrying on the short backoff
    assert!(executor.sells.load(Ordering::SeqCst) >= 2);
    assert_eq!(executor.buys.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_pricing_failure_skips_position() {
    let executor = Arc::new(FakeExecutor::default());
    let mut ctl = controller(2, 0.9, executor.clone(), Arc::new(FakePricing::failing()));

    let report = ctl.run_cycle().await.unwrap();
    assert_eq!(report.opened, 2);
    assert_eq!(report.pricing_failures, 2);
    assert_eq!(report.exits_triggered, 0);
    assert_eq!(executor.sells.load(Ordering::SeqCst), 0);
    assert!(ctl.ledger().live_positions().all(|p| p.state == PositionState::Open));
}

#[tokio::test]
async fn test_run_stops_when_cancelled() {
    let executor = Arc::new(FakeExecutor::default());
    let mut ctl = controller(1, 0.9, executor.clone(), Arc::new(FakePricing::flat(35.0)));

    let shutdown = CancellationToken::new();
    shutdown.cancel();

    tokio::time::timeout(Duration::from_secs(5), ctl.run(shutdown))
        .await
        .expect("run should return once cancelled");

    // The in-flight cycle still completes, the open position is left alone
    assert_eq!(executor.buys.load(Ordering::SeqCst), 1);
    assert_eq!(ctl.ledger().live_count(), 1);
}
