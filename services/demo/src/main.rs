//! Demo binary driving the execution engine end to end
//!
//! Wires the order state machine, execution engine, basket coordinator,
//! allocation splitter, and settlement tracker over the mock venue, then
//! walks through a market order, a TWAP schedule, a capped parallel basket,
//! a cancel, and post-trade processing down to a settled allocation.

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use account_registry::{AccountRegistry, AccountWeight, StaticAccountRegistry};
use execution_router::ExecutionEngine;
use execution_router::basket::{
    BasketCaps, BasketConstituent, BasketCoordinator, BasketMode, BasketRequest,
};
use execution_router::config::ExecutionConfig;
use execution_router::mock_venue::{MockVenue, MockVenueConfig};
use execution_router::venue::VenueAdapter;
use execution_router::venue_manager::VenueManager;
use oms::order::{Order, OrderRequest, OrderType, TimeInForce};
use oms::{OmsConfig, OrderManager};
use post_trade::allocation::AllocationManager;
use post_trade::settlement::{SettlementConfig, SettlementDetails, SettlementTracker};
use risk_manager::LimitsRiskService;
use services_common::{OrderSide, PortfolioId, Px, Qty, Strategy, Symbol};

const PORTFOLIO: &str = "GROWTH-01";

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("demo=info,oms=info,execution_router=info,post_trade=info")
        .init();

    info!("starting ArthaQ execution engine demo");

    // Sub-account weights behind the demo portfolio
    let mut registry = StaticAccountRegistry::new();
    registry.register(
        PortfolioId::new(PORTFOLIO),
        vec![
            AccountWeight::new("ACC-ALPHA", 6_000),
            AccountWeight::new("ACC-BETA", 4_000),
        ],
    )?;
    let registry = Arc::new(registry);

    // Trading stack: risk-checked order manager, one mock venue, engine
    let oms = Arc::new(
        OrderManager::new(OmsConfig::default())
            .with_risk_service(Arc::new(LimitsRiskService::new())),
    );
    let venues = Arc::new(VenueManager::new("mock"));
    let mock = Arc::new(MockVenue::new(MockVenueConfig::default()));
    mock.set_price(Symbol::new("AAPL"), Px::from_cents(15_000));
    mock.set_price(Symbol::new("MSFT"), Px::from_cents(20_000));
    venues.register(Arc::clone(&mock) as Arc<dyn VenueAdapter>);
    let engine = Arc::new(ExecutionEngine::new(
        Arc::clone(&oms),
        Arc::clone(&venues),
        ExecutionConfig::default(),
    ));

    let market_order = run_market_order(&engine).await?;
    run_twap_order(&engine).await?;
    run_capped_basket(&engine).await?;
    run_cancel(&engine).await?;
    run_post_trade(&oms, &registry, &market_order).await?;

    info!(metrics = ?oms.metrics(), "order manager totals");
    info!(metrics = ?engine.metrics(), "engine totals");
    if let Some(stats) = venues.stats("mock") {
        info!(?stats, "venue totals");
    }

    info!("demo complete");
    Ok(())
}

/// Market order for 1000 AAPL, filled in one slice
async fn run_market_order(engine: &Arc<ExecutionEngine>) -> Result<Order> {
    info!("--- market order ---");
    let order = engine
        .submit_order(request("DEMO-000001", 1_000, Strategy::Market))
        .await?;
    let done = engine.wait_for_completion(order.id).await?;

    info!(
        order_id = %done.id,
        status = %done.status,
        filled = %done.filled_quantity,
        average_price = %display_price(&done),
        "market order done"
    );
    Ok(done)
}

/// TWAP over three five-minute windows; the window is already elapsed so
/// the demo does not wait on the clock
async fn run_twap_order(engine: &Arc<ExecutionEngine>) -> Result<()> {
    info!("--- TWAP order ---");
    let end = Utc::now() - ChronoDuration::seconds(1);
    let start = end - ChronoDuration::minutes(15);
    let mut twap = request("DEMO-000002", 600, Strategy::Twap {
        start,
        end,
        interval_minutes: 5,
        aggressive_completion: false,
    });
    twap.symbol = Symbol::new("MSFT");

    let order = engine.submit_order(twap).await?;
    let done = engine.wait_for_completion(order.id).await?;

    let slices: Vec<String> = engine
        .oms()
        .executions_for_order(done.id)
        .iter()
        .map(|e| format!("{} @ {}", e.quantity, e.price))
        .collect();
    info!(
        order_id = %done.id,
        status = %done.status,
        slices = ?slices,
        "TWAP order done"
    );
    Ok(())
}

/// Parallel basket under a gross notional cap. The second constituent
/// projects past the cap and is rejected at start, never queued.
async fn run_capped_basket(engine: &Arc<ExecutionEngine>) -> Result<()> {
    info!("--- capped parallel basket ---");
    let coordinator = BasketCoordinator::new(Arc::clone(engine));

    let aapl = limit_request("DEMO-000003", 500, 15_000);
    let mut msft = limit_request("DEMO-000004", 400, 20_000);
    msft.symbol = Symbol::new("MSFT");

    let basket = coordinator
        .submit_basket(BasketRequest {
            label: "demo-rebalance".to_string(),
            portfolio_id: PortfolioId::new(PORTFOLIO),
            mode: BasketMode::Parallel,
            constituents: vec![
                BasketConstituent {
                    request: aapl,
                    benchmark_price: None,
                },
                BasketConstituent {
                    request: msft,
                    benchmark_price: None,
                },
            ],
            // 100,000.0000 of gross notional: room for the first
            // constituent (75,000) but not both (155,000)
            caps: BasketCaps {
                max_gross_notional: Some(1_000_000_000),
                ..BasketCaps::default()
            },
        })
        .await?;

    let status = coordinator.wait_for_basket(basket.id).await?;
    for order_id in &basket.order_ids {
        if let Some(order) = engine.oms().get_order(*order_id) {
            info!(%order_id, status = %order.status, filled = %order.filled_quantity, "constituent");
        }
    }
    info!(basket_id = %basket.id, %status, "basket done");
    Ok(())
}

/// Cancel an order that is still waiting for its first window
async fn run_cancel(engine: &Arc<ExecutionEngine>) -> Result<()> {
    info!("--- cancel before the schedule opens ---");
    let start = Utc::now() + ChronoDuration::minutes(1);
    let order = engine
        .submit_order(request("DEMO-000005", 250, Strategy::Twap {
            start,
            end: start + ChronoDuration::minutes(10),
            interval_minutes: 5,
            aggressive_completion: false,
        }))
        .await?;

    tokio::time::sleep(Duration::from_millis(50)).await;
    engine.cancel_order(order.id).await?;
    let done = engine.wait_for_completion(order.id).await?;

    info!(
        order_id = %done.id,
        status = %done.status,
        filled = %done.filled_quantity,
        "cancel confirmed with zero exposure"
    );
    Ok(())
}

/// Split the market order's execution pro-rata, confirm, and settle:
/// one allocation settles T+2, the other fails once and is retried
async fn run_post_trade(
    oms: &Arc<OrderManager>,
    registry: &Arc<StaticAccountRegistry>,
    order: &Order,
) -> Result<()> {
    info!("--- post-trade ---");
    let allocator = AllocationManager::new(Arc::clone(registry) as Arc<dyn AccountRegistry>);
    let tracker = SettlementTracker::new(SettlementConfig::default());

    let executions = oms.executions_for_order(order.id);
    let execution = executions
        .first()
        .ok_or_else(|| anyhow::anyhow!("market order produced no execution"))?;

    let allocations = allocator.split_pro_rata(execution)?;
    info!(
        execution_id = %execution.id,
        allocations = %serde_json::to_string_pretty(&allocations)?,
        "pro-rata split"
    );

    let first = allocator.confirm(allocations[0].id)?;
    let second = allocator.confirm(allocations[1].id)?;

    let settled = tracker.create(&first)?;
    tracker.mark_settled(
        settled.id,
        SettlementDetails::new("Northern Trust", "NT-2026-104233"),
    )?;

    let failing = tracker.create(&second)?;
    tracker.mark_failed(
        failing.id,
        "SSI mismatch at custodian",
        Some("ops ticket 4711".to_string()),
    )?;
    tracker.retry(failing.id)?;

    info!(
        allocation_id = %second.id,
        attempts = %serde_json::to_string_pretty(&tracker.history(second.id))?,
        "settlement history after one failure"
    );
    Ok(())
}

fn request(client_id: &str, quantity_units: i64, strategy: Strategy) -> OrderRequest {
    OrderRequest {
        client_order_id: Some(client_id.to_string()),
        portfolio_id: PortfolioId::new(PORTFOLIO),
        symbol: Symbol::new("AAPL"),
        side: OrderSide::Buy,
        order_type: OrderType::Market,
        time_in_force: TimeInForce::Day,
        quantity: Qty::from_units(quantity_units),
        price: None,
        stop_price: None,
        strategy,
        venue_hint: None,
    }
}

fn limit_request(client_id: &str, quantity_units: i64, price_cents: i64) -> OrderRequest {
    OrderRequest {
        order_type: OrderType::Limit,
        price: Some(Px::from_cents(price_cents)),
        ..request(client_id, quantity_units, Strategy::Limit)
    }
}

fn display_price(order: &Order) -> String {
    order
        .average_fill_price
        .map_or_else(|| "-".to_string(), |price| price.to_string())
}
