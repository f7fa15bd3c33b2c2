//! Per-order execution worker
//!
//! One tokio task per order drives its strategy end to end: builds the
//! slice plan, submits child slices with bounded retry and venue
//! failover, applies venue fills to the order state machine, and runs
//! the cancel quiesce protocol before confirming a cancel.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use chrono::{DateTime, Utc};
use oms::OrderManager;
use oms::error::OmsError;
use oms::execution::FillReport;
use oms::order::{Order, OrderStatus};
use services_common::{OrderId, Qty, SliceId};
use tokio::sync::{broadcast, mpsc};
use tokio::time::{Instant, sleep, sleep_until};
use tracing::{debug, info, warn};

use crate::EngineMetrics;
use crate::config::ExecutionConfig;
use crate::schedule::SlicePlan;
use crate::venue::{Slice, VenueAdapter, VenueEvent};
use crate::venue_manager::VenueManager;
use crate::volume::VolumeCurve;

/// Commands the engine can send a running worker
#[derive(Debug)]
pub(crate) enum WorkerCommand {
    /// Quiesce venue exposure, then confirm the pending cancel
    Cancel,
}

/// Shared handles a worker needs
pub(crate) struct WorkerContext {
    pub oms: Arc<OrderManager>,
    pub venues: Arc<VenueManager>,
    pub config: Arc<ExecutionConfig>,
    pub curve: Arc<dyn VolumeCurve>,
    pub metrics: Arc<EngineMetrics>,
}

/// Flow control at the worker level
enum Flow {
    /// Schedule ran to its natural end
    Finished,
    /// A cancel was quiesced and confirmed
    Canceled,
}

/// Result of working one slice to completion
enum SliceOutcome {
    /// Slice completed; `filled` is the venue-reported traded quantity
    Worked { filled: i64 },
    /// Venue rejected the slice after acknowledging it
    Rejected,
    /// Submission never got accepted despite retries
    Failed,
    /// A cancel command arrived mid-slice
    Canceled,
}

enum Submit {
    Accepted,
    Canceled,
    Failed,
}

enum Await {
    Done { filled: Qty },
    Rejected,
    TimedOut,
    Canceled,
}

/// Mutable per-order drive state: the venue currently holding exposure
/// plus its event stream, and slice counters for the final verdict
struct DriveState {
    venue: Option<Arc<dyn VenueAdapter>>,
    events: Option<broadcast::Receiver<VenueEvent>>,
    attempted: u64,
    failed: u64,
}

/// Drive one order until terminal, abandoned, or canceled
pub(crate) async fn run_order(
    ctx: WorkerContext,
    order: Order,
    mut commands: mpsc::Receiver<WorkerCommand>,
) {
    let order_id = order.id;
    if let Err(error) = ctx.oms.mark_open(order_id) {
        debug!(%order_id, %error, "order not startable");
        return;
    }

    let mut state = DriveState {
        venue: None,
        events: None,
        attempted: 0,
        failed: 0,
    };
    let flow = if order.strategy.is_scheduled() {
        run_scheduled(&ctx, &order, &mut commands, &mut state).await
    } else {
        run_resting(&ctx, &order, &mut commands, &mut state).await
    };
    finalize(&ctx, order_id, &state, &flow);
}

/// Market and limit orders: submit the full remainder, resubmitting a
/// replacement slice after each partial fill
async fn run_resting(
    ctx: &WorkerContext,
    order: &Order,
    commands: &mut mpsc::Receiver<WorkerCommand>,
    state: &mut DriveState,
) -> Flow {
    let mut zero_fill_streak = 0u32;
    loop {
        let Some(snapshot) = ctx.oms.get_order(order.id) else {
            return Flow::Finished;
        };
        if snapshot.is_terminal() || snapshot.remaining_quantity.is_zero() {
            return Flow::Finished;
        }

        let quantity = snapshot.remaining_quantity;
        match execute_slice(ctx, &snapshot, quantity, snapshot.price, commands, state).await {
            SliceOutcome::Worked { filled } => {
                if filled == 0 {
                    zero_fill_streak += 1;
                    if zero_fill_streak >= ctx.config.max_zero_fill_slices {
                        warn!(
                            order_id = %order.id,
                            streak = zero_fill_streak,
                            "stopping after repeated zero-fill slices"
                        );
                        return Flow::Finished;
                    }
                } else {
                    zero_fill_streak = 0;
                }
            }
            SliceOutcome::Rejected | SliceOutcome::Failed => return Flow::Finished,
            SliceOutcome::Canceled => {
                quiesce(ctx, order.id, state).await;
                return Flow::Canceled;
            }
        }
    }
}

/// Scheduled strategies: walk the plan windows, carrying any shortfall
/// forward, then optionally sweep the remainder at market
async fn run_scheduled(
    ctx: &WorkerContext,
    order: &Order,
    commands: &mut mpsc::Receiver<WorkerCommand>,
    state: &mut DriveState,
) -> Flow {
    let plan = match SlicePlan::for_strategy(
        &order.strategy,
        &order.symbol,
        order.quantity,
        ctx.curve.as_ref(),
    ) {
        Ok(plan) => plan,
        Err(error) => {
            // Parameters were validated at submit; only a curve swap can
            // get us here.
            warn!(order_id = %order.id, %error, "schedule no longer buildable");
            return Flow::Finished;
        }
    };
    info!(
        order_id = %order.id,
        windows = plan.windows.len(),
        planned = %plan.total_target(),
        aggressive = plan.aggressive_completion,
        "schedule built"
    );

    let mut carry: i64 = 0;
    for window in &plan.windows {
        if !wait_for_window(window.start, commands).await {
            quiesce(ctx, order.id, state).await;
            return Flow::Canceled;
        }

        let Some(snapshot) = ctx.oms.get_order(order.id) else {
            return Flow::Finished;
        };
        if snapshot.is_terminal() {
            return Flow::Finished;
        }
        let remaining = snapshot.remaining_quantity.as_i64();
        if remaining == 0 {
            break;
        }

        let intended = (window.target.as_i64() + carry).min(remaining);
        if intended <= 0 {
            continue;
        }
        debug!(
            order_id = %order.id,
            window = window.index,
            intended,
            carry,
            "working window"
        );

        match execute_slice(
            ctx,
            &snapshot,
            Qty::from_i64(intended),
            snapshot.price,
            commands,
            state,
        )
        .await
        {
            SliceOutcome::Worked { filled } => carry = (intended - filled).max(0),
            SliceOutcome::Rejected | SliceOutcome::Failed => carry = intended,
            SliceOutcome::Canceled => {
                quiesce(ctx, order.id, state).await;
                return Flow::Canceled;
            }
        }
    }

    if plan.aggressive_completion
        && let Some(snapshot) = ctx.oms.get_order(order.id)
        && !snapshot.is_terminal()
        && !snapshot.remaining_quantity.is_zero()
    {
        info!(
            order_id = %order.id,
            remaining = %snapshot.remaining_quantity,
            "sweeping remainder at market"
        );
        let quantity = snapshot.remaining_quantity;
        match execute_slice(ctx, &snapshot, quantity, None, commands, state).await {
            SliceOutcome::Canceled => {
                quiesce(ctx, order.id, state).await;
                return Flow::Canceled;
            }
            SliceOutcome::Worked { .. } | SliceOutcome::Rejected | SliceOutcome::Failed => {}
        }
    }

    Flow::Finished
}

/// Submit one slice and wait for its completion report
async fn execute_slice(
    ctx: &WorkerContext,
    snapshot: &Order,
    quantity: Qty,
    limit_price: Option<services_common::Px>,
    commands: &mut mpsc::Receiver<WorkerCommand>,
    state: &mut DriveState,
) -> SliceOutcome {
    let before_filled = snapshot.filled_quantity.as_i64();
    let slice = Slice {
        id: SliceId::new(),
        order_id: snapshot.id,
        symbol: snapshot.symbol.clone(),
        side: snapshot.side,
        quantity,
        limit_price,
    };
    let slice_id = slice.id;

    match submit_with_retry(ctx, snapshot, slice, commands, state).await {
        Submit::Canceled => SliceOutcome::Canceled,
        Submit::Failed => SliceOutcome::Failed,
        Submit::Accepted => {
            match await_slice(ctx, snapshot.id, slice_id, commands, state).await {
                Await::Done { filled } => SliceOutcome::Worked {
                    filled: filled.as_i64(),
                },
                Await::Rejected => {
                    state.failed += 1;
                    ctx.metrics.slices_failed.fetch_add(1, Ordering::Relaxed);
                    SliceOutcome::Rejected
                }
                Await::TimedOut => {
                    // Fall back to the state machine's view of what traded.
                    let after = ctx
                        .oms
                        .get_order(snapshot.id)
                        .map_or(before_filled, |o| o.filled_quantity.as_i64());
                    SliceOutcome::Worked {
                        filled: after - before_filled,
                    }
                }
                Await::Canceled => SliceOutcome::Canceled,
            }
        }
    }
}

/// Submit with bounded exponential backoff, re-selecting the venue on
/// every attempt so a failed venue can be routed around
async fn submit_with_retry(
    ctx: &WorkerContext,
    order: &Order,
    slice: Slice,
    commands: &mut mpsc::Receiver<WorkerCommand>,
    state: &mut DriveState,
) -> Submit {
    state.attempted += 1;
    let retry = &ctx.config.retry;

    for attempt in 0..retry.max_attempts {
        if attempt > 0 {
            ctx.metrics.submit_retries.fetch_add(1, Ordering::Relaxed);
            tokio::select! {
                () = sleep(retry.delay_for(attempt - 1)) => {}
                Some(WorkerCommand::Cancel) = commands.recv() => return Submit::Canceled,
            }
        }

        let venue = match ctx.venues.select(order.venue_hint.as_deref()).await {
            Ok(venue) => venue,
            Err(error) => {
                debug!(order_id = %order.id, attempt, %error, "no venue available");
                continue;
            }
        };

        // Subscribe before submitting so no event can be missed.
        let events = venue.subscribe();
        match venue.submit_slice(slice.clone()).await {
            Ok(ack) => {
                ctx.venues.record_slice_sent(venue.name());
                ctx.metrics.slices_submitted.fetch_add(1, Ordering::Relaxed);
                debug!(
                    order_id = %order.id,
                    slice_id = %ack.slice_id,
                    venue = venue.name(),
                    venue_order_id = %ack.venue_order_id,
                    "slice submitted"
                );
                state.venue = Some(venue);
                state.events = Some(events);
                return Submit::Accepted;
            }
            Err(error) => {
                ctx.venues.record_failure(venue.name(), &error.to_string());
                warn!(
                    order_id = %order.id,
                    venue = venue.name(),
                    attempt,
                    %error,
                    "slice submission failed"
                );
            }
        }
    }

    state.failed += 1;
    ctx.metrics.slices_failed.fetch_add(1, Ordering::Relaxed);
    Submit::Failed
}

/// Consume venue events until the slice completes, applying fills as
/// they arrive
async fn await_slice(
    ctx: &WorkerContext,
    order_id: OrderId,
    slice_id: SliceId,
    commands: &mut mpsc::Receiver<WorkerCommand>,
    state: &mut DriveState,
) -> Await {
    let Some(events) = state.events.as_mut() else {
        return Await::TimedOut;
    };
    let deadline = Instant::now() + ctx.config.slice_timeout();

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(VenueEvent::Fill { order_id: event_order, report }) if event_order == order_id => {
                    apply_fill(&ctx.oms, &ctx.venues, order_id, report);
                }
                Ok(VenueEvent::SliceDone { slice_id: done, filled, .. }) if done == slice_id => {
                    return Await::Done { filled };
                }
                Ok(VenueEvent::SliceRejected { slice_id: rejected, reason, .. }) if rejected == slice_id => {
                    warn!(%order_id, %slice_id, reason, "slice rejected by venue");
                    return Await::Rejected;
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(%order_id, missed, "venue event stream lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return Await::TimedOut,
            },
            Some(WorkerCommand::Cancel) = commands.recv() => return Await::Canceled,
            () = sleep_until(deadline) => {
                warn!(%order_id, %slice_id, "timed out waiting for slice completion");
                return Await::TimedOut;
            }
        }
    }
}

/// Cancel-aware wait for a window to open; returns false on cancel
async fn wait_for_window(
    start: DateTime<Utc>,
    commands: &mut mpsc::Receiver<WorkerCommand>,
) -> bool {
    // A cancel sent while we were busy must not be outrun by an
    // already-elapsed window.
    if let Ok(WorkerCommand::Cancel) = commands.try_recv() {
        return false;
    }
    let delay = (start - Utc::now()).to_std().unwrap_or(Duration::ZERO);
    if delay.is_zero() {
        return true;
    }
    tokio::select! {
        () = sleep(delay) => true,
        Some(WorkerCommand::Cancel) = commands.recv() => false,
    }
}

/// Pull venue exposure, drain late fills until the venue confirms, then
/// confirm the cancel with the state machine
async fn quiesce(ctx: &WorkerContext, order_id: OrderId, state: &mut DriveState) {
    if let Some(venue) = state.venue.take() {
        if let Err(error) = venue.cancel_slices(order_id).await {
            warn!(%order_id, %error, "venue cancel failed");
        } else if let Some(events) = state.events.as_mut() {
            let deadline = Instant::now() + ctx.config.cancel_timeout();
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Ok(VenueEvent::Fill { order_id: event_order, report }) if event_order == order_id => {
                            // Late fills still count; a completing fill
                            // wins over the cancel.
                            apply_fill(&ctx.oms, &ctx.venues, order_id, report);
                        }
                        Ok(VenueEvent::CancelConfirmed { order_id: confirmed }) if confirmed == order_id => break,
                        Ok(_) => {}
                        Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    () = sleep_until(deadline) => {
                        warn!(%order_id, "timed out waiting for cancel confirmation");
                        break;
                    }
                }
            }
        }
    }

    match ctx.oms.confirm_cancel(order_id) {
        Ok(status) => info!(%order_id, %status, "cancel completed"),
        Err(error) => warn!(%order_id, %error, "cancel confirmation failed"),
    }
}

fn apply_fill(oms: &OrderManager, venues: &VenueManager, order_id: OrderId, report: FillReport) {
    let venue = report.venue.clone();
    match oms.apply_fill(order_id, report) {
        Ok(_) => venues.record_fill(&venue),
        Err(OmsError::DuplicateFill { slice_id, .. }) => {
            debug!(%order_id, %slice_id, "duplicate fill dropped");
        }
        Err(error) => warn!(%order_id, %error, "fill not applied"),
    }
}

fn finalize(ctx: &WorkerContext, order_id: OrderId, state: &DriveState, flow: &Flow) {
    let Some(snapshot) = ctx.oms.get_order(order_id) else {
        return;
    };

    if matches!(flow, Flow::Canceled) {
        info!(
            %order_id,
            status = %snapshot.status,
            filled = %snapshot.filled_quantity,
            "order worker finished after cancel"
        );
        return;
    }

    if snapshot.cancel_pending && !snapshot.is_terminal() {
        // The cancel raced the natural end of the schedule; no venue
        // exposure remains, so it can be confirmed directly.
        match ctx.oms.confirm_cancel(order_id) {
            Ok(status) => info!(%order_id, %status, "trailing cancel confirmed"),
            Err(error) => warn!(%order_id, %error, "trailing cancel confirmation failed"),
        }
        return;
    }

    if snapshot.status == OrderStatus::Open
        && snapshot.fills.is_empty()
        && state.attempted > 0
        && state.failed == state.attempted
    {
        if let Err(error) = ctx.oms.reject_order(order_id, "no venue accepted the order") {
            warn!(%order_id, %error, "reject after venue failure did not apply");
        }
        return;
    }

    info!(
        %order_id,
        status = %snapshot.status,
        filled = %snapshot.filled_quantity,
        slices = state.attempted,
        failed_slices = state.failed,
        "order worker finished"
    );
}
