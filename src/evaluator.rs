use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::Alert;
use crate::prices::PriceSource;
use crate::storage::AlertStore;
use crate::transport::ChatTransport;

/// Periodically evaluate every stored alert and fire the ones whose trigger
/// condition holds. Runs until `cancel` fires; an in-flight pass always
/// completes, and passes never overlap.
pub async fn run(
    store: Arc<dyn AlertStore>,
    prices: Arc<dyn PriceSource>,
    transport: Arc<dyn ChatTransport>,
    tick_interval: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = tick_interval.as_secs(), "evaluation loop started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {}
        }
        run_tick(store.as_ref(), prices.as_ref(), transport.as_ref()).await;
    }

    info!("evaluation loop stopped");
}

/// One full pass over all stored alerts. Failures are isolated per alert and
/// per tick; this function never propagates an error.
pub async fn run_tick(
    store: &dyn AlertStore,
    prices: &dyn PriceSource,
    transport: &dyn ChatTransport,
) {
    let alerts = match store.list_all().await {
        Ok(alerts) => alerts,
        Err(e) => {
            warn!(error = ?e, "failed to list alerts, skipping tick");
            return;
        }
    };

    debug!(alerts = alerts.len(), "evaluation tick");

    for alert in alerts {
        evaluate_alert(&alert, store, prices, transport).await;
    }
}

async fn evaluate_alert(
    alert: &Alert,
    store: &dyn AlertStore,
    prices: &dyn PriceSource,
    transport: &dyn ChatTransport,
) {
    // Unavailable price: re-evaluated on the next tick, no bookkeeping
    let Some(price) = prices.current_price(&alert.coin).await else {
        return;
    };

    if !alert.direction.is_triggered(price, alert.target_price) {
        return;
    }

    // Remove before notifying. A lost row here means another pass already
    // fired this alert; a failed delete means the alert still logically
    // exists, so notifying would break the once-only promise.
    match store.remove_by_id(alert.id).await {
        Ok(true) => {}
        Ok(false) => {
            debug!(alert_id = alert.id, "alert already removed, skipping notification");
            return;
        }
        Err(e) => {
            warn!(error = ?e, alert_id = alert.id, "alert removal failed, notification withheld");
            return;
        }
    }

    let text = format!(
        "Alert triggered for {}!\nCurrent price: ${}\nTarget price: ${}",
        alert.coin, price, alert.target_price
    );

    // At-most-once: the alert is already gone, so a failed send is only logged
    if let Err(e) = transport.send(alert.user_id, &text, None).await {
        warn!(
            error = ?e,
            alert_id = alert.id,
            user_id = alert.user_id,
            "notification send failed after removal, not retried"
        );
    } else {
        info!(
            alert_id = alert.id,
            user_id = alert.user_id,
            coin = %alert.coin,
            price,
            target = alert.target_price,
            "alert triggered"
        );
    }
}
