use crate::controllers::token::TokenController;
use crate::store::Store;
use crate::types::token::Reconciliation;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tokio_util::sync::CancellationToken;

/// Spawn the reconciliation loop. Cancelling the returned token stops it
/// after any pass already in flight.
pub(crate) fn spawn<S: Store>(
    controller: TokenController<S>,
    period: Duration,
) -> (CancellationToken, JoinHandle<()>) {
    let cancel = CancellationToken::new();

    let handle = tokio::spawn(reconcile_loop(controller, period, cancel.clone()));

    (cancel, handle)
}

pub(crate) async fn reconcile_loop<S: Store>(
    controller: TokenController<S>,
    period: Duration,
    cancel: CancellationToken,
) {
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    tracing::info!(
        interval_secs = period.as_secs(),
        "reconciliation worker started"
    );

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("reconciliation worker stopping");
                break;
            }
            _ = ticker.tick() => {
                let reconciliation = controller.reconcile().await;
                report(&reconciliation);
            }
        }
    }
}

fn report(reconciliation: &Reconciliation) {
    if !reconciliation.is_clean() {
        for (sweep, e) in &reconciliation.errors {
            tracing::error!(%sweep, "error reconciling tokens: {}", e);
        }
    }

    if reconciliation.released > 0 || reconciliation.deleted > 0 {
        tracing::info!(
            released = reconciliation.released,
            deleted = reconciliation.deleted,
            "token reconciliation completed"
        );
    } else {
        tracing::debug!("token reconciliation found nothing to do");
    }
}
