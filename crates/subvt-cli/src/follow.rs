//! Drive one engine until shutdown, resubscribing after faults.

use crate::retry::Backoff;
use std::future::Future;
use subvt_client::{BlockMarkers, Connector, Endpoint, Feed, Status, SubscriptionEngine};
use tracing::{debug, info, warn};

/// Subscribe and hand every new snapshot to `render` until `shutdown` resolves,
/// then unsubscribe.
///
/// Fails once `backoff` runs out of retries.
pub async fn follow<F, C, R>(
    engine: &SubscriptionEngine<F, C>,
    endpoint: &Endpoint,
    parameters: Vec<String>,
    mut backoff: Backoff,
    shutdown: impl Future<Output = ()>,
    mut render: R,
) -> anyhow::Result<()>
where
    F: Feed,
    C: Connector,
    R: FnMut(&F::Snapshot, &BlockMarkers),
{
    let topic = engine.feed().topic();
    let mut status = engine.watch_status();
    let mut snapshots = engine.watch_snapshot();
    tokio::pin!(shutdown);

    info!(topic, %endpoint, ?parameters, "subscribing");
    engine.subscribe(endpoint, parameters.clone()).await;

    loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!(topic, "shutting down");
                engine.unsubscribe().await;
                return Ok(());
            }
            Some(snapshot) = snapshots.changed() => {
                if let Some(snapshot) = snapshot {
                    render(&snapshot, &engine.markers());
                }
            }
            Some(current) = status.changed() => match current {
                Status::Subscribed(id) => {
                    info!(topic, subscription_id = %id, "subscribed");
                    backoff.reset();
                }
                Status::Error(fault) => {
                    warn!(topic, %fault, "subscription failed");
                    let Some(delay) = backoff.next_delay() else {
                        anyhow::bail!(
                            "{topic}: giving up after {} retries: {fault}",
                            backoff.attempts()
                        );
                    };
                    info!(topic, delay_ms = delay.as_millis() as u64, "resubscribing");
                    tokio::select! {
                        _ = &mut shutdown => return Ok(()),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    engine.subscribe(endpoint, parameters.clone()).await;
                }
                other => debug!(topic, status = %other, "status"),
            },
            else => anyhow::bail!("{topic}: engine stopped"),
        }
    }
}
