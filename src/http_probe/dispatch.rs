use std::collections::HashMap;
use std::sync::Arc;

use tokio::task::JoinSet;

use super::prelude::*;
use super::probe::{ProbeContext, probe_target};
use crate::config::probe_config::ProbeTarget;

/// Run one probe per target, all at once, and hand every outcome to
/// `on_outcome` as soon as it completes. Returns the number of outcomes
/// delivered, which always equals the number of targets.
pub async fn dispatch_with<F>(ctx: Arc<ProbeContext>, targets: Vec<ProbeTarget>, mut on_outcome: F) -> usize
where
    F: FnMut(ProbeOutcome),
{
    let mut probes = JoinSet::new();
    let mut pending = HashMap::with_capacity(targets.len());

    for target in targets {
        let ctx = Arc::clone(&ctx);
        let probed = target.clone();
        let handle = probes.spawn(async move { probe_target(&ctx, &probed).await });
        pending.insert(handle.id(), target);
    }
    log::debug!("Dispatched {} probe(s)", pending.len());

    let mut delivered = 0;
    while let Some(joined) = probes.join_next_with_id().await {
        let outcome = match joined {
            Ok((id, outcome)) => {
                pending.remove(&id);
                outcome
            }
            Err(err) => {
                let target = pending.remove(&err.id()).unwrap_or_default();
                log::error!("Probe for {:?} did not complete: {err}", target.ip);
                ProbeOutcome::new(&target, "", Err(ProbeFailure::Aborted(err.to_string())))
            }
        };
        delivered += 1;
        on_outcome(outcome);
    }

    delivered
}

/// Like [`dispatch_with`], collecting outcomes in arrival order.
pub async fn dispatch(ctx: Arc<ProbeContext>, targets: Vec<ProbeTarget>) -> Vec<ProbeOutcome> {
    let mut outcomes = Vec::with_capacity(targets.len());
    dispatch_with(ctx, targets, |outcome| outcomes.push(outcome)).await;
    outcomes
}
