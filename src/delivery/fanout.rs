use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::delivery::adapter::Deliverer;
use crate::delivery::types::*;

/// Deliver `data` to every destination, returning one result per destination
/// in input order.
///
/// Each delivery runs in its own task so a panic in one destination is
/// recorded as a failure instead of aborting the batch. With `concurrent`
/// set, all tasks are started before any is awaited.
pub async fn deliver_all(
    deliverer: &Arc<Deliverer>,
    destinations: &[Destination],
    data: &StructuredRecord,
    context: &DeliveryContext,
    concurrent: bool,
) -> Vec<DeliveryResult> {
    let mut results = Vec::with_capacity(destinations.len());

    if concurrent {
        let handles: Vec<_> = destinations
            .iter()
            .map(|destination| spawn_delivery(deliverer, destination, data, context))
            .collect();

        for (destination, handle) in destinations.iter().zip(handles) {
            results.push(settle(destination, handle).await);
        }
    } else {
        for destination in destinations {
            let handle = spawn_delivery(deliverer, destination, data, context);
            results.push(settle(destination, handle).await);
        }
    }

    let failed = results.iter().filter(|r| r.is_failed()).count();
    tracing::info!(
        destinations = destinations.len(),
        failed,
        "Delivery fan-out finished"
    );

    results
}

fn spawn_delivery(
    deliverer: &Arc<Deliverer>,
    destination: &Destination,
    data: &StructuredRecord,
    context: &DeliveryContext,
) -> JoinHandle<DeliveryResult> {
    let deliverer = Arc::clone(deliverer);
    let destination = destination.clone();
    let data = data.clone();
    let context = *context;

    tokio::spawn(async move { deliverer.deliver(&destination, &data, &context).await })
}

async fn settle(destination: &Destination, handle: JoinHandle<DeliveryResult>) -> DeliveryResult {
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => DeliveryResult::failed(
            destination.destination_type(),
            format!("delivery task aborted: {e}"),
        ),
    };

    if let DeliveryResult::Failed { error_message, .. } = &result {
        tracing::error!(
            destination = %destination.destination_type(),
            target = %destination.target(),
            error = %error_message,
            "Delivery failed"
        );
    }

    result
}
