use snafu::{ResultExt, Snafu};
use tally_client::{tracker::CumulativeAcksTracker, TrackingMessageId};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Debug, Snafu)]
enum Error {
    Tally { source: tally_client::Error },
}

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_file(true)
                .with_line_number(true),
        )
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "tally_client=debug".into()))
        .init();

    let tracker = CumulativeAcksTracker::new(16);

    // one standalone entry, a batch of three, another standalone entry
    let first = TrackingMessageId::new(7, 0, 0);
    let batch = TrackingMessageId::batch_ids(7, 1, 0, 3);
    let last = TrackingMessageId::new(7, 2, 0);

    let mut received = vec![first.clone()];
    received.extend(batch.iter().cloned());
    received.push(last.clone());
    tracker
        .messages_received(received)
        .await
        .context(TallySnafu)?;

    let boundary = tracker
        .get_cumulative_message_id(&batch[1])
        .await
        .context(TallySnafu)?;
    info!("boundary for {}: {boundary:?}", batch[1]);

    if let Some(boundary) = boundary {
        boundary.ack_cumulative();
        tracker
            .cumulative_ack_sent(&boundary)
            .await
            .context(TallySnafu)?;
    }

    batch[2].ack();
    tracker.ack_sent(&batch[2]).await.context(TallySnafu)?;
    let boundary = tracker
        .get_cumulative_message_id(&batch[1])
        .await
        .context(TallySnafu)?;
    info!("boundary for {} after acking the batch tail: {boundary:?}", batch[1]);

    let remaining = tracker.tracked_message_ids().await.context(TallySnafu)?;
    info!(
        "still tracked: {}",
        remaining
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ")
    );

    tracker.close();
    Ok(())
}
