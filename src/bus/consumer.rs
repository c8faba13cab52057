//! Bus consumer that mirrors notifications into the log.
//!
//! Runs until the `CancellationToken` fires or the bus is dropped. A
//! lagging subscriber logs how many messages it skipped and keeps going.

use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{BusMessage, TOPIC_FLEET_SUMMARY, TOPIC_REPROVISION, TOPIC_RESTART};

/// Spawn a background task that logs every bus message.
#[must_use]
pub fn spawn_event_logger(
    mut rx: broadcast::Receiver<BusMessage>,
    cancel: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let message = tokio::select! {
                () = cancel.cancelled() => {
                    info!("event logger shutting down");
                    break;
                }
                received = rx.recv() => match received {
                    Ok(message) => message,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "event logger lagged behind the bus");
                        continue;
                    }
                    Err(RecvError::Closed) => {
                        info!("event bus closed");
                        break;
                    }
                },
            };

            log_message(&message);
        }
    })
}

fn log_message(message: &BusMessage) {
    let topic = message.topic.as_str();
    match topic {
        TOPIC_REPROVISION => warn!(topic, payload = %message.payload, "bus event"),
        TOPIC_RESTART => info!(topic, payload = %message.payload, "bus event"),
        TOPIC_FLEET_SUMMARY => debug!(topic, "bus event"),
        _ => debug!(topic, payload = %message.payload, "bus event"),
    }
}
