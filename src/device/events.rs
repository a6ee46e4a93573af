use std::convert::Infallible;
use std::sync::Arc;
use iced::subscription::{self, Subscription};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

use crate::device::transport::Transport;
use crate::device::types::TransportEvent;

/// Forwards the events of `transport` to the application until `cancel` is cancelled.
pub fn transport_event_subscription(cancel: CancellationToken, transport: Arc<dyn Transport>) -> Subscription<TransportEvent> {
    struct Monitor;

    subscription::channel(
        (std::any::TypeId::of::<Monitor>(), transport.kind()),
        64,
        move |subscription_sender| async move {
            info!("Monitoring {} events", transport.kind());
            if let Err(err) = transport.monitor(cancel, subscription_sender).await {
                warn!("Monitoring {} failed: {:?}", transport.kind(), err);
            }

            // note: subscription::channel expects the future to never resolve (Infallible)
            futures::future::pending::<Infallible>().await
        },
    )
}
