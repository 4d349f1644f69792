use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::entities::order::OrderStatus;

#[derive(Debug, Clone)]
pub struct EventSender {
    sender: mpsc::Sender<Event>,
}

impl EventSender {
    /// Creates a new EventSender
    pub fn new(sender: mpsc::Sender<Event>) -> Self {
        Self { sender }
    }

    /// Sends an event asynchronously
    pub async fn send(&self, event: Event) -> Result<(), String> {
        self.sender
            .send(event)
            .await
            .map_err(|e| format!("Failed to send event: {}", e))
    }

    /// Sends an event after its originating transaction committed. A closed
    /// channel is logged and otherwise ignored.
    pub async fn send_or_log(&self, event: Event) {
        let name = event.name();
        if let Err(e) = self.send(event).await {
            warn!(event = name, error = %e, "Dropping domain event");
        }
    }
}

/// Domain events emitted by the engine once a mutation has committed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Event {
    OrderAllocated {
        order_id: Uuid,
        total_allocated: i32,
        total_shortage: i32,
    },
    OrderStatusChanged {
        order_id: Uuid,
        old_status: OrderStatus,
        new_status: OrderStatus,
    },
    BackorderCreated {
        parent_order_id: Uuid,
        backorder_id: Uuid,
        shortage_qty: i32,
    },
    BackorderCanceled {
        order_id: Uuid,
        reason: String,
    },
    StockAdjusted {
        product_id: Uuid,
        delta: i32,
        on_hand_quantity: i32,
        min_stock: i32,
    },
    ShortageReported {
        order_id: Uuid,
        issue_id: Uuid,
    },
    ShortageResolved {
        order_id: Uuid,
        issue_id: Uuid,
        courier_id: Uuid,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::OrderAllocated { .. } => "order_allocated",
            Event::OrderStatusChanged { .. } => "order_status_changed",
            Event::BackorderCreated { .. } => "backorder_created",
            Event::BackorderCanceled { .. } => "backorder_canceled",
            Event::StockAdjusted { .. } => "stock_adjusted",
            Event::ShortageReported { .. } => "shortage_reported",
            Event::ShortageResolved { .. } => "shortage_resolved",
        }
    }
}

/// Drains the event channel until every sender is dropped.
pub async fn process_events(mut rx: mpsc::Receiver<Event>) {
    info!("Starting event processing loop");

    while let Some(event) = rx.recv().await {
        match &event {
            Event::StockAdjusted {
                product_id,
                on_hand_quantity,
                min_stock,
                ..
            } if on_hand_quantity < min_stock => {
                warn!(
                    product_id = %product_id,
                    on_hand_quantity,
                    min_stock,
                    "Product below reorder threshold"
                );
            }
            Event::OrderAllocated {
                order_id,
                total_shortage,
                ..
            } if *total_shortage > 0 => {
                warn!(order_id = %order_id, total_shortage, "Order allocated with shortage");
            }
            _ => {}
        }
        info!(event = event.name(), payload = ?event, "Processed event");
    }

    warn!("Event processing loop has ended");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn events_reach_the_receiver_in_order() {
        let (tx, mut rx) = mpsc::channel(4);
        let sender = EventSender::new(tx);
        let order_id = Uuid::new_v4();

        sender
            .send(Event::ShortageReported {
                order_id,
                issue_id: Uuid::nil(),
            })
            .await
            .unwrap();
        sender
            .send(Event::BackorderCanceled {
                order_id,
                reason: "supplier kosong".into(),
            })
            .await
            .unwrap();

        assert_eq!(rx.recv().await.unwrap().name(), "shortage_reported");
        assert_eq!(rx.recv().await.unwrap().name(), "backorder_canceled");
    }

    #[tokio::test]
    async fn send_or_log_tolerates_closed_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(rx);
        let sender = EventSender::new(tx);
        sender
            .send_or_log(Event::StockAdjusted {
                product_id: Uuid::nil(),
                delta: -1,
                on_hand_quantity: 0,
                min_stock: 2,
            })
            .await;
        assert!(sender
            .send(Event::ShortageReported {
                order_id: Uuid::nil(),
                issue_id: Uuid::nil(),
            })
            .await
            .is_err());
    }

    #[tokio::test]
    async fn process_events_exits_when_senders_drop() {
        let (tx, rx) = mpsc::channel(2);
        let handle = tokio::spawn(process_events(rx));
        tx.send(Event::OrderAllocated {
            order_id: Uuid::nil(),
            total_allocated: 10,
            total_shortage: 2,
        })
        .await
        .unwrap();
        drop(tx);
        handle.await.unwrap();
    }
}
