use axum::{
    body::Bytes,
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt, stream::SplitSink, stream::SplitStream};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::{debug, warn};

use super::models::{OrderDetail, OrderStatus, Ticket, TicketStatus};

/// How often to send WebSocket Ping frames.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// How long to wait for a Pong response before considering the connection dead.
const PONG_TIMEOUT: Duration = Duration::from_secs(60);

// ── WebSocket message types ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum WsMessage {
    TicketCreated {
        ticket: Ticket,
    },
    TicketStatusChanged {
        ticket_id: i64,
        from: TicketStatus,
        to: TicketStatus,
    },
    TicketProcessed {
        ticket: Ticket,
    },
    OrderCreated {
        order: OrderDetail,
    },
    OrderStatusChanged {
        commande_id: String,
        statut: OrderStatus,
    },
}

// ── WebSocket handler ────────────────────────────────────────────────

/// Upgrade handler bound to the dashboard broadcast channel.
pub async fn ws_handler_with_sender(
    ws: WebSocketUpgrade,
    tx: broadcast::Sender<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, tx))
}

async fn handle_socket(socket: WebSocket, tx: broadcast::Sender<String>) {
    debug!("Dashboard WebSocket connected");
    let (sender, receiver) = socket.split();
    let rx = tx.subscribe();
    run_socket_loop(sender, receiver, rx).await;
    debug!("Dashboard WebSocket disconnected");
}

/// Forward broadcasts to one client and keep the connection alive.
///
/// A Ping goes out every [`PING_INTERVAL`]; if no Pong comes back within
/// [`PONG_TIMEOUT`] the loop exits.
async fn run_socket_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    mut rx: broadcast::Receiver<String>,
) {
    let mut ping_interval = tokio::time::interval(PING_INTERVAL);
    // First tick is immediate.
    ping_interval.tick().await;

    let mut last_pong = Instant::now();
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            _ = ping_interval.tick() => {
                if awaiting_pong && last_pong.elapsed() > PONG_TIMEOUT {
                    debug!("WebSocket pong timeout");
                    break;
                }
                if sender.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
                awaiting_pong = true;
            }

            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if sender.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "WebSocket client lagged behind broadcasts");
                        continue;
                    }
                }
            }

            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Pong(_))) => {
                        last_pong = Instant::now();
                        awaiting_pong = false;
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    let _ = sender.send(Message::Close(None)).await;
}

// ── Broadcast helper ─────────────────────────────────────────────────

/// Serialize and broadcast a WsMessage to all connected dashboards.
/// Returns silently when nobody is listening.
pub fn broadcast_message(tx: &broadcast::Sender<String>, msg: &WsMessage) {
    match serde_json::to_string(msg) {
        Ok(json) => {
            let _ = tx.send(json);
        }
        Err(e) => {
            warn!(error = %e, "Failed to serialize WsMessage");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::support::models::Category;

    fn ticket() -> Ticket {
        Ticket {
            id: 3,
            ticket_id: "MSG-20240101120000-031".to_string(),
            client_email: "marie.martin@example.com".to_string(),
            client_name: Some("Marie Martin".to_string()),
            subject: "Retard".to_string(),
            message: "Ma commande #1001 est en retard".to_string(),
            status: TicketStatus::New,
            category: None,
            urgency: None,
            sentiment: None,
            response: None,
            response_time: None,
            quality_score: None,
            model_used: None,
            assigned_to: "IA Agent".to_string(),
            created_at: "2024-01-01 12:00:00".to_string(),
            updated_at: "2024-01-01 12:00:00".to_string(),
            processed_at: None,
        }
    }

    #[test]
    fn test_ticket_created_serialization() {
        let msg = WsMessage::TicketCreated { ticket: ticket() };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains(r#""type":"TicketCreated""#));
        assert!(json.contains(r#""ticket_id":"MSG-20240101120000-031""#));
        assert!(json.contains(r#""status":"new""#));
    }

    #[test]
    fn test_ticket_status_changed_serialization() {
        let msg = WsMessage::TicketStatusChanged {
            ticket_id: 3,
            from: TicketStatus::New,
            to: TicketStatus::InProgress,
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["type"], "TicketStatusChanged");
        assert_eq!(v["data"]["from"], "new");
        assert_eq!(v["data"]["to"], "in_progress");
    }

    #[test]
    fn test_order_status_changed_serialization() {
        let msg = WsMessage::OrderStatusChanged {
            commande_id: "CMD-20240101120000-24".to_string(),
            statut: OrderStatus::Expediee,
        };
        let v: serde_json::Value = serde_json::to_value(&msg).unwrap();
        assert_eq!(v["data"]["statut"], "expediee");
    }

    #[test]
    fn test_ws_message_roundtrip_deserialization() {
        let mut t = ticket();
        t.status = TicketStatus::Processed;
        t.category = Some(Category::RetardLivraison);
        let msg = WsMessage::TicketProcessed { ticket: t };
        let json = serde_json::to_string(&msg).unwrap();
        let back: WsMessage = serde_json::from_str(&json).unwrap();
        match back {
            WsMessage::TicketProcessed { ticket } => {
                assert_eq!(ticket.status, TicketStatus::Processed);
                assert_eq!(ticket.category, Some(Category::RetardLivraison));
            }
            other => panic!("Expected TicketProcessed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_broadcast_channel_delivers_to_subscribers() {
        let (tx, mut rx) = broadcast::channel::<String>(16);
        broadcast_message(
            &tx,
            &WsMessage::TicketStatusChanged {
                ticket_id: 1,
                from: TicketStatus::InProgress,
                to: TicketStatus::Closed,
            },
        );
        let received = rx.recv().await.unwrap();
        assert!(received.contains("TicketStatusChanged"));
        assert!(received.contains("closed"));
    }

    #[tokio::test]
    async fn test_broadcast_no_receivers_does_not_panic() {
        let (tx, _) = broadcast::channel::<String>(16);
        broadcast_message(&tx, &WsMessage::TicketCreated { ticket: ticket() });
    }

    #[test]
    fn test_keepalive_constants() {
        assert!(PONG_TIMEOUT > PING_INTERVAL);
        assert_eq!(PING_INTERVAL, Duration::from_secs(30));
    }
}
