//! Broadcast Gateway - outbound notifications
//!
//! The engines publish [`Notification`]s after their state change is
//! durable. Delivery is best effort: a failed publish is logged by
//! [`deliver`] and never rolls anything back.

pub mod error;

pub use error::GatewayError;

use league_core::{ClaimOutcome, EngineMessage, ScoreDelta};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Outbound notification kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Notification {
    ScoreDelta(ScoreDelta),
    ClaimOutcome(ClaimOutcome),
}

impl Notification {
    pub fn to_message(&self) -> EngineMessage {
        match self {
            Notification::ScoreDelta(delta) => EngineMessage::ScoreDelta(delta.clone()),
            Notification::ClaimOutcome(outcome) => EngineMessage::ClaimOutcome(outcome.clone()),
        }
    }

    pub fn league_id(&self) -> u32 {
        match self {
            Notification::ScoreDelta(delta) => delta.league_id,
            Notification::ClaimOutcome(outcome) => outcome.league_id,
        }
    }
}

/// External collaborator that fans notifications out to clients
#[async_trait::async_trait]
pub trait BroadcastGateway: Send + Sync {
    async fn publish(&self, notification: Notification) -> Result<(), GatewayError>;
}

/// Publish and swallow the error; state is already persisted at this point
pub async fn deliver(gateway: &dyn BroadcastGateway, notification: Notification) {
    let league_id = notification.league_id();
    if let Err(e) = gateway.publish(notification).await {
        warn!("Notification delivery failed for league {}: {}", league_id, e);
    }
}

/// Fan-out over a tokio broadcast channel
pub struct ChannelGateway {
    sender: broadcast::Sender<Notification>,
}

impl ChannelGateway {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

#[async_trait::async_trait]
impl BroadcastGateway for ChannelGateway {
    async fn publish(&self, notification: Notification) -> Result<(), GatewayError> {
        match self.sender.send(notification) {
            Ok(receivers) => {
                debug!("Notification sent to {} subscribers", receivers);
                Ok(())
            }
            Err(_) => Err(GatewayError::NoSubscribers),
        }
    }
}

/// Logs every notification as JSON
#[derive(Default)]
pub struct LoggingGateway;

#[async_trait::async_trait]
impl BroadcastGateway for LoggingGateway {
    async fn publish(&self, notification: Notification) -> Result<(), GatewayError> {
        let json = serde_json::to_string(&notification.to_message())?;
        info!(target: "broadcast", "{}", json);
        Ok(())
    }
}

/// Writes each notification as one JSON line (used by the CLI)
pub struct JsonLinesGateway<W: Write + Send> {
    writer: Mutex<W>,
}

impl<W: Write + Send> JsonLinesGateway<W> {
    pub fn new(writer: W) -> Self {
        Self { writer: Mutex::new(writer) }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner()
    }
}

#[async_trait::async_trait]
impl<W: Write + Send> BroadcastGateway for JsonLinesGateway<W> {
    async fn publish(&self, notification: Notification) -> Result<(), GatewayError> {
        let json = serde_json::to_string(&notification.to_message())?;
        let mut writer = self.writer.lock();
        writeln!(writer, "{json}")?;
        writer.flush()?;
        Ok(())
    }
}

/// Keeps every notification in memory (tests)
#[derive(Default, Clone)]
pub struct RecordingGateway {
    notifications: Arc<Mutex<Vec<Notification>>>,
    failing: Arc<Mutex<bool>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent publishes fail (after recording nothing)
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock() = failing;
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.notifications.lock().clone()
    }

    pub fn score_deltas(&self) -> Vec<ScoreDelta> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::ScoreDelta(delta) => Some(delta.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn claim_outcomes(&self) -> Vec<ClaimOutcome> {
        self.notifications
            .lock()
            .iter()
            .filter_map(|n| match n {
                Notification::ClaimOutcome(outcome) => Some(outcome.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn clear(&self) {
        self.notifications.lock().clear();
    }
}

#[async_trait::async_trait]
impl BroadcastGateway for RecordingGateway {
    async fn publish(&self, notification: Notification) -> Result<(), GatewayError> {
        if *self.failing.lock() {
            return Err(GatewayError::Delivery { message: "recording gateway failing".into() });
        }
        self.notifications.lock().push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use league_core::{ClaimId, ClaimStatus, RejectionReason};
    use rust_decimal::Decimal;

    fn outcome() -> Notification {
        Notification::ClaimOutcome(ClaimOutcome {
            claim_id: ClaimId(1),
            league_id: 3,
            team_id: 30,
            target_player_id: 99,
            status: ClaimStatus::Rejected,
            reason: Some(RejectionReason::PlayerUnavailable),
            cost_charged: None,
        })
    }

    fn delta() -> Notification {
        Notification::ScoreDelta(ScoreDelta {
            player_id: 99,
            league_id: 3,
            week: 1,
            new_total: Decimal::new(65, 1),
            delta: Decimal::new(65, 1),
            source_sequence_id: 4,
        })
    }

    #[tokio::test]
    async fn test_channel_gateway_fan_out() {
        let gateway = ChannelGateway::new(16);
        assert!(matches!(gateway.publish(delta()).await, Err(GatewayError::NoSubscribers)));

        let mut first = gateway.subscribe();
        let mut second = gateway.subscribe();
        assert_eq!(gateway.subscriber_count(), 2);

        gateway.publish(outcome()).await.unwrap();
        assert_eq!(first.recv().await.unwrap(), outcome());
        assert_eq!(second.recv().await.unwrap(), outcome());
    }

    #[tokio::test]
    async fn test_deliver_swallows_failures() {
        let gateway = RecordingGateway::new();
        gateway.set_failing(true);
        deliver(&gateway, delta()).await;
        assert!(gateway.notifications().is_empty());

        gateway.set_failing(false);
        deliver(&gateway, delta()).await;
        deliver(&gateway, outcome()).await;
        assert_eq!(gateway.score_deltas().len(), 1);
        assert_eq!(gateway.claim_outcomes()[0].reason, Some(RejectionReason::PlayerUnavailable));
    }

    #[tokio::test]
    async fn test_json_lines_output_is_tagged() {
        let gateway = JsonLinesGateway::new(Vec::new());
        gateway.publish(outcome()).await.unwrap();
        gateway.publish(delta()).await.unwrap();

        let output = String::from_utf8(gateway.into_inner()).unwrap();
        let lines: Vec<serde_json::Value> =
            output.lines().map(|l| serde_json::from_str(l).unwrap()).collect();
        assert_eq!(lines[0]["type"], "claim_outcome");
        assert_eq!(lines[0]["reason"], "player_unavailable");
        assert_eq!(lines[1]["type"], "score_delta");
        assert_eq!(lines[1]["newTotal"], "6.5");
    }
}
