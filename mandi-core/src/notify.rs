use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

/// Fire-and-forget multi-channel dispatch (email/SMS/push/WhatsApp behind the
/// boundary). Implementations swallow delivery failures; the engine never
/// blocks on delivery success.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, event_type: &str, payload: Value);
}

/// Serializes a typed event and hands it to the notifier. A payload that does
/// not serialize is logged and dropped rather than failing the transition.
pub async fn emit<T: Serialize>(notifier: &dyn Notifier, event_type: &str, event: &T) {
    match serde_json::to_value(event) {
        Ok(payload) => notifier.notify(event_type, payload).await,
        Err(err) => tracing::warn!(event_type, %err, "dropping unserializable notification"),
    }
}

/// Logs each dispatch; the default wiring until a real channel is attached.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, event_type: &str, payload: Value) {
        tracing::info!(event_type, %payload, "notification dispatched");
    }
}

pub struct NullNotifier;

#[async_trait]
impl Notifier for NullNotifier {
    async fn notify(&self, _event_type: &str, _payload: Value) {}
}
