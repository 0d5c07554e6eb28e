//! Outbound stanza transport.

use parley_proto::Envelope;
use tokio::sync::mpsc;
use tracing::debug;

/// Carries stanzas to addresses this router does not own.
///
/// `route` is called with a persona locked and must not block.
pub trait Protocol: Send + Sync {
    fn route(&self, envelope: Envelope);
}

/// Logs every outbound stanza and drops it.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingProtocol;

impl Protocol for LoggingProtocol {
    fn route(&self, envelope: Envelope) {
        debug!(
            from = %envelope.from,
            to = %envelope.to,
            kind = envelope.stanza.kind(),
            "Outbound stanza"
        );
    }
}

/// Hands outbound stanzas to a channel, typically drained by a transport task.
#[derive(Debug, Clone)]
pub struct ChannelProtocol {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl ChannelProtocol {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Envelope>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Protocol for ChannelProtocol {
    fn route(&self, envelope: Envelope) {
        if let Err(e) = self.tx.send(envelope) {
            debug!(to = %e.0.to, "Transport gone, stanza dropped");
        }
    }
}
