use tokio::sync::broadcast;

use crate::models::dto::SignalEvent;

/// Diffusion des événements de signaux vers les abonnés temps réel (SSE).
/// Un abonné trop lent perd les messages les plus anciens au lieu de bloquer
/// l'émetteur (voir `RecvError::Lagged`).
#[derive(Clone)]
pub struct SignalHub {
    sender: broadcast::Sender<SignalEvent>,
}

impl SignalHub {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Publie un événement. Retourne le nombre d'abonnés qui le recevront (0 si aucun).
    pub fn publish(&self, event: SignalEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SignalEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
