// BroadcastChannelManager: Centralized tokio broadcast channel management
// Single Responsibility: Broadcast channel lifecycle and subscription

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::broadcast;

use crate::engine::PresentationSnapshot;
use crate::gesture::StrumEvent;

/// Manages the presentation-facing tokio broadcast channels
///
/// Single Responsibility: Broadcast channel lifecycle and subscription
///
/// The frame orchestrator publishes through this manager; the presentation
/// collaborator, the debug HTTP surface and the CLI subscribe. Cloning the
/// manager shares the same channels.
///
/// # Channel Types
/// - Presentation: one read-only snapshot per frame tick
/// - Strum Events: every detected strum, for visual feedback
#[derive(Clone)]
pub struct BroadcastChannelManager {
    presentation: Arc<Mutex<Option<broadcast::Sender<PresentationSnapshot>>>>,
    strum_events: Arc<Mutex<Option<broadcast::Sender<StrumEvent>>>>,
    latest_presentation: Arc<Mutex<Option<PresentationSnapshot>>>,
}

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<'_, T> {
    // Slots hold plain values; a poisoned lock still guards consistent data.
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl BroadcastChannelManager {
    /// Create a new BroadcastChannelManager with all channels uninitialized
    ///
    /// Channels must be explicitly initialized via init_* methods before use.
    pub fn new() -> Self {
        Self {
            presentation: Arc::new(Mutex::new(None)),
            strum_events: Arc::new(Mutex::new(None)),
            latest_presentation: Arc::new(Mutex::new(None)),
        }
    }

    // ========================================================================
    // PRESENTATION CHANNEL
    // ========================================================================

    /// Initialize presentation broadcast channel
    ///
    /// Creates a broadcast channel with a 120-message buffer (two seconds of
    /// frames at 60 Hz).
    ///
    /// # Returns
    /// `broadcast::Sender<PresentationSnapshot>` - Sender for publishing snapshots
    ///
    /// # Notes
    /// - Old messages dropped if buffer fills (lagged subscribers)
    /// - The latest snapshot is also kept for polling readers
    pub fn init_presentation(&self) -> broadcast::Sender<PresentationSnapshot> {
        let (tx, _) = broadcast::channel(120);
        *lock(&self.presentation) = Some(tx.clone());
        tx
    }

    /// Subscribe to presentation snapshots
    ///
    /// # Returns
    /// `Option<broadcast::Receiver<PresentationSnapshot>>` - Receiver or None if not initialized
    pub fn subscribe_presentation(&self) -> Option<broadcast::Receiver<PresentationSnapshot>> {
        lock(&self.presentation).as_ref().map(|tx| tx.subscribe())
    }

    /// Record and broadcast a snapshot. Sending without subscribers is fine.
    pub fn publish_presentation(&self, snapshot: &PresentationSnapshot) {
        *lock(&self.latest_presentation) = Some(snapshot.clone());
        if let Some(tx) = lock(&self.presentation).as_ref() {
            let _ = tx.send(snapshot.clone());
        }
    }

    /// Most recently published snapshot
    pub fn latest_presentation(&self) -> Option<PresentationSnapshot> {
        lock(&self.latest_presentation).clone()
    }

    // ========================================================================
    // STRUM EVENTS CHANNEL
    // ========================================================================

    /// Initialize strum event broadcast channel
    ///
    /// # Returns
    /// `broadcast::Sender<StrumEvent>` - Sender for publishing strums
    ///
    /// # Notes
    /// - Buffer size: 64 messages; strums are debounced to at most 20 per second
    pub fn init_strum_events(&self) -> broadcast::Sender<StrumEvent> {
        let (tx, _) = broadcast::channel(64);
        *lock(&self.strum_events) = Some(tx.clone());
        tx
    }

    /// Subscribe to strum events
    ///
    /// # Returns
    /// `Option<broadcast::Receiver<StrumEvent>>` - Receiver or None if not initialized
    pub fn subscribe_strum_events(&self) -> Option<broadcast::Receiver<StrumEvent>> {
        lock(&self.strum_events).as_ref().map(|tx| tx.subscribe())
    }

    pub fn publish_strum(&self, event: StrumEvent) {
        if let Some(tx) = lock(&self.strum_events).as_ref() {
            let _ = tx.send(event);
        }
    }
}

impl Default for BroadcastChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gesture::StrumDirection;

    #[test]
    fn test_presentation_channel_lifecycle() {
        let manager = BroadcastChannelManager::new();

        // Initially no subscription possible
        assert!(manager.subscribe_presentation().is_none());

        // Initialize channel
        let _tx = manager.init_presentation();

        // Now subscription works
        assert!(manager.subscribe_presentation().is_some());
    }

    #[test]
    fn test_presentation_keeps_latest_without_channel() {
        let manager = BroadcastChannelManager::new();
        assert!(manager.latest_presentation().is_none());

        let snapshot = PresentationSnapshot {
            timestamp_ms: 42.0,
            ..PresentationSnapshot::default()
        };
        manager.publish_presentation(&snapshot);
        assert_eq!(manager.latest_presentation().unwrap().timestamp_ms, 42.0);
    }

    #[test]
    fn test_strum_events_multiple_subscribers() {
        let manager = BroadcastChannelManager::new();
        let _tx = manager.init_strum_events();

        // Create two subscribers
        let mut rx1 = manager.subscribe_strum_events().unwrap();
        let mut rx2 = manager.subscribe_strum_events().unwrap();

        let event = StrumEvent {
            timestamp_ms: 10.0,
            string_index: 1,
            velocity: 0.4,
            direction: StrumDirection::Up,
            speed: 1.2,
        };
        manager.publish_strum(event);

        // Both subscribers receive the message
        assert_eq!(rx1.try_recv().unwrap(), event);
        assert_eq!(rx2.try_recv().unwrap(), event);
    }

    #[test]
    fn test_clones_share_channels() {
        let manager = BroadcastChannelManager::default();
        let clone = manager.clone();
        clone.init_presentation();
        assert!(manager.subscribe_presentation().is_some());
        assert!(manager.subscribe_strum_events().is_none());
    }
}
