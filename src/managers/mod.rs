// Managers Module
//
// - BroadcastChannelManager: Tokio broadcast channels feeding the presentation layer

pub mod broadcast_manager;

pub use broadcast_manager::BroadcastChannelManager;
