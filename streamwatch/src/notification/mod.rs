//! Notification delivery: channels, message rendering and reconciliation.

pub mod channels;
pub mod message;
mod reconciler;

pub use channels::{
    ChannelOp, DeliveryChannel, DeliveryError, DeliveryResult, DiscordChannel, DiscordConfig,
    MemoryChannel, MessageHandle,
};
pub use message::{MessageContent, render_ended, render_live};
pub use reconciler::{
    Action, Effects, ReconcileFailure, ReconcileReport, Reconciler, ReconcilerConfig,
};
