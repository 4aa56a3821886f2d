//! Supabase Realtime client for the smart-bookmarks dashboard
//!
//! Speaks the Phoenix channel protocol used by Realtime: join a topic with
//! a set of `postgres_changes` bindings and receive row changes for them
//! through callbacks.

mod channel;
mod client;
mod error;
mod filters;
mod message;

pub use channel::{ChannelBuilder, DatabaseChanges, Subscription};
pub use client::{channel_topic, ConnectionState, RealtimeClient, RealtimeClientOptions};
pub use error::RealtimeError;
pub use filters::{DatabaseFilter, FilterOperator};
pub use message::{ChangeType, ChannelEvent, PostgresChangePayload, RealtimeMessage};
