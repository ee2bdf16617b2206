//! Real-time status relay.
//!
//! Dashboard clients hold one WebSocket each and subscribe to the container
//! list or to the stats of individual containers. The relay polls the
//! container runtime once per subscription key, however many clients watch
//! that key, and fans each result out to the subscribers.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Dashboard (browser)                            │
//! │  - One WebSocket per tab                                                │
//! │  - Sends WsCommand (subscribe / unsubscribe)                            │
//! │  - Receives WsEvent (containers, services, stats)                       │
//! └─────────────────────────────────────────┬───────────────────────────────┘
//!                                           │ WebSocket
//! ┌─────────────────────────────────────────▼───────────────────────────────┐
//! │                     RelayHub (session lifecycle)                        │
//! │  - connect / subscribe / unsubscribe / disconnect                       │
//! └──────────────────────┬──────────────────────────────┬───────────────────┘
//!                        │                              │
//! ┌──────────────────────▼──────────────┐ ┌─────────────▼───────────────────┐
//! │  ConnectionRegistry                 │ │  Multiplexer                    │
//! │  session -> subscriptions, outbox   │ │  key -> polling cycle (refcount)│
//! └──────────────────────▲──────────────┘ └─────────────┬───────────────────┘
//!                        │ fanout                       │ tick
//!                        └──────────────────────────────┤
//!                                         ┌─────────────▼───────────────────┐
//!                                         │  ContainerRuntimeApi (docker)   │
//!                                         └─────────────────────────────────┘
//! ```

mod handler;
mod hub;
mod multiplexer;
mod registry;
mod types;

pub use handler::ws_handler;
pub use hub::{CycleSnapshot, RelayConfig, RelayHub, RelaySnapshot};
pub use multiplexer::{Fanout, Multiplexer, PollIntervals, poll_once};
pub use registry::{ConnectionRegistry, SharedRegistry, WsSender};
pub use types::{SessionId, SubscriptionKey, WsCommand, WsEvent};
