//! Sans-IO peer state machine: capabilities exchange, election,
//! watchdog and disconnect handling.

pub mod capabilities;
pub mod fsm;
pub mod peer;
pub mod types;

pub use capabilities::{elect, process_cea, process_cer};
pub use peer::{Peer, PeerTimers};
pub use types::{ConnId, LocalNode, PeerAction, PeerEvent, PeerState, Side, TimerDecision};
