//! Asynchronous Diameter peer engine.
//!
//! [`DiameterEngine`] owns the peers and their connections, the task queue
//! and its workers, pending transactions, the session table, the routing
//! table and the timer facility. Applications build requests with
//! [`DiameterEngine::create_request`], send them with one of the
//! `send_message*` methods and serve requests through handlers registered
//! with [`DiameterEngine::add_request_handler`].

mod acceptor;
mod api;
mod connection;
mod engine;
mod management;
mod peer_actor;
mod registry;
mod worker;

pub mod connector;
pub mod ids;
pub mod queue;
pub mod timer;
pub mod transaction;

pub use api::{RequestHandler, ResponseHandler};
pub use connector::{Connector, MemoryNetwork, PeerTarget, TcpConnector};
pub use engine::DiameterEngine;
pub use ids::IdGenerator;
pub use management::{PeerInfo, Statistics};
pub use queue::{Task, TaskQueue};
pub use timer::{TimerFacility, TimerId};
pub use transaction::{TransactionCallback, TransactionManager};
