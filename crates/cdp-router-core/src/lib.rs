//! Realm routing table and peer selection.

pub mod router;
pub mod table;

pub use router::{select_peer, Candidate, PeerDirectory, SelectedBy, Selection};
pub use table::{Route, RoutingTable};
