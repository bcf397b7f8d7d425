// Error types module
pub mod error;

// Diameter protocol modules
pub mod application;
pub mod codec;
pub mod diameter;

// Transport abstraction
pub mod transport;

// Re-export commonly used types
pub use application::{Application, ApplicationKind};
pub use codec::DiameterCodec;
pub use diameter::{group_avps, ungroup_avps, DiameterAvp, DiameterHeader, DiameterMessage};
pub use error::{CdpError, ErrorSeverity, Result};
pub use transport::Transport;
