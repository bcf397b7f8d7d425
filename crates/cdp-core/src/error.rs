use cdp_dict::result_code;
use thiserror::Error;

/// Main error type for the Diameter peer engine
#[derive(Error, Debug)]
pub enum CdpError {
    // ========================================
    // Protocol Errors
    // ========================================
    #[error("Malformed Diameter message: {0}")]
    MalformedMessage(String),

    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Missing required AVP: {0}")]
    MissingAvp(u32),

    #[error("Invalid AVP value for code {code}: {reason}")]
    InvalidAvpValue { code: u32, reason: String },

    // ========================================
    // Routing Errors
    // ========================================
    #[error("No route for message: {0}")]
    NoRoute(String),

    #[error("Peer unavailable: {0}")]
    PeerUnavailable(String),

    // ========================================
    // Timeout Errors
    // ========================================
    #[error("Timed out: {0}")]
    Timeout(String),

    // ========================================
    // System Errors
    // ========================================
    #[error("Out of resources: {0}")]
    OutOfResources(String),

    #[error("Shutting down")]
    ShuttingDown,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),

    // ========================================
    // Network Errors
    // ========================================
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CdpError {
    /// Convert error to Diameter Result-Code
    pub fn to_result_code(&self) -> u32 {
        match self {
            Self::MalformedMessage(_) => result_code::INVALID_HDR_BITS,
            Self::MissingAvp(_) => result_code::MISSING_AVP,
            Self::InvalidAvpValue { .. } => result_code::INVALID_AVP_VALUE,
            Self::NoRoute(_) => result_code::REALM_NOT_SERVED,
            Self::PeerUnavailable(_) | Self::Timeout(_) => result_code::UNABLE_TO_DELIVER,
            Self::OutOfResources(_) => result_code::TOO_BUSY,
            _ => result_code::UNABLE_TO_COMPLY,
        }
    }

    /// Get error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            Self::MalformedMessage(_) | Self::MissingAvp(_) | Self::InvalidAvpValue { .. } => {
                ErrorSeverity::Warning
            }
            Self::ProtocolError(_) | Self::Timeout(_) => ErrorSeverity::Warning,
            Self::ShuttingDown => ErrorSeverity::Info,
            Self::NoRoute(_) | Self::PeerUnavailable(_) | Self::Io(_) => ErrorSeverity::Error,
            Self::OutOfResources(_) | Self::InternalError(_) | Self::ConfigError(_) => {
                ErrorSeverity::Critical
            }
        }
    }

    /// Check if error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::PeerUnavailable(_) | Self::Io(_) | Self::OutOfResources(_)
        )
    }
}

/// Error severity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "info"),
            Self::Warning => write!(f, "warning"),
            Self::Error => write!(f, "error"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, CdpError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_to_result_code() {
        assert_eq!(CdpError::MalformedMessage("x".into()).to_result_code(), 3008);
        assert_eq!(CdpError::MissingAvp(264).to_result_code(), 5005);
        assert_eq!(CdpError::NoRoute("ims.test".into()).to_result_code(), 3003);
        assert_eq!(CdpError::PeerUnavailable("hss".into()).to_result_code(), 3002);
        assert_eq!(CdpError::ShuttingDown.to_result_code(), 5012);
    }

    #[test]
    fn test_error_severity() {
        assert_eq!(
            CdpError::MalformedMessage("x".into()).severity(),
            ErrorSeverity::Warning
        );
        assert_eq!(CdpError::ShuttingDown.severity(), ErrorSeverity::Info);
        assert_eq!(
            CdpError::OutOfResources("queue".into()).severity(),
            ErrorSeverity::Critical
        );
    }

    #[test]
    fn test_error_retryable() {
        assert!(CdpError::Timeout("tx".into()).is_retryable());
        assert!(!CdpError::ShuttingDown.is_retryable());
        assert!(!CdpError::NoRoute("r".into()).is_retryable());
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset");
        let err: CdpError = io.into();
        assert!(matches!(err, CdpError::Io(_)));
        assert_eq!(err.severity().to_string(), "error");
    }
}
