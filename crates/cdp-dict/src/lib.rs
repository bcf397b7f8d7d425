// Diameter dictionary module
pub mod codes;
pub mod data_type;
pub mod manager;
pub mod standard;

// Re-export commonly used types
pub use codes::{
    abort_cause, accounting_record_type, application, auth_session_state, avp, cc_request_type,
    command, disconnect_cause, final_unit_action, result_code, termination_cause, vendor,
};
pub use data_type::{AvpDataType, AvpValue, ParseError};
pub use manager::{AvpInfo, DictionaryError, DictionaryManager};
pub use standard::{avp_defaults, AvpDefaults, FlagRule, StandardAvpCode};
