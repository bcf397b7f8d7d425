//! Well-known Diameter code points: command codes, AVP codes, result codes
//! and the enumerated values the engine interprets.

/// Command codes (RFC 6733, RFC 4006, 3GPP IMS interfaces)
pub mod command {
    pub const CAPABILITIES_EXCHANGE: u32 = 257;
    pub const RE_AUTH: u32 = 258;
    pub const AA: u32 = 265;
    pub const ACCOUNTING: u32 = 271;
    pub const CREDIT_CONTROL: u32 = 272;
    pub const ABORT_SESSION: u32 = 274;
    pub const SESSION_TERMINATION: u32 = 275;
    pub const DEVICE_WATCHDOG: u32 = 280;
    pub const DISCONNECT_PEER: u32 = 282;

    // 3GPP Cx/Dx (TS 29.229)
    pub const USER_AUTHORIZATION: u32 = 300;
    pub const SERVER_ASSIGNMENT: u32 = 301;
    pub const LOCATION_INFO: u32 = 302;
    pub const MULTIMEDIA_AUTH: u32 = 303;
    pub const REGISTRATION_TERMINATION: u32 = 304;
    pub const PUSH_PROFILE: u32 = 305;

    // 3GPP Sh (TS 29.329)
    pub const USER_DATA: u32 = 306;
    pub const PROFILE_UPDATE: u32 = 307;
    pub const SUBSCRIBE_NOTIFICATIONS: u32 = 308;
    pub const PUSH_NOTIFICATION: u32 = 309;

    /// Human readable command name, used in logs
    pub fn name(code: u32) -> &'static str {
        match code {
            CAPABILITIES_EXCHANGE => "Capabilities-Exchange",
            RE_AUTH => "Re-Auth",
            AA => "AA",
            ACCOUNTING => "Accounting",
            CREDIT_CONTROL => "Credit-Control",
            ABORT_SESSION => "Abort-Session",
            SESSION_TERMINATION => "Session-Termination",
            DEVICE_WATCHDOG => "Device-Watchdog",
            DISCONNECT_PEER => "Disconnect-Peer",
            USER_AUTHORIZATION => "User-Authorization",
            SERVER_ASSIGNMENT => "Server-Assignment",
            LOCATION_INFO => "Location-Info",
            MULTIMEDIA_AUTH => "Multimedia-Auth",
            REGISTRATION_TERMINATION => "Registration-Termination",
            PUSH_PROFILE => "Push-Profile",
            USER_DATA => "User-Data",
            PROFILE_UPDATE => "Profile-Update",
            SUBSCRIBE_NOTIFICATIONS => "Subscribe-Notifications",
            PUSH_NOTIFICATION => "Push-Notification",
            _ => "Unknown",
        }
    }
}

/// AVP codes
pub mod avp {
    pub const USER_NAME: u32 = 1;
    pub const CLASS: u32 = 25;
    pub const SESSION_TIMEOUT: u32 = 27;
    pub const PROXY_STATE: u32 = 33;
    pub const ACCT_SESSION_ID: u32 = 44;
    pub const EVENT_TIMESTAMP: u32 = 55;
    pub const HOST_IP_ADDRESS: u32 = 257;
    pub const AUTH_APPLICATION_ID: u32 = 258;
    pub const ACCT_APPLICATION_ID: u32 = 259;
    pub const VENDOR_SPECIFIC_APPLICATION_ID: u32 = 260;
    pub const REDIRECT_HOST_USAGE: u32 = 261;
    pub const REDIRECT_MAX_CACHE_TIME: u32 = 262;
    pub const SESSION_ID: u32 = 263;
    pub const ORIGIN_HOST: u32 = 264;
    pub const SUPPORTED_VENDOR_ID: u32 = 265;
    pub const VENDOR_ID: u32 = 266;
    pub const FIRMWARE_REVISION: u32 = 267;
    pub const RESULT_CODE: u32 = 268;
    pub const PRODUCT_NAME: u32 = 269;
    pub const SESSION_BINDING: u32 = 270;
    pub const SESSION_SERVER_FAILOVER: u32 = 271;
    pub const MULTI_ROUND_TIME_OUT: u32 = 272;
    pub const DISCONNECT_CAUSE: u32 = 273;
    pub const AUTH_REQUEST_TYPE: u32 = 274;
    pub const AUTH_GRACE_PERIOD: u32 = 276;
    pub const AUTH_SESSION_STATE: u32 = 277;
    pub const ORIGIN_STATE_ID: u32 = 278;
    pub const FAILED_AVP: u32 = 279;
    pub const PROXY_HOST: u32 = 280;
    pub const ERROR_MESSAGE: u32 = 281;
    pub const ROUTE_RECORD: u32 = 282;
    pub const DESTINATION_REALM: u32 = 283;
    pub const PROXY_INFO: u32 = 284;
    pub const RE_AUTH_REQUEST_TYPE: u32 = 285;
    pub const ACCOUNTING_SUB_SESSION_ID: u32 = 287;
    pub const AUTHORIZATION_LIFETIME: u32 = 291;
    pub const REDIRECT_HOST: u32 = 292;
    pub const DESTINATION_HOST: u32 = 293;
    pub const ERROR_REPORTING_HOST: u32 = 294;
    pub const TERMINATION_CAUSE: u32 = 295;
    pub const ORIGIN_REALM: u32 = 296;
    pub const EXPERIMENTAL_RESULT: u32 = 297;
    pub const EXPERIMENTAL_RESULT_CODE: u32 = 298;
    pub const INBAND_SECURITY_ID: u32 = 299;

    // Resource / digest AVPs the base stack treats as strings
    pub const RESOURCE: u32 = 400;
    pub const RESPONSE: u32 = 401;
    pub const CHALLENGE: u32 = 402;
    pub const METHOD: u32 = 403;
    pub const SERVICE_TYPE: u32 = 404;
    pub const USER_GROUP: u32 = 405;

    // Credit-control (RFC 4006)
    pub const CC_REQUEST_NUMBER: u32 = 415;
    pub const CC_REQUEST_TYPE: u32 = 416;
    pub const CC_TIME: u32 = 420;
    pub const FINAL_UNIT_INDICATION: u32 = 430;
    pub const GRANTED_SERVICE_UNIT: u32 = 431;
    pub const RATING_GROUP: u32 = 432;
    pub const VALIDITY_TIME: u32 = 448;
    pub const FINAL_UNIT_ACTION: u32 = 449;
    pub const MULTIPLE_SERVICES_CREDIT_CONTROL: u32 = 456;

    // Accounting (RFC 6733)
    pub const ACCOUNTING_RECORD_TYPE: u32 = 480;
    pub const ACCOUNTING_RECORD_NUMBER: u32 = 485;

    // 3GPP Rx (TS 29.214), vendor 10415
    pub const ABORT_CAUSE: u32 = 500;
}

/// Result-Code values (RFC 6733 section 7.1)
pub mod result_code {
    pub const MULTI_ROUND_AUTH: u32 = 1001;
    pub const SUCCESS: u32 = 2001;
    pub const LIMITED_SUCCESS: u32 = 2002;
    pub const COMMAND_UNSUPPORTED: u32 = 3001;
    pub const UNABLE_TO_DELIVER: u32 = 3002;
    pub const REALM_NOT_SERVED: u32 = 3003;
    pub const TOO_BUSY: u32 = 3004;
    pub const LOOP_DETECTED: u32 = 3005;
    pub const REDIRECT_INDICATION: u32 = 3006;
    pub const APPLICATION_UNSUPPORTED: u32 = 3007;
    pub const INVALID_HDR_BITS: u32 = 3008;
    pub const INVALID_AVP_BITS: u32 = 3009;
    pub const UNKNOWN_PEER: u32 = 3010;
    pub const AUTHENTICATION_REJECTED: u32 = 4001;
    pub const OUT_OF_SPACE: u32 = 4002;
    pub const ELECTION_LOST: u32 = 4003;
    pub const AVP_UNSUPPORTED: u32 = 5001;
    pub const UNKNOWN_SESSION_ID: u32 = 5002;
    pub const AUTHORIZATION_REJECTED: u32 = 5003;
    pub const INVALID_AVP_VALUE: u32 = 5004;
    pub const MISSING_AVP: u32 = 5005;
    pub const RESOURCES_EXCEEDED: u32 = 5006;
    pub const CONTRADICTING_AVPS: u32 = 5007;
    pub const AVP_NOT_ALLOWED: u32 = 5008;
    pub const AVP_OCCURS_TOO_MANY_TIMES: u32 = 5009;
    pub const NO_COMMON_APPLICATION: u32 = 5010;
    pub const UNSUPPORTED_VERSION: u32 = 5011;
    pub const UNABLE_TO_COMPLY: u32 = 5012;
    pub const INVALID_BIT_IN_HEADER: u32 = 5013;
    pub const INVALID_AVP_LENGTH: u32 = 5014;
    pub const INVALID_MESSAGE_LENGTH: u32 = 5015;
    pub const INVALID_AVP_BIT_COMBO: u32 = 5016;
    pub const NO_COMMON_SECURITY: u32 = 5017;

    /// 2xxx results are successes
    pub fn is_success(code: u32) -> bool {
        (2000..=2999).contains(&code)
    }
}

/// Application identifiers
pub mod application {
    pub const COMMON: u32 = 0;
    pub const NASREQ: u32 = 1;
    pub const BASE_ACCOUNTING: u32 = 3;
    pub const CREDIT_CONTROL: u32 = 4;
    pub const CX: u32 = 16_777_216;
    pub const SH: u32 = 16_777_217;
    pub const RX: u32 = 16_777_236;
    pub const GX: u32 = 16_777_238;
    pub const S6A: u32 = 16_777_251;
    pub const RELAY: u32 = 0xFFFF_FFFF;
}

/// Vendor identifiers
pub mod vendor {
    pub const IETF: u32 = 0;
    pub const TGPP: u32 = 10415;
    pub const ETSI: u32 = 13019;
}

/// Disconnect-Cause values
pub mod disconnect_cause {
    pub const REBOOTING: u32 = 0;
    pub const BUSY: u32 = 1;
    pub const DO_NOT_WANT_TO_TALK_TO_YOU: u32 = 2;
}

/// Termination-Cause values
pub mod termination_cause {
    pub const LOGOUT: u32 = 1;
    pub const SERVICE_NOT_PROVIDED: u32 = 2;
    pub const BAD_ANSWER: u32 = 3;
    pub const ADMINISTRATIVE: u32 = 4;
    pub const LINK_BROKEN: u32 = 5;
    pub const AUTH_EXPIRED: u32 = 6;
    pub const USER_MOVED: u32 = 7;
    pub const SESSION_TIMEOUT: u32 = 8;
}

/// Auth-Session-State values
pub mod auth_session_state {
    pub const STATE_MAINTAINED: u32 = 0;
    pub const NO_STATE_MAINTAINED: u32 = 1;
}

/// CC-Request-Type values (RFC 4006)
pub mod cc_request_type {
    pub const INITIAL: u32 = 1;
    pub const UPDATE: u32 = 2;
    pub const TERMINATION: u32 = 3;
    pub const EVENT: u32 = 4;
}

/// Accounting-Record-Type values
pub mod accounting_record_type {
    pub const EVENT: u32 = 1;
    pub const START: u32 = 2;
    pub const INTERIM: u32 = 3;
    pub const STOP: u32 = 4;
}

/// Final-Unit-Action values (RFC 4006)
pub mod final_unit_action {
    pub const TERMINATE: u32 = 0;
    pub const REDIRECT: u32 = 1;
    pub const RESTRICT_ACCESS: u32 = 2;
}

/// Abort-Cause values (3GPP TS 29.214)
pub mod abort_cause {
    pub const BEARER_RELEASED: u32 = 0;
    pub const INSUFFICIENT_SERVER_RESOURCES: u32 = 1;
    pub const INSUFFICIENT_BEARER_RESOURCES: u32 = 2;
    pub const PS_TO_CS_HANDOVER: u32 = 3;
}
