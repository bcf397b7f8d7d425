use crate::codes::avp;
use crate::data_type::AvpDataType;

/// AVP header flag bits
pub const AVP_FLAG_VENDOR: u8 = 0x80;
pub const AVP_FLAG_MANDATORY: u8 = 0x40;
pub const AVP_FLAG_PROTECTED: u8 = 0x20;

/// Standard AVP codes known to the base stack (RFC 6733, RFC 4006, 3GPP)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum StandardAvpCode {
    // ========================================
    // RFC 6733 Base Protocol
    // ========================================
    UserName = avp::USER_NAME,
    Class = avp::CLASS,
    SessionTimeout = avp::SESSION_TIMEOUT,
    ProxyState = avp::PROXY_STATE,
    EventTimestamp = avp::EVENT_TIMESTAMP,
    HostIpAddress = avp::HOST_IP_ADDRESS,
    AuthApplicationId = avp::AUTH_APPLICATION_ID,
    AcctApplicationId = avp::ACCT_APPLICATION_ID,
    VendorSpecificApplicationId = avp::VENDOR_SPECIFIC_APPLICATION_ID,
    RedirectMaxCacheTime = avp::REDIRECT_MAX_CACHE_TIME,
    SessionId = avp::SESSION_ID,
    OriginHost = avp::ORIGIN_HOST,
    SupportedVendorId = avp::SUPPORTED_VENDOR_ID,
    VendorId = avp::VENDOR_ID,
    FirmwareRevision = avp::FIRMWARE_REVISION,
    ResultCode = avp::RESULT_CODE,
    ProductName = avp::PRODUCT_NAME,
    SessionBinding = avp::SESSION_BINDING,
    DisconnectCause = avp::DISCONNECT_CAUSE,
    AuthRequestType = avp::AUTH_REQUEST_TYPE,
    AuthGracePeriod = avp::AUTH_GRACE_PERIOD,
    AuthSessionState = avp::AUTH_SESSION_STATE,
    OriginStateId = avp::ORIGIN_STATE_ID,
    FailedAvp = avp::FAILED_AVP,
    ErrorMessage = avp::ERROR_MESSAGE,
    RouteRecord = avp::ROUTE_RECORD,
    DestinationRealm = avp::DESTINATION_REALM,
    AuthorizationLifetime = avp::AUTHORIZATION_LIFETIME,
    DestinationHost = avp::DESTINATION_HOST,
    TerminationCause = avp::TERMINATION_CAUSE,
    OriginRealm = avp::ORIGIN_REALM,
    ExperimentalResult = avp::EXPERIMENTAL_RESULT,
    ExperimentalResultCode = avp::EXPERIMENTAL_RESULT_CODE,
    AccountingRecordType = avp::ACCOUNTING_RECORD_TYPE,
    AccountingRecordNumber = avp::ACCOUNTING_RECORD_NUMBER,

    // ========================================
    // Digest / resource attributes
    // ========================================
    Resource = avp::RESOURCE,
    Response = avp::RESPONSE,
    Challenge = avp::CHALLENGE,
    Method = avp::METHOD,
    ServiceType = avp::SERVICE_TYPE,
    UserGroup = avp::USER_GROUP,

    // ========================================
    // RFC 4006 Credit-Control
    // ========================================
    CcRequestNumber = avp::CC_REQUEST_NUMBER,
    CcRequestType = avp::CC_REQUEST_TYPE,
    CcTime = avp::CC_TIME,
    FinalUnitIndication = avp::FINAL_UNIT_INDICATION,
    GrantedServiceUnit = avp::GRANTED_SERVICE_UNIT,
    RatingGroup = avp::RATING_GROUP,
    ValidityTime = avp::VALIDITY_TIME,
    FinalUnitAction = avp::FINAL_UNIT_ACTION,
    MultipleServicesCreditControl = avp::MULTIPLE_SERVICES_CREDIT_CONTROL,
}

/// How the base stack forces header flags for a well-known AVP
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagRule {
    /// Caller's flags are used as given
    Keep,
    /// Mandatory bit set, protected bit kept from the caller, everything else cleared
    Mandatory,
    /// Exactly the mandatory bit
    MandatoryOnly,
    /// Only the caller's protected bit survives
    ProtectedOnly,
    /// No flags at all
    Clear,
}

impl FlagRule {
    /// Apply the rule to caller supplied flags. The vendor bit is not
    /// decided here; the encoder derives it from the vendor id.
    pub fn apply(self, flags: u8) -> u8 {
        match self {
            Self::Keep => flags,
            Self::Mandatory => AVP_FLAG_MANDATORY | (flags & AVP_FLAG_PROTECTED),
            Self::MandatoryOnly => AVP_FLAG_MANDATORY,
            Self::ProtectedOnly => flags & AVP_FLAG_PROTECTED,
            Self::Clear => 0,
        }
    }
}

/// Flag rule and semantic type used when an AVP is created by code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AvpDefaults {
    pub flag_rule: FlagRule,
    pub data_type: AvpDataType,
}

/// Defaults for creating an AVP with `code`. Unknown codes are opaque with
/// no forced flags.
pub fn avp_defaults(code: u32) -> AvpDefaults {
    match StandardAvpCode::from_u32(code) {
        Some(std_code) => AvpDefaults {
            flag_rule: std_code.flag_rule(),
            data_type: std_code.data_type(),
        },
        None => AvpDefaults {
            flag_rule: FlagRule::Keep,
            data_type: AvpDataType::OctetString,
        },
    }
}

impl StandardAvpCode {
    const ALL: &'static [StandardAvpCode] = &[
        Self::UserName,
        Self::Class,
        Self::SessionTimeout,
        Self::ProxyState,
        Self::EventTimestamp,
        Self::HostIpAddress,
        Self::AuthApplicationId,
        Self::AcctApplicationId,
        Self::VendorSpecificApplicationId,
        Self::RedirectMaxCacheTime,
        Self::SessionId,
        Self::OriginHost,
        Self::SupportedVendorId,
        Self::VendorId,
        Self::FirmwareRevision,
        Self::ResultCode,
        Self::ProductName,
        Self::SessionBinding,
        Self::DisconnectCause,
        Self::AuthRequestType,
        Self::AuthGracePeriod,
        Self::AuthSessionState,
        Self::OriginStateId,
        Self::FailedAvp,
        Self::ErrorMessage,
        Self::RouteRecord,
        Self::DestinationRealm,
        Self::AuthorizationLifetime,
        Self::DestinationHost,
        Self::TerminationCause,
        Self::OriginRealm,
        Self::ExperimentalResult,
        Self::ExperimentalResultCode,
        Self::AccountingRecordType,
        Self::AccountingRecordNumber,
        Self::Resource,
        Self::Response,
        Self::Challenge,
        Self::Method,
        Self::ServiceType,
        Self::UserGroup,
        Self::CcRequestNumber,
        Self::CcRequestType,
        Self::CcTime,
        Self::FinalUnitIndication,
        Self::GrantedServiceUnit,
        Self::RatingGroup,
        Self::ValidityTime,
        Self::FinalUnitAction,
        Self::MultipleServicesCreditControl,
    ];

    /// Convert u32 code to StandardAvpCode
    pub fn from_u32(code: u32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| *c as u32 == code)
    }

    /// Get AVP name
    pub fn name(&self) -> &'static str {
        match self {
            Self::UserName => "User-Name",
            Self::Class => "Class",
            Self::SessionTimeout => "Session-Timeout",
            Self::ProxyState => "Proxy-State",
            Self::EventTimestamp => "Event-Timestamp",
            Self::HostIpAddress => "Host-IP-Address",
            Self::AuthApplicationId => "Auth-Application-Id",
            Self::AcctApplicationId => "Acct-Application-Id",
            Self::VendorSpecificApplicationId => "Vendor-Specific-Application-Id",
            Self::RedirectMaxCacheTime => "Redirect-Max-Cache-Time",
            Self::SessionId => "Session-Id",
            Self::OriginHost => "Origin-Host",
            Self::SupportedVendorId => "Supported-Vendor-Id",
            Self::VendorId => "Vendor-Id",
            Self::FirmwareRevision => "Firmware-Revision",
            Self::ResultCode => "Result-Code",
            Self::ProductName => "Product-Name",
            Self::SessionBinding => "Session-Binding",
            Self::DisconnectCause => "Disconnect-Cause",
            Self::AuthRequestType => "Auth-Request-Type",
            Self::AuthGracePeriod => "Auth-Grace-Period",
            Self::AuthSessionState => "Auth-Session-State",
            Self::OriginStateId => "Origin-State-Id",
            Self::FailedAvp => "Failed-AVP",
            Self::ErrorMessage => "Error-Message",
            Self::RouteRecord => "Route-Record",
            Self::DestinationRealm => "Destination-Realm",
            Self::AuthorizationLifetime => "Authorization-Lifetime",
            Self::DestinationHost => "Destination-Host",
            Self::TerminationCause => "Termination-Cause",
            Self::OriginRealm => "Origin-Realm",
            Self::ExperimentalResult => "Experimental-Result",
            Self::ExperimentalResultCode => "Experimental-Result-Code",
            Self::AccountingRecordType => "Accounting-Record-Type",
            Self::AccountingRecordNumber => "Accounting-Record-Number",
            Self::Resource => "Resource",
            Self::Response => "Response",
            Self::Challenge => "Challenge",
            Self::Method => "Method",
            Self::ServiceType => "Service-Type",
            Self::UserGroup => "User-Group",
            Self::CcRequestNumber => "CC-Request-Number",
            Self::CcRequestType => "CC-Request-Type",
            Self::CcTime => "CC-Time",
            Self::FinalUnitIndication => "Final-Unit-Indication",
            Self::GrantedServiceUnit => "Granted-Service-Unit",
            Self::RatingGroup => "Rating-Group",
            Self::ValidityTime => "Validity-Time",
            Self::FinalUnitAction => "Final-Unit-Action",
            Self::MultipleServicesCreditControl => "Multiple-Services-Credit-Control",
        }
    }

    /// Get AVP data type
    pub fn data_type(&self) -> AvpDataType {
        match self {
            Self::SessionId
            | Self::UserName
            | Self::ProductName
            | Self::ErrorMessage
            | Self::Resource
            | Self::Response
            | Self::Challenge
            | Self::Method
            | Self::ServiceType
            | Self::UserGroup => AvpDataType::Utf8String,

            Self::OriginHost
            | Self::OriginRealm
            | Self::DestinationHost
            | Self::DestinationRealm
            | Self::RouteRecord => AvpDataType::DiameterIdentity,

            Self::Class | Self::ProxyState => AvpDataType::OctetString,

            Self::HostIpAddress => AvpDataType::Address,
            Self::EventTimestamp => AvpDataType::Time,

            Self::VendorSpecificApplicationId
            | Self::FailedAvp
            | Self::ExperimentalResult
            | Self::FinalUnitIndication
            | Self::GrantedServiceUnit
            | Self::MultipleServicesCreditControl => AvpDataType::Grouped,

            Self::DisconnectCause
            | Self::AuthRequestType
            | Self::AuthSessionState
            | Self::TerminationCause
            | Self::AccountingRecordType
            | Self::CcRequestType
            | Self::FinalUnitAction => AvpDataType::Enumerated,

            Self::SessionTimeout
            | Self::AuthApplicationId
            | Self::AcctApplicationId
            | Self::RedirectMaxCacheTime
            | Self::SupportedVendorId
            | Self::VendorId
            | Self::FirmwareRevision
            | Self::ResultCode
            | Self::SessionBinding
            | Self::AuthGracePeriod
            | Self::OriginStateId
            | Self::AuthorizationLifetime
            | Self::ExperimentalResultCode
            | Self::AccountingRecordNumber
            | Self::CcRequestNumber
            | Self::CcTime
            | Self::RatingGroup
            | Self::ValidityTime => AvpDataType::Unsigned32,
        }
    }

    /// Flag rule applied when the stack builds this AVP itself
    pub fn flag_rule(&self) -> FlagRule {
        match self {
            Self::UserName
            | Self::Class
            | Self::SessionId
            | Self::DestinationRealm
            | Self::DestinationHost
            | Self::OriginHost
            | Self::OriginRealm
            | Self::Resource
            | Self::Response
            | Self::Challenge
            | Self::Method
            | Self::ServiceType
            | Self::UserGroup
            | Self::FailedAvp
            | Self::SessionTimeout
            | Self::AuthApplicationId
            | Self::RedirectMaxCacheTime
            | Self::SupportedVendorId
            | Self::VendorId
            | Self::ResultCode
            | Self::SessionBinding
            | Self::AuthGracePeriod
            | Self::OriginStateId
            | Self::AuthorizationLifetime
            | Self::HostIpAddress => FlagRule::Mandatory,
            Self::ProxyState => FlagRule::MandatoryOnly,
            Self::ProductName => FlagRule::Clear,
            Self::ErrorMessage => FlagRule::ProtectedOnly,
            _ => FlagRule::Keep,
        }
    }
}
