use cdp_core::{Application, DiameterMessage};
use serde::Serialize;
use std::fmt;

/// Identifier of one transport connection owned by the runtime
pub type ConnId = u64;

/// Connection state of a peer (RFC 6733 section 5.6)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PeerState {
    Closed,
    WaitConnAck,
    WaitICEA,
    WaitConnAckElect,
    WaitReturns,
    ROpen,
    IOpen,
    Closing,
}

impl PeerState {
    /// Handshake completed on one side
    pub fn is_open(&self) -> bool {
        matches!(self, Self::IOpen | Self::ROpen)
    }

    /// States that time out after Tc
    pub fn is_waiting(&self) -> bool {
        matches!(
            self,
            Self::WaitConnAck
                | Self::WaitICEA
                | Self::WaitConnAckElect
                | Self::WaitReturns
                | Self::Closing
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "Closed",
            Self::WaitConnAck => "Wait_Conn_Ack",
            Self::WaitICEA => "Wait_I_CEA",
            Self::WaitConnAckElect => "Wait_Conn_Ack_Elect",
            Self::WaitReturns => "Wait_Returns",
            Self::ROpen => "R_Open",
            Self::IOpen => "I_Open",
            Self::Closing => "Closing",
        }
    }
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which of the peer's two connections an event concerns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Side {
    /// We dialled the peer
    Initiator,
    /// The peer dialled us
    Receiver,
}

/// Our own identity and capabilities, advertised in CER/CEA
#[derive(Debug, Clone, PartialEq)]
pub struct LocalNode {
    pub fqdn: String,
    pub realm: String,
    pub vendor_id: u32,
    pub product_name: String,
    pub applications: Vec<Application>,
    pub supported_vendors: Vec<u32>,
}

/// Inputs of the peer state machine
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    Start,
    Stop,
    Timeout,
    WinElection,
    /// A CER arrived on a new inbound connection
    RConnCer { conn: ConnId, cer: DiameterMessage },
    /// Outbound connect finished
    IRcvConnAck { conn: ConnId },
    IRcvConnNAck,
    IRcvCer(DiameterMessage),
    IRcvCea(DiameterMessage),
    RRcvCer(DiameterMessage),
    RRcvCea(DiameterMessage),
    IRcvNonCea(DiameterMessage),
    IRcvDpr(DiameterMessage),
    IRcvDpa(DiameterMessage),
    RRcvDpr(DiameterMessage),
    RRcvDpa(DiameterMessage),
    IRcvDwr(DiameterMessage),
    IRcvDwa(DiameterMessage),
    RRcvDwr(DiameterMessage),
    RRcvDwa(DiameterMessage),
    SendMessage(DiameterMessage),
    IRcvMessage(DiameterMessage),
    RRcvMessage(DiameterMessage),
    IPeerDisc,
    RPeerDisc,
}

impl PeerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Start => "Start",
            Self::Stop => "Stop",
            Self::Timeout => "Timeout",
            Self::WinElection => "Win_Election",
            Self::RConnCer { .. } => "R_Conn_CER",
            Self::IRcvConnAck { .. } => "I_Rcv_Conn_Ack",
            Self::IRcvConnNAck => "I_Rcv_Conn_NAck",
            Self::IRcvCer(_) => "I_Rcv_CER",
            Self::IRcvCea(_) => "I_Rcv_CEA",
            Self::RRcvCer(_) => "R_Rcv_CER",
            Self::RRcvCea(_) => "R_Rcv_CEA",
            Self::IRcvNonCea(_) => "I_Rcv_Non_CEA",
            Self::IRcvDpr(_) => "I_Rcv_DPR",
            Self::IRcvDpa(_) => "I_Rcv_DPA",
            Self::RRcvDpr(_) => "R_Rcv_DPR",
            Self::RRcvDpa(_) => "R_Rcv_DPA",
            Self::IRcvDwr(_) => "I_Rcv_DWR",
            Self::IRcvDwa(_) => "I_Rcv_DWA",
            Self::RRcvDwr(_) => "R_Rcv_DWR",
            Self::RRcvDwa(_) => "R_Rcv_DWA",
            Self::SendMessage(_) => "Send_Message",
            Self::IRcvMessage(_) => "I_Rcv_Message",
            Self::RRcvMessage(_) => "R_Rcv_Message",
            Self::IPeerDisc => "I_Peer_Disc",
            Self::RPeerDisc => "R_Peer_Disc",
        }
    }
}

/// Side effects requested by the state machine. Message-building actions
/// carry no message because Host-IP-Address depends on the connection.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerAction {
    /// Dial the peer; report IRcvConnAck / IRcvConnNAck
    Connect,
    SendCer { conn: ConnId },
    SendCea { conn: ConnId, cer: DiameterMessage, result_code: u32 },
    SendDwr { conn: ConnId },
    SendDwa { conn: ConnId, dwr: DiameterMessage, result_code: u32 },
    SendDpr { conn: ConnId },
    SendDpa { conn: ConnId, dpr: DiameterMessage, result_code: u32 },
    Send { conn: ConnId, msg: DiameterMessage },
    /// Close a connection
    Close { conn: ConnId },
    /// Hand an application message to the task queue
    Deliver(DiameterMessage),
    StateChanged { from: PeerState, to: PeerState },
}

/// What the periodic peer check asks the runtime to do
#[derive(Debug, Clone, PartialEq)]
pub enum TimerDecision {
    Nothing,
    /// Feed this event to the state machine
    Event(PeerEvent),
    /// Send a watchdog request on the connection
    SendDwr { conn: ConnId },
    /// Drop the peer from the registry
    Remove,
}
