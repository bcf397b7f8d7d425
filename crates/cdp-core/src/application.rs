use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an application is advertised as authorization or accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationKind {
    Auth,
    Acct,
}

/// A Diameter application as negotiated in Capabilities-Exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Application {
    pub id: u32,
    #[serde(default)]
    pub vendor: u32,
    pub kind: ApplicationKind,
}

impl Application {
    pub fn auth(id: u32, vendor: u32) -> Self {
        Self {
            id,
            vendor,
            kind: ApplicationKind::Auth,
        }
    }

    pub fn acct(id: u32, vendor: u32) -> Self {
        Self {
            id,
            vendor,
            kind: ApplicationKind::Acct,
        }
    }

    /// Same application and vendor, regardless of kind
    pub fn matches(&self, id: u32, vendor: u32) -> bool {
        self.id == id && self.vendor == vendor
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            ApplicationKind::Auth => "auth",
            ApplicationKind::Acct => "acct",
        };
        write!(f, "{kind}:{}:{}", self.vendor, self.id)
    }
}
