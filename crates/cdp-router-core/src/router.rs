use crate::table::{Route, RoutingTable};
use cdp_core::{CdpError, DiameterMessage, Result};
use tracing::debug;

/// What the router needs to know about one peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub open: bool,
    pub disabled: bool,
    /// The peer negotiated the message's (application, vendor) pair
    pub supports: bool,
    /// Ordinal of the last time the peer was picked; lower is older
    pub last_selected: u64,
}

impl Candidate {
    fn usable(&self) -> bool {
        self.open && !self.disabled && self.supports
    }
}

/// Read-only view of the peer registry
pub trait PeerDirectory {
    fn candidate(&self, fqdn: &str, app_id: u32, vendor_id: u32) -> Option<Candidate>;
}

impl<F> PeerDirectory for F
where
    F: Fn(&str, u32, u32) -> Option<Candidate>,
{
    fn candidate(&self, fqdn: &str, app_id: u32, vendor_id: u32) -> Option<Candidate> {
        self(fqdn, app_id, vendor_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectedBy {
    Sticky,
    DestinationHost,
    Realm,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub fqdn: String,
    pub by: SelectedBy,
}

fn usable(peers: &impl PeerDirectory, fqdn: &str, app: u32, vendor: u32) -> Option<Candidate> {
    peers
        .candidate(fqdn, app, vendor)
        .filter(Candidate::usable)
}

/// Least recently selected usable peer of the lowest metric tier that has one
fn pick_from(routes: &[Route], peers: &impl PeerDirectory, app: u32, vendor: u32) -> Option<String> {
    let mut tier: Option<u32> = None;
    let mut best: Option<(&Route, u64)> = None;

    for route in routes {
        if tier.is_some_and(|metric| route.metric > metric) {
            break;
        }
        let Some(candidate) = usable(peers, &route.fqdn, app, vendor) else {
            continue;
        };
        tier = Some(route.metric);
        if best.map_or(true, |(_, last)| candidate.last_selected < last) {
            best = Some((route, candidate.last_selected));
        }
    }
    best.map(|(route, _)| route.fqdn.clone())
}

/// Choose the peer a request goes to: the session's sticky peer, then
/// Destination-Host, then the Destination-Realm routes, then the default
/// routes.
pub fn select_peer(
    table: &RoutingTable,
    msg: &DiameterMessage,
    sticky: Option<&str>,
    peers: &impl PeerDirectory,
) -> Result<Selection> {
    let (app, vendor) = msg.application_vendor();

    if let Some(fqdn) = sticky {
        if usable(peers, fqdn, app, vendor).is_some() {
            return Ok(Selection {
                fqdn: fqdn.to_string(),
                by: SelectedBy::Sticky,
            });
        }
        debug!(peer = %fqdn, "sticky peer not usable, routing again");
    }

    if let Some(host) = msg.destination_host() {
        if usable(peers, &host, app, vendor).is_some() {
            return Ok(Selection {
                fqdn: host,
                by: SelectedBy::DestinationHost,
            });
        }
    }

    if let Some(realm) = msg.destination_realm() {
        if let Some(fqdn) = pick_from(table.routes_for(&realm), peers, app, vendor) {
            return Ok(Selection {
                fqdn,
                by: SelectedBy::Realm,
            });
        }
    }

    if let Some(fqdn) = pick_from(table.default_routes(), peers, app, vendor) {
        return Ok(Selection {
            fqdn,
            by: SelectedBy::Default,
        });
    }

    Err(CdpError::NoRoute(format!(
        "no peer for realm {} application {}/{}",
        msg.destination_realm().unwrap_or_default(),
        app,
        vendor
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_core::DiameterAvp;
    use cdp_dict::{application, avp, command};
    use std::cell::RefCell;
    use std::collections::HashMap;

    /// Peers with a selection clock, like the registry keeps
    struct Peers {
        peers: RefCell<HashMap<String, Candidate>>,
        clock: RefCell<u64>,
    }

    impl Peers {
        fn new(list: &[(&str, bool)]) -> Self {
            let peers = list
                .iter()
                .map(|(fqdn, open)| {
                    (
                        fqdn.to_string(),
                        Candidate {
                            open: *open,
                            disabled: false,
                            supports: true,
                            last_selected: 0,
                        },
                    )
                })
                .collect();
            Self {
                peers: RefCell::new(peers),
                clock: RefCell::new(0),
            }
        }

        fn select(&self, table: &RoutingTable, msg: &DiameterMessage) -> Result<Selection> {
            let selection = select_peer(table, msg, None, self)?;
            let mut clock = self.clock.borrow_mut();
            *clock += 1;
            if let Some(c) = self.peers.borrow_mut().get_mut(&selection.fqdn) {
                c.last_selected = *clock;
            }
            Ok(selection)
        }
    }

    impl PeerDirectory for Peers {
        fn candidate(&self, fqdn: &str, _app: u32, _vendor: u32) -> Option<Candidate> {
            self.peers.borrow().get(fqdn).cloned()
        }
    }

    fn request(realm: &str) -> DiameterMessage {
        let mut msg = DiameterMessage::new_request(command::USER_AUTHORIZATION, application::CX, 1, 1);
        msg.add_avp(DiameterAvp::from_str(avp::DESTINATION_REALM, 0, 0, realm));
        msg
    }

    fn table() -> RoutingTable {
        let mut table = RoutingTable::new();
        table.add_route("hss.test", "hss1", 10);
        table.add_route("hss.test", "hss2", 10);
        table.add_route("hss.test", "hss3", 20);
        table
    }

    #[test]
    fn test_lowest_metric_tier_alternates() {
        let peers = Peers::new(&[("hss1", true), ("hss2", true), ("hss3", true)]);
        let table = table();
        let msg = request("hss.test");

        let picks: Vec<String> = (0..4)
            .map(|_| peers.select(&table, &msg).unwrap().fqdn)
            .collect();
        assert_eq!(picks, vec!["hss1", "hss2", "hss1", "hss2"]);
    }

    #[test]
    fn test_falls_to_next_tier_when_tier_is_down() {
        let peers = Peers::new(&[("hss1", false), ("hss2", false), ("hss3", true)]);
        let selection = peers.select(&table(), &request("hss.test")).unwrap();
        assert_eq!(selection.fqdn, "hss3");
        assert_eq!(selection.by, SelectedBy::Realm);
    }

    #[test]
    fn test_disabled_and_incapable_peers_skipped() {
        let peers = Peers::new(&[("hss1", true), ("hss2", true), ("hss3", true)]);
        peers.peers.borrow_mut().get_mut("hss1").unwrap().disabled = true;
        peers.peers.borrow_mut().get_mut("hss2").unwrap().supports = false;

        let selection = peers.select(&table(), &request("hss.test")).unwrap();
        assert_eq!(selection.fqdn, "hss3");
    }

    #[test]
    fn test_sticky_then_destination_host() {
        let peers = Peers::new(&[("hss1", true), ("hss2", true), ("hss3", true)]);
        let table = table();
        let mut msg = request("hss.test");

        let s = select_peer(&table, &msg, Some("hss3"), &peers).unwrap();
        assert_eq!(s, Selection { fqdn: "hss3".into(), by: SelectedBy::Sticky });

        msg.add_avp(DiameterAvp::from_str(avp::DESTINATION_HOST, 0, 0, "hss2"));
        let s = select_peer(&table, &msg, Some("gone"), &peers).unwrap();
        assert_eq!(s, Selection { fqdn: "hss2".into(), by: SelectedBy::DestinationHost });
    }

    #[test]
    fn test_default_routes_and_no_route() {
        let lookup = |fqdn: &str, _app: u32, _vendor: u32| {
            (fqdn == "dra").then_some(Candidate {
                open: true,
                disabled: false,
                supports: true,
                last_selected: 0,
            })
        };
        let mut table = table();
        let msg = request("unknown.test");

        let err = select_peer(&table, &msg, None, &lookup).unwrap_err();
        assert!(matches!(err, CdpError::NoRoute(_)));
        assert_eq!(err.to_result_code(), 3003);

        table.add_default_route("dra", 1);
        let s = select_peer(&table, &msg, None, &lookup).unwrap();
        assert_eq!(s.by, SelectedBy::Default);
        assert_eq!(s.fqdn, "dra");
    }
}
