//! Capabilities exchange, watchdog and disconnect message handling.

use crate::peer::Peer;
use crate::types::LocalNode;
use cdp_core::diameter::{AVP_FLAG_MANDATORY, FLAG_REQUEST};
use cdp_core::{Application, DiameterAvp, DiameterMessage};
use cdp_dict::{avp, command, disconnect_cause, result_code, vendor};
use std::net::IpAddr;

/// Election between simultaneous connections: compare our identity with
/// the Origin-Host of the peer's CER. The greater identity wins; when one
/// is a prefix of the other the longer one wins. A CER without
/// Origin-Host is won by us.
pub fn elect(local_fqdn: &str, cer: &DiameterMessage) -> bool {
    match cer.find_avp(avp::ORIGIN_HOST) {
        Some(origin) => local_wins(local_fqdn.as_bytes(), &origin.data),
        None => true,
    }
}

/// Byte-wise identity comparison used by the election
pub fn local_wins(local: &[u8], remote: &[u8]) -> bool {
    for (l, r) in local.iter().zip(remote.iter()) {
        if l != r {
            return l > r;
        }
    }
    local.len() > remote.len()
}

/// Applications advertised in a CER or CEA, deduplicated in order
pub fn advertised_applications(msg: &DiameterMessage) -> Vec<Application> {
    let mut apps: Vec<Application> = Vec::new();
    let mut push = |app: Application| {
        if !apps.contains(&app) {
            apps.push(app);
        }
    };

    for a in &msg.avps {
        match a.code {
            avp::AUTH_APPLICATION_ID => {
                if let Ok(id) = a.as_u32() {
                    push(Application::auth(id, vendor::IETF));
                }
            }
            avp::ACCT_APPLICATION_ID => {
                if let Ok(id) = a.as_u32() {
                    push(Application::acct(id, vendor::IETF));
                }
            }
            avp::VENDOR_SPECIFIC_APPLICATION_ID => {
                let Ok(children) = a.ungroup() else { continue };
                let vendor_id = children
                    .iter()
                    .find(|c| c.code == avp::VENDOR_ID)
                    .and_then(|c| c.as_u32().ok())
                    .unwrap_or(vendor::IETF);
                for c in &children {
                    match c.code {
                        avp::AUTH_APPLICATION_ID => {
                            if let Ok(id) = c.as_u32() {
                                push(Application::auth(id, vendor_id));
                            }
                        }
                        avp::ACCT_APPLICATION_ID => {
                            if let Ok(id) = c.as_u32() {
                                push(Application::acct(id, vendor_id));
                            }
                        }
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    apps
}

/// Advertised applications we support ourselves, in advertised order
pub fn common_applications(local: &LocalNode, msg: &DiameterMessage) -> Vec<Application> {
    advertised_applications(msg)
        .into_iter()
        .filter(|remote| {
            local
                .applications
                .iter()
                .any(|l| l.matches(remote.id, remote.vendor))
        })
        .collect()
}

/// Validate an incoming CER. With at least one common application the
/// negotiated applications are recorded for the peer and 2001 is returned,
/// otherwise 5010.
pub fn process_cer(peer: &mut Peer, local: &LocalNode, cer: &DiameterMessage) -> u32 {
    let common = common_applications(local, cer);
    if common.is_empty() {
        return result_code::NO_COMMON_APPLICATION;
    }
    peer.applications = common;
    result_code::SUCCESS
}

/// Record the negotiated applications of a CEA and return its Result-Code
pub fn process_cea(peer: &mut Peer, local: &LocalNode, cea: &DiameterMessage) -> u32 {
    peer.applications = common_applications(local, cea);
    cea.result_code().unwrap_or(result_code::UNABLE_TO_COMPLY)
}

fn add_identity(msg: &mut DiameterMessage, local: &LocalNode) {
    msg.add_avp(DiameterAvp::from_str(avp::ORIGIN_HOST, AVP_FLAG_MANDATORY, 0, &local.fqdn));
    msg.add_avp(DiameterAvp::from_str(avp::ORIGIN_REALM, AVP_FLAG_MANDATORY, 0, &local.realm));
}

fn add_capabilities(msg: &mut DiameterMessage, local: &LocalNode, host_ips: &[IpAddr]) {
    for ip in host_ips {
        msg.add_avp(DiameterAvp::from_address(avp::HOST_IP_ADDRESS, AVP_FLAG_MANDATORY, 0, ip));
    }
    msg.add_avp(DiameterAvp::from_u32(avp::VENDOR_ID, AVP_FLAG_MANDATORY, 0, local.vendor_id));
    // Product-Name never carries the M bit
    msg.add_avp(DiameterAvp::from_str(avp::PRODUCT_NAME, 0, 0, &local.product_name));

    for app in &local.applications {
        let code = match app.kind {
            cdp_core::ApplicationKind::Auth => avp::AUTH_APPLICATION_ID,
            cdp_core::ApplicationKind::Acct => avp::ACCT_APPLICATION_ID,
        };
        if app.vendor == vendor::IETF {
            msg.add_avp(DiameterAvp::from_u32(code, AVP_FLAG_MANDATORY, 0, app.id));
        } else {
            let children = [
                DiameterAvp::from_u32(avp::VENDOR_ID, AVP_FLAG_MANDATORY, 0, app.vendor),
                DiameterAvp::from_u32(code, AVP_FLAG_MANDATORY, 0, app.id),
            ];
            msg.add_avp(DiameterAvp::grouped(
                avp::VENDOR_SPECIFIC_APPLICATION_ID,
                AVP_FLAG_MANDATORY,
                0,
                &children,
            ));
        }
    }

    let mut vendors: Vec<u32> = local.supported_vendors.clone();
    for app in &local.applications {
        if app.vendor != vendor::IETF && !vendors.contains(&app.vendor) {
            vendors.push(app.vendor);
        }
    }
    for v in vendors {
        msg.add_avp(DiameterAvp::from_u32(avp::SUPPORTED_VENDOR_ID, AVP_FLAG_MANDATORY, 0, v));
    }
}

/// Capabilities-Exchange-Request
pub fn build_cer(local: &LocalNode, host_ips: &[IpAddr], hbh: u32, e2e: u32) -> DiameterMessage {
    let mut cer = DiameterMessage::new(command::CAPABILITIES_EXCHANGE, 0, FLAG_REQUEST, hbh, e2e);
    add_identity(&mut cer, local);
    add_capabilities(&mut cer, local, host_ips);
    cer
}

/// Capabilities-Exchange-Answer for `cer`
pub fn build_cea(
    local: &LocalNode,
    cer: &DiameterMessage,
    code: u32,
    host_ips: &[IpAddr],
) -> DiameterMessage {
    let mut cea = DiameterMessage::answer_to(cer);
    cea.add_avp(DiameterAvp::from_u32(avp::RESULT_CODE, AVP_FLAG_MANDATORY, 0, code));
    add_identity(&mut cea, local);
    add_capabilities(&mut cea, local, host_ips);
    cea
}

pub fn build_dwr(local: &LocalNode, hbh: u32, e2e: u32) -> DiameterMessage {
    let mut dwr = DiameterMessage::new(command::DEVICE_WATCHDOG, 0, FLAG_REQUEST, hbh, e2e);
    add_identity(&mut dwr, local);
    dwr
}

pub fn build_dwa(local: &LocalNode, dwr: &DiameterMessage, code: u32) -> DiameterMessage {
    let mut dwa = DiameterMessage::answer_to(dwr);
    dwa.add_avp(DiameterAvp::from_u32(avp::RESULT_CODE, AVP_FLAG_MANDATORY, 0, code));
    add_identity(&mut dwa, local);
    dwa
}

/// Disconnect-Peer-Request, always with Disconnect-Cause REBOOTING
pub fn build_dpr(local: &LocalNode, hbh: u32, e2e: u32) -> DiameterMessage {
    let mut dpr = DiameterMessage::new(command::DISCONNECT_PEER, 0, FLAG_REQUEST, hbh, e2e);
    add_identity(&mut dpr, local);
    dpr.add_avp(DiameterAvp::from_u32(
        avp::DISCONNECT_CAUSE,
        AVP_FLAG_MANDATORY,
        0,
        disconnect_cause::REBOOTING,
    ));
    dpr
}

pub fn build_dpa(local: &LocalNode, dpr: &DiameterMessage, code: u32) -> DiameterMessage {
    let mut dpa = DiameterMessage::answer_to(dpr);
    dpa.add_avp(DiameterAvp::from_u32(avp::RESULT_CODE, AVP_FLAG_MANDATORY, 0, code));
    add_identity(&mut dpa, local);
    dpa
}

#[cfg(test)]
mod tests {
    use super::*;
    use cdp_dict::application;

    fn local() -> LocalNode {
        LocalNode {
            fqdn: "scscf.ims.test".into(),
            realm: "ims.test".into(),
            vendor_id: 10415,
            product_name: "cdp".into(),
            applications: vec![
                Application::auth(application::CX, vendor::TGPP),
                Application::auth(application::CREDIT_CONTROL, vendor::IETF),
            ],
            supported_vendors: vec![vendor::TGPP],
        }
    }

    fn cer_from(origin: &str, apps: &[Application]) -> DiameterMessage {
        let node = LocalNode {
            fqdn: origin.into(),
            realm: "ims.test".into(),
            vendor_id: 0,
            product_name: "peer".into(),
            applications: apps.to_vec(),
            supported_vendors: vec![],
        };
        build_cer(&node, &[], 1, 1)
    }

    #[test]
    fn test_local_wins_ordering() {
        assert!(local_wins(b"b.test", b"a.test"));
        assert!(!local_wins(b"a.test", b"b.test"));
        // prefix: longer wins
        assert!(local_wins(b"hss.test.x", b"hss.test"));
        assert!(!local_wins(b"hss.test", b"hss.test.x"));
        // equal identities lose
        assert!(!local_wins(b"hss.test", b"hss.test"));
    }

    #[test]
    fn test_elect_is_antisymmetric() {
        let pairs = [("a.test", "b.test"), ("hss1", "hss10"), ("z", "aaaa")];
        for (x, y) in pairs {
            let cer_x = cer_from(x, &[]);
            let cer_y = cer_from(y, &[]);
            assert_ne!(elect(x, &cer_y), elect(y, &cer_x), "{x} vs {y}");
        }
    }

    #[test]
    fn test_elect_without_origin_host() {
        let cer = DiameterMessage::new(command::CAPABILITIES_EXCHANGE, 0, FLAG_REQUEST, 1, 1);
        assert!(elect("scscf.ims.test", &cer));
    }

    #[test]
    fn test_cer_contents() {
        let node = local();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let cer = build_cer(&node, &[ip], 7, 9);

        assert!(cer.is_request());
        assert!(!cer.header.is_proxiable());
        assert_eq!(cer.origin_host().as_deref(), Some("scscf.ims.test"));
        assert_eq!(cer.origin_realm().as_deref(), Some("ims.test"));
        assert_eq!(
            cer.find_avp(avp::HOST_IP_ADDRESS).unwrap().as_address().unwrap(),
            ip
        );
        assert_eq!(cer.get_u32(avp::VENDOR_ID), Some(10415));
        assert_eq!(cer.get_string(avp::PRODUCT_NAME).as_deref(), Some("cdp"));
        assert_eq!(cer.find_avps(avp::VENDOR_SPECIFIC_APPLICATION_ID).count(), 1);
        assert_eq!(cer.get_u32(avp::AUTH_APPLICATION_ID), Some(4));
        assert_eq!(cer.find_avps(avp::SUPPORTED_VENDOR_ID).count(), 1);
    }

    #[test]
    fn test_advertised_applications_dedup() {
        let mut cer = cer_from("hss.test", &[Application::auth(application::CX, vendor::TGPP)]);
        cer.add_avp(DiameterAvp::grouped(
            avp::VENDOR_SPECIFIC_APPLICATION_ID,
            0,
            0,
            &[
                DiameterAvp::from_u32(avp::VENDOR_ID, 0, 0, vendor::TGPP),
                DiameterAvp::from_u32(avp::AUTH_APPLICATION_ID, 0, 0, application::CX),
            ],
        ));
        cer.add_avp(DiameterAvp::from_u32(avp::ACCT_APPLICATION_ID, 0, 0, 3));

        let apps = advertised_applications(&cer);
        assert_eq!(
            apps,
            vec![
                Application::auth(application::CX, vendor::TGPP),
                Application::acct(3, 0)
            ]
        );
    }

    #[test]
    fn test_process_cer_common_application() {
        let node = local();
        let mut peer = Peer::new("hss.ims.test", "ims.test", 3868);
        let cer = cer_from("hss.ims.test", &[Application::auth(application::CX, vendor::TGPP)]);

        assert_eq!(process_cer(&mut peer, &node, &cer), result_code::SUCCESS);
        assert!(peer.handles_application(application::CX, vendor::TGPP));
    }

    #[test]
    fn test_process_cer_no_common_application() {
        let node = local();
        let mut peer = Peer::new("hss.ims.test", "ims.test", 3868);
        // same id, wrong vendor
        let cer = cer_from("hss.ims.test", &[Application::auth(application::CX, vendor::IETF)]);

        assert_eq!(
            process_cer(&mut peer, &node, &cer),
            result_code::NO_COMMON_APPLICATION
        );
        assert!(peer.applications.is_empty());
    }

    #[test]
    fn test_process_cea_result_code() {
        let node = local();
        let mut peer = Peer::new("hss.ims.test", "ims.test", 3868);
        let cer = cer_from("hss.ims.test", &[]);

        let cea = build_cea(&node, &cer, result_code::SUCCESS, &[]);
        assert_eq!(process_cea(&mut peer, &node, &cea), result_code::SUCCESS);
        assert_eq!(peer.applications.len(), 2);

        let mut bare = DiameterMessage::answer_to(&cer);
        bare.add_avp(DiameterAvp::from_str(avp::ORIGIN_HOST, 0, 0, "x"));
        assert_eq!(process_cea(&mut peer, &node, &bare), result_code::UNABLE_TO_COMPLY);
    }

    #[test]
    fn test_only_common_applications_are_recorded() {
        let node = LocalNode {
            applications: vec![Application::auth(1001, vendor::IETF)],
            ..local()
        };
        let cer = cer_from(
            "hss.ims.test",
            &[
                Application::auth(1001, vendor::IETF),
                Application::auth(2002, vendor::IETF),
            ],
        );

        let mut peer = Peer::new("hss.ims.test", "ims.test", 3868);
        assert_eq!(process_cer(&mut peer, &node, &cer), result_code::SUCCESS);
        assert_eq!(peer.applications, vec![Application::auth(1001, vendor::IETF)]);

        let cea = build_cea(&local(), &cer, result_code::SUCCESS, &[]);
        let mut peer = Peer::new("scscf.ims.test", "ims.test", 3868);
        process_cea(&mut peer, &node, &cea);
        assert!(peer.applications.is_empty());
    }

    #[test]
    fn test_base_avps_carry_mandatory_bit() {
        let node = local();
        let ip: IpAddr = "10.0.0.1".parse().unwrap();
        let mut cer = build_cer(&node, &[ip], 1, 1);
        let cea = build_cea(&node, &cer, result_code::SUCCESS, &[ip]);
        let dpr = build_dpr(&node, 2, 2);

        for msg in [&cer, &cea, &dpr] {
            for a in &msg.avps {
                if a.code == avp::PRODUCT_NAME {
                    assert!(!a.is_mandatory());
                } else {
                    assert!(a.is_mandatory(), "AVP {} of command {}", a.code, msg.header.command_code);
                }
            }
        }
        let vsai = cer.find_avp(avp::VENDOR_SPECIFIC_APPLICATION_ID).unwrap();
        assert!(vsai.ungroup().unwrap().iter().all(|c| c.is_mandatory()));

        // survives the wire
        cer = DiameterMessage::decode_bytes(cer.encode()).unwrap();
        assert!(cer.find_avp(avp::ORIGIN_HOST).unwrap().is_mandatory());
    }

    #[test]
    fn test_dpr_carries_disconnect_cause() {
        let dpr = build_dpr(&local(), 1, 2);
        assert_eq!(dpr.get_u32(avp::DISCONNECT_CAUSE), Some(0));
        let dpa = build_dpa(&local(), &dpr, result_code::SUCCESS);
        assert!(dpa.is_answer());
        assert_eq!(dpa.header.hop_by_hop_id, 1);
        assert_eq!(dpa.result_code(), Some(2001));
    }
}
