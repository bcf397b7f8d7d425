//! Session timer AVP handling.

use crate::types::{AuthSession, CcAcctSession, Deadline};
use cdp_core::diameter::AVP_FLAG_MANDATORY;
use cdp_core::{DiameterAvp, DiameterMessage};
use cdp_dict::avp;

const UNBOUNDED: u32 = u32::MAX;

/// Update the session timers from Auth-Grace-Period, Authorization-Lifetime
/// and Session-Timeout carried by `msg`.
pub fn update_auth_session_timers(
    auth: &mut AuthSession,
    msg: &DiameterMessage,
    now: i64,
    default_timeout: u32,
    max_timeout: u32,
) {
    if let Some(grace) = msg.get_u32(avp::AUTH_GRACE_PERIOD) {
        auth.grace_period = grace;
    }

    if let Some(lifetime) = msg.get_u32(avp::AUTHORIZATION_LIFETIME) {
        auth.lifetime = match lifetime {
            0 => Deadline::At(now),
            UNBOUNDED => Deadline::Never,
            secs => Deadline::At(now + i64::from(secs)),
        };
        if let (Deadline::At(timeout), Deadline::At(lifetime)) = (auth.timeout, auth.lifetime) {
            if timeout < lifetime {
                auth.timeout = Deadline::At(lifetime + i64::from(auth.grace_period));
            }
        }
    }

    if let Some(session_timeout) = msg.get_u32(avp::SESSION_TIMEOUT) {
        auth.timeout = match session_timeout {
            0 => Deadline::At(now + i64::from(default_timeout)),
            UNBOUNDED => Deadline::Never,
            secs => Deadline::At(now + i64::from(secs.min(max_timeout))),
        };
        if auth.lifetime == Deadline::Unset {
            auth.lifetime = auth.timeout;
        }
    }
}

/// Add the timer AVPs `msg` does not carry yet
pub fn add_auth_session_timers(auth: &AuthSession, msg: &mut DiameterMessage, now: i64) {
    if msg.find_avp(avp::AUTHORIZATION_LIFETIME).is_none() {
        if let Some(v) = auth.lifetime.remaining(now) {
            msg.add_avp(DiameterAvp::from_u32(
                avp::AUTHORIZATION_LIFETIME,
                AVP_FLAG_MANDATORY,
                0,
                v,
            ));
        }
    }
    if matches!(auth.lifetime, Deadline::At(_)) && msg.find_avp(avp::AUTH_GRACE_PERIOD).is_none() {
        msg.add_avp(DiameterAvp::from_u32(
            avp::AUTH_GRACE_PERIOD,
            AVP_FLAG_MANDATORY,
            0,
            auth.grace_period,
        ));
    }
    if msg.find_avp(avp::SESSION_TIMEOUT).is_none() {
        if let Some(v) = auth.timeout.remaining(now) {
            msg.add_avp(DiameterAvp::from_u32(avp::SESSION_TIMEOUT, AVP_FLAG_MANDATORY, 0, v));
        }
    }
}

/// Record the reservation granted in a Credit-Control-Answer:
/// CC-Time of the Granted-Service-Unit, Validity-Time and the
/// Final-Unit-Action of each Multiple-Services-Credit-Control group.
pub fn update_reservation(cc: &mut CcAcctSession, msg: &DiameterMessage, now: i64) {
    let mut granted = false;
    for mscc in msg.find_avps(avp::MULTIPLE_SERVICES_CREDIT_CONTROL) {
        let Ok(children) = mscc.ungroup() else { continue };
        for child in &children {
            match child.code {
                avp::GRANTED_SERVICE_UNIT => {
                    let units = child
                        .ungroup()
                        .ok()
                        .and_then(|gsu| {
                            gsu.iter()
                                .find(|a| a.code == avp::CC_TIME)
                                .and_then(|a| a.as_u32().ok())
                        });
                    if let Some(units) = units {
                        cc.reserved_units = units;
                        granted = true;
                    }
                }
                avp::VALIDITY_TIME => {
                    if let Ok(v) = child.as_u32() {
                        cc.reserved_units_validity = v;
                    }
                }
                avp::FINAL_UNIT_INDICATION => {
                    cc.final_unit_action = child.ungroup().ok().and_then(|fui| {
                        fui.iter()
                            .find(|a| a.code == avp::FINAL_UNIT_ACTION)
                            .and_then(|a| a.as_u32().ok())
                    });
                }
                _ => {}
            }
        }
    }
    if granted {
        cc.last_reservation_time = Some(now);
    }
}

/// Seconds before the reservation expires at which the owner is warned
pub const RESERVATION_BUFFER_SECS: i64 = 15;

/// Whether the current reservation lapses before another round of units
/// plus the buffer could be requested.
pub fn reservation_expiring(cc: &CcAcctSession, now: i64) -> bool {
    match cc.last_reservation_time {
        Some(last) => {
            last + i64::from(cc.reserved_units_validity)
                < now + i64::from(cc.reserved_units) + RESERVATION_BUFFER_SECS
        }
        None => false,
    }
}
