//! A managed zone: which policy it follows, where its unsigned/signed data
//! lives, and the scheduling hints the enforcer and signer leave for each
//! other. See `spec.md` §3.6, supplemented with the `input_serial`/
//! `outbound_serial` pair the original `enforcer-ng`'s `zone_db.c` tracks
//! (DESIGN.md, Component F), needed by the signer driver's SOA serial
//! policies (`spec.md` §4.7).

use bytes::Bytes;
use camino::Utf8PathBuf;
use domain::base::Name;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum InputAdapter {
    File(Utf8PathBuf),
    Dns { addr: std::net::SocketAddr },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputAdapter {
    File(Utf8PathBuf),
    Dns { addr: std::net::SocketAddr },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub name: Name<Bytes>,
    pub policy_id: Box<str>,
    pub input_adapter: InputAdapter,
    pub output_adapter: OutputAdapter,
    pub signconf_path: Utf8PathBuf,
    pub signconf_needs_writing: bool,

    pub roll_ksk_now: bool,
    pub roll_zsk_now: bool,
    pub roll_csk_now: bool,
    /// Next scheduled moment for each pending rollover, if one has already
    /// been computed this pass (`spec.md` §3.6).
    pub next_roll_ksk: Option<i64>,
    pub next_roll_zsk: Option<i64>,
    pub next_roll_csk: Option<i64>,

    /// Wall-clock at which residual cached DS/DNSKEY/RRSIG-DNSKEY records
    /// expire; admissibility conditions for state transitions read these
    /// (`spec.md` §4.6).
    pub ttl_end_ds: i64,
    pub ttl_end_dk: i64,
    pub ttl_end_rs: i64,

    /// The serial most recently read in from `input_adapter`.
    pub input_serial: Option<u32>,
    /// The serial most recently written out via `output_adapter`.
    pub outbound_serial: Option<u32>,

    /// When the NSEC3 salt was last regenerated, for policies with a
    /// `resalt_interval`.
    pub next_resalt: Option<i64>,
}

impl Zone {
    pub fn owner(&self) -> String {
        self.name.fmt_with_dot().to_string()
    }

    /// Clears every pending-rollover flag for a role once the enforcer has
    /// acted on it.
    pub fn clear_roll_now(&mut self, role: crate::model::policy::KeyRole) {
        use crate::model::policy::KeyRole::*;
        match role {
            Ksk => self.roll_ksk_now = false,
            Zsk => self.roll_zsk_now = false,
            Csk => self.roll_csk_now = false,
        }
    }
}
