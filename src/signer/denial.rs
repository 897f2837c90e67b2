//! Denial-of-existence chain construction: NSEC and NSEC3, as named by
//! the zone's policy (`spec.md` §3.4/§4.7 "sign").
//!
//! Grounded on `examples/NLnetLabs-cascade/src/units/zone_signer.rs`'s
//! `records.sign_zone(&apex_owner, &signing_config, &no_keys)` call:
//! passing an empty key set to `SignableZoneInPlace::sign_zone` makes it
//! append only denial records (NSEC or NSEC3, chosen by the
//! `SigningConfig`'s `DenialConfig`) and no RRSIGs, since there are no
//! keys to sign with. This crate signs the resulting denial RRsets
//! separately afterward, through the `Keystore` contract, the same way it
//! signs every other RRset (`spec.md` §6.1 "Out of scope": the HSM
//! interface only ever signs data it is handed, it never holds key
//! material in-process the way `domain`'s own `SigningKey` does).
//!
//! NSEC3 owner-name hashing (RFC 5155's iterated salted SHA-1) is
//! performed by `domain` itself under its `unstable-sign` feature, backed
//! by the `openssl` crypto provider (`Cargo.toml`), not reimplemented
//! here.

use bytes::Bytes;
use domain::base::{CanonicalOrd, Record};
use domain::crypto::sign::KeyPair;
use domain::dnssec::sign::SigningConfig;
use domain::dnssec::sign::denial::config::DenialConfig;
use domain::dnssec::sign::denial::nsec3::{GenerateNsec3Config, Nsec3ParamTtlMode};
use domain::dnssec::sign::error::SigningError;
use domain::dnssec::sign::keys::SigningKey;
use domain::dnssec::sign::records::Sorter;
use domain::dnssec::sign::traits::SignableZoneInPlace;
use domain::rdata::Nsec3param;
use domain::rdata::dnssec::Timestamp;
use domain::zonetree::{StoredName, StoredRecord};
use std::cmp::Ordering;

use crate::model::policy::DenialPolicy;

/// A plain, non-parallel [`Sorter`]. The teacher's `MultiThreadedSorter`
/// exists to sort a whole zone's records across CPU cores in one pass;
/// this crate already parallelizes at the RRset level via the FIFO
/// queue's worker pool (`spec.md` §4.4/§4.5), so a Rayon-backed sort here
/// would just add a dependency for no benefit.
pub struct SequentialSorter;

impl Sorter for SequentialSorter {
    fn sort_by<N, D, F>(records: &mut Vec<Record<N, D>>, compare: F)
    where
        F: Fn(&Record<N, D>, &Record<N, D>) -> Ordering + Sync,
        Record<N, D>: CanonicalOrd + Send,
    {
        records.sort_by(compare);
    }
}

/// Append the zone's denial-of-existence chain to `records` in place, per
/// the zone's [`DenialPolicy`] (`spec.md` §3.4). `records` must already be
/// in canonical order and include the zone's SOA (its `minimum` field is
/// the denial records' TTL, per `Nsec3ParamTtlMode::Soa`/`domain`'s
/// default NSEC TTL mode).
pub fn build_chain(
    policy: &DenialPolicy,
    apex: &StoredName,
    records: &mut Vec<StoredRecord>,
) -> Result<(), SigningError> {
    let denial = match policy {
        DenialPolicy::NSec => DenialConfig::Nsec(Default::default()),
        DenialPolicy::NSec3 { opt_out, .. } => {
            let mut params = Nsec3param::default();
            if *opt_out {
                params.set_opt_out_flag();
            }
            let config = GenerateNsec3Config::<Bytes, SequentialSorter>::new(params)
                .with_ttl_mode(Nsec3ParamTtlMode::Soa);
            DenialConfig::Nsec3(config)
        }
    };

    // Inception/expiration are only consulted by `sign_zone` to stamp
    // RRSIGs; passing zero signing keys below means it never produces
    // one, so these values are unused.
    let now = Timestamp::now();
    let signing_config = SigningConfig::new(denial, now, now);
    let no_keys: [&SigningKey<Bytes, KeyPair>; 0] = Default::default();
    records.sign_zone(apex, &signing_config, &no_keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::base::{Class, Rtype, Ttl};
    use domain::rdata::{Soa, ZoneRecordData};
    use std::str::FromStr;

    fn apex() -> StoredName {
        StoredName::from_str("example.com.").unwrap()
    }

    fn soa_record(apex: &StoredName) -> StoredRecord {
        let soa = Soa::new(
            apex.clone(),
            apex.clone(),
            domain::base::Serial::from(1),
            Ttl::from_secs(3600),
            Ttl::from_secs(3600),
            Ttl::from_secs(3600),
            Ttl::from_secs(3600),
        );
        Record::new(apex.clone(), Class::IN, Ttl::from_secs(3600), ZoneRecordData::Soa(soa))
    }

    #[test]
    fn nsec_policy_builds_a_real_nsec_chain() {
        let apex = apex();
        let mut records = vec![soa_record(&apex)];
        build_chain(&DenialPolicy::NSec, &apex, &mut records).unwrap();
        assert!(records.iter().any(|r| r.rtype() == Rtype::NSEC));
        assert!(records.iter().all(|r| r.rtype() != Rtype::NSEC3));
    }

    #[test]
    fn nsec3_policy_builds_a_real_nsec3_chain() {
        let apex = apex();
        let mut records = vec![soa_record(&apex)];
        let policy = DenialPolicy::NSec3 {
            opt_out: false,
            params: crate::model::policy::Nsec3Params {
                algorithm: 1,
                iterations: 0,
                salt_length: 0,
                resalt_interval: crate::clock::TimeSpan::from_secs(0),
            },
        };
        build_chain(&policy, &apex, &mut records).unwrap();
        assert!(records.iter().any(|r| r.rtype() == Rtype::NSEC3));
        assert!(records.iter().any(|r| r.rtype() == Rtype::NSEC3PARAM));
        assert!(records.iter().all(|r| r.rtype() != Rtype::NSEC));
    }
}
