//! Machine fingerprint derivation (spec §4.1).
//!
//! `H(credential.id ∥ floor(now / 24h))`, rendered as lowercase hex. Recomputed per outbound
//! request — never cached across a time bucket boundary, since the whole point is that it
//! rotates daily without the account itself changing.

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

const TIME_BUCKET: i64 = 24 * 60 * 60;

pub fn machine_fingerprint(credential_id: &str, now: DateTime<Utc>) -> String {
    let bucket = now.timestamp().div_euclid(TIME_BUCKET);

    let mut hasher = Sha256::new();
    hasher.update(credential_id.as_bytes());
    hasher.update(bucket.to_be_bytes());
    let digest = hasher.finalize();

    // 128 bits: half of a SHA-256 digest is still cryptographically derived from the full
    // input, so truncation here doesn't weaken the binding to (id, bucket).
    digest[..16].iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn same_bucket_is_stable() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 1, 23, 59, 59).unwrap();
        assert_eq!(
            machine_fingerprint("cred-1", t1),
            machine_fingerprint("cred-1", t2)
        );
    }

    #[test]
    fn crossing_a_day_boundary_rotates() {
        let t1 = Utc.with_ymd_and_hms(2026, 1, 1, 23, 59, 59).unwrap();
        let t2 = Utc.with_ymd_and_hms(2026, 1, 2, 0, 0, 0).unwrap();
        assert_ne!(
            machine_fingerprint("cred-1", t1),
            machine_fingerprint("cred-1", t2)
        );
    }

    #[test]
    fn different_credentials_differ() {
        let now = Utc::now();
        assert_ne!(
            machine_fingerprint("cred-1", now),
            machine_fingerprint("cred-2", now)
        );
    }

    #[test]
    fn output_is_32_lowercase_hex_chars() {
        let fp = machine_fingerprint("cred-1", Utc::now());
        assert_eq!(fp.len(), 32);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }
}
