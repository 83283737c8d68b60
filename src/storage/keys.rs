//! Byte layouts for sled keys.
//!
//! Signed values are stored big-endian with the sign bit flipped so that
//! lexicographic byte order matches numeric order.

use chrono::{DateTime, Datelike, NaiveDate, Utc};

use crate::types::{EntityKey, PeriodType};

const SIGN_FLIP_64: u64 = 1 << 63;
const SIGN_FLIP_32: u32 = 1 << 31;

/// Nanoseconds since the epoch; saturates outside the representable range.
pub fn timestamp_nanos(ts: DateTime<Utc>) -> i64 {
    ts.timestamp_nanos_opt()
        .unwrap_or_else(|| ts.timestamp().saturating_mul(1_000_000_000))
}

fn ordered_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ SIGN_FLIP_64).to_be_bytes()
}

fn ordered_i32(v: i32) -> [u8; 4] {
    ((v as u32) ^ SIGN_FLIP_32).to_be_bytes()
}

/// `[type tag][entity id BE]`
pub fn entity_prefix(key: EntityKey) -> Vec<u8> {
    let mut out = Vec::with_capacity(9);
    out.push(key.entity_type.tag());
    out.extend_from_slice(&key.entity_id.to_be_bytes());
    out
}

/// `[type tag][entity id BE][as_of nanos BE]`
pub fn snapshot_key(key: EntityKey, as_of: DateTime<Utc>) -> Vec<u8> {
    let mut out = entity_prefix(key);
    out.extend_from_slice(&ordered_i64(timestamp_nanos(as_of)));
    out
}

/// Nanoseconds back out of a snapshot key's trailing 8 bytes.
pub fn snapshot_key_nanos(key: &[u8]) -> Option<i64> {
    let tail: [u8; 8] = key.get(key.len().checked_sub(8)?..)?.try_into().ok()?;
    Some((u64::from_be_bytes(tail) ^ SIGN_FLIP_64) as i64)
}

/// Time index entry: `[as_of nanos BE][type tag][entity id BE]`
pub fn snapshot_time_key(key: EntityKey, as_of: DateTime<Utc>) -> Vec<u8> {
    time_key_from_parts(&entity_prefix(key), timestamp_nanos(as_of))
}

fn time_key_from_parts(entity: &[u8], nanos: i64) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + entity.len());
    out.extend_from_slice(&ordered_i64(nanos));
    out.extend_from_slice(entity);
    out
}

/// Time index entry for an existing snapshot key.
pub fn time_key_for_snapshot_key(snapshot_key: &[u8]) -> Option<Vec<u8>> {
    let nanos = snapshot_key_nanos(snapshot_key)?;
    let entity = snapshot_key.get(..snapshot_key.len().checked_sub(8)?)?;
    Some(time_key_from_parts(entity, nanos))
}

/// Inverse of `time_key_for_snapshot_key`.
pub fn snapshot_key_for_time_key(time_key: &[u8]) -> Option<Vec<u8>> {
    let (nanos, entity) = (time_key.get(..8)?, time_key.get(8..)?);
    let mut out = Vec::with_capacity(time_key.len());
    out.extend_from_slice(entity);
    out.extend_from_slice(nanos);
    Some(out)
}

/// Inclusive time index range covering every entity in `[from, to]`.
pub fn time_index_bounds(from: DateTime<Utc>, to: DateTime<Utc>) -> (Vec<u8>, Vec<u8>) {
    let lo = ordered_i64(timestamp_nanos(from)).to_vec();
    let mut hi = ordered_i64(timestamp_nanos(to)).to_vec();
    hi.extend_from_slice(&[0xFF; 9]);
    (lo, hi)
}

/// `[period tag][type tag][entity id BE][period start day BE]`
pub fn aggregate_key(key: EntityKey, period: PeriodType, period_start: NaiveDate) -> Vec<u8> {
    let mut out = aggregate_prefix(key, period);
    out.extend_from_slice(&ordered_i32(period_start.num_days_from_ce()));
    out
}

pub fn aggregate_prefix(key: EntityKey, period: PeriodType) -> Vec<u8> {
    let mut out = Vec::with_capacity(14);
    out.push(period.tag());
    out.extend_from_slice(&entity_prefix(key));
    out
}

pub fn lifecycle_key(series_id: u64) -> [u8; 8] {
    series_id.to_be_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_snapshot_keys_sort_chronologically() {
        let k = EntityKey::character(7);
        let early = Utc.with_ymd_and_hms(1960, 1, 1, 0, 0, 0).unwrap();
        let mid = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let late = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        assert!(snapshot_key(k, early) < snapshot_key(k, mid));
        assert!(snapshot_key(k, mid) < snapshot_key(k, late));
    }

    #[test]
    fn test_snapshot_keys_group_by_entity() {
        let ts = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = snapshot_key(EntityKey::character(1), ts);
        let b = snapshot_key(EntityKey::character(2), ts);
        assert!(a.starts_with(&entity_prefix(EntityKey::character(1))));
        assert!(a < b);
    }

    #[test]
    fn test_time_keys_sort_across_entities() {
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let t2 = Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap();
        // A later instant sorts after every entity at an earlier one
        assert!(snapshot_time_key(EntityKey::media(9), t1) < snapshot_time_key(EntityKey::character(1), t2));

        let (lo, hi) = time_index_bounds(t1, t1);
        let k = snapshot_time_key(EntityKey::media(u64::MAX), t1);
        assert!(lo <= k && k <= hi);
        assert!(snapshot_time_key(EntityKey::character(1), t2) > hi);
    }

    #[test]
    fn test_time_key_maps_back_to_snapshot_key() {
        let ts = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        let key = EntityKey::character(42);
        let primary = snapshot_key(key, ts);
        let secondary = time_key_for_snapshot_key(&primary).unwrap();
        assert_eq!(secondary, snapshot_time_key(key, ts));
        assert_eq!(snapshot_key_for_time_key(&secondary), Some(primary.clone()));
        assert_eq!(snapshot_key_nanos(&primary), Some(timestamp_nanos(ts)));
        assert_eq!(snapshot_key_nanos(&[1, 2]), None);
    }

    #[test]
    fn test_aggregate_keys_sort_by_start() {
        let k = EntityKey::media(3);
        let a = aggregate_key(k, PeriodType::Daily, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        let b = aggregate_key(k, PeriodType::Daily, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap());
        assert!(a < b);
        assert!(a.starts_with(&aggregate_prefix(k, PeriodType::Daily)));
    }
}
