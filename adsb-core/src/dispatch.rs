//! Message dispatch: the seam between a raw demodulated frame and
//! everything downstream of it.
//!
//! [`Dispatcher::handle`] is the single place a hex message enters the
//! pipeline: it parses and CRC-checks the frame, drops exact duplicates
//! already seen in the last second, decodes the payload, assembles the
//! unified [`ModeSMessage`] record, and feeds the [`Tracker`]. Everything
//! here is synchronous and allocation-light enough to run on the consumer
//! thread per demodulated message.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::decode::decode;
use crate::frame::{parse_frame, IcaoCache, ModeFrame};
use crate::stats::Stats;
use crate::tracker::{TrackEvent, Tracker};
use crate::types::*;

/// Open-addressed duplicate-reception cache. Keyed by `(icao, timestamp)`:
/// the same transponder can and does repeat an identical message within a
/// fraction of a second when several antennas or reflections pick up the
/// same transmission, and that shouldn't count as two sightings.
///
/// Fixed 1024 slots, linear probing up to `PROBE_LIMIT` slots on collision,
/// no removal — a slot is just overwritten once its window has passed. This
/// mirrors the receive-path style of the rest of this crate: bounded,
/// allocation-free after construction, good enough at interarrival rates no
/// single Mode S transponder can exceed.
pub struct DupCache {
    slots: Vec<Option<(u32, u64)>>,
    window: f64,
    last_timestamp: Vec<f64>,
}

const DUP_CACHE_SIZE: usize = 1024;
/// Max slots probed before giving up and overwriting the home slot. Keeps
/// `is_duplicate` O(1) even under a pathological run of collisions.
const PROBE_LIMIT: usize = 8;

impl DupCache {
    pub fn new(window: f64) -> Self {
        DupCache {
            slots: vec![None; DUP_CACHE_SIZE],
            window,
            last_timestamp: vec![0.0; DUP_CACHE_SIZE],
        }
    }

    fn slot_for(icao: u32, timestamp_msg: u64) -> usize {
        let mut hasher = DefaultHasher::new();
        icao.hash(&mut hasher);
        timestamp_msg.hash(&mut hasher);
        (hasher.finish() as usize) % DUP_CACHE_SIZE
    }

    /// `true` if this exact `(icao, timestamp_msg)` pair was already seen
    /// within `window` seconds of wall-clock `now`. Registers the entry
    /// either way.
    ///
    /// Probes linearly from the home slot: a slot holding a different key
    /// that's still live (within `window`) is a genuine collision and gets
    /// skipped rather than evicted, so two distinct keys hashing to the same
    /// slot don't clobber each other. An empty or expired slot is claimed
    /// immediately. If every probed slot is occupied by a live, distinct
    /// key, the home slot is overwritten rather than growing the table.
    pub fn is_duplicate(&mut self, icao: u32, timestamp_msg: u64, now: f64) -> bool {
        let home = Self::slot_for(icao, timestamp_msg);
        for step in 0..PROBE_LIMIT {
            let idx = (home + step) % DUP_CACHE_SIZE;
            match self.slots[idx] {
                Some((slot_icao, slot_ts)) if slot_icao == icao && slot_ts == timestamp_msg => {
                    let is_dup = now - self.last_timestamp[idx] <= self.window;
                    self.last_timestamp[idx] = now;
                    return is_dup;
                }
                Some(_) if now - self.last_timestamp[idx] <= self.window => continue,
                _ => {
                    self.slots[idx] = Some((icao, timestamp_msg));
                    self.last_timestamp[idx] = now;
                    return false;
                }
            }
        }
        self.slots[home] = Some((icao, timestamp_msg));
        self.last_timestamp[home] = now;
        false
    }
}

impl Default for DupCache {
    fn default() -> Self {
        DupCache::new(1.0)
    }
}

/// Central routing point: frame parsing, duplicate suppression, decode,
/// and tracker update. One per capture session, owned by the consumer
/// thread.
pub struct Dispatcher {
    icao_cache: IcaoCache,
    dup_cache: DupCache,
    pub tracker: Tracker,
    pub stats: std::sync::Arc<Stats>,
}

impl Dispatcher {
    pub fn new(tracker: Tracker, icao_cache_ttl: f64, stats: std::sync::Arc<Stats>) -> Self {
        Dispatcher {
            icao_cache: IcaoCache::new(icao_cache_ttl),
            dup_cache: DupCache::default(),
            tracker,
            stats,
        }
    }

    /// Parse, validate, deduplicate, decode, and track one hex message.
    /// Returns the decoded message and any [`TrackEvent`]s to persist, or
    /// `None` if the frame was rejected at any stage.
    pub fn handle(
        &mut self,
        hex_str: &str,
        timestamp: f64,
        signal_level: Option<f64>,
    ) -> Option<(DecodedMsg, Vec<TrackEvent>)> {
        let frame = parse_frame(hex_str, timestamp, signal_level, true, &mut self.icao_cache)?;

        if !frame.crc_ok {
            Stats::inc(&self.stats.crc_bad);
            return None;
        }
        if frame.corrected {
            Stats::inc(&self.stats.crc_fixed);
        }

        let icao_u32 = icao_to_u32(&frame.icao);
        let ts_key = (timestamp * 1000.0).round() as u64;
        if self.dup_cache.is_duplicate(icao_u32, ts_key, timestamp) {
            Stats::inc(&self.stats.dupes_dropped);
            return None;
        }

        self.dispatch_frame(&frame)
    }

    fn dispatch_frame(&mut self, frame: &ModeFrame) -> Option<(DecodedMsg, Vec<TrackEvent>)> {
        let (msg, events) = self.tracker.update(frame);
        Some((msg?, events))
    }

    /// Build a unified record from the frame metadata plus its decoded
    /// payload, for callers (logging, external sinks) that want the
    /// single-struct view instead of the `DecodedMsg` variant.
    pub fn to_mode_s_message(frame: &ModeFrame) -> Option<ModeSMessage> {
        let decoded = decode(frame)?;
        let mut ac_flags = AcFlags::empty();
        let mut out = ModeSMessage {
            msg_bits: frame.msg_bits,
            msg_type: frame.type_code().unwrap_or(0),
            icao_addr: icao_to_u32(&frame.icao),
            addrtype: frame.addrtype,
            crc_residue: 0,
            crc_ok: frame.crc_ok,
            error_bits: frame.error_bits,
            score: frame.score,
            timestamp_msg: frame.timestamp,
            sys_timestamp_msg: 0,
            ac_flags,
            altitude_ft: None,
            squawk: None,
            callsign: None,
            category: None,
            cpr_lat: None,
            cpr_lon: None,
            cpr_odd: None,
            is_surface: false,
            speed_kts: None,
            heading_deg: None,
            vertical_rate_fpm: None,
        };

        match decoded {
            DecodedMsg::Identification(m) => {
                out.callsign = Some(m.callsign);
                out.category = Some(m.category);
                ac_flags |= AcFlags::CALLSIGN | AcFlags::CATEGORY;
            }
            DecodedMsg::Position(m) => {
                out.altitude_ft = m.altitude_ft;
                out.cpr_lat = Some(m.cpr_lat);
                out.cpr_lon = Some(m.cpr_lon);
                out.cpr_odd = Some(m.cpr_odd);
                out.is_surface = m.is_surface;
                ac_flags |= AcFlags::CPR_POSITION;
                if m.altitude_ft.is_some() {
                    ac_flags |= AcFlags::ALTITUDE;
                }
            }
            DecodedMsg::Velocity(m) => {
                out.speed_kts = m.speed_kts;
                out.heading_deg = m.heading_deg;
                out.vertical_rate_fpm = m.vertical_rate_fpm;
                ac_flags |= AcFlags::VELOCITY;
                if m.heading_deg.is_some() {
                    ac_flags |= AcFlags::HEADING;
                }
                if m.vertical_rate_fpm.is_some() {
                    ac_flags |= AcFlags::VERTICAL_RATE;
                }
            }
            DecodedMsg::Altitude(m) => {
                out.altitude_ft = m.altitude_ft;
                if m.altitude_ft.is_some() {
                    ac_flags |= AcFlags::ALTITUDE;
                }
            }
            DecodedMsg::Squawk(m) => {
                out.squawk = Some(m.squawk);
                ac_flags |= AcFlags::IDENTITY;
            }
        }

        out.ac_flags = ac_flags;
        Some(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_dispatcher() -> Dispatcher {
        let stats = std::sync::Arc::new(Stats::new());
        let tracker = Tracker::new(&crate::config::Config::default(), stats.clone());
        Dispatcher::new(tracker, 60.0, stats)
    }

    #[test]
    fn test_handle_clean_identification() {
        let mut d = make_dispatcher();
        let result = d.handle("8D4840D6202CC371C32CE0576098", 1.0, None);
        assert!(result.is_some());
        let (msg, _events) = result.unwrap();
        assert!(matches!(msg, DecodedMsg::Identification(_)));
    }

    #[test]
    fn test_handle_rejects_bad_crc() {
        let mut d = make_dispatcher();
        let mut bytes = hex_decode("8D4840D6202CC371C32CE0576098").unwrap();
        bytes[6] ^= 0xFF;
        bytes[7] ^= 0xFF;
        bytes[8] ^= 0xFF;
        let hex = hex_encode(&bytes);
        assert!(d.handle(&hex, 1.0, None).is_none());
    }

    #[test]
    fn test_exact_duplicate_within_window_is_dropped() {
        let mut d = make_dispatcher();
        let hex = "8D4840D6202CC371C32CE0576098";
        assert!(d.handle(hex, 1.000, None).is_some());
        // Same message, same rounded timestamp, arriving moments later.
        assert!(d.handle(hex, 1.0005, None).is_none());
        assert_eq!(d.stats.dupes_dropped.load(std::sync::atomic::Ordering::Relaxed), 1);
    }

    #[test]
    fn test_different_timestamp_is_not_a_duplicate() {
        let mut d = make_dispatcher();
        let hex = "8D4840D6202CC371C32CE0576098";
        assert!(d.handle(hex, 1.0, None).is_some());
        assert!(d.handle(hex, 5.0, None).is_some());
    }

    #[test]
    fn test_slot_collision_does_not_evict_other_key() {
        let mut cache = DupCache::new(1.0);
        // Hand-pick a second key whose home slot collides with the first;
        // a direct-mapped (non-probing) cache would let this second insert
        // silently clobber the first key's slot.
        let (icao_a, ts_a) = (0x4840D6u32, 1000u64);
        let home_a = DupCache::slot_for(icao_a, ts_a);

        // Search for a colliding key by scanning timestamps rather than
        // assuming a specific hash output.
        let mut colliding = None;
        for ts in 0..10_000u64 {
            if ts == ts_a {
                continue;
            }
            if DupCache::slot_for(0x123456, ts) == home_a {
                colliding = Some((0x123456u32, ts));
                break;
            }
        }
        let (icao_b, ts_b) = colliding.expect("expected a colliding key within search range");

        assert!(!cache.is_duplicate(icao_a, ts_a, 0.0));
        assert!(!cache.is_duplicate(icao_b, ts_b, 0.0));
        // Both keys, inserted moments apart, must each still read back as
        // seen-before rather than the second eviction erasing the first.
        assert!(cache.is_duplicate(icao_a, ts_a, 0.1));
        assert!(cache.is_duplicate(icao_b, ts_b, 0.1));
    }

    #[test]
    fn test_to_mode_s_message_position() {
        let frame = crate::frame::parse_frame_uncached("8D40621D58C382D690C8AC2863A7", 1.0, None)
            .unwrap();
        let msg = Dispatcher::to_mode_s_message(&frame).unwrap();
        assert!(msg.ac_flags.contains(AcFlags::CPR_POSITION));
        assert!(msg.cpr_lat.is_some());
    }
}
