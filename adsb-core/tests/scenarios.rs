//! End-to-end scenarios spanning more than one module — CRC + framer, CPR +
//! tracker, FIFO overlap handoff — each one a concrete input/output pair
//! rather than a property.

use adsb_core::*;

fn flip_bit(hex: &str, bit_index: usize) -> String {
    let mut bytes = hex_decode(hex).unwrap();
    let byte_idx = bit_index / 8;
    let bit_in_byte = 7 - (bit_index % 8);
    bytes[byte_idx] ^= 1 << bit_in_byte;
    hex_encode(&bytes)
}

#[test]
fn scenario_1_clean_df17_identity() {
    let hex = "8D4840D6202CC371C32CE0576098";
    let mut cache = IcaoCache::new(60.0);
    let frame = parse_frame(hex, 0.0, None, true, &mut cache).expect("frame should parse");

    assert_eq!(frame.df, 17);
    assert_eq!(icao_to_u32(&frame.icao), 0x4840D6);
    assert!(frame.crc_ok);
    assert!(!frame.corrected);

    let decoded = decode(&frame).expect("should decode");
    match decoded {
        DecodedMsg::Identification(id) => {
            assert_eq!(id.callsign.trim_end(), "KLM1023");
        }
        other => panic!("expected identification message, got {other:?}"),
    }
}

#[test]
fn scenario_2_corrected_df17() {
    let clean = "8D4840D6202CC371C32CE0576098";
    let corrupted = flip_bit(clean, 40);
    assert_ne!(clean, corrupted);

    let mut cache = IcaoCache::new(60.0);
    let frame = parse_frame(&corrupted, 0.0, None, true, &mut cache)
        .expect("single-bit error should be corrected");

    assert!(frame.crc_ok);
    assert!(frame.corrected);
    assert_eq!(frame.error_bits, 1);
    assert_eq!(icao_to_u32(&frame.icao), 0x4840D6);

    let fixed_hex = hex_encode(&frame.raw);
    assert_eq!(fixed_hex, clean.to_ascii_uppercase());
}

#[test]
fn scenario_3_global_cpr_pair() {
    let pos = cpr::global_decode(0x05C1D, 0x6C66D, 0x1EB0F, 0x48A04, 0.0, 2.0)
        .expect("paired even/odd frames within 10s should decode");

    assert!((pos.0 - 52.2572).abs() < 0.001, "lat = {}", pos.0);
    assert!((pos.1 - 3.91937).abs() < 0.001, "lon = {}", pos.1);
}

#[test]
fn scenario_4_cpr_rejects_stale_pair() {
    let pos = cpr::global_decode(0x05C1D, 0x6C66D, 0x1EB0F, 0x48A04, 0.0, 11.0);
    assert!(pos.is_none(), "pairs more than 10s apart must not decode");
}

#[test]
fn scenario_5_overlap_preservation() {
    let overlap = 256;
    let fifo = Fifo::new(2, 1024, overlap);

    let idx1 = fifo.acquire(std::time::Duration::ZERO).unwrap();
    fifo.with_buffer(idx1, |buf| {
        for (i, sample) in buf.data[overlap..1024].iter_mut().enumerate() {
            *sample = (i + 1) as u16;
        }
        buf.valid_length = 1024;
    });
    fifo.enqueue(idx1);

    let idx2 = fifo.acquire(std::time::Duration::ZERO).unwrap();
    fifo.with_buffer(idx2, |buf| {
        for (i, sample) in buf.data[overlap..1024].iter_mut().enumerate() {
            *sample = 1000 + i as u16;
        }
        buf.valid_length = 1024;
    });
    fifo.enqueue(idx2);

    let first_idx = fifo.dequeue(std::time::Duration::ZERO).unwrap();
    let tail: Vec<u16> = fifo.with_buffer(first_idx, |buf| buf.data[768..1024].to_vec());
    fifo.release(first_idx);

    let second_idx = fifo.dequeue(std::time::Duration::ZERO).unwrap();
    let head: Vec<u16> = fifo.with_buffer(second_idx, |buf| buf.data[0..overlap].to_vec());
    fifo.release(second_idx);

    assert_eq!(head, tail);
}

#[test]
fn scenario_6_discontinuous_overlap_is_zeroed() {
    let overlap = 256;
    let fifo = Fifo::new(2, 1024, overlap);

    let idx1 = fifo.acquire(std::time::Duration::ZERO).unwrap();
    fifo.with_buffer(idx1, |buf| {
        for sample in buf.data[overlap..1024].iter_mut() {
            *sample = 7;
        }
        buf.valid_length = 1024;
    });
    fifo.enqueue(idx1);
    let idx1 = fifo.dequeue(std::time::Duration::ZERO).unwrap();
    fifo.release(idx1);

    let idx2 = fifo.acquire(std::time::Duration::ZERO).unwrap();
    fifo.with_buffer(idx2, |buf| {
        buf.flags.insert(MagBufFlags::DISCONTINUOUS);
        buf.dropped = 2048;
        for sample in buf.data[overlap..1024].iter_mut() {
            *sample = 9;
        }
        buf.valid_length = 1024;
    });
    fifo.enqueue(idx2);

    let idx2 = fifo.dequeue(std::time::Duration::ZERO).unwrap();
    fifo.with_buffer(idx2, |buf| {
        assert!(buf.flags.contains(MagBufFlags::DISCONTINUOUS));
        assert_eq!(buf.dropped, 2048);
        assert!(buf.data[0..overlap].iter().all(|&s| s == 0));
    });
    fifo.release(idx2);
}
