#![cfg(all(feature = "decoder", feature = "encoder"))]

use std::convert::TryFrom;

use ogg_framing::{
    BitReader, BitWriter, Lsb, Msb, PacketOut, PageSeek, StreamDecoder, StreamEncoder, SyncState,
};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

#[derive(Clone, Debug)]
struct Submitted {
    data: Vec<u8>,
    granule_position: i64,
}

#[derive(Clone, Debug, PartialEq)]
struct Received {
    data: Vec<u8>,
    granule_position: i64,
    is_bos: bool,
    is_eos: bool,
}

fn feed(sync: &mut SyncState, bytes: &[u8]) {
    let target = sync.buffer(bytes.len());
    target[..bytes.len()].copy_from_slice(bytes);
    sync.wrote(bytes.len()).unwrap();
}

/// Encodes the packets into one byte stream, one flush per packet.
fn encode_flushed(serial: u32, packets: &[Submitted]) -> Vec<u8> {
    let mut encoder = StreamEncoder::new(serial);
    let mut stream = Vec::new();

    for (i, packet) in packets.iter().enumerate() {
        let eos = i + 1 == packets.len();
        encoder
            .push_packet(&packet.data, packet.granule_position, eos)
            .unwrap();
        while let Some(page) = encoder.flush() {
            assert!(page.checksum_valid());
            stream.extend_from_slice(page.header());
            stream.extend_from_slice(page.body());
        }
    }

    stream
}

/// Decodes a byte stream fed in chunks of the given size.
fn decode_chunked(serial: u32, stream: &[u8], chunk_size: usize) -> Vec<Received> {
    let mut sync = SyncState::new();
    let mut decoder = StreamDecoder::new(serial);
    let mut received = Vec::new();

    for chunk in stream.chunks(chunk_size) {
        feed(&mut sync, chunk);

        while let Some(page) = sync.page_out() {
            decoder.page_in(&page).unwrap();
        }

        loop {
            match decoder.packet_out() {
                PacketOut::Packet(packet) => received.push(Received {
                    data: packet.data().to_vec(),
                    granule_position: packet.granule_position(),
                    is_bos: packet.is_bos(),
                    is_eos: packet.is_eos(),
                }),
                PacketOut::NeedData => break,
                PacketOut::Gap => panic!("unexpected gap in a clean stream"),
            }
        }
    }

    received
}

fn boundary_packets() -> Vec<Submitted> {
    let mut rng = SmallRng::seed_from_u64(0x0661);
    let mut packets = Vec::new();

    // Lengths around every lacing boundary plus a page-spanning one.
    for (i, len) in [0, 1, 254, 255, 256, 510, 4096, 65_025, 70_000]
        .iter()
        .enumerate()
    {
        let data = (0..*len).map(|_| rng.random()).collect();
        packets.push(Submitted {
            data,
            granule_position: i64::try_from(i).unwrap() * 960,
        });
    }

    packets
}

#[test]
fn roundtrip_preserves_packets() {
    let packets = boundary_packets();
    let stream = encode_flushed(0x1234_5678, &packets);
    let received = decode_chunked(0x1234_5678, &stream, 4096);

    assert_eq!(received.len(), packets.len());
    for (i, (got, want)) in received.iter().zip(packets.iter()).enumerate() {
        assert_eq!(got.data, want.data, "packet {} body differs", i);
        assert_eq!(got.granule_position, want.granule_position);
        assert_eq!(got.is_bos, i == 0);
        assert_eq!(got.is_eos, i + 1 == packets.len());
    }
}

#[test]
fn roundtrip_random_packet_sizes() {
    let mut rng = SmallRng::seed_from_u64(0x5EED);
    let packets: Vec<Submitted> = (0..64)
        .map(|i| {
            let len = rng.random_range(0..8192);
            Submitted {
                data: (0..len).map(|_| rng.random()).collect(),
                granule_position: i * 480,
            }
        })
        .collect();

    let stream = encode_flushed(0xABCD_0001, &packets);
    let received = decode_chunked(0xABCD_0001, &stream, 1021);

    assert_eq!(received.len(), packets.len());
    for (got, want) in received.iter().zip(packets.iter()) {
        assert_eq!(got.data, want.data);
        assert_eq!(got.granule_position, want.granule_position);
    }
}

#[test]
fn sync_is_chunking_independent() {
    let packets = boundary_packets();
    let stream = encode_flushed(0x0F0F_0F0F, &packets);

    let whole = decode_chunked(0x0F0F_0F0F, &stream, stream.len());
    let medium = decode_chunked(0x0F0F_0F0F, &stream, 4096);
    let tiny = decode_chunked(0x0F0F_0F0F, &stream, 1);

    assert_eq!(whole, medium);
    assert_eq!(whole, tiny);
}

#[test]
fn opportunistic_paging_preserves_bodies() {
    let mut rng = SmallRng::seed_from_u64(0xB0D1);
    let packets: Vec<Submitted> = (0..128)
        .map(|i| {
            let len = rng.random_range(0..2048);
            Submitted {
                data: (0..len).map(|_| rng.random()).collect(),
                granule_position: i * 441,
            }
        })
        .collect();

    let mut encoder = StreamEncoder::new(0x600D);
    let mut stream = Vec::new();
    for packet in &packets {
        encoder
            .push_packet(&packet.data, packet.granule_position, false)
            .unwrap();
        while let Some(page) = encoder.page_out() {
            stream.extend_from_slice(page.header());
            stream.extend_from_slice(page.body());
        }
    }
    while let Some(page) = encoder.flush() {
        stream.extend_from_slice(page.header());
        stream.extend_from_slice(page.body());
    }

    let received = decode_chunked(0x600D, &stream, 4096);

    assert_eq!(received.len(), packets.len());
    for (got, want) in received.iter().zip(packets.iter()) {
        assert_eq!(got.data, want.data);
        // Only the last packet completing on a page carries the page
        // granule; the others come out unannotated.
        assert!(
            got.granule_position == want.granule_position || got.granule_position == -1,
            "granule {} is neither -1 nor {}",
            got.granule_position,
            want.granule_position,
        );
    }
}

#[test]
fn garbage_between_pages_is_skipped() {
    let packets = vec![
        Submitted {
            data: vec![0x11; 300],
            granule_position: 1,
        },
        Submitted {
            data: vec![0x22; 300],
            granule_position: 2,
        },
    ];

    let mut encoder = StreamEncoder::new(0x7777);
    encoder.push_packet(&packets[0].data, 1, false).unwrap();
    let mut stream = Vec::new();
    {
        let page = encoder.flush().unwrap();
        stream.extend_from_slice(page.header());
        stream.extend_from_slice(page.body());
    }

    // Garbage with no capture pattern in it.
    let garbage_len = 57;
    stream.extend_from_slice(&vec![0xAA; garbage_len]);

    encoder.push_packet(&packets[1].data, 2, true).unwrap();
    {
        let page = encoder.flush().unwrap();
        stream.extend_from_slice(page.header());
        stream.extend_from_slice(page.body());
    }

    let mut sync = SyncState::new();
    feed(&mut sync, &stream);

    let mut pages = 0;
    let mut skipped = 0;
    loop {
        match sync.page_seek() {
            PageSeek::Page(page) => {
                assert!(page.checksum_valid());
                pages += 1;
            }
            PageSeek::Skipped(n) => skipped += n,
            PageSeek::NeedData => break,
        }
    }

    // Both surrounding pages survive and the reported loss is exactly
    // the junk in between.
    assert_eq!(pages, 2);
    assert_eq!(skipped, garbage_len);
}

#[test]
fn corrupted_page_surfaces_as_gap() {
    let mut encoder = StreamEncoder::new(0x3333);
    let mut pages = Vec::new();
    for (i, granule) in [10, 20, 30].iter().enumerate() {
        let body = vec![u8::try_from(i).unwrap(); 100];
        encoder.push_packet(&body, *granule, i == 2).unwrap();
        let page = encoder.flush().unwrap();
        let mut bytes = page.header().to_vec();
        bytes.extend_from_slice(page.body());
        pages.push(bytes);
    }

    // Flip one body byte of the middle page.
    pages[1][40] ^= 0x01;
    let stream: Vec<u8> = pages.concat();

    let mut sync = SyncState::new();
    let mut decoder = StreamDecoder::new(0x3333);
    feed(&mut sync, &stream);

    let mut events = Vec::new();
    while let Some(page) = sync.page_out() {
        decoder.page_in(&page).unwrap();
        loop {
            match decoder.packet_out() {
                PacketOut::Packet(packet) => events.push(Ok(packet.data().to_vec())),
                PacketOut::Gap => events.push(Err(())),
                PacketOut::NeedData => break,
            }
        }
    }

    assert_eq!(
        events,
        vec![Ok(vec![0x00; 100]), Err(()), Ok(vec![0x02; 100])]
    );
}

#[test]
fn single_byte_packet_stream_layout() {
    let mut encoder = StreamEncoder::new(0x0660);
    encoder.push_packet(&[0x41], 0, true).unwrap();

    let mut stream = Vec::new();
    {
        let page = encoder.flush().unwrap();
        assert_eq!(page.header().len(), 28);
        assert_eq!(page.body().len(), 1);
        stream.extend_from_slice(page.header());
        stream.extend_from_slice(page.body());
    }

    let mut sync = SyncState::new();
    let mut decoder = StreamDecoder::new(0x0660);
    feed(&mut sync, &stream);

    let page = sync.page_out().unwrap();
    assert!(page.is_bos());
    assert!(page.is_eos());
    assert_eq!(page.granule_position(), 0);
    decoder.page_in(&page).unwrap();

    match decoder.packet_out() {
        PacketOut::Packet(packet) => {
            assert_eq!(packet.data(), &[0x41]);
            assert!(packet.is_bos());
            assert!(packet.is_eos());
        }
        other => panic!("expected packet, got {:?}", other),
    }
}

#[test]
fn bitpack_roundtrip_both_dialects() {
    let mut rng = SmallRng::seed_from_u64(0xB175);
    let fields: Vec<(u32, usize)> = (0..2000)
        .map(|_| {
            let bits = rng.random_range(0..=32);
            let value = if bits == 0 {
                0
            } else {
                rng.random::<u32>() >> (32 - bits)
            };
            (value, bits)
        })
        .collect();

    let mut lsb = BitWriter::<Lsb>::new();
    let mut msb = BitWriter::<Msb>::new();
    for (value, bits) in &fields {
        lsb.write(*value, *bits).unwrap();
        msb.write(*value, *bits).unwrap();
    }

    let mut lsb_reader = BitReader::<Lsb>::new(lsb.data());
    let mut msb_reader = BitReader::<Msb>::new(msb.data());
    for (value, bits) in &fields {
        assert_eq!(lsb_reader.read(*bits).unwrap(), *value);
        assert_eq!(msb_reader.read(*bits).unwrap(), *value);
    }
}
