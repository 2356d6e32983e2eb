//! Hand-built sFlow v5 datagrams for integration tests

#![allow(dead_code)]

use std::net::IpAddr;

/// Counter values carried by one generic interface record
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
    pub if_index: u32,
    pub in_octets: u64,
    pub in_ucast: u32,
    pub in_mcast: u32,
    pub in_bcast: u32,
    pub out_octets: u64,
    pub out_ucast: u32,
    pub out_mcast: u32,
    pub out_bcast: u32,
}

impl Counters {
    pub fn inbound(if_index: u32, in_octets: u64, in_packets: u32) -> Self {
        Self {
            if_index,
            in_octets,
            in_ucast: in_packets,
            ..Self::default()
        }
    }
}

/// `(format, length)` header followed by the body
pub fn entry(format: u32, body: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 + body.len());
    buf.extend_from_slice(&format.to_be_bytes());
    buf.extend_from_slice(&(body.len() as u32).to_be_bytes());
    buf.extend_from_slice(body);
    buf
}

fn put_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + 4].copy_from_slice(&value.to_be_bytes());
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + 8].copy_from_slice(&value.to_be_bytes());
}

pub fn counter_sample(counters: Counters) -> Vec<u8> {
    let mut record = vec![0u8; 88];
    put_u32(&mut record, 0, counters.if_index);
    put_u64(&mut record, 24, counters.in_octets);
    put_u32(&mut record, 32, counters.in_ucast);
    put_u32(&mut record, 36, counters.in_mcast);
    put_u32(&mut record, 40, counters.in_bcast);
    put_u64(&mut record, 56, counters.out_octets);
    put_u32(&mut record, 64, counters.out_ucast);
    put_u32(&mut record, 68, counters.out_mcast);
    put_u32(&mut record, 72, counters.out_bcast);

    let mut body = vec![0u8; 12];
    put_u32(&mut body, 4, counters.if_index);
    put_u32(&mut body, 8, 1);
    body.extend_from_slice(&entry(1, &record));
    entry(2, &body)
}

/// Flow sample with one raw packet header record per frame length
pub fn flow_sample(sampling_rate: u32, frame_lengths: &[u32]) -> Vec<u8> {
    let mut body = vec![0u8; 32];
    put_u32(&mut body, 8, sampling_rate);
    put_u32(&mut body, 28, frame_lengths.len() as u32);
    for &frame_length in frame_lengths {
        let mut header = vec![0u8; 16];
        put_u32(&mut header, 0, 1);
        put_u32(&mut header, 4, frame_length);
        body.extend_from_slice(&entry(1, &header));
    }
    entry(1, &body)
}

pub fn datagram_from(agent: IpAddr, version: u32, samples: &[Vec<u8>]) -> Vec<u8> {
    let mut buf = Vec::new();
    buf.extend_from_slice(&version.to_be_bytes());
    match agent {
        IpAddr::V4(addr) => {
            buf.extend_from_slice(&1u32.to_be_bytes());
            buf.extend_from_slice(&addr.octets());
        }
        IpAddr::V6(addr) => {
            buf.extend_from_slice(&2u32.to_be_bytes());
            buf.extend_from_slice(&addr.octets());
        }
    }
    // sub-agent id, sequence number, uptime
    for word in [0u32, 1, 60_000] {
        buf.extend_from_slice(&word.to_be_bytes());
    }
    buf.extend_from_slice(&(samples.len() as u32).to_be_bytes());
    for sample in samples {
        buf.extend_from_slice(sample);
    }
    buf
}

/// IPv4-agent sFlow v5 datagram
pub fn datagram(samples: &[Vec<u8>]) -> Vec<u8> {
    datagram_from([192, 0, 2, 1].into(), 5, samples)
}
