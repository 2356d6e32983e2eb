//! sFlow v5 datagram decoder
//!
//! Parses one UDP payload into the samples it carries. Only the two record
//! layouts the rate engine needs are interpreted:
//!
//! - counter sample, record type 1: generic interface counters
//! - flow sample, record type 1: raw packet header (frame length only)
//!
//! Everything else is skipped by its declared length. Decoding is purely
//! structural: every field read is bounds-checked against the enclosing
//! sample, and a sample that overruns the datagram stops the decode while
//! keeping the samples already decoded.

use byteorder::{BigEndian, ByteOrder};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use tracing::debug;

/// Only sFlow version 5 datagrams are accepted
pub const SFLOW_VERSION: u32 = 5;

/// Agent address types
const ADDRESS_IPV4: u32 = 1;
const ADDRESS_IPV6: u32 = 2;

/// Sample formats live in the low 12 bits; the upper bits carry the enterprise
const FORMAT_MASK: u32 = 0x0fff;
const SAMPLE_FLOW: u32 = 1;
const SAMPLE_COUNTER: u32 = 2;

/// Inner record types
const COUNTER_GENERIC_INTERFACE: u32 = 1;
const FLOW_RAW_PACKET_HEADER: u32 = 1;

/// sequence, source id, record count
const COUNTER_SAMPLE_HEADER_LEN: usize = 12;
/// sequence, source id, rate, pool, drops, input, output, record count
const FLOW_SAMPLE_HEADER_LEN: usize = 32;

const GENERIC_INTERFACE_LEN: usize = 88;
/// header protocol + frame length
const RAW_PACKET_HEADER_MIN_LEN: usize = 8;

/// Full-interface counter poll at one point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CounterRecord {
    pub interface_id: u32,
    pub in_octets: u64,
    pub out_octets: u64,
    /// unicast + multicast + broadcast
    pub in_packets: u64,
    /// unicast + multicast + broadcast
    pub out_packets: u64,
}

/// One sampled packet, standing for `sampling_rate` real packets
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowRecord {
    pub sampling_rate: u32,
    pub frame_length: u32,
}

impl FlowRecord {
    /// Estimated packets represented by this sample
    pub fn packets(&self) -> u64 {
        u64::from(self.sampling_rate)
    }

    /// Estimated bytes represented by this sample
    pub fn bytes(&self) -> u64 {
        u64::from(self.frame_length) * u64::from(self.sampling_rate)
    }
}

/// Typed record extracted from a sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record {
    Counter(CounterRecord),
    Flow(FlowRecord),
}

/// Sample format after masking off the enterprise bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Flow,
    Counter,
    /// Any other format, carried with its raw value
    Other(u32),
}

impl SampleKind {
    fn from_format(format: u32) -> Self {
        match format & FORMAT_MASK {
            SAMPLE_FLOW => SampleKind::Flow,
            SAMPLE_COUNTER => SampleKind::Counter,
            _ => SampleKind::Other(format),
        }
    }
}

/// One decoded sample
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sample {
    pub kind: SampleKind,
    /// Declared body length in bytes
    pub length: u32,
    /// Interpreted records; always empty for [`SampleKind::Other`]
    pub records: Vec<Record>,
}

/// Datagram header fields preceding the sample list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatagramHeader {
    pub version: u32,
    pub agent_address: IpAddr,
    pub sub_agent_id: u32,
    pub sequence_number: u32,
    pub uptime_ms: u32,
    pub sample_count: u32,
    /// Offset of the first sample header
    samples_offset: usize,
}

impl DatagramHeader {
    /// Parses the datagram header; `None` when the datagram must be dropped
    pub fn parse(buf: &[u8]) -> Option<Self> {
        let version = read_u32(buf, 0)?;
        if version != SFLOW_VERSION {
            return None;
        }

        let (agent_address, mut offset) = match read_u32(buf, 4)? {
            ADDRESS_IPV4 => {
                let octets: [u8; 4] = buf.get(8..12)?.try_into().ok()?;
                (IpAddr::V4(Ipv4Addr::from(octets)), 12)
            }
            ADDRESS_IPV6 => {
                let octets: [u8; 16] = buf.get(8..24)?.try_into().ok()?;
                (IpAddr::V6(Ipv6Addr::from(octets)), 24)
            }
            _ => return None,
        };

        let sub_agent_id = read_u32(buf, offset)?;
        let sequence_number = read_u32(buf, offset + 4)?;
        let uptime_ms = read_u32(buf, offset + 8)?;
        let sample_count = read_u32(buf, offset + 12)?;
        offset += 16;

        Some(Self {
            version,
            agent_address,
            sub_agent_id,
            sequence_number,
            uptime_ms,
            sample_count,
            samples_offset: offset,
        })
    }
}

/// Decodes one datagram into its samples.
///
/// Returns an empty list when the version is not 5 or the header is
/// truncated. A sample whose header or declared length runs past the end of
/// the datagram ends decoding; earlier samples are kept.
pub fn decode(datagram: &[u8]) -> Vec<Sample> {
    let Some(header) = DatagramHeader::parse(datagram) else {
        return Vec::new();
    };

    // sample_count is attacker controlled; never preallocate from it blindly
    let mut samples = Vec::with_capacity((header.sample_count as usize).min(16));
    let mut offset = header.samples_offset;

    for index in 0..header.sample_count {
        let Some((format, length, body)) = next_entry(datagram, offset) else {
            debug!(
                index,
                declared = header.sample_count,
                "sFlow sample overruns datagram, stopping"
            );
            break;
        };
        offset += 8 + body.len();

        let kind = SampleKind::from_format(format);
        let records = match kind {
            SampleKind::Counter => decode_counter_sample(body),
            SampleKind::Flow => decode_flow_sample(body),
            SampleKind::Other(_) => Vec::new(),
        };

        samples.push(Sample {
            kind,
            length,
            records,
        });
    }

    samples
}

fn decode_counter_sample(body: &[u8]) -> Vec<Record> {
    let Some(count) = read_u32(body, 8) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for_each_record(body, COUNTER_SAMPLE_HEADER_LEN, count, |kind, data| {
        if kind != COUNTER_GENERIC_INTERFACE {
            return;
        }
        match parse_generic_interface(data) {
            Some(record) => records.push(Record::Counter(record)),
            None => debug!(len = data.len(), "short generic interface record skipped"),
        }
    });
    records
}

fn decode_flow_sample(body: &[u8]) -> Vec<Record> {
    if body.len() < FLOW_SAMPLE_HEADER_LEN {
        return Vec::new();
    }
    let (Some(sampling_rate), Some(count)) = (read_u32(body, 8), read_u32(body, 28)) else {
        return Vec::new();
    };

    let mut records = Vec::new();
    for_each_record(body, FLOW_SAMPLE_HEADER_LEN, count, |kind, data| {
        if kind != FLOW_RAW_PACKET_HEADER || data.len() < RAW_PACKET_HEADER_MIN_LEN {
            return;
        }
        if let Some(frame_length) = read_u32(data, 4) {
            records.push(Record::Flow(FlowRecord {
                sampling_rate,
                frame_length,
            }));
        }
    });
    records
}

fn parse_generic_interface(data: &[u8]) -> Option<CounterRecord> {
    if data.len() < GENERIC_INTERFACE_LEN {
        return None;
    }

    let sum3 = |at: usize| -> Option<u64> {
        Some(
            u64::from(read_u32(data, at)?)
                + u64::from(read_u32(data, at + 4)?)
                + u64::from(read_u32(data, at + 8)?),
        )
    };

    Some(CounterRecord {
        interface_id: read_u32(data, 0)?,
        in_octets: read_u64(data, 24)?,
        in_packets: sum3(32)?,
        out_octets: read_u64(data, 56)?,
        out_packets: sum3(64)?,
    })
}

/// Walks `count` `(type, length, body)` records starting at `start`.
///
/// A record that would run past the end of `buf` ends the walk.
fn for_each_record(buf: &[u8], start: usize, count: u32, mut visit: impl FnMut(u32, &[u8])) {
    let mut offset = start;
    for _ in 0..count {
        let Some((kind, _, data)) = next_entry(buf, offset) else {
            debug!(offset, "sFlow record overruns its sample, skipping the rest");
            return;
        };
        offset += 8 + data.len();
        visit(kind, data);
    }
}

/// Reads a `(type, length)` header at `offset` and returns the body it
/// declares, provided the body fits inside `buf`.
fn next_entry(buf: &[u8], offset: usize) -> Option<(u32, u32, &[u8])> {
    let kind = read_u32(buf, offset)?;
    let length = read_u32(buf, offset + 4)?;
    let start = offset + 8;
    let end = start.checked_add(length as usize)?;
    Some((kind, length, buf.get(start..end)?))
}

fn read_u32(buf: &[u8], offset: usize) -> Option<u32> {
    buf.get(offset..offset.checked_add(4)?).map(BigEndian::read_u32)
}

fn read_u64(buf: &[u8], offset: usize) -> Option<u64> {
    buf.get(offset..offset.checked_add(8)?).map(BigEndian::read_u64)
}
