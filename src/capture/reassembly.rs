use crate::flow::FlowFactory;
use crate::PipeWriter;
use bytes::Bytes;
use log::{debug, trace, warn};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

// pcap DLT values this sniffer understands.
const DLT_EN10MB: i32 = 1;
const DLT_RAW: i32 = 101;
const DLT_LINUX_SLL: i32 = 113;
const DLT_IPV4: i32 = 228;
const DLT_IPV6: i32 = 229;

const ETHERTYPE_IPV4: u16 = 0x0800;
const ETHERTYPE_VLAN: u16 = 0x8100;
const ETHERTYPE_IPV6: u16 = 0x86DD;

const IP_PROTO_TCP: u8 = 6;

const TCP_FIN: u8 = 0x01;
const TCP_SYN: u8 = 0x02;
const TCP_RST: u8 = 0x04;

/// Cap on out-of-order segments buffered across all flows, so a
/// pathological capture cannot exhaust memory.
pub const MAX_BUFFERED_SEGMENTS: usize = 4096;

/// Transport 4-tuple identifying one direction of a TCP connection.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct FlowKey {
    pub src: IpAddr,
    pub src_port: u16,
    pub dst: IpAddr,
    pub dst_port: u16,
}

impl fmt::Display for FlowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{} -> {}:{}",
            self.src, self.src_port, self.dst, self.dst_port
        )
    }
}

struct TcpSegment<'a> {
    key: FlowKey,
    seq: u32,
    syn: bool,
    fin: bool,
    rst: bool,
    payload: &'a [u8],
}

struct FlowState {
    writer: Option<PipeWriter>,
    next_seq: u32,
    /// Future segments keyed by absolute sequence number
    pending: BTreeMap<u32, Vec<u8>>,
    finished: bool,
}

impl FlowState {
    fn new(writer: PipeWriter, next_seq: u32) -> Self {
        FlowState {
            writer: Some(writer),
            next_seq,
            pending: BTreeMap::new(),
            finished: false,
        }
    }

    /// Push contiguous bytes into the flow worker, blocking while its pipe
    /// is full. A write failure means the worker is gone; the rest of the
    /// flow is swallowed.
    fn deliver(&mut self, data: &[u8]) {
        self.next_seq = self.next_seq.wrapping_add(data.len() as u32);
        if let Some(writer) = &self.writer {
            if writer.blocking_write(Bytes::copy_from_slice(data)).is_err() {
                self.writer = None;
            }
        }
    }

    /// Deliver buffered segments that have become contiguous, trimming any
    /// overlap with already-delivered data.
    fn drain_pending(&mut self, buffered: &mut usize) {
        loop {
            let Some(entry) = self.pending.first_entry() else {
                break;
            };
            let delta = entry.key().wrapping_sub(self.next_seq) as i32;
            if delta > 0 {
                break;
            }
            let data = entry.remove();
            *buffered = buffered.saturating_sub(1);
            let skip = delta.unsigned_abs() as usize;
            if skip < data.len() {
                self.deliver(&data[skip..]);
            }
        }
    }

    fn close(&mut self, buffered: &mut usize) {
        self.drain_pending(buffered);
        *buffered = buffered.saturating_sub(self.pending.len());
        self.pending.clear();
        self.finished = true;
        // Dropping the writer reads as clean end-of-stream in the worker.
        self.writer = None;
    }
}

/// Orders each TCP flow's bytes and feeds them to the writer obtained from
/// the flow factory.
///
/// Both directions of a connection become separate flows, exactly as the
/// demultiplexer expects: the server-to-client direction never carries a
/// `connect`, so it simply produces nothing.
pub struct TcpReassembler<F: FlowFactory> {
    factory: F,
    flows: HashMap<FlowKey, FlowState>,
    buffered_segments: usize,
    max_buffered_segments: usize,
}

impl<F: FlowFactory> TcpReassembler<F> {
    pub fn new(factory: F, max_buffered_segments: usize) -> Self {
        TcpReassembler {
            factory,
            flows: HashMap::new(),
            buffered_segments: 0,
            max_buffered_segments,
        }
    }

    /// Feed one captured frame; anything that is not TCP is ignored.
    pub fn handle_frame(&mut self, datalink: i32, frame: &[u8]) {
        if let Some(segment) = parse_frame(datalink, frame) {
            self.handle_segment(segment);
        }
    }

    fn handle_segment(&mut self, segment: TcpSegment<'_>) {
        let TcpReassembler {
            factory,
            flows,
            buffered_segments,
            max_buffered_segments,
        } = self;

        let flow = flows.entry(segment.key.clone()).or_insert_with(|| {
            let writer = factory.new_flow(&segment.key.to_string());
            let isn = if segment.syn {
                segment.seq.wrapping_add(1)
            } else {
                segment.seq
            };
            FlowState::new(writer, isn)
        });

        if flow.finished {
            trace!("{}: segment after close dropped", segment.key);
            return;
        }

        if !segment.payload.is_empty() {
            let delta = segment.seq.wrapping_sub(flow.next_seq) as i32;
            if delta <= 0 {
                let skip = delta.unsigned_abs() as usize;
                if skip < segment.payload.len() {
                    flow.deliver(&segment.payload[skip..]);
                    flow.drain_pending(buffered_segments);
                } else {
                    trace!("{}: duplicate segment dropped", segment.key);
                }
            } else if *buffered_segments >= *max_buffered_segments {
                warn!("{}: reassembly buffer full, dropping segment", segment.key);
            } else if flow
                .pending
                .insert(segment.seq, segment.payload.to_vec())
                .is_none()
            {
                *buffered_segments += 1;
            }
        } else if segment.syn {
            flow.next_seq = segment.seq.wrapping_add(1);
        }

        if segment.fin || segment.rst {
            debug!(
                "{}: {}",
                segment.key,
                if segment.rst { "reset" } else { "fin" }
            );
            flow.close(buffered_segments);
        }
    }

    /// Force-close every flow, including ones mid-message, and hand the
    /// factory back so the caller can wait for the workers.
    pub fn flush_all(mut self) -> F {
        for (key, mut flow) in self.flows.drain() {
            if !flow.finished {
                debug!("{}: flushed at end of capture", key);
            }
            flow.close(&mut self.buffered_segments);
        }
        self.factory
    }
}

fn parse_frame(datalink: i32, frame: &[u8]) -> Option<TcpSegment<'_>> {
    match datalink {
        DLT_EN10MB => parse_ethernet(frame),
        DLT_LINUX_SLL => {
            // 16-byte cooked header; the last two bytes carry the ethertype.
            if frame.len() < 16 {
                return None;
            }
            let proto = u16::from_be_bytes([frame[14], frame[15]]);
            parse_ip_by_ethertype(proto, &frame[16..])
        }
        DLT_RAW | DLT_IPV4 | DLT_IPV6 => parse_ip(frame),
        other => {
            trace!("unsupported datalink {}", other);
            None
        }
    }
}

fn parse_ethernet(frame: &[u8]) -> Option<TcpSegment<'_>> {
    if frame.len() < 14 {
        return None;
    }
    let mut ethertype = u16::from_be_bytes([frame[12], frame[13]]);
    let mut offset = 14;
    if ethertype == ETHERTYPE_VLAN {
        if frame.len() < 18 {
            return None;
        }
        ethertype = u16::from_be_bytes([frame[16], frame[17]]);
        offset = 18;
    }
    parse_ip_by_ethertype(ethertype, &frame[offset..])
}

fn parse_ip_by_ethertype(ethertype: u16, data: &[u8]) -> Option<TcpSegment<'_>> {
    match ethertype {
        ETHERTYPE_IPV4 => parse_ipv4(data),
        ETHERTYPE_IPV6 => parse_ipv6(data),
        _ => None,
    }
}

fn parse_ip(data: &[u8]) -> Option<TcpSegment<'_>> {
    match data.first()? >> 4 {
        4 => parse_ipv4(data),
        6 => parse_ipv6(data),
        _ => None,
    }
}

fn parse_ipv4(data: &[u8]) -> Option<TcpSegment<'_>> {
    if data.len() < 20 {
        return None;
    }
    let header_len = usize::from(data[0] & 0x0F) * 4;
    if header_len < 20 || data.len() < header_len {
        return None;
    }
    if data[9] != IP_PROTO_TCP {
        return None;
    }
    // Non-first fragments carry no TCP header to match on.
    if u16::from_be_bytes([data[6], data[7]]) & 0x1FFF != 0 {
        return None;
    }
    let total_len = usize::from(u16::from_be_bytes([data[2], data[3]]));
    let end = total_len.clamp(header_len, data.len());
    let src = IpAddr::V4(Ipv4Addr::new(data[12], data[13], data[14], data[15]));
    let dst = IpAddr::V4(Ipv4Addr::new(data[16], data[17], data[18], data[19]));
    parse_tcp(src, dst, &data[header_len..end])
}

fn parse_ipv6(data: &[u8]) -> Option<TcpSegment<'_>> {
    if data.len() < 40 {
        return None;
    }
    // Extension headers are not walked; TCP directly after the fixed header.
    if data[6] != IP_PROTO_TCP {
        return None;
    }
    let payload_len = usize::from(u16::from_be_bytes([data[4], data[5]]));
    let end = (40 + payload_len).min(data.len());
    let mut addr = [0u8; 16];
    addr.copy_from_slice(&data[8..24]);
    let src = IpAddr::V6(Ipv6Addr::from(addr));
    addr.copy_from_slice(&data[24..40]);
    let dst = IpAddr::V6(Ipv6Addr::from(addr));
    parse_tcp(src, dst, &data[40..end])
}

fn parse_tcp(src: IpAddr, dst: IpAddr, data: &[u8]) -> Option<TcpSegment<'_>> {
    if data.len() < 20 {
        return None;
    }
    let data_offset = usize::from(data[12] >> 4) * 4;
    if data_offset < 20 || data.len() < data_offset {
        return None;
    }
    let flags = data[13];
    Some(TcpSegment {
        key: FlowKey {
            src,
            src_port: u16::from_be_bytes([data[0], data[1]]),
            dst,
            dst_port: u16::from_be_bytes([data[2], data[3]]),
        },
        seq: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
        syn: flags & TCP_SYN != 0,
        fin: flags & TCP_FIN != 0,
        rst: flags & TCP_RST != 0,
        payload: &data[data_offset..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{byte_pipe, PipeReader};
    use tokio::io::AsyncReadExt;

    struct TestFactory {
        flows: Vec<(String, PipeReader)>,
    }

    impl TestFactory {
        fn new() -> Self {
            TestFactory { flows: Vec::new() }
        }
    }

    impl FlowFactory for TestFactory {
        fn new_flow(&mut self, label: &str) -> PipeWriter {
            let (writer, reader) = byte_pipe(64);
            self.flows.push((label.to_string(), reader));
            writer
        }
    }

    /// Ethernet + IPv4 + TCP frame with the given flags and payload.
    fn tcp_frame(sport: u16, dport: u16, seq: u32, flags: u8, payload: &[u8]) -> Vec<u8> {
        let mut frame = vec![0u8; 12];
        frame.extend_from_slice(&ETHERTYPE_IPV4.to_be_bytes());

        let total_len = (20 + 20 + payload.len()) as u16;
        let mut ip = vec![0x45, 0];
        ip.extend_from_slice(&total_len.to_be_bytes());
        ip.extend_from_slice(&[0, 0, 0, 0]); // id, flags/frag
        ip.extend_from_slice(&[64, IP_PROTO_TCP, 0, 0]); // ttl, proto, checksum
        ip.extend_from_slice(&[10, 0, 0, 1]);
        ip.extend_from_slice(&[10, 0, 0, 2]);
        frame.extend_from_slice(&ip);

        let mut tcp = Vec::new();
        tcp.extend_from_slice(&sport.to_be_bytes());
        tcp.extend_from_slice(&dport.to_be_bytes());
        tcp.extend_from_slice(&seq.to_be_bytes());
        tcp.extend_from_slice(&0u32.to_be_bytes()); // ack
        tcp.push(5 << 4); // data offset
        tcp.push(flags);
        tcp.extend_from_slice(&[0, 0, 0, 0, 0, 0]); // window, checksum, urgent
        tcp.extend_from_slice(payload);
        frame.extend_from_slice(&tcp);

        frame
    }

    fn read_all(factory: TestFactory) -> Vec<(String, Vec<u8>)> {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async move {
            let mut out = Vec::new();
            for (label, mut reader) in factory.flows {
                let mut bytes = Vec::new();
                reader.read_to_end(&mut bytes).await.unwrap();
                out.push((label, bytes));
            }
            out
        })
    }

    #[test]
    fn test_in_order_delivery() {
        let mut asm = TcpReassembler::new(TestFactory::new(), 16);
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 100, 0, b"hello "));
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 106, 0, b"world"));

        let flows = read_all(asm.flush_all());
        assert_eq!(flows.len(), 1);
        assert_eq!(flows[0].0, "10.0.0.1:5000 -> 10.0.0.2:1935");
        assert_eq!(flows[0].1, b"hello world");
    }

    #[test]
    fn test_out_of_order_segments_reordered() {
        let mut asm = TcpReassembler::new(TestFactory::new(), 16);
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 106, 0, b"world"));
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 100, 0, b"hello "));

        let flows = read_all(asm.flush_all());
        assert_eq!(flows[0].1, b"hello world");
    }

    #[test]
    fn test_duplicate_and_overlap_trimmed() {
        let mut asm = TcpReassembler::new(TestFactory::new(), 16);
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 100, 0, b"abcd"));
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 100, 0, b"abcd"));
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 102, 0, b"cdef"));

        let flows = read_all(asm.flush_all());
        assert_eq!(flows[0].1, b"abcdef");
    }

    #[test]
    fn test_syn_advances_initial_sequence() {
        let mut asm = TcpReassembler::new(TestFactory::new(), 16);
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 99, TCP_SYN, b""));
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 100, 0, b"data"));

        let flows = read_all(asm.flush_all());
        assert_eq!(flows[0].1, b"data");
    }

    #[test]
    fn test_fin_closes_flow() {
        let mut asm = TcpReassembler::new(TestFactory::new(), 16);
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 100, 0, b"bye"));
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 103, TCP_FIN, b""));
        // Data after the close is dropped.
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 104, 0, b"late"));

        let flows = read_all(asm.flush_all());
        assert_eq!(flows[0].1, b"bye");
    }

    #[test]
    fn test_directions_are_separate_flows() {
        let mut asm = TcpReassembler::new(TestFactory::new(), 16);
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 100, 0, b"c2s"));
        let mut reply = tcp_frame(1935, 5000, 500, 0, b"s2c");
        // Swap addresses so the reply really goes the other way.
        reply[26..30].copy_from_slice(&[10, 0, 0, 2]);
        reply[30..34].copy_from_slice(&[10, 0, 0, 1]);
        asm.handle_frame(DLT_EN10MB, &reply);

        let flows = read_all(asm.flush_all());
        assert_eq!(flows.len(), 2);
    }

    #[test]
    fn test_buffer_cap_drops_future_segments() {
        let mut asm = TcpReassembler::new(TestFactory::new(), 1);
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 100, 0, b"begin"));
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 110, 0, b"later"));
        // Over the cap: dropped, not buffered.
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 120, 0, b"never"));
        asm.handle_frame(DLT_EN10MB, &tcp_frame(5000, 1935, 105, 0, b"first"));

        let flows = read_all(asm.flush_all());
        assert_eq!(flows[0].1, b"beginfirstlater");
    }

    #[test]
    fn test_non_tcp_frames_ignored() {
        let mut asm = TcpReassembler::new(TestFactory::new(), 16);
        let mut udp = tcp_frame(5000, 1935, 100, 0, b"x");
        udp[23] = 17; // ip protocol = UDP
        asm.handle_frame(DLT_EN10MB, &udp);
        asm.handle_frame(DLT_EN10MB, b"short");

        let flows = read_all(asm.flush_all());
        assert!(flows.is_empty());
    }
}
