use super::decode_transport::{decode_ports, TransportPorts};
use super::error::{DecodeError, DecodeResult, HeaderLayer};
use log::trace;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::sync::Arc;

// 以太网相关常量
pub const ETHERNET_HEADER_LEN: usize = 14;
const ETHERTYPE_OFFSET: usize = 12;
pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86dd;

// IP 相关常量
pub const IPV4_MIN_HEADER_LEN: usize = 20;
pub const IPV6_HEADER_LEN: usize = 40;
const IPV4_PROTOCOL_OFFSET: usize = 9;
const IPV4_SRC_OFFSET: usize = 12;
const IPV4_DST_OFFSET: usize = 16;
const IPV6_NEXT_HEADER_OFFSET: usize = 6;
const IPV6_SRC_OFFSET: usize = 8;
const IPV6_DST_OFFSET: usize = 24;

const IPPROTO_ICMP: u8 = 1;
const IPPROTO_TCP: u8 = 6;
const IPPROTO_UDP: u8 = 17;
const IPPROTO_ICMPV6: u8 = 58;

/// 传输层协议分类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
    Icmp,
    Other,
}

impl Protocol {
    /// 仪表盘固定的展示顺序
    pub const ALL: [Protocol; 4] = [Protocol::Tcp, Protocol::Udp, Protocol::Icmp, Protocol::Other];

    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Tcp => "TCP",
            Protocol::Udp => "UDP",
            Protocol::Icmp => "ICMP",
            Protocol::Other => "Other",
        }
    }

    /// 只有 TCP/UDP 携带端口
    pub fn has_ports(&self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }

    fn from_ipv4_tag(tag: u8) -> Self {
        match tag {
            IPPROTO_TCP => Protocol::Tcp,
            IPPROTO_UDP => Protocol::Udp,
            IPPROTO_ICMP => Protocol::Icmp,
            _ => Protocol::Other,
        }
    }

    fn from_ipv6_next_header(tag: u8) -> Self {
        match tag {
            IPPROTO_TCP => Protocol::Tcp,
            IPPROTO_UDP => Protocol::Udp,
            IPPROTO_ICMPV6 => Protocol::Icmp,
            _ => Protocol::Other,
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一个解码后的帧。构造后不再修改，由唯一的 sink 消费
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    pub source_address: IpAddr,
    pub dest_address: IpAddr,
    /// 无端口的协议（ICMP 等）为 0
    pub source_port: u16,
    pub dest_port: u16,
    pub protocol: Protocol,
    pub length: u32,
    pub interface_name: Arc<str>,
}

struct NetworkHeader {
    source: IpAddr,
    dest: IpAddr,
    header_len: usize,
    protocol: Protocol,
}

/// 解码一个以太网帧，记录长度取捕获长度
pub fn decode_frame(
    data: &[u8],
    capture_length: usize,
    interface: &Arc<str>,
) -> DecodeResult<PacketRecord> {
    let length = u32::try_from(capture_length).unwrap_or(u32::MAX);
    decode_frame_with_length(data, capture_length, length, interface)
}

/// 解码一个以太网帧，`wire_length` 为帧在链路上的原始长度
///
/// 只读取前 `capture_length` 字节；任何头部超出该范围都返回 [`DecodeError::Truncated`]。
/// 链路层固定按 14 字节以太网头部处理，其它链路类型会被错误解码。
pub fn decode_frame_with_length(
    data: &[u8],
    capture_length: usize,
    wire_length: u32,
    interface: &Arc<str>,
) -> DecodeResult<PacketRecord> {
    let frame = &data[..capture_length.min(data.len())];

    if frame.len() < ETHERNET_HEADER_LEN {
        return Err(DecodeError::Truncated {
            layer: HeaderLayer::Link,
            required: ETHERNET_HEADER_LEN,
            actual: frame.len(),
        });
    }

    let ethertype = u16::from_be_bytes([frame[ETHERTYPE_OFFSET], frame[ETHERTYPE_OFFSET + 1]]);
    let network = match ethertype {
        ETHERTYPE_IPV4 => decode_ipv4(frame)?,
        ETHERTYPE_IPV6 => decode_ipv6(frame)?,
        other => return Err(DecodeError::UnsupportedEtherType { ethertype: other }),
    };

    let ports = if network.protocol.has_ports() {
        decode_ports(frame, ETHERNET_HEADER_LEN + network.header_len)?
    } else {
        TransportPorts::default()
    };

    trace!(
        "[{}] 帧解码成功: {} {}:{} -> {}:{}",
        interface, network.protocol, network.source, ports.source, network.dest, ports.dest
    );

    Ok(PacketRecord {
        source_address: network.source,
        dest_address: network.dest,
        source_port: ports.source,
        dest_port: ports.dest,
        protocol: network.protocol,
        length: wire_length.max(u32::try_from(frame.len()).unwrap_or(u32::MAX)),
        interface_name: Arc::clone(interface),
    })
}

fn decode_ipv4(frame: &[u8]) -> DecodeResult<NetworkHeader> {
    let header = &frame[ETHERNET_HEADER_LEN..];
    if header.len() < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::Truncated {
            layer: HeaderLayer::Network,
            required: ETHERNET_HEADER_LEN + IPV4_MIN_HEADER_LEN,
            actual: frame.len(),
        });
    }

    let version = header[0] >> 4;
    if version != 4 {
        return Err(DecodeError::UnsupportedIpVersion { version });
    }

    let ihl = header[0] & 0x0f;
    let header_len = ihl as usize * 4;
    if header_len < IPV4_MIN_HEADER_LEN {
        return Err(DecodeError::InvalidHeaderLength { ihl });
    }
    // 带选项的头部同样必须完整捕获
    if header.len() < header_len {
        return Err(DecodeError::Truncated {
            layer: HeaderLayer::Network,
            required: ETHERNET_HEADER_LEN + header_len,
            actual: frame.len(),
        });
    }

    let source = Ipv4Addr::new(
        header[IPV4_SRC_OFFSET],
        header[IPV4_SRC_OFFSET + 1],
        header[IPV4_SRC_OFFSET + 2],
        header[IPV4_SRC_OFFSET + 3],
    );
    let dest = Ipv4Addr::new(
        header[IPV4_DST_OFFSET],
        header[IPV4_DST_OFFSET + 1],
        header[IPV4_DST_OFFSET + 2],
        header[IPV4_DST_OFFSET + 3],
    );

    Ok(NetworkHeader {
        source: IpAddr::V4(source),
        dest: IpAddr::V4(dest),
        header_len,
        protocol: Protocol::from_ipv4_tag(header[IPV4_PROTOCOL_OFFSET]),
    })
}

fn decode_ipv6(frame: &[u8]) -> DecodeResult<NetworkHeader> {
    let header = &frame[ETHERNET_HEADER_LEN..];
    if header.len() < IPV6_HEADER_LEN {
        return Err(DecodeError::Truncated {
            layer: HeaderLayer::Network,
            required: ETHERNET_HEADER_LEN + IPV6_HEADER_LEN,
            actual: frame.len(),
        });
    }

    let version = header[0] >> 4;
    if version != 6 {
        return Err(DecodeError::UnsupportedIpVersion { version });
    }

    let mut source = [0u8; 16];
    source.copy_from_slice(&header[IPV6_SRC_OFFSET..IPV6_SRC_OFFSET + 16]);
    let mut dest = [0u8; 16];
    dest.copy_from_slice(&header[IPV6_DST_OFFSET..IPV6_DST_OFFSET + 16]);

    // 不遍历扩展头部，扩展头部归为 Other
    Ok(NetworkHeader {
        source: IpAddr::V6(Ipv6Addr::from(source)),
        dest: IpAddr::V6(Ipv6Addr::from(dest)),
        header_len: IPV6_HEADER_LEN,
        protocol: Protocol::from_ipv6_next_header(header[IPV6_NEXT_HEADER_OFFSET]),
    })
}
