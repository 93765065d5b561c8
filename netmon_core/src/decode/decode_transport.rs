use super::error::{DecodeError, DecodeResult, HeaderLayer};
use log::trace;

/// 读取端口所需的最小传输层字节数，TCP 与 UDP 的前 8 字节布局一致
pub const TRANSPORT_MIN_LEN: usize = 8;
const SRC_PORT_OFFSET: usize = 0;
const DST_PORT_OFFSET: usize = 2;

/// 传输层端口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransportPorts {
    pub source: u16,
    pub dest: u16,
}

/// 从帧内 `offset` 处读取 TCP/UDP 源/目的端口（大端序）
pub fn decode_ports(frame: &[u8], offset: usize) -> DecodeResult<TransportPorts> {
    let required = offset + TRANSPORT_MIN_LEN;
    if frame.len() < required {
        trace!("传输层头部被截断: offset={}, len={}", offset, frame.len());
        return Err(DecodeError::Truncated {
            layer: HeaderLayer::Transport,
            required,
            actual: frame.len(),
        });
    }

    let header = &frame[offset..required];
    Ok(TransportPorts {
        source: u16::from_be_bytes([header[SRC_PORT_OFFSET], header[SRC_PORT_OFFSET + 1]]),
        dest: u16::from_be_bytes([header[DST_PORT_OFFSET], header[DST_PORT_OFFSET + 1]]),
    })
}
