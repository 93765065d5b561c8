use std::fmt;
use thiserror::Error;

/// 出错的头部所在层次
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderLayer {
    /// 链路层（以太网）
    Link,
    /// 网络层（IPv4/IPv6）
    Network,
    /// 传输层（TCP/UDP 端口）
    Transport,
}

impl fmt::Display for HeaderLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HeaderLayer::Link => write!(f, "链路层"),
            HeaderLayer::Network => write!(f, "网络层"),
            HeaderLayer::Transport => write!(f, "传输层"),
        }
    }
}

/// 解码错误类型
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// 捕获长度不足以读取声明的头部
    #[error("数据包长度不足: {layer}需要 {required} 字节，实际 {actual} 字节")]
    Truncated {
        layer: HeaderLayer,
        required: usize,
        actual: usize,
    },

    /// 以太网负载不是 IP
    #[error("不支持的以太网类型: 0x{ethertype:04x}")]
    UnsupportedEtherType {
        ethertype: u16,
    },

    /// 以太网类型与 IP 版本字段不一致
    #[error("不支持的IP版本: {version}")]
    UnsupportedIpVersion {
        version: u8,
    },

    /// IPv4 头部长度字段小于 5
    #[error("无效的IP头部长度: {ihl}")]
    InvalidHeaderLength {
        ihl: u8,
    },
}

impl DecodeError {
    /// 是否由截断的捕获引起
    pub fn is_truncated(&self) -> bool {
        matches!(self, DecodeError::Truncated { .. })
    }
}

/// 结果类型别名
pub type DecodeResult<T> = Result<T, DecodeError>;
