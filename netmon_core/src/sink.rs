use crate::decode::PacketRecord;
use log::warn;
use parking_lot::Mutex;
use std::io::{self, Write};

/// 解码后记录的去向，所有捕获会话并发调用
pub trait PacketSink: Send + Sync {
    fn deliver(&self, record: PacketRecord);
}

/// 直接输出模式下的一行
pub fn format_packet_line(record: &PacketRecord) -> String {
    format!(
        "[{}] Packet captured. Length: {} | Protocol: {} | From: {}:{} -> To: {}:{}",
        record.interface_name,
        record.length,
        record.protocol,
        record.source_address,
        record.source_port,
        record.dest_address,
        record.dest_port,
    )
}

/// 每条记录打印一行，行与行之间不会交错
pub struct ConsoleSink<W: Write + Send> {
    out: Mutex<W>,
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out: Mutex::new(out) }
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner()
    }
}

impl<W: Write + Send> PacketSink for ConsoleSink<W> {
    fn deliver(&self, record: PacketRecord) {
        let line = format_packet_line(&record);
        let mut out = self.out.lock();
        if let Err(e) = writeln!(out, "{}", line) {
            warn!("输出数据包信息失败: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::Protocol;
    use std::sync::Arc;

    fn record() -> PacketRecord {
        PacketRecord {
            source_address: "10.0.0.1".parse().unwrap(),
            dest_address: "10.0.0.2".parse().unwrap(),
            source_port: 51000,
            dest_port: 443,
            protocol: Protocol::Tcp,
            length: 66,
            interface_name: Arc::from("eth0"),
        }
    }

    #[test]
    fn test_format_packet_line() {
        assert_eq!(
            format_packet_line(&record()),
            "[eth0] Packet captured. Length: 66 | Protocol: TCP | From: 10.0.0.1:51000 -> To: 10.0.0.2:443"
        );
    }

    #[test]
    fn test_console_sink_writes_lines() {
        let sink = ConsoleSink::new(Vec::new());
        sink.deliver(record());
        sink.deliver(record());
        let output = String::from_utf8(sink.into_inner()).unwrap();
        assert_eq!(output.lines().count(), 2);
        assert!(output.starts_with("[eth0] Packet captured."));
    }
}
