use crate::config::DashboardConfig;
use crate::decode::Protocol;
use crate::stats::StatsSnapshot;
use std::fmt::{self, Write};
use std::time::Duration;

/// 终端 ANSI 颜色，按 OSI 层次区分协议
pub mod colors {
    pub const RESET: &str = "\x1b[0m";

    // 第三层（网络层）蓝色系
    pub const ICMP: &str = "\x1b[38;5;33m";

    // 第四层（传输层）绿色/黄色
    pub const TCP: &str = "\x1b[38;5;46m";
    pub const UDP: &str = "\x1b[38;5;226m";

    pub const OTHER: &str = "\x1b[38;5;201m";

    pub const ERROR: &str = "\x1b[38;5;196m";

    pub const HEADER: &str = "\x1b[38;5;51m";
    pub const LABEL: &str = "\x1b[38;5;250m";
}

/// 清屏并把光标移到左上角
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[1;1H";

const BOX_TOP: &str = "╔════════════════════════════════════════════════════════════════╗";
const BOX_BOTTOM: &str = "╚════════════════════════════════════════════════════════════════╝";
const BOX_INNER_WIDTH: usize = 64;

pub fn protocol_color(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp => colors::TCP,
        Protocol::Udp => colors::UDP,
        Protocol::Icmp => colors::ICMP,
        Protocol::Other => colors::OTHER,
    }
}

pub fn osi_layer(protocol: Protocol) -> &'static str {
    match protocol {
        Protocol::Tcp | Protocol::Udp => "Layer 4 (Transport)",
        Protocol::Icmp => "Layer 3 (Network)",
        Protocol::Other => "Layer 3/4 (Network/Transport)",
    }
}

/// 以 1024 为底的可读字节数，保留两位小数
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", size, UNITS[unit])
}

/// 条形长度与最大值成比例，最大值为 0 时为空
pub fn bar_length(value: u64, max_value: u64, width: usize) -> usize {
    if max_value == 0 {
        return 0;
    }
    ((value as f64 / max_value as f64) * width as f64) as usize
}

/// 把快照渲染成文本仪表盘。只读取快照，不修改统计状态
#[derive(Debug, Clone)]
pub struct Dashboard {
    config: DashboardConfig,
    failed_interfaces: Vec<String>,
}

impl Dashboard {
    pub fn new(config: DashboardConfig) -> Self {
        Self {
            config,
            failed_interfaces: Vec::new(),
        }
    }

    /// 启动失败的接口及原因，每帧都显示
    pub fn with_failed_interfaces(mut self, failures: Vec<String>) -> Self {
        self.failed_interfaces = failures;
        self
    }

    pub fn config(&self) -> &DashboardConfig {
        &self.config
    }

    /// 以快照开始时间到现在的时长渲染
    pub fn render(&self, snapshot: &StatsSnapshot) -> String {
        self.render_at(snapshot, snapshot.started_at.elapsed())
    }

    /// 相同的快照和时长总是得到相同的输出
    pub fn render_at(&self, snapshot: &StatsSnapshot, elapsed: Duration) -> String {
        let mut out = String::with_capacity(4096);
        // 写入 String 不会失败
        let _ = self.write_dashboard(&mut out, snapshot, elapsed);
        out
    }

    fn write_dashboard(
        &self,
        out: &mut String,
        snapshot: &StatsSnapshot,
        elapsed: Duration,
    ) -> fmt::Result {
        writeln!(out, "{}", self.paint(colors::HEADER, BOX_TOP))?;
        for line in [
            "",
            "         NETWORK TRAFFIC ANALYZER DASHBOARD",
            "         Real-time Monitoring with OSI Layer View",
            "",
        ] {
            writeln!(out, "{}", self.paint(colors::HEADER, &boxed(line)))?;
        }
        writeln!(out, "{}", self.paint(colors::HEADER, BOX_BOTTOM))?;
        writeln!(out)?;

        if !self.failed_interfaces.is_empty() {
            self.write_failed_interfaces(out)?;
        }
        self.write_traffic_stats(out, snapshot, elapsed)?;
        if !snapshot.interface_counts.is_empty() {
            self.write_interfaces(out, snapshot)?;
        }
        self.write_protocol_distribution(out, snapshot)?;
        self.write_top_connections(out, snapshot)?;
        self.write_legend(out)?;

        writeln!(out, "{}", self.paint(colors::LABEL, "Press Ctrl+C to stop monitoring..."))
    }

    fn write_section_header(&self, out: &mut String, title: &str) -> fmt::Result {
        writeln!(out, "{}", self.paint(colors::HEADER, BOX_TOP))?;
        writeln!(out, "{}", self.paint(colors::HEADER, &boxed(&format!("  {}", title))))?;
        writeln!(out, "{}", self.paint(colors::HEADER, BOX_BOTTOM))
    }

    fn write_traffic_stats(
        &self,
        out: &mut String,
        snapshot: &StatsSnapshot,
        elapsed: Duration,
    ) -> fmt::Result {
        let secs = StatsSnapshot::elapsed_secs(elapsed);
        let packets_per_sec = snapshot.total_packets as f64 / secs as f64;
        let bytes_per_sec = snapshot.total_bytes / secs;

        self.write_section_header(out, "TRAFFIC STATISTICS")?;
        self.write_field(out, "Total Packets:    ", &snapshot.total_packets.to_string())?;
        self.write_field(out, "Total Traffic:    ", &format_bytes(snapshot.total_bytes))?;
        self.write_field(out, "Monitoring Time:  ", &format!("{} seconds", secs))?;
        self.write_field(out, "Packet Rate:      ", &format!("{:.2} packets/sec", packets_per_sec))?;
        self.write_field(out, "Traffic Rate:     ", &format!("{}/sec", format_bytes(bytes_per_sec)))?;
        self.write_field(out, "Connections:      ", &snapshot.connection_count.to_string())?;
        writeln!(out)
    }

    fn write_failed_interfaces(&self, out: &mut String) -> fmt::Result {
        self.write_section_header(out, "FAILED INTERFACES")?;
        for failure in &self.failed_interfaces {
            writeln!(out, "  {}", self.paint(colors::ERROR, failure))?;
        }
        writeln!(out)
    }

    fn write_interfaces(&self, out: &mut String, snapshot: &StatsSnapshot) -> fmt::Result {
        self.write_section_header(out, "INTERFACES")?;
        for (name, packets) in &snapshot.interface_counts {
            let bytes = snapshot.interface_bytes.get(name).copied().unwrap_or(0);
            writeln!(
                out,
                "  {:<12} {:>10} packets   {}",
                name,
                packets,
                self.paint(colors::LABEL, &format_bytes(bytes))
            )?;
        }
        writeln!(out)
    }

    fn write_protocol_distribution(&self, out: &mut String, snapshot: &StatsSnapshot) -> fmt::Result {
        self.write_section_header(out, "PROTOCOL DISTRIBUTION (by OSI Layer)")?;

        let max_count = snapshot.protocol_counts.values().copied().max().unwrap_or(0);
        for protocol in Protocol::ALL {
            let color = protocol_color(protocol);
            let count = snapshot.protocol_count(protocol);
            writeln!(
                out,
                "  {} ({})",
                self.paint(color, protocol.as_str()),
                self.paint(colors::LABEL, osi_layer(protocol))
            )?;
            self.write_bar(out, "Packets", count, max_count, color)?;
            let traffic = format!(
                "           └─ Traffic: {}",
                format_bytes(snapshot.protocol_byte_count(protocol))
            );
            writeln!(out, "{}", self.paint(colors::LABEL, &traffic))?;
            writeln!(out)?;
        }
        Ok(())
    }

    fn write_bar(
        &self,
        out: &mut String,
        label: &str,
        value: u64,
        max_value: u64,
        color: &str,
    ) -> fmt::Result {
        let width = self.config.bar_width;
        let filled = bar_length(value, max_value, width).min(width);
        writeln!(
            out,
            "{} │ {}{} │ {}",
            self.paint(colors::LABEL, &format!("{:<10}", label)),
            self.paint(color, &"█".repeat(filled)),
            " ".repeat(width - filled),
            self.paint(colors::LABEL, &format!("{:>10}", value))
        )
    }

    fn write_top_connections(&self, out: &mut String, snapshot: &StatsSnapshot) -> fmt::Result {
        let top_n = self.config.top_connections;
        self.write_section_header(out, &format!("TOP {} CONNECTIONS", top_n))?;

        let top = snapshot.top_connections(top_n);
        if top.is_empty() {
            writeln!(out, "{}", self.paint(colors::LABEL, "  No connections yet..."))?;
        }
        for (key, stats) in &top {
            writeln!(
                out,
                "  {} │ {}{}",
                self.paint(protocol_color(key.protocol), key.protocol.as_str()),
                key,
                self.paint(colors::LABEL, &format!(" ({} packets)", stats.packets))
            )?;
        }
        if snapshot.evicted_connections > 0 {
            let evicted = format!("  ({} idle connections evicted)", snapshot.evicted_connections);
            writeln!(out, "{}", self.paint(colors::LABEL, &evicted))?;
        }
        writeln!(out)
    }

    fn write_legend(&self, out: &mut String) -> fmt::Result {
        self.write_section_header(out, "COLOR LEGEND (OSI Model)")?;
        writeln!(out, "  {} - Layer 4 (Transport Layer)", self.paint(colors::TCP, "■ TCP"))?;
        writeln!(out, "  {} - Layer 4 (Transport Layer)", self.paint(colors::UDP, "■ UDP"))?;
        writeln!(out, "  {} - Layer 3 (Network Layer)", self.paint(colors::ICMP, "■ ICMP"))?;
        writeln!(out, "  {} - Various Layers", self.paint(colors::OTHER, "■ Other"))?;
        writeln!(out)
    }

    fn write_field(&self, out: &mut String, label: &str, value: &str) -> fmt::Result {
        writeln!(out, "  {}{}", self.paint(colors::LABEL, label), value)
    }

    fn paint(&self, color: &str, text: &str) -> String {
        if self.config.color {
            format!("{}{}{}", color, text, colors::RESET)
        } else {
            text.to_string()
        }
    }
}

fn boxed(text: &str) -> String {
    let pad = BOX_INNER_WIDTH.saturating_sub(text.chars().count());
    format!("║{}{}║", text, " ".repeat(pad))
}
