use crate::error::{MonitorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 抓包参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    pub snaplen: i32,          // 每帧最大捕获字节数
    pub timeout_ms: i32,       // 单次接收的最长等待，停止请求在此时间内被观察到
    pub promiscuous: bool,
    pub immediate_mode: bool,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            snaplen: 65535,
            timeout_ms: 1000,
            promiscuous: true,
            immediate_mode: false,
        }
    }
}

impl CaptureConfig {
    pub fn receive_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(0) as u64)
    }
}

/// 仪表盘参数
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    pub refresh_interval_ms: u64,
    pub top_connections: usize,
    pub bar_width: usize,
    pub color: bool,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_interval_ms: 1000,
            top_connections: 10,
            bar_width: 40,
            color: true,
        }
    }
}

impl DashboardConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_millis(self.refresh_interval_ms.max(1))
    }
}

/// 统计参数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// 连接表上限，`None` 表示不淘汰
    pub max_connections: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub capture: CaptureConfig,
    pub dashboard: DashboardConfig,
    pub stats: StatsConfig,
}

impl MonitorConfig {
    /// 从 JSON 文件加载，缺省字段取默认值
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| MonitorError::ConfigFile {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self> {
        let config: MonitorConfig = serde_json::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.capture.snaplen <= 0 {
            return Err(MonitorError::Configuration(format!(
                "snaplen 必须为正数: {}",
                self.capture.snaplen
            )));
        }
        if self.capture.timeout_ms <= 0 {
            return Err(MonitorError::Configuration(format!(
                "timeout_ms 必须为正数，否则停止请求无法被观察到: {}",
                self.capture.timeout_ms
            )));
        }
        if self.stats.max_connections == Some(0) {
            return Err(MonitorError::Configuration("max_connections 不能为 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MonitorConfig::default();
        assert_eq!(config.capture.snaplen, 65535);
        assert_eq!(config.capture.timeout_ms, 1000);
        assert!(config.capture.promiscuous);
        assert_eq!(config.dashboard.top_connections, 10);
        assert_eq!(config.dashboard.refresh_interval(), Duration::from_secs(1));
        assert_eq!(config.stats.max_connections, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = MonitorConfig::from_json(
            r#"{ "capture": { "timeout_ms": 250 }, "stats": { "max_connections": 5000 } }"#,
        )
        .unwrap();
        assert_eq!(config.capture.timeout_ms, 250);
        assert_eq!(config.capture.snaplen, 65535);
        assert_eq!(config.stats.max_connections, Some(5000));
        assert!(config.dashboard.color);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let err = MonitorConfig::from_json(r#"{ "capture": { "timeout_ms": 0 } }"#).unwrap_err();
        assert_eq!(err.exit_code(), 1);

        let err = MonitorConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, MonitorError::ConfigParse(_)));
    }

    #[test]
    fn test_missing_file() {
        let err = MonitorConfig::from_file("/nonexistent/netmon.json").unwrap_err();
        assert!(matches!(err, MonitorError::ConfigFile { .. }));
    }
}
