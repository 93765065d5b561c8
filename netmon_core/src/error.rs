use crate::capture::OpenError;
use std::result::Result as StdResult;
use thiserror::Error;

/// 配置错误的退出码
pub const EXIT_CONFIGURATION: i32 = 1;
/// 抓包原语初始化失败的退出码
pub const EXIT_CAPTURE_INIT: i32 = 2;

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("设备 {device} 接收失败: {message}")]
    ReceiveFatal {
        device: String,
        message: String,
    },

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("抓包初始化失败: {0}")]
    CaptureInit(String),

    #[error("无法读取配置文件 {path}: {source}")]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("配置解析失败: {0}")]
    ConfigParse(#[from] serde_json::Error),

    #[error("系统IO错误: {0}")]
    IoError(#[from] std::io::Error),
}

impl MonitorError {
    /// 映射到进程退出码
    pub fn exit_code(&self) -> i32 {
        match self {
            MonitorError::Configuration(_)
            | MonitorError::ConfigFile { .. }
            | MonitorError::ConfigParse(_) => EXIT_CONFIGURATION,
            MonitorError::Open(_)
            | MonitorError::ReceiveFatal { .. }
            | MonitorError::CaptureInit(_)
            | MonitorError::IoError(_) => EXIT_CAPTURE_INIT,
        }
    }
}

pub type Result<T> = StdResult<T, MonitorError>;
