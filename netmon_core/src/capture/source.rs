//! 抓包原语的抽象：枚举设备、打开设备、阻塞接收帧
//!
//! 会话与编排器只依赖这里的 trait，libpcap 实现是 [`PcapSource`]。

use crate::config::CaptureConfig;
use crate::error::{MonitorError, Result};
use bytes::Bytes;
use log::{debug, info, warn};
use pcap::{Active, Capture, Device, Linktype};
use std::sync::Arc;
use thiserror::Error;

/// 抓包原语交出的一帧原始数据
#[derive(Debug, Clone)]
pub struct Frame {
    pub data: Bytes,
    /// 实际捕获的字节数
    pub capture_length: usize,
    /// 链路上的原始长度
    pub wire_length: u32,
}

impl Frame {
    pub fn new(data: Bytes) -> Self {
        let len = data.len();
        Self {
            data,
            capture_length: len,
            wire_length: u32::try_from(len).unwrap_or(u32::MAX),
        }
    }
}

/// 设备无法打开（权限不足、设备不存在或设备忙）
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("无法打开设备 {device}: {message}")]
pub struct OpenError {
    pub device: String,
    pub message: String,
}

impl OpenError {
    pub fn new(device: &str, message: impl ToString) -> Self {
        Self {
            device: device.to_string(),
            message: message.to_string(),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ReceiveError {
    /// 单次等待到期，没有帧
    #[error("等待数据包超时")]
    Timeout,

    /// 不可恢复的接收错误，会话终止
    #[error("接收失败: {0}")]
    Fatal(String),
}

/// 从其他线程唤醒阻塞中的 `receive`
pub trait Interrupter: Send + Sync {
    fn interrupt(&self);
}

/// 一个已打开设备的句柄，只在所属会话线程内使用
pub trait CaptureHandle {
    fn receive(&mut self) -> ReceiveResult;

    /// 不支持主动打断的原语返回 `None`，停止请求依靠单次等待超时被观察到
    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        None
    }

    /// 释放底层资源；drop 时也会释放
    fn close(&mut self) {}
}

pub type ReceiveResult = std::result::Result<Frame, ReceiveError>;

pub trait CaptureSource: Send + Sync {
    fn enumerate_devices(&self) -> Result<Vec<String>>;

    fn open(
        &self,
        device: &str,
        config: &CaptureConfig,
    ) -> std::result::Result<Box<dyn CaptureHandle>, OpenError>;
}

/// 基于 libpcap 的抓包原语
#[derive(Debug, Default, Clone, Copy)]
pub struct PcapSource;

impl PcapSource {
    pub fn new() -> Self {
        Self
    }
}

impl CaptureSource for PcapSource {
    fn enumerate_devices(&self) -> Result<Vec<String>> {
        let devices = Device::list()
            .map_err(|e| MonitorError::CaptureInit(format!("枚举设备失败: {}", e)))?;
        debug!("枚举到 {} 个设备", devices.len());
        Ok(devices.into_iter().map(|d| d.name).collect())
    }

    fn open(
        &self,
        device: &str,
        config: &CaptureConfig,
    ) -> std::result::Result<Box<dyn CaptureHandle>, OpenError> {
        debug!(
            "打开设备 {}: snaplen={}, timeout={}ms, promisc={}",
            device, config.snaplen, config.timeout_ms, config.promiscuous
        );

        let capture = Capture::from_device(device)
            .map_err(|e| OpenError::new(device, e))?
            .promisc(config.promiscuous)
            .snaplen(config.snaplen)
            .timeout(config.timeout_ms)
            .immediate_mode(config.immediate_mode)
            .open()
            .map_err(|e| OpenError::new(device, e))?;

        let linktype = capture.get_datalink();
        if linktype != Linktype::ETHERNET {
            // 解码器固定按 14 字节以太网头部处理
            warn!("设备 {} 的链路类型为 {:?}，不是以太网，解码结果可能不正确", device, linktype);
        }

        info!("设备 {} 已打开", device);
        Ok(Box::new(PcapHandle { capture }))
    }
}

struct PcapHandle {
    capture: Capture<Active>,
}

impl CaptureHandle for PcapHandle {
    fn receive(&mut self) -> ReceiveResult {
        match self.capture.next_packet() {
            Ok(packet) => Ok(Frame {
                capture_length: packet.header.caplen as usize,
                wire_length: packet.header.len,
                data: Bytes::copy_from_slice(packet.data),
            }),
            Err(pcap::Error::TimeoutExpired) => Err(ReceiveError::Timeout),
            Err(e) => Err(ReceiveError::Fatal(e.to_string())),
        }
    }
}
