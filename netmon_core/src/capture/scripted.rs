//! 内存中的抓包原语，按脚本回放帧，不需要真实设备和权限

use super::source::{
    CaptureHandle, CaptureSource, Frame, Interrupter, OpenError, ReceiveError, ReceiveResult,
};
use crate::config::CaptureConfig;
use crate::error::Result;
use bytes::Bytes;
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

/// 帧回放完之后的行为
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptEnd {
    /// 每次接收都等待到超时，直到会话被停止
    Idle,
    /// 报告不可恢复的接收错误
    Fatal(String),
}

#[derive(Debug, Clone)]
pub struct DeviceScript {
    frames: Vec<Frame>,
    end: ScriptEnd,
    open_error: Option<String>,
}

impl DeviceScript {
    pub fn new() -> Self {
        Self {
            frames: Vec::new(),
            end: ScriptEnd::Idle,
            open_error: None,
        }
    }

    pub fn frame(mut self, data: impl Into<Bytes>) -> Self {
        self.frames.push(Frame::new(data.into()));
        self
    }

    pub fn frames<I, B>(mut self, frames: I) -> Self
    where
        I: IntoIterator<Item = B>,
        B: Into<Bytes>,
    {
        self.frames.extend(frames.into_iter().map(|data| Frame::new(data.into())));
        self
    }

    pub fn then_fail(mut self, message: &str) -> Self {
        self.end = ScriptEnd::Fatal(message.to_string());
        self
    }

    /// 打开即失败（模拟权限不足或设备忙）
    pub fn refuse_open(mut self, message: &str) -> Self {
        self.open_error = Some(message.to_string());
        self
    }
}

impl Default for DeviceScript {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Default)]
pub struct ScriptedSource {
    devices: RwLock<HashMap<String, DeviceScript>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(self, name: &str, script: DeviceScript) -> Self {
        self.devices.write().insert(name.to_string(), script);
        self
    }
}

impl CaptureSource for ScriptedSource {
    fn enumerate_devices(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.devices.read().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn open(
        &self,
        device: &str,
        config: &CaptureConfig,
    ) -> std::result::Result<Box<dyn CaptureHandle>, OpenError> {
        let devices = self.devices.read();
        let script = devices
            .get(device)
            .ok_or_else(|| OpenError::new(device, "No such device exists"))?;
        if let Some(message) = &script.open_error {
            return Err(OpenError::new(device, message));
        }

        let (wake_tx, wake_rx) = bounded(1);
        Ok(Box::new(ScriptedHandle {
            frames: script.frames.iter().cloned().collect(),
            end: script.end.clone(),
            timeout: config.receive_timeout(),
            wake_rx,
            interrupter: Arc::new(ScriptedInterrupter { wake_tx }),
        }))
    }
}

struct ScriptedHandle {
    frames: VecDeque<Frame>,
    end: ScriptEnd,
    timeout: Duration,
    wake_rx: Receiver<()>,
    interrupter: Arc<ScriptedInterrupter>,
}

impl CaptureHandle for ScriptedHandle {
    fn receive(&mut self) -> ReceiveResult {
        if let Some(frame) = self.frames.pop_front() {
            return Ok(frame);
        }
        match &self.end {
            ScriptEnd::Fatal(message) => Err(ReceiveError::Fatal(message.clone())),
            ScriptEnd::Idle => {
                // 被打断或等待到期都按超时返回，由会话检查停止标志
                let _ = self.wake_rx.recv_timeout(self.timeout);
                Err(ReceiveError::Timeout)
            }
        }
    }

    fn interrupter(&self) -> Option<Arc<dyn Interrupter>> {
        let interrupter: Arc<dyn Interrupter> = self.interrupter.clone();
        Some(interrupter)
    }
}

struct ScriptedInterrupter {
    wake_tx: Sender<()>,
}

impl Interrupter for ScriptedInterrupter {
    fn interrupt(&self) {
        let _ = self.wake_tx.try_send(());
    }
}
