use super::source::{CaptureSource, Interrupter, OpenError, ReceiveError};
use crate::config::CaptureConfig;
use crate::decode::{decode_frame_with_length, DecodeStats};
use crate::error::MonitorError;
use crate::sink::PacketSink;
use log::{debug, error, info, trace};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;

/// 捕获会话状态机: `Idle → Opening → Running → {Stopped, Failed}`，`Opening → Failed`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Opening,
    Running,
    Stopped,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Stopped | SessionState::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "Idle",
            SessionState::Opening => "Opening",
            SessionState::Running => "Running",
            SessionState::Stopped => "Stopped",
            SessionState::Failed => "Failed",
        };
        f.write_str(name)
    }
}

/// 会话失败原因
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SessionFailure {
    #[error(transparent)]
    Open(#[from] OpenError),

    #[error("接收失败: {0}")]
    Receive(String),
}

/// 会话结束时交给编排器的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub device: String,
    pub state: SessionState,
    pub failure: Option<SessionFailure>,
    /// 交给 sink 的记录数
    pub delivered: u64,
    pub decode: DecodeStats,
}

impl SessionOutcome {
    pub fn is_failed(&self) -> bool {
        self.state == SessionState::Failed
    }

    pub fn to_error(&self) -> Option<MonitorError> {
        match &self.failure {
            Some(SessionFailure::Open(e)) => Some(MonitorError::Open(e.clone())),
            Some(SessionFailure::Receive(message)) => Some(MonitorError::ReceiveFatal {
                device: self.device.clone(),
                message: message.clone(),
            }),
            None => None,
        }
    }
}

impl fmt::Display for SessionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}: {} records, {} malformed",
            self.device, self.state, self.delivered, self.decode.malformed
        )?;
        if let Some(failure) = &self.failure {
            write!(f, " ({})", failure)?;
        }
        Ok(())
    }
}

/// 会话线程与编排器共享的控制块
pub struct SessionControl {
    device: String,
    state: RwLock<SessionState>,
    stop: AtomicBool,
    delivered: AtomicU64,
    interrupter: Mutex<Option<Arc<dyn Interrupter>>>,
}

impl SessionControl {
    fn new(device: &str) -> Self {
        Self {
            device: device.to_string(),
            state: RwLock::new(SessionState::Idle),
            stop: AtomicBool::new(false),
            delivered: AtomicU64::new(0),
            interrupter: Mutex::new(None),
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn state(&self) -> SessionState {
        *self.state.read()
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// 请求停止；原语支持时同时打断阻塞中的接收
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(interrupter) = self.interrupter.lock().as_ref() {
            interrupter.interrupt();
        }
    }

    pub fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst)
    }

    fn transition(&self, next: SessionState) {
        let mut state = self.state.write();
        debug!("[{}] 会话状态 {} -> {}", self.device, *state, next);
        *state = next;
    }
}

/// 单个接口上的捕获会话
pub struct CaptureSession {
    control: Arc<SessionControl>,
    interface: Arc<str>,
    source: Arc<dyn CaptureSource>,
    config: CaptureConfig,
}

impl CaptureSession {
    pub fn new(device: &str, source: Arc<dyn CaptureSource>, config: CaptureConfig) -> Self {
        Self {
            control: Arc::new(SessionControl::new(device)),
            interface: Arc::from(device),
            source,
            config,
        }
    }

    pub fn control(&self) -> Arc<SessionControl> {
        Arc::clone(&self.control)
    }

    /// 阻塞运行，直到被请求停止或原语报告不可恢复的错误
    pub fn run(&self, sink: &dyn PacketSink) -> SessionOutcome {
        self.run_with_notify(sink, |_| {})
    }

    /// 同 [`run`](Self::run)，到达 `Running` 或 `Failed` 时调用一次 `on_ready`
    pub fn run_with_notify<F>(&self, sink: &dyn PacketSink, on_ready: F) -> SessionOutcome
    where
        F: FnOnce(SessionState),
    {
        let device = self.control.device();
        self.control.transition(SessionState::Opening);

        let mut handle = match self.source.open(device, &self.config) {
            Ok(handle) => handle,
            Err(e) => {
                debug!("[{}] 打开失败: {}", device, e);
                self.control.transition(SessionState::Failed);
                on_ready(SessionState::Failed);
                return self.outcome(SessionState::Failed, Some(e.into()), DecodeStats::new());
            }
        };

        *self.control.interrupter.lock() = handle.interrupter();
        self.control.transition(SessionState::Running);
        info!("[{}] 开始捕获", device);
        on_ready(SessionState::Running);

        let mut stats = DecodeStats::new();
        let failure = loop {
            if self.control.stop_requested() {
                break None;
            }

            match handle.receive() {
                Ok(frame) => match decode_frame_with_length(
                    &frame.data,
                    frame.capture_length,
                    frame.wire_length,
                    &self.interface,
                ) {
                    Ok(record) => {
                        stats.record_success();
                        self.control.delivered.fetch_add(1, Ordering::Relaxed);
                        sink.deliver(record);
                    }
                    Err(e) => {
                        trace!("[{}] 跳过无法解码的帧: {}", device, e);
                        stats.record_error(&e);
                    }
                },
                Err(ReceiveError::Timeout) => continue,
                Err(ReceiveError::Fatal(message)) => {
                    error!("[{}] 接收失败，会话终止: {}", device, message);
                    break Some(SessionFailure::Receive(message));
                }
            }
        };

        // 两个终止状态都释放句柄
        self.control.interrupter.lock().take();
        handle.close();
        drop(handle);

        let state = if failure.is_some() {
            SessionState::Failed
        } else {
            SessionState::Stopped
        };
        self.control.transition(state);
        debug!(
            "[{}] 会话结束: decoded={}, malformed={} (truncated={}, non_ip={})",
            device, stats.decoded, stats.malformed, stats.truncated, stats.non_ip
        );
        self.outcome(state, failure, stats)
    }

    fn outcome(
        &self,
        state: SessionState,
        failure: Option<SessionFailure>,
        decode: DecodeStats,
    ) -> SessionOutcome {
        SessionOutcome {
            device: self.control.device().to_string(),
            state,
            failure,
            delivered: self.control.delivered(),
            decode,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::scripted::{DeviceScript, ScriptedSource};
    use crate::decode::PacketRecord;
    use std::thread;
    use std::time::Duration;

    #[derive(Default)]
    struct CollectSink {
        records: Mutex<Vec<PacketRecord>>,
    }

    impl PacketSink for CollectSink {
        fn deliver(&self, record: PacketRecord) {
            self.records.lock().push(record);
        }
    }

    fn udp_frame(src_port: u16) -> Vec<u8> {
        let mut data = vec![0u8; 42];
        data[12] = 0x08; // IPv4
        data[14] = 0x45;
        data[23] = 17; // UDP
        data[26..30].copy_from_slice(&[10, 0, 0, 1]);
        data[30..34].copy_from_slice(&[10, 0, 0, 2]);
        data[34..36].copy_from_slice(&src_port.to_be_bytes());
        data[36..38].copy_from_slice(&53u16.to_be_bytes());
        data
    }

    fn config() -> CaptureConfig {
        CaptureConfig { timeout_ms: 10, ..CaptureConfig::default() }
    }

    #[test]
    fn test_open_failure() {
        let source = Arc::new(ScriptedSource::new());
        let session = CaptureSession::new("bogus0", source, config());
        let sink = CollectSink::default();

        let mut ready = None;
        let outcome = session.run_with_notify(&sink, |state| ready = Some(state));

        assert_eq!(ready, Some(SessionState::Failed));
        assert_eq!(outcome.state, SessionState::Failed);
        match outcome.failure {
            Some(SessionFailure::Open(ref e)) => assert_eq!(e.device, "bogus0"),
            ref other => panic!("Expected open failure, got {:?}", other),
        }
        assert_eq!(session.control().state(), SessionState::Failed);
    }

    #[test]
    fn test_malformed_frames_skipped_then_fatal() {
        let source = Arc::new(ScriptedSource::new().with_device(
            "eth0",
            DeviceScript::new()
                .frame(udp_frame(1000))
                .frame(vec![0u8; 5])
                .frame(udp_frame(1001))
                .then_fail("device went down"),
        ));
        let session = CaptureSession::new("eth0", source, config());
        let sink = CollectSink::default();

        let outcome = session.run(&sink);

        assert_eq!(outcome.state, SessionState::Failed);
        assert_eq!(outcome.failure, Some(SessionFailure::Receive("device went down".into())));
        assert_eq!(outcome.delivered, 2);
        assert_eq!(outcome.decode.malformed, 1);
        assert!(matches!(outcome.to_error(), Some(MonitorError::ReceiveFatal { .. })));

        // 同一接口内按到达顺序处理
        let ports: Vec<u16> = sink.records.lock().iter().map(|r| r.source_port).collect();
        assert_eq!(ports, vec![1000, 1001]);
    }

    #[test]
    fn test_stop_request() {
        let source = Arc::new(
            ScriptedSource::new().with_device("eth0", DeviceScript::new().frame(udp_frame(7))),
        );
        let session = Arc::new(CaptureSession::new("eth0", source, CaptureConfig {
            timeout_ms: 60_000,
            ..CaptureConfig::default()
        }));
        let control = session.control();
        let sink = Arc::new(CollectSink::default());

        let worker = {
            let session = Arc::clone(&session);
            let sink = Arc::clone(&sink);
            thread::spawn(move || session.run(sink.as_ref()))
        };

        while control.delivered() < 1 {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(control.state(), SessionState::Running);

        // 等待时间很长，只有打断才能让会话及时退出
        control.request_stop();
        let outcome = worker.join().unwrap();
        assert_eq!(outcome.state, SessionState::Stopped);
        assert!(outcome.failure.is_none());
        assert_eq!(outcome.delivered, 1);
    }
}
