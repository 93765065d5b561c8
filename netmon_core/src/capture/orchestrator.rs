use super::session::{CaptureSession, SessionControl, SessionFailure, SessionOutcome, SessionState};
use super::source::CaptureSource;
use crate::config::CaptureConfig;
use crate::decode::DecodeStats;
use crate::error::{MonitorError, Result};
use crate::sink::PacketSink;
use crossbeam_channel::unbounded;
use dashmap::DashMap;
use log::{debug, error, info};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread;

/// 确定要监控的设备：显式指定的接口、全部设备，或设备列表中的第一个（默认设备）
pub fn resolve_devices(
    source: &dyn CaptureSource,
    requested: &[String],
    all: bool,
) -> Result<Vec<String>> {
    if !requested.is_empty() && !all {
        // 同名接口只开一个会话
        let mut seen = HashSet::new();
        return Ok(requested
            .iter()
            .filter(|d| seen.insert(d.as_str()))
            .cloned()
            .collect());
    }

    let available = source.enumerate_devices()?;
    let selected: Vec<String> = if all {
        available
    } else {
        available.into_iter().take(1).collect()
    };
    if selected.is_empty() {
        return Err(MonitorError::Configuration("找不到可用的网络设备".to_string()));
    }
    debug!("选中的设备: {}", selected.join(", "));
    Ok(selected)
}

/// `start` 返回时各会话的情况
#[derive(Debug, Clone, Default)]
pub struct StartReport {
    pub running: Vec<String>,
    pub failed: Vec<SessionOutcome>,
}

impl StartReport {
    pub fn all_failed(&self) -> bool {
        self.running.is_empty()
    }
}

struct RunningSession {
    control: Arc<SessionControl>,
    thread: Option<thread::JoinHandle<SessionOutcome>>,
}

/// 每个接口一个捕获线程；单个接口失败不影响其它接口
pub struct CaptureOrchestrator {
    source: Arc<dyn CaptureSource>,
    config: CaptureConfig,
    sessions: Vec<RunningSession>,
    outcomes: Arc<DashMap<String, SessionOutcome>>,
    order: Vec<String>,
}

impl CaptureOrchestrator {
    pub fn new(source: Arc<dyn CaptureSource>, config: CaptureConfig) -> Self {
        Self {
            source,
            config,
            sessions: Vec::new(),
            outcomes: Arc::new(DashMap::new()),
            order: Vec::new(),
        }
    }

    /// 为每个设备启动一个会话，直到所有会话都到达 `Running` 或 `Failed` 才返回
    pub fn start(&mut self, devices: &[String], sink: Arc<dyn PacketSink>) -> Result<StartReport> {
        if self.sessions.iter().any(|s| s.thread.is_some()) {
            return Err(MonitorError::Configuration("捕获已在运行".to_string()));
        }

        let mut seen = HashSet::new();
        let devices: Vec<String> = devices
            .iter()
            .filter(|d| seen.insert(d.as_str()))
            .cloned()
            .collect();
        if devices.is_empty() {
            return Err(MonitorError::Configuration("没有可用的接口".to_string()));
        }

        info!("在 {} 个接口上启动捕获: {}", devices.len(), devices.join(", "));
        self.sessions.clear();
        self.outcomes.clear();
        self.order = devices.clone();

        let (ready_tx, ready_rx) = unbounded::<(usize, SessionState)>();
        for (index, device) in devices.iter().enumerate() {
            let session = CaptureSession::new(device, Arc::clone(&self.source), self.config.clone());
            let control = session.control();
            let ready_tx = ready_tx.clone();
            let sink = Arc::clone(&sink);
            let outcomes = Arc::clone(&self.outcomes);

            let spawned = thread::Builder::new()
                .name(format!("capture-{}", device))
                .spawn(move || {
                    let outcome = session.run_with_notify(sink.as_ref(), move |state| {
                        let _ = ready_tx.send((index, state));
                    });
                    outcomes.insert(outcome.device.clone(), outcome.clone());
                    outcome
                });

            match spawned {
                Ok(handle) => self.sessions.push(RunningSession {
                    control,
                    thread: Some(handle),
                }),
                Err(e) => {
                    error!("无法为接口 {} 创建捕获线程: {}", device, e);
                    self.stop();
                    return Err(e.into());
                }
            }
        }
        drop(ready_tx);

        let mut states = vec![SessionState::Idle; devices.len()];
        for _ in 0..devices.len() {
            match ready_rx.recv() {
                Ok((index, state)) => states[index] = state,
                // 所有线程都已退出
                Err(_) => break,
            }
        }

        let mut report = StartReport::default();
        for (index, device) in devices.iter().enumerate() {
            if states[index] == SessionState::Running {
                report.running.push(device.clone());
                continue;
            }
            // 失败的会话线程已经在退出，立即回收
            let outcome = self.join_session(index);
            info!("接口 {} 启动失败: {}", device, describe_failure(&outcome));
            report.failed.push(outcome);
        }

        info!(
            "捕获启动完成: {} 个运行中, {} 个失败",
            report.running.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// 请求所有会话停止并等待线程结束，返回全部会话结果
    pub fn stop(&mut self) -> Vec<SessionOutcome> {
        if self.sessions.iter().any(|s| s.thread.is_some()) {
            info!("停止所有接口上的捕获");
        }
        for session in &self.sessions {
            session.control.request_stop();
        }
        for index in 0..self.sessions.len() {
            self.join_session(index);
        }
        self.outcomes()
    }

    /// 已结束会话的结果，按启动顺序排列
    pub fn outcomes(&self) -> Vec<SessionOutcome> {
        self.order
            .iter()
            .filter_map(|device| self.outcomes.get(device).map(|o| o.value().clone()))
            .collect()
    }

    pub fn session_states(&self) -> Vec<(String, SessionState)> {
        self.sessions
            .iter()
            .map(|s| (s.control.device().to_string(), s.control.state()))
            .collect()
    }

    pub fn running_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|s| s.control.state() == SessionState::Running)
            .count()
    }

    /// 所有会话都已自行结束（例如全部接收失败）
    pub fn all_finished(&self) -> bool {
        self.sessions.iter().all(|s| s.control.state().is_terminal())
    }

    fn join_session(&mut self, index: usize) -> SessionOutcome {
        let session = &mut self.sessions[index];
        let device = session.control.device().to_string();
        if let Some(handle) = session.thread.take() {
            if handle.join().is_err() {
                error!("接口 {} 的捕获线程异常退出", device);
                self.outcomes.entry(device.clone()).or_insert_with(|| SessionOutcome {
                    device: device.clone(),
                    state: SessionState::Failed,
                    failure: Some(SessionFailure::Receive("capture thread panicked".to_string())),
                    delivered: session.control.delivered(),
                    decode: DecodeStats::new(),
                });
            }
        }
        self.outcomes
            .get(&device)
            .map(|o| o.value().clone())
            .unwrap_or_else(|| SessionOutcome {
                device: device.clone(),
                state: session.control.state(),
                failure: None,
                delivered: session.control.delivered(),
                decode: DecodeStats::new(),
            })
    }
}

impl Drop for CaptureOrchestrator {
    fn drop(&mut self) {
        self.stop();
    }
}

fn describe_failure(outcome: &SessionOutcome) -> String {
    outcome
        .failure
        .as_ref()
        .map(|f| f.to_string())
        .unwrap_or_else(|| outcome.state.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::scripted::{DeviceScript, ScriptedSource};
    use crate::decode::PacketRecord;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CollectSink {
        records: Mutex<Vec<PacketRecord>>,
    }

    impl PacketSink for CollectSink {
        fn deliver(&self, record: PacketRecord) {
            self.records.lock().push(record);
        }
    }

    fn config() -> CaptureConfig {
        CaptureConfig { timeout_ms: 20, ..CaptureConfig::default() }
    }

    fn devices(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_resolve_devices() {
        let source = ScriptedSource::new()
            .with_device("eth0", DeviceScript::new())
            .with_device("wlan0", DeviceScript::new());

        assert_eq!(resolve_devices(&source, &devices(&["lo"]), false).unwrap(), vec!["lo"]);
        assert_eq!(
            resolve_devices(&source, &devices(&["eth0", "lo", "eth0"]), false).unwrap(),
            vec!["eth0", "lo"]
        );
        assert_eq!(resolve_devices(&source, &[], false).unwrap(), vec!["eth0"]);
        assert_eq!(resolve_devices(&source, &[], true).unwrap(), vec!["eth0", "wlan0"]);

        let err = resolve_devices(&ScriptedSource::new(), &[], true).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_empty_selection_rejected() {
        let mut orchestrator = CaptureOrchestrator::new(Arc::new(ScriptedSource::new()), config());
        let err = orchestrator.start(&[], Arc::new(CollectSink::default())).unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn test_partial_failure() {
        let source = ScriptedSource::new()
            .with_device("eth0", DeviceScript::new())
            .with_device("eth1", DeviceScript::new().refuse_open("Operation not permitted"));
        let mut orchestrator = CaptureOrchestrator::new(Arc::new(source), config());

        let report = orchestrator
            .start(&devices(&["eth0", "eth1", "missing0"]), Arc::new(CollectSink::default()))
            .unwrap();

        assert_eq!(report.running, vec!["eth0"]);
        assert_eq!(report.failed.len(), 2);
        assert_eq!(report.failed[0].device, "eth1");
        assert_eq!(report.failed[1].device, "missing0");
        assert!(!report.all_failed());
        assert_eq!(orchestrator.running_count(), 1);

        let outcomes = orchestrator.stop();
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes[0].state, SessionState::Stopped);
        assert_eq!(outcomes[1].state, SessionState::Failed);
        assert_eq!(outcomes[2].state, SessionState::Failed);
        assert_eq!(orchestrator.running_count(), 0);
    }

    #[test]
    fn test_duplicate_devices_collapse() {
        let source = ScriptedSource::new().with_device("eth0", DeviceScript::new());
        let mut orchestrator = CaptureOrchestrator::new(Arc::new(source), config());
        let report = orchestrator
            .start(&devices(&["eth0", "eth0"]), Arc::new(CollectSink::default()))
            .unwrap();
        assert_eq!(report.running, vec!["eth0"]);
        assert_eq!(orchestrator.stop().len(), 1);
    }

    #[test]
    fn test_start_twice_rejected() {
        let source = ScriptedSource::new().with_device("eth0", DeviceScript::new());
        let mut orchestrator = CaptureOrchestrator::new(Arc::new(source), config());
        let sink: Arc<dyn PacketSink> = Arc::new(CollectSink::default());
        orchestrator.start(&devices(&["eth0"]), Arc::clone(&sink)).unwrap();
        assert!(orchestrator.start(&devices(&["eth0"]), sink).is_err());
        orchestrator.stop();
    }
}
