use super::dashboard::{Dashboard, CLEAR_SCREEN};
use crate::error::Result;
use crate::stats::StatsAggregator;
use crossbeam_channel::{bounded, select, tick, Sender};
use log::{debug, warn};
use std::io::Write;
use std::sync::Arc;
use std::thread;

/// 独立的渲染线程，按固定周期刷新，与数据包到达速率无关
pub struct DashboardRunner {
    stop_tx: Sender<()>,
    thread: Option<thread::JoinHandle<u64>>,
}

impl DashboardRunner {
    pub fn spawn<W>(aggregator: Arc<StatsAggregator>, dashboard: Dashboard, mut out: W) -> Result<Self>
    where
        W: Write + Send + 'static,
    {
        let (stop_tx, stop_rx) = bounded::<()>(1);
        let ticker = tick(dashboard.config().refresh_interval());

        let handle = thread::Builder::new()
            .name("dashboard".to_string())
            .spawn(move || {
                let mut frames = 0u64;
                let draw = |out: &mut W| {
                    let top = dashboard.config().top_connections;
                    let frame = dashboard.render(&aggregator.snapshot_top(top));
                    let written = write!(out, "{}{}", CLEAR_SCREEN, frame).and_then(|_| out.flush());
                    if let Err(e) = written {
                        warn!("仪表盘输出失败: {}", e);
                    }
                };

                draw(&mut out);
                frames += 1;
                loop {
                    select! {
                        recv(ticker) -> _ => {
                            draw(&mut out);
                            frames += 1;
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
                debug!("渲染线程退出，共刷新 {} 次", frames);
                frames
            })?;

        Ok(Self {
            stop_tx,
            thread: Some(handle),
        })
    }

    /// 停止并等待渲染线程退出，返回刷新次数
    pub fn stop(&mut self) -> u64 {
        let _ = self.stop_tx.try_send(());
        match self.thread.take() {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                warn!("渲染线程异常退出");
                0
            }),
            None => 0,
        }
    }
}

impl Drop for DashboardRunner {
    fn drop(&mut self) {
        self.stop();
    }
}
