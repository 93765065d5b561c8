mod args;

use args::Cli;
use clap::Parser;
use log::{info, warn};
use netmon_core::capture::resolve_devices;
use netmon_core::render::CLEAR_SCREEN;
use netmon_core::util::log::{init_logger, LogTarget};
use netmon_core::{
    CaptureOrchestrator, CaptureSource, ConsoleSink, Dashboard, DashboardRunner, MonitorConfig,
    MonitorError, PacketSink, PcapSource, Result, SessionOutcome, StatsAggregator,
};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

const DASHBOARD_LOG_FILE: &str = "netmon.log";
const FINISHED_POLL_INTERVAL: Duration = Duration::from_millis(200);

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let code = match run(cli).await {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("Error: {}", e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

async fn run(cli: Cli) -> Result<()> {
    // 仪表盘占用终端，日志写入文件
    let target = if cli.dashboard {
        LogTarget::File(PathBuf::from(DASHBOARD_LOG_FILE))
    } else {
        LogTarget::Stderr
    };
    init_logger(cli.log_level(), target);

    let config = load_config(&cli)?;
    let source = Arc::new(PcapSource::new());

    if cli.list {
        for device in source.enumerate_devices()? {
            println!("{}", device);
        }
        return Ok(());
    }

    let devices = resolve_devices(source.as_ref(), &cli.interfaces, cli.all)?;
    let multi_interface = devices.len() > 1;

    let aggregator = cli
        .dashboard
        .then(|| Arc::new(StatsAggregator::with_config(&config.stats, multi_interface)));
    let sink: Arc<dyn PacketSink> = match &aggregator {
        Some(aggregator) => Arc::clone(aggregator) as Arc<dyn PacketSink>,
        None => Arc::new(ConsoleSink::stdout()),
    };

    if !cli.dashboard {
        println!(
            "Starting network monitor on {}... (Press Ctrl+C to stop)",
            devices.join(", ")
        );
    }

    let mut orchestrator = CaptureOrchestrator::new(source, config.capture.clone());
    let report = orchestrator.start(&devices, sink)?;
    let failures: Vec<String> = report
        .failed
        .iter()
        .filter_map(|outcome| outcome.to_error())
        .map(|e| e.to_string())
        .collect();
    for failure in &failures {
        eprintln!("Error: {}", failure);
    }
    if report.all_failed() {
        return Err(MonitorError::CaptureInit(format!(
            "所有接口都无法打开: {}",
            devices.join(", ")
        )));
    }

    // 仪表盘会清屏，失败信息放进每一帧
    let dashboard = Dashboard::new(config.dashboard.clone()).with_failed_interfaces(failures);
    let mut runner = match &aggregator {
        Some(aggregator) => Some(DashboardRunner::spawn(
            Arc::clone(aggregator),
            dashboard.clone(),
            io::stdout(),
        )?),
        None => None,
    };

    wait_for_shutdown(&orchestrator).await;

    if let Some(runner) = runner.as_mut() {
        runner.stop();
    }
    // 停止需要等待各会话的接收超时，放到阻塞线程里
    let outcomes = tokio::task::spawn_blocking(move || orchestrator.stop())
        .await
        .map_err(|e| MonitorError::CaptureInit(format!("停止捕获失败: {}", e)))?;

    if let Some(aggregator) = &aggregator {
        let snapshot = aggregator.snapshot_top(config.dashboard.top_connections);
        let mut stdout = io::stdout().lock();
        write!(stdout, "{}{}", CLEAR_SCREEN, dashboard.render(&snapshot))?;
        stdout.flush()?;
    }
    print_summary(&outcomes);
    Ok(())
}

fn load_config(cli: &Cli) -> Result<MonitorConfig> {
    let mut config = match &cli.config {
        Some(path) => MonitorConfig::from_file(path)?,
        None => MonitorConfig::default(),
    };
    if cli.no_color {
        config.dashboard.color = false;
    }
    if cli.max_connections.is_some() {
        config.stats.max_connections = cli.max_connections;
    }
    config.validate()?;
    Ok(config)
}

/// 等待 Ctrl+C，或者所有会话都已自行结束
async fn wait_for_shutdown(orchestrator: &CaptureOrchestrator) {
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut listening = true;
    let mut poll = tokio::time::interval(FINISHED_POLL_INTERVAL);

    loop {
        tokio::select! {
            result = &mut ctrl_c, if listening => match result {
                Ok(()) => {
                    info!("收到中断信号，正在停止");
                    return;
                }
                Err(e) => {
                    warn!("无法监听中断信号: {}", e);
                    listening = false;
                }
            },
            _ = poll.tick() => {
                if orchestrator.all_finished() {
                    warn!("所有捕获会话都已结束");
                    return;
                }
            }
        }
    }
}

fn print_summary(outcomes: &[SessionOutcome]) {
    eprintln!("Capture stopped.");
    for outcome in outcomes {
        eprintln!("  {}", outcome);
    }
}
