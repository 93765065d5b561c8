use std::fs::File;
use std::path::PathBuf;
use std::sync::{Once, atomic::{AtomicBool, Ordering}};

static INIT_LOGGER: Once = Once::new();
static LOGGER_INITIALIZED: AtomicBool = AtomicBool::new(false);

/// 日志输出位置
#[derive(Debug, Clone)]
pub enum LogTarget {
    Stderr,
    /// 全屏仪表盘模式下写文件，避免日志行打乱画面
    File(PathBuf),
}

/// 只初始化一次，`RUST_LOG` 优先于传入的级别
pub fn init_logger(level: log::LevelFilter, target: LogTarget) {
    if !LOGGER_INITIALIZED.load(Ordering::SeqCst) {
        INIT_LOGGER.call_once(|| {
            let mut builder = env_logger::Builder::new();
            builder.filter_level(level);
            builder.parse_default_env();
            if let LogTarget::File(path) = &target {
                match File::create(path) {
                    Ok(file) => {
                        builder.target(env_logger::Target::Pipe(Box::new(file)));
                    }
                    Err(e) => eprintln!("无法创建日志文件 {}: {}", path.display(), e),
                }
            }
            let _ = builder.try_init();
            LOGGER_INITIALIZED.store(true, Ordering::SeqCst);
        });
    }
}

pub fn is_initialized() -> bool {
    LOGGER_INITIALIZED.load(Ordering::SeqCst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_twice() {
        init_logger(log::LevelFilter::Debug, LogTarget::Stderr);
        init_logger(log::LevelFilter::Trace, LogTarget::Stderr);
        assert!(is_initialized());
        log::info!("测试开始");
    }
}
