//! 可观测性模块
//!
//! 提供结构化日志初始化和存储层指标。

use crate::config::config::LoggingConfig;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// ===== Logging =====

/// 初始化全局日志订阅者
///
/// 配置了 `log_dir` 时额外写入按天滚动的日志文件，返回的 guard 必须在进程
/// 退出前一直持有，否则缓冲中的日志会丢失。
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let (file_writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "hearth.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.structured {
        registry
            .with(fmt::layer().json())
            .with(file_writer.map(|w| fmt::layer().json().with_ansi(false).with_writer(w)))
            .try_init()
    } else {
        registry
            .with(fmt::layer())
            .with(file_writer.map(|w| fmt::layer().with_ansi(false).with_writer(w)))
            .try_init()
    };

    if let Err(e) = result {
        eprintln!("tracing subscriber already initialized: {}", e);
    }

    guard
}

// ===== Store Metrics =====

/// 存储层指标
#[derive(Clone, Default)]
pub struct StoreMetrics {
    pub documents_loaded: Arc<AtomicU64>,
    pub documents_skipped: Arc<AtomicU64>,
    pub documents_written: Arc<AtomicU64>,
    pub write_failures: Arc<AtomicU64>,
    pub save_passes: Arc<AtomicU64>,
}

/// 指标快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub documents_loaded: u64,
    pub documents_skipped: u64,
    pub documents_written: u64,
    pub write_failures: u64,
    pub save_passes: u64,
}

impl StoreMetrics {
    /// 记录成功解码的文档
    pub fn record_loaded(&self) {
        self.documents_loaded.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录因格式错误被跳过的文档
    pub fn record_skipped(&self) {
        self.documents_skipped.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录写入结果
    pub fn record_write(&self, ok: bool) {
        if ok {
            self.documents_written.fetch_add(1, Ordering::SeqCst);
        } else {
            self.write_failures.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// 记录一次完整保存
    pub fn record_save_pass(&self) {
        self.save_passes.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            documents_loaded: self.documents_loaded.load(Ordering::SeqCst),
            documents_skipped: self.documents_skipped.load(Ordering::SeqCst),
            documents_written: self.documents_written.load(Ordering::SeqCst),
            write_failures: self.write_failures.load(Ordering::SeqCst),
            save_passes: self.save_passes.load(Ordering::SeqCst),
        }
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP hearth_documents_loaded_total Documents decoded during load passes
# TYPE hearth_documents_loaded_total counter
hearth_documents_loaded_total {}
# HELP hearth_documents_skipped_total Malformed documents skipped during load passes
# TYPE hearth_documents_skipped_total counter
hearth_documents_skipped_total {}
# HELP hearth_documents_written_total Documents written atomically
# TYPE hearth_documents_written_total counter
hearth_documents_written_total {}
# HELP hearth_write_failures_total Document writes that failed
# TYPE hearth_write_failures_total counter
hearth_write_failures_total {}
# HELP hearth_save_passes_total Completed save passes
# TYPE hearth_save_passes_total counter
hearth_save_passes_total {}
"#,
            s.documents_loaded,
            s.documents_skipped,
            s.documents_written,
            s.write_failures,
            s.save_passes,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_counters() {
        let metrics = StoreMetrics::default();
        metrics.record_loaded();
        metrics.record_loaded();
        metrics.record_skipped();
        metrics.record_write(true);
        metrics.record_write(false);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.documents_loaded, 2);
        assert_eq!(snapshot.documents_skipped, 1);
        assert_eq!(snapshot.documents_written, 1);
        assert_eq!(snapshot.write_failures, 1);
    }

    #[test]
    fn test_metrics_are_shared_between_clones() {
        let metrics = StoreMetrics::default();
        let clone = metrics.clone();
        clone.record_save_pass();
        assert_eq!(metrics.snapshot().save_passes, 1);
    }

    #[test]
    fn test_gather_prometheus_format() {
        let metrics = StoreMetrics::default();
        metrics.record_write(true);
        let output = metrics.gather();
        assert!(output.contains("hearth_documents_written_total 1"));
        assert!(output.contains("# TYPE hearth_write_failures_total counter"));
    }
}
