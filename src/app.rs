//! 命令行展示层
//!
//! 订阅编排器的会话变化并打印，同时按命令行参数依次触发
//! 上传 → 拆分 → 下载 → 重置。

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use futures::stream::{self, StreamExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clients::SplitterClient;
use crate::config::Config;
use crate::error::AppResult;
use crate::models::{Session, SourceFile};
use crate::orchestrator::{Orchestrator, StepResult};
use crate::utils::logging::{log_startup, print_final_stats, render_session};

/// 同时进行的单文件下载数
const MAX_CONCURRENT_DOWNLOADS: usize = 4;

/// 命令行参数
#[derive(Debug, Clone, Parser)]
#[command(name = "pdf-splitter", version, about = "把包含多张发票的 PDF 交给拆分服务处理")]
pub struct Cli {
    /// 要处理的 PDF 文件
    pub file: PathBuf,

    /// 配置文件（TOML）
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// 只分析，不拆分
    #[arg(long)]
    pub analyze_only: bool,

    /// 逐个下载拆分结果，而不是下载压缩包
    #[arg(long)]
    pub each: bool,

    /// 不下载任何文件
    #[arg(long)]
    pub no_download: bool,

    /// 结束时不清理服务端文件
    #[arg(long)]
    pub keep_remote: bool,

    /// 拆分失败后的重试次数
    #[arg(long, default_value_t = 0)]
    pub split_retries: u32,

    /// 显示详细日志
    #[arg(short, long)]
    pub verbose: bool,
}

/// 一次运行的统计
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub downloaded: usize,
    pub failed: usize,
}

/// 应用主结构
pub struct App {
    config: Config,
    cli: Cli,
    orchestrator: Arc<Orchestrator>,
    renderer: JoinHandle<()>,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config, cli: Cli) -> AppResult<Self> {
        let client = SplitterClient::new(&config)?;
        let orchestrator = Arc::new(Orchestrator::new(Arc::new(client), &config));
        let renderer = spawn_renderer(orchestrator.subscribe());

        Ok(Self {
            config,
            cli,
            orchestrator,
            renderer,
        })
    }

    /// 运行应用主逻辑
    pub async fn run(self) -> AppResult<RunSummary> {
        let file = SourceFile::from_path(&self.cli.file);
        log_startup(&self.config.api_base_url, &file.name);

        let outcome = self.process(file).await;

        if self.cli.keep_remote {
            if let Some(file_id) = self.orchestrator.snapshot().file_id() {
                info!("📌 保留服务端文件: {}", file_id);
            }
        } else {
            self.orchestrator.reset().await;
        }

        // 释放唯一的 Sender，渲染任务随之结束
        let Self {
            config,
            orchestrator,
            renderer,
            ..
        } = self;
        drop(orchestrator);
        if let Err(e) = renderer.await {
            warn!("渲染任务异常退出: {}", e);
        }

        let summary = outcome?;
        print_final_stats(summary.downloaded, summary.failed, &config.download_dir);
        Ok(summary)
    }

    async fn process(&self, file: SourceFile) -> AppResult<RunSummary> {
        let mut summary = RunSummary::default();

        if self.orchestrator.offer_files(vec![file]).await? != Some(StepResult::Applied) {
            return Ok(summary);
        }

        if self.cli.analyze_only {
            info!("🔎 只分析模式，跳过拆分");
            return Ok(summary);
        }

        if self.split_with_retries().await? != StepResult::Applied {
            return Ok(summary);
        }

        if self.cli.no_download {
            return Ok(summary);
        }

        if self.cli.each {
            self.download_each(&mut summary).await;
        } else {
            match self.orchestrator.download_all().await {
                Ok(_) => summary.downloaded += 1,
                Err(e) => {
                    error!("❌ 下载压缩包失败: {}", e.user_message());
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }

    /// 拆分失败时会话停在 Analyzed，可以直接再次请求
    async fn split_with_retries(&self) -> AppResult<StepResult> {
        let mut attempt = 0;
        loop {
            match self.orchestrator.request_split().await {
                Ok(step) => return Ok(step),
                Err(e) if attempt < self.cli.split_retries => {
                    attempt += 1;
                    warn!(
                        "拆分失败 (尝试 {}/{}): {}",
                        attempt,
                        self.cli.split_retries + 1,
                        e.user_message()
                    );
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn download_each(&self, summary: &mut RunSummary) {
        let session = self.orchestrator.snapshot();
        let (Some(download_id), Some(results)) = (session.download_id(), session.split_results())
        else {
            return;
        };

        let outcomes: Vec<_> = stream::iter(results)
            .map(|result| self.orchestrator.download_one(download_id, result.output_filename()))
            .buffer_unordered(MAX_CONCURRENT_DOWNLOADS)
            .collect()
            .await;

        for outcome in outcomes {
            match outcome {
                Ok(_) => summary.downloaded += 1,
                Err(e) => {
                    error!("❌ 下载失败: {}", e.user_message());
                    summary.failed += 1;
                }
            }
        }
    }
}

/// 展示层：每次会话变化渲染一次，Sender 被释放后退出
fn spawn_renderer(mut updates: watch::Receiver<Session>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while updates.changed().await.is_ok() {
            let session = updates.borrow_and_update().clone();
            render_session(&session);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_parses_flags() {
        let cli = Cli::try_parse_from([
            "pdf-splitter",
            "invoices.pdf",
            "--each",
            "--split-retries",
            "2",
            "--keep-remote",
        ])
        .unwrap();

        assert_eq!(cli.file, PathBuf::from("invoices.pdf"));
        assert!(cli.each);
        assert!(cli.keep_remote);
        assert!(!cli.analyze_only);
        assert_eq!(cli.split_retries, 2);
    }

    #[test]
    fn cli_requires_a_file() {
        assert!(Cli::try_parse_from(["pdf-splitter"]).is_err());
    }
}
