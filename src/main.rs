use anyhow::Result;
use clap::Parser;
use pdf_splitter_client::app::{App, Cli};
use pdf_splitter_client::config::Config;
use pdf_splitter_client::logger;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // 加载配置
    let config = Config::load(cli.config.as_deref())?;

    // 初始化日志
    logger::init(config.verbose_logging || cli.verbose);

    // 初始化并运行应用
    let summary = App::initialize(config, cli)?.run().await?;

    if summary.failed > 0 {
        anyhow::bail!("{} 个文件下载失败", summary.failed);
    }

    Ok(())
}
