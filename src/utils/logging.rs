/// 日志工具模块
///
/// 提供会话渲染和输出的辅助函数，CLI 展示层通过它们把状态打印到终端
use tracing::{error, info};

use crate::models::{Analysis, DownloadId, Phase, Session, SplitResult};

/// 记录程序启动信息
///
/// # 参数
/// - `api_base_url`: 拆分服务地址
/// - `filename`: 待处理的文件
pub fn log_startup(api_base_url: &str, filename: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - PDF 发票拆分");
    info!("🌐 服务地址: {}", api_base_url);
    info!("📄 待处理文件: {}", filename);
    info!("{}", "=".repeat(60));
}

/// 记录分析结果
///
/// # 参数
/// - `filename`: 服务端确认的文件名
/// - `analysis`: 分析结果
pub fn log_analysis(filename: &str, analysis: &Analysis) {
    info!("\n{}", "─".repeat(60));
    info!("📑 文件: {}", filename);
    info!(
        "📊 总页数: {} | 识别到发票: {}",
        analysis.total_pages(),
        analysis.detected_segment_count()
    );
    for segment in analysis.segments() {
        let header = if segment.has_recognized_header() {
            "✅ 识别到发票抬头"
        } else {
            "ℹ️ 未识别到发票抬头"
        };
        info!(
            "  {} | 第 {}-{} 页 ({} 页) | {}",
            segment.display_name(),
            segment.start_page(),
            segment.end_page(),
            segment.page_count(),
            header
        );
    }
    info!("{}", "─".repeat(60));
}

/// 记录拆分结果
pub fn log_split_results(download_id: &DownloadId, results: &[SplitResult]) {
    info!("\n{}", "─".repeat(60));
    info!("📦 拆分结果 (下载标识 {})", download_id);
    for result in results {
        info!(
            "  {} | {} ({} 页)",
            result.display_name(),
            result.output_filename(),
            result.page_count()
        );
    }
    info!("{}", "─".repeat(60));
}

/// 按阶段渲染会话
///
/// 展示层每收到一次会话变化调用一次。
pub fn render_session(session: &Session) {
    if let Some(message) = session.last_error() {
        error!("❌ 错误: {}", message);
    }

    if let Some(message) = session.loading_message() {
        info!("⏳ {}", message);
        return;
    }

    match session.phase() {
        Phase::Idle => info!("📂 等待选择 PDF 文件"),
        Phase::Analyzed(document) => {
            log_analysis(&document.original_filename, &document.analysis)
        }
        Phase::Completed { output, .. } => log_split_results(&output.download_id, &output.results),
        Phase::Uploading { .. } | Phase::Splitting(_) => {}
    }
}

/// 打印最终统计信息
///
/// # 参数
/// - `downloaded`: 成功下载的文件数
/// - `failed`: 失败数量
/// - `download_dir`: 下载目录
pub fn print_final_stats(downloaded: usize, failed: usize, download_dir: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📊 处理完成");
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("✅ 已下载: {}", downloaded);
    info!("❌ 失败: {}", failed);
    info!("{}", "=".repeat(60));
    info!("\n文件已保存至: {}", download_dir);
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
