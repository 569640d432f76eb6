//! 会话编排器 - 编排层
//!
//! 唯一可以修改 [`Session`] 的地方。展示层通过 `subscribe()` 观察变化，
//! 通过下面的操作触发状态迁移。

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Local;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clients::{SplitRequest, SplitterApi};
use crate::config::Config;
use crate::error::{AppError, AppResult, ValidationError, WorkflowError};
use crate::models::{
    DownloadId, FileId, Phase, Session, SourceFile, SplitOutput, UploadedDocument,
};
use crate::services::{DownloadWriter, InputAcquisitor};

/// 一次远程调用返回后的处理结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepResult {
    /// 响应已写入会话
    Applied,
    /// 等待期间会话被重置，响应被丢弃
    Stale,
}

/// 工作流编排器
///
/// - 持有会话状态和文件采集器
/// - 只依赖 [`SplitterApi`]，不关心传输细节
/// - 所有操作都接受 `&self`，可以放在 `Arc` 里与展示层共享
pub struct Orchestrator {
    api: Arc<dyn SplitterApi>,
    acquisitor: InputAcquisitor,
    writer: DownloadWriter,
    state: watch::Sender<Session>,
}

impl Orchestrator {
    /// 创建新的编排器
    pub fn new(api: Arc<dyn SplitterApi>, config: &Config) -> Self {
        Self::with_download_dir(api, &config.download_dir)
    }

    pub fn with_download_dir(api: Arc<dyn SplitterApi>, download_dir: impl Into<PathBuf>) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            api,
            acquisitor: InputAcquisitor::new(),
            writer: DownloadWriter::new(download_dir),
            state,
        }
    }

    /// 订阅会话变化
    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// 当前会话快照
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn acquisitor(&self) -> &InputAcquisitor {
        &self.acquisitor
    }

    /// 处理一次用户选择/拖放
    ///
    /// 列表为空时返回 `Ok(None)`；不是 PDF 时返回校验错误且不发起请求。
    /// 采集器只在会话接受文件之后才持有它。
    pub async fn offer_files(&self, files: Vec<SourceFile>) -> AppResult<Option<StepResult>> {
        let Some(file) = self.acquisitor.on_files_offered(files)? else {
            return Ok(None);
        };
        self.submit_file(file).await.map(Some)
    }

    /// 上传文件并等待分析结果
    ///
    /// 只能在 Idle 阶段调用。失败时回到 Idle，错误信息写入 `last_error`；
    /// 服务端已分配标识但回执无效时，会清理该标识。
    pub async fn submit_file(&self, file: SourceFile) -> AppResult<StepResult> {
        if !file.has_pdf_extension() {
            return Err(ValidationError::UnsupportedType {
                filename: file.name,
            }
            .into());
        }

        let (epoch, ()) = self.begin("submit_file", |session| match session.phase {
            Phase::Idle => {
                session.epoch += 1;
                session.phase = Phase::Uploading {
                    source: file.clone(),
                };
                Some(())
            }
            _ => None,
        })?;
        self.acquisitor.hold(file.clone());

        info!("📤 正在上传并分析: {}", file.name);

        match self.api.upload(&file).await {
            Ok(receipt) => {
                let file_id = receipt.file_id.clone();
                let applied = self.finish(epoch, |session| {
                    if !matches!(session.phase, Phase::Uploading { .. }) {
                        return false;
                    }
                    session.phase = Phase::Analyzed(UploadedDocument {
                        file_id: receipt.file_id,
                        original_filename: receipt.filename,
                        analysis: receipt.analysis,
                        uploaded_at: Local::now(),
                    });
                    true
                });

                if applied {
                    info!("✓ 分析完成: {}", file_id);
                    Ok(StepResult::Applied)
                } else {
                    warn!("⚠️ 上传响应已过期，丢弃并清理: {}", file_id);
                    self.release(&file_id).await;
                    Ok(StepResult::Stale)
                }
            }
            Err(err) => {
                let message = err.user_message();
                let applied = self.finish(epoch, |session| {
                    if !matches!(session.phase, Phase::Uploading { .. }) {
                        return false;
                    }
                    session.phase = Phase::Idle;
                    session.last_error = Some(message);
                    true
                });

                if let Some(file_id) = err.orphaned_file_id() {
                    warn!("⚠️ 上传回执无效，清理服务端文件: {}", file_id);
                    self.release(file_id).await;
                }

                if applied {
                    error!("❌ 上传失败: {}", err);
                    Err(err)
                } else {
                    debug!("过期的上传失败响应: {}", err);
                    Ok(StepResult::Stale)
                }
            }
        }
    }

    /// 请求拆分
    ///
    /// 只能在 Analyzed 阶段调用。失败时留在 Analyzed，可以重试。
    pub async fn request_split(&self) -> AppResult<StepResult> {
        let (epoch, request) = self.begin("request_split", |session| {
            let Phase::Analyzed(document) = &session.phase else {
                return None;
            };
            let request = SplitRequest {
                file_id: document.file_id.clone(),
                filename: document.original_filename.clone(),
            };
            session.phase = match std::mem::take(&mut session.phase) {
                Phase::Analyzed(document) => Phase::Splitting(document),
                other => other,
            };
            Some(request)
        })?;

        info!("✂️ 正在拆分: {}", request.filename);

        match self.api.split(&request).await {
            Ok(receipt) => {
                let download_id = receipt.download_id.clone();
                let count = receipt.results.len();
                let applied = self.finish(epoch, |session| {
                    match std::mem::take(&mut session.phase) {
                        Phase::Splitting(document) => {
                            session.phase = Phase::Completed {
                                document,
                                output: SplitOutput {
                                    download_id: receipt.download_id,
                                    results: receipt.results,
                                    completed_at: Local::now(),
                                },
                            };
                            true
                        }
                        other => {
                            session.phase = other;
                            false
                        }
                    }
                });

                if applied {
                    info!("✓ 拆分完成: 共 {} 个文件 (下载标识 {})", count, download_id);
                    Ok(StepResult::Applied)
                } else {
                    warn!("⚠️ 拆分响应已过期，丢弃: {}", download_id);
                    Ok(StepResult::Stale)
                }
            }
            Err(err) => {
                let message = err.user_message();
                let applied = self.finish(epoch, |session| {
                    match std::mem::take(&mut session.phase) {
                        Phase::Splitting(document) => {
                            session.phase = Phase::Analyzed(document);
                            session.last_error = Some(message);
                            true
                        }
                        other => {
                            session.phase = other;
                            false
                        }
                    }
                });

                if applied {
                    error!("❌ 拆分失败: {}", err);
                    Err(err)
                } else {
                    debug!("过期的拆分失败响应: {}", err);
                    Ok(StepResult::Stale)
                }
            }
        }
    }

    /// 下载单个拆分结果到下载目录
    ///
    /// 不修改会话，可重复调用。
    pub async fn download_one(
        &self,
        download_id: &DownloadId,
        output_filename: &str,
    ) -> AppResult<PathBuf> {
        let session = self.snapshot();
        let Some(output) = session.phase().output() else {
            return Err(AppError::invalid_phase(
                "download_one",
                session.phase_kind(),
            ));
        };

        let known = output.download_id == *download_id
            && output
                .results
                .iter()
                .any(|r| r.output_filename() == output_filename);
        if !known {
            return Err(WorkflowError::UnknownDownload {
                download_id: download_id.to_string(),
                filename: output_filename.to_string(),
            }
            .into());
        }

        let file = self.api.download_one(download_id, output_filename).await?;
        let path = self.writer.write(output_filename, &file.bytes).await?;
        info!("✓ 已下载: {}", path.display());
        Ok(path)
    }

    /// 下载全部结果的压缩包
    pub async fn download_all(&self) -> AppResult<PathBuf> {
        let session = self.snapshot();
        let Some(download_id) = session.download_id() else {
            return Err(AppError::invalid_phase(
                "download_all",
                session.phase_kind(),
            ));
        };

        let file = self.api.download_all(download_id).await?;
        let name = file
            .suggested_name
            .unwrap_or_else(|| format!("invoices_{}.zip", download_id));
        let path = self.writer.write(&name, &file.bytes).await?;
        info!("✓ 已下载压缩包: {}", path.display());
        Ok(path)
    }

    /// 重置到 Idle
    ///
    /// 先清空会话和采集器，再尽力清理服务端文件；清理失败只记日志。
    pub async fn reset(&self) {
        let mut released = None;
        self.state.send_modify(|session| {
            released = session.file_id().cloned();
            session.epoch += 1;
            session.phase = Phase::Idle;
            session.last_error = None;
        });
        self.acquisitor.clear();

        info!("🔄 会话已重置");

        if let Some(file_id) = released {
            self.release(&file_id).await;
        }
    }

    // ========== 状态辅助方法 ==========

    /// 检查阶段并开始一次操作
    ///
    /// `start` 返回 `None` 表示阶段不符，此时会话保持不变。
    fn begin<T>(
        &self,
        operation: &'static str,
        start: impl FnOnce(&mut Session) -> Option<T>,
    ) -> AppResult<(u64, T)> {
        let mut started = None;
        let mut current = None;
        self.state.send_if_modified(|session| {
            current = Some(session.phase_kind());
            match start(session) {
                Some(value) => {
                    session.last_error = None;
                    started = Some((session.epoch, value));
                    true
                }
                None => false,
            }
        });

        started.ok_or_else(|| {
            let phase = current.unwrap_or_default();
            warn!("⚠️ 阶段 {} 不允许 {}", phase, operation);
            AppError::invalid_phase(operation, phase)
        })
    }

    /// 在会话标识未变时应用响应
    fn finish(&self, epoch: u64, apply: impl FnOnce(&mut Session) -> bool) -> bool {
        self.state
            .send_if_modified(|session| session.epoch == epoch && apply(session))
    }

    /// 尽力清理服务端文件
    async fn release(&self, file_id: &FileId) {
        match self.api.cleanup(file_id).await {
            Ok(()) => debug!("已清理服务端文件: {}", file_id),
            Err(e) => warn!("⚠️ 清理服务端文件失败 ({}): {}", file_id, e),
        }
    }
}
