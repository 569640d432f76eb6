//! 拆分服务的远程调用约定
//!
//! 编排器只依赖这个 trait；HTTP 实现见 [`crate::clients::SplitterClient`]，
//! 测试中可以替换为内存实现。

use async_trait::async_trait;

use crate::error::AppResult;
use crate::models::{Analysis, DownloadId, FileId, SourceFile, SplitResult};

/// 上传成功的回执
#[derive(Debug, Clone, PartialEq)]
pub struct UploadReceipt {
    pub file_id: FileId,
    pub filename: String,
    pub analysis: Analysis,
}

/// 拆分请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitRequest {
    pub file_id: FileId,
    pub filename: String,
}

/// 拆分成功的回执
#[derive(Debug, Clone, PartialEq)]
pub struct SplitReceipt {
    pub download_id: DownloadId,
    pub results: Vec<SplitResult>,
}

/// 下载得到的文件内容
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadedFile {
    /// 服务端建议的文件名（来自 Content-Disposition）
    pub suggested_name: Option<String>,
    pub bytes: Vec<u8>,
}

/// 远程拆分服务
///
/// 每个方法都返回显式的结果类型：服务端拒绝（success=false）是
/// `AppError::Service`，网络问题是 `AppError::Transport`。
#[async_trait]
pub trait SplitterApi: Send + Sync {
    /// 上传并分析文件
    async fn upload(&self, file: &SourceFile) -> AppResult<UploadReceipt>;

    /// 按分析结果拆分已上传的文件
    async fn split(&self, request: &SplitRequest) -> AppResult<SplitReceipt>;

    /// 下载单个拆分结果
    async fn download_one(
        &self,
        download_id: &DownloadId,
        output_filename: &str,
    ) -> AppResult<DownloadedFile>;

    /// 下载全部结果的压缩包
    async fn download_all(&self, download_id: &DownloadId) -> AppResult<DownloadedFile>;

    /// 释放服务端的临时文件
    async fn cleanup(&self, file_id: &FileId) -> AppResult<()>;
}
