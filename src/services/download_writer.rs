//! 下载写入服务 - 业务能力层
//!
//! 只负责"把下载内容落盘"能力，不关心流程

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AppError, AppResult};

/// 下载写入服务
///
/// 职责：
/// - 将下载得到的字节写入下载目录
/// - 只保留文件名的最后一段，防止写出目录
/// - 同名文件直接覆盖，重复下载结果一致
pub struct DownloadWriter {
    download_dir: PathBuf,
}

impl DownloadWriter {
    /// 创建新的下载写入服务
    pub fn new(download_dir: impl Into<PathBuf>) -> Self {
        Self {
            download_dir: download_dir.into(),
        }
    }

    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    /// 写入文件
    ///
    /// # 参数
    /// - `filename`: 服务端给出的文件名
    /// - `bytes`: 文件内容
    ///
    /// # 返回
    /// 返回写入后的完整路径
    pub async fn write(&self, filename: &str, bytes: &[u8]) -> AppResult<PathBuf> {
        let name = sanitize_filename(filename);

        tokio::fs::create_dir_all(&self.download_dir)
            .await
            .map_err(|e| AppError::file_write_failed(self.download_dir.display().to_string(), e))?;

        let path = self.download_dir.join(name);
        debug!("写入下载文件: {} ({} 字节)", path.display(), bytes.len());

        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::file_write_failed(path.display().to_string(), e))?;

        Ok(path)
    }
}

/// 取路径最后一段，空名或 `..` 替换为 `download`
pub fn sanitize_filename(filename: &str) -> String {
    let last = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();
    match last {
        "" | "." | ".." => "download".to_string(),
        name => name.to_string(),
    }
}
