//! 文件采集服务 - 业务能力层
//!
//! 只负责"从一次用户操作中拿到一个 PDF"能力，不关心上传流程

use std::sync::Mutex;

use tracing::{debug, warn};

use crate::error::ValidationError;
use crate::models::SourceFile;

/// 文件采集器
///
/// 职责：
/// - 接收拖放或文件选择得到的文件列表，只取第一个
/// - 校验扩展名为 .pdf（不区分大小写）
/// - 持有编排器接受的文件引用，直到被清空
/// - 不打开文件，不发起网络请求
#[derive(Debug, Default)]
pub struct InputAcquisitor {
    selected: Mutex<Option<SourceFile>>,
}

impl InputAcquisitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// 处理一次用户提供的文件列表
    ///
    /// # 返回
    /// - `Ok(None)`: 列表为空，什么也不做
    /// - `Ok(Some(file))`: 通过校验的文件，可交给编排器
    /// - `Err(..)`: 不是 PDF，文件不会被转交
    ///
    /// 只做校验，不改变当前持有的文件；由编排器在接受文件后调用 [`Self::hold`]。
    pub fn on_files_offered<I>(&self, files: I) -> Result<Option<SourceFile>, ValidationError>
    where
        I: IntoIterator<Item = SourceFile>,
    {
        let mut files = files.into_iter();
        let Some(file) = files.next() else {
            debug!("文件列表为空，忽略");
            return Ok(None);
        };

        let ignored = files.count();
        if ignored > 0 {
            debug!("一次只处理一个文件，忽略其余 {} 个", ignored);
        }

        if !file.has_pdf_extension() {
            warn!("⚠️ 拒绝非 PDF 文件: {}", file.name);
            return Err(ValidationError::UnsupportedType {
                filename: file.name,
            });
        }

        Ok(Some(file))
    }

    /// 持有已被编排器接受的文件
    pub fn hold(&self, file: SourceFile) {
        *self.slot() = Some(file);
    }

    /// 当前持有的文件引用
    pub fn selected(&self) -> Option<SourceFile> {
        self.slot().clone()
    }

    /// 清空文件引用（相当于清空文件输入框）
    pub fn clear(&self) {
        self.slot().take();
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<SourceFile>> {
        self.selected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
