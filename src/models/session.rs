//! 会话状态
//!
//! `Phase` 是五个阶段的标签联合，每个变体只携带该阶段合法的字段：
//! 上传中还没有分析结果，完成阶段一定有拆分结果。

use std::fmt::{self, Display};

use chrono::{DateTime, Local};

use super::document::{Analysis, DownloadId, FileId, SourceFile, SplitResult};

/// 上传成功后由服务端确认的文档
#[derive(Debug, Clone, PartialEq)]
pub struct UploadedDocument {
    pub file_id: FileId,
    /// 服务端返回的文件名，拆分时原样回传
    pub original_filename: String,
    pub analysis: Analysis,
    pub uploaded_at: DateTime<Local>,
}

/// 拆分成功后的输出
#[derive(Debug, Clone, PartialEq)]
pub struct SplitOutput {
    pub download_id: DownloadId,
    pub results: Vec<SplitResult>,
    pub completed_at: DateTime<Local>,
}

/// 工作流阶段
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Phase {
    #[default]
    Idle,
    Uploading {
        source: SourceFile,
    },
    Analyzed(UploadedDocument),
    Splitting(UploadedDocument),
    Completed {
        document: UploadedDocument,
        output: SplitOutput,
    },
}

/// 不带数据的阶段标签
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PhaseKind {
    #[default]
    Idle,
    Uploading,
    Analyzed,
    Splitting,
    Completed,
}

impl Display for PhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PhaseKind::Idle => "Idle",
            PhaseKind::Uploading => "Uploading",
            PhaseKind::Analyzed => "Analyzed",
            PhaseKind::Splitting => "Splitting",
            PhaseKind::Completed => "Completed",
        };
        f.write_str(name)
    }
}

impl Phase {
    pub fn kind(&self) -> PhaseKind {
        match self {
            Phase::Idle => PhaseKind::Idle,
            Phase::Uploading { .. } => PhaseKind::Uploading,
            Phase::Analyzed(_) => PhaseKind::Analyzed,
            Phase::Splitting(_) => PhaseKind::Splitting,
            Phase::Completed { .. } => PhaseKind::Completed,
        }
    }

    pub fn document(&self) -> Option<&UploadedDocument> {
        match self {
            Phase::Analyzed(doc) | Phase::Splitting(doc) => Some(doc),
            Phase::Completed { document, .. } => Some(document),
            Phase::Idle | Phase::Uploading { .. } => None,
        }
    }

    pub fn output(&self) -> Option<&SplitOutput> {
        match self {
            Phase::Completed { output, .. } => Some(output),
            _ => None,
        }
    }
}

/// 当前会话快照
///
/// 由编排器独占修改，展示层只能通过 `subscribe()` 读取。
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Session {
    pub(crate) epoch: u64,
    pub(crate) phase: Phase,
    pub(crate) last_error: Option<String>,
}

impl Session {
    /// 会话标识，每次上传和重置都会递增
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn phase_kind(&self) -> PhaseKind {
        self.phase.kind()
    }

    /// 上传完成前持有的原始文件
    pub fn source_file(&self) -> Option<&SourceFile> {
        match &self.phase {
            Phase::Uploading { source } => Some(source),
            _ => None,
        }
    }

    pub fn file_id(&self) -> Option<&FileId> {
        self.phase.document().map(|doc| &doc.file_id)
    }

    pub fn original_filename(&self) -> Option<&str> {
        self.phase
            .document()
            .map(|doc| doc.original_filename.as_str())
    }

    pub fn analysis(&self) -> Option<&Analysis> {
        self.phase.document().map(|doc| &doc.analysis)
    }

    pub fn split_results(&self) -> Option<&[SplitResult]> {
        self.phase.output().map(|out| out.results.as_slice())
    }

    pub fn download_id(&self) -> Option<&DownloadId> {
        self.phase.output().map(|out| &out.download_id)
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// 是否有请求在途（展示层据此禁用按钮并显示加载提示）
    pub fn is_loading(&self) -> bool {
        matches!(
            self.phase_kind(),
            PhaseKind::Uploading | PhaseKind::Splitting
        )
    }

    /// 加载提示文案
    pub fn loading_message(&self) -> Option<&'static str> {
        match self.phase_kind() {
            PhaseKind::Uploading => Some("正在分析 PDF..."),
            PhaseKind::Splitting => Some("正在拆分 PDF..."),
            _ => None,
        }
    }
}
