//! 文档领域模型
//!
//! 分析结果（Analysis / Segment）与拆分结果（SplitResult）。
//! 所有构造函数都会校验页码不变量，违反约定的服务端响应在进入会话之前就会被拒绝。

use std::collections::HashSet;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

/// 模型不变量被破坏
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("总页数必须大于 0")]
    EmptyDocument,
    #[error("片段 #{index} 的页码范围 {start_page}-{end_page} 超出 1-{total_pages}")]
    PageRangeOutOfBounds {
        index: u32,
        start_page: u32,
        end_page: u32,
        total_pages: u32,
    },
    #[error("片段 #{index} 的页数 {page_count} 与页码范围 {start_page}-{end_page} 不一致")]
    PageCountMismatch {
        index: u32,
        start_page: u32,
        end_page: u32,
        page_count: u32,
    },
    #[error("片段序号必须从 1 开始 (收到 {0})")]
    ZeroIndex(u32),
    #[error("片段序号 {0} 重复")]
    DuplicateIndex(u32),
    #[error("输出文件名不能为空")]
    EmptyOutputFilename,
    #[error("输出文件名 {0} 重复")]
    DuplicateOutputFilename(String),
}

/// 服务端分配的上传文件标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 服务端拆分结果打包的标识
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DownloadId(String);

impl DownloadId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for DownloadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 用户选中的文件引用
///
/// 只记录名称和路径，创建时不会打开文件。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub name: String,
    pub path: PathBuf,
}

impl SourceFile {
    pub fn new(name: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
        }
    }

    /// 以路径的最后一段作为文件名
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self::new(name, path)
    }

    /// 文件名是否以 .pdf 结尾（不区分大小写）
    pub fn has_pdf_extension(&self) -> bool {
        self.name.to_ascii_lowercase().ends_with(".pdf")
    }
}

/// 检测到的子文档（拆分前）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Segment {
    index: u32,
    start_page: u32,
    end_page: u32,
    page_count: u32,
    detected_label: Option<String>,
    has_recognized_header: bool,
}

impl Segment {
    /// 创建片段并校验 `1 <= start <= end <= total_pages`
    pub fn new(
        index: u32,
        start_page: u32,
        end_page: u32,
        total_pages: u32,
        detected_label: Option<String>,
        has_recognized_header: bool,
    ) -> Result<Self, DocumentError> {
        if index == 0 {
            return Err(DocumentError::ZeroIndex(index));
        }
        if start_page == 0 || start_page > end_page || end_page > total_pages {
            return Err(DocumentError::PageRangeOutOfBounds {
                index,
                start_page,
                end_page,
                total_pages,
            });
        }
        Ok(Self {
            index,
            start_page,
            end_page,
            page_count: end_page - start_page + 1,
            detected_label: normalize_label(detected_label),
            has_recognized_header,
        })
    }

    /// 同 [`Segment::new`]，另外校验服务端给出的页数
    pub fn with_declared_page_count(
        index: u32,
        start_page: u32,
        end_page: u32,
        page_count: u32,
        total_pages: u32,
        detected_label: Option<String>,
        has_recognized_header: bool,
    ) -> Result<Self, DocumentError> {
        let segment = Self::new(
            index,
            start_page,
            end_page,
            total_pages,
            detected_label,
            has_recognized_header,
        )?;
        if segment.page_count != page_count {
            return Err(DocumentError::PageCountMismatch {
                index,
                start_page,
                end_page,
                page_count,
            });
        }
        Ok(segment)
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn start_page(&self) -> u32 {
        self.start_page
    }

    pub fn end_page(&self) -> u32 {
        self.end_page
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn detected_label(&self) -> Option<&str> {
        self.detected_label.as_deref()
    }

    pub fn has_recognized_header(&self) -> bool {
        self.has_recognized_header
    }

    /// 列表中显示的名称
    pub fn display_name(&self) -> String {
        display_name(self.detected_label.as_deref(), self.index)
    }
}

/// 一次上传的分析结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Analysis {
    total_pages: u32,
    detected_segment_count: u32,
    segments: Vec<Segment>,
}

impl Analysis {
    /// 片段必须属于同一文档且序号唯一
    ///
    /// `detected_segment_count` 按服务端原值保存，与片段数量不一致时只记警告。
    pub fn new(
        total_pages: u32,
        detected_segment_count: u32,
        segments: Vec<Segment>,
    ) -> Result<Self, DocumentError> {
        if total_pages == 0 {
            return Err(DocumentError::EmptyDocument);
        }
        if detected_segment_count as usize != segments.len() {
            warn!(
                "⚠️ 识别数量 {} 与片段列表长度 {} 不一致",
                detected_segment_count,
                segments.len()
            );
        }
        let mut seen = HashSet::new();
        for segment in &segments {
            if segment.end_page > total_pages {
                return Err(DocumentError::PageRangeOutOfBounds {
                    index: segment.index,
                    start_page: segment.start_page,
                    end_page: segment.end_page,
                    total_pages,
                });
            }
            if !seen.insert(segment.index) {
                return Err(DocumentError::DuplicateIndex(segment.index));
            }
        }
        Ok(Self {
            total_pages,
            detected_segment_count,
            segments,
        })
    }

    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    pub fn detected_segment_count(&self) -> u32 {
        self.detected_segment_count
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// 拆分后生成的单个文件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SplitResult {
    segment_index: u32,
    output_filename: String,
    page_count: u32,
    page_range: Option<(u32, u32)>,
    detected_label: Option<String>,
    has_recognized_header: bool,
}

impl SplitResult {
    pub fn new(
        segment_index: u32,
        output_filename: impl Into<String>,
        page_count: u32,
        detected_label: Option<String>,
    ) -> Result<Self, DocumentError> {
        let output_filename = output_filename.into();
        if output_filename.trim().is_empty() {
            return Err(DocumentError::EmptyOutputFilename);
        }
        if segment_index == 0 {
            return Err(DocumentError::ZeroIndex(segment_index));
        }
        Ok(Self {
            segment_index,
            output_filename,
            page_count,
            page_range: None,
            detected_label: normalize_label(detected_label),
            has_recognized_header: false,
        })
    }

    /// 附加页码范围，页数必须与范围一致
    pub fn with_page_range(mut self, start_page: u32, end_page: u32) -> Result<Self, DocumentError> {
        if start_page == 0 || start_page > end_page {
            return Err(DocumentError::PageRangeOutOfBounds {
                index: self.segment_index,
                start_page,
                end_page,
                total_pages: end_page,
            });
        }
        if end_page - start_page + 1 != self.page_count {
            return Err(DocumentError::PageCountMismatch {
                index: self.segment_index,
                start_page,
                end_page,
                page_count: self.page_count,
            });
        }
        self.page_range = Some((start_page, end_page));
        Ok(self)
    }

    pub fn with_recognized_header(mut self, has_recognized_header: bool) -> Self {
        self.has_recognized_header = has_recognized_header;
        self
    }

    pub fn segment_index(&self) -> u32 {
        self.segment_index
    }

    pub fn output_filename(&self) -> &str {
        &self.output_filename
    }

    pub fn page_count(&self) -> u32 {
        self.page_count
    }

    pub fn page_range(&self) -> Option<(u32, u32)> {
        self.page_range
    }

    pub fn detected_label(&self) -> Option<&str> {
        self.detected_label.as_deref()
    }

    pub fn has_recognized_header(&self) -> bool {
        self.has_recognized_header
    }

    pub fn display_name(&self) -> String {
        display_name(self.detected_label.as_deref(), self.segment_index)
    }
}

/// 校验一组拆分结果的输出文件名唯一
pub fn ensure_unique_outputs(results: &[SplitResult]) -> Result<(), DocumentError> {
    let mut seen = HashSet::new();
    for result in results {
        if !seen.insert(result.output_filename.as_str()) {
            return Err(DocumentError::DuplicateOutputFilename(
                result.output_filename.clone(),
            ));
        }
    }
    Ok(())
}

// 服务端用空字符串表示“未识别到编号”
fn normalize_label(label: Option<String>) -> Option<String> {
    label
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
}

fn display_name(label: Option<&str>, index: u32) -> String {
    match label {
        Some(label) => format!("发票 {}", label),
        None => format!("发票 #{}", index),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn segment_page_count_is_derived_from_range() {
        let segment = Segment::new(1, 4, 6, 6, None, true).unwrap();
        assert_eq!(segment.page_count(), 3);
        assert_eq!(
            segment.page_count(),
            segment.end_page() - segment.start_page() + 1
        );
    }

    #[test]
    fn segment_rejects_out_of_bounds_ranges() {
        assert!(matches!(
            Segment::new(1, 0, 2, 6, None, false),
            Err(DocumentError::PageRangeOutOfBounds { .. })
        ));
        assert!(matches!(
            Segment::new(1, 5, 4, 6, None, false),
            Err(DocumentError::PageRangeOutOfBounds { .. })
        ));
        assert!(matches!(
            Segment::new(1, 5, 7, 6, None, false),
            Err(DocumentError::PageRangeOutOfBounds { .. })
        ));
        assert_eq!(
            Segment::new(0, 1, 1, 6, None, false),
            Err(DocumentError::ZeroIndex(0))
        );
    }

    #[test]
    fn segment_rejects_inconsistent_declared_page_count() {
        let result = Segment::with_declared_page_count(2, 4, 6, 2, 6, None, false);
        assert!(matches!(result, Err(DocumentError::PageCountMismatch { .. })));
    }

    #[test]
    fn empty_label_is_treated_as_missing() {
        let segment = Segment::new(2, 1, 1, 1, Some("  ".to_string()), false).unwrap();
        assert_eq!(segment.detected_label(), None);
        assert_eq!(segment.display_name(), "发票 #2");

        let labelled = Segment::new(1, 1, 1, 1, Some("2024-001".to_string()), true).unwrap();
        assert_eq!(labelled.display_name(), "发票 2024-001");
    }

    #[test]
    fn analysis_checks_unique_indices_and_keeps_declared_count() {
        let a = Segment::new(1, 1, 3, 6, None, true).unwrap();
        let b = Segment::new(2, 4, 6, 6, None, true).unwrap();

        let analysis = Analysis::new(6, 2, vec![a.clone(), b.clone()]).unwrap();
        assert_eq!(analysis.segments().len(), 2);
        assert_eq!(analysis.segments()[0].index(), 1);

        let miscounted = Analysis::new(6, 3, vec![a.clone(), b]).unwrap();
        assert_eq!(miscounted.detected_segment_count(), 3);
        assert_eq!(miscounted.segments().len(), 2);
        assert_eq!(
            Analysis::new(6, 2, vec![a.clone(), a]),
            Err(DocumentError::DuplicateIndex(1))
        );
        assert_eq!(Analysis::new(0, 0, vec![]), Err(DocumentError::EmptyDocument));
    }

    #[test]
    fn analysis_rejects_segments_beyond_total_pages() {
        let segment = Segment::new(1, 1, 8, 8, None, false).unwrap();
        assert!(matches!(
            Analysis::new(6, 1, vec![segment]),
            Err(DocumentError::PageRangeOutOfBounds { .. })
        ));
    }

    #[test]
    fn split_results_require_unique_names() {
        let first = SplitResult::new(1, "doc_1.pdf", 3, None).unwrap();
        let second = SplitResult::new(2, "doc_1.pdf", 3, None).unwrap();
        assert_eq!(
            ensure_unique_outputs(&[first, second]),
            Err(DocumentError::DuplicateOutputFilename("doc_1.pdf".to_string()))
        );
        assert_eq!(
            SplitResult::new(1, " ", 1, None),
            Err(DocumentError::EmptyOutputFilename)
        );
    }

    #[test]
    fn split_result_page_range_must_match_count() {
        let ok = SplitResult::new(1, "doc_1.pdf", 3, None)
            .unwrap()
            .with_page_range(1, 3)
            .unwrap();
        assert_eq!(ok.page_range(), Some((1, 3)));

        let bad = SplitResult::new(1, "doc_1.pdf", 3, None)
            .unwrap()
            .with_page_range(1, 2);
        assert!(matches!(bad, Err(DocumentError::PageCountMismatch { .. })));
    }

    #[test]
    fn source_file_extension_check_is_case_insensitive() {
        assert!(SourceFile::from_path("/tmp/Scan.PDF").has_pdf_extension());
        assert!(SourceFile::from_path("invoices.pdf").has_pdf_extension());
        assert!(!SourceFile::from_path("report.docx").has_pdf_extension());
        assert!(!SourceFile::from_path("pdf").has_pdf_extension());
        assert_eq!(SourceFile::from_path("/a/b/Scan.PDF").name, "Scan.PDF");
    }
}
