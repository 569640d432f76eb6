//! 拆分服务的 JSON 报文
//!
//! 服务端出错时只返回 `{"error": "..."}`，没有 `success` 字段，
//! 因此 `success` 缺省为 false。

use serde::{Deserialize, Serialize};

use crate::clients::splitter_api::{SplitReceipt, UploadReceipt};
use crate::models::document::{ensure_unique_outputs, DocumentError};
use crate::models::{Analysis, DownloadId, FileId, Segment, SplitResult};

/// 通用响应外壳
#[derive(Debug, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(flatten)]
    pub payload: T,
}

#[derive(Debug, Deserialize)]
pub struct UploadPayload {
    pub file_id: Option<String>,
    pub filename: Option<String>,
    pub analysis: Option<AnalysisDto>,
}

#[derive(Debug, Deserialize)]
pub struct AnalysisDto {
    pub total_pages: u32,
    pub detected_invoices: u32,
    #[serde(default)]
    pub invoices: Vec<SegmentDto>,
}

#[derive(Debug, Deserialize)]
pub struct SegmentDto {
    pub number: u32,
    pub start_page: u32,
    pub end_page: u32,
    pub page_count: u32,
    #[serde(default)]
    pub detected_invoice_number: Option<String>,
    #[serde(default)]
    pub has_invoice_header: bool,
}

#[derive(Debug, Serialize)]
pub struct SplitBody<'a> {
    pub file_id: &'a str,
    pub filename: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct SplitPayload {
    pub download_id: Option<String>,
    #[serde(default)]
    pub results: Vec<SplitResultDto>,
}

#[derive(Debug, Deserialize)]
pub struct SplitResultDto {
    #[serde(default)]
    pub invoice_number: Option<u32>,
    pub output_file: String,
    pub page_count: u32,
    #[serde(default)]
    pub start_page: Option<u32>,
    #[serde(default)]
    pub end_page: Option<u32>,
    #[serde(default)]
    pub detected_invoice_number: Option<String>,
    #[serde(default)]
    pub has_header: bool,
}

/// cleanup 只关心 success / error
#[derive(Debug, Default, Deserialize)]
pub struct Empty {}

impl AnalysisDto {
    pub fn into_analysis(self) -> Result<Analysis, DocumentError> {
        let total_pages = self.total_pages;
        let segments = self
            .invoices
            .into_iter()
            .map(|s| {
                Segment::with_declared_page_count(
                    s.number,
                    s.start_page,
                    s.end_page,
                    s.page_count,
                    total_pages,
                    s.detected_invoice_number,
                    s.has_invoice_header,
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Analysis::new(total_pages, self.detected_invoices, segments)
    }
}

impl SplitResultDto {
    fn into_result(self, position: usize) -> Result<SplitResult, DocumentError> {
        let index = self.invoice_number.unwrap_or(position as u32 + 1);
        let result = SplitResult::new(
            index,
            self.output_file,
            self.page_count,
            self.detected_invoice_number,
        )?
        .with_recognized_header(self.has_header);
        match (self.start_page, self.end_page) {
            (Some(start), Some(end)) => result.with_page_range(start, end),
            _ => Ok(result),
        }
    }
}

impl UploadPayload {
    /// 服务端分配的文件标识（不做其他校验）
    pub fn assigned_file_id(&self) -> Option<FileId> {
        self.file_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .map(FileId::new)
    }

    /// 转换为领域回执，缺字段或违反不变量时返回原因
    pub fn into_receipt(self) -> Result<UploadReceipt, String> {
        let file_id = self
            .file_id
            .filter(|id| !id.is_empty())
            .ok_or("缺少 file_id")?;
        let filename = self.filename.ok_or("缺少 filename")?;
        let analysis = self
            .analysis
            .ok_or("缺少 analysis")?
            .into_analysis()
            .map_err(|e| e.to_string())?;
        Ok(UploadReceipt {
            file_id: FileId::new(file_id),
            filename,
            analysis,
        })
    }
}

impl SplitPayload {
    pub fn into_receipt(self) -> Result<SplitReceipt, String> {
        let download_id = self
            .download_id
            .filter(|id| !id.is_empty())
            .ok_or("缺少 download_id")?;
        let results = self
            .results
            .into_iter()
            .enumerate()
            .map(|(position, dto)| dto.into_result(position))
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| e.to_string())?;
        ensure_unique_outputs(&results).map_err(|e| e.to_string())?;
        Ok(SplitReceipt {
            download_id: DownloadId::new(download_id),
            results,
        })
    }
}
