/// 拆分服务 HTTP 客户端
///
/// 封装所有与拆分服务 API 相关的调用逻辑
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::clients::dto::{Empty, Envelope, SplitBody, SplitPayload, UploadPayload};
use crate::clients::splitter_api::{
    DownloadedFile, SplitReceipt, SplitRequest, SplitterApi, UploadReceipt,
};
use crate::config::Config;
use crate::error::{AppError, AppResult, TransportError};
use crate::models::{DownloadId, FileId, SourceFile};
use crate::utils::logging::truncate_text;

const UPLOAD: &str = "/api/upload";
const SPLIT: &str = "/api/split";
const DOWNLOAD: &str = "/api/download";
const DOWNLOAD_ALL: &str = "/api/download-all";
const CLEANUP: &str = "/api/cleanup";

/// 拆分服务客户端
pub struct SplitterClient {
    http: Client,
    base_url: Url,
}

impl SplitterClient {
    /// 根据配置创建客户端
    pub fn new(config: &Config) -> AppResult<Self> {
        let mut builder = Client::builder().user_agent(config.user_agent.as_str());
        if let Some(secs) = config.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        let http = builder
            .build()
            .map_err(|e| AppError::request_failed("client", e))?;
        Self::with_client(http, &config.api_base_url)
    }

    /// 使用现成的 reqwest 客户端
    pub fn with_client(http: Client, base_url: &str) -> AppResult<Self> {
        let parsed = Url::parse(base_url).map_err(|e| TransportError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if parsed.cannot_be_a_base() {
            return Err(TransportError::InvalidUrl {
                url: base_url.to_string(),
                reason: "不能作为基础地址".to_string(),
            }
            .into());
        }
        debug!("拆分服务地址: {}", parsed);
        Ok(Self {
            http,
            base_url: parsed,
        })
    }

    /// 拼接接口地址，路径段会被转义
    fn endpoint(&self, segments: &[&str]) -> AppResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut path = url.path_segments_mut().map_err(|_| TransportError::InvalidUrl {
                url: self.base_url.to_string(),
                reason: "不能作为基础地址".to_string(),
            })?;
            path.pop_if_empty().extend(segments);
        }
        Ok(url)
    }

    /// 下载二进制文件
    async fn fetch_file(&self, endpoint: &str, url: Url) -> AppResult<DownloadedFile> {
        debug!("下载: {}", url);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| AppError::request_failed(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(error_from_body(endpoint, status, &body));
        }

        let suggested_name = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .and_then(parse_content_disposition);

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::request_failed(endpoint, e))?;

        debug!("下载完成: {} 字节", bytes.len());

        Ok(DownloadedFile {
            suggested_name,
            bytes: bytes.to_vec(),
        })
    }
}

#[async_trait]
impl SplitterApi for SplitterClient {
    async fn upload(&self, file: &SourceFile) -> AppResult<UploadReceipt> {
        let bytes = tokio::fs::read(&file.path)
            .await
            .map_err(|e| AppError::file_read_failed(file.path.display().to_string(), e))?;

        debug!("上传文件: {} ({} 字节)", file.name, bytes.len());

        let part = Part::bytes(bytes)
            .file_name(file.name.clone())
            .mime_str("application/pdf")
            .map_err(|e| AppError::request_failed(UPLOAD, e))?;
        let form = Form::new().part("file", part);

        let response = self
            .http
            .post(self.endpoint(&["api", "upload"])?)
            .multipart(form)
            .send()
            .await
            .map_err(|e| AppError::request_failed(UPLOAD, e))?;

        let payload: UploadPayload = read_envelope(UPLOAD, response).await?;
        let assigned = payload.assigned_file_id();
        payload.into_receipt().map_err(|reason| match assigned {
            Some(file_id) => AppError::Transport(TransportError::InvalidReceipt {
                endpoint: UPLOAD.to_string(),
                file_id,
                reason,
            }),
            None => AppError::invalid_response(UPLOAD, reason),
        })
    }

    async fn split(&self, request: &SplitRequest) -> AppResult<SplitReceipt> {
        let body = SplitBody {
            file_id: request.file_id.as_str(),
            filename: &request.filename,
        };

        debug!("拆分请求: {:?}", body);

        let response = self
            .http
            .post(self.endpoint(&["api", "split"])?)
            .json(&body)
            .send()
            .await
            .map_err(|e| AppError::request_failed(SPLIT, e))?;

        let payload: SplitPayload = read_envelope(SPLIT, response).await?;
        payload
            .into_receipt()
            .map_err(|reason| AppError::invalid_response(SPLIT, reason))
    }

    async fn download_one(
        &self,
        download_id: &DownloadId,
        output_filename: &str,
    ) -> AppResult<DownloadedFile> {
        let url = self.endpoint(&["api", "download", download_id.as_str(), output_filename])?;
        self.fetch_file(DOWNLOAD, url).await
    }

    async fn download_all(&self, download_id: &DownloadId) -> AppResult<DownloadedFile> {
        let url = self.endpoint(&["api", "download-all", download_id.as_str()])?;
        self.fetch_file(DOWNLOAD_ALL, url).await
    }

    async fn cleanup(&self, file_id: &FileId) -> AppResult<()> {
        let response = self
            .http
            .post(self.endpoint(&["api", "cleanup", file_id.as_str()])?)
            .send()
            .await
            .map_err(|e| AppError::request_failed(CLEANUP, e))?;

        let _: Empty = read_envelope(CLEANUP, response).await?;
        Ok(())
    }
}

/// 读取 JSON 响应外壳
///
/// success=true 时返回负载；服务端给出 error 时返回 `AppError::Service`。
async fn read_envelope<T: DeserializeOwned>(endpoint: &str, response: Response) -> AppResult<T> {
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|e| AppError::request_failed(endpoint, e))?;

    debug!("{} 响应 ({}): {}", endpoint, status, truncate_text(&body, 200));

    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return Err(AppError::service(endpoint, "文件超过服务端大小限制"));
    }

    match serde_json::from_str::<Envelope<T>>(&body) {
        Ok(envelope) if envelope.success => Ok(envelope.payload),
        Ok(envelope) => Err(AppError::service(
            endpoint,
            envelope
                .error
                .unwrap_or_else(|| format!("服务端处理失败 (HTTP {})", status.as_u16())),
        )),
        Err(e) if status.is_success() => Err(AppError::invalid_response(endpoint, e.to_string())),
        Err(_) => Err(error_from_body(endpoint, status, &body)),
    }
}

/// 非成功状态码：优先使用响应体里的 error 字段
fn error_from_body(endpoint: &str, status: StatusCode, body: &str) -> AppError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        return AppError::service(endpoint, "文件超过服务端大小限制");
    }
    if let Ok(Envelope {
        error: Some(message),
        ..
    }) = serde_json::from_str::<Envelope<Empty>>(body)
    {
        return AppError::service(endpoint, message);
    }
    TransportError::UnexpectedStatus {
        endpoint: endpoint.to_string(),
        status: status.as_u16(),
        body: truncate_text(body, 200),
    }
    .into()
}

/// 从 Content-Disposition 中取出文件名
fn parse_content_disposition(value: &str) -> Option<String> {
    let re = Regex::new(r#"filename\*?=(?:UTF-8'')?"?([^";]+)"?"#).ok()?;
    re.captures(value)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|name| !name.is_empty())
}
