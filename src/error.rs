use thiserror::Error;

use crate::models::{FileId, PhaseKind};

/// 应用程序错误类型
///
/// 校验、传输、服务三类错误都会以可读文本的形式展示给用户，
/// 任何一类都不会让进程退出。
#[derive(Debug, Error)]
pub enum AppError {
    /// 本地文件校验失败（不会发起网络请求）
    #[error("文件校验失败: {0}")]
    Validation(#[from] ValidationError),
    /// 网络或响应格式错误
    #[error("网络错误: {0}")]
    Transport(#[from] TransportError),
    /// 服务端返回 success=false
    #[error("{0}")]
    Service(#[from] ServiceError),
    /// 在错误的阶段调用了操作
    #[error("流程错误: {0}")]
    Workflow(#[from] WorkflowError),
    /// 本地文件读写错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// 文件校验错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// 不是 PDF 文件
    #[error("请选择 PDF 文件 (收到: {filename})")]
    UnsupportedType { filename: String },
}

/// 传输层错误
#[derive(Debug, Error)]
pub enum TransportError {
    /// 请求没有拿到响应
    #[error("请求 {endpoint} 失败: {source}")]
    RequestFailed {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },
    /// 非成功状态码，且响应体无法识别
    #[error("请求 {endpoint} 返回异常状态 {status}: {body}")]
    UnexpectedStatus {
        endpoint: String,
        status: u16,
        body: String,
    },
    /// 响应结构不符合约定
    #[error("{endpoint} 的响应无效: {reason}")]
    InvalidResponse { endpoint: String, reason: String },
    /// 服务端已接收文件并分配了标识，但回执不符合约定
    #[error("{endpoint} 的响应无效: {reason}")]
    InvalidReceipt {
        endpoint: String,
        file_id: FileId,
        reason: String,
    },
    /// 无法拼接请求地址
    #[error("无效的服务地址 {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
}

/// 服务端明确报告的失败，消息原样展示
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ServiceError {
    pub endpoint: String,
    pub message: String,
}

/// 流程（状态机）错误
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WorkflowError {
    /// 当前阶段不允许该操作
    #[error("当前阶段 {phase} 不允许执行 {operation}")]
    InvalidPhase {
        operation: &'static str,
        phase: PhaseKind,
    },
    /// 下载目标不属于当前会话
    #[error("当前会话中不存在下载项 {download_id}/{filename}")]
    UnknownDownload {
        download_id: String,
        filename: String,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 写入文件失败
    #[error("写入文件失败 ({path}): {source}")]
    WriteFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件无法读取
    #[error("无法读取配置文件 {path}: {source}")]
    FileUnreadable {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// 配置文件 TOML 解析失败
    #[error("配置文件 {path} 解析失败: {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建请求失败错误
    pub fn request_failed(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        AppError::Transport(TransportError::RequestFailed {
            endpoint: endpoint.into(),
            source,
        })
    }

    /// 创建响应无效错误
    pub fn invalid_response(endpoint: impl Into<String>, reason: impl Into<String>) -> Self {
        AppError::Transport(TransportError::InvalidResponse {
            endpoint: endpoint.into(),
            reason: reason.into(),
        })
    }

    /// 创建服务端错误
    pub fn service(endpoint: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::Service(ServiceError {
            endpoint: endpoint.into(),
            message: message.into(),
        })
    }

    /// 创建阶段错误
    pub fn invalid_phase(operation: &'static str, phase: PhaseKind) -> Self {
        AppError::Workflow(WorkflowError::InvalidPhase { operation, phase })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 创建文件写入错误
    pub fn file_write_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::WriteFailed {
            path: path.into(),
            source,
        })
    }

    /// 展示给用户的文本
    ///
    /// 服务端错误原样返回消息，其余错误使用完整描述。
    pub fn user_message(&self) -> String {
        match self {
            AppError::Service(e) => e.message.clone(),
            other => other.to_string(),
        }
    }

    /// 服务端已分配、但客户端没有接收的文件标识
    pub fn orphaned_file_id(&self) -> Option<&FileId> {
        match self {
            AppError::Transport(TransportError::InvalidReceipt { file_id, .. }) => Some(file_id),
            _ => None,
        }
    }

    /// 是否为服务端明确报告的失败
    pub fn is_service_error(&self) -> bool {
        matches!(self, AppError::Service(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
