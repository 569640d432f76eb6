//! # PDF Splitter Client
//!
//! 发票 PDF 拆分服务的客户端控制器
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 远程调用层（Clients）
//! - `clients/` - 拆分服务的调用约定与 HTTP 实现
//! - `SplitterApi` - 上传 / 拆分 / 下载 / 清理
//! - `SplitterClient` - 基于 reqwest 的实现
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，不关心流程
//! - `InputAcquisitor` - 从一次用户操作中取得一个 PDF
//! - `DownloadWriter` - 把下载内容写入下载目录
//!
//! ### ③ 编排层（Orchestration）
//! - `orchestrator/` - 持有会话状态的有限状态机
//! - `Orchestrator` - Idle → Uploading → Analyzed → Splitting → Completed
//!
//! ### ④ 展示层（App）
//! - `app` - 命令行宿主，订阅会话变化并渲染
//!
//! ## 模块结构

pub mod app;
pub mod clients;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;

// 重新导出常用类型
pub use clients::{SplitterApi, SplitterClient};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::{Phase, PhaseKind, Session, SourceFile};
pub use orchestrator::{Orchestrator, StepResult};
pub use services::InputAcquisitor;
