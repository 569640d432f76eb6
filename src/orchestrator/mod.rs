//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层持有唯一的会话状态，按固定顺序驱动远程调用：
//! 上传 → 分析结果 → 拆分 → 拆分结果 → 下载 → 清理/重置。
//!
//! ## 状态机
//!
//! ```text
//! Idle ──submit_file──▶ Uploading ──成功──▶ Analyzed ──request_split──▶ Splitting ──成功──▶ Completed
//!  ▲                       │失败                ▲                          │失败
//!  │                       ▼                    └──────────────────────────┘
//!  └──────── reset（任意阶段） ◀── Idle
//! ```
//!
//! ## 层次关系
//!
//! ```text
//! app (展示层，订阅会话变化)
//!     ↓
//! orchestrator::Orchestrator (状态机)
//!     ↓
//! services (能力层：InputAcquisitor / DownloadWriter)
//! clients  (远程调用：SplitterApi)
//! ```
//!
//! ## 设计原则
//!
//! 1. **阶段门控**：每个操作先检查当前阶段，不满足直接返回错误，不改任何状态
//! 2. **会话标识**：上传和重置都会递增 epoch，过期响应一律丢弃
//! 3. **锁不跨 await**：状态修改都在 `watch::Sender` 的闭包里同步完成

pub mod session_orchestrator;

pub use session_orchestrator::{Orchestrator, StepResult};
