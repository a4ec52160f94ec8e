//! # Anon Grade Pipeline
//!
//! 一个用于 LMS 作业匿名评分的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 封装外部协作者，只暴露窄接口
//! - `CanvasClient` - LMS REST API 能力（课程 / 提交 / 成绩上传）
//! - `LlmGrader` - LLM 评分能力（只接收匿名内容）
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单个关注点
//! - `IdentityAnonymizer` - 真实身份 ↔ 匿名令牌映射能力
//! - `BudgetLedger` / `estimator` - token 与成本估算记账能力
//! - `SubmissionReconciler` - 匿名产物回关联真实身份能力
//! - `ReportWriter` - 写操作说明和上传报告能力
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一份提交"的完整评分流程
//! - `SubmissionCtx` - 上下文封装（令牌 + 序号）
//! - `GradingFlow` - 流程编排（拼装 → 脱敏 → 评分 → 兜底）
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/pipeline` - 阶段状态机，管理门控、幂等和续跑
//! - `orchestrator/app` - 应用入口，驱动两步式人机协作流程
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{CanvasClient, GradeEngine, LlmGrader, LmsApi};
pub use config::Config;
pub use error::{AppError, AppResult};
pub use models::stage::{RunDescriptor, Stage};
pub use models::submission::{GradedResult, SubmissionRecord};
pub use orchestrator::{App, GradingPipeline, StageReport};
pub use services::{BudgetLedger, IdentityAnonymizer, SubmissionReconciler};
pub use workflow::{GradingFlow, SubmissionCtx};
