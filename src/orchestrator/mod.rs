//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责阶段推进和流程调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `pipeline` - 评分流水线状态机
//! - 驱动 NotStarted → Downloaded → Graded → ReviewReady → Uploaded
//! - 阶段门控与幂等保证
//! - 逐份落盘，支持中断续跑
//! - 预算核算提示
//!
//! ### `app` - 应用入口
//! - 管理应用生命周期（初始化、运行）
//! - 把两步式人机协作流程映射到流水线阶段
//! - 输出全局统计信息
//!
//! ## 层次关系
//!
//! ```text
//! app (两步式人机协作)
//!     ↓
//! pipeline (阶段状态机，处理 Vec<SubmissionRecord>)
//!     ↓
//! workflow::GradingFlow (处理单份提交)
//!     ↓
//! services (能力层：anonymize / estimate / reconcile / report)
//!     ↓
//! clients (外部协作者：LMS / 评分引擎)
//! ```
//!
//! ## 设计原则
//!
//! 1. **单一职责**：app 管人机交互节奏，pipeline 管阶段推进
//! 2. **匿名边界**：评分引擎永远见不到真实姓名，解析只发生在复核和上传
//! 3. **向下依赖**：编排层 → workflow → services → clients
//! 4. **产物即状态**：磁盘产物是阶段完成的权威记录

pub mod app;
pub mod pipeline;

// 重新导出主要类型
pub use app::App;
pub use pipeline::{GradingPipeline, ProgressCallback, StageProgress, StageReport};
