//! 外部服务客户端层
//!
//! 职责：
//! - `lms_client`: LMS REST API 调用（课程、作业、提交、成绩上传）
//! - `llm_client`: LLM 评分引擎调用
//!
//! 依赖方向：clients -> models/error，不依赖 services 和 workflow

pub mod llm_client;
pub mod lms_client;

pub use llm_client::{EngineGrade, GradeEngine, LlmGrader};
pub use lms_client::{CanvasClient, LmsApi};
