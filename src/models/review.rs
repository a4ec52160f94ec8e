use serde::{Deserialize, Serialize};

use crate::models::submission::{GradeStatus, GradedResult};

/// 复核表的上传状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum UploadStatus {
    /// 待上传
    Pending,
    /// 已上传
    Uploaded,
    /// 上传失败
    Failed,
}

impl std::fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadStatus::Pending => write!(f, "PENDING"),
            UploadStatus::Uploaded => write!(f, "UPLOADED"),
            UploadStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// 复核表的一行（对应一份提交）
///
/// ai_* 列是机器评分的原始值，复核时不允许修改；
/// final_* 列初始化为 AI 值，供教师手工编辑。
/// 上传阶段通过 external_id 把编辑后的行关联回原始提交。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRow {
    pub anon_token: String,
    /// 解析出的真实姓名；解析失败时为 Unknown_User_<id> 占位
    pub real_name: String,
    pub external_id: i64,
    pub ai_score: f64,
    pub max_score: f64,
    pub ai_feedback: String,
    /// 可编辑：最终分数
    pub final_score: f64,
    /// 可编辑：最终评语
    pub final_feedback: String,
    /// 可编辑：教师私人备注
    #[serde(default)]
    pub notes: String,
    /// 评分状态（error 行需要人工补评）
    pub grade_status: GradeStatus,
    pub upload_status: UploadStatus,
}

impl ReviewRow {
    /// 从评分结果初始化一行（final 列复制 AI 值）
    pub fn from_graded(result: &GradedResult, real_name: String, external_id: i64) -> Self {
        Self {
            anon_token: result.anon_token.clone(),
            real_name,
            external_id,
            ai_score: result.score,
            max_score: result.max_score,
            ai_feedback: result.feedback.clone(),
            final_score: result.score,
            final_feedback: result.feedback.clone(),
            notes: String::new(),
            grade_status: result.status,
            upload_status: UploadStatus::Pending,
        }
    }
}

/// 复核表
///
/// 以 TOML 落盘，教师直接编辑后由上传阶段读回。
/// 不变量：每份已评分提交恰好一行，编辑后仍能通过 external_id 回关联。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewSheet {
    pub assignment_name: String,
    pub created_at: String,
    #[serde(default)]
    pub rows: Vec<ReviewRow>,
}

impl ReviewSheet {
    pub fn new(assignment_name: impl Into<String>) -> Self {
        Self {
            assignment_name: assignment_name.into(),
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            rows: Vec::new(),
        }
    }
}
