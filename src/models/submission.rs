use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// LMS 返回的一份提交（下载阶段的输入）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LmsSubmission {
    /// LMS 中的学生 ID
    pub external_id: i64,
    /// 学生真实姓名（可能为空）
    #[serde(default)]
    pub real_name: String,
    /// 附件列表
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// 在线文本提交内容
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

impl LmsSubmission {
    /// 该提交是否有任何内容（没有附件也没有正文的提交跳过下载）
    pub fn has_content(&self) -> bool {
        !self.attachments.is_empty() || self.body.as_deref().map_or(false, |b| !b.is_empty())
    }
}

/// 提交的附件
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub filename: String,
    pub url: String,
    #[serde(default)]
    pub size: u64,
}

/// 提交记录
///
/// 下载阶段产出，归当前运行独占；写入后不再修改，
/// 评分和复核阶段只读消费。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRecord {
    /// 匿名令牌（Student_001 ...）
    pub anon_token: String,
    /// LMS 中的学生 ID
    pub external_id: i64,
    /// 下载顺序排列的文件路径
    pub files: Vec<PathBuf>,
    /// 提取出的文本内容（提取失败时为 None）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extracted_text: Option<String>,
}

/// 评分状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradeStatus {
    /// 评分完成
    Graded,
    /// 评分失败（不中断批次，复核时需人工处理）
    Error,
}

/// 单项评分标准的得分
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriterionScore {
    pub criterion: String,
    pub score: f64,
    pub max_score: f64,
    #[serde(default)]
    pub feedback: String,
}

/// 评分结果
///
/// 评分阶段对每份提交产出一条；复核阶段的人工修改落在
/// 复核表的 final 列上，这里的 AI 原始值永远不被覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradedResult {
    pub anon_token: String,
    pub score: f64,
    pub max_score: f64,
    pub feedback: String,
    #[serde(default)]
    pub per_criterion: Vec<CriterionScore>,
    pub status: GradeStatus,
}

impl GradedResult {
    /// 构造一条评分失败记录（保留错误信息供复核者查看）
    pub fn error(anon_token: impl Into<String>, max_score: f64, message: impl Into<String>) -> Self {
        Self {
            anon_token: anon_token.into(),
            score: 0.0,
            max_score,
            feedback: message.into(),
            per_criterion: Vec::new(),
            status: GradeStatus::Error,
        }
    }
}

impl std::fmt::Display for GradedResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            GradeStatus::Graded => {
                write!(f, "{}: {:.1}/{:.1}", self.anon_token, self.score, self.max_score)
            }
            GradeStatus::Error => write!(f, "{}: 评分失败", self.anon_token),
        }
    }
}

/// LMS 课程
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Course {
    pub id: i64,
    pub name: String,
}

/// LMS 作业
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Assignment {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub points_possible: f64,
}
