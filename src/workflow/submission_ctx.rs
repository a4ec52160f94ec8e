//! 提交处理上下文
//!
//! 封装"我正在处理第几份提交"这一信息

use std::fmt::Display;

/// 提交处理上下文
///
/// 包含处理单份提交所需的所有上下文信息
#[derive(Debug, Clone)]
pub struct SubmissionCtx {
    /// 匿名令牌
    pub anon_token: String,

    /// 提交索引（从1开始，仅用于日志显示）
    pub index: usize,

    /// 提交总数
    pub total: usize,
}

impl SubmissionCtx {
    /// 创建新的提交上下文
    pub fn new(anon_token: String, index: usize, total: usize) -> Self {
        Self {
            anon_token,
            index,
            total,
        }
    }
}

impl Display for SubmissionCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[提交 {}/{} {}]", self.index, self.total, self.anon_token)
    }
}
