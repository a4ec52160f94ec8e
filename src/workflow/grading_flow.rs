//! 单份提交评分流程 - 流程层
//!
//! 核心职责：定义"一份提交"的完整评分流程
//!
//! 流程顺序：
//! 1. 拼装提交内容（正文 + 各附件提取文本）
//! 2. 脱敏（把内容中出现的真实姓名替换为匿名令牌）
//! 3. 调用评分引擎（失败时退避重试）
//! 4. 失败兜底（记为错误结果，不中断批次）

use std::time::Duration;
use tracing::{error, info, warn};

use crate::clients::{EngineGrade, GradeEngine};
use crate::config::Config;
use crate::error::AppResult;
use crate::models::rubric::Rubric;
use crate::models::submission::{GradedResult, SubmissionRecord};
use crate::services::extractor::extract_or_none;
use crate::services::{ContentExtractor, IdentityAnonymizer};
use crate::workflow::submission_ctx::SubmissionCtx;

/// 评分引擎最大尝试次数
const MAX_ATTEMPTS: u32 = 3;

/// 非频率限制失败的基础退避秒数
const RETRY_BACKOFF_SECS: u64 = 2;

/// 单份提交评分流程
///
/// - 编排完整的单份评分流程
/// - 决定何时提取、何时脱敏、何时兜底
/// - 不持有阶段状态，只依赖业务能力（services）和引擎（clients）
pub struct GradingFlow<'a, G, X> {
    engine: &'a G,
    extractor: &'a X,
    extra_instructions: String,
    verbose_logging: bool,
}

impl<'a, G: GradeEngine, X: ContentExtractor> GradingFlow<'a, G, X> {
    /// 创建新的评分流程
    pub fn new(config: &Config, engine: &'a G, extractor: &'a X) -> Self {
        Self {
            engine,
            extractor,
            extra_instructions: config.extra_instructions.clone(),
            verbose_logging: config.verbose_logging,
        }
    }

    /// 附加课程资料上下文，随额外说明一起进入评分提示词
    pub fn with_course_context(mut self, context: &str) -> Self {
        if !context.trim().is_empty() {
            if !self.extra_instructions.is_empty() {
                self.extra_instructions.push_str("\n\n");
            }
            self.extra_instructions
                .push_str(&format!("Course material context:\n{}", context));
        }
        self
    }

    /// 执行单份提交的评分
    ///
    /// 任何失败都转换为 Error 状态的结果返回，绝不让单份失败
    /// 中断整个批次。
    pub async fn run(
        &self,
        record: &SubmissionRecord,
        rubric: &Rubric,
        anonymizer: &IdentityAnonymizer,
        ctx: &SubmissionCtx,
    ) -> GradedResult {
        // ========== 步骤 1: 拼装内容 ==========
        let content = self.compose_content(record);

        if content.trim().is_empty() {
            warn!("{} ⚠️ 没有任何可读内容，记为错误结果", ctx);
            return GradedResult::error(
                &record.anon_token,
                rubric.total_points,
                "提交中没有可读的文本内容，需要人工评分",
            );
        }

        if self.verbose_logging {
            info!(
                "{} 内容长度 {} 字符，附件 {} 个",
                ctx,
                content.chars().count(),
                record.files.len()
            );
        }

        // ========== 步骤 2: 脱敏 ==========
        // 提交正文里可能出现学生自己写的姓名，送引擎前统一替换
        let redacted = anonymizer.redact(&content);

        // ========== 步骤 3: 评分（带重试） ==========
        info!("{} 🤖 调用评分引擎...", ctx);

        match self.grade_with_retry(&record.anon_token, &redacted, rubric, ctx).await {
            Ok(grade) => {
                info!(
                    "{} ✓ 评分完成: {}/{}",
                    ctx, grade.score, rubric.total_points
                );
                GradedResult {
                    anon_token: record.anon_token.clone(),
                    score: grade.score,
                    max_score: rubric.total_points,
                    feedback: grade.feedback,
                    per_criterion: grade.per_criterion,
                    status: crate::models::submission::GradeStatus::Graded,
                }
            }
            Err(e) => {
                // ========== 步骤 4: 兜底 ==========
                error!("{} ❌ 评分彻底失败: {} (已重试 {} 次)", ctx, e, MAX_ATTEMPTS);
                GradedResult::error(
                    &record.anon_token,
                    rubric.total_points,
                    format!("自动评分失败: {}", e),
                )
            }
        }
    }

    /// 拼装提交内容：正文在前，各附件文本按文件名分节
    fn compose_content(&self, record: &SubmissionRecord) -> String {
        let mut parts = Vec::new();

        if let Some(text) = &record.extracted_text {
            if !text.trim().is_empty() {
                parts.push(text.clone());
            }
        }

        for path in &record.files {
            if let Some(text) = extract_or_none(self.extractor, path) {
                if !text.trim().is_empty() {
                    let name = path
                        .file_name()
                        .map(|n| n.to_string_lossy().to_string())
                        .unwrap_or_default();
                    parts.push(format!("--- 附件: {} ---\n{}", name, text));
                }
            }
        }

        parts.join("\n\n")
    }

    /// 调用评分引擎，失败时退避重试
    ///
    /// 频率限制按服务端建议的秒数等待；其他失败按固定基数
    /// 线性退避。重试耗尽后把最后一个错误上抛。
    async fn grade_with_retry(
        &self,
        anon_token: &str,
        content: &str,
        rubric: &Rubric,
        ctx: &SubmissionCtx,
    ) -> AppResult<EngineGrade> {
        let mut last_err = None;

        for attempt in 1..=MAX_ATTEMPTS {
            match self
                .engine
                .grade(anon_token, content, rubric, &self.extra_instructions)
                .await
            {
                Ok(grade) => return Ok(grade),
                Err(e) => {
                    if attempt < MAX_ATTEMPTS {
                        let wait = e
                            .retry_after_secs()
                            .unwrap_or(RETRY_BACKOFF_SECS * attempt as u64);
                        warn!(
                            "{} ⚠️ 第 {}/{} 次评分失败: {}，{} 秒后重试",
                            ctx, attempt, MAX_ATTEMPTS, e, wait
                        );
                        tokio::time::sleep(Duration::from_secs(wait)).await;
                    }
                    last_err = Some(e);
                }
            }
        }

        // MAX_ATTEMPTS >= 1，到这里 last_err 一定有值
        Err(last_err.unwrap_or_else(|| crate::error::AppError::Other("评分重试耗尽".to_string())))
    }
}
