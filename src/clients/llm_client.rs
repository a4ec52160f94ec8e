//! LLM 评分引擎客户端
//!
//! 封装所有与 LLM API 相关的调用逻辑。引擎只接收匿名令牌和
//! 已脱敏的提交内容，绝不接触真实姓名。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{AppError, AppResult, GradingError};
use crate::models::rubric::Rubric;
use crate::models::submission::CriterionScore;

/// 引擎给出的单份评分结果
#[derive(Debug, Clone)]
pub struct EngineGrade {
    pub score: f64,
    pub feedback: String,
    pub per_criterion: Vec<CriterionScore>,
}

/// 评分能力（窄接口，方便测试替换）
pub trait GradeEngine {
    fn grade(
        &self,
        anon_token: &str,
        content: &str,
        rubric: &Rubric,
        extra_instructions: &str,
    ) -> impl std::future::Future<Output = AppResult<EngineGrade>> + Send;
}

/// LLM 评分引擎
pub struct LlmGrader {
    client: Client<OpenAIConfig>,
    model_name: String,
}

/// LLM 返回的原始 JSON 结构
#[derive(Debug, Deserialize)]
struct RawGrade {
    score: f64,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    criterion_scores: Vec<RawCriterion>,
}

#[derive(Debug, Deserialize)]
struct RawCriterion {
    criterion: String,
    score: f64,
    #[serde(default)]
    max_score: f64,
    #[serde(default)]
    feedback: String,
}

impl LlmGrader {
    /// 创建新的评分引擎客户端
    pub fn new(config: &Config) -> Self {
        let api_config = OpenAIConfig::new()
            .with_api_key(config.llm_api_key.clone())
            .with_api_base(config.llm_api_base_url.clone());

        Self {
            client: Client::with_config(api_config),
            model_name: config.llm_model_name.clone(),
        }
    }

    /// 构造评分提示词（只含匿名令牌，不含真实姓名）
    fn build_prompt(
        anon_token: &str,
        content: &str,
        rubric: &Rubric,
        extra_instructions: &str,
    ) -> String {
        let mut criteria_text = String::new();
        for criterion in &rubric.criteria {
            criteria_text.push_str(&format!(
                "- {} ({} points): {}\n",
                criterion.name, criterion.points, criterion.description
            ));
        }

        let extra = if extra_instructions.is_empty() {
            String::new()
        } else {
            format!("\nAdditional instructions from the instructor:\n{extra_instructions}\n")
        };

        format!(
            r#"You are grading a student submission for the assignment "{title}".
The student is identified only as {anon_token}.

Rubric (total {total} points):
{criteria}
{grading_instructions}{extra}
Submission content:
---
{content}
---

Respond with JSON only, in exactly this shape:
{{
  "score": <number, 0 to {total}>,
  "feedback": "<overall feedback addressed to the student>",
  "criterion_scores": [
    {{"criterion": "<name>", "score": <number>, "max_score": <number>, "feedback": "<short comment>"}}
  ]
}}"#,
            title = rubric.assignment_title,
            anon_token = anon_token,
            total = rubric.total_points,
            criteria = criteria_text,
            grading_instructions = rubric.grading_instructions,
            extra = extra,
            content = content,
        )
    }

    /// 剥掉代码围栏，取出 JSON 正文
    fn strip_fences(text: &str) -> &str {
        let trimmed = text.trim();
        let without_open = trimmed
            .strip_prefix("```json")
            .or_else(|| trimmed.strip_prefix("```"))
            .unwrap_or(trimmed);
        without_open.strip_suffix("```").unwrap_or(without_open).trim()
    }

    /// 解析并裁剪评分结果
    fn parse_grade(text: &str, max_score: f64) -> AppResult<EngineGrade> {
        let body = Self::strip_fences(text);

        let raw: RawGrade = serde_json::from_str(body).map_err(|e| {
            AppError::Grading(GradingError::ResponseParseFailed {
                response: crate::utils::truncate_text(body, 200),
                source: Box::new(e),
            })
        })?;

        // 分数裁剪到合法区间
        let score = raw.score.clamp(0.0, max_score);
        if (score - raw.score).abs() > f64::EPSILON {
            warn!("LLM 给分 {} 超出范围，已裁剪为 {}", raw.score, score);
        }

        let per_criterion = raw
            .criterion_scores
            .into_iter()
            .map(|c| CriterionScore {
                criterion: c.criterion,
                score: c.score,
                max_score: c.max_score,
                feedback: c.feedback,
            })
            .collect();

        Ok(EngineGrade {
            score,
            feedback: raw.feedback,
            per_criterion,
        })
    }
}

impl GradeEngine for LlmGrader {
    async fn grade(
        &self,
        anon_token: &str,
        content: &str,
        rubric: &Rubric,
        extra_instructions: &str,
    ) -> AppResult<EngineGrade> {
        debug!("正在调用评分引擎，模型: {}，令牌: {}", self.model_name, anon_token);

        let prompt = Self::build_prompt(anon_token, content, rubric, extra_instructions);

        let system = ChatCompletionRequestSystemMessageArgs::default()
            .content("You are a fair, consistent teaching assistant. Grade strictly by the rubric and respond with JSON only.")
            .build()
            .map_err(|e| AppError::grading_api_failed(&self.model_name, e))?;
        let user = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()
            .map_err(|e| AppError::grading_api_failed(&self.model_name, e))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model_name)
            .messages([system.into(), user.into()])
            .temperature(0.2)
            .build()
            .map_err(|e| AppError::grading_api_failed(&self.model_name, e))?;

        let response = self.client.chat().create(request).await.map_err(|e| {
            warn!("评分引擎调用失败: {}", e);
            AppError::grading_api_failed(&self.model_name, e)
        })?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| {
                AppError::Grading(GradingError::EmptyContent {
                    model: self.model_name.clone(),
                })
            })?;

        debug!("评分引擎调用成功，令牌: {}", anon_token);
        Self::parse_grade(&content, rubric.total_points)
    }
}
