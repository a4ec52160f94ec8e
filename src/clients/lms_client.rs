//! LMS API 客户端
//!
//! 封装所有与 LMS（Canvas 风格 REST API）相关的调用逻辑。
//! 频率限制（HTTP 429）作为独立错误信号上抛，由调用方
//! 等待后重试同一请求，而不是当作硬失败。

use serde_json::{json, Value};
use std::path::Path;
use tracing::debug;

use crate::config::Config;
use crate::error::{AppError, AppResult, LmsError};
use crate::models::rubric::Rubric;
use crate::models::submission::{Assignment, Attachment, Course, LmsSubmission};

/// LMS 访问能力（窄接口，流水线只依赖这几个操作）
pub trait LmsApi {
    fn list_courses(&self) -> impl std::future::Future<Output = AppResult<Vec<Course>>> + Send;
    fn list_assignments(
        &self,
        course_id: i64,
    ) -> impl std::future::Future<Output = AppResult<Vec<Assignment>>> + Send;
    fn list_submissions(
        &self,
        course_id: i64,
        assignment_id: i64,
    ) -> impl std::future::Future<Output = AppResult<Vec<LmsSubmission>>> + Send;
    fn fetch_rubric(
        &self,
        course_id: i64,
        assignment_id: i64,
    ) -> impl std::future::Future<Output = AppResult<Option<Rubric>>> + Send;
    fn post_grade(
        &self,
        course_id: i64,
        assignment_id: i64,
        external_id: i64,
        grade: &str,
        comment: &str,
    ) -> impl std::future::Future<Output = AppResult<()>> + Send;
    fn download_file(
        &self,
        url: &str,
        dest: &Path,
    ) -> impl std::future::Future<Output = AppResult<()>> + Send;
}

/// 每页提交数
const PER_PAGE: usize = 100;

/// Canvas 风格 LMS 客户端
pub struct CanvasClient {
    base_url: String,
    api_token: String,
    client: reqwest::Client,
}

impl CanvasClient {
    /// 创建新的 LMS 客户端
    pub fn new(config: &Config) -> Self {
        Self {
            base_url: config.lms_base_url.trim_end_matches('/').to_string(),
            api_token: config.lms_api_token.clone(),
            client: reqwest::Client::new(),
        }
    }

    /// 发送认证 GET 请求并解析 JSON
    async fn get_json(&self, endpoint: &str, query: &[(&str, String)]) -> AppResult<Value> {
        let url = format!("{}/api/v1/{}", self.base_url, endpoint);
        debug!("LMS GET {}", url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_token)
            .query(query)
            .send()
            .await?;

        self.check_response(endpoint, response).await
    }

    /// 检查响应状态，把 429 转换为独立的频率限制错误
    async fn check_response(&self, endpoint: &str, response: reqwest::Response) -> AppResult<Value> {
        let status = response.status();

        if status.as_u16() == 429 {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok());
            return Err(AppError::Lms(LmsError::RateLimited {
                endpoint: endpoint.to_string(),
                retry_after,
            }));
        }

        if !status.is_success() {
            let message = response.text().await.ok();
            return Err(AppError::Lms(LmsError::BadResponse {
                endpoint: endpoint.to_string(),
                status: Some(status.as_u16()),
                message,
            }));
        }

        let value = response.json::<Value>().await?;
        Ok(value)
    }

    /// 解析一条 Canvas 提交 JSON
    fn parse_submission(value: &Value) -> Option<LmsSubmission> {
        let external_id = value.get("user_id").and_then(|v| v.as_i64())?;
        let real_name = value
            .get("user")
            .and_then(|u| u.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("")
            .to_string();

        let attachments = value
            .get("attachments")
            .and_then(|a| a.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|att| {
                        Some(Attachment {
                            filename: att.get("filename")?.as_str()?.to_string(),
                            url: att.get("url")?.as_str()?.to_string(),
                            size: att.get("size").and_then(|s| s.as_u64()).unwrap_or(0),
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();

        let body = value
            .get("body")
            .and_then(|b| b.as_str())
            .filter(|b| !b.is_empty())
            .map(|b| b.to_string());

        Some(LmsSubmission {
            external_id,
            real_name,
            attachments,
            body,
        })
    }
}

impl LmsApi for CanvasClient {
    async fn list_courses(&self) -> AppResult<Vec<Course>> {
        let value = self.get_json("courses", &[]).await?;
        let courses = serde_json::from_value(value)?;
        Ok(courses)
    }

    async fn list_assignments(&self, course_id: i64) -> AppResult<Vec<Assignment>> {
        let endpoint = format!("courses/{}/assignments", course_id);
        let value = self.get_json(&endpoint, &[]).await?;
        let assignments = serde_json::from_value(value)?;
        Ok(assignments)
    }

    /// 拉取全部提交（处理分页），保持 LMS 返回顺序
    async fn list_submissions(
        &self,
        course_id: i64,
        assignment_id: i64,
    ) -> AppResult<Vec<LmsSubmission>> {
        let endpoint = format!(
            "courses/{}/assignments/{}/submissions",
            course_id, assignment_id
        );

        let mut all = Vec::new();
        let mut page = 1usize;

        loop {
            let query = [
                ("include[]", "user".to_string()),
                ("per_page", PER_PAGE.to_string()),
                ("page", page.to_string()),
            ];
            let value = self.get_json(&endpoint, &query).await?;

            let Some(items) = value.as_array() else {
                return Err(AppError::Lms(LmsError::BadResponse {
                    endpoint,
                    status: None,
                    message: Some("提交列表不是数组".to_string()),
                }));
            };

            if items.is_empty() {
                break;
            }

            let batch_len = items.len();
            all.extend(items.iter().filter_map(Self::parse_submission));

            if batch_len < PER_PAGE {
                break;
            }
            page += 1;
        }

        debug!("共拉取 {} 份提交", all.len());
        Ok(all)
    }

    /// 获取作业关联的评分细则，转换为统一格式
    async fn fetch_rubric(&self, course_id: i64, assignment_id: i64) -> AppResult<Option<Rubric>> {
        let endpoint = format!("courses/{}/assignments/{}", course_id, assignment_id);
        let query = [
            ("include[]", "rubric".to_string()),
            ("include[]", "rubric_settings".to_string()),
        ];
        let value = self.get_json(&endpoint, &query).await?;

        let rubric_data = value.get("rubric");
        let settings = value.get("rubric_settings");

        // Canvas 把细则条目数组和标题/总分设置分开返回，拼成统一 JSON 再转换
        let synthetic = match (rubric_data, settings) {
            (Some(data @ Value::Array(_)), Some(settings)) => json!({
                "title": settings.get("title").cloned().unwrap_or(Value::Null),
                "points_possible": settings.get("points_possible").cloned().unwrap_or(Value::Null),
                "data": data,
            }),
            (Some(obj @ Value::Object(_)), _) => obj.clone(),
            _ => return Ok(None),
        };

        Ok(Rubric::from_canvas_json(&synthetic))
    }

    async fn post_grade(
        &self,
        course_id: i64,
        assignment_id: i64,
        external_id: i64,
        grade: &str,
        comment: &str,
    ) -> AppResult<()> {
        let endpoint = format!(
            "courses/{}/assignments/{}/submissions/{}",
            course_id, assignment_id, external_id
        );
        let url = format!("{}/api/v1/{}", self.base_url, endpoint);

        let mut payload = json!({
            "submission": { "posted_grade": grade }
        });
        if !comment.is_empty() {
            payload["comment"] = json!({ "text_comment": comment });
        }

        debug!("上传成绩 {} -> {}", external_id, grade);

        let response = self
            .client
            .put(&url)
            .bearer_auth(&self.api_token)
            .json(&payload)
            .send()
            .await?;

        self.check_response(&endpoint, response).await?;
        Ok(())
    }

    /// 下载提交附件到本地路径
    async fn download_file(&self, url: &str, dest: &Path) -> AppResult<()> {
        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::Lms(LmsError::BadResponse {
                endpoint: url.to_string(),
                status: Some(status.as_u16()),
                message: None,
            }));
        }

        let bytes = response.bytes().await?;
        tokio::fs::write(dest, &bytes).await.map_err(|e| {
            AppError::File(crate::error::FileError::WriteFailed {
                path: dest.display().to_string(),
                source: Box::new(e),
            })
        })?;

        Ok(())
    }
}
