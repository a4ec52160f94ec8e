//! 提交对账服务 - 业务能力层
//!
//! 把匿名化的提交文件/文件夹关联回真实学生，供复核展示和上传使用。
//! 解析失败降级为占位标签：复核表绝不能因为一次解析失败而
//! 悄悄漏掉一份已评分的提交。

use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::models::submission::SubmissionRecord;
use crate::services::anonymizer::IdentityAnonymizer;

/// 复核展示用的身份信息
#[derive(Debug, Clone)]
pub struct ReviewIdentity {
    pub real_name: String,
    pub external_id: i64,
    pub files: Vec<PathBuf>,
}

/// 提交对账服务
#[derive(Debug, Default)]
pub struct SubmissionReconciler {
    /// anon_token -> 提交记录
    records: HashMap<String, SubmissionRecord>,
}

impl SubmissionReconciler {
    pub fn new(records: &[SubmissionRecord]) -> Self {
        let map = records
            .iter()
            .map(|r| (r.anon_token.clone(), r.clone()))
            .collect();
        Self { records: map }
    }

    /// 该令牌在下载时记录的文件，按下载顺序返回
    ///
    /// 令牌没有记录时返回空序列（"没有提交"是正常状态，不报错）
    pub fn files_for(&self, anon_token: &str) -> Vec<PathBuf> {
        self.records
            .get(anon_token)
            .map(|r| r.files.clone())
            .unwrap_or_default()
    }

    /// 联合身份映射，产出复核展示用的身份信息
    ///
    /// 解析失败时降级为 Unknown_User_<id> 占位标签，行不会被丢弃
    pub fn resolve_for_review(
        &self,
        anon_token: &str,
        external_id: i64,
        anonymizer: &IdentityAnonymizer,
    ) -> ReviewIdentity {
        let files = self.files_for(anon_token);

        match anonymizer.resolve(anon_token) {
            Ok(entry) => ReviewIdentity {
                real_name: entry.real_name.clone(),
                external_id: entry.external_id,
                files,
            },
            Err(e) => {
                warn!("⚠️ 令牌解析失败，使用占位标签: {}", e);
                ReviewIdentity {
                    real_name: format!("Unknown_User_{}", external_id),
                    external_id,
                    files,
                }
            }
        }
    }

    /// 文件夹匹配兜底
    ///
    /// 直接按令牌查不到文件时（例如文件被挪动过），依次尝试：
    /// 1. 文件夹名与令牌或真实姓名精确相等
    /// 2. 小写子串匹配（令牌 / 姓名 / 学生 ID 片段出现在文件夹名中）
    ///
    /// 明确是尽力而为：只返回候选下标，绝不把两个学生的文件合并
    pub fn match_folder(
        &self,
        anon_token: &str,
        real_name: &str,
        external_id: i64,
        candidates: &[String],
    ) -> Option<usize> {
        // 精确匹配
        for (idx, name) in candidates.iter().enumerate() {
            if name == anon_token || name == real_name {
                debug!("文件夹精确匹配: {} -> {}", anon_token, name);
                return Some(idx);
            }
        }

        // 子串兜底
        let token_lower = anon_token.to_lowercase();
        let name_lower = real_name.to_lowercase();
        let id_fragment = external_id.to_string();

        for (idx, name) in candidates.iter().enumerate() {
            let folder_lower = name.to_lowercase();
            if folder_lower.contains(&token_lower)
                || (!name_lower.is_empty() && folder_lower.contains(&name_lower))
                || folder_lower.contains(&id_fragment)
            {
                warn!(
                    "⚠️ 文件夹子串匹配（尽力而为）: {} -> {}",
                    anon_token, name
                );
                return Some(idx);
            }
        }

        None
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
