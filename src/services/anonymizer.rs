//! 学生身份匿名化服务 - 业务能力层
//!
//! 只负责"真实身份 ↔ 匿名令牌"的双向映射，不关心流程
//!
//! ## 设计说明
//!
//! 令牌采用顺序编号（Student_001、Student_002 ...）而不是哈希：
//! - 映射可人工排查，保存/重载后保持稳定
//! - 令牌本身不泄露姓名长度或内容的任何信息
//!
//! 已知限制：映射只按显示姓名作键，两个学生如果姓名完全相同
//! 会合并到同一个令牌（沿用现有行为，见对应测试）。

use anyhow::{Context, Result};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

use crate::error::{AppError, AppResult};

/// 一条身份映射
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingEntry {
    pub anon_token: String,
    pub real_name: String,
    pub external_id: i64,
}

/// 映射文件的落盘格式
#[derive(Debug, Serialize, Deserialize)]
struct MappingFile {
    entries: Vec<MappingEntry>,
    created_at: String,
}

/// 学生身份匿名化服务
///
/// 职责：
/// - 按首见顺序分配顺序令牌（幂等：同名总是返回同一令牌）
/// - 令牌反查真实身份
/// - 映射的持久化与重载
/// - 对文本做尽力而为的姓名替换
#[derive(Debug, Default)]
pub struct IdentityAnonymizer {
    /// 按分配顺序排列的映射条目（运行内只追加）
    entries: Vec<MappingEntry>,
    /// real_name -> entries 下标
    name_index: HashMap<String, usize>,
}

impl IdentityAnonymizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// 将真实姓名转换为匿名令牌
    ///
    /// 同一姓名重复调用返回已分配的令牌；新姓名分配下一个顺序令牌。
    /// 空姓名按 user_<external_id> 占位姓名处理，不报错。
    pub fn anonymize(&mut self, real_name: &str, external_id: i64) -> String {
        let name = if real_name.trim().is_empty() {
            format!("user_{}", external_id)
        } else {
            real_name.to_string()
        };

        if let Some(&idx) = self.name_index.get(&name) {
            return self.entries[idx].anon_token.clone();
        }

        let anon_token = format!("Student_{:03}", self.entries.len() + 1);
        debug!("分配匿名令牌: {} -> {}", anon_token, external_id);

        self.entries.push(MappingEntry {
            anon_token: anon_token.clone(),
            real_name: name.clone(),
            external_id,
        });
        self.name_index.insert(name, self.entries.len() - 1);

        anon_token
    }

    /// 令牌反查真实身份
    pub fn resolve(&self, anon_token: &str) -> AppResult<&MappingEntry> {
        self.entries
            .iter()
            .find(|e| e.anon_token == anon_token)
            .ok_or_else(|| AppError::unknown_token(anon_token))
    }

    /// 当前映射条目（按分配顺序）
    pub fn entries(&self) -> &[MappingEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 持久化完整映射到 JSON 文件
    pub fn persist(&self, path: &Path) -> Result<()> {
        let file = MappingFile {
            entries: self.entries.clone(),
            created_at: chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
        };
        let content = serde_json::to_string_pretty(&file).context("无法序列化身份映射")?;
        std::fs::write(path, content)
            .with_context(|| format!("无法写入身份映射文件: {}", path.display()))?;
        Ok(())
    }

    /// 从 JSON 文件重载映射
    ///
    /// 完全替换内存状态（不做合并），避免跨运行的令牌冲突
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("无法读取身份映射文件: {}", path.display()))?;
        let file: MappingFile =
            serde_json::from_str(&content).context("无法解析身份映射JSON")?;

        let mut name_index = HashMap::new();
        for (idx, entry) in file.entries.iter().enumerate() {
            name_index.insert(entry.real_name.clone(), idx);
        }

        Ok(Self {
            entries: file.entries,
            name_index,
        })
    }

    /// 对文本做姓名替换（大小写不敏感）
    ///
    /// 把每个已知姓名（以及单独出现的名字部分）替换成对应令牌。
    /// 这是尽力而为的隐私兜底，不是保证：从未传入 anonymize 的
    /// 姓名不会被识别，也不做任何 NLP 姓名检测。
    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        for entry in &self.entries {
            result = Self::replace_ci(&result, &entry.real_name, &entry.anon_token);

            // 名字单独出现时也替换
            if let Some(first_name) = entry.real_name.split_whitespace().next() {
                if first_name != entry.real_name {
                    result = Self::replace_ci(&result, first_name, &entry.anon_token);
                }
            }
        }

        result
    }

    fn replace_ci(text: &str, pattern: &str, replacement: &str) -> String {
        if pattern.is_empty() {
            return text.to_string();
        }
        match RegexBuilder::new(&regex::escape(pattern))
            .case_insensitive(true)
            .build()
        {
            Ok(re) => re.replace_all(text, replacement).into_owned(),
            Err(e) => {
                warn!("姓名替换正则构建失败 ({}): {}", pattern, e);
                text.to_string()
            }
        }
    }
}
