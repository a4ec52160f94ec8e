//! 运行产物的读写
//!
//! 身份映射 / 提交记录 / 评分结果用 JSON 落盘，
//! 复核表用 TOML 落盘（教师直接编辑，serde 往返）。

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::models::review::ReviewSheet;
use crate::models::stage::{RESULTS_DIR, REVIEW_SUFFIX, SUBMISSIONS_DIR};

/// 保存 JSON 产物
pub async fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)
        .with_context(|| format!("无法序列化为JSON: {}", path.display()))?;
    fs::write(path, content)
        .await
        .with_context(|| format!("无法写入文件: {}", path.display()))?;
    Ok(())
}

/// 读取 JSON 产物
pub async fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取文件: {}", path.display()))?;
    let value = serde_json::from_str(&content)
        .with_context(|| format!("无法解析JSON文件: {}", path.display()))?;
    Ok(value)
}

/// 保存复核表（TOML）
pub async fn save_review_sheet(path: &Path, sheet: &ReviewSheet) -> Result<()> {
    let content = toml::to_string_pretty(sheet)
        .with_context(|| format!("无法序列化复核表: {}", path.display()))?;
    fs::write(path, content)
        .await
        .with_context(|| format!("无法写入复核表: {}", path.display()))?;
    Ok(())
}

/// 读取复核表（TOML，可能经过人工编辑）
pub async fn load_review_sheet(path: &Path) -> Result<ReviewSheet> {
    let content = fs::read_to_string(path)
        .await
        .with_context(|| format!("无法读取复核表: {}", path.display()))?;
    let sheet: ReviewSheet = toml::from_str(&content)
        .with_context(|| format!("无法解析复核表TOML: {}", path.display()))?;
    Ok(sheet)
}

/// 创建一次运行的目录结构，返回运行根目录
///
/// 目录名：<作业名安全化>_<时间戳>，下含 submissions/ 和 results/
pub async fn create_run_folder(output_root: &Path, assignment_name: &str) -> Result<PathBuf> {
    let date_str = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let safe_name = sanitize_name(assignment_name);
    let run_root = output_root.join(format!("{}_{}", safe_name, date_str));

    fs::create_dir_all(run_root.join(SUBMISSIONS_DIR))
        .await
        .with_context(|| format!("无法创建提交目录: {}", run_root.display()))?;
    fs::create_dir_all(run_root.join(RESULTS_DIR))
        .await
        .with_context(|| format!("无法创建结果目录: {}", run_root.display()))?;

    Ok(run_root)
}

/// 复核表路径：results/<作业名安全化>_REVIEW.toml
pub fn review_sheet_path(run_root: &Path, assignment_name: &str) -> PathBuf {
    run_root
        .join(RESULTS_DIR)
        .join(format!("{}{}", sanitize_name(assignment_name), REVIEW_SUFFIX))
}

/// 作业名安全化：只保留字母数字、短横线、下划线，空白折叠为下划线
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut last_was_sep = false;
    for c in name.chars() {
        if c.is_alphanumeric() {
            out.push(c);
            last_was_sep = false;
        } else if (c.is_whitespace() || c == '-' || c == '_') && !last_was_sep && !out.is_empty() {
            out.push('_');
            last_was_sep = true;
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("assignment");
    }
    out
}
