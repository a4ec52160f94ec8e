//! 文本提取服务 - 业务能力层
//!
//! 按格式提取文件文本。提取失败一律降级为"无文本"，
//! 不向上传播：该份提交仍然会带着现有内容进入评分。

use std::path::Path;
use tracing::warn;

use crate::error::{AppError, AppResult, ExtractionError};
use crate::services::estimator::{FileFormat, FileDescriptor};

/// 文本提取能力
pub trait ContentExtractor {
    /// 提取文件的文本内容
    fn extract_text(&self, path: &Path) -> AppResult<String>;
}

/// 纯文本类格式的提取实现
///
/// 只处理能按 UTF-8 读取的格式（txt/md/html/csv 等）；
/// 二进制文档格式返回 UnsupportedFormat，由调用方降级处理。
#[derive(Debug, Default)]
pub struct PlainTextExtractor;

impl PlainTextExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl ContentExtractor for PlainTextExtractor {
    fn extract_text(&self, path: &Path) -> AppResult<String> {
        match FileFormat::from_path(path) {
            FileFormat::Text => std::fs::read_to_string(path).map_err(|e| {
                AppError::Extraction(ExtractionError::Unreadable {
                    path: path.display().to_string(),
                    source: Box::new(e),
                })
            }),
            _ => Err(AppError::Extraction(ExtractionError::UnsupportedFormat {
                path: path.display().to_string(),
            })),
        }
    }
}

/// 提取文本，失败降级为 None（记录日志，不传播错误）
pub fn extract_or_none<X: ContentExtractor>(extractor: &X, path: &Path) -> Option<String> {
    match extractor.extract_text(path) {
        Ok(text) => Some(text),
        Err(e) => {
            warn!("⚠️ 文本提取降级为空内容 ({}): {}", path.display(), e);
            None
        }
    }
}

/// 解析逗号分隔的课程资料路径列表
///
/// 不存在的路径记警告后忽略，顺序保持配置里写的顺序。
pub fn material_paths(list: &str) -> Vec<std::path::PathBuf> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .filter_map(|s| {
            let path = std::path::PathBuf::from(s);
            if path.exists() {
                Some(path)
            } else {
                warn!("⚠️ 课程资料文件不存在，忽略: {}", s);
                None
            }
        })
        .collect()
}

/// 拼装课程资料上下文：各文件提取文本按文件名分节，超长截断
///
/// 提取失败的文件降级跳过，不影响其余资料。
pub fn summarize_materials<X: ContentExtractor>(
    extractor: &X,
    files: &[std::path::PathBuf],
    max_chars: usize,
) -> String {
    let mut parts = Vec::new();
    for path in files {
        if let Some(text) = extract_or_none(extractor, path) {
            if !text.trim().is_empty() {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                parts.push(format!("=== {} ===\n{}", name, text.trim()));
            }
        }
    }
    crate::utils::truncate_text(&parts.join("\n\n"), max_chars)
}

/// 为一份提交的所有文件构造估算描述符并汇总 token 数
pub fn estimate_submission_tokens<X: ContentExtractor>(
    extractor: &X,
    files: &[std::path::PathBuf],
) -> u64 {
    files
        .iter()
        .map(|path| {
            let text = extract_or_none(extractor, path);
            let desc = FileDescriptor::from_file(path, text);
            crate::services::estimator::estimate_tokens(&desc)
        })
        .sum()
}
