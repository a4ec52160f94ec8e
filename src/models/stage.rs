//! 流水线阶段与运行描述符
//!
//! 阶段推进的持久依据是磁盘上的产物文件，而不是内存状态：
//! 进程中断后可以通过扫描运行目录重建出正确的阶段。

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// 身份映射文件名
pub const MAPPING_FILE: &str = "student_mapping.json";
/// 提交记录文件名
pub const RECORDS_FILE: &str = "submission_records.json";
/// 评分结果文件名
pub const GRADED_FILE: &str = "graded_results.json";
/// 评分细则产物文件名（下载阶段解析后落盘，评分阶段复用）
pub const RUBRIC_FILE: &str = "rubric.json";
/// 复核表文件名后缀（放在 results/ 下）
pub const REVIEW_SUFFIX: &str = "_REVIEW.toml";
/// 上传报告文件名（放在 results/ 下）
pub const UPLOAD_REPORT_FILE: &str = "upload_report.txt";
/// 提交文件子目录
pub const SUBMISSIONS_DIR: &str = "submissions";
/// 结果子目录
pub const RESULTS_DIR: &str = "results";

/// 流水线阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    NotStarted,
    Downloaded,
    Graded,
    ReviewReady,
    Uploaded,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::NotStarted => "NotStarted",
            Stage::Downloaded => "Downloaded",
            Stage::Graded => "Graded",
            Stage::ReviewReady => "ReviewReady",
            Stage::Uploaded => "Uploaded",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// 运行描述符
///
/// 唯一的可变字段是 stage；磁盘产物是阶段完成的权威记录
#[derive(Debug, Clone)]
pub struct RunDescriptor {
    pub stage: Stage,
    pub folder_root: PathBuf,
}

impl RunDescriptor {
    /// 通过扫描运行目录重建阶段（纯函数，只读文件系统）
    ///
    /// 按阶段从后往前检查产物：
    /// - results/upload_report.txt 存在 → Uploaded
    /// - results/*_REVIEW.toml 存在 → ReviewReady
    /// - graded_results.json 存在 → Graded
    /// - student_mapping.json 存在 → Downloaded
    /// - 否则 → NotStarted
    pub fn detect(folder_root: &Path) -> Self {
        let stage = Self::detect_stage(folder_root);
        Self {
            stage,
            folder_root: folder_root.to_path_buf(),
        }
    }

    fn detect_stage(root: &Path) -> Stage {
        let results = root.join(RESULTS_DIR);

        if results.join(UPLOAD_REPORT_FILE).exists() {
            return Stage::Uploaded;
        }
        if Self::find_review_file(root).is_some() {
            return Stage::ReviewReady;
        }
        if root.join(GRADED_FILE).exists() {
            return Stage::Graded;
        }
        if root.join(MAPPING_FILE).exists() {
            return Stage::Downloaded;
        }
        Stage::NotStarted
    }

    /// 在 results/ 下查找复核表文件
    pub fn find_review_file(root: &Path) -> Option<PathBuf> {
        let results = root.join(RESULTS_DIR);
        let entries = std::fs::read_dir(&results).ok()?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path
                .file_name()
                .and_then(|n| n.to_str())
                .map_or(false, |n| n.ends_with(REVIEW_SUFFIX))
            {
                return Some(path);
            }
        }
        None
    }
}
