//! 运行报告写入服务 - 业务能力层
//!
//! 只负责写 INSTRUCTIONS.txt 和 upload_report.txt，不关心流程

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::models::stage::{RESULTS_DIR, UPLOAD_REPORT_FILE};

/// 运行报告写入服务
pub struct ReportWriter {
    run_root: PathBuf,
}

impl ReportWriter {
    pub fn new(run_root: impl Into<PathBuf>) -> Self {
        Self {
            run_root: run_root.into(),
        }
    }

    /// 写复核操作说明（纯文本，给教师看）
    pub async fn write_instructions(
        &self,
        assignment_name: &str,
        review_file: &Path,
    ) -> Result<()> {
        let review_name = review_file
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let instructions = format!(
            r#"匿名评分 - 两步流程
====================

作业: {assignment_name}
创建时间: {created}

第一步 - 已完成 ✓
================
- 已从 LMS 下载全部提交
- 学生姓名已匿名化后才送入 AI 评分
- 已按评分细则完成 AI 评分
- 已生成本复核文件夹

第二步 - 人工复核（现在做这一步）
================================
1. 打开复核表: {review_name}

2. 检查并编辑以下字段:
   - final_score: 需要调整时修改 AI 建议分数
   - final_feedback: 按需要修改评语
   - notes: 私人备注，不会上传

3. 保存复核表

4. 运行上传步骤，把成绩提交到 LMS

注意事项
========
- 送入 AI 的内容只含匿名令牌，复核表中才显示真实姓名
- 只编辑 final_* 和 notes 字段
- 不要修改 external_id（上传时用它回关联提交）
- student_mapping.json 含真实姓名映射，注意保密
"#,
            assignment_name = assignment_name,
            created = chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            review_name = review_name,
        );

        let path = self.run_root.join("INSTRUCTIONS.txt");
        debug!("写入操作说明: {}", path.display());
        std::fs::write(&path, instructions)?;

        Ok(())
    }

    /// 写上传报告，返回报告路径
    pub async fn write_upload_report(
        &self,
        course_id: i64,
        assignment_id: i64,
        total: usize,
        succeeded: usize,
        failed: usize,
    ) -> Result<PathBuf> {
        let report = format!(
            "成绩上传报告\n\
             ============\n\
             上传时间: {}\n\
             课程 ID: {}\n\
             作业 ID: {}\n\
             总行数: {}\n\
             上传成功: {}\n\
             上传失败: {}\n",
            chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
            course_id,
            assignment_id,
            total,
            succeeded,
            failed,
        );

        let path = self.run_root.join(RESULTS_DIR).join(UPLOAD_REPORT_FILE);
        debug!("写入上传报告: {}", path.display());
        std::fs::write(&path, report)?;

        Ok(path)
    }
}
