//! 应用入口 - 编排层
//!
//! ## 职责
//!
//! 管理应用生命周期（初始化、运行），把两步式人机协作流程
//! 映射到流水线阶段上：
//!
//! - **第一步**：下载 → 评分 → 生成复核表，然后停下等人工复核
//! - **第二步**：设置 `RESUME_RUN_ROOT` 指向运行目录后再次运行，
//!   读回编辑过的复核表并上传成绩
//!
//! ## 设计特点
//!
//! - **顶层编排**：不处理单份提交的细节，向下委托给流水线
//! - **断点恢复**：恢复运行时按磁盘产物检测阶段，从中断处继续

use anyhow::Result;
use std::path::Path;
use tracing::{info, warn};

use crate::clients::{CanvasClient, LlmGrader};
use crate::config::Config;
use crate::models::stage::Stage;
use crate::orchestrator::pipeline::GradingPipeline;
use crate::services::{CredentialStore, EnvCredentialStore, PlainTextExtractor};
use crate::utils::logging::{init_log_file, log_stage_complete, log_stage_start, log_startup};

/// 应用主结构
pub struct App {
    config: Config,
    pipeline: GradingPipeline<CanvasClient, LlmGrader, PlainTextExtractor>,
}

impl App {
    /// 初始化应用
    pub async fn initialize(mut config: Config) -> Result<Self> {
        // 初始化日志文件
        if !config.output_log_file.is_empty() {
            init_log_file(&config.output_log_file)?;
        }

        log_startup(&config.assignment_name, &config.llm_model_name);

        // 配置里没有凭证时从凭证存储补齐，缺失直接报清晰的配置错误
        let store = EnvCredentialStore::new();
        if config.lms_api_token.is_empty() {
            config.lms_api_token = store.get_secret("LMS_API_TOKEN")?;
        }
        if config.llm_api_key.is_empty() {
            config.llm_api_key = store.get_secret("LLM_API_KEY")?;
        }

        let lms = CanvasClient::new(&config);
        let engine = LlmGrader::new(&config);
        let extractor = PlainTextExtractor::new();

        // 指定了恢复目录时从磁盘产物重建阶段，否则新建一次运行
        let pipeline = if config.resume_run_root.is_empty() {
            GradingPipeline::create(config.clone(), lms, engine, extractor).await?
        } else {
            GradingPipeline::resume(
                config.clone(),
                lms,
                engine,
                extractor,
                Path::new(&config.resume_run_root),
            )
        };

        Ok(Self { config, pipeline })
    }

    /// 运行应用主逻辑：按当前阶段推进到下一个人工决策点
    pub async fn run(&mut self) -> Result<()> {
        match self.pipeline.stage() {
            Stage::NotStarted | Stage::Downloaded | Stage::Graded => self.run_step_one().await,
            Stage::ReviewReady => self.run_step_two().await,
            Stage::Uploaded => {
                info!("✓ 本次运行已完成上传，无需继续");
                Ok(())
            }
        }
    }

    /// 第一步：下载 → 评分 → 生成复核表
    async fn run_step_one(&mut self) -> Result<()> {
        if self.pipeline.stage() < Stage::Downloaded {
            log_stage_start("下载提交");
            let records = self.pipeline.download().await?;
            log_stage_complete("下载提交", records.len(), records.len());

            if records.is_empty() {
                warn!("⚠️ 没有找到任何提交，程序结束");
                return Ok(());
            }
        }

        if self.pipeline.stage() < Stage::Graded {
            log_stage_start("匿名评分");
            let report = self.pipeline.grade().await?;
            log_stage_complete("匿名评分", report.succeeded, report.attempted);

            for (token, reason) in &report.failures {
                warn!("  ❌ {} 评分失败: {}", token, reason);
            }
        }

        log_stage_start("生成复核表");
        let review_path = self.pipeline.prepare_review().await?;

        info!("\n{}", "=".repeat(60));
        info!("📋 第一步完成，请人工复核:");
        info!("  1. 打开复核表: {}", review_path.display());
        info!("  2. 按需修改 final_score / final_feedback 并保存");
        info!(
            "  3. 设置 RESUME_RUN_ROOT={} 后再次运行，执行上传",
            self.pipeline.run_root().display()
        );
        info!("{}", "=".repeat(60));

        Ok(())
    }

    /// 第二步：读回复核表并上传成绩
    async fn run_step_two(&mut self) -> Result<()> {
        log_stage_start("上传成绩");
        let report = self.pipeline.upload().await?;
        log_stage_complete("上传成绩", report.succeeded, report.attempted);

        for (token, reason) in &report.failures {
            warn!("  ❌ {} 上传失败: {}", token, reason);
        }

        info!(
            "📤 上传完成: 课程 {} / 作业 {} ({})",
            self.config.course_id, self.config.assignment_id, self.config.assignment_name
        );

        Ok(())
    }
}
