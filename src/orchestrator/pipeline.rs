//! 评分流水线 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的核心状态机，驱动严格的阶段推进：
//!
//! ```text
//! NotStarted --download()--> Downloaded --grade()--> Graded
//!     --prepare_review()--> ReviewReady --upload()--> Uploaded
//! ```
//!
//! ## 核心功能
//!
//! 1. **阶段门控**：每个操作检查前置阶段，不满足时报配置错误且阶段不变
//! 2. **幂等下载**：`Downloaded` 之后再调 `download()` 直接返回已有提交集
//! 3. **逐份落盘**：评分和上传每处理一份就保存产物，中断后可续跑
//! 4. **匿名边界**：评分引擎只见匿名令牌，复核和上传才解析回真实身份
//! 5. **预算核算**：下载后按提交内容估算 token/成本并记账提示
//!
//! ## 设计特点
//!
//! - 阶段完成的权威记录是磁盘产物，内存丢失后可用 `RunDescriptor::detect` 重建
//! - 对外部服务的每次调用都容忍频率限制（等待后重试同一请求）
//! - 单份失败记录在案，绝不中断批次

use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::clients::{GradeEngine, LmsApi};
use crate::config::Config;
use crate::error::{AppError, AppResult, ConfigError};
use crate::models::loaders::artifact_loader;
use crate::models::review::{ReviewRow, ReviewSheet, UploadStatus};
use crate::models::rubric::Rubric;
use crate::models::stage::{
    RunDescriptor, Stage, GRADED_FILE, MAPPING_FILE, RECORDS_FILE, RUBRIC_FILE, SUBMISSIONS_DIR,
};
use crate::models::submission::{GradeStatus, GradedResult, SubmissionRecord};
use crate::services::extractor::{self, estimate_submission_tokens};
use crate::services::report_writer::ReportWriter;
use crate::services::{
    Budget, BudgetLedger, ContentExtractor, IdentityAnonymizer, Impact, ItemSource,
    PricingSource, StaticPricing, SubmissionReconciler,
};
use crate::workflow::{GradingFlow, SubmissionCtx};

/// 频率限制的最大等待重试次数
const MAX_RATE_LIMIT_RETRIES: u32 = 3;

/// 在线文本正文在提交目录里的文件名
const ONLINE_TEXT_FILE: &str = "online_text.txt";

/// 课程资料拼进提示词的最大字符数
const MATERIAL_CONTEXT_MAX_CHARS: usize = 8_000;

/// 阶段进度事件（给前端/调用方渲染用）
#[derive(Debug, Clone)]
pub struct StageProgress {
    pub stage: Stage,
    pub current: usize,
    pub total: usize,
    /// 当前处理项的标签（匿名令牌等）
    pub label: String,
}

impl StageProgress {
    /// 完成百分比（0-100）
    pub fn percent(&self) -> u32 {
        if self.total == 0 {
            100
        } else {
            (self.current * 100 / self.total) as u32
        }
    }
}

/// 进度回调
pub type ProgressCallback = Box<dyn Fn(&StageProgress) + Send + Sync>;

/// 单个阶段的执行汇总
#[derive(Debug, Clone, Default)]
pub struct StageReport {
    pub attempted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// (匿名令牌, 失败原因)
    pub failures: Vec<(String, String)>,
}

impl StageReport {
    fn record_success(&mut self) {
        self.attempted += 1;
        self.succeeded += 1;
    }

    fn record_failure(&mut self, label: impl Into<String>, reason: impl Into<String>) {
        self.attempted += 1;
        self.failed += 1;
        self.failures.push((label.into(), reason.into()));
    }
}

/// 评分流水线
///
/// 泛型参数把外部协作者抽象掉：LMS 客户端、评分引擎、文本提取器
/// 都通过窄接口注入，方便测试替换。
pub struct GradingPipeline<L, G, X> {
    config: Config,
    lms: L,
    engine: G,
    extractor: X,
    run: RunDescriptor,
    progress: Option<ProgressCallback>,
}

impl<L: LmsApi, G: GradeEngine, X: ContentExtractor> GradingPipeline<L, G, X> {
    /// 创建全新的流水线运行（新建运行目录，阶段为 NotStarted）
    pub async fn create(config: Config, lms: L, engine: G, extractor: X) -> AppResult<Self> {
        let run_root = artifact_loader::create_run_folder(
            Path::new(&config.output_root),
            &config.assignment_name,
        )
        .await
        .map_err(wrap_artifact_err)?;

        info!("📁 运行目录: {}", run_root.display());

        Ok(Self {
            config,
            lms,
            engine,
            extractor,
            run: RunDescriptor {
                stage: Stage::NotStarted,
                folder_root: run_root,
            },
            progress: None,
        })
    }

    /// 从已有运行目录恢复（扫描磁盘产物重建阶段）
    pub fn resume(config: Config, lms: L, engine: G, extractor: X, run_root: &Path) -> Self {
        let run = RunDescriptor::detect(run_root);
        info!(
            "📁 恢复运行目录: {} (检测到阶段: {})",
            run_root.display(),
            run.stage
        );

        Self {
            config,
            lms,
            engine,
            extractor,
            run,
            progress: None,
        }
    }

    /// 当前阶段
    pub fn stage(&self) -> Stage {
        self.run.stage
    }

    /// 运行根目录
    pub fn run_root(&self) -> &Path {
        &self.run.folder_root
    }

    /// 设置进度回调
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress = Some(callback);
    }

    fn report_progress(&self, current: usize, total: usize, label: &str) {
        if let Some(callback) = &self.progress {
            callback(&StageProgress {
                stage: self.run.stage,
                current,
                total,
                label: label.to_string(),
            });
        }
    }

    /// 阶段门控：前置阶段不满足时报配置错误，阶段不变
    fn require_stage(&self, required: Stage) -> AppResult<()> {
        if self.run.stage < required {
            return Err(AppError::stage_not_ready(
                required.name(),
                self.run.stage.name(),
            ));
        }
        Ok(())
    }

    // ========== 阶段 1: 下载 ==========

    /// 下载全部提交并匿名化
    ///
    /// 前置条件：已解析出评分细则（本地文件或 LMS），否则报配置
    /// 错误且不下载任何内容。`Downloaded` 之后重复调用是幂等的：
    /// 直接返回已有提交集，不重新下载也不重复分配令牌。
    pub async fn download(&mut self) -> AppResult<Vec<SubmissionRecord>> {
        if self.run.stage >= Stage::Downloaded {
            info!("✓ 已处于 {} 阶段，直接返回已有提交集", self.run.stage);
            return self.load_records().await;
        }

        // 前置条件：细则必须先解析成功，失败时不产生任何副作用
        let rubric = self.resolve_rubric().await?;
        info!(
            "📋 评分细则: {} (满分 {}, {} 项标准)",
            rubric.assignment_title,
            rubric.total_points,
            rubric.criteria.len()
        );

        let submissions = with_rate_limit_retry(|| {
            self.lms
                .list_submissions(self.config.course_id, self.config.assignment_id)
        })
        .await?;

        info!("📦 LMS 返回 {} 份提交", submissions.len());

        // 下载前先按附件元数据粗估一次成本，超预算时提前提醒
        self.report_preliminary_budget(&submissions);

        let mut anonymizer = IdentityAnonymizer::new();
        let mut records = Vec::new();
        let total = submissions.len();

        // 保持 LMS 返回顺序处理，令牌分配才是确定可复现的
        for (idx, submission) in submissions.iter().enumerate() {
            let anon_token = anonymizer.anonymize(&submission.real_name, submission.external_id);
            self.report_progress(idx + 1, total, &anon_token);

            if !submission.has_content() {
                info!("  {} 没有提交内容，记录空提交", anon_token);
                records.push(SubmissionRecord {
                    anon_token,
                    external_id: submission.external_id,
                    files: Vec::new(),
                    extracted_text: None,
                });
                continue;
            }

            // 目录名带上 external_id：同名学生共用令牌，单凭令牌会把
            // 两个人的文件混进同一个目录
            let token_dir = self
                .run
                .folder_root
                .join(SUBMISSIONS_DIR)
                .join(format!("{}_{}", anon_token, submission.external_id));
            tokio::fs::create_dir_all(&token_dir).await?;

            let mut files = Vec::new();
            for attachment in &submission.attachments {
                let dest = token_dir.join(&attachment.filename);
                let result =
                    with_rate_limit_retry(|| self.lms.download_file(&attachment.url, &dest)).await;
                match result {
                    Ok(()) => files.push(dest),
                    Err(e) => {
                        // 单个附件下载失败不中断整体下载
                        warn!("  ⚠️ {} 附件下载失败 ({}): {}", anon_token, attachment.filename, e);
                    }
                }
            }

            // 正文先脱敏再落盘：submission_records.json 和提交目录里
            // 都不允许出现真实姓名
            let extracted_text = submission
                .body
                .as_deref()
                .map(crate::utils::strip_html)
                .map(|t| anonymizer.redact(&t))
                .filter(|t| !t.is_empty());

            if let Some(text) = &extracted_text {
                tokio::fs::write(token_dir.join(ONLINE_TEXT_FILE), text).await?;
            }

            info!("  ✓ {} 下载完成，{} 个文件", anon_token, files.len());
            records.push(SubmissionRecord {
                anon_token,
                external_id: submission.external_id,
                files,
                extracted_text,
            });
        }

        // 预算核算（只提示，不阻断）
        self.report_budget(&records);

        // 先落盘产物，再推进阶段：映射文件是 Downloaded 的权威记录
        anonymizer
            .persist(&self.run.folder_root.join(MAPPING_FILE))
            .map_err(wrap_artifact_err)?;
        artifact_loader::save_json(&self.run.folder_root.join(RECORDS_FILE), &records)
            .await
            .map_err(wrap_artifact_err)?;
        artifact_loader::save_json(&self.run.folder_root.join(RUBRIC_FILE), &rubric)
            .await
            .map_err(wrap_artifact_err)?;

        self.run.stage = Stage::Downloaded;
        info!("✓ 下载阶段完成: {} 份提交，{} 个身份映射", records.len(), anonymizer.len());

        Ok(records)
    }

    /// 解析评分细则：运行目录产物 → LMS → 本地文件，全部失败报配置错误
    async fn resolve_rubric(&self) -> AppResult<Rubric> {
        let artifact_path = self.run.folder_root.join(RUBRIC_FILE);
        if artifact_path.exists() {
            return artifact_loader::load_json(&artifact_path)
                .await
                .map_err(wrap_artifact_err);
        }

        match with_rate_limit_retry(|| {
            self.lms
                .fetch_rubric(self.config.course_id, self.config.assignment_id)
        })
        .await
        {
            Ok(Some(rubric)) => {
                info!("✓ 从 LMS 获取到评分细则");
                return Ok(rubric);
            }
            Ok(None) => {
                info!("LMS 上没有评分细则，尝试本地文件");
            }
            Err(e) => {
                warn!("⚠️ 从 LMS 获取评分细则失败: {}，尝试本地文件", e);
            }
        }

        let local_path = Path::new(&self.config.rubric_path);
        if !self.config.rubric_path.is_empty() && local_path.exists() {
            info!("✓ 使用本地评分细则: {}", local_path.display());
            return artifact_loader::load_json(local_path)
                .await
                .map_err(wrap_artifact_err);
        }

        Err(AppError::Config(ConfigError::RubricMissing))
    }

    /// 下载前的粗估：只凭 LMS 返回的附件文件名和字节大小
    fn report_preliminary_budget(&self, submissions: &[crate::models::submission::LmsSubmission]) {
        use crate::services::estimator::{self, FileDescriptor, FileFormat};

        let price = self.resolve_price();
        let mut ledger = BudgetLedger::new(Budget::Cost(self.config.budget_cost), price);

        for (idx, submission) in submissions.iter().enumerate() {
            let tokens: u64 = submission
                .attachments
                .iter()
                .map(|att| {
                    estimator::estimate_tokens(&FileDescriptor {
                        format: FileFormat::from_path(Path::new(&att.filename)),
                        byte_size: att.size,
                        text: None,
                    })
                })
                .sum();
            ledger.add_item(ItemSource::Submission, format!("submission_{}", idx + 1), tokens);
        }

        let totals = ledger.total();
        info!(
            "📊 下载前粗估: 约 {} tokens ≈ ${:.4}（按附件元数据）",
            totals.tokens, totals.cost
        );
        if ledger.remaining() < 0.0 {
            warn!("⚠️ 粗估成本已超出预算 ${:.2}，可以现在中止", self.config.budget_cost);
        }
    }

    fn resolve_price(&self) -> f64 {
        if self.config.price_per_1k_override > 0.0 {
            self.config.price_per_1k_override
        } else {
            StaticPricing::new().price_per_1k(&self.config.llm_model_name)
        }
    }

    /// 下载后的核算：按实际落盘文件和提取文本估算
    ///
    /// 课程资料每次评分都会进入提示词，所以和提交一起记账。
    fn report_budget(&self, records: &[SubmissionRecord]) {
        let price = self.resolve_price();
        let mut ledger = BudgetLedger::new(Budget::Cost(self.config.budget_cost), price);

        for path in extractor::material_paths(&self.config.course_materials) {
            let tokens = estimate_submission_tokens(&self.extractor, std::slice::from_ref(&path));
            let label = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            ledger.add_item(ItemSource::CourseMaterial, label, tokens);
        }

        for record in records {
            let mut tokens = estimate_submission_tokens(&self.extractor, &record.files);
            if let Some(text) = &record.extracted_text {
                tokens += (text.chars().count() as u64 / 4).max(1);
            }
            let item = ledger.add_item(ItemSource::Submission, &record.anon_token, tokens);
            if item.impact == Impact::High {
                warn!(
                    "⚠️ {} 预计消耗较高: {} tokens (≈ ${:.4})",
                    record.anon_token, item.tokens, item.cost
                );
            }
        }

        let totals = ledger.total();
        let remaining = ledger.remaining();
        info!(
            "📊 预算核算: 预计 {} tokens ≈ ${:.4}，预算 ${:.2}，剩余 ${:.4}",
            totals.tokens, totals.cost, self.config.budget_cost, remaining
        );
        if remaining < 0.0 {
            warn!("⚠️ 预计成本超出预算，请确认后再继续评分");
        }
    }

    // ========== 阶段 2: 评分 ==========

    /// 对每份提交调用评分引擎（只送匿名内容）
    ///
    /// 前置条件：`Downloaded`。单份失败记为 error 结果，不中断批次；
    /// 每评完一份就落盘，中断后续跑只补未评分的。
    pub async fn grade(&mut self) -> AppResult<StageReport> {
        self.require_stage(Stage::Downloaded)?;

        let records = self.load_records().await?;
        let anonymizer = IdentityAnonymizer::load(&self.run.folder_root.join(MAPPING_FILE))
            .map_err(wrap_artifact_err)?;
        let rubric: Rubric = artifact_loader::load_json(&self.run.folder_root.join(RUBRIC_FILE))
            .await
            .map_err(wrap_artifact_err)?;

        // 续跑：已有结果文件时跳过评分成功的令牌，失败的重试
        let graded_path = self.run.folder_root.join(GRADED_FILE);
        let mut results: Vec<GradedResult> = if graded_path.exists() {
            artifact_loader::load_json(&graded_path)
                .await
                .map_err(wrap_artifact_err)?
        } else {
            Vec::new()
        };

        // 课程资料上下文对批次内每份提交都一样，评分前拼装一次
        let materials = extractor::material_paths(&self.config.course_materials);
        let course_context = extractor::summarize_materials(
            &self.extractor,
            &materials,
            MATERIAL_CONTEXT_MAX_CHARS,
        );
        let flow = GradingFlow::new(&self.config, &self.engine, &self.extractor)
            .with_course_context(&course_context);
        let mut report = StageReport::default();
        let total = records.len();

        for (idx, record) in records.iter().enumerate() {
            self.report_progress(idx + 1, total, &record.anon_token);

            let already_graded = results
                .iter()
                .any(|r| r.anon_token == record.anon_token && r.status == GradeStatus::Graded);
            if already_graded {
                info!("  {} 已有评分结果，跳过", record.anon_token);
                report.record_success();
                continue;
            }

            let ctx = SubmissionCtx::new(record.anon_token.clone(), idx + 1, total);
            let result = flow.run(record, &rubric, &anonymizer, &ctx).await;

            match result.status {
                GradeStatus::Graded => report.record_success(),
                GradeStatus::Error => {
                    report.record_failure(&record.anon_token, &result.feedback)
                }
            }

            // 同一令牌重评时替换旧结果
            results.retain(|r| r.anon_token != record.anon_token);
            results.push(result);
            artifact_loader::save_json(&graded_path, &results)
                .await
                .map_err(wrap_artifact_err)?;
        }

        self.run.stage = Stage::Graded;
        info!(
            "✓ 评分阶段完成: 成功 {}/{}，失败 {}",
            report.succeeded, report.attempted, report.failed
        );

        Ok(report)
    }

    // ========== 阶段 3: 生成复核表 ==========

    /// 联合评分结果和身份映射，生成供人工编辑的复核表
    ///
    /// 前置条件：`Graded`。每份已评分提交恰好一行；身份解析失败的
    /// 行降级为占位标签，不会被丢弃。返回复核表路径。
    pub async fn prepare_review(&mut self) -> AppResult<PathBuf> {
        self.require_stage(Stage::Graded)?;

        let records = self.load_records().await?;
        let results: Vec<GradedResult> =
            artifact_loader::load_json(&self.run.folder_root.join(GRADED_FILE))
                .await
                .map_err(wrap_artifact_err)?;
        let anonymizer = IdentityAnonymizer::load(&self.run.folder_root.join(MAPPING_FILE))
            .map_err(wrap_artifact_err)?;

        let reconciler = SubmissionReconciler::new(&records);
        let external_ids: std::collections::HashMap<&str, i64> = records
            .iter()
            .map(|r| (r.anon_token.as_str(), r.external_id))
            .collect();

        let mut sheet = ReviewSheet::new(&self.config.assignment_name);
        let total = results.len();

        for (idx, result) in results.iter().enumerate() {
            self.report_progress(idx + 1, total, &result.anon_token);

            let external_id = external_ids
                .get(result.anon_token.as_str())
                .copied()
                .unwrap_or(0);
            let identity =
                reconciler.resolve_for_review(&result.anon_token, external_id, &anonymizer);

            sheet.rows.push(ReviewRow::from_graded(
                result,
                identity.real_name,
                identity.external_id,
            ));
        }

        let review_path =
            artifact_loader::review_sheet_path(&self.run.folder_root, &self.config.assignment_name);
        artifact_loader::save_review_sheet(&review_path, &sheet)
            .await
            .map_err(wrap_artifact_err)?;

        let writer = ReportWriter::new(&self.run.folder_root);
        writer
            .write_instructions(&self.config.assignment_name, &review_path)
            .await
            .map_err(wrap_artifact_err)?;

        self.run.stage = Stage::ReviewReady;
        info!("✓ 复核表已生成: {} ({} 行)", review_path.display(), sheet.rows.len());

        Ok(review_path)
    }

    // ========== 阶段 4: 上传 ==========

    /// 读回（可能经人工编辑的）复核表，把最终成绩逐行上传到 LMS
    ///
    /// 前置条件：`ReviewReady`。单行失败记录在行上和汇总里，不中断
    /// 批次；每上传一行就保存复核表。全部行尝试过后推进到 `Uploaded`
    /// 并写上传报告。
    pub async fn upload(&mut self) -> AppResult<StageReport> {
        self.require_stage(Stage::ReviewReady)?;

        let review_path = RunDescriptor::find_review_file(&self.run.folder_root)
            .ok_or_else(|| {
                AppError::Config(ConfigError::StageNotReady {
                    required: Stage::ReviewReady.name().to_string(),
                    current: "复核表文件缺失".to_string(),
                })
            })?;
        let mut sheet = artifact_loader::load_review_sheet(&review_path)
            .await
            .map_err(wrap_artifact_err)?;

        let mut report = StageReport::default();
        let total = sheet.rows.len();

        for idx in 0..total {
            let (anon_token, label) = {
                let row = &sheet.rows[idx];
                (row.anon_token.clone(), format!("{} ({})", row.anon_token, row.real_name))
            };
            self.report_progress(idx + 1, total, &anon_token);

            // 已上传的行续跑时跳过
            if sheet.rows[idx].upload_status == UploadStatus::Uploaded {
                info!("  {} 已上传，跳过", label);
                report.record_success();
                continue;
            }

            // 评分失败且未人工改分的行不上传
            if sheet.rows[idx].grade_status == GradeStatus::Error
                && sheet.rows[idx].final_score <= 0.0
            {
                warn!("  ⚠️ {} 评分失败且未人工改分，跳过上传", label);
                report.record_failure(&anon_token, "评分失败，需要人工评分后再上传");
                sheet.rows[idx].upload_status = UploadStatus::Failed;
                continue;
            }

            let grade = format!("{}", sheet.rows[idx].final_score);
            let comment = sheet.rows[idx].final_feedback.clone();
            let external_id = sheet.rows[idx].external_id;

            let result = with_rate_limit_retry(|| {
                self.lms.post_grade(
                    self.config.course_id,
                    self.config.assignment_id,
                    external_id,
                    &grade,
                    &comment,
                )
            })
            .await;

            match result {
                Ok(()) => {
                    info!("  📤 {} 上传成功: {}", label, grade);
                    sheet.rows[idx].upload_status = UploadStatus::Uploaded;
                    report.record_success();
                }
                Err(e) => {
                    warn!("  ❌ {} 上传失败: {}", label, e);
                    sheet.rows[idx].upload_status = UploadStatus::Failed;
                    report.record_failure(&anon_token, e.to_string());
                }
            }

            artifact_loader::save_review_sheet(&review_path, &sheet)
                .await
                .map_err(wrap_artifact_err)?;
        }

        let writer = ReportWriter::new(&self.run.folder_root);
        let report_path = writer
            .write_upload_report(
                self.config.course_id,
                self.config.assignment_id,
                report.attempted,
                report.succeeded,
                report.failed,
            )
            .await
            .map_err(wrap_artifact_err)?;

        self.run.stage = Stage::Uploaded;
        info!(
            "✓ 上传阶段完成: 成功 {}/{}，报告: {}",
            report.succeeded, report.attempted, report_path.display()
        );

        Ok(report)
    }

    /// 读取持久化的提交记录
    async fn load_records(&self) -> AppResult<Vec<SubmissionRecord>> {
        artifact_loader::load_json(&self.run.folder_root.join(RECORDS_FILE))
            .await
            .map_err(wrap_artifact_err)
    }
}

/// 对外部调用做频率限制重试：等待服务端建议的秒数后重发同一请求
async fn with_rate_limit_retry<T, F, Fut>(mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = AppResult<T>>,
{
    let mut waits = 0u32;
    loop {
        match op().await {
            Err(e) if e.is_rate_limited() && waits < MAX_RATE_LIMIT_RETRIES => {
                let secs = e.retry_after_secs().unwrap_or(60);
                warn!("⏳ 触发频率限制，等待 {} 秒后重试: {}", secs, e);
                tokio::time::sleep(Duration::from_secs(secs)).await;
                waits += 1;
            }
            other => return other,
        }
    }
}

/// 产物读写错误统一包装
fn wrap_artifact_err(e: anyhow::Error) -> AppError {
    AppError::Other(format!("{:#}", e))
}
