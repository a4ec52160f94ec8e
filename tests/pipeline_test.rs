//! 流水线状态机集成测试
//!
//! 用内存 mock 替换 LMS 和评分引擎，验证阶段门控、幂等下载、
//! 单份失败隔离、复核表往返和上传汇总。

use std::path::Path;
use std::sync::{Arc, Mutex};

use anon_grade_pipeline::clients::{EngineGrade, GradeEngine, LmsApi};
use anon_grade_pipeline::config::Config;
use anon_grade_pipeline::error::{AppError, AppResult, LmsError};
use anon_grade_pipeline::models::loaders::artifact_loader;
use anon_grade_pipeline::models::rubric::{Rubric, RubricCriterion};
use anon_grade_pipeline::models::stage::{RunDescriptor, Stage};
use anon_grade_pipeline::models::submission::{
    Assignment, Attachment, Course, GradeStatus, LmsSubmission,
};
use anon_grade_pipeline::orchestrator::GradingPipeline;
use anon_grade_pipeline::services::PlainTextExtractor;

// ========== Mock 协作者 ==========

#[derive(Clone)]
struct MockLms {
    submissions: Vec<LmsSubmission>,
    rubric: Option<Rubric>,
    posted: Arc<Mutex<Vec<(i64, String)>>>,
    fail_post_ids: Vec<i64>,
    /// 接下来 N 次 list_submissions 返回频率限制
    rate_limit_lists: Arc<Mutex<u32>>,
    list_calls: Arc<Mutex<u32>>,
}

impl MockLms {
    fn new(submissions: Vec<LmsSubmission>, rubric: Option<Rubric>) -> Self {
        Self {
            submissions,
            rubric,
            posted: Arc::new(Mutex::new(Vec::new())),
            fail_post_ids: Vec::new(),
            rate_limit_lists: Arc::new(Mutex::new(0)),
            list_calls: Arc::new(Mutex::new(0)),
        }
    }
}

impl LmsApi for MockLms {
    async fn list_courses(&self) -> AppResult<Vec<Course>> {
        Ok(Vec::new())
    }

    async fn list_assignments(&self, _course_id: i64) -> AppResult<Vec<Assignment>> {
        Ok(Vec::new())
    }

    async fn list_submissions(
        &self,
        _course_id: i64,
        _assignment_id: i64,
    ) -> AppResult<Vec<LmsSubmission>> {
        *self.list_calls.lock().expect("锁不应中毒") += 1;

        let mut remaining = self.rate_limit_lists.lock().expect("锁不应中毒");
        if *remaining > 0 {
            *remaining -= 1;
            return Err(AppError::Lms(LmsError::RateLimited {
                endpoint: "submissions".to_string(),
                retry_after: Some(30),
            }));
        }

        Ok(self.submissions.clone())
    }

    async fn fetch_rubric(
        &self,
        _course_id: i64,
        _assignment_id: i64,
    ) -> AppResult<Option<Rubric>> {
        Ok(self.rubric.clone())
    }

    async fn post_grade(
        &self,
        _course_id: i64,
        _assignment_id: i64,
        external_id: i64,
        grade: &str,
        _comment: &str,
    ) -> AppResult<()> {
        if self.fail_post_ids.contains(&external_id) {
            return Err(AppError::Lms(LmsError::BadResponse {
                endpoint: "submissions".to_string(),
                status: Some(500),
                message: Some("mock failure".to_string()),
            }));
        }
        self.posted
            .lock()
            .expect("锁不应中毒")
            .push((external_id, grade.to_string()));
        Ok(())
    }

    async fn download_file(&self, url: &str, dest: &Path) -> AppResult<()> {
        std::fs::write(dest, format!("file content from {}", url))?;
        Ok(())
    }
}

#[derive(Clone)]
struct MockEngine {
    fail_tokens: Vec<String>,
    /// (匿名令牌, 提交内容, 额外说明)
    seen: Arc<Mutex<Vec<(String, String, String)>>>,
}

impl MockEngine {
    fn new() -> Self {
        Self {
            fail_tokens: Vec::new(),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }

    fn failing_for(token: &str) -> Self {
        Self {
            fail_tokens: vec![token.to_string()],
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl GradeEngine for MockEngine {
    async fn grade(
        &self,
        anon_token: &str,
        content: &str,
        _rubric: &Rubric,
        extra_instructions: &str,
    ) -> AppResult<EngineGrade> {
        self.seen.lock().expect("锁不应中毒").push((
            anon_token.to_string(),
            content.to_string(),
            extra_instructions.to_string(),
        ));

        if self.fail_tokens.iter().any(|t| t == anon_token) {
            return Err(AppError::grading_api_failed(
                "mock-model",
                std::io::Error::other("mock engine failure"),
            ));
        }

        Ok(EngineGrade {
            score: 85.0,
            feedback: format!("{} 完成度良好", anon_token),
            per_criterion: Vec::new(),
        })
    }
}

// ========== 测试夹具 ==========

fn sample_rubric() -> Rubric {
    Rubric {
        assignment_title: "Essay Assignment 1".to_string(),
        total_points: 100.0,
        criteria: vec![
            RubricCriterion {
                name: "Argument".to_string(),
                points: 60.0,
                description: "Clear thesis and supporting evidence".to_string(),
            },
            RubricCriterion {
                name: "Style".to_string(),
                points: 40.0,
                description: String::new(),
            },
        ],
        grading_instructions: "Grade by the rubric.".to_string(),
    }
}

fn sample_submissions() -> Vec<LmsSubmission> {
    vec![
        LmsSubmission {
            external_id: 101,
            real_name: "Ana Li".to_string(),
            attachments: Vec::new(),
            body: Some("<p>My name is Ana Li and this is my essay.</p>".to_string()),
        },
        LmsSubmission {
            external_id: 102,
            real_name: "Bo Chen".to_string(),
            attachments: vec![Attachment {
                filename: "essay.txt".to_string(),
                url: "mock://essay-102".to_string(),
                size: 1024,
            }],
            body: None,
        },
    ]
}

fn test_config(output_root: &Path) -> Config {
    Config {
        output_root: output_root.display().to_string(),
        assignment_name: "Essay Assignment 1".to_string(),
        course_id: 1,
        assignment_id: 2,
        budget_cost: 1.0,
        price_per_1k_override: 0.005,
        ..Config::default()
    }
}

// ========== 阶段门控 ==========

#[tokio::test]
async fn test_grade_before_download_fails_and_stage_unchanged() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let lms = MockLms::new(sample_submissions(), Some(sample_rubric()));
    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms,
        MockEngine::new(),
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    let err = pipeline.grade().await.expect_err("未下载就评分应该失败");
    assert!(err.is_config(), "应该是配置/前置条件错误: {}", err);
    assert_eq!(pipeline.stage(), Stage::NotStarted, "阶段不应推进");

    let err = pipeline.upload().await.expect_err("未复核就上传应该失败");
    assert!(err.is_config());
    assert_eq!(pipeline.stage(), Stage::NotStarted);
}

#[tokio::test]
async fn test_download_without_rubric_fails_without_side_effects() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let lms = MockLms::new(sample_submissions(), None);
    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms,
        MockEngine::new(),
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    let err = pipeline.download().await.expect_err("没有细则时下载应该失败");
    assert!(err.is_config(), "应该是配置错误: {}", err);
    assert_eq!(pipeline.stage(), Stage::NotStarted);

    // 失败时不留下任何阶段产物
    assert!(!pipeline.run_root().join("student_mapping.json").exists());
}

// ========== 下载幂等 ==========

#[tokio::test]
async fn test_download_twice_is_idempotent() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    // 三份提交，其中两份同名（已知限制场景）
    let mut submissions = sample_submissions();
    submissions.push(LmsSubmission {
        external_id: 103,
        real_name: "Ana Li".to_string(),
        attachments: Vec::new(),
        body: Some("second Ana Li".to_string()),
    });

    let lms = MockLms::new(submissions, Some(sample_rubric()));
    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms,
        MockEngine::new(),
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    let first = pipeline.download().await.expect("首次下载失败");
    assert_eq!(pipeline.stage(), Stage::Downloaded);
    assert_eq!(first.len(), 3);
    assert_eq!(first[0].anon_token, "Student_001");
    assert_eq!(first[1].anon_token, "Student_002");
    // 同名第二个学生复用令牌（按现有行为断言）
    assert_eq!(first[2].anon_token, "Student_001");

    let second = pipeline.download().await.expect("重复下载失败");
    assert_eq!(second.len(), first.len(), "重复调用返回同一提交集");
    let tokens: Vec<_> = second.iter().map(|r| r.anon_token.clone()).collect();
    assert_eq!(tokens, vec!["Student_001", "Student_002", "Student_001"]);
}

// ========== 提交落盘隔离 ==========

#[tokio::test]
async fn test_same_name_students_download_to_separate_folders() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    // 两个同名学生，各自的附件同名但内容不同
    let submissions = vec![
        LmsSubmission {
            external_id: 101,
            real_name: "Ana Li".to_string(),
            attachments: vec![Attachment {
                filename: "essay.txt".to_string(),
                url: "mock://essay-101".to_string(),
                size: 512,
            }],
            body: None,
        },
        LmsSubmission {
            external_id: 103,
            real_name: "Ana Li".to_string(),
            attachments: vec![Attachment {
                filename: "essay.txt".to_string(),
                url: "mock://essay-103".to_string(),
                size: 512,
            }],
            body: None,
        },
    ];

    let lms = MockLms::new(submissions, Some(sample_rubric()));
    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms,
        MockEngine::new(),
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    let records = pipeline.download().await.expect("下载失败");

    // 同名学生共用令牌，落盘目录必须再按 external_id 区分
    assert_eq!(records[0].anon_token, "Student_001");
    assert_eq!(records[1].anon_token, "Student_001");

    let first = &records[0].files[0];
    let second = &records[1].files[0];
    assert_ne!(first, second, "两个学生的文件不能落进同一路径");
    assert!(first.to_string_lossy().contains("Student_001_101"));
    assert!(second.to_string_lossy().contains("Student_001_103"));

    let a = std::fs::read_to_string(first).expect("读取第一份附件失败");
    let b = std::fs::read_to_string(second).expect("读取第二份附件失败");
    assert_ne!(a, b, "后下载的附件不能覆盖先下载的");
}

#[tokio::test]
async fn test_online_text_is_redacted_before_hitting_disk() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let lms = MockLms::new(sample_submissions(), Some(sample_rubric()));
    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms,
        MockEngine::new(),
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    let records = pipeline.download().await.expect("下载失败");

    // 记录里的正文已脱敏
    let text = records[0].extracted_text.as_ref().expect("正文应被提取");
    assert!(!text.contains("Ana Li"), "记录正文不能包含真实姓名: {}", text);
    assert!(text.contains("Student_001"), "姓名应替换为令牌");

    // 正文同时作为文件保存在提交目录，同样已脱敏
    let body_path = pipeline
        .run_root()
        .join("submissions")
        .join("Student_001_101")
        .join("online_text.txt");
    assert!(body_path.exists(), "正文应落盘到提交目录");
    let on_disk = std::fs::read_to_string(&body_path).expect("读取正文文件失败");
    assert!(!on_disk.contains("Ana Li"), "落盘正文不能包含真实姓名: {}", on_disk);
}

// ========== 频率限制重试 ==========

#[tokio::test(start_paused = true)]
async fn test_rate_limited_lms_call_is_retried_not_failed() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let lms = MockLms::new(sample_submissions(), Some(sample_rubric()));
    *lms.rate_limit_lists.lock().expect("锁不应中毒") = 1;
    let list_calls = lms.list_calls.clone();

    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms,
        MockEngine::new(),
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    // 第一次 list 被限流，等待 Retry-After 秒后重发同一请求并成功
    let records = pipeline.download().await.expect("限流等待后重试应成功");
    assert_eq!(records.len(), 2);
    assert_eq!(pipeline.stage(), Stage::Downloaded);
    assert_eq!(
        *list_calls.lock().expect("锁不应中毒"),
        2,
        "限流响应应触发恰好一次重试"
    );
}

// ========== 课程资料 ==========

#[tokio::test]
async fn test_course_materials_reach_the_grading_prompt() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let syllabus = dir.path().join("syllabus.txt");
    std::fs::write(&syllabus, "Thesis statements must be argumentative.")
        .expect("写课程资料失败");

    // 列表里混一个不存在的路径，应被忽略而不是报错
    let mut config = test_config(dir.path());
    config.course_materials = format!(
        "{},{}",
        syllabus.display(),
        dir.path().join("missing.txt").display()
    );

    let lms = MockLms::new(sample_submissions(), Some(sample_rubric()));
    let engine = MockEngine::new();
    let seen = engine.seen.clone();
    let mut pipeline =
        GradingPipeline::create(config, lms, engine, PlainTextExtractor::new())
            .await
            .expect("创建流水线失败");

    pipeline.download().await.expect("下载失败");
    pipeline.grade().await.expect("评分失败");

    let calls = seen.lock().expect("锁不应中毒");
    assert_eq!(calls.len(), 2);
    for (token, _, extra) in calls.iter() {
        assert!(
            extra.contains("Thesis statements must be argumentative."),
            "{} 的评分调用应带课程资料上下文: {}",
            token,
            extra
        );
        assert!(extra.contains("syllabus.txt"), "上下文应按文件名分节");
    }
}

// ========== 完整两步流程 ==========

#[tokio::test(start_paused = true)]
async fn test_full_pipeline_with_per_item_failure_isolation() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let lms = MockLms::new(sample_submissions(), Some(sample_rubric()));
    let posted = lms.posted.clone();
    let engine = MockEngine::failing_for("Student_002");
    let seen = engine.seen.clone();

    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms,
        engine,
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    // --- 下载 ---
    let records = pipeline.download().await.expect("下载失败");
    assert_eq!(records.len(), 2);
    assert!(records[1].files[0].exists(), "附件应已落盘");

    // --- 评分：单份失败不中断批次 ---
    let report = pipeline.grade().await.expect("评分阶段失败");
    assert_eq!(pipeline.stage(), Stage::Graded);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1);
    assert_eq!(report.failures[0].0, "Student_002");

    // 引擎只见匿名内容，真实姓名已被替换为令牌
    {
        let calls = seen.lock().expect("锁不应中毒");
        let ana = calls
            .iter()
            .find(|(token, _, _)| token == "Student_001")
            .expect("Student_001 应该被评分");
        assert!(!ana.1.contains("Ana Li"), "引擎不应看到真实姓名: {}", ana.1);
        assert!(ana.1.contains("Student_001"), "姓名应替换为令牌");
    }

    // --- 生成复核表：每份已评分提交恰好一行 ---
    let review_path = pipeline.prepare_review().await.expect("生成复核表失败");
    assert_eq!(pipeline.stage(), Stage::ReviewReady);

    let sheet = artifact_loader::load_review_sheet(&review_path)
        .await
        .expect("读取复核表失败");
    assert_eq!(sheet.rows.len(), 2);
    assert_eq!(sheet.rows[0].real_name, "Ana Li");
    assert_eq!(sheet.rows[0].external_id, 101);
    assert_eq!(sheet.rows[0].ai_score, 85.0);
    assert_eq!(sheet.rows[0].final_score, 85.0, "final 列初始化为 AI 值");
    assert_eq!(sheet.rows[1].grade_status, GradeStatus::Error);
    assert!(pipeline.run_root().join("INSTRUCTIONS.txt").exists());

    // --- 人工复核：改分后保存（TOML 往返） ---
    let mut edited = sheet;
    edited.rows[0].final_score = 92.0;
    edited.rows[0].final_feedback = "复核后上调".to_string();
    artifact_loader::save_review_sheet(&review_path, &edited)
        .await
        .expect("保存复核表失败");

    let reloaded = artifact_loader::load_review_sheet(&review_path)
        .await
        .expect("重读复核表失败");
    assert_eq!(reloaded.rows[0].final_score, 92.0);
    assert_eq!(reloaded.rows[0].ai_score, 85.0, "AI 原始值不被覆盖");

    // --- 上传：编辑后的最终值逐行上传 ---
    let report = pipeline.upload().await.expect("上传阶段失败");
    assert_eq!(pipeline.stage(), Stage::Uploaded);
    assert_eq!(report.attempted, 2);
    assert_eq!(report.succeeded, 1);
    assert_eq!(report.failed, 1, "评分失败且未改分的行不上传");

    {
        let posts = posted.lock().expect("锁不应中毒");
        assert_eq!(posts.len(), 1);
        assert_eq!(posts[0].0, 101, "按 external_id 回关联");
        assert_eq!(posts[0].1, "92", "上传的是人工编辑后的最终分");
    }

    assert!(pipeline
        .run_root()
        .join("results")
        .join("upload_report.txt")
        .exists());
}

// ========== 断点恢复 ==========

#[tokio::test]
async fn test_resume_detects_stage_from_artifacts() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let lms = MockLms::new(sample_submissions(), Some(sample_rubric()));

    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms.clone(),
        MockEngine::new(),
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    pipeline.download().await.expect("下载失败");
    pipeline.grade().await.expect("评分失败");
    pipeline.prepare_review().await.expect("生成复核表失败");
    let run_root = pipeline.run_root().to_path_buf();
    drop(pipeline);

    // 进程重启：只凭磁盘产物重建阶段
    let detected = RunDescriptor::detect(&run_root);
    assert_eq!(detected.stage, Stage::ReviewReady);

    let mut resumed = GradingPipeline::resume(
        test_config(dir.path()),
        lms,
        MockEngine::new(),
        PlainTextExtractor::new(),
        &run_root,
    );
    assert_eq!(resumed.stage(), Stage::ReviewReady);

    // 恢复后可以直接执行上传
    let report = resumed.upload().await.expect("恢复后上传失败");
    assert_eq!(resumed.stage(), Stage::Uploaded);
    assert_eq!(report.attempted, 2);
}

// ========== 进度回调 ==========

#[tokio::test]
async fn test_progress_callback_reports_labels() {
    let dir = tempfile::tempdir().expect("创建临时目录失败");
    let lms = MockLms::new(sample_submissions(), Some(sample_rubric()));
    let mut pipeline = GradingPipeline::create(
        test_config(dir.path()),
        lms,
        MockEngine::new(),
        PlainTextExtractor::new(),
    )
    .await
    .expect("创建流水线失败");

    let events: Arc<Mutex<Vec<(usize, usize, String)>>> = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    pipeline.set_progress_callback(Box::new(move |p| {
        sink.lock()
            .expect("锁不应中毒")
            .push((p.current, p.total, p.label.clone()));
    }));

    pipeline.download().await.expect("下载失败");

    let events = events.lock().expect("锁不应中毒");
    assert_eq!(events.len(), 2);
    assert_eq!(events[0], (1, 2, "Student_001".to_string()));
    assert_eq!(events[1], (2, 2, "Student_002".to_string()));
}
