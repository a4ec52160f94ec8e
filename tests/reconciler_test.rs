use std::path::PathBuf;

use anon_grade_pipeline::models::submission::SubmissionRecord;
use anon_grade_pipeline::services::{IdentityAnonymizer, SubmissionReconciler};

fn sample_records() -> Vec<SubmissionRecord> {
    vec![
        SubmissionRecord {
            anon_token: "Student_001".to_string(),
            external_id: 101,
            files: vec![
                PathBuf::from("submissions/Student_001/essay.txt"),
                PathBuf::from("submissions/Student_001/appendix.pdf"),
            ],
            extracted_text: None,
        },
        SubmissionRecord {
            anon_token: "Student_002".to_string(),
            external_id: 102,
            files: Vec::new(),
            extracted_text: Some("online text".to_string()),
        },
    ]
}

#[test]
fn test_files_for_preserves_download_order() {
    let reconciler = SubmissionReconciler::new(&sample_records());

    let files = reconciler.files_for("Student_001");
    assert_eq!(files.len(), 2);
    assert!(files[0].ends_with("essay.txt"));
    assert!(files[1].ends_with("appendix.pdf"));
}

#[test]
fn test_files_for_unknown_token_is_empty_not_error() {
    let reconciler = SubmissionReconciler::new(&sample_records());
    // "没有提交"是正常状态，软失败返回空序列
    assert!(reconciler.files_for("Student_999").is_empty());
}

#[test]
fn test_resolve_for_review_with_known_token() {
    let mut anonymizer = IdentityAnonymizer::new();
    anonymizer.anonymize("Ana Li", 101);
    anonymizer.anonymize("Bo Chen", 102);

    let reconciler = SubmissionReconciler::new(&sample_records());
    let identity = reconciler.resolve_for_review("Student_002", 102, &anonymizer);

    assert_eq!(identity.real_name, "Bo Chen");
    assert_eq!(identity.external_id, 102);
}

#[test]
fn test_resolve_for_review_falls_back_to_placeholder() {
    // 映射中没有这个令牌：行不能丢，降级为占位标签
    let anonymizer = IdentityAnonymizer::new();
    let reconciler = SubmissionReconciler::new(&sample_records());

    let identity = reconciler.resolve_for_review("Student_001", 101, &anonymizer);
    assert_eq!(identity.real_name, "Unknown_User_101");
    assert_eq!(identity.external_id, 101);
    assert_eq!(identity.files.len(), 2, "占位行仍然带文件");
}

#[test]
fn test_match_folder_exact_then_substring() {
    let reconciler = SubmissionReconciler::new(&sample_records());
    let candidates = vec![
        "misc".to_string(),
        "Student_001".to_string(),
        "ana_li_late_submission".to_string(),
    ];

    // 精确匹配优先
    assert_eq!(
        reconciler.match_folder("Student_001", "Ana Li", 101, &candidates),
        Some(1)
    );

    // 精确不中时按小写子串兜底
    let candidates = vec!["misc".to_string(), "ana li (late)".to_string()];
    assert_eq!(
        reconciler.match_folder("Student_001", "Ana Li", 101, &candidates),
        Some(1)
    );

    // 都不中返回 None，绝不乱配
    let candidates = vec!["misc".to_string()];
    assert_eq!(
        reconciler.match_folder("Student_001", "Ana Li", 101, &candidates),
        None
    );
}
