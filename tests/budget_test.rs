use anon_grade_pipeline::services::budget::{Budget, BudgetLedger, Impact, ItemSource};
use anon_grade_pipeline::services::estimator::{
    self, cost, estimate_tokens, round_currency, slides_bounds, FileDescriptor, FileFormat,
};
use std::path::Path;

// ========== 估算 ==========

#[test]
fn test_text_estimate_uses_char_count() {
    let desc = FileDescriptor {
        format: FileFormat::Text,
        byte_size: 9999,
        text: Some("a".repeat(400)),
    };
    // 有提取文本时按字符数折算，字节大小不参与
    assert_eq!(estimate_tokens(&desc), 100);
}

#[test]
fn test_empty_file_estimates_zero() {
    let desc = FileDescriptor {
        format: FileFormat::Pdf,
        byte_size: 0,
        text: None,
    };
    assert_eq!(estimate_tokens(&desc), 0);
}

#[test]
fn test_nonempty_file_estimate_is_positive() {
    for format in [
        FileFormat::Text,
        FileFormat::Pdf,
        FileFormat::Document,
        FileFormat::Slides,
        FileFormat::Spreadsheet,
        FileFormat::Image,
        FileFormat::Unknown,
    ] {
        let desc = FileDescriptor {
            format,
            byte_size: 1,
            text: None,
        };
        assert!(estimate_tokens(&desc) > 0, "{:?} 的非空文件估算应为正", format);
    }
}

#[test]
fn test_estimate_monotonic_in_byte_size() {
    for format in [
        FileFormat::Pdf,
        FileFormat::Document,
        FileFormat::Slides,
        FileFormat::Spreadsheet,
        FileFormat::Image,
        FileFormat::Unknown,
    ] {
        let mut prev = 0;
        for size in [1u64, 10_000, 200_000, 2_000_000, 50_000_000] {
            let desc = FileDescriptor {
                format,
                byte_size: size,
                text: None,
            };
            let tokens = estimate_tokens(&desc);
            assert!(tokens >= prev, "{:?} 在 {} 字节处不单调", format, size);
            prev = tokens;
        }
    }
}

#[test]
fn test_slides_two_megabyte_within_bounds() {
    let desc = FileDescriptor {
        format: FileFormat::Slides,
        byte_size: 2 * 1024 * 1024,
        text: None,
    };
    let tokens = estimate_tokens(&desc);
    let (floor, ceiling) = slides_bounds();
    assert!(
        tokens >= floor && tokens <= ceiling,
        "2MB 演示文稿的估算 {} 应落在 [{}, {}] 区间内",
        tokens,
        floor,
        ceiling
    );
}

#[test]
fn test_format_from_extension() {
    assert_eq!(FileFormat::from_path(Path::new("essay.PDF")), FileFormat::Pdf);
    assert_eq!(FileFormat::from_path(Path::new("slides.pptx")), FileFormat::Slides);
    assert_eq!(FileFormat::from_path(Path::new("notes.md")), FileFormat::Text);
    assert_eq!(FileFormat::from_path(Path::new("photo.jpeg")), FileFormat::Image);
    assert_eq!(FileFormat::from_path(Path::new("mystery.bin")), FileFormat::Unknown);
    assert_eq!(FileFormat::from_path(Path::new("noext")), FileFormat::Unknown);
}

#[test]
fn test_cost_conversion() {
    assert_eq!(cost(1000, 0.005), 0.005);
    assert_eq!(cost(0, 0.005), 0.0);
    assert_eq!(round_currency(0.123456), 0.1235);
}

// ========== 台账 ==========

#[test]
fn test_impact_boundaries() {
    // 预算 $1.00，单价 $1.00/1K：50 token = $0.05 恰好 5%
    let mut ledger = BudgetLedger::new(Budget::Cost(1.0), 1.0);

    let low = ledger.add_item(ItemSource::Submission, "exactly_5_percent", 50);
    assert_eq!(low.impact, Impact::Low);

    let medium = ledger.add_item(ItemSource::Submission, "just_over_5_percent", 51);
    assert_eq!(medium.impact, Impact::Medium);

    let medium_high = ledger.add_item(ItemSource::Submission, "exactly_15_percent", 150);
    assert_eq!(medium_high.impact, Impact::Medium);

    let high = ledger.add_item(ItemSource::Submission, "just_over_15_percent", 151);
    assert_eq!(high.impact, Impact::High);
}

#[test]
fn test_zero_budget_means_unknown_impact() {
    let mut ledger = BudgetLedger::new(Budget::Cost(0.0), 1.0);
    let item = ledger.add_item(ItemSource::CourseMaterial, "syllabus", 10_000);
    assert_eq!(item.impact, Impact::Unknown);
}

#[test]
fn test_total_accumulates_and_remaining_can_go_negative() {
    let mut ledger = BudgetLedger::new(Budget::Cost(0.1), 1.0);

    ledger.add_item(ItemSource::Submission, "Student_001", 50);
    assert_eq!(ledger.total().tokens, 50);
    assert!(ledger.remaining() > 0.0);

    ledger.add_item(ItemSource::Submission, "Student_002", 150);
    // 超出预算时剩余额必须如实为负，不允许截断为 0
    assert_eq!(ledger.total().tokens, 200);
    assert!(
        (ledger.remaining() - (-0.1)).abs() < 1e-9,
        "剩余额应为 -0.1，实际 {}",
        ledger.remaining()
    );
}

#[test]
fn test_set_price_recomputes_every_item() {
    let mut ledger = BudgetLedger::new(Budget::Cost(1.0), 1.0);
    ledger.add_item(ItemSource::Submission, "Student_001", 50);
    ledger.add_item(ItemSource::Submission, "Student_002", 200);

    ledger.set_price(2.0);

    // 单价翻倍后所有条目的费用和档位全部重算，不保留旧值
    let items = ledger.items();
    assert!((items[0].cost - 0.1).abs() < 1e-9);
    assert_eq!(items[0].impact, Impact::Medium);
    assert!((items[1].cost - 0.4).abs() < 1e-9);
    assert_eq!(items[1].impact, Impact::High);
}

#[test]
fn test_remove_and_clear_source() {
    let mut ledger = BudgetLedger::new(Budget::Cost(1.0), 1.0);
    ledger.add_item(ItemSource::CourseMaterial, "syllabus", 100);
    ledger.add_item(ItemSource::Submission, "Student_001", 100);
    ledger.add_item(ItemSource::Submission, "Student_002", 100);

    ledger.remove_item("Student_001");
    assert_eq!(ledger.items().len(), 2);

    ledger.clear_source(ItemSource::Submission);
    assert_eq!(ledger.items().len(), 1);
    assert_eq!(ledger.items()[0].label, "syllabus");
}

#[test]
fn test_budget_expressed_in_tokens() {
    // token 口径的预算按单价换算成货币后参与分档
    let mut ledger = BudgetLedger::new(Budget::Tokens(1000), 1.0);
    assert_eq!(ledger.budget().token_limit(1.0), 1000);
    assert!((ledger.budget().cost_limit(1.0) - 1.0).abs() < 1e-9);

    let item = ledger.add_item(ItemSource::Submission, "Student_001", 50);
    assert_eq!(item.impact, Impact::Low);
}

#[test]
fn test_estimator_cost_is_pure() {
    // 纯函数：同样输入永远同样输出，单价变化立即生效
    let tokens = 1234;
    assert_eq!(estimator::cost(tokens, 0.002), estimator::cost(tokens, 0.002));
    assert!(estimator::cost(tokens, 0.004) > estimator::cost(tokens, 0.002));
}
