use anyhow::Result;
/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use std::fs;
use tracing::info;

/// 初始化日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
///
/// # 返回
/// 返回是否成功初始化
pub fn init_log_file(log_file_path: &str) -> Result<()> {
    let log_header = format!(
        "{}\n匿名评分日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
///
/// # 参数
/// - `assignment_name`: 作业名称
/// - `model_name`: 评分模型
pub fn log_startup(assignment_name: &str, model_name: &str) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 两步式匿名评分模式");
    info!("📋 作业: {}", assignment_name);
    info!("🤖 评分模型: {}", model_name);
    info!("{}", "=".repeat(60));
}

/// 记录阶段开始信息
///
/// # 参数
/// - `stage_name`: 阶段名称
pub fn log_stage_start(stage_name: &str) {
    info!("\n{}", "=".repeat(60));
    info!("📦 开始阶段: {}", stage_name);
    info!("{}", "=".repeat(60));
}

/// 记录阶段完成信息
///
/// # 参数
/// - `stage_name`: 阶段名称
/// - `success`: 成功数量
/// - `total`: 总数量
pub fn log_stage_complete(stage_name: &str, success: usize, total: usize) {
    info!("\n{}", "─".repeat(60));
    info!("✓ 阶段 {} 完成: 成功 {}/{}", stage_name, success, total);
    info!("{}", "─".repeat(60));
}
