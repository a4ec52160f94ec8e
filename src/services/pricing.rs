//! 模型价格服务 - 业务能力层
//!
//! 查询模型每 1K token 的输入单价。在线价格源不可用时
//! 回落到内置静态价格表。

use tracing::debug;

/// 静态兜底价格表（美元 / 1K 输入 token）
///
/// 价格随官方调价人工更新，不保证实时准确
static MODEL_PRICES: phf::Map<&'static str, f64> = phf::phf_map! {
    "gpt-4o" => 0.0025,
    "gpt-4o-mini" => 0.00015,
    "gpt-4-turbo" => 0.01,
    "gpt-4" => 0.03,
    "gpt-3.5-turbo" => 0.0005,
    "o1" => 0.015,
    "o1-mini" => 0.003,
};

/// 未知模型的保守默认单价
const DEFAULT_PRICE_PER_1K: f64 = 0.005;

/// 模型单价来源
pub trait PricingSource {
    /// 每 1K token 的单价（美元）
    fn price_per_1k(&self, model_id: &str) -> f64;
}

/// 静态价格表实现
#[derive(Debug, Default)]
pub struct StaticPricing;

impl StaticPricing {
    pub fn new() -> Self {
        Self
    }
}

impl PricingSource for StaticPricing {
    fn price_per_1k(&self, model_id: &str) -> f64 {
        match MODEL_PRICES.get(model_id) {
            Some(&price) => price,
            None => {
                debug!(
                    "价格表中没有模型 {}，使用默认单价 {}",
                    model_id, DEFAULT_PRICE_PER_1K
                );
                DEFAULT_PRICE_PER_1K
            }
        }
    }
}
