//! 预算台账服务 - 业务能力层
//!
//! 累计课程材料和提交的估算费用，对照用户设定的预算，
//! 给每个条目标注费用影响档位。
//!
//! 台账从不作为权威数据持久化：始终由当前文件/token 状态
//! 加当前模型单价重新推导。单价或条目集合的任何变化都会
//! 整体重算，不做部分/陈旧的增量更新。

use serde::{Deserialize, Serialize};

use crate::services::estimator;

/// 预算：按 token 数或货币金额表达
///
/// 两种表达通过当前模型单价互相换算；
/// 换算只在最小单位上取整（整 token / 4 位小数货币）。
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Budget {
    Tokens(u64),
    Cost(f64),
}

impl Budget {
    /// 预算对应的货币金额
    pub fn cost_limit(&self, price_per_1k: f64) -> f64 {
        match *self {
            Budget::Cost(c) => c,
            Budget::Tokens(t) => estimator::round_currency(estimator::cost(t, price_per_1k)),
        }
    }

    /// 预算对应的 token 数
    pub fn token_limit(&self, price_per_1k: f64) -> u64 {
        match *self {
            Budget::Tokens(t) => t,
            Budget::Cost(c) => {
                if price_per_1k <= 0.0 {
                    0
                } else {
                    (c / price_per_1k * 1000.0).round() as u64
                }
            }
        }
    }
}

/// 条目来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemSource {
    CourseMaterial,
    Submission,
}

/// 费用影响档位
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Impact {
    /// 占预算 ≤ 5%
    Low,
    /// 占预算 ≤ 15%
    Medium,
    /// 占预算 > 15%
    High,
    /// 预算未设置（≤ 0），无法分档
    Unknown,
}

/// 一条预算台账条目
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineItem {
    pub source: ItemSource,
    pub label: String,
    pub tokens: u64,
    pub cost: f64,
    pub impact: Impact,
}

/// 台账合计
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Totals {
    pub tokens: u64,
    pub cost: f64,
}

/// 预算台账
#[derive(Debug, Clone)]
pub struct BudgetLedger {
    items: Vec<LineItem>,
    budget: Budget,
    price_per_1k: f64,
}

impl BudgetLedger {
    pub fn new(budget: Budget, price_per_1k: f64) -> Self {
        Self {
            items: Vec::new(),
            budget,
            price_per_1k,
        }
    }

    /// 添加一个条目，按当前单价计算费用并分档，返回该条目
    pub fn add_item(&mut self, source: ItemSource, label: impl Into<String>, tokens: u64) -> LineItem {
        let cost = estimator::round_currency(estimator::cost(tokens, self.price_per_1k));
        let impact = self.classify(cost);
        let item = LineItem {
            source,
            label: label.into(),
            tokens,
            cost,
            impact,
        };
        self.items.push(item.clone());
        item
    }

    /// 按标签移除条目
    pub fn remove_item(&mut self, label: &str) {
        self.items.retain(|item| item.label != label);
    }

    /// 移除某来源的全部条目（对应文件集合/提交集合整体变化时的重建）
    pub fn clear_source(&mut self, source: ItemSource) {
        self.items.retain(|item| item.source != source);
    }

    /// 更换模型单价：每个条目的费用和档位全部重算
    pub fn set_price(&mut self, price_per_1k: f64) {
        self.price_per_1k = price_per_1k;
        self.recompute_all();
    }

    /// 更换预算：档位全部重算
    pub fn set_budget(&mut self, budget: Budget) {
        self.budget = budget;
        self.recompute_all();
    }

    fn recompute_all(&mut self) {
        let budget_cost = self.budget.cost_limit(self.price_per_1k);
        for item in &mut self.items {
            item.cost = estimator::round_currency(estimator::cost(item.tokens, self.price_per_1k));
            item.impact = classify_impact(item.cost, budget_cost);
        }
    }

    fn classify(&self, item_cost: f64) -> Impact {
        classify_impact(item_cost, self.budget.cost_limit(self.price_per_1k))
    }

    /// 所有条目的合计
    pub fn total(&self) -> Totals {
        let tokens = self.items.iter().map(|i| i.tokens).sum();
        let cost = estimator::round_currency(self.items.iter().map(|i| i.cost).sum());
        Totals { tokens, cost }
    }

    /// 剩余预算（货币口径）
    ///
    /// 可能为负，表示超出预算——调用方必须如实呈现，不允许截断为 0
    pub fn remaining(&self) -> f64 {
        estimator::round_currency(self.budget.cost_limit(self.price_per_1k) - self.total().cost)
    }

    pub fn items(&self) -> &[LineItem] {
        &self.items
    }

    pub fn budget(&self) -> Budget {
        self.budget
    }

    pub fn price_per_1k(&self) -> f64 {
        self.price_per_1k
    }
}

/// 档位划分：条目费用 / 预算费用 ≤ 5% → Low，≤ 15% → Medium，其余 High；
/// 预算 ≤ 0 时一律 Unknown
fn classify_impact(item_cost: f64, budget_cost: f64) -> Impact {
    if budget_cost <= 0.0 {
        return Impact::Unknown;
    }
    let ratio = item_cost / budget_cost;
    if ratio <= 0.05 {
        Impact::Low
    } else if ratio <= 0.15 {
        Impact::Medium
    } else {
        Impact::High
    }
}
