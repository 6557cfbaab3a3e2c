//! Portfolio risk scorer.
//!
//! A pure function of the positions and two stress proxies. Proxies outside
//! [0, 1] are clamped silently; non-finite proxies count as 0.

use serde::{Deserialize, Serialize};

use policy::{PortfolioPosition, RiskMetric, RiskMetricName, Signal};

use crate::config::RiskConfig;

/// External stress proxies, each nominally in [0, 1].
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskInputs {
    pub liquidity_stress: f64,
    pub credit_score: f64,
}

impl RiskInputs {
    /// Read the proxies from the configured agents' metrics; missing values are 0.
    pub fn from_signals(signals: &[Signal], config: &RiskConfig) -> Self {
        Self {
            liquidity_stress: metric_of(signals, &config.liquidity_agent, RiskMetricName::LiquidityStress),
            credit_score: metric_of(signals, &config.credit_agent, RiskMetricName::CreditScore),
        }
    }
}

fn metric_of(signals: &[Signal], agent: &str, name: RiskMetricName) -> f64 {
    signals
        .iter()
        .filter(|s| s.agent == agent)
        .find_map(|s| s.metric(name))
        .map(|m| m.value)
        .unwrap_or(0.0)
}

/// Composite score and the metrics behind it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// 0 - 100
    pub score: u8,
    pub metrics: Vec<RiskMetric>,
}

fn clamp01(x: f64) -> f64 {
    if x.is_finite() {
        x.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Score a portfolio.
pub fn score(positions: &[PortfolioPosition], inputs: RiskInputs) -> RiskAssessment {
    let total: f64 = positions.iter().map(PortfolioPosition::sane_value).sum();
    let top_value = positions
        .iter()
        .map(PortfolioPosition::sane_value)
        .fold(0.0_f64, f64::max);
    let top_share = if total > 0.0 { top_value / total } else { 0.0 };

    let liquidity = clamp01(inputs.liquidity_stress);
    let credit = clamp01(inputs.credit_score);

    let var95 = clamp01(0.35 * top_share + 0.45 * liquidity + 0.2 * credit);
    let var99 = clamp01(var95 * 1.15);
    let max_drawdown = clamp01(0.4 * top_share + 0.3 * credit + 0.3 * liquidity);

    let composite = 100.0 * (0.3 * top_share + 0.3 * liquidity + 0.2 * credit + 0.2 * max_drawdown);
    let score = composite.round().clamp(0.0, 100.0) as u8;

    let metrics = vec![
        RiskMetric::unit_interval(
            RiskMetricName::Concentration,
            top_share,
            "Top position share of total value.",
        )
        .with_input("topShare", top_share)
        .with_input("total", total),
        RiskMetric::unit_interval(
            RiskMetricName::LiquidityStress,
            liquidity,
            "Liquidity stress proxy from the liquidity agent.",
        )
        .with_input("liquidity", liquidity)
        .with_input("reported", inputs.liquidity_stress),
        RiskMetric::unit_interval(
            RiskMetricName::CreditScore,
            credit,
            "Credit proxy from the credit agent.",
        )
        .with_input("credit", credit)
        .with_input("reported", inputs.credit_score),
        RiskMetric::unit_interval(
            RiskMetricName::Var95,
            var95,
            "Proxy VaR (95%) derived from composition and liquidity proxies.",
        )
        .with_horizon("1d")
        .with_input("topShare", top_share)
        .with_input("liquidity", liquidity)
        .with_input("credit", credit),
        RiskMetric::unit_interval(RiskMetricName::Var99, var99, "Proxy VaR (99%) derived from VaR95.")
            .with_horizon("1d")
            .with_input("var95", var95),
        RiskMetric::unit_interval(
            RiskMetricName::MaxDrawdown,
            max_drawdown,
            "Proxy max drawdown using concentration, credit and liquidity factors.",
        )
        .with_input("topShare", top_share)
        .with_input("liquidity", liquidity)
        .with_input("credit", credit),
    ];

    RiskAssessment { score, metrics }
}
