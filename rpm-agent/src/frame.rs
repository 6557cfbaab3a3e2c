//! Observation frames.

use policy::{DataPoint, PortfolioPosition};
use serde::{Deserialize, Serialize};

/// Everything observed for one tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ObservationFrame {
    /// Observed datapoints
    #[serde(default)]
    pub data: Vec<DataPoint>,
    /// Portfolio holdings
    #[serde(default)]
    pub positions: Vec<PortfolioPosition>,
}

impl ObservationFrame {
    /// Create an empty frame.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a position.
    pub fn with_position(mut self, position: PortfolioPosition) -> Self {
        self.positions.push(position);
        self
    }

    /// Add a datapoint.
    pub fn with_datapoint(mut self, datapoint: DataPoint) -> Self {
        self.data.push(datapoint);
        self
    }

    /// First datapoint with the given key.
    pub fn datapoint(&self, key: &str) -> Option<&DataPoint> {
        self.data.iter().find(|d| d.key == key)
    }

    /// Sum of sane position values.
    pub fn total_value(&self) -> f64 {
        self.positions.iter().map(PortfolioPosition::sane_value).sum()
    }

    /// Sum of sane values of positions carrying a tag.
    pub fn tagged_value(&self, tag: &str) -> f64 {
        self.positions
            .iter()
            .filter(|p| p.has_tag(tag))
            .map(PortfolioPosition::sane_value)
            .sum()
    }

    /// Largest position.
    pub fn largest_position(&self) -> Option<&PortfolioPosition> {
        self.positions
            .iter()
            .max_by(|a, b| a.sane_value().total_cmp(&b.sane_value()))
    }

    /// Largest position's share of total value, 0 for an empty portfolio.
    pub fn top_share(&self) -> f64 {
        let total = self.total_value();
        match self.largest_position() {
            Some(top) if total > 0.0 => top.sane_value() / total,
            _ => 0.0,
        }
    }
}
