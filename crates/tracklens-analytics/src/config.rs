use serde::{Deserialize, Serialize};

use crate::orgunit::OuMode;
use crate::period::FinancialYearStart;

/// Engine-wide settings. Immutable once the engine is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyticsConfig {
    pub default_page_size: u64,
    /// Requested page sizes above this are clamped.
    pub max_page_size: u64,
    pub financial_year_start: FinancialYearStart,
    pub default_ou_mode: OuMode,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 10_000,
            financial_year_start: FinancialYearStart::April,
            default_ou_mode: OuMode::Descendants,
        }
    }
}

impl AnalyticsConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.default_page_size == 0 {
            return Err("analytics.default_page_size must be > 0".into());
        }
        if self.max_page_size == 0 {
            return Err("analytics.max_page_size must be > 0".into());
        }
        if self.default_page_size > self.max_page_size {
            return Err(format!(
                "analytics.default_page_size ({}) exceeds analytics.max_page_size ({})",
                self.default_page_size, self.max_page_size
            ));
        }
        Ok(())
    }
}
