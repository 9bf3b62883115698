use std::fmt;

use serde::{Deserialize, Serialize};

/// Pipeline stage at which a recoverable problem was observed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningStage {
    Fetch,
    Parse,
    Row,
    Normalize,
    Store,
    Diff,
}

impl WarningStage {
    pub fn as_str(self) -> &'static str {
        match self {
            WarningStage::Fetch => "fetch",
            WarningStage::Parse => "parse",
            WarningStage::Row => "row",
            WarningStage::Normalize => "normalize",
            WarningStage::Store => "store",
            WarningStage::Diff => "diff",
        }
    }
}

impl fmt::Display for WarningStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Recoverable problem recorded during a run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunWarning {
    pub source: String,
    pub stage: WarningStage,
    /// Row number, filing entry index, column name, or storage key.
    pub locator: Option<String>,
    pub message: String,
}

impl RunWarning {
    pub fn new(source: impl Into<String>, stage: WarningStage, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            stage,
            locator: None,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn at(mut self, locator: impl Into<String>) -> Self {
        self.locator = Some(locator.into());
        self
    }
}

impl fmt::Display for RunWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.locator {
            Some(locator) => write!(
                f,
                "[{}/{}] {}: {}",
                self.source, self.stage, locator, self.message
            ),
            None => write!(f, "[{}/{}] {}", self.source, self.stage, self.message),
        }
    }
}
