//! Upstream topic analyzer seam.
//!
//! The engine treats the analyzer as opaque: it hands over the raw items of
//! the look-back window and receives structured [`TopicAnalysis`] records.
//! Any error (or an empty answer) makes the cycle skip without writing.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::model::{RawItem, TopicAnalysis};

#[async_trait]
pub trait TopicAnalyzer: Send + Sync {
    async fn analyze(&self, items: &[RawItem]) -> Result<Vec<TopicAnalysis>>;

    /// Name for logs.
    fn name(&self) -> &'static str;
}

pub type DynAnalyzer = Arc<dyn TopicAnalyzer>;

/// Returns the same analyses every call; for local runs and tests.
#[derive(Debug, Clone, Default)]
pub struct FixedAnalyzer {
    pub fixed: Vec<TopicAnalysis>,
}

#[async_trait]
impl TopicAnalyzer for FixedAnalyzer {
    async fn analyze(&self, _items: &[RawItem]) -> Result<Vec<TopicAnalysis>> {
        Ok(self.fixed.clone())
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Always fails, as an unreachable analyzer would.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableAnalyzer;

#[async_trait]
impl TopicAnalyzer for UnavailableAnalyzer {
    async fn analyze(&self, _items: &[RawItem]) -> Result<Vec<TopicAnalysis>> {
        anyhow::bail!("topic analyzer unavailable")
    }

    fn name(&self) -> &'static str {
        "unavailable"
    }
}
