/// Summarization Strategy Selection
///
/// Maps user-facing strategy names to the summarizer that implements them.

use std::fmt;

use anyhow::Result;

use crate::domain::ids::IdAllocator;
use crate::domain::summarizers::{
    AllocSiteSummarizer, BackboneSummarizer, IdentitySummarizer, TypeSetSummarizer,
};
use crate::domain::vertex::HeapGraph;
use crate::ports::Summarizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Strategy {
    Identity,
    AllocationSite,
    TypeSet,
    #[default]
    BackbonePredecessorType,
}

impl Strategy {
    pub const ALL: [Strategy; 4] = [
        Strategy::Identity,
        Strategy::AllocationSite,
        Strategy::TypeSet,
        Strategy::BackbonePredecessorType,
    ];

    /// Parse a strategy name (case-insensitive).
    pub fn from_name(s: &str) -> Option<Strategy> {
        match s.to_lowercase().as_str() {
            "identity" => Some(Strategy::Identity),
            "allocsite" | "allocation-site" => Some(Strategy::AllocationSite),
            "typegraph" | "type-set" => Some(Strategy::TypeSet),
            "softvis2010" | "backbone" => Some(Strategy::BackbonePredecessorType),
            _ => None,
        }
    }

    /// Canonical name, as accepted by `from_name`.
    pub fn name(&self) -> &'static str {
        self.summarizer().name()
    }

    pub fn summarizer(&self) -> &'static dyn Summarizer {
        match self {
            Strategy::Identity => &IdentitySummarizer,
            Strategy::AllocationSite => &AllocSiteSummarizer,
            Strategy::TypeSet => &TypeSetSummarizer,
            Strategy::BackbonePredecessorType => &BackboneSummarizer,
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl Summarizer for Strategy {
    fn name(&self) -> &'static str {
        Strategy::name(self)
    }

    fn summarize(&self, graph: HeapGraph, ids: &mut IdAllocator) -> Result<HeapGraph> {
        self.summarizer().summarize(graph, ids)
    }
}
