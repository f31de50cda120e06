//! Orchestrator options.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Order in which scheduled fault plans are tried.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SearchStrategy {
    /// Plans discovered by the latest execution are tried first.
    #[default]
    #[serde(rename = "dfs")]
    DepthFirst,
    /// Plans are tried in the order they were discovered.
    #[serde(rename = "bfs")]
    BreadthFirst,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchStrategy::DepthFirst => f.write_str("dfs"),
            SearchStrategy::BreadthFirst => f.write_str("bfs"),
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "dfs" | "depth-first" => Ok(SearchStrategy::DepthFirst),
            "bfs" | "breadth-first" => Ok(SearchStrategy::BreadthFirst),
            other => Err(format!("unknown search strategy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorOptions {
    /// Iteration number at which the campaign stops unconditionally.
    pub max_iterations: u32,
    pub search_strategy: SearchStrategy,
    /// Only ever fault one call per iteration.
    pub suppress_combinations: bool,
    /// Prune plans made unreachable by earlier faults.
    pub dynamic_reduction: bool,
    /// Try each fault once per (signature, arguments).
    pub avoid_redundant_injections: bool,
    /// Do not fault calls that already failed on their own.
    pub avoid_injections_on_organic_failures: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            max_iterations: 99,
            search_strategy: SearchStrategy::DepthFirst,
            suppress_combinations: false,
            dynamic_reduction: false,
            avoid_redundant_injections: false,
            avoid_injections_on_organic_failures: false,
        }
    }
}

impl OrchestratorOptions {
    pub fn with_max_iterations(mut self, max_iterations: u32) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub fn with_search_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.search_strategy = strategy;
        self
    }

    pub fn with_suppress_combinations(mut self, enabled: bool) -> Self {
        self.suppress_combinations = enabled;
        self
    }

    pub fn with_dynamic_reduction(mut self, enabled: bool) -> Self {
        self.dynamic_reduction = enabled;
        self
    }

    pub fn with_avoid_redundant_injections(mut self, enabled: bool) -> Self {
        self.avoid_redundant_injections = enabled;
        self
    }

    pub fn with_avoid_injections_on_organic_failures(mut self, enabled: bool) -> Self {
        self.avoid_injections_on_organic_failures = enabled;
        self
    }

    pub fn validate(&self) -> OrchestratorResult<()> {
        if self.max_iterations == 0 {
            return Err(OrchestratorError::InvalidOptions {
                reason: "max_iterations must be at least 1",
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("dfs", SearchStrategy::DepthFirst)]
    #[test_case("BFS", SearchStrategy::BreadthFirst)]
    #[test_case("depth-first", SearchStrategy::DepthFirst)]
    #[test_case("breadth-first", SearchStrategy::BreadthFirst)]
    fn strategy_parses(input: &str, expected: SearchStrategy) {
        assert_eq!(input.parse::<SearchStrategy>().unwrap(), expected);
    }

    #[test]
    fn unknown_strategy_is_rejected() {
        assert!("random".parse::<SearchStrategy>().is_err());
    }

    #[test]
    fn defaults() {
        let options = OrchestratorOptions::default();
        assert_eq!(options.max_iterations, 99);
        assert_eq!(options.search_strategy, SearchStrategy::DepthFirst);
        assert!(!options.suppress_combinations);
        options.validate().unwrap();
    }

    #[test]
    fn zero_iterations_is_invalid() {
        assert!(matches!(
            OrchestratorOptions::default().with_max_iterations(0).validate(),
            Err(OrchestratorError::InvalidOptions { .. })
        ));
    }
}
