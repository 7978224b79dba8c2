//! Set fusion of two retrievers
//!
//! Runs two retrievers over the same query and keeps the chunk ids in
//! the intersection (AND) or union (OR) of the two result lists. No
//! score normalization happens across the two methods; when both lists
//! contain the same id, the entry from the second retriever wins,
//! whatever its score.

use crate::error::ConfigError;
use crate::retrieval::{rank_nodes, Retriever, ScoredNode};
use anyhow::Result;
use std::collections::{HashMap, HashSet};
use std::str::FromStr;
use std::sync::Arc;

/// Set operation applied to the two result lists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMode {
    /// Keep ids present in both lists
    And,
    /// Keep ids present in either list
    Or,
}

impl FromStr for FusionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "and" => Ok(FusionMode::And),
            "or" => Ok(FusionMode::Or),
            _ => Err(ConfigError::InvalidFusionMode(s.to_string())),
        }
    }
}

/// Two-retriever set fusion.
///
/// The mode is fixed at construction. Result lists may be longer than
/// `top_k` in OR mode: the contract is on the id set, which is exactly
/// the set operation over the two constituent lists, each of which is
/// capped at `top_k` on its own.
pub struct SetFusionRetriever {
    first: Arc<dyn Retriever>,
    second: Arc<dyn Retriever>,
    mode: FusionMode,
}

impl SetFusionRetriever {
    pub fn new(first: Arc<dyn Retriever>, second: Arc<dyn Retriever>, mode: FusionMode) -> Self {
        Self {
            first,
            second,
            mode,
        }
    }

    /// Construct from a mode string, failing before any retrieval when
    /// the string is not "and"/"or".
    pub fn with_mode_str(
        first: Arc<dyn Retriever>,
        second: Arc<dyn Retriever>,
        mode: &str,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(first, second, mode.parse()?))
    }

    pub fn mode(&self) -> FusionMode {
        self.mode
    }

    /// Merge two result lists under this retriever's mode.
    ///
    /// Second-list entries overwrite first-list entries with the same
    /// id (last-writer-wins).
    fn merge(&self, first: Vec<ScoredNode>, second: Vec<ScoredNode>) -> Vec<ScoredNode> {
        let first_ids: HashSet<String> = first.iter().map(|n| n.id.clone()).collect();
        let second_ids: HashSet<String> = second.iter().map(|n| n.id.clone()).collect();

        let mut combined: HashMap<String, ScoredNode> = HashMap::new();
        for node in first.into_iter().chain(second) {
            combined.insert(node.id.clone(), node);
        }

        let keep: HashSet<&String> = match self.mode {
            FusionMode::And => first_ids.intersection(&second_ids).collect(),
            FusionMode::Or => first_ids.union(&second_ids).collect(),
        };

        let scored = combined
            .into_iter()
            .filter(|(id, _)| keep.contains(id))
            .map(|(_, node)| (node.chunk, node.score))
            .collect();

        rank_nodes(scored, usize::MAX)
    }
}

impl Retriever for SetFusionRetriever {
    fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<ScoredNode>> {
        let first = self.first.retrieve(query, top_k)?;
        let second = self.second.retrieve(query, top_k)?;
        tracing::debug!(
            "set fusion ({:?}): {} + {} candidates",
            self.mode,
            first.len(),
            second.len()
        );
        Ok(self.merge(first, second))
    }

    fn name(&self) -> &str {
        match self.mode {
            FusionMode::And => "set-fusion-and",
            FusionMode::Or => "set-fusion-or",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::testing::StaticRetriever;

    fn ids(nodes: &[ScoredNode]) -> HashSet<String> {
        nodes.iter().map(|n| n.id.clone()).collect()
    }

    fn fuse(a: &[(&str, f32)], b: &[(&str, f32)], mode: FusionMode) -> Vec<ScoredNode> {
        let fused = SetFusionRetriever::new(
            Arc::new(StaticRetriever::new("a", a)),
            Arc::new(StaticRetriever::new("b", b)),
            mode,
        );
        fused.retrieve("q", 10).unwrap()
    }

    #[test]
    fn test_and_is_intersection() {
        let result = fuse(
            &[("n1", 0.9), ("n2", 0.5)],
            &[("n2", 0.8), ("n3", 0.3)],
            FusionMode::And,
        );

        assert_eq!(ids(&result), HashSet::from(["n2".to_string()]));
        // The surviving entry comes from the second list.
        assert_eq!(result[0].score, 0.8);
    }

    #[test]
    fn test_or_is_union_with_second_list_winning() {
        let result = fuse(
            &[("n1", 0.9), ("n2", 0.5)],
            &[("n2", 0.8), ("n3", 0.3)],
            FusionMode::Or,
        );

        assert_eq!(
            ids(&result),
            HashSet::from(["n1".to_string(), "n2".to_string(), "n3".to_string()])
        );
        let n2 = result.iter().find(|n| n.id == "n2").unwrap();
        assert_eq!(n2.score, 0.8);
    }

    #[test]
    fn test_self_fusion_dedups_either_mode() {
        let a = [("n1", 0.9), ("n2", 0.5), ("n1", 0.4)];
        let and = fuse(&a, &a, FusionMode::And);
        let or = fuse(&a, &a, FusionMode::Or);

        let expected = HashSet::from(["n1".to_string(), "n2".to_string()]);
        assert_eq!(ids(&and), expected);
        assert_eq!(ids(&or), expected);
    }

    #[test]
    fn test_empty_first_list() {
        let or = fuse(&[], &[("n1", 0.7), ("n2", 0.2)], FusionMode::Or);
        assert_eq!(ids(&or), HashSet::from(["n1".to_string(), "n2".to_string()]));

        let and = fuse(&[], &[("n1", 0.7), ("n2", 0.2)], FusionMode::And);
        assert!(and.is_empty());
    }

    #[test]
    fn test_ranks_are_reassigned() {
        let result = fuse(
            &[("n1", 0.9), ("n2", 0.5)],
            &[("n3", 0.7)],
            FusionMode::Or,
        );

        assert_eq!(result.len(), 3);
        for (i, node) in result.iter().enumerate() {
            assert_eq!(node.rank, i + 1);
        }
        assert!(result[0].score >= result[1].score);
    }

    #[test]
    fn test_invalid_mode_string_fails_fast() {
        let err = SetFusionRetriever::with_mode_str(
            Arc::new(StaticRetriever::new("a", &[])),
            Arc::new(StaticRetriever::new("b", &[])),
            "xor",
        )
        .err()
        .unwrap();

        assert_eq!(err, ConfigError::InvalidFusionMode("xor".to_string()));
    }

    #[test]
    fn test_mode_string_parsing() {
        assert_eq!("AND".parse::<FusionMode>().unwrap(), FusionMode::And);
        assert_eq!("or".parse::<FusionMode>().unwrap(), FusionMode::Or);
        assert!("".parse::<FusionMode>().is_err());
    }
}
