//! Queues of fault plans still to try.
//!
//! Both strategies receive plans in batches, one batch per finished
//! execution, and hand them out one at a time. They differ only in where a
//! new batch goes.

use std::collections::VecDeque;
use std::fmt;

use crate::options::SearchStrategy;
use crate::plan::FaultPlan;

pub trait Frontier: Send + fmt::Debug {
    /// Adds the plans discovered by one execution, in discovery order.
    fn schedule(&mut self, batch: Vec<FaultPlan>);

    /// Next plan to run.
    fn next(&mut self) -> Option<FaultPlan>;

    /// Drops every plan for which `keep` returns false, returning how many.
    fn retain(&mut self, keep: &mut dyn FnMut(&FaultPlan) -> bool) -> usize;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn strategy(&self) -> SearchStrategy;
}

impl SearchStrategy {
    pub fn frontier(self) -> Box<dyn Frontier> {
        match self {
            SearchStrategy::DepthFirst => Box::new(DepthFirst::default()),
            SearchStrategy::BreadthFirst => Box::new(BreadthFirst::default()),
        }
    }
}

fn retain_counting(queue: &mut VecDeque<FaultPlan>, keep: &mut dyn FnMut(&FaultPlan) -> bool) -> usize {
    let before = queue.len();
    queue.retain(|plan| keep(plan));
    before - queue.len()
}

/// Newest batch first, in discovery order within the batch.
#[derive(Debug, Default)]
pub struct DepthFirst {
    queue: VecDeque<FaultPlan>,
}

impl Frontier for DepthFirst {
    fn schedule(&mut self, batch: Vec<FaultPlan>) {
        for plan in batch.into_iter().rev() {
            self.queue.push_front(plan);
        }
    }

    fn next(&mut self) -> Option<FaultPlan> {
        self.queue.pop_front()
    }

    fn retain(&mut self, keep: &mut dyn FnMut(&FaultPlan) -> bool) -> usize {
        retain_counting(&mut self.queue, keep)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn strategy(&self) -> SearchStrategy {
        SearchStrategy::DepthFirst
    }
}

/// Oldest batch first.
#[derive(Debug, Default)]
pub struct BreadthFirst {
    queue: VecDeque<FaultPlan>,
}

impl Frontier for BreadthFirst {
    fn schedule(&mut self, batch: Vec<FaultPlan>) {
        self.queue.extend(batch);
    }

    fn next(&mut self) -> Option<FaultPlan> {
        self.queue.pop_front()
    }

    fn retain(&mut self, keep: &mut dyn FnMut(&FaultPlan) -> bool) -> usize {
        retain_counting(&mut self.queue, keep)
    }

    fn len(&self) -> usize {
        self.queue.len()
    }

    fn strategy(&self) -> SearchStrategy {
        SearchStrategy::BreadthFirst
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use faultline_analysis::Fault;
    use faultline_dei::ExecutionIndex;
    use serde_json::json;

    fn plan(key: &str) -> FaultPlan {
        let mut index = ExecutionIndex::new();
        index.push(key);
        FaultPlan::empty().extended(index, Fault::Error(json!({})))
    }

    fn drain(frontier: &mut dyn Frontier) -> Vec<String> {
        std::iter::from_fn(|| frontier.next())
            .map(|p| p.indices().next().unwrap().last().unwrap().key().to_string())
            .collect()
    }

    #[test]
    fn depth_first_runs_newest_batch_first() {
        let mut frontier = SearchStrategy::DepthFirst.frontier();
        frontier.schedule(vec![plan("a"), plan("b")]);
        frontier.schedule(vec![plan("c"), plan("d")]);
        assert_eq!(drain(frontier.as_mut()), vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn breadth_first_runs_oldest_batch_first() {
        let mut frontier = SearchStrategy::BreadthFirst.frontier();
        frontier.schedule(vec![plan("a"), plan("b")]);
        frontier.schedule(vec![plan("c"), plan("d")]);
        assert_eq!(drain(frontier.as_mut()), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn retain_reports_removed_count() {
        let mut frontier = SearchStrategy::DepthFirst.frontier();
        frontier.schedule(vec![plan("a"), plan("b"), plan("c")]);
        let target = plan("b");
        assert_eq!(frontier.retain(&mut |p| p != &target), 1);
        assert_eq!(frontier.len(), 2);
        assert_eq!(frontier.strategy(), SearchStrategy::DepthFirst);
    }
}
