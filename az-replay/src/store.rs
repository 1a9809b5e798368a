//! Bounded, iteration-indexed training corpus.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::example::TrainingExample;

/// All examples produced by one iteration's self-play.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IterationBatch {
    pub iteration: u32,
    pub examples: Vec<TrainingExample>,
}

/// What an `append` evicted to stay within both caps.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AppendReport {
    pub dropped_batches: usize,
    pub dropped_examples: usize,
}

/// Ordered per-iteration batches under two simultaneous caps: at most `max_batches` batches
/// and at most `max_examples` examples in total.
///
/// Eviction always starts at the oldest batch; a partially evicted batch loses its earliest
/// examples first. Batches never end up empty.
#[derive(Clone, Debug)]
pub struct TrainingExampleStore {
    max_examples: usize,
    max_batches: usize,
    batches: VecDeque<IterationBatch>,
    total: usize,
}

impl TrainingExampleStore {
    /// Caps below 1 are raised to 1.
    pub fn new(max_examples: usize, max_batches: usize) -> Self {
        Self {
            max_examples: max_examples.max(1),
            max_batches: max_batches.max(1),
            batches: VecDeque::new(),
            total: 0,
        }
    }

    /// Rebuild a store from persisted batches (oldest first), applying the current caps.
    pub fn from_batches(
        max_examples: usize,
        max_batches: usize,
        batches: impl IntoIterator<Item = IterationBatch>,
    ) -> Self {
        let mut store = Self::new(max_examples, max_batches);
        for b in batches {
            store.append(b.iteration, b.examples);
        }
        store
    }

    pub fn max_examples(&self) -> usize {
        self.max_examples
    }

    pub fn max_batches(&self) -> usize {
        self.max_batches
    }

    /// Append one iteration's examples and prune to the caps.
    pub fn append(&mut self, iteration: u32, examples: Vec<TrainingExample>) -> AppendReport {
        if !examples.is_empty() {
            self.total += examples.len();
            self.batches.push_back(IterationBatch {
                iteration,
                examples,
            });
        }
        let report = self.prune();
        if report != AppendReport::default() {
            log::warn!(
                "example history over capacity: dropped {} batch(es), {} example(s); {} kept",
                report.dropped_batches,
                report.dropped_examples,
                self.total
            );
        }
        report
    }

    fn prune(&mut self) -> AppendReport {
        let mut report = AppendReport::default();
        while self.batches.len() > self.max_batches {
            if let Some(b) = self.batches.pop_front() {
                self.total -= b.examples.len();
                report.dropped_batches += 1;
                report.dropped_examples += b.examples.len();
            }
        }
        while self.total > self.max_examples {
            let excess = self.total - self.max_examples;
            let Some(front) = self.batches.front_mut() else {
                break;
            };
            if front.examples.len() <= excess {
                let n = front.examples.len();
                self.batches.pop_front();
                self.total -= n;
                report.dropped_batches += 1;
                report.dropped_examples += n;
            } else {
                front.examples.drain(..excess);
                self.total -= excess;
                report.dropped_examples += excess;
            }
        }
        report
    }

    /// Flattened corpus, oldest iteration first.
    pub fn all_examples(&self) -> Vec<TrainingExample> {
        self.iter().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &TrainingExample> {
        self.batches.iter().flat_map(|b| b.examples.iter())
    }

    pub fn batches(&self) -> impl Iterator<Item = &IterationBatch> {
        self.batches.iter()
    }

    pub fn iterations(&self) -> Vec<u32> {
        self.batches.iter().map(|b| b.iteration).collect()
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn num_batches(&self) -> usize {
        self.batches.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn batch(iteration: u32, n: usize) -> Vec<TrainingExample> {
        (0..n)
            .map(|i| TrainingExample::new(vec![iteration as f32, i as f32], vec![1.0], 0.0))
            .collect()
    }

    #[test]
    fn oldest_iteration_is_evicted_first_under_example_cap() {
        let mut store = TrainingExampleStore::new(10, 100);
        store.append(1, batch(1, 5));
        store.append(2, batch(2, 5));
        let report = store.append(3, batch(3, 5));

        assert_eq!(store.len(), 10);
        assert!(store.len() <= store.max_examples());
        assert_eq!(store.iterations(), vec![2, 3]);
        assert!(store.iter().all(|e| e.features[0] != 1.0));
        assert_eq!(
            report,
            AppendReport {
                dropped_batches: 1,
                dropped_examples: 5
            }
        );
    }

    #[test]
    fn partial_prune_removes_earliest_examples_of_oldest_batch() {
        let mut store = TrainingExampleStore::new(8, 100);
        store.append(1, batch(1, 5));
        store.append(2, batch(2, 5));

        assert_eq!(store.len(), 8);
        assert_eq!(store.iterations(), vec![1, 2]);
        let first = store.batches().next().unwrap();
        // Examples 0 and 1 of iteration 1 went first.
        let kept: Vec<f32> = first.examples.iter().map(|e| e.features[1]).collect();
        assert_eq!(kept, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn batch_cap_is_enforced_independently() {
        let mut store = TrainingExampleStore::new(1_000, 2);
        for it in 1..=4 {
            store.append(it, batch(it, 3));
        }
        assert_eq!(store.num_batches(), 2);
        assert_eq!(store.iterations(), vec![3, 4]);
        assert_eq!(store.len(), 6);
    }

    #[test]
    fn flattened_corpus_is_oldest_first() {
        let mut store = TrainingExampleStore::new(100, 100);
        store.append(4, batch(4, 2));
        store.append(5, batch(5, 1));
        let all = store.all_examples();
        let tags: Vec<(f32, f32)> = all.iter().map(|e| (e.features[0], e.features[1])).collect();
        assert_eq!(tags, vec![(4.0, 0.0), (4.0, 1.0), (5.0, 0.0)]);
    }

    #[test]
    fn empty_append_adds_no_batch() {
        let mut store = TrainingExampleStore::new(10, 10);
        store.append(1, Vec::new());
        assert!(store.is_empty());
        assert_eq!(store.num_batches(), 0);
    }
}
