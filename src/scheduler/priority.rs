//! Job prioritization.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Priority level for generation jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low = 0,
    #[default]
    Normal = 1,
    High = 2,
}

impl Priority {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "normal" | "" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(format!("invalid priority '{other}', expected low, normal or high")),
        }
    }
}

/// Item with associated priority for queue ordering.
#[derive(Debug)]
struct PrioritizedItem<T> {
    priority: Priority,
    sequence: u64,
    item: T,
}

impl<T> PartialEq for PrioritizedItem<T> {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.sequence == other.sequence
    }
}

impl<T> Eq for PrioritizedItem<T> {}

impl<T> PartialOrd for PrioritizedItem<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T> Ord for PrioritizedItem<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self.priority as u8).cmp(&(other.priority as u8)) {
            Ordering::Equal => other.sequence.cmp(&self.sequence), // Lower sequence = earlier
            ord => ord,
        }
    }
}

/// Max-heap on priority, FIFO within a priority.
pub struct PriorityQueue<T> {
    heap: BinaryHeap<PrioritizedItem<T>>,
    next_sequence: u64,
}

impl<T> PriorityQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_sequence: 0,
        }
    }

    pub fn push(&mut self, item: T, priority: Priority) {
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        self.heap.push(PrioritizedItem { priority, sequence, item });
    }

    pub fn pop(&mut self) -> Option<T> {
        self.heap.pop().map(|p| p.item)
    }

    /// Remove every item matching `pred`, returning how many were dropped.
    pub fn remove_where<F>(&mut self, mut pred: F) -> usize
    where
        F: FnMut(&T) -> bool,
    {
        let before = self.heap.len();
        self.heap.retain(|p| !pred(&p.item));
        before - self.heap.len()
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<T> Default for PriorityQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}
