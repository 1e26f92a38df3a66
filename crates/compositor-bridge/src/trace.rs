use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};

pub const DEFAULT_TRACE_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
	In,
	Out,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
	pub timestamp: DateTime<Utc>,
	pub direction: Direction,
	#[serde(rename = "type")]
	pub kind: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub target: Option<String>,
	pub payload: Value,
}

/// Counters over everything ever traced, not only what the ring still holds
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventStats {
	pub total: u64,
	pub inbound: u64,
	pub outbound: u64,
	pub by_type: HashMap<String, u64>,
	pub retained: usize,
	pub capacity: usize,
}

/// Fixed-capacity ring of recent traffic, oldest evicted first
#[derive(Debug, Clone)]
pub struct TraceBuffer {
	entries: VecDeque<TraceEntry>,
	capacity: usize,
	stats: EventStats,
}

impl Default for TraceBuffer {
	fn default() -> Self {
		Self::new(DEFAULT_TRACE_CAPACITY)
	}
}

impl TraceBuffer {
	#[must_use]
	pub fn new(capacity: usize) -> Self {
		let capacity = capacity.max(1);
		Self {
			entries: VecDeque::with_capacity(capacity),
			capacity,
			stats: EventStats {
				capacity,
				..EventStats::default()
			},
		}
	}

	pub fn record(&mut self, direction: Direction, kind: impl Into<String>, target: Option<String>, payload: Value) {
		let kind = kind.into();

		self.stats.total += 1;
		match direction {
			Direction::In => self.stats.inbound += 1,
			Direction::Out => self.stats.outbound += 1,
		}
		*self.stats.by_type.entry(kind.clone()).or_insert(0) += 1;

		if self.entries.len() == self.capacity {
			self.entries.pop_front();
		}
		self.entries.push_back(TraceEntry {
			timestamp: Utc::now(),
			direction,
			kind,
			target,
			payload,
		});
	}

	/// Most recent `limit` entries, oldest first
	#[must_use]
	pub fn history(&self, limit: usize) -> Vec<TraceEntry> {
		let skip = self.entries.len().saturating_sub(limit);
		self.entries.iter().skip(skip).cloned().collect()
	}

	#[must_use]
	pub fn stats(&self) -> EventStats {
		EventStats {
			retained: self.entries.len(),
			..self.stats.clone()
		}
	}

	#[must_use]
	pub fn len(&self) -> usize {
		self.entries.len()
	}

	#[must_use]
	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn test_oldest_entries_are_evicted() {
		let mut trace = TraceBuffer::new(3);
		for i in 0..5 {
			trace.record(Direction::Out, "mute", Some(format!("s{i}")), json!(i));
		}

		assert_eq!(trace.len(), 3);
		let targets: Vec<_> = trace.history(10).into_iter().filter_map(|e| e.target).collect();
		assert_eq!(targets, ["s2", "s3", "s4"]);
	}

	#[test]
	fn test_history_limit_returns_newest() {
		let mut trace = TraceBuffer::new(10);
		trace.record(Direction::In, "ready", None, Value::Null);
		trace.record(Direction::Out, "layout", None, json!(1));
		trace.record(Direction::In, "joined", Some("abc".to_string()), Value::Null);

		let recent = trace.history(2);
		assert_eq!(recent.len(), 2);
		assert_eq!(recent[0].kind, "layout");
		assert_eq!(recent[1].direction, Direction::In);
	}

	#[test]
	fn test_stats_survive_eviction() {
		let mut trace = TraceBuffer::new(2);
		trace.record(Direction::In, "ready", None, Value::Null);
		trace.record(Direction::Out, "mute", None, Value::Null);
		trace.record(Direction::Out, "mute", None, Value::Null);

		let stats = trace.stats();
		assert_eq!(stats.total, 3);
		assert_eq!(stats.inbound, 1);
		assert_eq!(stats.outbound, 2);
		assert_eq!(stats.by_type["mute"], 2);
		assert_eq!(stats.retained, 2);
		assert_eq!(stats.capacity, 2);
	}
}
