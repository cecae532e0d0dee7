//! Network status snapshot, recent-block window and header ingestion.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::chain::types::{HeaderEvent, NetworkId};
use crate::pubsub::BlockFinalized;

/// Canonical status of one network.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub block: u64,
    pub chain_id: String,
    /// Milliseconds since epoch.
    pub last_block_at: Option<u64>,
    pub state: Option<String>,
    pub syncing: bool,
    /// `last_block_header`, `average_blocktime`, `blocktimes`, `last_block_hash`.
    #[serde(default)]
    pub meta: Map<String, Value>,
}

impl NetworkStatus {
    pub fn new(chain_id: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            state: Some("configuring".to_string()),
            ..Default::default()
        }
    }

    pub fn average_blocktime(&self) -> Option<f64> {
        self.meta.get("average_blocktime").and_then(Value::as_f64)
    }
}

/// Payload of `<prefix>.network.status`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub network_id: NetworkId,
    pub status: NetworkStatus,
}

#[derive(Debug, Clone)]
struct RecentBlock {
    identity: String,
    timestamp_ms: u64,
}

/// Bounded, arrival-ordered window of recent block headers.
///
/// A header whose identity matches the newest entry is dropped. Once the
/// window is full the oldest entry is evicted.
#[derive(Debug, Clone)]
pub struct RecentBlockWindow {
    entries: VecDeque<RecentBlock>,
    max: usize,
}

impl RecentBlockWindow {
    pub fn new(max: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max + 1),
            max: max.max(1),
        }
    }

    /// Append a header. Returns `false` for a consecutive duplicate.
    pub fn push(&mut self, header: &HeaderEvent) -> bool {
        if self
            .entries
            .back()
            .is_some_and(|last| last.identity == header.identity())
        {
            return false;
        }

        self.entries.push_back(RecentBlock {
            identity: header.identity().to_string(),
            timestamp_ms: header.timestamp().saturating_mul(1000),
        });
        while self.entries.len() > self.max {
            self.entries.pop_front();
        }
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Identities in arrival order.
    pub fn identities(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.identity.as_str())
    }

    /// Positive deltas between consecutive entries, in seconds.
    pub fn blocktimes(&self) -> Vec<f64> {
        self.entries
            .iter()
            .zip(self.entries.iter().skip(1))
            .filter(|(a, b)| b.timestamp_ms > a.timestamp_ms)
            .map(|(a, b)| (b.timestamp_ms - a.timestamp_ms) as f64 / 1000.0)
            .collect()
    }
}

/// Applies headers to a status snapshot. Owned by one daemon's ingest task.
#[derive(Debug)]
pub struct Ingestor {
    network_id: NetworkId,
    status: NetworkStatus,
    window: RecentBlockWindow,
    min_recent_blocks: usize,
}

impl Ingestor {
    pub fn new(
        network_id: NetworkId,
        status: NetworkStatus,
        max_recent_blocks: usize,
        min_recent_blocks: usize,
    ) -> Self {
        Self {
            network_id,
            status,
            window: RecentBlockWindow::new(max_recent_blocks),
            min_recent_blocks,
        }
    }

    pub fn status(&self) -> &NetworkStatus {
        &self.status
    }

    pub fn window(&self) -> &RecentBlockWindow {
        &self.window
    }

    /// Fold one header into the snapshot. Genesis headers change nothing and
    /// yield no event.
    pub fn apply(&mut self, header: &HeaderEvent) -> Option<BlockFinalized> {
        let number = header.number();
        if number == 0 {
            return None;
        }

        let timestamp_ms = header.timestamp().saturating_mul(1000);
        self.status.block = number;
        self.status.syncing = number == 0;
        self.status.last_block_at = Some(timestamp_ms);

        self.window.push(header);

        if self.window.len() >= self.min_recent_blocks {
            let blocktimes = self.window.blocktimes();
            if !blocktimes.is_empty() {
                let average = blocktimes.iter().sum::<f64>() / blocktimes.len() as f64;
                self.status
                    .meta
                    .insert("average_blocktime".to_string(), Value::from(average));
                self.status
                    .meta
                    .insert("blocktimes".to_string(), Value::from(blocktimes));
            }
            self.status.meta.insert(
                "last_block_hash".to_string(),
                Value::from(header.hash().to_string()),
            );
        }

        match serde_json::to_value(header) {
            Ok(value) => {
                self.status.meta.insert("last_block_header".to_string(), value);
            }
            Err(e) => tracing::warn!(error = %e, "Failed to encode block header"),
        }

        Some(BlockFinalized {
            network_id: self.network_id.clone(),
            block: number,
            blockhash: header.hash().to_string(),
            timestamp: timestamp_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::types::{BcoinHeader, EthereumHeader};

    fn eth(number: u64, timestamp: u64) -> HeaderEvent {
        HeaderEvent::Ethereum(EthereumHeader {
            number,
            hash: format!("0x{:04x}", number),
            parent_hash: format!("0x{:04x}", number.saturating_sub(1)),
            timestamp,
        })
    }

    fn ingestor() -> Ingestor {
        Ingestor::new(NetworkId::new(), NetworkStatus::new("1"), 8, 3)
    }

    #[test]
    fn test_window_bounded_and_deduplicated() {
        let mut window = RecentBlockWindow::new(8);
        for n in 1..=20 {
            assert!(window.push(&eth(n, n * 10)));
            assert!(!window.push(&eth(n, n * 10)));
            assert!(window.len() <= 8);
        }
        let ids: Vec<_> = window.identities().collect();
        assert_eq!(ids.first().copied(), Some("0x000d"));
        assert_eq!(ids.last().copied(), Some("0x0014"));
    }

    #[test]
    fn test_bcoin_dedup_uses_merkle_root() {
        let mut window = RecentBlockWindow::new(8);
        let header = |hash: &str| {
            HeaderEvent::Bcoin(BcoinHeader {
                height: 5,
                hash: hash.to_string(),
                merkle_root: "root".to_string(),
                time: 1,
            })
        };
        assert!(window.push(&header("a")));
        assert!(!window.push(&header("b")));
    }

    #[test]
    fn test_average_blocktime() {
        let mut ingestor = ingestor();
        let t0 = 1_700_000_000;

        ingestor.apply(&eth(1, t0));
        ingestor.apply(&eth(2, t0 + 10));
        assert!(ingestor.status().average_blocktime().is_none());
        assert!(!ingestor.status().meta.contains_key("last_block_hash"));

        ingestor.apply(&eth(3, t0 + 22));
        assert_eq!(ingestor.status().average_blocktime(), Some(11.0));

        ingestor.apply(&eth(4, t0 + 30));
        let status = ingestor.status();
        assert_eq!(status.average_blocktime(), Some(10.0));
        assert_eq!(status.meta["blocktimes"], serde_json::json!([10.0, 12.0, 8.0]));
        assert_eq!(status.meta["last_block_hash"], "0x0004");
        assert_eq!(status.block, 4);
        assert_eq!(status.last_block_at, Some((t0 + 30) * 1000));
        assert!(!status.syncing);
    }

    #[test]
    fn test_garbage_timestamp_saturates() {
        let mut ingestor = ingestor();
        ingestor.apply(&eth(1, 100));
        let event = ingestor.apply(&eth(2, u64::MAX)).unwrap();
        assert_eq!(event.timestamp, u64::MAX);
        assert_eq!(ingestor.status().last_block_at, Some(u64::MAX));

        // A sane header after the garbage one still lands.
        ingestor.apply(&eth(3, 120));
        assert_eq!(ingestor.status().block, 3);
        // Backwards steps are not counted as block times.
        assert_eq!(ingestor.window().blocktimes().len(), 1);
    }

    #[test]
    fn test_genesis_is_ignored() {
        let mut ingestor = ingestor();
        ingestor.apply(&eth(7, 100));
        let before = ingestor.status().clone();

        assert!(ingestor.apply(&eth(0, 200)).is_none());
        assert_eq!(ingestor.status(), &before);
        assert_eq!(ingestor.window().len(), 1);
    }

    #[test]
    fn test_apply_emits_block_finalized() {
        let mut ingestor = ingestor();
        let event = ingestor.apply(&eth(9, 50)).unwrap();
        assert_eq!(event.block, 9);
        assert_eq!(event.blockhash, "0x0009");
        assert_eq!(event.timestamp, 50_000);
        assert!(ingestor.status().meta.contains_key("last_block_header"));
    }
}
