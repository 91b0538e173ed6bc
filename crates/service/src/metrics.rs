//! In-process metrics registry.
//!
//! The daemon exposes no scrape endpoint; the registry is the sink the
//! loops report into and the app's metrics worker refreshes from the store.

use std::collections::HashMap;

use parking_lot::RwLock;

use fp_store::StoredFinalityProvider;
use fp_types::FinalityProviderStatus;

/// Per-provider metric values.
#[derive(Debug, Clone)]
pub struct FpMetricsSnapshot {
    /// Last recorded lifecycle status
    pub status: FinalityProviderStatus,
    /// Highest voted height
    pub last_voted_height: u64,
    /// Highest height covered by a committed randomness batch
    pub last_committed_rand_height: u64,
    /// Finality signatures submitted since process start
    pub submitted_sig_count: u64,
}

impl Default for FpMetricsSnapshot {
    fn default() -> Self {
        Self {
            status: FinalityProviderStatus::Created,
            last_voted_height: 0,
            last_committed_rand_height: 0,
            submitted_sig_count: 0,
        }
    }
}

/// Registry of per-provider metrics, keyed by BTC public key hex.
#[derive(Default)]
pub struct FpMetrics {
    inner: RwLock<HashMap<String, FpMetricsSnapshot>>,
}

impl FpMetrics {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a provider's lifecycle status.
    pub fn record_status(&self, pk_hex: &str, status: FinalityProviderStatus) {
        self.inner.write().entry(pk_hex.to_string()).or_default().status = status;
    }

    /// Record the highest voted height.
    pub fn record_last_voted_height(&self, pk_hex: &str, height: u64) {
        let mut inner = self.inner.write();
        let entry = inner.entry(pk_hex.to_string()).or_default();
        if height > entry.last_voted_height {
            entry.last_voted_height = height;
        }
    }

    /// Record the highest height covered by committed randomness.
    pub fn record_last_committed_rand_height(&self, pk_hex: &str, height: u64) {
        let mut inner = self.inner.write();
        let entry = inner.entry(pk_hex.to_string()).or_default();
        if height > entry.last_committed_rand_height {
            entry.last_committed_rand_height = height;
        }
    }

    /// Count submitted finality signatures.
    pub fn incr_submitted_sigs(&self, pk_hex: &str, count: u64) {
        self.inner
            .write()
            .entry(pk_hex.to_string())
            .or_default()
            .submitted_sig_count += count;
    }

    /// Refresh status and voted height from the stored records.
    pub fn update_from_providers(&self, fps: &[StoredFinalityProvider]) {
        let mut inner = self.inner.write();
        for fp in fps {
            let entry = inner.entry(fp.btc_pk_hex()).or_default();
            entry.status = fp.status;
            if fp.last_voted_height > entry.last_voted_height {
                entry.last_voted_height = fp.last_voted_height;
            }
        }
    }

    /// The current values for one provider.
    pub fn snapshot(&self, pk_hex: &str) -> Option<FpMetricsSnapshot> {
        self.inner.read().get(pk_hex).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_keyed_per_provider() {
        let metrics = FpMetrics::new();
        metrics.record_status("aa", FinalityProviderStatus::Active);
        metrics.record_last_voted_height("aa", 102);
        metrics.incr_submitted_sigs("aa", 3);
        metrics.record_status("bb", FinalityProviderStatus::Jailed);

        let aa = metrics.snapshot("aa").unwrap();
        assert_eq!(aa.status, FinalityProviderStatus::Active);
        assert_eq!(aa.last_voted_height, 102);
        assert_eq!(aa.submitted_sig_count, 3);

        let bb = metrics.snapshot("bb").unwrap();
        assert_eq!(bb.status, FinalityProviderStatus::Jailed);
        assert_eq!(bb.submitted_sig_count, 0);
    }

    #[test]
    fn heights_never_regress() {
        let metrics = FpMetrics::new();
        metrics.record_last_voted_height("aa", 10);
        metrics.record_last_voted_height("aa", 5);
        assert_eq!(metrics.snapshot("aa").unwrap().last_voted_height, 10);
    }
}
