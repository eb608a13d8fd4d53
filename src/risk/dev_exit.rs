//! Creator exit probe
//!
//! Answers one question: does the creator wallet still hold any of the
//! token? Entry is gated on a positive answer when `require_dev_sold` is
//! on. Errors answer "no" so a flaky RPC never unlocks an entry.

use std::sync::Arc;
use tracing::warn;

use crate::chain::ChainClient;

/// Periodic on-chain query for creator holdings
pub struct DevExitProbe {
    chain: Arc<dyn ChainClient>,
}

impl DevExitProbe {
    pub fn new(chain: Arc<dyn ChainClient>) -> Self {
        Self { chain }
    }

    /// True iff every token account the creator holds for `mint` is empty
    pub async fn has_exited(&self, mint: &str, dev_wallet: &str) -> bool {
        match self.chain.token_account_balances(dev_wallet, mint).await {
            Ok(balances) => balances.iter().all(|b| *b == 0.0),
            Err(e) => {
                warn!(mint = %mint, dev = %dev_wallet, error = %e, "Dev exit probe failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::mock::MockChain;

    #[tokio::test]
    async fn test_all_zero_balances_means_exited() {
        let chain = MockChain {
            balances: vec![0.0, 0.0],
            ..Default::default()
        };
        let probe = DevExitProbe::new(Arc::new(chain));
        assert!(probe.has_exited("mint1", "dev1").await);
    }

    #[tokio::test]
    async fn test_remaining_balance_means_not_exited() {
        let chain = MockChain {
            balances: vec![0.0, 1_500.0],
            ..Default::default()
        };
        let probe = DevExitProbe::new(Arc::new(chain));
        assert!(!probe.has_exited("mint1", "dev1").await);
    }

    #[tokio::test]
    async fn test_rpc_error_is_conservative_false() {
        let chain = MockChain {
            fail: true,
            ..Default::default()
        };
        let probe = DevExitProbe::new(Arc::new(chain));
        assert!(!probe.has_exited("mint1", "dev1").await);
    }
}
