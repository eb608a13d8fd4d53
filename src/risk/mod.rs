//! Admission risk probe: transfer fee and bundler heuristic
//!
//! Probes run fire-and-forget off the admission path with a hard
//! concurrency cap. Any RPC failure leaves the corresponding field at its
//! default, which admits the token (fail-open).

pub mod dev_exit;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::chain::ChainClient;

/// Cap on concurrently running risk probes
pub const MAX_RISK_CONCURRENCY: usize = 6;

/// Backoff while waiting for a probe slot
const ADMISSION_BACKOFF_MS: u64 = 50;

/// Extended token program whose mints can carry a transfer fee
pub const EXTENDED_TOKEN_PROGRAM: &str = "TokenzQdBNbLqP5VEhdkAS6EPFLC1PHnBqCXEpPxuEb";

/// Byte offset of the little-endian fee field in extended mint data
const TRANSFER_FEE_OFFSET: usize = 133;

/// Outcome of a risk probe
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RiskReport {
    /// Transfer fee in basis points; None when the probe could not tell
    pub fee_bps: Option<u16>,
    pub bundler: bool,
}

/// Bounded-concurrency probe of on-chain token metadata
pub struct RiskAssessor {
    chain: Arc<dyn ChainClient>,
    bundler_programs: Vec<String>,
    in_flight: AtomicUsize,
}

impl RiskAssessor {
    pub fn new(chain: Arc<dyn ChainClient>, bundler_programs: Vec<String>) -> Self {
        Self {
            chain,
            bundler_programs,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Currently running probes
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Probe a mint, waiting for a free slot first.
    ///
    /// `create_tx` is the creation transaction signature, when the pool
    /// event carried one; it drives the bundler check.
    pub async fn assess(&self, mint: &str, create_tx: Option<&str>) -> RiskReport {
        self.acquire_slot().await;
        let report = self.probe(mint, create_tx).await;
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        report
    }

    async fn acquire_slot(&self) {
        loop {
            let current = self.in_flight.load(Ordering::SeqCst);
            if current < MAX_RISK_CONCURRENCY
                && self
                    .in_flight
                    .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
                    .is_ok()
            {
                return;
            }
            tokio::time::sleep(Duration::from_millis(ADMISSION_BACKOFF_MS)).await;
        }
    }

    async fn probe(&self, mint: &str, create_tx: Option<&str>) -> RiskReport {
        let fee_bps = match self.chain.mint_account(mint).await {
            Ok(account) => {
                if account.owner == EXTENDED_TOKEN_PROGRAM {
                    read_transfer_fee(&account.data)
                } else {
                    // Legacy token program mints cannot carry a fee
                    Some(0)
                }
            }
            Err(e) => {
                warn!(mint = %mint, error = %e, "Mint account probe failed");
                None
            }
        };

        let bundler = match create_tx {
            Some(signature) => match self.chain.first_instruction_program(signature).await {
                Ok(Some(program)) => {
                    let hit = self.bundler_programs.iter().any(|p| p == &program);
                    if hit {
                        debug!(mint = %mint, program = %program, "Bundler program matched");
                    }
                    hit
                }
                Ok(None) => false,
                Err(e) => {
                    warn!(mint = %mint, error = %e, "Create transaction probe failed");
                    false
                }
            },
            None => false,
        };

        RiskReport { fee_bps, bundler }
    }
}

/// Fee lives at a fixed offset of the extended mint layout; shorter data
/// means the extension is absent and the fee unknowable.
fn read_transfer_fee(data: &[u8]) -> Option<u16> {
    if data.len() >= TRANSFER_FEE_OFFSET + 2 {
        Some(u16::from_le_bytes([
            data[TRANSFER_FEE_OFFSET],
            data[TRANSFER_FEE_OFFSET + 1],
        ]))
    } else {
        None
    }
}
