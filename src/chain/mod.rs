//! On-chain account query facade
//!
//! The probes only need three narrow queries, so the RPC surface is hidden
//! behind a trait and the rest of the crate never touches solana-client
//! types directly.

use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_request::TokenAccountsFilter;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_transaction_status::{EncodedTransaction, UiMessage, UiTransactionEncoding};
use std::str::FromStr;
use std::time::Duration;

use crate::config::RpcConfig;
use crate::error::{Error, Result};

/// Raw mint account contents
#[derive(Debug, Clone)]
pub struct MintAccount {
    /// Owning program id, base58
    pub owner: String,
    pub data: Vec<u8>,
}

/// Narrow contract over the chain queries the probes need
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch a mint account by address
    async fn mint_account(&self, mint: &str) -> Result<MintAccount>;

    /// Program id of the first instruction of a confirmed transaction
    async fn first_instruction_program(&self, signature: &str) -> Result<Option<String>>;

    /// Balances of every token account `owner` holds for `mint`
    async fn token_account_balances(&self, owner: &str, mint: &str) -> Result<Vec<f64>>;
}

/// RPC-backed implementation
pub struct RpcChainClient {
    rpc: RpcClient,
}

impl RpcChainClient {
    pub fn new(cfg: &RpcConfig) -> Self {
        Self {
            rpc: RpcClient::new_with_timeout_and_commitment(
                cfg.endpoint.clone(),
                Duration::from_millis(cfg.timeout_ms),
                CommitmentConfig::confirmed(),
            ),
        }
    }
}

fn parse_pubkey(addr: &str) -> Result<Pubkey> {
    Pubkey::from_str(addr).map_err(|e| Error::MalformedEvent(format!("pubkey {}: {}", addr, e)))
}

#[async_trait]
impl ChainClient for RpcChainClient {
    async fn mint_account(&self, mint: &str) -> Result<MintAccount> {
        let account = self.rpc.get_account(&parse_pubkey(mint)?).await?;
        Ok(MintAccount {
            owner: account.owner.to_string(),
            data: account.data,
        })
    }

    async fn first_instruction_program(&self, signature: &str) -> Result<Option<String>> {
        let sig = Signature::from_str(signature)
            .map_err(|e| Error::MalformedEvent(format!("signature {}: {}", signature, e)))?;

        let tx = self
            .rpc
            .get_transaction(&sig, UiTransactionEncoding::Json)
            .await?;

        let EncodedTransaction::Json(ui_tx) = tx.transaction.transaction else {
            return Ok(None);
        };
        let UiMessage::Raw(message) = ui_tx.message else {
            return Ok(None);
        };

        Ok(message
            .instructions
            .first()
            .and_then(|ix| message.account_keys.get(ix.program_id_index as usize))
            .cloned())
    }

    async fn token_account_balances(&self, owner: &str, mint: &str) -> Result<Vec<f64>> {
        let accounts = self
            .rpc
            .get_token_accounts_by_owner(
                &parse_pubkey(owner)?,
                TokenAccountsFilter::Mint(parse_pubkey(mint)?),
            )
            .await?;

        let mut balances = Vec::with_capacity(accounts.len());
        for keyed in accounts {
            let balance = self
                .rpc
                .get_token_account_balance(&parse_pubkey(&keyed.pubkey)?)
                .await?;
            balances.push(
                balance
                    .ui_amount
                    .or_else(|| balance.amount.parse().ok())
                    .unwrap_or(0.0),
            );
        }
        Ok(balances)
    }
}
