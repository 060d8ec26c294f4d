//! Wallet sources.
//!
//! A read-only query interface over the wallet fleet. Keys are never
//! held by the core; they are requested just-in-time at execute via
//! `signing_key`.

use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use solana_sdk::pubkey::Pubkey;
use std::collections::HashMap;
use std::path::Path;

use crate::shared::errors::{AppError, SwapError};
use crate::shared::types::Wallet;

#[async_trait]
pub trait WalletSource: Send + Sync {
    async fn list_wallets(&self) -> Result<Vec<Wallet>, AppError>;

    /// Balance of `address` for `mint`, in base units.
    async fn balance(&self, address: &str, mint: &Pubkey) -> Result<u64, AppError>;

    /// Fetch the signing key for a wallet just-in-time.
    async fn signing_key(&self, index: usize) -> Result<String, SwapError>;
}

#[derive(Debug, Clone, Deserialize)]
struct WalletFileEntry {
    address: String,
    #[serde(default)]
    private_key: Option<String>,
    /// Funding-pipeline balance snapshot, base units.
    #[serde(default)]
    balance: u64,
}

#[derive(Debug, Clone, Deserialize)]
struct WalletFile {
    wallets: Vec<WalletFileEntry>,
}

/// Fleet loaded from a funding-pipeline JSON file.
pub struct FileWalletSource {
    entries: Vec<WalletFileEntry>,
}

impl FileWalletSource {
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("read wallet file {}", path.as_ref().display()))?;
        let file: WalletFile = serde_json::from_str(&raw).context("parse wallet file")?;
        Ok(Self {
            entries: file.wallets,
        })
    }
}

#[async_trait]
impl WalletSource for FileWalletSource {
    async fn list_wallets(&self) -> Result<Vec<Wallet>, AppError> {
        Ok(self
            .entries
            .iter()
            .enumerate()
            .map(|(index, entry)| Wallet {
                index,
                address: entry.address.clone(),
                has_signing_key: entry.private_key.is_some(),
            })
            .collect())
    }

    async fn balance(&self, address: &str, _mint: &Pubkey) -> Result<u64, AppError> {
        self.entries
            .iter()
            .find(|entry| entry.address == address)
            .map(|entry| entry.balance)
            .ok_or_else(|| AppError::WalletError(format!("unknown wallet address {}", address)))
    }

    async fn signing_key(&self, index: usize) -> Result<String, SwapError> {
        self.entries
            .get(index)
            .and_then(|entry| entry.private_key.clone())
            .ok_or_else(|| SwapError::Signature(format!("no signing key for wallet {}", index)))
    }
}

/// In-memory fleet used by tests and mock runs.
pub struct StaticWalletSource {
    wallets: Vec<Wallet>,
    balances: HashMap<String, u64>,
    keys: HashMap<usize, String>,
}

impl StaticWalletSource {
    /// Build `count` wallets with the given balances; wallet `i` gets
    /// address `wallet{i}` and signing key `key{i}`.
    pub fn with_balances(balances: &[u64]) -> Self {
        let wallets = balances
            .iter()
            .enumerate()
            .map(|(index, _)| Wallet {
                index,
                address: format!("wallet{}", index),
                has_signing_key: true,
            })
            .collect::<Vec<_>>();
        let balance_map = wallets
            .iter()
            .zip(balances)
            .map(|(w, b)| (w.address.clone(), *b))
            .collect();
        let keys = wallets
            .iter()
            .map(|w| (w.index, format!("key{}", w.index)))
            .collect();
        Self {
            wallets,
            balances: balance_map,
            keys,
        }
    }

    pub fn without_key(mut self, index: usize) -> Self {
        self.keys.remove(&index);
        if let Some(wallet) = self.wallets.get_mut(index) {
            wallet.has_signing_key = false;
        }
        self
    }
}

#[async_trait]
impl WalletSource for StaticWalletSource {
    async fn list_wallets(&self) -> Result<Vec<Wallet>, AppError> {
        Ok(self.wallets.clone())
    }

    async fn balance(&self, address: &str, _mint: &Pubkey) -> Result<u64, AppError> {
        self.balances
            .get(address)
            .copied()
            .ok_or_else(|| AppError::WalletError(format!("unknown wallet address {}", address)))
    }

    async fn signing_key(&self, index: usize) -> Result<String, SwapError> {
        self.keys
            .get(&index)
            .cloned()
            .ok_or_else(|| SwapError::Signature(format!("no signing key for wallet {}", index)))
    }
}
