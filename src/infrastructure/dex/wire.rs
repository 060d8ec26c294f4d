//! Wire types for the Jupiter-style aggregator API.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize)]
pub struct QuoteRequestWire {
    #[serde(rename = "inputMint")]
    pub input_mint: String,
    #[serde(rename = "outputMint")]
    pub output_mint: String,
    pub amount: u64,
    #[serde(rename = "slippageBps")]
    pub slippage_bps: u16,
    #[serde(rename = "onlyDirectRoutes")]
    pub only_direct_routes: bool,
    #[serde(rename = "asLegacyTransaction")]
    pub as_legacy_transaction: bool,
    #[serde(rename = "platformFeeBps")]
    pub platform_fee_bps: u16,
}

/// Canonical subset of the aggregator quote response. Amounts come back
/// as decimal strings; `priceImpactPct` is a decimal percent.
#[derive(Debug, Clone, Deserialize)]
pub struct QuoteResponseWire {
    #[serde(rename = "inAmount")]
    pub in_amount: String,
    #[serde(rename = "outAmount")]
    pub out_amount: String,
    #[serde(rename = "priceImpactPct", default)]
    pub price_impact_pct: Option<String>,
    #[serde(rename = "routePlan", default)]
    pub route_plan: Option<serde_json::Value>,
    #[serde(rename = "routeId", default)]
    pub route_id: Option<String>,
}

impl QuoteResponseWire {
    /// Convert the decimal-percent impact to basis points,
    /// `bps = round(pct * 100)`.
    pub fn price_impact_bps(&self) -> i32 {
        self.price_impact_pct
            .as_deref()
            .and_then(|pct| pct.parse::<f64>().ok())
            .map(|pct| (pct * 100.0).round() as i32)
            .unwrap_or(0)
    }

    pub fn route_steps(&self) -> usize {
        self.route_plan
            .as_ref()
            .and_then(|plan| plan.as_array())
            .map(|steps| steps.len())
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SwapRequestWire {
    #[serde(rename = "userWalletPrivateKeyBase58")]
    pub user_wallet_private_key_base58: String,
    #[serde(rename = "quoteResponse")]
    pub quote_response: serde_json::Value,
    #[serde(rename = "wrapAndUnwrapSol")]
    pub wrap_and_unwrap_sol: bool,
    #[serde(rename = "asLegacyTransaction")]
    pub as_legacy_transaction: bool,
    #[serde(rename = "collectFees")]
    pub collect_fees: bool,
    #[serde(rename = "verifySwap")]
    pub verify_swap: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SwapResponseWire {
    #[serde(rename = "transactionId", default)]
    pub transaction_id: Option<String>,
    pub status: String,
    #[serde(rename = "outAmount", default)]
    pub out_amount: Option<String>,
    #[serde(rename = "newBalance", default)]
    pub new_balance: Option<u64>,
    #[serde(default)]
    pub verified: Option<bool>,
    #[serde(rename = "feeCollection", default)]
    pub fee_collection: Option<FeeCollectionWire>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FeeCollectionWire {
    pub status: String,
    #[serde(rename = "transactionId", default)]
    pub transaction_id: Option<String>,
    #[serde(rename = "feeAmount", default)]
    pub fee_amount: Option<u64>,
    #[serde(rename = "feeTokenMint", default)]
    pub fee_token_mint: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}
