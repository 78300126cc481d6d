//! Blockbook REST wire types and their conversion into engine types.
//!
//! Amounts arrive as integer subunits, either as JSON strings (`"5000000000"`)
//! or numbers. An input with a `coinbase` field, or without any address, is a
//! generation input. Entries flagged `isAddress: false` (OP_RETURN and other
//! non-standard scripts) carry no owner. A spend from an address must carry
//! a value.

use serde::{Deserialize, Serialize};

use richscan_core::types::{Transaction, TxInput, TxOutput};

use crate::error::ClientError;

/// `GET /api/v2`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub backend: BackendInfo,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInfo {
    /// Best block height known to the backing node.
    pub blocks: u64,
}

/// `GET /api/v2/block/{height}?page=N`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockResponse {
    pub hash: String,
    pub height: u64,
    #[serde(default)]
    pub page: Option<u32>,
    #[serde(default)]
    pub total_pages: Option<u32>,
    /// Inline shape.
    #[serde(default)]
    pub txs: Option<Vec<TxResponse>>,
    /// Reference shape.
    #[serde(default)]
    pub txids: Option<Vec<String>>,
}

impl BlockResponse {
    pub fn total_pages(&self) -> u32 {
        self.total_pages.unwrap_or(1).max(1)
    }
}

/// `GET /api/v2/tx/{txid}`, also embedded in inline blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxResponse {
    pub txid: String,
    #[serde(default)]
    pub vin: Vec<VinResponse>,
    #[serde(default)]
    pub vout: Vec<VoutResponse>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VinResponse {
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
    #[serde(default)]
    pub value: Option<WireAmount>,
    #[serde(default)]
    pub coinbase: Option<String>,
    #[serde(default)]
    pub is_address: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoutResponse {
    #[serde(default)]
    pub addresses: Option<Vec<String>>,
    #[serde(default)]
    pub value: Option<WireAmount>,
    #[serde(default)]
    pub is_address: Option<bool>,
}

/// An amount in subunits, as a number or a decimal string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireAmount {
    Number(i64),
    Text(String),
}

impl WireAmount {
    pub fn subunits(&self) -> Result<i64, ClientError> {
        match self {
            Self::Number(n) => Ok(*n),
            Self::Text(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| ClientError::Payload(format!("amount '{s}' is not an integer subunit value"))),
        }
    }
}

fn owner(addresses: &Option<Vec<String>>, is_address: Option<bool>) -> Option<String> {
    if is_address == Some(false) {
        return None;
    }
    addresses
        .as_ref()
        .and_then(|a| a.first())
        .filter(|a| !a.is_empty())
        .cloned()
}

impl TryFrom<TxResponse> for Transaction {
    type Error = ClientError;

    fn try_from(tx: TxResponse) -> Result<Self, Self::Error> {
        let inputs = tx
            .vin
            .iter()
            .map(|vin| {
                let address = owner(&vin.addresses, vin.is_address);
                if vin.coinbase.is_some() || address.is_none() {
                    return Ok(TxInput::generation());
                }
                let value = vin.value.as_ref().ok_or_else(|| {
                    ClientError::Payload(format!(
                        "tx {}: input spending from {} has no value",
                        tx.txid,
                        address.as_deref().unwrap_or_default()
                    ))
                })?;
                Ok(TxInput {
                    address,
                    amount: Some(value.subunits()?),
                    is_generation: false,
                })
            })
            .collect::<Result<Vec<_>, ClientError>>()?;

        let outputs = tx
            .vout
            .iter()
            .map(|vout| {
                Ok(TxOutput {
                    address: owner(&vout.addresses, vout.is_address),
                    amount: vout.value.as_ref().map(WireAmount::subunits).transpose()?.unwrap_or(0),
                })
            })
            .collect::<Result<Vec<_>, ClientError>>()?;

        Ok(Transaction {
            txid: tx.txid,
            inputs,
            outputs,
        })
    }
}
