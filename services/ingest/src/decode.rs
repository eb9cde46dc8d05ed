//! Receipt and log decoding for EVM sources
//!
//! Event signatures are the keccak256 hashes of the canonical Solidity
//! event definitions. They are deterministic, public and immutable, so
//! they are kept as lowercase hex constants and matched against `topic0`
//! of hand-parsed JSON-RPC logs.

use crate::error::{IngestError, Result};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::Value;

/// ERC-20 Transfer event signature
/// `Transfer(address indexed from, address indexed to, uint256 value)`
pub const ERC20_TRANSFER: &str =
    "0xddf252ad1be2c89b69c2b068fc378daa952ba7f163c4a11628f55a4df523b3ef";

/// Uniswap V2 Swap event signature
/// `Swap(address,uint256,uint256,uint256,uint256,address)`
pub const UNISWAP_V2_SWAP: &str =
    "0xd78ad95fa46c994b6551d0da85fc275fe613ce37657fb8d5e3d130840159d822";

/// Uniswap V3 Swap event signature
/// `Swap(address,address,int256,int256,uint160,uint128,int24)`
pub const UNISWAP_V3_SWAP: &str =
    "0xc42079f94a6350d7e6235f29174924f928cc2ac818eb64fed8004e115fbcca67";

/// Uniswap V2 Mint event signature (liquidity add)
/// `Mint(address,uint256,uint256)`
pub const UNISWAP_V2_MINT: &str =
    "0x4c209b5fc8ad50758f13e2e1088ba56a560dff690a1c6fef26394f4c03821c4f";

/// Uniswap V2 Burn event signature (liquidity removal)
/// `Burn(address,uint256,uint256,address)`
pub const UNISWAP_V2_BURN: &str =
    "0xdccd412f0b1252819cb1fd330b93224ca42612892bb3f4f789976e6d81936496";

/// One log entry of a transaction receipt, hand-parsed from JSON-RPC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiptLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub log_index: Option<u32>,
}

impl ReceiptLog {
    pub fn topic0(&self) -> Option<&str> {
        self.topics.first().map(String::as_str)
    }

    /// Extract the address packed into an indexed topic (last 20 bytes).
    pub fn topic_address(&self, index: usize) -> Option<String> {
        let topic = self.topics.get(index)?;
        let hex_part = topic.strip_prefix("0x")?;
        if hex_part.len() < 40 {
            return None;
        }
        Some(format!("0x{}", &hex_part[hex_part.len() - 40..].to_lowercase()))
    }
}

/// A transaction receipt reduced to the fields ingestion needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: String,
    pub status_ok: bool,
    pub block_number: Option<u64>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub effective_gas_price_wei: Option<u128>,
    pub logs: Vec<ReceiptLog>,
}

/// Parse a `0x`-prefixed hex quantity.
pub fn parse_hex_u64(raw: &str) -> Option<u64> {
    u64::from_str_radix(raw.strip_prefix("0x")?, 16).ok()
}

pub fn parse_hex_u128(raw: &str) -> Option<u128> {
    u128::from_str_radix(raw.strip_prefix("0x")?, 16).ok()
}

/// Parse an unsigned 256-bit hex quantity into a decimal-adjusted amount.
///
/// Values beyond 128 bits are saturated; a transfer that large is out of
/// any token's real supply and only needs to stay "huge", not exact.
pub fn parse_hex_amount(raw: &str, decimals: u8) -> Option<Decimal> {
    let hex_part = raw.strip_prefix("0x")?;
    let trimmed = hex_part.trim_start_matches('0');
    if trimmed.is_empty() {
        return Some(Decimal::ZERO);
    }
    if !trimmed.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    let units = if trimmed.len() > 32 {
        u128::MAX
    } else {
        u128::from_str_radix(trimmed, 16).ok()?
    };
    // Decimal carries a 96-bit mantissa and scales up to 28
    let scale = (decimals as u32).min(28);
    let capped = units.min(i128::MAX as u128) as i128;
    let amount = Decimal::try_from_i128_with_scale(capped, scale).unwrap_or(Decimal::MAX);
    Some(amount.normalize())
}

/// Parse one JSON log object.
pub fn parse_log(value: &Value) -> Result<ReceiptLog> {
    let address = value
        .get("address")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::MissingField {
            field: "log.address".into(),
        })?
        .to_lowercase();

    let topics = value
        .get("topics")
        .and_then(Value::as_array)
        .map(|topics| {
            topics
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_lowercase)
                .collect()
        })
        .unwrap_or_default();

    let data = value
        .get("data")
        .and_then(Value::as_str)
        .unwrap_or("0x")
        .to_lowercase();

    let log_index = value
        .get("logIndex")
        .and_then(Value::as_str)
        .and_then(parse_hex_u64)
        .map(|index| index as u32);

    Ok(ReceiptLog {
        address,
        topics,
        data,
        log_index,
    })
}

/// Parse an `eth_getTransactionReceipt` result object.
pub fn parse_receipt(value: &Value) -> Result<TxReceipt> {
    let tx_hash = value
        .get("transactionHash")
        .and_then(Value::as_str)
        .ok_or_else(|| IngestError::MissingField {
            field: "transactionHash".into(),
        })?
        .to_lowercase();

    let status_ok = value
        .get("status")
        .and_then(Value::as_str)
        .map(|status| status == "0x1")
        .unwrap_or(false);

    let logs = value
        .get("logs")
        .and_then(Value::as_array)
        .map(|logs| logs.iter().filter_map(|log| parse_log(log).ok()).collect())
        .unwrap_or_default();

    Ok(TxReceipt {
        tx_hash,
        status_ok,
        block_number: value
            .get("blockNumber")
            .and_then(Value::as_str)
            .and_then(parse_hex_u64),
        from: value
            .get("from")
            .and_then(Value::as_str)
            .map(str::to_lowercase),
        to: value
            .get("to")
            .and_then(Value::as_str)
            .map(str::to_lowercase),
        effective_gas_price_wei: value
            .get("effectiveGasPrice")
            .and_then(Value::as_str)
            .and_then(parse_hex_u128),
        logs,
    })
}

/// Convert wei to gwei.
pub fn wei_to_gwei(wei: u128) -> Decimal {
    let capped = wei.min(i128::MAX as u128) as i128;
    Decimal::try_from_i128_with_scale(capped, 9)
        .unwrap_or(Decimal::MAX)
        .normalize()
}

/// Convert a unix-seconds string or number into a block time.
pub fn parse_unix_time(value: &Value) -> Option<DateTime<Utc>> {
    let secs = match value {
        Value::String(raw) => raw.parse::<i64>().ok().or_else(|| {
            parse_hex_u64(raw).map(|v| v as i64)
        })?,
        Value::Number(number) => number.as_i64()?,
        _ => return None,
    };
    Utc.timestamp_opt(secs, 0).single()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn test_parse_hex_amount_decimal_adjusts() {
        // 50_000 USDC with 6 decimals = 50_000_000_000 raw units
        let raw = format!("0x{:x}", 50_000_000_000u64);
        assert_eq!(parse_hex_amount(&raw, 6), Some(dec!(50_000)));
    }

    #[test]
    fn test_parse_hex_amount_zero_and_empty() {
        assert_eq!(parse_hex_amount("0x0", 18), Some(Decimal::ZERO));
        assert_eq!(parse_hex_amount("0x", 18), Some(Decimal::ZERO));
        assert_eq!(parse_hex_amount("nope", 18), None);
    }

    #[test]
    fn test_topic_address_extraction() {
        let log = ReceiptLog {
            address: "0xtoken".into(),
            topics: vec![
                ERC20_TRANSFER.into(),
                "0x00000000000000000000000028c6c06298d514db089934071355e5743bf21d60".into(),
            ],
            data: "0x".into(),
            log_index: None,
        };
        assert_eq!(
            log.topic_address(1).as_deref(),
            Some("0x28c6c06298d514db089934071355e5743bf21d60")
        );
        assert_eq!(log.topic_address(2), None);
    }

    #[test]
    fn test_parse_receipt() {
        let value = json!({
            "transactionHash": "0xABC",
            "status": "0x1",
            "blockNumber": "0x10",
            "from": "0xFrom",
            "to": "0xTo",
            "effectiveGasPrice": "0x4a817c800", // 20 gwei
            "logs": [{
                "address": "0xToken",
                "topics": [ERC20_TRANSFER],
                "data": "0x1",
                "logIndex": "0x2"
            }]
        });
        let receipt = parse_receipt(&value).unwrap();
        assert!(receipt.status_ok);
        assert_eq!(receipt.tx_hash, "0xabc");
        assert_eq!(receipt.block_number, Some(16));
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].log_index, Some(2));
        assert_eq!(wei_to_gwei(receipt.effective_gas_price_wei.unwrap()), dec!(20));
    }

    #[test]
    fn test_failed_receipt_status() {
        let value = json!({ "transactionHash": "0xabc", "status": "0x0", "logs": [] });
        assert!(!parse_receipt(&value).unwrap().status_ok);
    }

    #[test]
    fn test_parse_unix_time_forms() {
        assert!(parse_unix_time(&json!("1700000000")).is_some());
        assert!(parse_unix_time(&json!("0x655c8b00")).is_some());
        assert!(parse_unix_time(&json!(1_700_000_000)).is_some());
        assert!(parse_unix_time(&json!(null)).is_none());
    }
}
