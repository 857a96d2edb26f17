// src/codec.rs
use ethers::types::{Bytes, U256};
use serde::{de::Error as _, Deserialize, Deserializer};
use serde_json::Value;

use crate::error::DecodeError;
use crate::types::SendUserOperationRequest;

/// A decoded `eth_sendUserOperation` call.
///
/// `param_count` is kept so that the arity rule can be evaluated after the entry point
/// allow-list check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedRequest {
    pub request: SendUserOperationRequest,
    pub param_count: usize,
}

/// Decodes the raw `params` member of an `eth_sendUserOperation` call.
///
/// Only the positional form `[{ "userOperation": {..}, "entryPoint": "0x.." }]` is
/// accepted. When more than one element is present the first one is decoded and the
/// surplus is left for the arity rule to reject.
pub fn decode_send_params(raw: Option<&str>) -> Result<DecodedRequest, DecodeError> {
    let raw = raw.ok_or(DecodeError::MissingParams)?;
    let value: Value =
        serde_json::from_str(raw).map_err(|e| DecodeError::Malformed(e.to_string()))?;

    let Value::Array(mut params) = value else {
        return Err(DecodeError::NotPositional);
    };
    if params.is_empty() {
        return Err(DecodeError::MissingParams);
    }

    let param_count = params.len();
    let request = serde_json::from_value(params.swap_remove(0))
        .map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))?;

    Ok(DecodedRequest {
        request,
        param_count,
    })
}

/// Parses a non-negative quantity written as a decimal or `0x`-prefixed hex string.
pub fn parse_quantity(s: &str) -> Result<U256, String> {
    if s.starts_with('-') {
        return Err(format!("invalid quantity {s:?}: negative values are not allowed"));
    }

    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some("") => return Err(format!("invalid quantity {s:?}: missing hex digits")),
        Some(digits) => U256::from_str_radix(digits, 16).map_err(|e| e.to_string()),
        None if s.is_empty() => return Err("invalid quantity: empty string".to_string()),
        None => U256::from_dec_str(s).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| format!("invalid quantity {s:?}: {e}"))
}

/// Parses a `0x`-prefixed hex string into raw bytes. `"0x"` is the empty byte string.
pub fn parse_hex_bytes(s: &str) -> Result<Bytes, String> {
    let digits = s
        .strip_prefix("0x")
        .ok_or_else(|| format!("invalid bytes {s:?}: missing 0x prefix"))?;
    hex::decode(digits)
        .map(Bytes::from)
        .map_err(|e| format!("invalid bytes {s:?}: {e}"))
}

pub fn deserialize_quantity<'de, D>(deserializer: D) -> Result<U256, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_quantity(&s).map_err(D::Error::custom)
}

pub fn deserialize_hex_bytes<'de, D>(deserializer: D) -> Result<Bytes, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_hex_bytes(&s).map_err(D::Error::custom)
}
