// src/types.rs
use ethers::types::{Address, Bytes, H256, U256};
use serde::{Deserialize, Serialize};

use crate::codec::{deserialize_hex_bytes, deserialize_quantity};

/// Length of the paymaster address prefix in `paymasterAndData`.
pub const PAYMASTER_ADDRESS_LEN: usize = 20;

/// ERC-4337 UserOperation as accepted by `eth_sendUserOperation`.
///
/// Every field is required on the wire. Quantities are decimal or `0x`-prefixed hex
/// strings, byte fields are `0x`-prefixed hex strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct UserOperation {
    pub sender: Address,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub nonce: U256,
    #[serde(deserialize_with = "deserialize_hex_bytes")]
    pub init_code: Bytes,
    #[serde(deserialize_with = "deserialize_hex_bytes")]
    pub call_data: Bytes,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub call_gas_limit: U256,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub verification_gas_limit: U256,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub pre_verification_gas: U256,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub max_fee_per_gas: U256,
    #[serde(deserialize_with = "deserialize_quantity")]
    pub max_priority_fee_per_gas: U256,
    #[serde(deserialize_with = "deserialize_hex_bytes")]
    pub paymaster_and_data: Bytes,
    #[serde(deserialize_with = "deserialize_hex_bytes")]
    pub signature: Bytes,
}

impl UserOperation {
    /// The paymaster sponsoring this operation.
    ///
    /// Empty `paymasterAndData` means the sender pays, which is reported as the zero
    /// address. Returns `None` when the field is too short to hold an address.
    pub fn paymaster(&self) -> Option<Address> {
        match self.paymaster_and_data.len() {
            0 => Some(Address::zero()),
            len if len < PAYMASTER_ADDRESS_LEN => None,
            _ => Some(Address::from_slice(
                &self.paymaster_and_data[..PAYMASTER_ADDRESS_LEN],
            )),
        }
    }
}

/// The single positional parameter of `eth_sendUserOperation`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SendUserOperationRequest {
    pub user_operation: UserOperation,
    pub entry_point: Address,
}

/// Result object of a successful `eth_sendUserOperation` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendUserOperationResult {
    #[serde(rename = "Success", alias = "success")]
    pub success: bool,
    #[serde(rename = "TxHash", alias = "transactionHash")]
    pub tx_hash: H256,
}

impl SendUserOperationResult {
    pub fn submitted(tx_hash: H256) -> Self {
        Self {
            success: true,
            tx_hash,
        }
    }
}
