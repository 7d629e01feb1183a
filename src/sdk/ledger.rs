//! The slice of the UTxO ledger the escrow needs to reason about: parties,
//! addresses, values and the transaction a validator is shown.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::datum::SubscriptionDatum;
use super::error::ArithmeticOverflow;
use super::plutus::PlutusData;

macro_rules! fixed_hash {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub [u8; $len]);

        impl $name {
            pub const LEN: usize = $len;

            pub fn from_slice(bytes: &[u8]) -> Option<Self> {
                bytes.try_into().ok().map(Self)
            }

            pub fn as_bytes(&self) -> &[u8] {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let bytes = hex::decode(s).map_err(|e| format!("invalid hex: {e}"))?;
                Self::from_slice(&bytes).ok_or_else(|| {
                    format!("{} must be {} bytes, got {}", stringify!($name), $len, bytes.len())
                })
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(&self.to_string())
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                s.parse().map_err(serde::de::Error::custom)
            }
        }
    };
}

fixed_hash!(
    /// Payment key hash identifying a party (subscriber, merchant, partner).
    KeyHash,
    28
);

fixed_hash!(
    /// Hash of the escrow spending script.
    ScriptHash,
    28
);

fixed_hash!(TxId, 32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "hash", rename_all = "snake_case")]
pub enum Address {
    Key(KeyHash),
    Script(ScriptHash),
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(k) => write!(f, "key:{k}"),
            Self::Script(s) => write!(f, "script:{s}"),
        }
    }
}

/// Reference to a transaction output, rendered `tx_id#index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutRef {
    pub tx_id: TxId,
    pub index: u32,
}

impl fmt::Display for OutRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.tx_id, self.index)
    }
}

impl FromStr for OutRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (id, index) = s
            .split_once('#')
            .ok_or_else(|| format!("out ref must be `tx_id#index`, got {s}"))?;
        Ok(Self {
            tx_id: id.parse()?,
            index: index
                .parse()
                .map_err(|e| format!("invalid output index: {e}"))?,
        })
    }
}

impl Serialize for OutRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for OutRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Token bundle restricted to the three assets the escrow touches.
/// Other assets a wallet may hold are outside the protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Value {
    #[serde(default)]
    pub lovelace: u64,
    #[serde(default)]
    pub marker: u64,
    #[serde(default)]
    pub agent: u64,
}

impl Value {
    pub fn checked_add(&self, other: &Value) -> Result<Value, ArithmeticOverflow> {
        Ok(Value {
            lovelace: self
                .lovelace
                .checked_add(other.lovelace)
                .ok_or(ArithmeticOverflow)?,
            marker: self.marker.checked_add(other.marker).ok_or(ArithmeticOverflow)?,
            agent: self.agent.checked_add(other.agent).ok_or(ArithmeticOverflow)?,
        })
    }

    pub fn is_zero(&self) -> bool {
        self.lovelace == 0 && self.marker == 0 && self.agent == 0
    }
}

/// Sum a sequence of values, failing instead of wrapping.
pub fn total_value<'a>(values: impl IntoIterator<Item = &'a Value>) -> Result<Value, ArithmeticOverflow> {
    values
        .into_iter()
        .try_fold(Value::default(), |acc, v| acc.checked_add(v))
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxOutput {
    pub address: Address,
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datum: Option<PlutusData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInput {
    pub out_ref: OutRef,
    pub output: TxOutput,
}

/// Validity range in POSIX milliseconds. `upper` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityInterval {
    pub lower: u64,
    #[serde(default)]
    pub upper: Option<u64>,
}

/// Everything the escrow validator sees about the spending transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxContext {
    /// The escrow input this validation run is for.
    pub own_ref: OutRef,
    pub inputs: Vec<TxInput>,
    pub outputs: Vec<TxOutput>,
    #[serde(default)]
    pub signatories: Vec<KeyHash>,
    pub validity: ValidityInterval,
    /// Net marker units minted (negative when burned).
    #[serde(default)]
    pub marker_mint: i64,
}

impl TxContext {
    pub fn own_input(&self) -> Option<&TxInput> {
        self.inputs.iter().find(|i| i.out_ref == self.own_ref)
    }

    pub fn is_signed_by(&self, key: &KeyHash) -> bool {
        self.signatories.contains(key)
    }

    /// AGENT delivered to plain key addresses of `key`.
    pub fn agent_paid_to(&self, key: &KeyHash) -> Result<u64, ArithmeticOverflow> {
        self.outputs
            .iter()
            .filter(|o| o.address == Address::Key(*key))
            .try_fold(0u64, |acc, o| acc.checked_add(o.value.agent).ok_or(ArithmeticOverflow))
    }

    pub fn marker_paid_to(&self, key: &KeyHash) -> u64 {
        self.outputs
            .iter()
            .filter(|o| o.address == Address::Key(*key))
            .fold(0u64, |acc, o| acc.saturating_add(o.value.marker))
    }
}

/// The current escrow as read from chain, with its datum already decoded.
///
/// Plans must be computed against a freshly read `EscrowUtxo`; the
/// validator's acceptance depends on exact equality with on-chain state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscrowUtxo {
    pub out_ref: OutRef,
    pub value: Value,
    #[serde(with = "super::datum::as_plutus")]
    pub datum: SubscriptionDatum,
}

impl EscrowUtxo {
    /// The ledger input this escrow becomes when spent.
    pub fn to_input(&self, script: ScriptHash) -> TxInput {
        TxInput {
            out_ref: self.out_ref,
            output: TxOutput {
                address: Address::Script(script),
                value: self.value,
                datum: Some(self.datum.encode()),
            },
        }
    }
}
