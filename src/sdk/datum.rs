//! Subscription datum and its positional on-chain layout.
//!
//! Field order is the wire contract with the deployed script. Indices never
//! leave this module; everything else works with [`SubscriptionDatum`].

use serde::{Deserialize, Serialize};

use super::error::{ArithmeticOverflow, MalformedDatum, Shape};
use super::ledger::KeyHash;
use super::plutus::PlutusData;

/// Constructor index of the version 1 datum layout.
pub const DATUM_V1: u64 = 0;

const FIELDS: [&str; 7] = [
    "subscriber",
    "merchant",
    "partner",
    "partner_percentage",
    "subscription_end",
    "service_fee",
    "installments",
];

/// A deposit recorded by `Extend`, pending merchant claim.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Installment {
    pub amount: u64,
    /// POSIX milliseconds at which the deposit was made.
    pub added_at: u64,
}

/// Persistent escrow state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionDatum {
    pub subscriber: KeyHash,
    pub merchant: KeyHash,
    /// Revenue-share recipient; encoded as empty bytes when absent.
    pub partner: Option<KeyHash>,
    /// Share (0..=100) of each claimed fee routed to `partner`.
    pub partner_percentage: u8,
    /// Subscription is active while `now < subscription_end` (POSIX ms).
    pub subscription_end: u64,
    pub service_fee: u64,
    pub installments: Vec<Installment>,
}

impl SubscriptionDatum {
    pub fn encode(&self) -> PlutusData {
        let partner = self
            .partner
            .map(|p| p.as_bytes().to_vec())
            .unwrap_or_default();
        PlutusData::constr(
            DATUM_V1,
            vec![
                PlutusData::Bytes(self.subscriber.as_bytes().to_vec()),
                PlutusData::Bytes(self.merchant.as_bytes().to_vec()),
                PlutusData::Bytes(partner),
                PlutusData::Int(i128::from(self.partner_percentage)),
                PlutusData::Int(i128::from(self.subscription_end)),
                PlutusData::Int(i128::from(self.service_fee)),
                PlutusData::List(self.installments.iter().map(Installment::encode).collect()),
            ],
        )
    }

    pub fn decode(raw: &PlutusData) -> Result<Self, MalformedDatum> {
        let fields = constr_fields(raw, "datum", DATUM_V1, "subscription datum")?;
        let mut reader = FieldReader::new(fields, &FIELDS);

        let subscriber = reader.key_hash()?;
        let merchant = reader.key_hash()?;
        let partner = reader.optional_key_hash()?;
        let partner_percentage = reader.int::<u8>()?;
        let subscription_end = reader.int::<u64>()?;
        let service_fee = reader.int::<u64>()?;
        let installments = reader
            .list()?
            .iter()
            .map(Installment::decode)
            .collect::<Result<Vec<_>, _>>()?;
        reader.finish("subscription datum")?;

        if partner_percentage > 100 {
            return Err(MalformedDatum::InvalidValue {
                field: "partner_percentage",
                reason: format!("{partner_percentage} exceeds 100"),
            });
        }
        if partner_percentage > 0 && partner.is_none() {
            return Err(MalformedDatum::InvalidValue {
                field: "partner",
                reason: format!("required when partner_percentage is {partner_percentage}"),
            });
        }

        Ok(Self {
            subscriber,
            merchant,
            partner,
            partner_percentage,
            subscription_end,
            service_fee,
            installments,
        })
    }

    /// Successor after `Extend` at `now`: one more `service_fee` installment
    /// and one more period of service.
    pub fn extended(&self, now: u64, period_ms: u64) -> Result<Self, ArithmeticOverflow> {
        let mut next = self.clone();
        next.installments.push(Installment {
            amount: self.service_fee,
            added_at: now,
        });
        next.subscription_end = self
            .subscription_end
            .checked_add(period_ms)
            .ok_or(ArithmeticOverflow)?;
        Ok(next)
    }

    /// Successor after `MerchantWithdraw`.
    pub fn cleared(&self) -> Self {
        Self {
            installments: Vec::new(),
            ..self.clone()
        }
    }
}

impl Installment {
    fn encode(&self) -> PlutusData {
        PlutusData::constr(
            0,
            vec![
                PlutusData::Int(i128::from(self.amount)),
                PlutusData::Int(i128::from(self.added_at)),
            ],
        )
    }

    fn decode(raw: &PlutusData) -> Result<Self, MalformedDatum> {
        let fields = constr_fields(raw, "installments", 0, "installment")?;
        let mut reader = FieldReader::new(fields, &["amount", "added_at"]);
        let amount = reader.int::<u64>()?;
        let added_at = reader.int::<u64>()?;
        reader.finish("installment")?;
        Ok(Self { amount, added_at })
    }
}

fn constr_fields<'a>(
    raw: &'a PlutusData,
    field: &'static str,
    expected: u64,
    context: &'static str,
) -> Result<&'a [PlutusData], MalformedDatum> {
    match raw {
        PlutusData::Constr {
            constructor,
            fields,
        } if *constructor == expected => Ok(fields.as_slice()),
        PlutusData::Constr { constructor, .. } => Err(MalformedDatum::UnsupportedConstructor {
            context,
            expected,
            found: *constructor,
        }),
        other => Err(MalformedDatum::WrongShape {
            field,
            expected: Shape::Constr,
            found: other.shape(),
        }),
    }
}

/// Sequential reader over a positional field list.
struct FieldReader<'a> {
    fields: &'a [PlutusData],
    names: &'a [&'static str],
    next: usize,
}

impl<'a> FieldReader<'a> {
    fn new(fields: &'a [PlutusData], names: &'a [&'static str]) -> Self {
        Self {
            fields,
            names,
            next: 0,
        }
    }

    fn take(&mut self) -> Result<(&'static str, &'a PlutusData), MalformedDatum> {
        let index = self.next;
        let name = self.names[index];
        let value = self
            .fields
            .get(index)
            .ok_or(MalformedDatum::MissingField { field: name, index })?;
        self.next += 1;
        Ok((name, value))
    }

    fn bytes(&mut self) -> Result<(&'static str, &'a [u8]), MalformedDatum> {
        match self.take()? {
            (name, PlutusData::Bytes(b)) => Ok((name, b.as_slice())),
            (name, other) => Err(MalformedDatum::WrongShape {
                field: name,
                expected: Shape::Bytes,
                found: other.shape(),
            }),
        }
    }

    fn key_hash(&mut self) -> Result<KeyHash, MalformedDatum> {
        let (name, bytes) = self.bytes()?;
        KeyHash::from_slice(bytes).ok_or_else(|| MalformedDatum::InvalidValue {
            field: name,
            reason: format!("key hash must be {} bytes, got {}", KeyHash::LEN, bytes.len()),
        })
    }

    fn optional_key_hash(&mut self) -> Result<Option<KeyHash>, MalformedDatum> {
        let (name, bytes) = self.bytes()?;
        if bytes.is_empty() {
            return Ok(None);
        }
        KeyHash::from_slice(bytes)
            .map(Some)
            .ok_or_else(|| MalformedDatum::InvalidValue {
                field: name,
                reason: format!("key hash must be {} bytes, got {}", KeyHash::LEN, bytes.len()),
            })
    }

    fn int<T: TryFrom<i128>>(&mut self) -> Result<T, MalformedDatum> {
        match self.take()? {
            (name, PlutusData::Int(n)) => {
                T::try_from(*n).map_err(|_| MalformedDatum::InvalidValue {
                    field: name,
                    reason: format!("{n} is out of range"),
                })
            }
            (name, other) => Err(MalformedDatum::WrongShape {
                field: name,
                expected: Shape::Int,
                found: other.shape(),
            }),
        }
    }

    fn list(&mut self) -> Result<&'a [PlutusData], MalformedDatum> {
        match self.take()? {
            (_, PlutusData::List(items)) => Ok(items.as_slice()),
            (name, other) => Err(MalformedDatum::WrongShape {
                field: name,
                expected: Shape::List,
                found: other.shape(),
            }),
        }
    }

    fn finish(self, context: &'static str) -> Result<(), MalformedDatum> {
        match self.fields.len().saturating_sub(self.next) {
            0 => Ok(()),
            extra => Err(MalformedDatum::TrailingFields { context, extra }),
        }
    }
}

/// Serde adapter storing a [`SubscriptionDatum`] in its PlutusData form.
pub mod as_plutus {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::SubscriptionDatum;
    use crate::sdk::plutus::PlutusData;

    pub fn serialize<S: Serializer>(datum: &SubscriptionDatum, serializer: S) -> Result<S::Ok, S::Error> {
        datum.encode().serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<SubscriptionDatum, D::Error> {
        let raw = PlutusData::deserialize(deserializer)?;
        SubscriptionDatum::decode(&raw).map_err(serde::de::Error::custom)
    }
}
