use serde::{Deserialize, Serialize};

use super::datum::SubscriptionDatum;
use super::error::{MalformedDatum, Shape};
use super::plutus::PlutusData;
use super::proration::is_expired;

/// Redeemer: the action a spend of the escrow performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Deposit one more `service_fee` and extend service by one period.
    Extend,
    /// Merchant claims all pending installments.
    MerchantWithdraw,
    /// Subscriber cancels before expiry and takes the prorated refund.
    Unsubscribe,
    /// Subscriber drains the escrow after expiry.
    SubscriberWithdraw,
}

impl Action {
    pub const ALL: [Action; 4] = [
        Action::Extend,
        Action::MerchantWithdraw,
        Action::Unsubscribe,
        Action::SubscriberWithdraw,
    ];

    pub fn constructor(&self) -> u64 {
        match self {
            Self::Extend => 0,
            Self::MerchantWithdraw => 1,
            Self::Unsubscribe => 2,
            Self::SubscriberWithdraw => 3,
        }
    }

    /// Whether the escrow instance ends with this action.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Unsubscribe | Self::SubscriberWithdraw)
    }

    pub fn encode(&self) -> PlutusData {
        PlutusData::constr(self.constructor(), vec![])
    }

    pub fn decode(raw: &PlutusData) -> Result<Self, MalformedDatum> {
        let PlutusData::Constr {
            constructor,
            fields,
        } = raw
        else {
            return Err(MalformedDatum::WrongShape {
                field: "redeemer",
                expected: Shape::Constr,
                found: raw.shape(),
            });
        };
        let action = Self::ALL
            .into_iter()
            .find(|a| a.constructor() == *constructor)
            .ok_or(MalformedDatum::UnsupportedConstructor {
                context: "redeemer",
                expected: 3,
                found: *constructor,
            })?;
        if !fields.is_empty() {
            return Err(MalformedDatum::TrailingFields {
                context: "redeemer",
                extra: fields.len(),
            });
        }
        Ok(action)
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Extend => "extend",
            Self::MerchantWithdraw => "merchant_withdraw",
            Self::Unsubscribe => "unsubscribe",
            Self::SubscriberWithdraw => "subscriber_withdraw",
        };
        f.write_str(name)
    }
}

impl std::str::FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.to_string() == s)
            .ok_or_else(|| format!("unknown action `{s}`"))
    }
}

/// Escrow state, fully determined by `(installments.is_empty(), is_expired)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EscrowPhase {
    /// Active, nothing pending for the merchant.
    AwaitingExtension,
    /// Active, installments pending.
    Claimable,
    /// Expired, nothing pending.
    Expired,
    /// Expired with installments the merchant has not claimed yet.
    ExpiredClaimable,
}

impl EscrowPhase {
    pub fn of(datum: &SubscriptionDatum, now: u64) -> Self {
        let pending = !datum.installments.is_empty();
        match (is_expired(datum.subscription_end, now), pending) {
            (false, false) => Self::AwaitingExtension,
            (false, true) => Self::Claimable,
            (true, false) => Self::Expired,
            (true, true) => Self::ExpiredClaimable,
        }
    }

    /// Actions whose time and installment preconditions hold in this phase.
    /// Signer checks are separate.
    pub fn available_actions(&self) -> &'static [Action] {
        match self {
            Self::AwaitingExtension => &[Action::Extend, Action::Unsubscribe],
            Self::Claimable => &[
                Action::Extend,
                Action::MerchantWithdraw,
                Action::Unsubscribe,
            ],
            Self::Expired => &[Action::SubscriberWithdraw],
            Self::ExpiredClaimable => &[Action::MerchantWithdraw, Action::SubscriberWithdraw],
        }
    }
}
