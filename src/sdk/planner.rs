//! Off-chain transaction planning.
//!
//! The planner computes exactly the successor state and payouts the
//! [`Validator`](super::validator::Validator) re-derives. Any divergence
//! would make the submitted transaction fail outright, so both sides go
//! through the same [`proration`](super::proration) functions.

use serde::Serialize;
use tracing::debug;

use super::action::Action;
use super::datum::SubscriptionDatum;
use super::error::{ArithmeticOverflow, PlanningError, Role};
use super::ledger::{
    Address, EscrowUtxo, KeyHash, OutRef, ScriptHash, TxContext, TxInput, TxOutput,
    ValidityInterval, Value, total_value,
};
use super::plutus::PlutusData;
use super::proration::{cancellation, is_expired, payouts, split_fee, sum_installments};
use crate::config::{MarkerDisposal, ProtocolParams};

/// Asset kinds a plan moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Asset {
    Lovelace,
    Marker,
    Agent,
}

/// One (destination, asset, amount) leg of a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub destination: Address,
    pub asset: Asset,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransactionPlan {
    pub action: Action,
    pub redeemer: PlutusData,
    pub script: ScriptHash,
    pub spend: OutRef,
    pub validity: ValidityInterval,
    pub required_signers: Vec<KeyHash>,
    /// `None` for terminal actions.
    pub successor: Option<SubscriptionDatum>,
    pub outputs: Vec<TxOutput>,
    pub marker_mint: i64,
    /// Value the signer's wallet must add on top of the escrow input.
    pub wallet_contribution: Value,
}

impl TransactionPlan {
    pub fn legs(&self) -> Vec<Transfer> {
        let mut legs = Vec::new();
        for out in &self.outputs {
            for (asset, amount) in [
                (Asset::Lovelace, out.value.lovelace),
                (Asset::Marker, out.value.marker),
                (Asset::Agent, out.value.agent),
            ] {
                if amount > 0 {
                    legs.push(Transfer {
                        destination: out.address,
                        asset,
                        amount,
                    });
                }
            }
        }
        legs
    }

    /// Build the full transaction from the escrow and the signer's wallet
    /// inputs. Whatever the funding inputs hold beyond the wallet
    /// contribution goes back to `change`. Ledger fees are not modelled.
    pub fn assemble(
        &self,
        escrow: &EscrowUtxo,
        funding: Vec<TxInput>,
        change: Address,
    ) -> Result<TxContext, PlanningError> {
        let funded = total_value(funding.iter().map(|i| &i.output.value))?;
        let available = escrow.value.checked_add(&funded)?;
        let spent = total_value(self.outputs.iter().map(|o| &o.value))?;

        let agent = available
            .agent
            .checked_sub(spent.agent)
            .ok_or(PlanningError::InsufficientFunds {
                asset: "AGENT",
                needed: self.wallet_contribution.agent,
                available: funded.agent,
            })?;
        let lovelace = available.lovelace.checked_sub(spent.lovelace).ok_or(
            PlanningError::InsufficientFunds {
                asset: "lovelace",
                needed: self.wallet_contribution.lovelace,
                available: funded.lovelace,
            },
        )?;
        let marker = i128::from(available.marker) + i128::from(self.marker_mint)
            - i128::from(spent.marker);
        let marker = u64::try_from(marker).map_err(|_| PlanningError::InsufficientFunds {
            asset: "marker",
            needed: spent.marker,
            available: available.marker,
        })?;

        let mut outputs = self.outputs.clone();
        let leftover = Value {
            lovelace,
            marker,
            agent,
        };
        if !leftover.is_zero() {
            outputs.push(TxOutput {
                address: change,
                value: leftover,
                datum: None,
            });
        }

        let mut inputs = vec![escrow.to_input(self.script)];
        inputs.extend(funding);

        Ok(TxContext {
            own_ref: escrow.out_ref,
            inputs,
            outputs,
            signatories: self.required_signers.clone(),
            validity: self.validity,
            marker_mint: self.marker_mint,
        })
    }
}

pub struct Planner {
    params: ProtocolParams,
}

impl Planner {
    pub fn new(params: ProtocolParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &ProtocolParams {
        &self.params
    }

    /// Plan `action` against the escrow as it stands at `now` (POSIX ms),
    /// to be signed by `signer`.
    pub fn plan(
        &self,
        escrow: &EscrowUtxo,
        action: Action,
        signer: KeyHash,
        now: u64,
    ) -> Result<TransactionPlan, PlanningError> {
        let draft = match action {
            Action::Extend => self.extend(escrow, signer, now)?,
            Action::MerchantWithdraw => self.merchant_withdraw(escrow, signer, now)?,
            Action::Unsubscribe => self.unsubscribe(escrow, signer, now)?,
            Action::SubscriberWithdraw => self.subscriber_withdraw(escrow, signer, now)?,
        };
        let plan = TransactionPlan {
            action,
            redeemer: action.encode(),
            script: self.params.script_hash,
            spend: escrow.out_ref,
            validity: draft.validity,
            required_signers: vec![signer],
            successor: draft.successor,
            outputs: draft.outputs,
            marker_mint: draft.marker_mint,
            wallet_contribution: draft.wallet_contribution,
        };
        debug!(
            %action,
            escrow = %escrow.out_ref,
            outputs = plan.outputs.len(),
            "planned transition"
        );
        Ok(plan)
    }

    fn extend(&self, escrow: &EscrowUtxo, _signer: KeyHash, now: u64) -> Result<Draft, PlanningError> {
        let datum = &escrow.datum;
        if is_expired(datum.subscription_end, now) {
            return Err(PlanningError::SubscriptionExpired);
        }
        let successor = datum.extended(now, self.params.period_ms)?;
        let agent = escrow
            .value
            .agent
            .checked_add(datum.service_fee)
            .ok_or(ArithmeticOverflow)?;
        let continuing = self.continuing(escrow, &successor, agent);
        Ok(Draft {
            validity: self.active_window(datum, now)?,
            successor: Some(successor),
            outputs: vec![continuing],
            marker_mint: 0,
            wallet_contribution: Value {
                agent: datum.service_fee,
                ..Value::default()
            },
        })
    }

    fn merchant_withdraw(
        &self,
        escrow: &EscrowUtxo,
        signer: KeyHash,
        now: u64,
    ) -> Result<Draft, PlanningError> {
        let datum = &escrow.datum;
        if datum.installments.is_empty() {
            return Err(PlanningError::NoInstallmentsToClaim);
        }
        require_signer(signer, datum.merchant, Role::Merchant)?;

        let pending = sum_installments(&datum.installments)?;
        let remaining = escrow.value.agent.checked_sub(pending).ok_or(
            PlanningError::InsufficientEscrowBalance {
                needed: pending,
                available: escrow.value.agent,
            },
        )?;
        let successor = datum.cleared();
        let mut outputs = vec![self.continuing(escrow, &successor, remaining)];
        let split = split_fee(pending, datum.partner_percentage)?;
        let fee_outputs = self.payout_outputs(&payouts(datum, split));
        let wallet_contribution = self.payout_lovelace(fee_outputs.len())?;
        outputs.extend(fee_outputs);

        Ok(Draft {
            validity: self.open_window(now)?,
            successor: Some(successor),
            outputs,
            marker_mint: 0,
            wallet_contribution,
        })
    }

    fn unsubscribe(&self, escrow: &EscrowUtxo, signer: KeyHash, now: u64) -> Result<Draft, PlanningError> {
        let datum = &escrow.datum;
        if is_expired(datum.subscription_end, now) {
            return Err(PlanningError::SubscriptionExpired);
        }
        require_signer(signer, datum.subscriber, Role::Subscriber)?;

        let settled = cancellation(datum, now, self.params.period_ms)?;
        let reserve = escrow.value.agent.checked_sub(settled.pending).ok_or(
            PlanningError::InsufficientEscrowBalance {
                needed: settled.pending,
                available: escrow.value.agent,
            },
        )?;
        let to_subscriber = reserve
            .checked_add(settled.refund)
            .ok_or(ArithmeticOverflow)?;

        let mut outputs = vec![self.subscriber_output(escrow, to_subscriber)];
        let fee_outputs = self.payout_outputs(&payouts(datum, settled.fee));
        let wallet_contribution = self.payout_lovelace(fee_outputs.len())?;
        outputs.extend(fee_outputs);

        Ok(Draft {
            validity: self.active_window(datum, now)?,
            successor: None,
            outputs,
            marker_mint: self.terminal_mint(),
            wallet_contribution,
        })
    }

    fn subscriber_withdraw(
        &self,
        escrow: &EscrowUtxo,
        signer: KeyHash,
        now: u64,
    ) -> Result<Draft, PlanningError> {
        let datum = &escrow.datum;
        if !is_expired(datum.subscription_end, now) {
            return Err(PlanningError::SubscriptionActive);
        }
        require_signer(signer, datum.subscriber, Role::Subscriber)?;

        Ok(Draft {
            validity: self.open_window(now)?,
            successor: None,
            outputs: vec![self.subscriber_output(escrow, escrow.value.agent)],
            marker_mint: self.terminal_mint(),
            wallet_contribution: Value::default(),
        })
    }

    fn continuing(&self, escrow: &EscrowUtxo, successor: &SubscriptionDatum, agent: u64) -> TxOutput {
        TxOutput {
            address: Address::Script(self.params.script_hash),
            value: Value {
                lovelace: escrow.value.lovelace,
                marker: 1,
                agent,
            },
            datum: Some(successor.encode()),
        }
    }

    /// Terminal output carrying the escrow's lovelace back to the subscriber,
    /// plus the marker unless it is burned.
    fn subscriber_output(&self, escrow: &EscrowUtxo, agent: u64) -> TxOutput {
        let marker = match self.params.marker_disposal {
            MarkerDisposal::Burn => 0,
            MarkerDisposal::ReturnToSubscriber => 1,
        };
        TxOutput {
            address: Address::Key(escrow.datum.subscriber),
            value: Value {
                lovelace: escrow.value.lovelace,
                marker,
                agent,
            },
            datum: None,
        }
    }

    fn payout_outputs(&self, owed: &[(KeyHash, u64)]) -> Vec<TxOutput> {
        owed.iter()
            .map(|(key, agent)| TxOutput {
                address: Address::Key(*key),
                value: Value {
                    lovelace: self.params.min_payout_lovelace,
                    marker: 0,
                    agent: *agent,
                },
                datum: None,
            })
            .collect()
    }

    fn payout_lovelace(&self, count: usize) -> Result<Value, ArithmeticOverflow> {
        let count = u64::try_from(count).map_err(|_| ArithmeticOverflow)?;
        let lovelace = self
            .params
            .min_payout_lovelace
            .checked_mul(count)
            .ok_or(ArithmeticOverflow)?;
        Ok(Value {
            lovelace,
            ..Value::default()
        })
    }

    fn terminal_mint(&self) -> i64 {
        match self.params.marker_disposal {
            MarkerDisposal::Burn => -1,
            MarkerDisposal::ReturnToSubscriber => 0,
        }
    }

    /// Validity for actions that must happen before expiry: starts at `now`,
    /// never reaches past `subscription_end`.
    fn active_window(&self, datum: &SubscriptionDatum, now: u64) -> Result<ValidityInterval, ArithmeticOverflow> {
        let upper = now
            .checked_add(self.params.validity_window_ms)
            .ok_or(ArithmeticOverflow)?
            .min(datum.subscription_end);
        Ok(ValidityInterval {
            lower: now,
            upper: Some(upper),
        })
    }

    fn open_window(&self, now: u64) -> Result<ValidityInterval, ArithmeticOverflow> {
        let upper = now
            .checked_add(self.params.validity_window_ms)
            .ok_or(ArithmeticOverflow)?;
        Ok(ValidityInterval {
            lower: now,
            upper: Some(upper),
        })
    }
}

/// Action-specific part of a plan.
struct Draft {
    validity: ValidityInterval,
    successor: Option<SubscriptionDatum>,
    outputs: Vec<TxOutput>,
    marker_mint: i64,
    wallet_contribution: Value,
}

fn require_signer(signer: KeyHash, required: KeyHash, role: Role) -> Result<(), PlanningError> {
    if signer == required {
        Ok(())
    } else {
        Err(PlanningError::Unauthorized { required: role })
    }
}
