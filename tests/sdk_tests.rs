//! Tests for the escrow SDK: datum codec, proration arithmetic, escrow phases
//! and planner error paths.

use prorated_sub_escrow::config::{ConfigError, MarkerDisposal, ProtocolParams, ServiceConfig};
use prorated_sub_escrow::sdk::error::{Role, Shape};
use prorated_sub_escrow::sdk::ledger::ScriptHash;
use prorated_sub_escrow::sdk::proration::{
    FeeSplit, cancellation, is_expired, payouts, prorated_refund, split_fee, sum_installments,
};
use prorated_sub_escrow::sdk::{
    Action, EscrowPhase, EscrowUtxo, Installment, MalformedDatum, PlanningError, Planner,
    PlutusData, SubscriptionDatum, Value,
};
use prorated_sub_escrow::*;
use serde_json::json;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;
const PERIOD: u64 = 30 * DAY_MS;
const T: u64 = 1_700_000_000_000;

fn params() -> ProtocolParams {
    ProtocolParams::new(ScriptHash([0x5c; ScriptHash::LEN]))
}

fn datum() -> SubscriptionDatum {
    SubscriptionDatum {
        subscriber: mock_key_hash(0x11),
        merchant: mock_key_hash(0x22),
        partner: Some(mock_key_hash(0x33)),
        partner_percentage: 30,
        subscription_end: T + PERIOD,
        service_fee: 1_000_000,
        installments: vec![Installment {
            amount: 1_000_000,
            added_at: T,
        }],
    }
}

fn escrow(datum: SubscriptionDatum, agent: u64) -> EscrowUtxo {
    EscrowUtxo {
        out_ref: mock_out_ref(0x01, 0),
        value: Value {
            lovelace: 4_000_000,
            marker: 1,
            agent,
        },
        datum,
    }
}

/// Replace field `index` of an encoded datum.
fn with_field(index: usize, value: PlutusData) -> PlutusData {
    let PlutusData::Constr {
        constructor,
        mut fields,
    } = datum().encode()
    else {
        unreachable!("datum always encodes to a constr");
    };
    fields[index] = value;
    PlutusData::Constr {
        constructor,
        fields,
    }
}

// ---------------------------------------------------------------------------
// Datum codec
// ---------------------------------------------------------------------------

mod datum_codec {
    use super::*;

    #[test]
    fn encodes_positional_layout() {
        let json = datum().encode().to_json();
        assert_eq!(json["constructor"], 0);
        let fields = json["fields"].as_array().unwrap();
        assert_eq!(fields.len(), 7);
        assert_eq!(fields[0]["bytes"], "11".repeat(28));
        assert_eq!(fields[1]["bytes"], "22".repeat(28));
        assert_eq!(fields[2]["bytes"], "33".repeat(28));
        assert_eq!(fields[3]["int"], 30);
        assert_eq!(fields[4]["int"], T + PERIOD);
        assert_eq!(fields[5]["int"], 1_000_000);
        let installments = fields[6]["list"].as_array().unwrap();
        assert_eq!(installments.len(), 1);
        assert_eq!(installments[0]["constructor"], 0);
        assert_eq!(installments[0]["fields"][0]["int"], 1_000_000);
        assert_eq!(installments[0]["fields"][1]["int"], T);
    }

    #[test]
    fn round_trips_through_json() {
        let d = datum();
        let text = serde_json::to_string(&d.encode()).unwrap();
        let raw: PlutusData = serde_json::from_str(&text).unwrap();
        assert_eq!(SubscriptionDatum::decode(&raw).unwrap(), d);
    }

    #[test]
    fn empty_partner_bytes_decode_to_none() {
        let mut d = datum();
        d.partner = None;
        d.partner_percentage = 0;
        let raw = d.encode();
        assert_eq!(raw.to_json()["fields"][2]["bytes"], "");
        assert_eq!(SubscriptionDatum::decode(&raw).unwrap().partner, None);
    }

    #[test]
    fn decodes_hand_written_datum() {
        let raw = PlutusData::from_json(&json!({
            "constructor": 0,
            "fields": [
                { "bytes": "aa".repeat(28) },
                { "bytes": "bb".repeat(28) },
                { "bytes": "" },
                { "int": 0 },
                { "int": 1_735_689_600_000u64 },
                { "int": 5_000_000 },
                { "list": [] }
            ]
        }))
        .unwrap();
        let d = SubscriptionDatum::decode(&raw).unwrap();
        assert_eq!(d.subscriber, mock_key_hash(0xaa));
        assert_eq!(d.merchant, mock_key_hash(0xbb));
        assert_eq!(d.subscription_end, 1_735_689_600_000);
        assert_eq!(d.service_fee, 5_000_000);
        assert!(d.installments.is_empty());
    }

    #[test]
    fn unsupported_constructor_fails() {
        let PlutusData::Constr { fields, .. } = datum().encode() else {
            unreachable!();
        };
        let err = SubscriptionDatum::decode(&PlutusData::constr(1, fields)).unwrap_err();
        assert_eq!(
            err,
            MalformedDatum::UnsupportedConstructor {
                context: "subscription datum",
                expected: 0,
                found: 1,
            }
        );
    }

    #[test]
    fn missing_field_fails() {
        let PlutusData::Constr { mut fields, .. } = datum().encode() else {
            unreachable!();
        };
        fields.truncate(5);
        let err = SubscriptionDatum::decode(&PlutusData::constr(0, fields)).unwrap_err();
        assert_eq!(
            err,
            MalformedDatum::MissingField {
                field: "service_fee",
                index: 5,
            }
        );
    }

    #[test]
    fn trailing_field_fails() {
        let PlutusData::Constr { mut fields, .. } = datum().encode() else {
            unreachable!();
        };
        fields.push(PlutusData::Int(0));
        let err = SubscriptionDatum::decode(&PlutusData::constr(0, fields)).unwrap_err();
        assert!(matches!(err, MalformedDatum::TrailingFields { extra: 1, .. }));
    }

    #[test]
    fn wrong_shape_fails() {
        let err = SubscriptionDatum::decode(&with_field(4, PlutusData::Bytes(vec![1]))).unwrap_err();
        assert_eq!(
            err,
            MalformedDatum::WrongShape {
                field: "subscription_end",
                expected: Shape::Int,
                found: Shape::Bytes,
            }
        );
    }

    #[test]
    fn non_constr_root_fails() {
        let err = SubscriptionDatum::decode(&PlutusData::List(vec![])).unwrap_err();
        assert!(matches!(
            err,
            MalformedDatum::WrongShape {
                expected: Shape::Constr,
                found: Shape::List,
                ..
            }
        ));
    }

    #[test]
    fn short_key_hash_fails() {
        let err = SubscriptionDatum::decode(&with_field(0, PlutusData::Bytes(vec![0x11; 27]))).unwrap_err();
        assert!(err.to_string().contains("28 bytes"));
    }

    #[test]
    fn negative_amount_fails() {
        let err = SubscriptionDatum::decode(&with_field(5, PlutusData::Int(-1))).unwrap_err();
        assert!(matches!(
            err,
            MalformedDatum::InvalidValue {
                field: "service_fee",
                ..
            }
        ));
    }

    #[test]
    fn percentage_over_100_fails() {
        let err = SubscriptionDatum::decode(&with_field(3, PlutusData::Int(101))).unwrap_err();
        assert!(matches!(
            err,
            MalformedDatum::InvalidValue {
                field: "partner_percentage",
                ..
            }
        ));
    }

    #[test]
    fn share_without_partner_fails() {
        let err = SubscriptionDatum::decode(&with_field(2, PlutusData::Bytes(vec![]))).unwrap_err();
        assert!(matches!(err, MalformedDatum::InvalidValue { field: "partner", .. }));
    }

    #[test]
    fn malformed_installment_fails() {
        let bad = PlutusData::List(vec![PlutusData::constr(0, vec![PlutusData::Int(1)])]);
        let err = SubscriptionDatum::decode(&with_field(6, bad)).unwrap_err();
        assert_eq!(
            err,
            MalformedDatum::MissingField {
                field: "added_at",
                index: 1,
            }
        );
    }

    #[test]
    fn json_without_known_tag_fails() {
        let err = PlutusData::from_json(&json!({ "number": 3 })).unwrap_err();
        assert!(matches!(err, MalformedDatum::Json(_)));
    }

    #[test]
    fn bad_hex_fails() {
        assert!(PlutusData::from_json(&json!({ "bytes": "zz" })).is_err());
    }

    #[test]
    fn big_ints_use_string_form() {
        let big = PlutusData::Int(i128::from(u64::MAX) + 1);
        let json = big.to_json();
        assert!(json["int"].is_string());
        assert_eq!(PlutusData::from_json(&json).unwrap(), big);
    }

    #[test]
    fn map_nodes_parse() {
        let raw = PlutusData::from_json(&json!({
            "map": [{ "k": { "int": 1 }, "v": { "bytes": "ff" } }]
        }))
        .unwrap();
        assert_eq!(
            raw,
            PlutusData::Map(vec![(PlutusData::Int(1), PlutusData::Bytes(vec![0xff]))])
        );
    }
}

// ---------------------------------------------------------------------------
// Redeemer codec
// ---------------------------------------------------------------------------

mod redeemer_codec {
    use super::*;

    #[test]
    fn constructors_are_fixed() {
        assert_eq!(Action::Extend.encode().to_json(), json!({ "constructor": 0, "fields": [] }));
        assert_eq!(
            Action::MerchantWithdraw.encode().to_json(),
            json!({ "constructor": 1, "fields": [] })
        );
        assert_eq!(Action::Unsubscribe.encode().to_json()["constructor"], 2);
        assert_eq!(Action::SubscriberWithdraw.encode().to_json()["constructor"], 3);
    }

    #[test]
    fn decodes_every_action() {
        for action in Action::ALL {
            assert_eq!(Action::decode(&action.encode()).unwrap(), action);
        }
    }

    #[test]
    fn unknown_constructor_fails() {
        let err = Action::decode(&PlutusData::constr(4, vec![])).unwrap_err();
        assert!(matches!(err, MalformedDatum::UnsupportedConstructor { found: 4, .. }));
    }

    #[test]
    fn fields_are_rejected() {
        let err = Action::decode(&PlutusData::constr(0, vec![PlutusData::Int(1)])).unwrap_err();
        assert!(matches!(err, MalformedDatum::TrailingFields { extra: 1, .. }));
    }

    #[test]
    fn parses_names() {
        assert_eq!("merchant_withdraw".parse::<Action>().unwrap(), Action::MerchantWithdraw);
        assert!("withdraw".parse::<Action>().is_err());
    }

    #[test]
    fn terminal_actions() {
        assert!(!Action::Extend.is_terminal());
        assert!(!Action::MerchantWithdraw.is_terminal());
        assert!(Action::Unsubscribe.is_terminal());
        assert!(Action::SubscriberWithdraw.is_terminal());
    }
}

// ---------------------------------------------------------------------------
// Proration engine
// ---------------------------------------------------------------------------

mod proration {
    use super::*;

    #[test]
    fn split_without_partner_share() {
        assert_eq!(
            split_fee(1_000_000, 0).unwrap(),
            FeeSplit {
                merchant: 1_000_000,
                partner: 0,
            }
        );
    }

    #[test]
    fn split_with_partner_share() {
        assert_eq!(
            split_fee(1_000_000, 30).unwrap(),
            FeeSplit {
                merchant: 700_000,
                partner: 300_000,
            }
        );
    }

    #[test]
    fn split_rounds_partner_down() {
        assert_eq!(
            split_fee(7, 33).unwrap(),
            FeeSplit {
                merchant: 5,
                partner: 2,
            }
        );
    }

    #[test]
    fn split_full_share() {
        assert_eq!(split_fee(u64::MAX, 100).unwrap().partner, u64::MAX);
    }

    #[test]
    fn refund_halfway_through() {
        let refund = prorated_refund(T + 30 * DAY_MS, T + 15 * DAY_MS, 10_000_000, 30 * DAY_MS).unwrap();
        assert_eq!(refund, 5_000_000);
    }

    #[test]
    fn refund_is_zero_at_and_after_expiry() {
        assert_eq!(prorated_refund(T, T, 10_000_000, PERIOD).unwrap(), 0);
        assert_eq!(prorated_refund(T, T + 1, 10_000_000, PERIOD).unwrap(), 0);
    }

    #[test]
    fn refund_is_zero_without_period() {
        assert_eq!(prorated_refund(T + PERIOD, T, 10_000_000, 0).unwrap(), 0);
    }

    #[test]
    fn refund_is_capped_at_deposit() {
        assert_eq!(prorated_refund(T + 10 * PERIOD, T, 1_000, PERIOD).unwrap(), 1_000);
    }

    #[test]
    fn refund_handles_large_products() {
        assert_eq!(prorated_refund(u64::MAX, 0, u64::MAX, u64::MAX).unwrap(), u64::MAX);
    }

    #[test]
    fn expiry_boundary() {
        assert!(!is_expired(T, T - 1));
        assert!(is_expired(T, T));
        assert!(is_expired(T, T + 1));
    }

    #[test]
    fn sum_overflow_is_reported() {
        let installments = [
            Installment {
                amount: u64::MAX,
                added_at: 0,
            },
            Installment {
                amount: 1,
                added_at: 0,
            },
        ];
        assert!(sum_installments(&installments).is_err());
    }

    #[test]
    fn payouts_fall_to_merchant_without_partner() {
        let mut d = datum();
        d.partner = None;
        d.partner_percentage = 0;
        let owed = payouts(&d, split_fee(1_000, 0).unwrap());
        assert_eq!(owed, vec![(d.merchant, 1_000)]);
    }

    #[test]
    fn payouts_merge_when_partner_is_merchant() {
        let mut d = datum();
        d.partner = Some(d.merchant);
        let owed = payouts(&d, split_fee(1_000, 30).unwrap());
        assert_eq!(owed, vec![(d.merchant, 1_000)]);
    }

    #[test]
    fn payouts_skip_zero_shares() {
        let mut d = datum();
        d.partner_percentage = 100;
        let owed = payouts(&d, split_fee(1_000, 100).unwrap());
        assert_eq!(owed, vec![(mock_key_hash(0x33), 1_000)]);
    }

    #[test]
    fn cancellation_halfway_through_last_period() {
        let d = datum();
        let settled = cancellation(&d, d.subscription_end - PERIOD / 2, PERIOD).unwrap();
        assert_eq!(settled.pending, 1_000_000);
        assert_eq!(settled.refund, 500_000);
        assert_eq!(
            settled.fee,
            FeeSplit {
                merchant: 350_000,
                partner: 150_000,
            }
        );
    }

    #[test]
    fn cancellation_spreads_over_pending_periods() {
        let mut d = datum();
        d.installments.push(Installment {
            amount: 1_000_000,
            added_at: T + DAY_MS,
        });
        // Two periods paid, one of them served.
        let settled = cancellation(&d, d.subscription_end - PERIOD, PERIOD).unwrap();
        assert_eq!(settled.pending, 2_000_000);
        assert_eq!(settled.refund, 1_000_000);
    }

    #[test]
    fn cancellation_without_pending_refunds_nothing() {
        let d = datum().cleared();
        let settled = cancellation(&d, T, PERIOD).unwrap();
        assert_eq!(settled.pending, 0);
        assert_eq!(settled.refund, 0);
        assert_eq!(settled.fee, FeeSplit::default());
    }
}

// ---------------------------------------------------------------------------
// Escrow phase
// ---------------------------------------------------------------------------

mod escrow_phase {
    use super::*;

    #[test]
    fn four_phases() {
        let pending = datum();
        let empty = datum().cleared();
        let end = pending.subscription_end;
        assert_eq!(EscrowPhase::of(&empty, T), EscrowPhase::AwaitingExtension);
        assert_eq!(EscrowPhase::of(&pending, T), EscrowPhase::Claimable);
        assert_eq!(EscrowPhase::of(&empty, end), EscrowPhase::Expired);
        assert_eq!(EscrowPhase::of(&pending, end), EscrowPhase::ExpiredClaimable);
    }

    #[test]
    fn available_actions_match_planner() {
        let planner = Planner::new(params());
        let d = datum();
        for now in [T, d.subscription_end + 1] {
            for installments in [d.installments.clone(), vec![]] {
                let state = SubscriptionDatum {
                    installments,
                    ..d.clone()
                };
                let utxo = escrow(state.clone(), 5_000_000);
                let allowed = EscrowPhase::of(&state, now).available_actions();
                for action in Action::ALL {
                    let signer = match action {
                        Action::MerchantWithdraw => state.merchant,
                        _ => state.subscriber,
                    };
                    let planned = planner.plan(&utxo, action, signer, now).is_ok();
                    assert_eq!(planned, allowed.contains(&action), "{action} at {now}");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Planner errors
// ---------------------------------------------------------------------------

mod planner_errors {
    use super::*;

    #[test]
    fn merchant_withdraw_without_installments() {
        let utxo = escrow(datum().cleared(), 1_000_000);
        let err = Planner::new(params())
            .plan(&utxo, Action::MerchantWithdraw, utxo.datum.merchant, T)
            .unwrap_err();
        assert_eq!(err, PlanningError::NoInstallmentsToClaim);
    }

    #[test]
    fn subscriber_withdraw_before_expiry() {
        let utxo = escrow(datum(), 1_000_000);
        let err = Planner::new(params())
            .plan(&utxo, Action::SubscriberWithdraw, utxo.datum.subscriber, T)
            .unwrap_err();
        assert_eq!(err, PlanningError::SubscriptionActive);
    }

    #[test]
    fn extend_after_expiry() {
        let utxo = escrow(datum(), 1_000_000);
        let end = utxo.datum.subscription_end;
        let err = Planner::new(params())
            .plan(&utxo, Action::Extend, utxo.datum.subscriber, end)
            .unwrap_err();
        assert_eq!(err, PlanningError::SubscriptionExpired);
    }

    #[test]
    fn unsubscribe_after_expiry() {
        let utxo = escrow(datum(), 1_000_000);
        let end = utxo.datum.subscription_end;
        let err = Planner::new(params())
            .plan(&utxo, Action::Unsubscribe, utxo.datum.subscriber, end + 1)
            .unwrap_err();
        assert_eq!(err, PlanningError::SubscriptionExpired);
    }

    #[test]
    fn merchant_withdraw_by_subscriber() {
        let utxo = escrow(datum(), 1_000_000);
        let err = Planner::new(params())
            .plan(&utxo, Action::MerchantWithdraw, utxo.datum.subscriber, T)
            .unwrap_err();
        assert_eq!(
            err,
            PlanningError::Unauthorized {
                required: Role::Merchant
            }
        );
        assert!(err.to_string().contains("merchant"));
    }

    #[test]
    fn unsubscribe_by_merchant() {
        let utxo = escrow(datum(), 1_000_000);
        let err = Planner::new(params())
            .plan(&utxo, Action::Unsubscribe, utxo.datum.merchant, T)
            .unwrap_err();
        assert_eq!(
            err,
            PlanningError::Unauthorized {
                required: Role::Subscriber
            }
        );
    }

    #[test]
    fn escrow_holding_less_than_pending() {
        let utxo = escrow(datum(), 999_999);
        let err = Planner::new(params())
            .plan(&utxo, Action::MerchantWithdraw, utxo.datum.merchant, T)
            .unwrap_err();
        assert_eq!(
            err,
            PlanningError::InsufficientEscrowBalance {
                needed: 1_000_000,
                available: 999_999,
            }
        );
    }

    #[test]
    fn extend_past_time_range_overflows() {
        let mut d = datum();
        d.subscription_end = u64::MAX;
        let utxo = escrow(d, 1_000_000);
        let err = Planner::new(params())
            .plan(&utxo, Action::Extend, utxo.datum.subscriber, T)
            .unwrap_err();
        assert!(matches!(err, PlanningError::ArithmeticOverflow(_)));
    }

    #[test]
    fn assemble_without_enough_agent() {
        let utxo = escrow(datum(), 1_000_000);
        let subscriber = utxo.datum.subscriber;
        let plan = Planner::new(params())
            .plan(&utxo, Action::Extend, subscriber, T)
            .unwrap();
        let funding = vec![wallet_input(subscriber, mock_out_ref(0xf0, 0), 5_000_000, 10)];
        let err = plan
            .assemble(&utxo, funding, prorated_sub_escrow::sdk::Address::Key(subscriber))
            .unwrap_err();
        assert!(matches!(
            err,
            PlanningError::InsufficientFunds {
                asset: "AGENT",
                needed: 1_000_000,
                available: 10,
            }
        ));
    }

    #[test]
    fn error_kinds_are_snake_case() {
        assert_eq!(PlanningError::NoInstallmentsToClaim.kind(), "no_installments_to_claim");
        assert_eq!(PlanningError::SubscriptionActive.kind(), "subscription_active");
    }
}

// ---------------------------------------------------------------------------
// Plan shape
// ---------------------------------------------------------------------------

mod plan_shape {
    use super::*;
    use prorated_sub_escrow::sdk::Address;
    use prorated_sub_escrow::sdk::planner::Asset;

    #[test]
    fn extend_plan() {
        let p = params();
        let utxo = escrow(datum(), 1_000_000);
        let plan = Planner::new(p.clone())
            .plan(&utxo, Action::Extend, utxo.datum.subscriber, T)
            .unwrap();
        assert_eq!(plan.redeemer, Action::Extend.encode());
        assert_eq!(plan.validity.lower, T);
        assert_eq!(plan.validity.upper, Some(T + p.validity_window_ms));
        assert_eq!(plan.marker_mint, 0);
        assert_eq!(plan.wallet_contribution.agent, 1_000_000);
        let successor = plan.successor.as_ref().unwrap();
        assert_eq!(successor.subscription_end, utxo.datum.subscription_end + PERIOD);
        assert_eq!(successor.installments.len(), 2);
        assert_eq!(
            successor.installments[1],
            Installment {
                amount: 1_000_000,
                added_at: T,
            }
        );
        assert_eq!(plan.outputs.len(), 1);
        assert_eq!(plan.outputs[0].value.agent, 2_000_000);
        assert_eq!(plan.outputs[0].value.marker, 1);
    }

    #[test]
    fn window_never_reaches_past_expiry() {
        let utxo = escrow(datum(), 1_000_000);
        let end = utxo.datum.subscription_end;
        let plan = Planner::new(params())
            .plan(&utxo, Action::Extend, utxo.datum.subscriber, end - 1_000)
            .unwrap();
        assert_eq!(plan.validity.upper, Some(end));
    }

    #[test]
    fn merchant_withdraw_legs() {
        let p = params();
        let utxo = escrow(datum(), 3_000_000);
        let merchant = utxo.datum.merchant;
        let plan = Planner::new(p.clone())
            .plan(&utxo, Action::MerchantWithdraw, merchant, T)
            .unwrap();
        let legs = plan.legs();
        let agent_to = |addr: Address| {
            legs.iter()
                .filter(|l| l.destination == addr && l.asset == Asset::Agent)
                .map(|l| l.amount)
                .sum::<u64>()
        };
        assert_eq!(agent_to(Address::Key(merchant)), 700_000);
        assert_eq!(agent_to(Address::Key(mock_key_hash(0x33))), 300_000);
        assert_eq!(agent_to(Address::Script(p.script_hash)), 2_000_000);
        assert_eq!(plan.wallet_contribution.lovelace, 2 * p.min_payout_lovelace);
        assert!(plan.successor.unwrap().installments.is_empty());
    }

    #[test]
    fn unsubscribe_burns_marker_by_default() {
        let utxo = escrow(datum(), 3_000_000);
        let plan = Planner::new(params())
            .plan(&utxo, Action::Unsubscribe, utxo.datum.subscriber, T)
            .unwrap();
        assert_eq!(plan.marker_mint, -1);
        assert!(plan.successor.is_none());
        assert!(plan.outputs.iter().all(|o| o.value.marker == 0));
    }

    #[test]
    fn subscriber_withdraw_can_return_marker() {
        let p = ProtocolParams {
            marker_disposal: MarkerDisposal::ReturnToSubscriber,
            ..params()
        };
        let utxo = escrow(datum(), 3_000_000);
        let end = utxo.datum.subscription_end;
        let plan = Planner::new(p)
            .plan(&utxo, Action::SubscriberWithdraw, utxo.datum.subscriber, end)
            .unwrap();
        assert_eq!(plan.marker_mint, 0);
        assert_eq!(plan.outputs.len(), 1);
        assert_eq!(plan.outputs[0].address, Address::Key(utxo.datum.subscriber));
        assert_eq!(plan.outputs[0].value.marker, 1);
        assert_eq!(plan.outputs[0].value.agent, 3_000_000);
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

mod service_config {
    use super::*;

    const SCRIPT: &str = "5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c5c";

    #[test]
    fn defaults_fill_in() {
        let config = ServiceConfig::from_toml(&format!("[params]\nscript_hash = \"{SCRIPT}\"\n")).unwrap();
        assert_eq!(config.listen, "127.0.0.1:3000");
        assert_eq!(config.params, params());
        assert_eq!(config.params.period_ms, PERIOD);
    }

    #[test]
    fn overrides_apply() {
        let toml = format!(
            "listen = \"0.0.0.0:8080\"\n[params]\nscript_hash = \"{SCRIPT}\"\nperiod_ms = 1000\nmarker_disposal = \"return_to_subscriber\"\n"
        );
        let config = ServiceConfig::from_toml(&toml).unwrap();
        assert_eq!(config.listen, "0.0.0.0:8080");
        assert_eq!(config.params.period_ms, 1000);
        assert_eq!(config.params.marker_disposal, MarkerDisposal::ReturnToSubscriber);
    }

    #[test]
    fn zero_period_is_invalid() {
        let toml = format!("[params]\nscript_hash = \"{SCRIPT}\"\nperiod_ms = 0\n");
        assert!(matches!(
            ServiceConfig::from_toml(&toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn short_script_hash_is_a_parse_error() {
        let toml = "[params]\nscript_hash = \"5c5c\"\n";
        assert!(matches!(ServiceConfig::from_toml(toml), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn identical_assets_are_invalid() {
        let toml = format!(
            "[params]\nscript_hash = \"{SCRIPT}\"\n[params.agent]\npolicy_id = \"efd550741e3110fe49eab48f76b92e80b0676b4435c8e282810552eb\"\nasset_name = \"4147454e545f5355425f4e4654\"\n"
        );
        assert!(matches!(
            ServiceConfig::from_toml(&toml),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn bundled_config_loads() {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("escrow.toml");
        let config = ServiceConfig::from_file(&path).unwrap();
        assert_eq!(config.params, params());
    }
}

// ---------------------------------------------------------------------------
// Properties
// ---------------------------------------------------------------------------

mod properties {
    use super::*;
    use proptest::prelude::*;

    fn arb_datum() -> impl Strategy<Value = SubscriptionDatum> {
        (
            any::<u8>(),
            any::<u8>(),
            proptest::option::of(any::<u8>()),
            0u8..=100,
            any::<u64>(),
            any::<u64>(),
            proptest::collection::vec((any::<u64>(), any::<u64>()), 0..5),
        )
            .prop_map(|(s, m, partner, pct, end, fee, installments)| SubscriptionDatum {
                subscriber: mock_key_hash(s),
                merchant: mock_key_hash(m),
                partner: partner.map(mock_key_hash),
                partner_percentage: if partner.is_some() { pct } else { 0 },
                subscription_end: end,
                service_fee: fee,
                installments: installments
                    .into_iter()
                    .map(|(amount, added_at)| Installment { amount, added_at })
                    .collect(),
            })
    }

    proptest! {
        #[test]
        fn split_fee_sums_to_fee(fee in any::<u64>(), pct in 0u8..=100) {
            let split = split_fee(fee, pct).unwrap();
            prop_assert_eq!(split.merchant + split.partner, fee);
        }

        #[test]
        fn is_expired_is_monotonic(end in any::<u64>(), a in any::<u64>(), b in any::<u64>()) {
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            if is_expired(end, early) {
                prop_assert!(is_expired(end, late));
            }
        }

        #[test]
        fn refund_is_non_increasing(
            end in any::<u64>(),
            a in any::<u64>(),
            b in any::<u64>(),
            deposit in any::<u64>(),
            period in 1u64..=u64::MAX,
        ) {
            let (early, late) = if a <= b { (a, b) } else { (b, a) };
            let first = prorated_refund(end, early, deposit, period).unwrap();
            let second = prorated_refund(end, late, deposit, period).unwrap();
            prop_assert!(second <= first);
            prop_assert!(first <= deposit);
        }

        #[test]
        fn refund_is_zero_once_expired(
            end in any::<u64>(),
            after in any::<u64>(),
            deposit in any::<u64>(),
            period in any::<u64>(),
        ) {
            let now = end.saturating_add(after);
            prop_assert_eq!(prorated_refund(end, now, deposit, period).unwrap(), 0);
        }

        #[test]
        fn datum_round_trips(d in arb_datum()) {
            let json = d.encode().to_json();
            let raw = PlutusData::from_json(&json).unwrap();
            prop_assert_eq!(SubscriptionDatum::decode(&raw).unwrap(), d);
        }

        #[test]
        fn planning_is_deterministic(
            d in arb_datum(),
            agent in any::<u64>(),
            now in any::<u64>(),
            idx in 0usize..4,
        ) {
            let planner = Planner::new(params());
            let utxo = escrow(d, agent);
            let action = Action::ALL[idx];
            let first = planner.plan(&utxo, action, utxo.datum.subscriber, now);
            let second = planner.plan(&utxo, action, utxo.datum.subscriber, now);
            prop_assert_eq!(first, second);
        }
    }
}
