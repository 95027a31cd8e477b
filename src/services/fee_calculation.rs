//! Fee split for a settled charge.
//!
//! All outputs are integer minor units of the host currency. Fractional
//! results round half away from zero.

use crate::database::host_repository::HostAccount;
use crate::database::order_repository::Order;
use crate::payments::types::ProcessorFees;
use bigdecimal::num_bigint::Sign;
use bigdecimal::{BigDecimal, RoundingMode, ToPrimitive};
use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub processor_fee: i64,
    pub platform_fee: i64,
    pub host_fee: i64,
}

impl FeeBreakdown {
    pub fn total(&self) -> i64 {
        self.processor_fee + self.platform_fee + self.host_fee
    }
}

/// Everything the fee split depends on.
#[derive(Debug, Clone, Copy)]
pub struct FeeInputs<'a> {
    /// Gross settled amount, host currency minor units.
    pub amount_in_host_currency: i64,
    pub fx_rate: &'a BigDecimal,
    pub order: &'a Order,
    pub host: &'a HostAccount,
    pub processor_fees: &'a ProcessorFees,
}

pub struct FeeCalculator;

impl FeeCalculator {
    pub fn calculate(inputs: &FeeInputs<'_>) -> FeeBreakdown {
        FeeBreakdown {
            processor_fee: inputs.processor_fees.processing_fee,
            platform_fee: Self::platform_fee(inputs),
            host_fee: Self::host_fee(inputs),
        }
    }

    /// Shared-revenue hosts take the platform's cut from the order's tip,
    /// converted to host currency; everyone else pays the application fee the
    /// processor already withheld.
    pub fn platform_fee(inputs: &FeeInputs<'_>) -> i64 {
        if inputs.host.is_shared_revenue() {
            let tip = inputs.order.platform_tip.unwrap_or(0);
            if tip == 0 {
                return 0;
            }
            round_minor_units(&(BigDecimal::from(tip) * inputs.fx_rate))
        } else {
            inputs.processor_fees.application_fee
        }
    }

    pub fn host_fee(inputs: &FeeInputs<'_>) -> i64 {
        let percent = inputs
            .order
            .host_fee_percent
            .as_ref()
            .unwrap_or(&inputs.host.host_fee_percent);
        let fee = BigDecimal::from(inputs.amount_in_host_currency) * percent / BigDecimal::from(100);
        round_minor_units(&fee)
    }
}

/// Rounds half-up to whole minor units, saturating at the `i64` bounds.
pub fn round_minor_units(value: &BigDecimal) -> i64 {
    let rounded = value.with_scale_round(0, RoundingMode::HalfUp);
    rounded.to_i64().unwrap_or_else(|| {
        warn!(value = %rounded, "amount outside i64 range, saturating");
        if rounded.sign() == Sign::Minus {
            i64::MIN
        } else {
            i64::MAX
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::types::PaymentMethodType;
    use std::str::FromStr;
    use uuid::Uuid;

    fn dec(value: &str) -> BigDecimal {
        BigDecimal::from_str(value).unwrap()
    }

    fn order(tip: Option<i64>, host_fee_percent: Option<&str>) -> Order {
        let mut order = Order::pending(
            Uuid::new_v4(),
            Uuid::new_v4(),
            Uuid::new_v4(),
            "usd",
            1000,
            PaymentMethodType::Alipay,
        );
        order.platform_tip = tip;
        order.host_fee_percent = host_fee_percent.map(dec);
        order
    }

    fn host(shared: bool) -> HostAccount {
        HostAccount {
            collective_id: Uuid::new_v4(),
            host_collective_id: Uuid::new_v4(),
            currency: "USD".to_string(),
            connected_account_id: Some("acct_host".to_string()),
            host_fee_percent: dec("5"),
            host_fee_share_percent: shared.then(|| dec("15")),
        }
    }

    fn fees() -> ProcessorFees {
        ProcessorFees {
            processing_fee: 59,
            application_fee: 50,
            tax: 0,
            other: 0,
        }
    }

    #[test]
    fn shared_revenue_uses_platform_tip() {
        let order = order(Some(200), None);
        let host = host(true);
        let rate = dec("1.0");
        let breakdown = FeeCalculator::calculate(&FeeInputs {
            amount_in_host_currency: 1000,
            fx_rate: &rate,
            order: &order,
            host: &host,
            processor_fees: &fees(),
        });

        assert_eq!(breakdown.platform_fee, 200);
        assert_eq!(breakdown.processor_fee, 59);
        assert_eq!(breakdown.host_fee, 50);
    }

    #[test]
    fn shared_revenue_without_tip_charges_no_platform_fee() {
        let order = order(None, None);
        let host = host(true);
        let rate = dec("1.371");
        let inputs = FeeInputs {
            amount_in_host_currency: 1371,
            fx_rate: &rate,
            order: &order,
            host: &host,
            processor_fees: &fees(),
        };
        assert_eq!(FeeCalculator::platform_fee(&inputs), 0);
    }

    #[test]
    fn non_shared_revenue_ignores_tip() {
        let order = order(Some(200), None);
        let host = host(false);
        let rate = dec("1");
        let inputs = FeeInputs {
            amount_in_host_currency: 1000,
            fx_rate: &rate,
            order: &order,
            host: &host,
            processor_fees: &fees(),
        };
        assert_eq!(FeeCalculator::platform_fee(&inputs), 50);
    }

    #[test]
    fn converted_tip_rounds_half_away_from_zero() {
        let order = order(Some(5), None);
        let host = host(true);
        let rate = dec("1.5");
        let inputs = FeeInputs {
            amount_in_host_currency: 1000,
            fx_rate: &rate,
            order: &order,
            host: &host,
            processor_fees: &fees(),
        };
        // 5 * 1.5 = 7.5
        assert_eq!(FeeCalculator::platform_fee(&inputs), 8);
    }

    #[test]
    fn order_host_fee_override_wins() {
        let order = order(None, Some("10"));
        let host = host(false);
        let rate = dec("1");
        let inputs = FeeInputs {
            amount_in_host_currency: 1005,
            fx_rate: &rate,
            order: &order,
            host: &host,
            processor_fees: &fees(),
        };
        // 1005 * 10% = 100.5
        assert_eq!(FeeCalculator::host_fee(&inputs), 101);
    }

    #[test]
    fn rounding_is_symmetric_around_zero() {
        assert_eq!(round_minor_units(&dec("2.5")), 3);
        assert_eq!(round_minor_units(&dec("-2.5")), -3);
        assert_eq!(round_minor_units(&dec("2.49")), 2);
    }

    #[test]
    fn out_of_range_amounts_saturate() {
        assert_eq!(round_minor_units(&dec("1e30")), i64::MAX);
        assert_eq!(round_minor_units(&dec("-1e30")), i64::MIN);
        assert_eq!(
            round_minor_units(&(BigDecimal::from(i64::MAX) * dec("1.5"))),
            i64::MAX
        );
    }
}
