use crate::payments::types::BalanceTransaction;
use crate::services::fee_calculation::round_minor_units;
use bigdecimal::{BigDecimal, RoundingMode, Zero};
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Decimal places kept on stored fx rates.
pub const FX_RATE_SCALE: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FxRate {
    /// Host-currency units per order-currency unit.
    pub rate: BigDecimal,
    /// The rate could not be derived and was recorded as 0.
    pub flagged: bool,
}

/// Order amount expressed in the host's settlement currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostAmount {
    pub host_currency: String,
    pub amount_in_host_currency: i64,
    pub fx: FxRate,
    /// Rate the provider reported; audit only.
    pub provider_exchange_rate: Option<BigDecimal>,
}

pub struct CurrencyConverter;

impl CurrencyConverter {
    /// fxRate = amountInHostCurrency / orderTotalAmount.
    pub fn fx_rate(amount_in_host_currency: i64, order_total_amount: i64) -> FxRate {
        if order_total_amount == 0 {
            return FxRate {
                rate: BigDecimal::zero(),
                flagged: true,
            };
        }
        let rate = BigDecimal::from(amount_in_host_currency) / BigDecimal::from(order_total_amount);
        FxRate {
            rate: rate.with_scale_round(FX_RATE_SCALE, RoundingMode::HalfUp),
            flagged: false,
        }
    }

    /// Converts order-currency minor units to host-currency minor units.
    pub fn convert(amount: i64, rate: &BigDecimal) -> i64 {
        round_minor_units(&(BigDecimal::from(amount) * rate))
    }

    /// Derives host-currency figures for an order from its settlement record.
    pub fn settle(order_total_amount: i64, balance: &BalanceTransaction) -> HostAmount {
        let fx = Self::fx_rate(balance.amount, order_total_amount);
        if fx.flagged {
            warn!(
                balance_transaction_id = %balance.id,
                amount_in_host_currency = balance.amount,
                "order total is zero, fx rate recorded as 0 and flagged"
            );
        }

        HostAmount {
            host_currency: balance.currency.to_uppercase(),
            amount_in_host_currency: balance.amount,
            fx,
            provider_exchange_rate: balance.exchange_rate.clone(),
        }
    }
}
