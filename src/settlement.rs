// Settlement Computation - turns recorded weight into money
//
// Pricing is per arroba (@, 15 kg). Two bases:
//
// - Live weight: gross = units * yield_rate * price_per_unit. The yield rate
//   discounts live weight down to expected carcass weight and must sit in
//   [0.48, 0.55] (validated before any state mutation).
// - Dead weight: the slaughterhouse reports carcass weight directly, so
//   gross = units * price_per_unit. The yield rate is recorded for the books
//   but not multiplied in.
//
// final = gross - transport_fee - funrural_tax, everything rounded to
// two decimals.

use serde::Serialize;

use crate::error::{AppError, Result};

/// Kilograms per arroba, the cattle-trade pricing unit
pub const KG_PER_ARROBA: f64 = 15.0;

pub const YIELD_RATE_MIN: f64 = 0.48;
pub const YIELD_RATE_MAX: f64 = 0.55;
pub const DEFAULT_YIELD_RATE: f64 = 0.52;

/// Fixed reservation deposit locking a deal after acceptance
pub const RESERVATION_DEPOSIT: f64 = 100.0;

/// Round a currency amount to two decimal places
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Yield rate must be validated before any record is touched
pub fn validate_yield_rate(rate: f64) -> Result<()> {
    if !(YIELD_RATE_MIN..=YIELD_RATE_MAX).contains(&rate) {
        return Err(AppError::ValidationFailed(format!(
            "yield_rate must be between {} and {} (got {})",
            YIELD_RATE_MIN, YIELD_RATE_MAX, rate
        )));
    }
    Ok(())
}

/// Convert total kg to arroba units
pub fn arroba_units(total_weight_kg: f64) -> f64 {
    total_weight_kg / KG_PER_ARROBA
}

/// Price per arroba when the proposal did not fix one: spread the lump-sum
/// offer over the listing's declared lot (quantity * estimated weight)
pub fn derived_price_per_unit(price_offer: f64, quantity: i64, estimated_weight: f64) -> f64 {
    price_offer / (quantity as f64 * estimated_weight / KG_PER_ARROBA)
}

/// Computed amounts for one settlement
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SettlementAmounts {
    pub total_weight: f64,
    /// Weight in arrobas
    pub unit_count: f64,
    pub yield_rate: f64,
    pub price_per_unit: f64,
    pub gross_amount: f64,
    pub final_amount: f64,
}

/// Live-weight settlement over the summed farm weighings
pub fn live_settlement(
    total_weight: f64,
    yield_rate: f64,
    price_per_unit: f64,
    transport_fee: f64,
    funrural_tax: f64,
) -> SettlementAmounts {
    let units = arroba_units(total_weight);
    let gross = round2(units * yield_rate * price_per_unit);
    SettlementAmounts {
        total_weight,
        unit_count: round2(units),
        yield_rate,
        price_per_unit,
        gross_amount: gross,
        final_amount: round2(gross - transport_fee - funrural_tax),
    }
}

/// Dead-weight settlement over the slaughterhouse-reported carcass weight
pub fn dead_settlement(
    final_weight: f64,
    yield_rate: f64,
    price_per_unit: f64,
    transport_fee: f64,
    funrural_tax: f64,
) -> SettlementAmounts {
    let units = arroba_units(final_weight);
    let gross = round2(units * price_per_unit);
    SettlementAmounts {
        total_weight: final_weight,
        unit_count: round2(units),
        yield_rate,
        price_per_unit,
        gross_amount: gross,
        final_amount: round2(gross - transport_fee - funrural_tax),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(10.006), 10.01);
        assert_eq!(round2(10.004), 10.0);
        assert_eq!(round2(-3.456), -3.46);
    }

    #[test]
    fn test_yield_rate_bounds() {
        assert!(validate_yield_rate(0.48).is_ok());
        assert!(validate_yield_rate(0.52).is_ok());
        assert!(validate_yield_rate(0.55).is_ok());
        assert!(validate_yield_rate(0.47).is_err());
        assert!(validate_yield_rate(0.56).is_err());
        assert!(validate_yield_rate(0.0).is_err());
    }

    #[test]
    fn test_arroba_conversion() {
        assert_eq!(arroba_units(1500.0), 100.0);
        assert_eq!(arroba_units(15.0), 1.0);
    }

    #[test]
    fn test_derived_price_per_unit() {
        // 10 head * 450 kg = 4500 kg = 300 @; R$ 90000 / 300 @ = R$ 300/@
        let ppu = derived_price_per_unit(90000.0, 10, 450.0);
        assert!((ppu - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_live_settlement_is_deterministic() {
        // 1500 kg → 100 @; at default yield 0.52 and R$ 300/@:
        // gross = 100 * 0.52 * 300 = 15600
        let amounts = live_settlement(1500.0, DEFAULT_YIELD_RATE, 300.0, 200.0, 100.0);
        assert_eq!(amounts.unit_count, 100.0);
        assert_eq!(amounts.gross_amount, 15600.0);
        assert_eq!(amounts.final_amount, 15300.0);
    }

    #[test]
    fn test_dead_settlement_skips_yield_multiplier() {
        // Carcass weight is already net: 750 kg → 50 @ * R$ 300 = 15000
        let amounts = dead_settlement(750.0, DEFAULT_YIELD_RATE, 300.0, 0.0, 0.0);
        assert_eq!(amounts.unit_count, 50.0);
        assert_eq!(amounts.gross_amount, 15000.0);
        assert_eq!(amounts.final_amount, 15000.0);
        // recorded, not applied
        assert_eq!(amounts.yield_rate, DEFAULT_YIELD_RATE);
    }

    #[test]
    fn test_fees_default_zero_leave_gross_unchanged() {
        let amounts = live_settlement(1500.0, 0.52, 52.0, 0.0, 0.0);
        assert_eq!(amounts.gross_amount, amounts.final_amount);
    }
}
