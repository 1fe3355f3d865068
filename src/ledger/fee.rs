use rust_decimal::{Decimal, RoundingStrategy};

use crate::db::TransactionKind;

/// `fee = max(round2(amount * rate), minimum)` for the configured kinds.
///
/// The proportional part is rounded to cents before it is compared with the
/// minimum.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeSchedule {
    pub rate: Decimal,
    pub minimum: Decimal,
    pub kinds: Vec<TransactionKind>,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self::none()
    }
}

impl FeeSchedule {
    pub fn none() -> Self {
        Self {
            rate: Decimal::ZERO,
            minimum: Decimal::ZERO,
            kinds: Vec::new(),
        }
    }

    pub fn new(rate: Decimal, minimum: Decimal, kinds: Vec<TransactionKind>) -> Self {
        Self { rate, minimum, kinds }
    }

    pub fn applies_to(&self, kind: TransactionKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// `None` when no fee is charged.
    pub fn fee_for(&self, kind: TransactionKind, amount: Decimal) -> Option<Decimal> {
        if !self.applies_to(kind) {
            return None;
        }
        let proportional = amount
            .checked_mul(self.rate)
            .unwrap_or(Decimal::MAX)
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        let fee = proportional.max(self.minimum);
        (fee > Decimal::ZERO).then_some(fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn schedule() -> FeeSchedule {
        FeeSchedule::new(dec!(0.01), dec!(2.00), vec![TransactionKind::Withdrawal])
    }

    #[test]
    fn no_fee_for_other_kinds() {
        assert_eq!(schedule().fee_for(TransactionKind::Transfer, dec!(500)), None);
        assert_eq!(FeeSchedule::none().fee_for(TransactionKind::Withdrawal, dec!(500)), None);
    }

    #[test]
    fn minimum_applies_below_threshold() {
        assert_eq!(schedule().fee_for(TransactionKind::Withdrawal, dec!(100.00)), Some(dec!(2.00)));
        assert_eq!(schedule().fee_for(TransactionKind::Withdrawal, dec!(200.00)), Some(dec!(2.00)));
        assert_eq!(schedule().fee_for(TransactionKind::Withdrawal, dec!(300.00)), Some(dec!(3.00)));
    }

    #[test]
    fn rounds_before_comparing_with_minimum() {
        // 199.50 * 0.01 = 1.995 -> 2.00 after rounding: equal to the minimum
        assert_eq!(schedule().fee_for(TransactionKind::Withdrawal, dec!(199.50)), Some(dec!(2.00)));
        // 200.49 * 0.01 = 2.0049 -> 2.00; without rounding first it would be 2.0049
        assert_eq!(schedule().fee_for(TransactionKind::Withdrawal, dec!(200.49)), Some(dec!(2.00)));
        // 200.50 * 0.01 = 2.005 -> 2.01, above the minimum
        assert_eq!(schedule().fee_for(TransactionKind::Withdrawal, dec!(200.50)), Some(dec!(2.01)));
    }

    #[test]
    fn oversized_products_saturate() {
        let steep = FeeSchedule::new(Decimal::MAX, dec!(0), vec![TransactionKind::Withdrawal]);
        assert_eq!(steep.fee_for(TransactionKind::Withdrawal, dec!(10.00)), Some(Decimal::MAX));
    }
}
