// ⚖️ Settlement Engine - Net balances and debt reduction
//
// Balances:
//   payer += amount, every participant -= split_amount
//   sum(balances) == 0 (within BALANCE_TOLERANCE)
//
// Settlements: greedy largest-debtor vs largest-creditor matching. This is a
// deterministic approximation, not a proven minimum number of transfers.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::export::format_amount;
use crate::ledger::Expense;

/// Magnitudes below this count as settled (0.01 currency units).
pub const SETTLE_THRESHOLD: Decimal = dec!(0.01);

/// Allowed drift of the balance sum caused by non-terminating splits (e.g. 100 / 3).
pub const BALANCE_TOLERANCE: Decimal = dec!(0.000000001);

// ============================================================================
// BALANCES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub participant: String,
    /// Positive: is owed money. Negative: owes money.
    pub amount: Decimal,
}

/// Net position per participant, in roster order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Balances {
    entries: Vec<Balance>,
}

impl Balances {
    pub fn get(&self, participant: &str) -> Option<Decimal> {
        self.entries
            .iter()
            .find(|b| b.participant == participant)
            .map(|b| b.amount)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Balance> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn total(&self) -> Decimal {
        self.entries.iter().map(|b| b.amount).sum()
    }

    /// Core invariant: what was paid equals what was consumed.
    pub fn is_zero_sum(&self) -> bool {
        self.total().abs() <= BALANCE_TOLERANCE
    }

    pub fn creditors(&self, threshold: Decimal) -> impl Iterator<Item = &Balance> {
        self.entries.iter().filter(move |b| b.amount >= threshold)
    }

    pub fn debtors(&self, threshold: Decimal) -> impl Iterator<Item = &Balance> {
        self.entries.iter().filter(move |b| -b.amount >= threshold)
    }

    pub fn is_settled(&self, threshold: Decimal) -> bool {
        self.entries.iter().all(|b| b.amount.abs() < threshold)
    }
}

impl<S: Into<String>> FromIterator<(S, Decimal)> for Balances {
    /// Repeated names accumulate into one entry.
    fn from_iter<I: IntoIterator<Item = (S, Decimal)>>(iter: I) -> Self {
        let mut acc = Accumulator::default();
        for (name, amount) in iter {
            let name: String = name.into();
            acc.add(&name, amount);
        }
        acc.finish()
    }
}

#[derive(Default)]
struct Accumulator {
    entries: Vec<Balance>,
    index: HashMap<String, usize>,
}

impl Accumulator {
    fn add(&mut self, participant: &str, delta: Decimal) {
        let slot = match self.index.get(participant) {
            Some(&slot) => slot,
            None => {
                let slot = self.entries.len();
                self.entries.push(Balance {
                    participant: participant.to_string(),
                    amount: Decimal::ZERO,
                });
                self.index.insert(participant.to_string(), slot);
                slot
            }
        };
        self.entries[slot].amount += delta;
    }

    fn finish(self) -> Balances {
        Balances {
            entries: self.entries,
        }
    }
}

// ============================================================================
// SETTLEMENT
// ============================================================================

/// One transfer: `from` pays `to`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settlement {
    pub from: String,
    pub to: String,
    pub amount: Decimal,
}

impl fmt::Display for Settlement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} pays {} {}", self.from, self.to, format_amount(self.amount))
    }
}

/// Working copy of one side of the matching.
struct Party<'a> {
    name: &'a str,
    remaining: Decimal,
    /// Roster position, used to break ties.
    rank: usize,
}

// ============================================================================
// SETTLEMENT ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettlementEngine {
    /// Magnitudes below this are treated as settled (default: 0.01)
    pub threshold: Decimal,
}

impl SettlementEngine {
    pub fn new() -> Self {
        SettlementEngine {
            threshold: SETTLE_THRESHOLD,
        }
    }

    pub fn with_threshold(threshold: Decimal) -> Self {
        SettlementEngine {
            threshold: threshold.abs(),
        }
    }

    /// Net balance per participant. Every roster member appears, even at zero.
    ///
    /// Names that expenses reference but the roster lacks are appended after
    /// the roster so that the balance sum stays zero.
    pub fn balances(&self, roster: &[String], expenses: &[Expense]) -> Balances {
        let mut acc = Accumulator::default();
        for name in roster {
            acc.add(name, Decimal::ZERO);
        }

        for expense in expenses {
            acc.add(&expense.payer, expense.amount);
            for participant in &expense.participants {
                acc.add(participant, -expense.split_amount);
            }
        }

        acc.finish()
    }

    /// Reduce balances to payer→payee transfers.
    ///
    /// Each round matches the current largest debtor with the current largest
    /// creditor (ties go to the earlier roster position) and moves the smaller
    /// of the two amounts. A party leaves the matching once its remainder drops
    /// below the threshold.
    pub fn settle(&self, balances: &Balances) -> Vec<Settlement> {
        let mut debtors: Vec<Party> = Vec::new();
        let mut creditors: Vec<Party> = Vec::new();

        for (rank, balance) in balances.iter().enumerate() {
            if self.is_settled(balance.amount) {
                continue;
            }
            let party = Party {
                name: &balance.participant,
                remaining: balance.amount.abs(),
                rank,
            };
            if balance.amount < Decimal::ZERO {
                debtors.push(party);
            } else {
                creditors.push(party);
            }
        }

        debtors.sort_by(|a, b| b.remaining.cmp(&a.remaining).then(a.rank.cmp(&b.rank)));
        creditors.sort_by(|a, b| b.remaining.cmp(&a.remaining).then(a.rank.cmp(&b.rank)));

        let mut settlements = Vec::new();

        while let (Some(d), Some(c)) = (largest(&debtors), largest(&creditors)) {
            let transfer = debtors[d].remaining.min(creditors[c].remaining);

            if transfer > Decimal::ZERO {
                settlements.push(Settlement {
                    from: debtors[d].name.to_string(),
                    to: creditors[c].name.to_string(),
                    amount: transfer,
                });
            }

            debtors[d].remaining -= transfer;
            creditors[c].remaining -= transfer;

            if self.is_exhausted(debtors[d].remaining) {
                debtors.remove(d);
            }
            if self.is_exhausted(creditors[c].remaining) {
                creditors.remove(c);
            }
        }

        settlements
    }

    /// True when applying `settlements` leaves every participant within the
    /// threshold of zero, allowing one threshold of slack per counterparty.
    pub fn verify(&self, balances: &Balances, settlements: &[Settlement]) -> bool {
        let mut acc = Accumulator::default();
        for balance in balances.iter() {
            acc.add(&balance.participant, balance.amount);
        }
        for settlement in settlements {
            acc.add(&settlement.from, settlement.amount);
            acc.add(&settlement.to, -settlement.amount);
        }

        let residual = acc.finish();
        let slack = self.threshold * Decimal::from(residual.len().max(1));
        residual.iter().all(|b| b.amount.abs() <= slack)
    }

    fn is_settled(&self, amount: Decimal) -> bool {
        amount.abs() < self.threshold || amount.is_zero()
    }

    fn is_exhausted(&self, remaining: Decimal) -> bool {
        remaining <= Decimal::ZERO || remaining < self.threshold
    }
}

impl Default for SettlementEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Index of the party with the largest remainder; lowest rank wins ties.
fn largest(parties: &[Party]) -> Option<usize> {
    parties
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.remaining.cmp(&b.remaining).then(b.rank.cmp(&a.rank)))
        .map(|(i, _)| i)
}

// ============================================================================
// FREE FUNCTIONS (default threshold)
// ============================================================================

pub fn compute_balances(roster: &[String], expenses: &[Expense]) -> Balances {
    SettlementEngine::new().balances(roster, expenses)
}

pub fn compute_settlements(balances: &Balances) -> Vec<Settlement> {
    SettlementEngine::new().settle(balances)
}

pub fn verify_settlements(balances: &Balances, settlements: &[Settlement]) -> bool {
    SettlementEngine::new().verify(balances, settlements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::Ledger;
    use proptest::prelude::*;

    fn ledger_with(names: &[&str]) -> Ledger {
        let mut ledger = Ledger::new();
        for name in names {
            ledger.add_participant(name);
        }
        ledger
    }

    fn transfer(from: &str, to: &str, amount: Decimal) -> Settlement {
        Settlement {
            from: from.to_string(),
            to: to.to_string(),
            amount,
        }
    }

    #[test]
    fn test_three_way_dinner() {
        let mut ledger = ledger_with(&["A", "B", "C"]);
        ledger.add_expense(dec!(90), "A", &["A", "B", "C"], None).unwrap();

        let balances = ledger.balances();
        assert_eq!(balances.get("A"), Some(dec!(60)));
        assert_eq!(balances.get("B"), Some(dec!(-30)));
        assert_eq!(balances.get("C"), Some(dec!(-30)));
        assert!(balances.is_zero_sum());

        let settlements = compute_settlements(&balances);
        assert_eq!(
            settlements,
            vec![transfer("B", "A", dec!(30)), transfer("C", "A", dec!(30))]
        );
        assert!(verify_settlements(&balances, &settlements));

        println!("✅ Three-way dinner: {:?}", settlements);
    }

    #[test]
    fn test_two_expenses_partially_cancel() {
        let mut ledger = ledger_with(&["A", "B"]);
        ledger.add_expense(dec!(100), "A", &["A", "B"], None).unwrap();
        ledger.add_expense(dec!(50), "B", &["A", "B"], None).unwrap();

        let balances = ledger.balances();
        assert_eq!(balances.get("A"), Some(dec!(25)));
        assert_eq!(balances.get("B"), Some(dec!(-25)));

        let settlements = compute_settlements(&balances);
        assert_eq!(settlements, vec![transfer("B", "A", dec!(25))]);
    }

    #[test]
    fn test_every_roster_member_appears_in_balances() {
        let mut ledger = ledger_with(&["A", "B", "Idle"]);
        ledger.add_expense(dec!(10), "A", &["B"], None).unwrap();

        let balances = ledger.balances();
        let names: Vec<&str> = balances.iter().map(|b| b.participant.as_str()).collect();
        assert_eq!(names, vec!["A", "B", "Idle"]);
        assert_eq!(balances.get("Idle"), Some(Decimal::ZERO));
    }

    #[test]
    fn test_unrostered_names_keep_sum_zero() {
        let mut ledger = ledger_with(&["A", "B"]);
        ledger.add_expense(dec!(40), "A", &["A", "B"], None).unwrap();

        // Roster passed in without B
        let roster = vec!["A".to_string()];
        let balances = compute_balances(&roster, ledger.expenses());

        assert_eq!(balances.len(), 2);
        assert_eq!(balances.get("B"), Some(dec!(-20)));
        assert!(balances.is_zero_sum());
    }

    #[test]
    fn test_balances_are_idempotent() {
        let mut ledger = ledger_with(&["A", "B", "C"]);
        ledger.add_expense(dec!(100), "A", &["A", "B", "C"], None).unwrap();
        ledger.add_expense(dec!(35.5), "C", &["B", "C"], None).unwrap();

        assert_eq!(ledger.balances(), ledger.balances());
    }

    #[test]
    fn test_uneven_split_stays_within_tolerance() {
        let mut ledger = ledger_with(&["A", "B", "C"]);
        ledger.add_expense(dec!(100), "A", &["A", "B", "C"], None).unwrap();

        let balances = ledger.balances();
        assert!(balances.total().abs() <= BALANCE_TOLERANCE);
        assert!(balances.is_zero_sum());

        let settlements = compute_settlements(&balances);
        assert_eq!(settlements.len(), 2);
        assert_eq!(settlements[0].amount.round_dp(2), dec!(33.33));
        assert_eq!(settlements[0].to_string(), "B pays A 33.33");
    }

    #[test]
    fn test_all_zero_balances_settle_to_nothing() {
        let balances: Balances = vec![("A", Decimal::ZERO), ("B", Decimal::ZERO)]
            .into_iter()
            .collect();
        assert!(compute_settlements(&balances).is_empty());
        assert!(balances.is_settled(SETTLE_THRESHOLD));

        assert!(compute_settlements(&Balances::default()).is_empty());
    }

    #[test]
    fn test_sub_threshold_balances_are_ignored() {
        let balances: Balances = vec![("A", dec!(0.005)), ("B", dec!(-0.005))]
            .into_iter()
            .collect();
        assert!(compute_settlements(&balances).is_empty());
    }

    #[test]
    fn test_largest_parties_are_reselected_each_round() {
        let balances: Balances = vec![
            ("A", dec!(50)),
            ("B", dec!(40)),
            ("C", dec!(-60)),
            ("D", dec!(-30)),
        ]
        .into_iter()
        .collect();

        let settlements = compute_settlements(&balances);

        // After C pays A 50, D (30) is now the largest debtor, not C (10).
        assert_eq!(
            settlements,
            vec![
                transfer("C", "A", dec!(50)),
                transfer("D", "B", dec!(30)),
                transfer("C", "B", dec!(10)),
            ]
        );
        assert!(verify_settlements(&balances, &settlements));
    }

    #[test]
    fn test_ties_follow_roster_order() {
        let balances: Balances = vec![
            ("C", dec!(-10)),
            ("A", dec!(10)),
            ("B", dec!(-10)),
            ("D", dec!(10)),
        ]
        .into_iter()
        .collect();

        let settlements = compute_settlements(&balances);
        assert_eq!(
            settlements,
            vec![transfer("C", "A", dec!(10)), transfer("B", "D", dec!(10))]
        );
    }

    #[test]
    fn test_custom_threshold() {
        let balances: Balances = vec![("A", dec!(0.5)), ("B", dec!(-0.5))]
            .into_iter()
            .collect();

        let coarse = SettlementEngine::with_threshold(dec!(1));
        assert!(coarse.settle(&balances).is_empty());

        let exact = SettlementEngine::with_threshold(Decimal::ZERO);
        assert_eq!(exact.settle(&balances), vec![transfer("B", "A", dec!(0.5))]);
    }

    #[test]
    fn test_verify_detects_wrong_plan() {
        let balances: Balances = vec![("A", dec!(30)), ("B", dec!(-30))]
            .into_iter()
            .collect();

        assert!(!verify_settlements(&balances, &[]));
        assert!(!verify_settlements(&balances, &[transfer("A", "B", dec!(30))]));
        assert!(verify_settlements(&balances, &[transfer("B", "A", dec!(30))]));
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: for any expense sequence, balances sum to zero and the
        /// settlement plan clears every participant.
        #[test]
        fn balances_sum_to_zero_and_settle(
            size in 2usize..7,
            raw in prop::collection::vec((1i64..1_000_000i64, 0usize..7, 1u8..=127u8), 0..25)
        ) {
            let names: Vec<String> = (0..size).map(|i| format!("P{}", i)).collect();
            let mut ledger = Ledger::new();
            for name in &names {
                ledger.add_participant(name);
            }

            for (cents, payer, mask) in raw {
                let payer = &names[payer % size];
                let participants: Vec<&String> = names
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| mask & (1 << i) != 0)
                    .map(|(_, n)| n)
                    .collect();
                if participants.is_empty() {
                    continue;
                }
                let participants: Vec<&str> = participants.iter().map(|s| s.as_str()).collect();
                ledger
                    .add_expense(Decimal::new(cents, 2), payer, &participants, None)
                    .unwrap();
            }

            let balances = ledger.balances();
            prop_assert!(balances.is_zero_sum(), "sum was {}", balances.total());
            prop_assert_eq!(balances.len(), size);

            let settlements = compute_settlements(&balances);
            for s in &settlements {
                prop_assert!(s.amount > Decimal::ZERO);
                prop_assert_ne!(&s.from, &s.to);
                prop_assert!(balances.get(&s.from).unwrap() < Decimal::ZERO);
                prop_assert!(balances.get(&s.to).unwrap() > Decimal::ZERO);
            }

            let open = balances.iter().filter(|b| b.amount.abs() >= SETTLE_THRESHOLD).count();
            prop_assert!(settlements.len() <= open);
            prop_assert!(verify_settlements(&balances, &settlements));
        }
    }
}
