// ⌨️ Command Parsing - Amounts, participant lists and one-line expenses
//
// Shared by the CLI and the TUI input line:
//   <amount> <payer|-> <name,name,...|*> [description...]
//
// "-" uses the ledger's default payer, "*" (or "all") splits between everyone.

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::error::{LedgerError, LedgerResult};
use crate::ledger::{validate_amount, ExpenseId, Ledger, NAME_LIST_SEPARATOR};

/// Parse a user-typed amount. Must be a finite number greater than zero.
pub fn parse_amount(input: &str) -> LedgerResult<Decimal> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(LedgerError::invalid_amount("amount is required"));
    }

    let amount = Decimal::from_str(trimmed)
        .or_else(|_| Decimal::from_scientific(trimmed))
        .map_err(|_| LedgerError::invalid_amount(format!("not a number: {}", trimmed)))?;

    validate_amount(amount)?;
    Ok(amount)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantSelection {
    /// Everyone on the roster at the time the expense is recorded.
    All,
    Named(Vec<String>),
}

impl ParticipantSelection {
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed == "*" || trimmed.eq_ignore_ascii_case("all") {
            return ParticipantSelection::All;
        }

        ParticipantSelection::Named(
            trimmed
                .split(NAME_LIST_SEPARATOR)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(str::to_string)
                .collect(),
        )
    }

    pub fn resolve(&self, roster: &[String]) -> Vec<String> {
        match self {
            ParticipantSelection::All => roster.to_vec(),
            ParticipantSelection::Named(names) => names.clone(),
        }
    }
}

/// A parsed, not yet recorded, expense.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpenseDraft {
    pub amount: Decimal,
    /// `None` means the ledger's default payer.
    pub payer: Option<String>,
    pub participants: ParticipantSelection,
    pub description: Option<String>,
}

impl ExpenseDraft {
    /// Parse the one-line form used by the TUI input line.
    pub fn parse(line: &str) -> LedgerResult<Self> {
        let mut tokens = line.split_whitespace();
        let amount = tokens.next();
        let payer = tokens.next();
        let participants = tokens.next();
        let description: Vec<&str> = tokens.collect();

        Self::from_parts(amount, payer, participants, &description.join(" "))
    }

    /// Parse already-split arguments (CLI); the tail becomes the description.
    pub fn from_args<S: AsRef<str>>(args: &[S]) -> LedgerResult<Self> {
        let description: Vec<&str> = args.iter().skip(3).map(|a| a.as_ref()).collect();

        Self::from_parts(
            args.first().map(|a| a.as_ref()),
            args.get(1).map(|a| a.as_ref()),
            args.get(2).map(|a| a.as_ref()),
            &description.join(" "),
        )
    }

    fn from_parts(
        amount: Option<&str>,
        payer: Option<&str>,
        participants: Option<&str>,
        description: &str,
    ) -> LedgerResult<Self> {
        let amount = parse_amount(amount.ok_or_else(|| {
            LedgerError::invalid_command("usage: <amount> <payer|-> <names|*> [description]")
        })?)?;

        let payer = match payer.map(str::trim) {
            None | Some("-") => None,
            Some(name) => Some(name.to_string()),
        };

        let participants = ParticipantSelection::parse(participants.unwrap_or(""));

        let description = description.trim();
        let description = if description.is_empty() {
            None
        } else {
            Some(description.to_string())
        };

        Ok(ExpenseDraft {
            amount,
            payer,
            participants,
            description,
        })
    }

    /// Record the draft in `ledger`, resolving "-" and "*" against its state.
    pub fn apply(&self, ledger: &mut Ledger) -> LedgerResult<ExpenseId> {
        let payer = match &self.payer {
            Some(name) => name.clone(),
            None => ledger
                .default_payer()
                .map(str::to_string)
                .ok_or_else(|| LedgerError::invalid_command("no payer selected"))?,
        };
        let participants = self.participants.resolve(ledger.participants());

        ledger.add_expense(
            self.amount,
            &payer,
            participants.as_slice(),
            self.description.as_deref(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount(" 90 ").unwrap(), dec!(90));
        assert_eq!(parse_amount("12.345").unwrap(), dec!(12.345));
        assert_eq!(parse_amount("1e2").unwrap(), dec!(100));

        for bad in ["", "abc", "NaN", "inf", "-Infinity", "0", "-3", "1e40"] {
            assert!(
                matches!(parse_amount(bad), Err(LedgerError::InvalidAmount(_))),
                "{:?} should be rejected",
                bad
            );
        }
    }

    #[test]
    fn test_participant_selection() {
        assert_eq!(ParticipantSelection::parse("*"), ParticipantSelection::All);
        assert_eq!(ParticipantSelection::parse("ALL"), ParticipantSelection::All);
        assert_eq!(
            ParticipantSelection::parse("A, B,,C "),
            ParticipantSelection::Named(vec!["A".into(), "B".into(), "C".into()])
        );
        assert_eq!(
            ParticipantSelection::parse(""),
            ParticipantSelection::Named(vec![])
        );
    }

    #[test]
    fn test_parse_one_line_expense() {
        let draft = ExpenseDraft::parse("90 A A,B,C Dinner at the beach").unwrap();

        assert_eq!(draft.amount, dec!(90));
        assert_eq!(draft.payer.as_deref(), Some("A"));
        assert_eq!(
            draft.participants,
            ParticipantSelection::Named(vec!["A".into(), "B".into(), "C".into()])
        );
        assert_eq!(draft.description.as_deref(), Some("Dinner at the beach"));
    }

    #[test]
    fn test_parse_rejects_missing_amount() {
        assert!(matches!(
            ExpenseDraft::parse("   "),
            Err(LedgerError::InvalidCommand(_))
        ));
        assert!(matches!(
            ExpenseDraft::parse("ten A *"),
            Err(LedgerError::InvalidAmount(_))
        ));
    }

    #[test]
    fn test_apply_uses_default_payer_and_everyone() {
        let mut ledger = Ledger::new();
        ledger.add_participant("A");
        ledger.add_participant("B");
        ledger.add_participant("C");

        let draft = ExpenseDraft::from_args(&["60", "-", "*"]).unwrap();
        let id = draft.apply(&mut ledger).unwrap();

        let expense = ledger.expense(id).unwrap();
        assert_eq!(expense.payer, "A");
        assert_eq!(expense.participants.len(), 3);
        assert_eq!(expense.split_amount, dec!(20));
        assert_eq!(expense.description, "Expense of ₹60");
    }

    #[test]
    fn test_apply_without_participants_fails() {
        let mut ledger = Ledger::new();
        ledger.add_participant("A");

        let draft = ExpenseDraft::from_args(&["60", "A"]).unwrap();
        assert_eq!(draft.apply(&mut ledger), Err(LedgerError::EmptyParticipantSet));
        assert!(ledger.expenses().is_empty());
    }

    #[test]
    fn test_apply_without_default_payer_fails() {
        let mut ledger = Ledger::new();
        let draft = ExpenseDraft::parse("10 - *").unwrap();

        assert!(matches!(
            draft.apply(&mut ledger),
            Err(LedgerError::InvalidCommand(_))
        ));
    }
}
