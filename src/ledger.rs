// 📒 Ledger - Participants and shared expenses
//
// The ledger owns the roster (participant names, insertion order) and the
// expense list. It never stores balances: those are derived on demand by the
// settlement engine from a borrowed view of the ledger.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{LedgerError, LedgerResult};
use crate::settlement::{compute_balances, Balances};

/// Currency symbol used in generated descriptions when none is configured.
pub const DEFAULT_CURRENCY: &str = "₹";

/// Largest single expense accepted. Keeps every sum well inside `Decimal` range.
pub const MAX_AMOUNT: Decimal = dec!(1000000000000000);

/// Separates names in a one-line participant list, so it cannot appear in one.
pub const NAME_LIST_SEPARATOR: char = ',';

// ============================================================================
// EXPENSE ID
// ============================================================================

/// Opaque expense identifier.
///
/// UUIDv7 is time-ordered, so sorting by id follows creation order.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpenseId(Uuid);

impl ExpenseId {
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for ExpenseId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExpenseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for ExpenseId {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim())
            .map(Self)
            .map_err(|_| LedgerError::invalid_command(format!("not an expense id: {}", s)))
    }
}

// ============================================================================
// EXPENSE
// ============================================================================

/// A shared expense, split evenly between its participants.
///
/// Expenses are immutable once recorded: the ledger only hands out shared
/// references, and `split_amount` is frozen at creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Expense {
    pub id: ExpenseId,
    pub amount: Decimal,
    #[serde(alias = "paidBy")]
    pub payer: String,
    /// Display order is preserved; no duplicates.
    pub participants: Vec<String>,
    pub split_amount: Decimal,
    pub description: String,
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Expense {
    /// True when `name` paid for or shares this expense.
    pub fn involves(&self, name: &str) -> bool {
        self.payer == name || self.participants.iter().any(|p| p == name)
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}

// ============================================================================
// SNAPSHOT (persistence shape)
// ============================================================================

/// Two independent lists: participant names and expense records, plus the
/// selected default payer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerSnapshot {
    pub participants: Vec<String>,
    pub expenses: Vec<Expense>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_payer: Option<String>,
}

// ============================================================================
// LEDGER
// ============================================================================

#[derive(Debug, Clone)]
pub struct Ledger {
    participants: Vec<String>,
    expenses: Vec<Expense>,
    default_payer: Option<String>,
    currency: String,
}

impl Ledger {
    pub fn new() -> Self {
        Self::with_currency(DEFAULT_CURRENCY)
    }

    pub fn with_currency(currency: &str) -> Self {
        Ledger {
            participants: Vec::new(),
            expenses: Vec::new(),
            default_payer: None,
            currency: currency.to_string(),
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    /// Change the symbol used for descriptions generated from now on.
    pub fn set_currency(&mut self, currency: &str) {
        self.currency = currency.to_string();
    }

    pub fn participants(&self) -> &[String] {
        &self.participants
    }

    pub fn expenses(&self) -> &[Expense] {
        &self.expenses
    }

    pub fn expense(&self, id: ExpenseId) -> Option<&Expense> {
        self.expenses.iter().find(|e| e.id == id)
    }

    pub fn default_payer(&self) -> Option<&str> {
        self.default_payer.as_deref()
    }

    pub fn has_participant(&self, name: &str) -> bool {
        self.participants.iter().any(|p| p == name)
    }

    /// Number of expenses that reference `name` as payer or participant.
    pub fn reference_count(&self, name: &str) -> usize {
        self.expenses.iter().filter(|e| e.involves(name)).count()
    }

    pub fn is_referenced(&self, name: &str) -> bool {
        self.expenses.iter().any(|e| e.involves(name))
    }

    pub fn total_spent(&self) -> Decimal {
        self.expenses.iter().map(|e| e.amount).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.participants.is_empty() && self.expenses.is_empty()
    }

    /// Net position of every participant, recomputed from scratch.
    pub fn balances(&self) -> Balances {
        compute_balances(&self.participants, &self.expenses)
    }

    // ------------------------------------------------------------------------
    // Roster mutators
    // ------------------------------------------------------------------------

    /// Add a participant. Blank or duplicate names, and names containing
    /// [`NAME_LIST_SEPARATOR`], are ignored.
    ///
    /// Returns `true` when the roster changed. The first participant added
    /// while no payer is selected becomes the default payer.
    pub fn add_participant(&mut self, name: &str) -> bool {
        let Some(name) = normalize_name(name) else {
            return false;
        };
        if name.contains(NAME_LIST_SEPARATOR) {
            warn!(participant = %name, "participant name contains a list separator");
            return false;
        }

        if self.has_participant(&name) {
            debug!(participant = %name, "participant already present");
            return false;
        }

        if self.default_payer.is_none() {
            self.default_payer = Some(name.clone());
        }

        debug!(participant = %name, "participant added");
        self.participants.push(name);
        true
    }

    /// Remove a participant who is not referenced by any expense.
    ///
    /// Returns `Ok(false)` when the name is not on the roster.
    pub fn remove_participant(&mut self, name: &str) -> LedgerResult<bool> {
        let name = name.trim();

        let expense_count = self.reference_count(name);
        if expense_count > 0 {
            warn!(participant = %name, expense_count, "participant removal blocked");
            return Err(LedgerError::ReferentialIntegrity {
                participant: name.to_string(),
                expense_count,
            });
        }

        let Some(position) = self.participants.iter().position(|p| p == name) else {
            return Ok(false);
        };
        self.participants.remove(position);

        if self.default_payer.as_deref() == Some(name) {
            self.default_payer = self.participants.first().cloned();
        }

        debug!(participant = %name, "participant removed");
        Ok(true)
    }

    pub fn set_default_payer(&mut self, name: &str) -> LedgerResult<()> {
        let name = name.trim();
        if !self.has_participant(name) {
            return Err(LedgerError::unknown_participant(name));
        }
        self.default_payer = Some(name.to_string());
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Expense mutators
    // ------------------------------------------------------------------------

    /// Record an expense paid by `payer` and split evenly between `participants`.
    ///
    /// Validation order: amount, participant set, roster membership. Nothing is
    /// stored unless every check passes.
    pub fn add_expense<S: AsRef<str>>(
        &mut self,
        amount: Decimal,
        payer: &str,
        participants: &[S],
        description: Option<&str>,
    ) -> LedgerResult<ExpenseId> {
        validate_amount(amount)?;

        let participants = dedupe_names(participants);
        if participants.is_empty() {
            return Err(LedgerError::EmptyParticipantSet);
        }

        let payer = payer.trim();
        if !self.has_participant(payer) {
            return Err(LedgerError::unknown_participant(payer));
        }
        if let Some(unknown) = participants.iter().find(|p| !self.has_participant(p)) {
            return Err(LedgerError::unknown_participant(unknown.as_str()));
        }

        let split_amount = amount
            .checked_div(Decimal::from(participants.len()))
            .ok_or_else(|| LedgerError::invalid_amount(format!("cannot split {}", amount)))?;

        let description = match description.map(str::trim) {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => self.default_description(amount),
        };

        let expense = Expense {
            id: ExpenseId::new(),
            amount,
            payer: payer.to_string(),
            participants,
            split_amount,
            description,
            created_at: Some(Utc::now()),
        };
        let id = expense.id;

        debug!(
            expense_id = %id,
            amount = %expense.amount,
            payer = %expense.payer,
            participants = expense.participants.len(),
            "expense added"
        );
        self.expenses.push(expense);

        Ok(id)
    }

    /// Remove an expense by id. Unknown ids are a no-op.
    pub fn remove_expense(&mut self, id: ExpenseId) -> Option<Expense> {
        let position = self.expenses.iter().position(|e| e.id == id)?;
        debug!(expense_id = %id, "expense removed");
        Some(self.expenses.remove(position))
    }

    fn default_description(&self, amount: Decimal) -> String {
        format!("Expense of {}{}", self.currency, amount.normalize())
    }

    // ------------------------------------------------------------------------
    // Snapshot round-trip
    // ------------------------------------------------------------------------

    pub fn snapshot(&self) -> LedgerSnapshot {
        LedgerSnapshot {
            participants: self.participants.clone(),
            expenses: self.expenses.clone(),
            default_payer: self.default_payer.clone(),
        }
    }

    /// Rebuild a ledger from persisted lists, rejecting anything that breaks
    /// the ledger invariants. A stored default payer no longer on the roster
    /// falls back to the first participant.
    pub fn from_snapshot(snapshot: LedgerSnapshot) -> LedgerResult<Self> {
        let mut roster: HashSet<&str> = HashSet::new();
        for name in &snapshot.participants {
            if normalize_name(name).as_deref() != Some(name.as_str()) {
                return Err(LedgerError::invalid_snapshot(format!(
                    "participant name {:?} is blank or untrimmed",
                    name
                )));
            }
            if !roster.insert(name.as_str()) {
                return Err(LedgerError::invalid_snapshot(format!(
                    "duplicate participant {}",
                    name
                )));
            }
        }

        let mut ids = HashSet::new();
        for expense in &snapshot.expenses {
            if !ids.insert(expense.id) {
                return Err(LedgerError::invalid_snapshot(format!(
                    "duplicate expense id {}",
                    expense.id
                )));
            }
            validate_amount(expense.amount).map_err(|e| {
                LedgerError::invalid_snapshot(format!("expense {}: {}", expense.id, e))
            })?;
            if expense.split_amount <= Decimal::ZERO {
                return Err(LedgerError::invalid_snapshot(format!(
                    "expense {} has a non-positive split amount",
                    expense.id
                )));
            }
            if expense.participants.is_empty() {
                return Err(LedgerError::invalid_snapshot(format!(
                    "expense {} has no participants",
                    expense.id
                )));
            }

            let mut seen = HashSet::new();
            for name in &expense.participants {
                if !seen.insert(name.as_str()) {
                    return Err(LedgerError::invalid_snapshot(format!(
                        "expense {} lists {} twice",
                        expense.id, name
                    )));
                }
            }

            let dangling = std::iter::once(&expense.payer)
                .chain(expense.participants.iter())
                .find(|name| !roster.contains(name.as_str()));
            if let Some(name) = dangling {
                return Err(LedgerError::invalid_snapshot(format!(
                    "expense {} references unknown participant {}",
                    expense.id, name
                )));
            }
        }

        let default_payer = snapshot
            .default_payer
            .filter(|name| roster.contains(name.as_str()))
            .or_else(|| snapshot.participants.first().cloned());

        Ok(Ledger {
            default_payer,
            participants: snapshot.participants,
            expenses: snapshot.expenses,
            currency: DEFAULT_CURRENCY.to_string(),
        })
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

/// Trimmed participant name, or `None` when blank.
pub fn normalize_name(name: &str) -> Option<String> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Reject amounts that are not strictly positive or exceed [`MAX_AMOUNT`].
pub fn validate_amount(amount: Decimal) -> LedgerResult<()> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::invalid_amount(format!(
            "{} must be greater than zero",
            amount
        )));
    }
    if amount > MAX_AMOUNT {
        return Err(LedgerError::invalid_amount(format!(
            "{} exceeds the maximum of {}",
            amount, MAX_AMOUNT
        )));
    }
    Ok(())
}

/// Trim names, drop blanks and collapse duplicates, keeping first-seen order.
fn dedupe_names<S: AsRef<str>>(names: &[S]) -> Vec<String> {
    let mut seen = HashSet::new();
    names
        .iter()
        .filter_map(|n| normalize_name(n.as_ref()))
        .filter(|n| seen.insert(n.clone()))
        .collect()
}
