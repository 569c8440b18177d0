// 📤 Export - Plain-text summary and CSV exchange
//
// The summary is what gets copied to the clipboard or printed: total spent,
// each expense, each balance, then the settlement plan.
// CSV carries the expense list in and out; imported rows become new expenses.

use anyhow::{Context, Result};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::io::{Read, Write};
use std::path::Path;
use tracing::info;

use crate::command::parse_amount;
use crate::ledger::{Expense, ExpenseId, Ledger};
use crate::settlement::{Balances, Settlement, SettlementEngine};

pub const SETTLED_MESSAGE: &str = "Everyone is settled up!";

/// Separator accepted in hand-written CSV `participants` cells.
/// Exports always write the cell as a JSON array of names.
pub const PARTICIPANT_SEPARATOR: &str = ";";

// ============================================================================
// MONEY FORMATTING
// ============================================================================

/// Two decimal places, half away from zero.
pub fn format_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

pub fn format_money(currency: &str, amount: Decimal) -> String {
    format!("{}{}", currency, format_amount(amount))
}

// ============================================================================
// TEXT SUMMARY
// ============================================================================

pub fn render_summary(
    expenses: &[Expense],
    balances: &Balances,
    settlements: &[Settlement],
    currency: &str,
    threshold: Decimal,
) -> String {
    let mut out = String::new();
    let total: Decimal = expenses.iter().map(|e| e.amount).sum();

    let _ = writeln!(out, "Expense Summary");
    let _ = writeln!(out, "Total: {}", format_money(currency, total));

    let _ = writeln!(out);
    let _ = writeln!(out, "Expenses:");
    if expenses.is_empty() {
        let _ = writeln!(out, "  No expenses recorded.");
    }
    for (i, expense) in expenses.iter().enumerate() {
        let _ = writeln!(
            out,
            "  {}. {} - {} paid by {}, split between {} ({} each)",
            i + 1,
            expense.description,
            format_money(currency, expense.amount),
            expense.payer,
            expense.participants.join(", "),
            format_money(currency, expense.split_amount),
        );
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Balances:");
    for balance in balances.iter() {
        let status = if balance.amount.abs() < threshold {
            "settled".to_string()
        } else if balance.amount > Decimal::ZERO {
            format!("gets back {}", format_money(currency, balance.amount))
        } else {
            format!("owes {}", format_money(currency, balance.amount.abs()))
        };
        let _ = writeln!(out, "  {}: {}", balance.participant, status);
    }

    let _ = writeln!(out);
    let _ = writeln!(out, "Settlements:");
    if settlements.is_empty() {
        let _ = writeln!(out, "  {}", SETTLED_MESSAGE);
    }
    for settlement in settlements {
        let _ = writeln!(
            out,
            "  {} pays {} {}",
            settlement.from,
            settlement.to,
            format_money(currency, settlement.amount)
        );
    }

    out
}

/// Summary of a whole ledger with the engine's threshold.
pub fn ledger_summary(ledger: &Ledger, engine: &SettlementEngine) -> String {
    let balances = engine.balances(ledger.participants(), ledger.expenses());
    let settlements = engine.settle(&balances);
    render_summary(
        ledger.expenses(),
        &balances,
        &settlements,
        ledger.currency(),
        engine.threshold,
    )
}

// ============================================================================
// CSV
// ============================================================================

/// One expense as a CSV record. Amounts stay text so no precision is lost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRow {
    #[serde(default)]
    pub id: String,
    pub amount: String,
    pub payer: String,
    pub participants: String,
    #[serde(default)]
    pub split_amount: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: String,
}

impl From<&Expense> for ExpenseRow {
    fn from(expense: &Expense) -> Self {
        Self {
            id: expense.id.to_string(),
            amount: expense.amount.to_string(),
            payer: expense.payer.clone(),
            participants: serde_json::Value::from(expense.participants.clone()).to_string(),
            split_amount: expense.split_amount.to_string(),
            description: expense.description.clone(),
            created_at: expense
                .created_at
                .map(|t| t.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

impl ExpenseRow {
    /// Names from a JSON array cell, or from a `;` separated list.
    pub fn participant_names(&self) -> Result<Vec<String>> {
        let cell = self.participants.trim();
        if cell.starts_with('[') {
            let names: Vec<String> = serde_json::from_str(cell)
                .with_context(|| format!("participants is not a JSON list of names: {}", cell))?;
            return Ok(names);
        }

        Ok(cell
            .split(PARTICIPANT_SEPARATOR)
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .collect())
    }
}

pub fn write_expenses_csv<W: Write>(writer: W, expenses: &[Expense]) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    for expense in expenses {
        wtr.serialize(ExpenseRow::from(expense))
            .context("Failed to serialize expense")?;
    }
    wtr.flush()?;
    Ok(())
}

pub fn export_expenses_csv(path: &Path, expenses: &[Expense]) -> Result<usize> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    write_expenses_csv(file, expenses)?;
    info!(path = %path.display(), expenses = expenses.len(), "expenses exported");
    Ok(expenses.len())
}

pub fn read_expense_rows<R: Read>(reader: R) -> Result<Vec<ExpenseRow>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut rows = Vec::new();
    for result in rdr.deserialize() {
        let row: ExpenseRow = result.context("Failed to deserialize expense row")?;
        rows.push(row);
    }
    Ok(rows)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImportReport {
    pub expense_ids: Vec<ExpenseId>,
    pub participants_added: Vec<String>,
}

/// Record every row as a new expense, adding unknown names to the roster.
///
/// Split amounts are recomputed and ids reassigned. Either all rows are
/// imported or the ledger is left as it was.
pub fn import_expense_rows(ledger: &mut Ledger, rows: &[ExpenseRow]) -> Result<ImportReport> {
    let mut staged = ledger.clone();
    let mut report = ImportReport::default();

    for (i, row) in rows.iter().enumerate() {
        let line = i + 2; // header is line 1
        let names = row.participant_names().with_context(|| format!("line {}", line))?;

        for name in std::iter::once(&row.payer).chain(names.iter()) {
            if staged.add_participant(name) {
                report.participants_added.push(name.trim().to_string());
            }
        }

        let amount = parse_amount(&row.amount).with_context(|| format!("line {}", line))?;
        let id = staged
            .add_expense(amount, &row.payer, names.as_slice(), Some(row.description.as_str()))
            .with_context(|| format!("line {}", line))?;
        report.expense_ids.push(id);
    }

    *ledger = staged;
    Ok(report)
}

pub fn import_expenses_csv(path: &Path, ledger: &mut Ledger) -> Result<ImportReport> {
    let file =
        std::fs::File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let rows = read_expense_rows(file)?;
    let report = import_expense_rows(ledger, &rows)?;
    info!(
        path = %path.display(),
        expenses = report.expense_ids.len(),
        participants = report.participants_added.len(),
        "expenses imported"
    );
    Ok(report)
}
