// Split Ledger - Core Library
// Shared expenses, net balances and settlement plans.
// Exposes all modules for use in the CLI, the TUI, the API server and tests.

pub mod error;
pub mod ledger;       // Roster + expenses, referential integrity
pub mod settlement;   // Balances + greedy debt reduction
pub mod command;      // One-line expense syntax shared by CLI and TUI
pub mod db;           // SQLite key-value snapshot + audit trail
pub mod export;       // Text summary, CSV export/import
pub mod config;
pub mod logging;

// Re-export commonly used types
pub use error::{LedgerError, LedgerResult};
pub use ledger::{
    normalize_name, validate_amount,
    Expense, ExpenseId, Ledger, LedgerSnapshot,
    DEFAULT_CURRENCY, MAX_AMOUNT, NAME_LIST_SEPARATOR,
};
pub use settlement::{
    compute_balances, compute_settlements, verify_settlements,
    Balance, Balances, Settlement, SettlementEngine,
    BALANCE_TOLERANCE, SETTLE_THRESHOLD,
};
pub use command::{parse_amount, ExpenseDraft, ParticipantSelection};
pub use db::{
    Event,
    open_database, setup_database, save_snapshot, load_snapshot,
    save_ledger, load_ledger, insert_event, get_events_for_entity, get_recent_events,
};
pub use export::{
    format_amount, format_money, render_summary, ledger_summary,
    write_expenses_csv, export_expenses_csv, read_expense_rows,
    import_expense_rows, import_expenses_csv,
    ExpenseRow, ImportReport, SETTLED_MESSAGE,
};
pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
