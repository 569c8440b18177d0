// Only compile UI module when TUI feature is enabled
#[cfg(feature = "tui")]
mod ui;

use anyhow::{bail, Context, Result};
use rusqlite::Connection;
use std::env;
use std::path::Path;
use tracing::{debug, warn};

use split_ledger::{
    export_expenses_csv, format_money, get_recent_events, import_expenses_csv, insert_event,
    ledger_summary, load_ledger, logging, open_database, save_ledger, Config, Event, ExpenseDraft,
    ExpenseId, Ledger, LedgerError, NAME_LIST_SEPARATOR,
};

const ACTOR: &str = "cli";

fn main() {
    let args: Vec<String> = env::args().collect();
    let command = args.get(1).map(String::as_str).unwrap_or("ui");

    // Logs would draw over the TUI screen
    let default_filter = if command == "ui" { "off" } else { logging::DEFAULT_FILTER };
    logging::init(default_filter);

    if let Err(err) = run(command, &args[args.len().min(2)..]) {
        match err.downcast_ref::<LedgerError>() {
            Some(ledger_err) if ledger_err.is_user_facing() => {
                eprintln!("❌ {}", ledger_err);
            }
            _ => eprintln!("❌ Error: {:#}", err),
        }
        std::process::exit(1);
    }
}

fn run(command: &str, rest: &[String]) -> Result<()> {
    let config = Config::from_env()?;

    match command {
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        "ui" => run_ui_mode(&config),
        _ => {
            let conn = open_database(&config.db_path)?;
            let mut ledger = load_ledger(&conn, &config.currency)?;
            run_ledger_command(command, rest, &config, &conn, &mut ledger)
        }
    }
}

fn run_ledger_command(
    command: &str,
    rest: &[String],
    config: &Config,
    conn: &Connection,
    ledger: &mut Ledger,
) -> Result<()> {
    debug!(command, args = rest.len(), "running command");

    match command {
        "add-person" => {
            let name = required(rest, 0, "name")?;
            if ledger.add_participant(name) {
                save_ledger(conn, ledger)?;
                insert_event(conn, &Event::participant_added(name.trim(), ACTOR))?;
                println!("✓ Added {}", name.trim());
            } else {
                println!(
                    "• {} was not added: blank, already in the group, or contains '{}'",
                    name.trim(),
                    NAME_LIST_SEPARATOR
                );
            }
        }
        "remove-person" => {
            let name = required(rest, 0, "name")?;
            if ledger.remove_participant(name)? {
                save_ledger(conn, ledger)?;
                insert_event(conn, &Event::participant_removed(name, ACTOR))?;
                println!("✓ Removed {}", name);
            } else {
                println!("• {} is not in the group", name);
            }
        }
        "payer" => {
            let name = required(rest, 0, "name")?;
            ledger.set_default_payer(name)?;
            save_ledger(conn, ledger)?;
            println!("✓ Default payer is now {}", name);
        }
        "add-expense" => {
            let draft = ExpenseDraft::from_args(rest)?;
            let id = draft.apply(ledger)?;
            save_ledger(conn, ledger)?;
            if let Some(expense) = ledger.expense(id) {
                insert_event(conn, &Event::expense_added(expense, ACTOR))?;
                println!(
                    "✓ {} - {} paid by {}, {} each",
                    expense.description,
                    format_money(ledger.currency(), expense.amount),
                    expense.payer,
                    format_money(ledger.currency(), expense.split_amount),
                );
            }
            println!("  id: {}", id);
        }
        "remove-expense" => {
            let id: ExpenseId = required(rest, 0, "expense id")?.parse()?;
            match ledger.remove_expense(id) {
                Some(expense) => {
                    save_ledger(conn, ledger)?;
                    insert_event(conn, &Event::expense_removed(&expense, ACTOR))?;
                    println!("✓ Removed {}", expense.description);
                }
                None => println!("• No expense with id {}", id),
            }
        }
        "people" => {
            if ledger.participants().is_empty() {
                println!("No participants yet.");
            }
            for name in ledger.participants() {
                let marker = if ledger.default_payer() == Some(name.as_str()) { "*" } else { " " };
                println!("{} {} ({} expense(s))", marker, name, ledger.reference_count(name));
            }
        }
        "expenses" => {
            if ledger.expenses().is_empty() {
                println!("No expenses recorded.");
            }
            for expense in ledger.expenses() {
                println!(
                    "{}  {:>12}  {:<12} {} [{}]",
                    expense.id,
                    format_money(ledger.currency(), expense.amount),
                    expense.payer,
                    expense.description,
                    expense.participants.join(", "),
                );
            }
        }
        "balances" => {
            let engine = config.engine();
            let balances = engine.balances(ledger.participants(), ledger.expenses());
            for balance in balances.iter() {
                println!(
                    "{:<16} {:>14}",
                    balance.participant,
                    format_money(ledger.currency(), balance.amount)
                );
            }
        }
        "settle" => {
            let engine = config.engine();
            let balances = engine.balances(ledger.participants(), ledger.expenses());
            let settlements = engine.settle(&balances);
            if settlements.is_empty() {
                println!("{}", split_ledger::SETTLED_MESSAGE);
            }
            for s in &settlements {
                println!(
                    "{} pays {} {}",
                    s.from,
                    s.to,
                    format_money(ledger.currency(), s.amount)
                );
            }
            if !engine.verify(&balances, &settlements) {
                warn!("settlement plan does not cover every balance");
            }
        }
        "summary" => {
            print!("{}", ledger_summary(ledger, &config.engine()));
        }
        "export-csv" => {
            let path = Path::new(required(rest, 0, "path")?);
            let count = export_expenses_csv(path, ledger.expenses())?;
            println!("✓ Exported {} expense(s) to {}", count, path.display());
        }
        "import-csv" => {
            let path = Path::new(required(rest, 0, "path")?);
            let report = import_expenses_csv(path, ledger)?;
            save_ledger(conn, ledger)?;
            for name in &report.participants_added {
                insert_event(conn, &Event::participant_added(name, ACTOR))?;
            }
            for id in &report.expense_ids {
                if let Some(expense) = ledger.expense(*id) {
                    insert_event(conn, &Event::expense_added(expense, ACTOR))?;
                }
            }
            println!(
                "✓ Imported {} expense(s), added {} participant(s)",
                report.expense_ids.len(),
                report.participants_added.len()
            );
        }
        "history" => {
            let limit = match rest.first() {
                Some(raw) => raw
                    .parse::<usize>()
                    .with_context(|| format!("history limit is not a number: {}", raw))?,
                None => 20,
            };
            for event in get_recent_events(conn, limit)? {
                println!(
                    "{}  {:<20} {:<12} {}",
                    event.timestamp.format("%Y-%m-%d %H:%M:%S"),
                    event.event_type,
                    event.actor,
                    event.entity_id
                );
            }
        }
        other => {
            print_usage();
            bail!("unknown command: {}", other);
        }
    }

    Ok(())
}

fn required<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    match args.get(index) {
        Some(value) => Ok(value.as_str()),
        None => Err(LedgerError::invalid_command(format!("missing {}", what)).into()),
    }
}

fn print_usage() {
    println!("split-ledger {}", split_ledger::VERSION);
    println!();
    println!("Usage: split-ledger <command> [args]");
    println!();
    println!("  add-person <name>                  names cannot contain ','");
    println!("  remove-person <name>");
    println!("  payer <name>                       set the default payer");
    println!("  add-expense <amount> <payer|-> <names|*> [description]");
    println!("                                     names are comma separated, * is everyone");
    println!("  remove-expense <id>");
    println!("  people | expenses | balances | settle | summary");
    println!("  export-csv <path>");
    println!("  import-csv <path>");
    println!("  history [n]");
    println!("  ui                                 interactive mode (default)");
}

#[cfg(feature = "tui")]
fn run_ui_mode(config: &Config) -> Result<()> {
    let conn = open_database(&config.db_path)?;
    let ledger = load_ledger(&conn, &config.currency)?;

    let mut app = ui::App::new(ledger, config.engine());
    ui::run_ui(&mut app, &conn)?;

    println!("✅ Ledger saved to {}", config.db_path.display());
    Ok(())
}

#[cfg(not(feature = "tui"))]
fn run_ui_mode(_config: &Config) -> Result<()> {
    eprintln!("❌ TUI mode not available!");
    eprintln!("   Rebuild with: cargo build --features tui");
    eprintln!("   Or use the API: cargo run --bin split-server --features server");
    std::process::exit(1);
}
