// 🖥️ Split Ledger TUI - People / Expenses / Balances
//
// Normal mode:  Tab page, j/k move, a add, d delete, p set payer, q quit
// Input mode:   type, Enter submit, Esc cancel
//
// Mutations queue audit events; the run loop saves after each one.

use anyhow::Result;
use crossterm::{
    event::{self, Event as TermEvent, KeyCode, KeyEventKind, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Paragraph, Row, Table, TableState},
    Frame, Terminal,
};
use rusqlite::Connection;
use std::io;
use tracing::warn;

use split_ledger::{
    format_money, insert_event, save_ledger, Balances, Event, ExpenseDraft, Ledger, Settlement,
    SettlementEngine, NAME_LIST_SEPARATOR, SETTLED_MESSAGE,
};

const ACTOR: &str = "tui";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    People,
    Expenses,
    Balances,
}

impl Page {
    pub fn next(&self) -> Self {
        match self {
            Page::People => Page::Expenses,
            Page::Expenses => Page::Balances,
            Page::Balances => Page::People,
        }
    }

    pub fn previous(&self) -> Self {
        match self {
            Page::People => Page::Balances,
            Page::Expenses => Page::People,
            Page::Balances => Page::Expenses,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            Page::People => "People",
            Page::Expenses => "Expenses",
            Page::Balances => "Balances",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Normal,
    AddPerson,
    AddExpense,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusMessage {
    pub text: String,
    pub is_error: bool,
}

pub struct App {
    pub ledger: Ledger,
    pub engine: SettlementEngine,
    pub current_page: Page,
    pub state: TableState,
    pub input_mode: InputMode,
    pub input: String,
    pub status: Option<StatusMessage>,
    /// Audit events not yet written; non-empty means the ledger changed.
    pub pending_events: Vec<Event>,
}

impl App {
    pub fn new(ledger: Ledger, engine: SettlementEngine) -> Self {
        let mut state = TableState::default();
        if !ledger.participants().is_empty() {
            state.select(Some(0));
        }

        Self {
            ledger,
            engine,
            current_page: Page::People,
            state,
            input_mode: InputMode::Normal,
            input: String::new(),
            status: None,
            pending_events: Vec::new(),
        }
    }

    pub fn balances(&self) -> Balances {
        self.engine
            .balances(self.ledger.participants(), self.ledger.expenses())
    }

    pub fn settlements(&self) -> Vec<Settlement> {
        self.engine.settle(&self.balances())
    }

    /// Number of selectable rows on the current page.
    pub fn row_count(&self) -> usize {
        match self.current_page {
            Page::People => self.ledger.participants().len(),
            Page::Expenses => self.ledger.expenses().len(),
            Page::Balances => self.balances().len(),
        }
    }

    pub fn next_page(&mut self) {
        self.switch_page(self.current_page.next());
    }

    pub fn previous_page(&mut self) {
        self.switch_page(self.current_page.previous());
    }

    fn switch_page(&mut self, page: Page) {
        self.current_page = page;
        let selected = if self.row_count() == 0 { None } else { Some(0) };
        self.state.select(selected);
    }

    pub fn next(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(i) if i + 1 < len => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        let len = self.row_count();
        if len == 0 {
            return;
        }
        let i = match self.state.selected() {
            Some(0) | None => len - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Keep the selection inside the current page after rows disappear.
    fn clamp_selection(&mut self) {
        let len = self.row_count();
        match self.state.selected() {
            _ if len == 0 => self.state.select(None),
            Some(i) if i >= len => self.state.select(Some(len - 1)),
            None => self.state.select(Some(0)),
            _ => {}
        }
    }

    /// Enter input mode for whatever the current page adds.
    pub fn start_input(&mut self) {
        self.input_mode = match self.current_page {
            Page::People => InputMode::AddPerson,
            Page::Expenses => InputMode::AddExpense,
            Page::Balances => return,
        };
        self.input.clear();
        self.status = None;
    }

    pub fn cancel_input(&mut self) {
        self.input_mode = InputMode::Normal;
        self.input.clear();
    }

    pub fn submit_input(&mut self) {
        let line = std::mem::take(&mut self.input);
        let mode = self.input_mode;
        self.input_mode = InputMode::Normal;

        match mode {
            InputMode::Normal => {}
            InputMode::AddPerson => {
                let name = line.trim();
                if self.ledger.add_participant(name) {
                    self.pending_events
                        .push(Event::participant_added(name, ACTOR));
                    self.info(format!("Added {}", name));
                } else if name.is_empty() {
                    self.error("Name cannot be blank".to_string());
                } else if name.contains(NAME_LIST_SEPARATOR) {
                    self.error(format!("Names cannot contain '{}'", NAME_LIST_SEPARATOR));
                } else {
                    self.error(format!("{} is already in the group", name));
                }
            }
            InputMode::AddExpense => {
                let recorded = ExpenseDraft::parse(&line).and_then(|draft| draft.apply(&mut self.ledger));
                match recorded {
                    Ok(id) => {
                        if let Some(expense) = self.ledger.expense(id) {
                            let text = format!(
                                "Recorded {} ({} each)",
                                expense.description,
                                format_money(self.ledger.currency(), expense.split_amount)
                            );
                            self.pending_events
                                .push(Event::expense_added(expense, ACTOR));
                            self.info(text);
                        }
                    }
                    Err(err) => self.error(err.to_string()),
                }
            }
        }
        self.clamp_selection();
    }

    /// Delete the selected person or expense.
    pub fn delete_selected(&mut self) {
        let Some(index) = self.state.selected() else {
            return;
        };

        match self.current_page {
            Page::People => {
                let Some(name) = self.ledger.participants().get(index).cloned() else {
                    return;
                };
                match self.ledger.remove_participant(&name) {
                    Ok(true) => {
                        self.pending_events
                            .push(Event::participant_removed(&name, ACTOR));
                        self.info(format!("Removed {}", name));
                    }
                    Ok(false) => {}
                    Err(err) => self.error(err.to_string()),
                }
            }
            Page::Expenses => {
                let Some(id) = self.ledger.expenses().get(index).map(|e| e.id) else {
                    return;
                };
                if let Some(expense) = self.ledger.remove_expense(id) {
                    self.pending_events
                        .push(Event::expense_removed(&expense, ACTOR));
                    self.info(format!("Removed {}", expense.description));
                }
            }
            Page::Balances => {}
        }
        self.clamp_selection();
    }

    /// Make the selected person the default payer.
    pub fn set_selected_payer(&mut self) {
        if self.current_page != Page::People {
            return;
        }
        let Some(name) = self
            .state
            .selected()
            .and_then(|i| self.ledger.participants().get(i).cloned())
        else {
            return;
        };

        match self.ledger.set_default_payer(&name) {
            Ok(()) => self.info(format!("{} now pays by default", name)),
            Err(err) => self.error(err.to_string()),
        }
    }

    fn info(&mut self, text: String) {
        self.status = Some(StatusMessage { text, is_error: false });
    }

    fn error(&mut self, text: String) {
        warn!(error = %text, "rejected");
        self.status = Some(StatusMessage { text, is_error: true });
    }
}

/// Write the ledger and any queued events.
fn persist(conn: &Connection, app: &mut App) -> Result<()> {
    save_ledger(conn, &app.ledger)?;
    for event in app.pending_events.drain(..) {
        insert_event(conn, &event)?;
    }
    Ok(())
}

pub fn run_ui(app: &mut App, conn: &Connection) -> Result<()> {
    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let res = run_app(&mut terminal, app, conn);

    // Restore terminal
    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
    conn: &Connection,
) -> Result<()> {
    loop {
        terminal.draw(|f| ui(f, app))?;

        let TermEvent::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if app.input_mode != InputMode::Normal {
            match key.code {
                KeyCode::Enter => app.submit_input(),
                KeyCode::Esc => app.cancel_input(),
                KeyCode::Backspace => {
                    app.input.pop();
                }
                KeyCode::Char(c) => app.input.push(c),
                _ => {}
            }
        } else {
            match key.code {
                KeyCode::Char('q') | KeyCode::Esc => return Ok(()),
                KeyCode::Tab => app.next_page(),
                KeyCode::BackTab => app.previous_page(),
                KeyCode::Char('a') => app.start_input(),
                KeyCode::Char('d') | KeyCode::Delete => app.delete_selected(),
                KeyCode::Char('p') => app.set_selected_payer(),
                KeyCode::Down | KeyCode::Char('j') => app.next(),
                KeyCode::Up | KeyCode::Char('k') => app.previous(),
                KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                    return Ok(())
                }
                _ => {}
            }
        }

        // Payer changes queue no event but still need saving
        if !app.pending_events.is_empty() || key.code == KeyCode::Char('p') {
            persist(conn, app)?;
        }
    }
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Header with navigation
            Constraint::Min(0),    // Content area
            Constraint::Length(3), // Input line
            Constraint::Length(3), // Status bar
        ])
        .split(f.size());

    render_header(f, chunks[0], app);

    match app.current_page {
        Page::People => render_people(f, chunks[1], app),
        Page::Expenses => render_expenses(f, chunks[1], app),
        Page::Balances => render_balances(f, chunks[1], app),
    }

    render_input(f, chunks[2], app);
    render_status_bar(f, chunks[3], app);
}

fn render_header(f: &mut Frame, area: Rect, app: &App) {
    let pages = [Page::People, Page::Expenses, Page::Balances];

    let mut tab_spans = vec![];
    for (i, page) in pages.iter().enumerate() {
        if i > 0 {
            tab_spans.push(Span::raw(" │ "));
        }

        let style = if *page == app.current_page {
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
        } else {
            Style::default().fg(Color::DarkGray)
        };

        tab_spans.push(Span::styled(page.title().to_string(), style));
    }

    tab_spans.push(Span::raw("  |  "));
    tab_spans.push(Span::styled(
        format!("Total: {}", format_money(app.ledger.currency(), app.ledger.total_spent())),
        Style::default().fg(Color::White),
    ));
    if let Some(payer) = app.ledger.default_payer() {
        tab_spans.push(Span::raw("  |  "));
        tab_spans.push(Span::styled(
            format!("Payer: {}", payer),
            Style::default().fg(Color::Green),
        ));
    }

    let header = Paragraph::new(vec![Line::from(tab_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::Cyan)),
    );

    f.render_widget(header, area);
}

fn header_row(titles: &[&'static str]) -> Row<'static> {
    let cells = titles.iter().map(|h| {
        Cell::from(*h).style(
            Style::default()
                .fg(Color::Yellow)
                .add_modifier(Modifier::BOLD),
        )
    });

    Row::new(cells)
        .style(Style::default().bg(Color::DarkGray))
        .height(1)
}

fn titled_block(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::White))
        .title(format!(" {} ", title))
}

fn highlight() -> Style {
    Style::default()
        .bg(Color::DarkGray)
        .add_modifier(Modifier::BOLD)
}

fn render_people(f: &mut Frame, area: Rect, app: &mut App) {
    let balances = app.balances();
    let currency = app.ledger.currency().to_string();

    let rows: Vec<Row> = app
        .ledger
        .participants()
        .iter()
        .map(|name| {
            let payer = if app.ledger.default_payer() == Some(name.as_str()) { "★" } else { "" };
            let amount = balances.get(name).unwrap_or_default();
            Row::new(vec![
                Cell::from(payer),
                Cell::from(name.clone()),
                Cell::from(app.ledger.reference_count(name).to_string()),
                Cell::from(format_money(&currency, amount))
                    .style(Style::default().fg(amount_color(amount, app.engine.threshold))),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(3),
            Constraint::Length(24),
            Constraint::Length(10),
            Constraint::Length(16),
        ],
    )
    .header(header_row(&["", "Name", "Expenses", "Balance"]))
    .block(titled_block("People"))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_expenses(f: &mut Frame, area: Rect, app: &mut App) {
    let currency = app.ledger.currency().to_string();

    let rows: Vec<Row> = app
        .ledger
        .expenses()
        .iter()
        .map(|expense| {
            Row::new(vec![
                Cell::from(truncate(&expense.description, 28)),
                Cell::from(format_money(&currency, expense.amount)),
                Cell::from(expense.payer.clone()),
                Cell::from(truncate(&expense.participants.join(", "), 30)),
                Cell::from(format_money(&currency, expense.split_amount)),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(30),
            Constraint::Length(14),
            Constraint::Length(14),
            Constraint::Length(32),
            Constraint::Length(14),
        ],
    )
    .header(header_row(&["Description", "Amount", "Paid by", "Split between", "Each"]))
    .block(titled_block("Expenses"))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_balances(f: &mut Frame, area: Rect, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
        .split(area);

    let balances = app.balances();
    let settlements = app.engine.settle(&balances);
    let currency = app.ledger.currency().to_string();
    let threshold = app.engine.threshold;

    let rows: Vec<Row> = balances
        .iter()
        .map(|b| {
            let label = if b.amount >= threshold {
                "gets back"
            } else if b.amount <= -threshold {
                "owes"
            } else {
                "settled"
            };
            Row::new(vec![
                Cell::from(b.participant.clone()),
                Cell::from(format_money(&currency, b.amount.abs()))
                    .style(Style::default().fg(amount_color(b.amount, threshold))),
                Cell::from(label),
            ])
        })
        .collect();

    let table = Table::new(
        rows,
        [
            Constraint::Length(20),
            Constraint::Length(16),
            Constraint::Length(10),
        ],
    )
    .header(header_row(&["Name", "Amount", ""]))
    .block(titled_block("Balances"))
    .highlight_style(highlight())
    .highlight_symbol("→ ");

    f.render_stateful_widget(table, chunks[0], &mut app.state);

    let lines: Vec<Line> = if settlements.is_empty() {
        vec![Line::from(Span::styled(
            SETTLED_MESSAGE,
            Style::default().fg(Color::Green),
        ))]
    } else {
        settlements
            .iter()
            .map(|s| {
                Line::from(vec![
                    Span::styled(s.from.clone(), Style::default().fg(Color::Red)),
                    Span::raw(" pays "),
                    Span::styled(s.to.clone(), Style::default().fg(Color::Green)),
                    Span::raw(" "),
                    Span::styled(
                        format_money(&currency, s.amount),
                        Style::default().add_modifier(Modifier::BOLD),
                    ),
                ])
            })
            .collect()
    };

    let plan = Paragraph::new(lines).block(titled_block("Settle up"));
    f.render_widget(plan, chunks[1]);
}

fn render_input(f: &mut Frame, area: Rect, app: &App) {
    let (title, hint) = match app.input_mode {
        InputMode::Normal => (" Input ", ""),
        InputMode::AddPerson => (" New person ", "name"),
        InputMode::AddExpense => (" New expense ", "<amount> <payer|-> <names|*> [description]"),
    };

    let content = if app.input_mode == InputMode::Normal {
        Line::from(Span::styled(
            "press a to add",
            Style::default().fg(Color::DarkGray),
        ))
    } else if app.input.is_empty() {
        Line::from(Span::styled(hint, Style::default().fg(Color::DarkGray)))
    } else {
        Line::from(Span::raw(app.input.clone()))
    };

    let border = if app.input_mode == InputMode::Normal {
        Color::White
    } else {
        Color::Yellow
    };

    let input = Paragraph::new(vec![content]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(border))
            .title(title),
    );
    f.render_widget(input, area);
}

fn render_status_bar(f: &mut Frame, area: Rect, app: &App) {
    let selected = app.state.selected().map(|i| i + 1).unwrap_or(0);

    let mut status_spans = vec![Span::styled(
        format!(" Row: {}/{} ", selected, app.row_count()),
        Style::default().fg(Color::Cyan),
    )];

    if let Some(status) = &app.status {
        let color = if status.is_error { Color::Red } else { Color::Green };
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled(status.text.clone(), Style::default().fg(color)));
    } else {
        status_spans.push(Span::raw(" | "));
        status_spans.push(Span::styled("Tab", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Page | "));
        status_spans.push(Span::styled("a", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Add | "));
        status_spans.push(Span::styled("d", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Delete | "));
        status_spans.push(Span::styled("p", Style::default().fg(Color::Yellow)));
        status_spans.push(Span::raw(" Payer | "));
        status_spans.push(Span::styled("q", Style::default().fg(Color::Red)));
        status_spans.push(Span::raw(" Quit"));
    }

    let status_bar = Paragraph::new(vec![Line::from(status_spans)]).block(
        Block::default()
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );

    f.render_widget(status_bar, area);
}

fn amount_color(amount: rust_decimal::Decimal, threshold: rust_decimal::Decimal) -> Color {
    if amount >= threshold {
        Color::Green
    } else if amount <= -threshold {
        Color::Red
    } else {
        Color::White
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}
