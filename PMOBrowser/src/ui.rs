//! Interface terminal : liste des entrées, titre, indicateur de remontée et ligne d'état.

use std::io::{self, Stdout};
use std::time::{Duration, Instant};

use anyhow::Result;
use crossbeam_channel::Receiver;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use pmobrowser::{
    Activation, ApplicationLauncher, DeviceAvailable, DirectoryProtocol, DiscoveryListener,
    EntryKind, NavigationEngine, NavigationState,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph};
use tracing::{debug, warn};

const TICK_RATE: Duration = Duration::from_millis(200);
const HELP: &str = "↑/↓ déplacer · Entrée ouvrir · ⌫/u remonter · r rechercher · q quitter";

fn glyph(kind: EntryKind) -> &'static str {
    match kind {
        EntryKind::Server => "🖧",
        EntryKind::Folder => "📁",
        EntryKind::Audio => "♪",
        EntryKind::Image => "🖼",
        EntryKind::Video => "🎞",
        EntryKind::Unknown => "·",
    }
}

pub struct App<P, D, L>
where
    P: DirectoryProtocol,
    D: DiscoveryListener,
    L: ApplicationLauncher,
{
    engine: NavigationEngine<P, D, L>,
    devices: Receiver<DeviceAvailable>,
    selected: usize,
    status: Option<String>,
}

impl<P, D, L> App<P, D, L>
where
    P: DirectoryProtocol,
    D: DiscoveryListener,
    L: ApplicationLauncher,
{
    pub fn new(engine: NavigationEngine<P, D, L>, devices: Receiver<DeviceAvailable>) -> Self {
        Self {
            engine,
            devices,
            selected: 0,
            status: None,
        }
    }

    pub fn start_discovery(&mut self) {
        if let Err(err) = self.engine.start_discovery() {
            warn!("Discovery failed to start: {}", err);
            self.status = Some(err.to_string());
        }
    }

    pub fn shutdown(&mut self) {
        self.engine.stop_discovery();
    }

    /// Moves the servers reported by discovery into the engine.
    pub fn on_tick(&mut self) {
        for device in self.devices.try_iter() {
            self.engine.on_discovery_event(device);
        }
        self.clamp_selection();
    }

    fn clamp_selection(&mut self) {
        let len = self.engine.children().len();
        if self.selected >= len {
            self.selected = len.saturating_sub(1);
        }
    }

    /// Returns `true` when the user asked to quit.
    pub fn handle_key(&mut self, key: KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return false;
        }

        match key.code {
            KeyCode::Char('q') | KeyCode::Esc => return true,
            KeyCode::Up | KeyCode::Char('k') => {
                self.selected = self.selected.saturating_sub(1);
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if self.selected + 1 < self.engine.children().len() {
                    self.selected += 1;
                }
            }
            KeyCode::Enter => self.activate_selected(),
            KeyCode::Backspace | KeyCode::Left | KeyCode::Char('u') => self.go_up(),
            KeyCode::Char('r') => {
                self.status = match self.engine.restart_discovery() {
                    Ok(()) => Some("Recherche des serveurs…".to_string()),
                    Err(err) => Some(err.to_string()),
                };
            }
            _ => {}
        }
        false
    }

    fn activate_selected(&mut self) {
        let Some(entry) = self.engine.children().get(self.selected) else {
            return;
        };
        let label = entry.title().unwrap_or_default().to_string();

        match self.engine.activate(self.selected) {
            Ok(Activation::Entered) => {
                self.selected = 0;
                self.status = None;
            }
            Ok(Activation::Launched) => self.status = Some(format!("Ouverture de {label}")),
            Ok(Activation::Ignored) => {
                debug!(label = %label, "Nothing to do with this entry");
            }
            Err(err) => self.status = Some(err.to_string()),
        }
        self.clamp_selection();
    }

    fn go_up(&mut self) {
        if !self.engine.can_go_up() {
            return;
        }
        self.status = self.engine.go_up().err().map(|err| err.to_string());
        self.selected = 0;
    }

    pub fn draw(&self, f: &mut ratatui::Frame<'_>) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(3),
                Constraint::Min(3),
                Constraint::Length(1),
            ])
            .split(f.size());

        self.draw_header(f, chunks[0]);
        self.draw_entries(f, chunks[1]);
        self.draw_status_line(f, chunks[2]);
    }

    fn draw_header(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let up = if self.engine.can_go_up() {
            Span::styled("[↑] ", Style::default().fg(Color::Cyan))
        } else {
            Span::styled("[ ] ", Style::default().fg(Color::DarkGray))
        };
        let title = Span::styled(
            self.engine.title().to_string(),
            Style::default()
                .fg(Color::White)
                .add_modifier(Modifier::BOLD),
        );
        let header = Paragraph::new(Line::from(vec![up, title]))
            .block(Block::default().borders(Borders::ALL).title("PMOBrowser"));
        f.render_widget(header, area);
    }

    fn draw_entries(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let state = self.engine.state();
        let items: Vec<ListItem> = self
            .engine
            .children()
            .iter()
            .map(|entry| {
                let kind = EntryKind::in_listing(state, entry.class());
                let title = entry.title().unwrap_or("<sans titre>");
                ListItem::new(format!("{} {}", glyph(kind), title))
            })
            .collect();

        let empty_hint = match state {
            NavigationState::ServerList => "Aucun serveur pour l'instant",
            NavigationState::Browsing => "Dossier vide",
        };
        let block = Block::default().borders(Borders::ALL).title(if items.is_empty() {
            empty_hint
        } else {
            ""
        });

        let list = List::new(items)
            .block(block)
            .highlight_style(
                Style::default()
                    .fg(Color::Green)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▶ ");
        let mut list_state = ListState::default();
        if !self.engine.children().is_empty() {
            list_state.select(Some(self.selected));
        }
        f.render_stateful_widget(list, area, &mut list_state);
    }

    fn draw_status_line(&self, f: &mut ratatui::Frame<'_>, area: Rect) {
        let (text, color) = match &self.status {
            Some(status) => (status.as_str(), Color::Yellow),
            None => (HELP, Color::Gray),
        };
        f.render_widget(
            Paragraph::new(text).style(Style::default().fg(color)),
            area,
        );
    }
}

pub fn run_app<P, D, L>(mut app: App<P, D, L>) -> Result<()>
where
    P: DirectoryProtocol,
    D: DiscoveryListener,
    L: ApplicationLauncher,
{
    let terminal = setup_terminal()?;
    let mut guard = TerminalGuard { terminal };
    let mut last_tick = Instant::now();

    let result = (|| -> Result<()> {
        loop {
            guard.terminal.draw(|f| app.draw(f))?;

            let timeout = TICK_RATE
                .checked_sub(last_tick.elapsed())
                .unwrap_or_else(|| Duration::from_secs(0));

            if event::poll(timeout)? {
                if let Event::Key(key) = event::read()? {
                    if app.handle_key(key) {
                        break;
                    }
                }
            }

            if last_tick.elapsed() >= TICK_RATE {
                app.on_tick();
                last_tick = Instant::now();
            }
        }
        Ok(())
    })();

    app.shutdown();
    result
}

fn setup_terminal() -> Result<Terminal<CrosstermBackend<Stdout>>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend)?;
    Ok(terminal)
}

/// Restores the terminal, even when the loop bails out with an error.
pub fn restore_terminal() {
    let _ = disable_raw_mode();
    let _ = execute!(io::stdout(), LeaveAlternateScreen);
}

struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<Stdout>>,
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}
