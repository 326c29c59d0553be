//! App state and main loop: input handling, draining server messages into the store, and drawing.

use std::{io, time::Duration};

use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    Terminal,
};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tokio::time::sleep;
use tracing::{info, warn};

use iosmon::flame::{node_at, thread_list, FlameView};
use iosmon::persist::ThemeMode;
use iosmon::state::{ConnectionStatus, MonitorMode, PerfState};
use iosmon::types::Inbound;
use iosmon::ws::{ClientConfig, WsClient};

use crate::ui::detailed::draw_detailed;
use crate::ui::devices::known_devices;
use crate::ui::flame::visible_frames;
use crate::ui::header::{draw_footer, draw_header};
use crate::ui::overview::draw_overview;
use crate::ui::processes::{draw_processes, sorted_pids, ProcSortBy};
use crate::ui::theme::Palette;

const OVERVIEW_HINTS: &str = "q quit | Tab view | s start/stop | D device | c callstack \
| x stackshot | g refresh | R reconnect";
const DETAILED_HINTS: &str = "q quit | Tab view | s start/stop | t thread | +/- zoom \
| r reset | Up/Down select | Enter focus | R reconnect";
const PROCESS_HINTS: &str = "q quit | Tab view | s start/stop | Up/Down select | o sort \
| R reconnect";

pub struct AppOptions {
    pub url: String,
    pub device: Option<String>,
    pub target_process: Option<String>,
    pub stackshot: bool,
    pub theme: ThemeMode,
    pub client: ClientConfig,
}

pub struct App {
    state: PerfState,
    client: WsClient,
    flame_view: FlameView,
    proc_sort: ProcSortBy,
    proc_selected: usize,
    palette: Palette,

    // Requested on the command line; monitoring starts as soon as we connect.
    autostart_device: Option<String>,
    target_process: Option<String>,
    // Picked with `D`; wins over everything else when starting.
    selected_device: Option<String>,

    notice: Option<String>,
    should_quit: bool,
}

impl App {
    pub fn new(opts: AppOptions) -> Self {
        let mut state = PerfState::new(opts.url);
        state.enable_stackshot = opts.stackshot;
        Self {
            state,
            client: WsClient::new(opts.client),
            flame_view: FlameView::default(),
            proc_sort: ProcSortBy::default(),
            proc_selected: 0,
            palette: Palette::for_mode(opts.theme),
            autostart_device: opts.device,
            target_process: opts.target_process,
            selected_device: None,
            notice: None,
            should_quit: false,
        }
    }

    pub async fn run(&mut self) -> anyhow::Result<()> {
        let mut messages = self.client.on_message();
        let mut statuses = self.client.on_status_change();

        self.spawn_connect();

        // Terminal setup
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let mut terminal = Terminal::new(backend)?;
        terminal.clear()?;

        let res = self
            .event_loop(&mut terminal, &mut messages, &mut statuses)
            .await;

        if self.state.is_monitoring {
            self.client.stop_monitoring();
        }
        self.client.disconnect();

        // Teardown
        disable_raw_mode()?;
        execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
        terminal.show_cursor()?;

        res
    }

    async fn event_loop<B: ratatui::backend::Backend>(
        &mut self,
        terminal: &mut Terminal<B>,
        messages: &mut broadcast::Receiver<Inbound>,
        statuses: &mut broadcast::Receiver<ConnectionStatus>,
    ) -> anyhow::Result<()> {
        loop {
            // Input (non-blocking)
            while event::poll(Duration::from_millis(10))? {
                if let Event::Key(k) = event::read()? {
                    if k.kind == KeyEventKind::Press {
                        self.handle_key(k);
                    }
                }
            }
            if self.should_quit {
                break;
            }

            self.drain(messages, statuses);

            terminal.draw(|f| self.draw(f))?;
            sleep(Duration::from_millis(100)).await;
        }
        Ok(())
    }

    fn drain(
        &mut self,
        messages: &mut broadcast::Receiver<Inbound>,
        statuses: &mut broadcast::Receiver<ConnectionStatus>,
    ) {
        loop {
            match statuses.try_recv() {
                Ok(s) => self.on_status(s),
                Err(TryRecvError::Lagged(n)) => warn!("missed {n} status updates"),
                Err(_) => break,
            }
        }
        loop {
            match messages.try_recv() {
                Ok(msg) => self.on_message(&msg),
                Err(TryRecvError::Lagged(n)) => warn!("ui fell behind, skipped {n} messages"),
                Err(_) => break,
            }
        }
    }

    fn on_status(&mut self, status: ConnectionStatus) {
        self.state.set_connection_status(status);
        match status {
            ConnectionStatus::Connected => {
                self.request_server_info();
                if let Some(udid) = self.autostart_device.clone() {
                    self.start_monitoring(&udid);
                }
            }
            ConnectionStatus::Disconnected => self.state.mark_disconnected(),
            ConnectionStatus::Connecting | ConnectionStatus::Error => {}
        }
    }

    fn on_message(&mut self, msg: &Inbound) {
        self.state.apply(msg);
        match msg {
            Inbound::Error { message } => self.notice = Some(format!("server: {message}")),
            Inbound::Callstack(_) => {
                // A fresh tree can be smaller than the one the cursor walked.
                let n = visible_frames(&self.state, &self.flame_view)
                    .map(|(_, frames)| frames.len())
                    .unwrap_or(0);
                self.flame_view.cursor = self.flame_view.cursor.min(n.saturating_sub(1));
            }
            _ => {}
        }
    }

    /// Open the socket in the background. The transport reports progress on the status channel.
    fn spawn_connect(&self) {
        let Ok(rt) = tokio::runtime::Handle::try_current() else {
            warn!("no async runtime, cannot connect");
            return;
        };
        let client = self.client.clone();
        let url = self.state.ws_url.clone();
        rt.spawn(async move {
            if let Err(e) = client.connect(&url).await {
                warn!("connection to {url} failed: {e}");
            }
        });
    }

    fn reconnect(&mut self) {
        if self.state.connection_status == ConnectionStatus::Connected {
            self.notice = Some("already connected".into());
            return;
        }
        info!("manual reconnect to {}", self.state.ws_url);
        self.notice = Some(format!("reconnecting to {}", self.state.ws_url));
        self.spawn_connect();
    }

    /// Step through every device the server has told us about.
    fn cycle_device(&mut self) {
        let devices = known_devices(&self.state);
        if devices.is_empty() {
            self.notice = Some("no device known yet (press g to refresh)".into());
            return;
        }
        let next = self
            .selected_device
            .as_ref()
            .and_then(|cur| devices.iter().position(|d| d == cur))
            .map_or(0, |i| (i + 1) % devices.len());
        let udid = devices[next].clone();
        self.notice = Some(format!("device: {udid} (s to start)"));
        self.selected_device = Some(udid);
    }

    fn request_server_info(&self) {
        self.client.get_stats();
        self.client.list_devices();
        self.client.list_focused_processes();
    }

    /// Device picked with `D`, else explicit `--device`, else the device we last monitored,
    /// else the first one the server knows.
    fn pick_device(&self) -> Option<String> {
        self.selected_device
            .clone()
            .or_else(|| self.autostart_device.clone())
            .or_else(|| self.state.device_id.clone())
            .or_else(|| {
                self.state
                    .configured_devices
                    .iter()
                    .find(|d| d.is_active)
                    .or(self.state.configured_devices.first())
                    .map(|d| d.udid.clone())
            })
            .or_else(|| {
                self.state
                    .server_stats
                    .as_ref()
                    .and_then(|s| s.devices.keys().next().cloned())
            })
    }

    fn start_monitoring(&mut self, udid: &str) {
        let msg = self
            .state
            .begin_monitoring(udid, self.target_process.as_deref());
        self.flame_view = FlameView::default();
        self.proc_selected = 0;
        info!("starting monitoring on {udid}");
        self.client.send(&msg);
        self.notice = None;
    }

    fn toggle_monitoring(&mut self) {
        if self.state.connection_status != ConnectionStatus::Connected {
            self.notice = Some("not connected".into());
            return;
        }
        if self.state.is_monitoring {
            self.client.stop_monitoring();
            return;
        }
        match self.pick_device() {
            Some(udid) => self.start_monitoring(&udid),
            None => self.notice = Some("no device known yet (press g to refresh)".into()),
        }
    }

    fn handle_key(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => {
                self.should_quit = true;
                return;
            }
            KeyCode::Tab => {
                self.state.monitor_mode = self.state.monitor_mode.next();
                return;
            }
            KeyCode::Char('s') => {
                self.toggle_monitoring();
                return;
            }
            KeyCode::Char('c') => {
                self.state.enable_stackshot = !self.state.enable_stackshot;
                self.notice = Some(format!(
                    "call-stack capture {} (applies on next start)",
                    if self.state.enable_stackshot { "on" } else { "off" }
                ));
                return;
            }
            KeyCode::Char('x') => {
                match self.state.device_id.clone().or_else(|| self.pick_device()) {
                    Some(udid) => self.client.trigger_stackshot(&udid),
                    None => self.notice = Some("no device to stackshot".into()),
                }
                return;
            }
            KeyCode::Char('g') => {
                self.request_server_info();
                return;
            }
            KeyCode::Char('R') => {
                self.reconnect();
                return;
            }
            KeyCode::Char('D') => {
                self.cycle_device();
                return;
            }
            _ => {}
        }

        match self.state.monitor_mode {
            MonitorMode::Detailed => self.handle_flame_key(k),
            MonitorMode::Process => self.handle_process_key(k),
            MonitorMode::Overview => {}
        }
    }

    fn handle_flame_key(&mut self, k: KeyEvent) {
        match k.code {
            KeyCode::Char('t') => {
                let threads = match self.state.flame.as_ref() {
                    Some(d) => thread_list(Some(&d.root), &d.thread_stats),
                    None => Vec::new(),
                };
                self.flame_view.cycle_thread(&threads);
            }
            KeyCode::Char('+') | KeyCode::Char('=') => self.flame_view.zoom_in(),
            KeyCode::Char('-') => self.flame_view.zoom_out(),
            KeyCode::Char('r') => self.flame_view.reset(),
            KeyCode::Up => self.flame_view.cursor = self.flame_view.cursor.saturating_sub(1),
            KeyCode::Down => {
                let n = visible_frames(&self.state, &self.flame_view)
                    .map(|(_, frames)| frames.len())
                    .unwrap_or(0);
                if self.flame_view.cursor + 1 < n {
                    self.flame_view.cursor += 1;
                }
            }
            KeyCode::Enter => {
                let Some((root, frames)) = visible_frames(&self.state, &self.flame_view) else {
                    return;
                };
                let picked = frames
                    .get(self.flame_view.cursor)
                    .and_then(|fr| node_at(&root, &fr.path))
                    .cloned();
                if let Some(node) = picked {
                    self.flame_view.toggle_focus(&node);
                }
            }
            _ => {}
        }
    }

    fn handle_process_key(&mut self, k: KeyEvent) {
        let pids = sorted_pids(&self.state, self.proc_sort);
        match k.code {
            KeyCode::Up => self.proc_selected = self.proc_selected.saturating_sub(1),
            KeyCode::Down => {
                if self.proc_selected + 1 < pids.len() {
                    self.proc_selected += 1;
                }
            }
            KeyCode::Home => self.proc_selected = 0,
            KeyCode::End => self.proc_selected = pids.len().saturating_sub(1),
            KeyCode::Char('o') => {
                self.proc_sort = self.proc_sort.next();
                return;
            }
            _ => return,
        }
        self.state.selected_process_pid = pids.get(self.proc_selected).copied();
    }

    fn key_hints(&self) -> &'static str {
        match self.state.monitor_mode {
            MonitorMode::Overview => OVERVIEW_HINTS,
            MonitorMode::Detailed => DETAILED_HINTS,
            MonitorMode::Process => PROCESS_HINTS,
        }
    }

    pub fn draw(&mut self, f: &mut ratatui::Frame<'_>) {
        let area = f.area();
        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(2), // header
                Constraint::Min(8),    // body
                Constraint::Length(1), // key hints
            ])
            .split(area);

        let pal = self.palette;
        draw_header(f, rows[0], &self.state, self.notice.as_deref(), &pal);

        match self.state.monitor_mode {
            MonitorMode::Overview => draw_overview(
                f,
                rows[1],
                &self.state,
                self.selected_device.as_deref(),
                &pal,
            ),
            MonitorMode::Detailed => draw_detailed(f, rows[1], &self.state, &self.flame_view, &pal),
            MonitorMode::Process => {
                let pids = sorted_pids(&self.state, self.proc_sort);
                // Keep the highlight on the same pid when the order changes underneath it.
                if let Some(i) = self
                    .state
                    .selected_process_pid
                    .and_then(|sel| pids.iter().position(|p| *p == sel))
                {
                    self.proc_selected = i;
                }
                self.proc_selected = self.proc_selected.min(pids.len().saturating_sub(1));
                draw_processes(
                    f,
                    rows[1],
                    &self.state,
                    &pids,
                    self.proc_selected,
                    self.proc_sort,
                    &pal,
                );
            }
        }

        draw_footer(f, rows[2], self.key_hints(), &pal);
    }
}
