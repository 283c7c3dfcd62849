//! tidechat entry point: argument parsing, config resolution, terminal
//! setup, and the main event loop.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen,
};
use futures_util::StreamExt;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use tidechat::channel::{self, ChannelConfig, ChannelHandle, ChannelIdentity, ReconnectPolicy};
use tidechat::config::ResolvedConfig;
use tidechat::model::{ConversationKey, Lifecycle, UserId, UserRef};
use tidechat::rest::RestClient;
use tidechat::state::{Session, SessionMsg};
use tidechat::timeline::{self, TimelineItem};
use tidechat::view::{self, AppView};
use tidechat::view_state::{
    ConversationView, ItemIndex, RestoreOutcome, ScrollPosition, VirtualLayout,
    ANCHOR_TOP_GAP_ROWS,
};

/// Terminal client for a real-time chat server
#[derive(Parser, Debug)]
#[command(name = "tidechat")]
#[command(version)]
#[command(about = "Terminal chat client with optimistic sends and live updates")]
struct Args {
    /// Bearer token for the chat server
    #[arg(long, env = "TIDECHAT_TOKEN")]
    token: String,

    /// Authenticated user id
    #[arg(long, env = "TIDECHAT_USER_ID")]
    user_id: String,

    /// Display name announced to the server
    #[arg(long, env = "TIDECHAT_USERNAME")]
    username: String,

    /// REST base URL (overrides config file)
    #[arg(long)]
    server_url: Option<String>,

    /// WebSocket channel URL (overrides config file)
    #[arg(long)]
    channel_url: Option<String>,

    /// Path for tracing output (overrides config file)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Path to configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Precedence: defaults, config file, env vars, CLI flags.
    let config = {
        let config_file = tidechat::config::load_config_with_precedence(args.config.clone())?;
        let merged = tidechat::config::merge_config(config_file);
        let with_env = tidechat::config::apply_env_overrides(merged);
        tidechat::config::apply_cli_overrides(
            with_env,
            args.server_url.clone(),
            args.channel_url.clone(),
            args.log_file.clone(),
        )
    };

    tidechat::logging::init(&config.log_file_path)?;
    info!(config = ?config, "configuration resolved");

    let local_user = UserRef::new(UserId::new(args.user_id.clone())?, args.username.clone());

    let api = Arc::new(RestClient::new(
        config.server_url.clone(),
        args.token.clone(),
        local_user.id.clone(),
    ));
    let (channel_handle, notices, channel_task) = channel::spawn(ChannelConfig {
        url: config.channel_url.clone(),
        identity: ChannelIdentity {
            user: local_user.clone(),
            token: args.token.clone(),
        },
        policy: ReconnectPolicy::new(
            config.reconnect_base_ms,
            config.reconnect_max_ms,
            config.reconnect_max_attempts,
        ),
    });

    let (msg_tx, msg_rx) = mpsc::channel(64);
    let mut session = Session::new(
        api,
        local_user,
        msg_tx,
        config.page_size,
        Duration::from_millis(config.anchor_deadline_ms),
    );
    session.hydrate_open();

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;

    let result = run_app(
        &mut terminal,
        session,
        msg_rx,
        notices,
        channel_handle,
        &config,
    )
    .await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;
    channel_task.abort();

    result
}

/// Whether the loop keeps going after a key press.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

/// Mutable UI state owned by the main loop.
struct App {
    session: Session,
    items: Vec<TimelineItem>,
    layout: VirtualLayout,
    scroll: ScrollPosition,
    input: String,
    show_pinned: bool,
    last_revision: u64,
    last_viewport: u16,
    channel: ChannelHandle,
    hour_band_threshold: usize,
    bottom_proximity_rows: usize,
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    session: Session,
    mut msg_rx: mpsc::Receiver<SessionMsg>,
    mut notices: mpsc::Receiver<channel::ChannelNotice>,
    channel_handle: ChannelHandle,
    config: &ResolvedConfig,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut revision_watch = session.store().subscribe();
    let mut app = App {
        session,
        items: Vec::new(),
        layout: VirtualLayout::new(config.estimate_rows),
        scroll: ScrollPosition::default(),
        input: String::new(),
        show_pinned: false,
        last_revision: 0,
        last_viewport: 0,
        channel: channel_handle.clone(),
        hour_band_threshold: config.hour_band_threshold,
        bottom_proximity_rows: config.bottom_proximity_rows,
    };
    let mut events = EventStream::new();
    let mut tick = tokio::time::interval(Duration::from_millis(250));

    loop {
        app.refresh_timeline();
        app.draw(terminal)?;

        tokio::select! {
            event = events.next() => match event {
                Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                    if app.handle_key(key).await == Flow::Quit {
                        break;
                    }
                }
                Some(Ok(_)) => {} // resize redraws on the next pass
                Some(Err(e)) => {
                    warn!(error = %e, "terminal event stream error");
                    break;
                }
                None => break,
            },
            msg = msg_rx.recv() => {
                if let Some(msg) = msg {
                    app.session.handle_message(Instant::now(), msg);
                }
            }
            notice = notices.recv() => {
                if let Some(notice) = notice {
                    app.session.handle_channel(Instant::now(), notice);
                }
            }
            changed = revision_watch.changed() => {
                // Wake to rebuild; refresh_timeline picks up the revision.
                if changed.is_err() {
                    break;
                }
            }
            _ = tick.tick() => {
                app.session.tick(Instant::now());
            }
        }

        let layout = &app.layout;
        if let Some(outcome) = app
            .session
            .poll_restore(Instant::now(), |id| layout.index_of(&format!("msg:{id}")))
        {
            app.scroll = restored_scroll(outcome);
        }
    }

    channel_handle.shutdown().await;
    Ok(())
}

/// Translate a finished scroll restore into a position.
fn restored_scroll(outcome: RestoreOutcome) -> ScrollPosition {
    match outcome {
        RestoreOutcome::Bottom => ScrollPosition::Bottom,
        RestoreOutcome::AnchorFound { index } => ScrollPosition::AtItem {
            index: ItemIndex::new(index),
            offset_rows: ANCHOR_TOP_GAP_ROWS,
        },
        RestoreOutcome::FallbackOffset(offset) => ScrollPosition::AtRow(offset),
    }
}

impl App {
    /// Rebuild the banded timeline when the store revision moved.
    fn refresh_timeline(&mut self) {
        let revision = self.session.store().revision();
        if revision == self.last_revision {
            return;
        }
        self.last_revision = revision;
        let messages = self.session.store().messages(self.session.open());
        self.items = timeline::band_with_threshold(&messages, self.hour_band_threshold);
        self.layout.reconcile(&self.items);
    }

    /// Measure the viewport's worth of rows, report visibility, and draw.
    fn draw(
        &mut self,
        terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    ) -> io::Result<()> {
        let size = terminal.size()?;
        let viewport = view::timeline_rows(size.height);
        self.last_viewport = viewport;
        let width = view::timeline_width(size.width, self.show_pinned);

        let offset = self.scroll.resolve(&self.layout, viewport);
        for index in self.layout.visible_range(offset, viewport) {
            let height = view::measure_item(&self.items[index], width);
            self.layout.record_measured(index, height);
        }
        self.layout.flush();

        // Re-resolve after measurement so the anchor follows its item.
        let offset = self.scroll.resolve(&self.layout, viewport);
        let range = self.layout.visible_range(offset, viewport);
        self.session.report_visible_range(&self.items, range.clone());
        self.capture_view(offset, viewport, range);

        terminal.draw(|frame| {
            view::render(
                frame,
                &AppView {
                    items: &self.items,
                    layout: &self.layout,
                    scroll_offset: offset,
                    session: &self.session,
                    input: &self.input,
                    show_pinned: self.show_pinned,
                },
            );
        })?;
        Ok(())
    }

    fn capture_view(&mut self, offset: usize, viewport: u16, range: std::ops::Range<usize>) {
        let anchor = self.items[range].iter().find_map(|item| match item {
            TimelineItem::Message(m) => Some(m.id().clone()),
            _ => None,
        });
        let at_bottom = self.scroll.is_bottom()
            || offset + self.bottom_proximity_rows >= self.layout.max_scroll(viewport);
        self.session.capture_view(
            Instant::now(),
            ConversationView {
                scroll_offset: offset,
                anchor,
                at_bottom,
            },
        );
    }

    async fn handle_key(&mut self, key: KeyEvent) -> Flow {
        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('c') => return Flow::Quit,
                KeyCode::Char('r') => self.retry_last_failed(),
                KeyCode::Char('p') => self.show_pinned = !self.show_pinned,
                _ => {}
            }
            return Flow::Continue;
        }
        match key.code {
            KeyCode::Esc => return Flow::Quit,
            KeyCode::Enter => self.submit_input().await,
            KeyCode::Backspace => {
                self.input.pop();
            }
            KeyCode::Char(c) => self.input.push(c),
            KeyCode::Up => self.scroll_by(-1),
            KeyCode::Down => self.scroll_by(1),
            KeyCode::PageUp => self.scroll_by(-20),
            KeyCode::PageDown => self.scroll_by(20),
            KeyCode::Home => self.scroll = ScrollPosition::Top,
            KeyCode::End => self.scroll = ScrollPosition::Bottom,
            _ => {}
        }
        Flow::Continue
    }

    /// Relative scrolling, re-pinning to the bottom when it gets there.
    fn scroll_by(&mut self, delta: i64) {
        let viewport = self.last_viewport.max(1);
        let current = self.scroll.resolve(&self.layout, viewport);
        let next = if delta.is_negative() {
            current.saturating_sub(delta.unsigned_abs() as usize)
        } else {
            current.saturating_add(delta as usize)
        };
        self.scroll = if next >= self.layout.max_scroll(viewport) {
            ScrollPosition::Bottom
        } else {
            ScrollPosition::AtRow(next)
        };
    }

    /// Enter: slash commands switch conversations, anything else sends.
    async fn submit_input(&mut self) {
        let text = self.input.trim().to_string();
        if text.is_empty() {
            return;
        }
        if let Some(peer) = text.strip_prefix("/dm ") {
            match UserId::new(peer.trim()) {
                Ok(peer) => {
                    self.open(ConversationKey::Private(peer.clone())).await;
                    self.channel.join_room(peer.as_str()).await;
                    self.input.clear();
                }
                Err(e) => warn!(error = %e, "bad /dm target"),
            }
            return;
        }
        if text == "/general" {
            self.open(ConversationKey::Shared).await;
            self.input.clear();
            return;
        }
        match self.session.send(Some(text), None) {
            Ok(_) => {
                self.input.clear();
                self.scroll = ScrollPosition::Bottom;
            }
            Err(e) => warn!(error = %e, "draft rejected"),
        }
    }

    async fn open(&mut self, key: ConversationKey) {
        let departing = self.departing_view();
        if let Some(outcome) =
            self.session
                .open_conversation(Instant::now(), key, Some(departing))
        {
            self.scroll = restored_scroll(outcome);
        }
        // Force a rebuild even if the revision has not moved yet.
        self.last_revision = u64::MAX;
        self.refresh_timeline();
    }

    fn departing_view(&self) -> ConversationView {
        let viewport = self.last_viewport.max(1);
        let offset = self.scroll.resolve(&self.layout, viewport);
        let anchor = self
            .layout
            .visible_range(offset, viewport)
            .filter_map(|index| match &self.items[index] {
                TimelineItem::Message(m) => Some(m.id().clone()),
                _ => None,
            })
            .next();
        ConversationView {
            scroll_offset: offset,
            anchor,
            at_bottom: self.scroll.is_bottom(),
        }
    }

    /// Ctrl+R: retry the newest failed send in the open conversation.
    fn retry_last_failed(&mut self) {
        let messages = self.session.store().messages(self.session.open());
        let failed = messages
            .iter()
            .rev()
            .find(|m| m.lifecycle() == Lifecycle::Failed)
            .map(|m| m.id().clone());
        if let Some(id) = failed {
            self.session.retry_send(&id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn help_does_not_error() {
        let result = Args::try_parse_from(["tidechat", "--help"]);
        let err = result.expect_err("help exits via error path");
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }

    #[test]
    fn credentials_are_required() {
        let result = Args::try_parse_from(["tidechat"]);
        assert!(result.is_err(), "token, user id, and username are required");
    }

    #[test]
    fn url_flags_are_optional_overrides() {
        let args = Args::parse_from([
            "tidechat",
            "--token",
            "tok",
            "--user-id",
            "u-1",
            "--username",
            "ada",
        ]);
        assert_eq!(args.server_url, None);
        assert_eq!(args.channel_url, None);
        assert_eq!(args.config, None);
    }

    #[test]
    fn overrides_parse_into_their_fields() {
        let args = Args::parse_from([
            "tidechat",
            "--token",
            "tok",
            "--user-id",
            "u-1",
            "--username",
            "ada",
            "--server-url",
            "https://chat.example",
            "--channel-url",
            "wss://chat.example/ws",
            "--config",
            "/tmp/tidechat.toml",
        ]);
        assert_eq!(args.server_url.as_deref(), Some("https://chat.example"));
        assert_eq!(args.channel_url.as_deref(), Some("wss://chat.example/ws"));
        assert_eq!(args.config, Some(PathBuf::from("/tmp/tidechat.toml")));
    }

    #[test]
    fn restored_scroll_maps_every_outcome() {
        assert_eq!(restored_scroll(RestoreOutcome::Bottom), ScrollPosition::Bottom);
        assert_eq!(
            restored_scroll(RestoreOutcome::FallbackOffset(9)),
            ScrollPosition::AtRow(9)
        );
        assert_eq!(
            restored_scroll(RestoreOutcome::AnchorFound { index: 4 }),
            ScrollPosition::AtItem {
                index: ItemIndex::new(4),
                offset_rows: ANCHOR_TOP_GAP_ROWS,
            }
        );
    }
}
