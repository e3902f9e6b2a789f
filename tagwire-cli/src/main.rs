use std::io::{self, Write};
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType},
};
use tokio::sync::mpsc;

use tagwire_transport::{ClientConfig, RelaySession, ServerEvent, TransportError};

const DEFAULT_SERVER: &str = "wss://127.0.0.1:8080";
const LOG_LINES: usize = 12;
const ENVELOPE_PREVIEW: usize = 40;

#[derive(Debug, Parser)]
#[command(name = "tagwire")]
#[command(about = "Terminal client for the tagwire relay")]
struct Args {
    /// Relay URL
    #[arg(long, default_value = DEFAULT_SERVER)]
    server: String,

    /// Name to register as
    #[arg(long)]
    user: String,

    /// Participant to talk to
    #[arg(long)]
    peer: String,

    /// Allow ws:// (localhost development only)
    #[arg(long)]
    insecure_dev: bool,
}

enum Outgoing {
    Send { to: String, text: String },
    Tamper { to: String, envelope: String },
}

enum AppEvent {
    Relay(ServerEvent),
    Failed(String),
    Disconnected,
}

struct App {
    user: String,
    peer: String,
    server: String,
    log: Vec<String>,
    input: String,
    status: String,
    last_envelope: Option<String>,
    last_draw: Instant,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = ClientConfig::new(args.server.clone(), args.user.clone());
    if args.insecure_dev {
        config = config.with_insecure_dev();
    }

    let session = match RelaySession::connect(config).await {
        Ok(session) => session,
        Err(TransportError::InsecureUrl) => {
            eprintln!("ERROR: ws:// is only allowed with --insecure-dev on localhost.");
            return Ok(());
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            return Ok(());
        }
    };

    let mut app = App::new(args.user, args.peer, args.server);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, Clear(ClearType::All), cursor::Hide)?;

    if let Err(e) = app.run(session).await {
        app.log.push(format!("Error: {}", e));
    }

    disable_raw_mode()?;
    execute!(stdout, cursor::Show)?;
    println!("\nSession ended.");
    Ok(())
}

impl App {
    async fn run(&mut self, mut session: RelaySession) -> Result<(), Box<dyn std::error::Error>> {
        let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(32);
        let (net_tx, mut net_rx) = mpsc::channel::<Outgoing>(32);

        // Networking task - owns the session
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    cmd = net_rx.recv() => {
                        let result = match cmd {
                            Some(Outgoing::Send { to, text }) => session.send_text(&to, &text).await,
                            Some(Outgoing::Tamper { to, envelope }) => session.tamper(&to, &envelope).await,
                            None => break,
                        };
                        if let Err(e) = result {
                            let _ = event_tx.send(AppEvent::Failed(e.to_string())).await;
                        }
                    }
                    event = session.recv() => {
                        match event {
                            Ok(event) => {
                                let _ = event_tx.send(AppEvent::Relay(event)).await;
                            }
                            Err(TransportError::UnexpectedFrame) => continue,
                            Err(_) => {
                                let _ = event_tx.send(AppEvent::Disconnected).await;
                                break;
                            }
                        }
                    }
                }
            }
            session.close().await;
        });

        self.log.push(format!("Relay: {}", self.server));
        self.log.push(format!("Registered as {}; talking to {}", self.user, self.peer));
        self.log.push("Commands: /to <name>, /tamper <envelope>, /flip, Esc to quit".to_string());

        loop {
            if Instant::now().duration_since(self.last_draw) > Duration::from_millis(50) {
                self.draw()?;
                self.last_draw = Instant::now();
            }

            tokio::select! {
                Some(event) = event_rx.recv() => {
                    if !self.handle_event(event) {
                        self.draw()?;
                        return Ok(());
                    }
                }
                Ok(Ok(true)) = tokio::task::spawn_blocking(|| event::poll(Duration::from_millis(10))) => {
                    if let Event::Key(key) = event::read()? {
                        if key.kind != KeyEventKind::Press {
                            continue;
                        }
                        match key.code {
                            KeyCode::Enter => {
                                let line = std::mem::take(&mut self.input);
                                if let Some(cmd) = self.parse_input(line.trim()) {
                                    let _ = net_tx.send(cmd).await;
                                }
                            }
                            KeyCode::Char(c) => self.input.push(c),
                            KeyCode::Backspace => { self.input.pop(); }
                            KeyCode::Esc => return Ok(()),
                            _ => {}
                        }
                    }
                }
            }
        }
    }

    fn new(user: String, peer: String, server: String) -> Self {
        Self {
            user,
            peer,
            server,
            log: Vec::new(),
            input: String::new(),
            status: "CONNECTED".to_string(),
            last_envelope: None,
            last_draw: Instant::now(),
        }
    }

    fn parse_input(&mut self, line: &str) -> Option<Outgoing> {
        if line.is_empty() {
            return None;
        }
        if let Some(name) = command_arg(line, "/to") {
            if name.is_empty() {
                self.log.push("Usage: /to <name>".to_string());
                return None;
            }
            self.peer = name.to_string();
            self.log.push(format!("Now talking to {}", self.peer));
            return None;
        }
        if let Some(envelope) = command_arg(line, "/tamper") {
            if envelope.is_empty() {
                self.log.push("Usage: /tamper <envelope>".to_string());
                return None;
            }
            return Some(Outgoing::Tamper {
                to: self.peer.clone(),
                envelope: envelope.to_string(),
            });
        }
        if line == "/flip" {
            // Replace the first character of the last envelope we sent
            let Some(wire) = self.last_envelope.as_deref() else {
                self.log.push("Nothing sent yet.".to_string());
                return None;
            };
            let first = if wire.starts_with('A') { 'B' } else { 'A' };
            let flipped: String = std::iter::once(first).chain(wire.chars().skip(1)).collect();
            return Some(Outgoing::Tamper {
                to: self.peer.clone(),
                envelope: flipped,
            });
        }
        Some(Outgoing::Send {
            to: self.peer.clone(),
            text: line.to_string(),
        })
    }

    /// Returns false once the connection is gone.
    fn handle_event(&mut self, event: AppEvent) -> bool {
        match event {
            AppEvent::Relay(ServerEvent::StatusUpdate { msg }) => {
                self.log.push(format!("* {}", msg));
            }
            AppEvent::Relay(ServerEvent::SendSuccess {
                original_message,
                encrypted_message,
                decryption_status,
            }) => {
                self.log.push(format!("You: {}", original_message));
                self.log.push(format!(
                    "  envelope {} ({})",
                    preview(&encrypted_message),
                    decryption_status
                ));
                self.last_envelope = Some(encrypted_message);
            }
            AppEvent::Relay(ServerEvent::NewMessage {
                sender,
                integrity_verified,
                decrypted_message,
                status,
                ..
            }) => match decrypted_message {
                Some(text) if integrity_verified => {
                    self.log.push(format!("{}: {}  [verified]", sender, text));
                }
                _ => {
                    self.log.push(format!(
                        "!! Message from {} FAILED integrity check ({}). Not shown.",
                        sender,
                        status.describe()
                    ));
                }
            },
            AppEvent::Relay(ServerEvent::TamperResult {
                integrity_verified,
                decrypted_message,
                status,
            }) => {
                if integrity_verified {
                    self.log.push(format!(
                        "Tamper check: envelope VERIFIED, decrypts to {:?}",
                        decrypted_message.unwrap_or_default()
                    ));
                } else {
                    self.log.push(format!("Tamper check: rejected ({})", status.describe()));
                }
            }
            AppEvent::Failed(reason) => self.log.push(format!("Not sent: {}", reason)),
            AppEvent::Disconnected => {
                self.status = "DISCONNECTED".to_string();
                self.log.push("Relay connection lost.".to_string());
                return false;
            }
        }
        true
    }

    fn draw(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        execute!(stdout, cursor::MoveTo(0, 0))?;

        println!("tagwire | {} -> {}", self.user, self.peer);
        println!("Status: {:<30}", self.status);
        println!("{}", "=".repeat(60));

        for i in 0..LOG_LINES {
            execute!(stdout, cursor::MoveTo(0, 3 + i as u16))?;
            execute!(stdout, Clear(ClearType::CurrentLine))?;
            if let Some(line) = self.log.get(self.log.len().saturating_sub(LOG_LINES) + i) {
                println!("{}", line);
            }
        }

        execute!(stdout, cursor::MoveTo(0, 3 + LOG_LINES as u16))?;
        println!("{}", "-".repeat(60));
        execute!(stdout, Clear(ClearType::CurrentLine))?;
        print!("> {}", self.input);
        stdout.flush()?;
        Ok(())
    }
}

/// Argument of `command` if `line` invokes it, trimmed. `None` otherwise.
fn command_arg<'a>(line: &'a str, command: &str) -> Option<&'a str> {
    let rest = line.strip_prefix(command)?;
    if rest.is_empty() {
        Some(rest)
    } else if rest.starts_with(char::is_whitespace) {
        Some(rest.trim())
    } else {
        None
    }
}

fn preview(envelope: &str) -> String {
    if envelope.len() > ENVELOPE_PREVIEW {
        format!("{}...", &envelope[..ENVELOPE_PREVIEW])
    } else {
        envelope.to_string()
    }
}
