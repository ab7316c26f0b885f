//! # Pipeline Example
//!
//! Demonstrates subprocess commands:
//! - `Command::system` for batch capture (run, collect, one result message)
//! - `Command::system_streaming` for line-by-line output as it is produced
//!
//! Press `b` to run a quick batch command, `s` to stream a slow one, `q` to
//! quit while the stream is still running — the runtime cancels in-flight
//! workers on exit.
//!
//! Run with: `cargo run --example pipeline`

use oolong::crossterm::event::KeyCode;
use oolong::ratatui::layout::{Constraint, Layout};
use oolong::ratatui::style::{Color, Style};
use oolong::ratatui::text::Line;
use oolong::ratatui::widgets::{Block, Borders, Paragraph};
use oolong::ratatui::Frame;
use oolong::{Command, Model, SystemEvent, SystemOutput, TerminalEvent};

struct Pipeline {
    log: Vec<String>,
    streaming: bool,
}

#[derive(Debug)]
enum Msg {
    RunBatch,
    RunStream,
    Batch(SystemOutput),
    Stream(SystemEvent),
    Quit,
}

impl Pipeline {
    fn push(&mut self, line: impl Into<String>) {
        self.log.push(line.into());
        let overflow = self.log.len().saturating_sub(200);
        if overflow > 0 {
            self.log.drain(..overflow);
        }
    }
}

impl Model for Pipeline {
    type Message = Msg;
    type Flags = ();

    fn init(_: ()) -> (Self, Command<Msg>) {
        (
            Pipeline {
                log: vec!["press b for batch, s for streaming".into()],
                streaming: false,
            },
            Command::none(),
        )
    }

    fn on_event(&self, event: TerminalEvent) -> Option<Msg> {
        match event.key()?.code {
            KeyCode::Char('b') => Some(Msg::RunBatch),
            KeyCode::Char('s') => Some(Msg::RunStream),
            KeyCode::Char('q') | KeyCode::Esc => Some(Msg::Quit),
            _ => None,
        }
    }

    fn update(&mut self, msg: Msg) -> Command<Msg> {
        match msg {
            Msg::RunBatch => {
                self.push("$ uname -a");
                Command::system("uname -a", Msg::Batch)
            }
            Msg::RunStream => {
                if self.streaming {
                    return Command::none();
                }
                self.streaming = true;
                self.push("$ for i in 1 2 3 4 5; do echo line $i; sleep 1; done");
                Command::system_streaming(
                    "for i in 1 2 3 4 5; do echo line $i; sleep 1; done",
                    Msg::Stream,
                )
            }
            Msg::Batch(output) => {
                for line in output.stdout.lines() {
                    self.push(line);
                }
                if output.status != 0 {
                    self.push(format!("exited with {}", output.status));
                }
                Command::none()
            }
            Msg::Stream(event) => {
                match event {
                    SystemEvent::Stdout(line) => self.push(line.trim_end().to_string()),
                    SystemEvent::Stderr(line) => self.push(format!("! {}", line.trim_end())),
                    SystemEvent::Completed { status } => {
                        self.streaming = false;
                        self.push(format!("stream done (status {status})"));
                    }
                    SystemEvent::Error { message } => {
                        self.streaming = false;
                        self.push(format!("spawn failed: {message}"));
                    }
                }
                Command::none()
            }
            Msg::Quit => Command::exit(),
        }
    }

    fn view(&self, frame: &mut Frame) {
        let [body, footer] =
            Layout::vertical([Constraint::Fill(1), Constraint::Length(1)]).areas(frame.area());

        let visible = body.height.saturating_sub(2) as usize;
        let start = self.log.len().saturating_sub(visible);
        let lines: Vec<Line> = self.log[start..].iter().map(|l| Line::raw(l.clone())).collect();
        frame.render_widget(
            Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title(" output ")),
            body,
        );

        let status = if self.streaming { "streaming…" } else { "idle" };
        frame.render_widget(
            Paragraph::new(format!(" b batch  s stream  q quit — {status}"))
                .style(Style::default().fg(Color::DarkGray)),
            footer,
        );
    }
}

#[oolong::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    oolong::run::<Pipeline>(()).await?;
    Ok(())
}
