//! # Worker Example
//!
//! Demonstrates cancellable custom effects:
//! - Starting a background worker with `Command::custom`
//! - Pushing progress messages through an `Outlet`
//! - Cooperative cancellation via `Command::cancel` and a `CancelToken`
//!
//! Press `w` to start the worker, `c` to cancel it mid-flight, `q` to quit.
//!
//! Run with: `cargo run --example worker`

use std::time::Duration;

use oolong::crossterm::event::KeyCode;
use oolong::ratatui::layout::{Constraint, Layout};
use oolong::ratatui::style::{Color, Style};
use oolong::ratatui::widgets::{Block, Borders, Gauge, Paragraph};
use oolong::ratatui::Frame;
use oolong::{CancelToken, Command, CommandHandle, CustomCommand, Model, Outlet, TerminalEvent};

struct App {
    progress: u16,
    running: Option<CommandHandle>,
    status: String,
}

#[derive(Debug)]
enum Msg {
    Start,
    Cancel,
    Progress(u16),
    Finished,
    Cancelled,
    Quit,
}

async fn crunch(outlet: Outlet<Msg>, token: CancelToken) {
    for pct in (0..=100).step_by(2) {
        if token.cancelled() {
            outlet.put(Msg::Cancelled);
            return;
        }
        outlet.put(Msg::Progress(pct));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    outlet.put(Msg::Finished);
}

impl Model for App {
    type Message = Msg;
    type Flags = ();

    fn init(_: ()) -> (Self, Command<Msg>) {
        (
            App {
                progress: 0,
                running: None,
                status: "press w to start".into(),
            },
            Command::none(),
        )
    }

    fn on_event(&self, event: TerminalEvent) -> Option<Msg> {
        match event.key()?.code {
            KeyCode::Char('w') => Some(Msg::Start),
            KeyCode::Char('c') => Some(Msg::Cancel),
            KeyCode::Char('q') | KeyCode::Esc => Some(Msg::Quit),
            _ => None,
        }
    }

    fn update(&mut self, msg: Msg) -> Command<Msg> {
        match msg {
            Msg::Start => {
                if self.running.is_some() {
                    return Command::none();
                }
                let task = CustomCommand::new(crunch).grace(Duration::from_secs(1));
                self.running = Some(task.handle());
                self.progress = 0;
                self.status = "crunching… press c to cancel".into();
                Command::custom(task)
            }
            Msg::Cancel => match self.running.take() {
                Some(handle) => Command::cancel(handle),
                None => Command::none(),
            },
            Msg::Progress(pct) => {
                self.progress = pct;
                Command::none()
            }
            Msg::Finished => {
                self.running = None;
                self.status = "done".into();
                Command::none()
            }
            Msg::Cancelled => {
                self.status = "cancelled".into();
                Command::none()
            }
            Msg::Quit => Command::exit(),
        }
    }

    fn view(&self, frame: &mut Frame) {
        let [gauge_area, status_area] =
            Layout::vertical([Constraint::Length(3), Constraint::Length(1)]).areas(frame.area());

        frame.render_widget(
            Gauge::default()
                .block(Block::default().borders(Borders::ALL).title(" worker "))
                .gauge_style(Style::default().fg(Color::Cyan))
                .percent(self.progress),
            gauge_area,
        );
        frame.render_widget(
            Paragraph::new(format!(" {} — w start  c cancel  q quit", self.status)),
            status_area,
        );
    }
}

#[oolong::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    oolong::run::<App>(()).await?;
    Ok(())
}
