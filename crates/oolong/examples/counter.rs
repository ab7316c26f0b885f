//! # Counter Example
//!
//! The smallest complete oolong application:
//! - Mapping key events to messages with `Model::on_event`
//! - Pure state updates in `Model::update`
//! - Exiting with `Command::exit`
//!
//! Run with: `cargo run --example counter`

use oolong::crossterm::event::KeyCode;
use oolong::ratatui::layout::Alignment;
use oolong::ratatui::style::{Color, Modifier, Style};
use oolong::ratatui::text::{Line, Span};
use oolong::ratatui::widgets::{Block, Borders, Paragraph};
use oolong::ratatui::Frame;
use oolong::{Command, Model, TerminalEvent};

struct Counter {
    count: i64,
}

#[derive(Debug)]
enum Msg {
    Increment,
    Decrement,
    Quit,
}

impl Model for Counter {
    type Message = Msg;
    type Flags = ();

    fn init(_: ()) -> (Self, Command<Msg>) {
        (Counter { count: 0 }, Command::none())
    }

    fn on_event(&self, event: TerminalEvent) -> Option<Msg> {
        match event.key()?.code {
            KeyCode::Char('+') | KeyCode::Up => Some(Msg::Increment),
            KeyCode::Char('-') | KeyCode::Down => Some(Msg::Decrement),
            KeyCode::Char('q') | KeyCode::Esc => Some(Msg::Quit),
            _ => None,
        }
    }

    fn update(&mut self, msg: Msg) -> Command<Msg> {
        match msg {
            Msg::Increment => {
                self.count += 1;
                Command::none()
            }
            Msg::Decrement => {
                self.count -= 1;
                Command::none()
            }
            Msg::Quit => Command::exit(),
        }
    }

    fn view(&self, frame: &mut Frame) {
        let body = Paragraph::new(Line::from(vec![
            Span::raw("Count: "),
            Span::styled(
                self.count.to_string(),
                Style::default()
                    .fg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            ),
        ]))
        .alignment(Alignment::Center)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .title(" counter — +/- to change, q to quit "),
        );
        frame.render_widget(body, frame.area());
    }
}

#[oolong::tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let final_model = oolong::run::<Counter>(()).await?;
    println!("final count: {}", final_model.count);
    Ok(())
}
