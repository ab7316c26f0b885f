//! **oolong** — a Model-View-Update TUI framework for [`ratatui`].
//!
//! This is the umbrella crate that re-exports everything you need to build
//! an oolong application from a single dependency:
//!
//! ```toml
//! [dependencies]
//! oolong = "0.1"
//! ```
//!
//! # Re-exports
//!
//! * All public items from [`oolong_core`] are available at the crate root
//!   ([`Model`], [`Command`], [`Component`], [`Router`], [`Program`],
//!   [`run`], [`run_with`], etc.).
//! * [`ratatui`], [`crossterm`], and [`tokio`] are re-exported so downstream
//!   crates do not need to depend on them directly.
//!
//! # Quick start
//!
//! ```ignore
//! use oolong::{Command, Model};
//! use ratatui::Frame;
//! use ratatui::widgets::Paragraph;
//!
//! struct Hello;
//! enum Msg {}
//!
//! impl Model for Hello {
//!     type Message = Msg;
//!     type Flags = ();
//!
//!     fn init(_: ()) -> (Self, Command<Msg>) {
//!         (Hello, Command::none())
//!     }
//!     fn update(&mut self, msg: Msg) -> Command<Msg> {
//!         match msg {}
//!     }
//!     fn view(&self, frame: &mut Frame) {
//!         frame.render_widget(Paragraph::new("Hello, oolong!"), frame.area());
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     oolong::run::<Hello>(()).await.unwrap();
//! }
//! ```

pub use oolong_core::*;

// Re-export dependencies for use in examples and downstream crates
pub use crossterm;
pub use ratatui;
pub use tokio;
