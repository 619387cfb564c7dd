mod events;
mod handler;

pub use events::ChatEvent;
pub use handler::{split_chars, ChatHandler, ChatRoute, SimpleAnswer};
