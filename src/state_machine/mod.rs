mod item;
mod state;

pub use item::{Item, ItemRun, TaskOutcome, discover};
pub use state::{Event, ItemState, StateMachine, Transition};
