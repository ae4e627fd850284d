mod order;
pub use order::*;

mod snapshot;
pub use snapshot::*;

mod inventory;
pub use inventory::*;

mod events;
pub use events::*;

mod target;
pub use target::*;

mod retry;
pub use retry::*;

#[allow(clippy::module_inception)]
mod listener;
pub use listener::*;
