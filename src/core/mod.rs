pub mod accept;
pub mod cgi;
pub mod children;
pub mod context;
pub mod glob;
pub mod idle;
pub mod mainloop;
pub mod read;
pub mod send;
pub mod signals;
pub mod signing;
pub mod slots;
pub mod throttle;
pub mod timers;

pub use cgi::*;
pub use children::ChildTable;
pub use context::Server;
pub use slots::SlotTable;
pub use throttle::{Throttle, ThrottleTable};
pub use timers::{TimerHandle, TimerKind, TimerWheel};
