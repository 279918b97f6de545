pub mod basic_auth;
pub mod cookie;
pub mod http_date;
pub mod session;
pub mod set_cookie;

pub use basic_auth::*;
pub use cookie::*;
pub use http_date::*;
pub use session::*;
pub use set_cookie::*;