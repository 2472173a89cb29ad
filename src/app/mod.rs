pub mod account;
pub mod cli;
pub mod request;
pub mod watch;

pub use account::{login, logout};
pub use request::run_request;
pub use watch::run_watch;
