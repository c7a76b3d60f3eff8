/// Web server: single-page form plus JSON and CSV endpoints
pub mod server;

pub use server::{router, start_server, AppState, AskRequest};
