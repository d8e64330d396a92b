pub mod commands;
pub mod delivery;
pub mod server;
pub mod session;

pub use commands::SmtpCommand;
pub use delivery::{EmailDeliveryClient, SmtpDeliveryClient};
pub use server::SmtpServer;
pub use session::SmtpSession;
