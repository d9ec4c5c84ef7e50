pub mod audit;
pub mod credential;
pub mod user;

pub use audit::AccessLogEntry;
pub use credential::TwoFactorCredential;
pub use user::{Group, User};
