//! Business logic services.

pub mod upload;
pub mod user;

pub use upload::UploadService;
pub use user::{InMemoryUserStore, UserRecord, UserService, UserStore};
