pub mod auth;
pub mod db;
pub mod storage;

pub use auth::PasswordAuth;
pub use db::DbAdapter;
pub use storage::{build_s3_client, S3Store};
