//! strand-storage: OpenDAL operators for the memory, fs, and S3 backends

pub mod health;
pub mod operator;

pub use health::check_health;
pub use operator::{build_operator, build_s3_operator, S3Credentials};
