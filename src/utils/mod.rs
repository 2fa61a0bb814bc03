pub mod error;
pub mod logger;
pub mod subscription;
pub mod validation;
