pub mod health_handlers;
pub mod quota_handlers;
