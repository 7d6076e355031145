pub mod alert;
pub mod cleanup;
pub mod quota_service;
pub mod scheduler;
