pub mod coordinator_errors;
pub mod user_service_errors;
