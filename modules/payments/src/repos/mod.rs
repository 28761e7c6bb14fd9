pub mod payment_repo;
pub mod payment_request_repo;
pub mod tenant_account_repo;
