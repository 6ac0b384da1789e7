pub mod backend;
pub mod http_backend;
pub mod notifier;
pub mod search;
