pub mod health_handlers;
pub mod markdown_handlers;
pub mod photo_handlers;
pub mod signed_handlers;
