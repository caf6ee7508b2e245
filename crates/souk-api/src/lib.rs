pub mod auth;
pub mod history;
pub mod middleware;
pub mod moderation;
pub mod notifications;
