pub mod auth;
pub mod content;
pub mod health;
pub mod subscription;
pub mod webhook;
