pub mod subscriber;
pub mod user;

pub use subscriber::Subscriber;
pub use user::{NewUser, User};
