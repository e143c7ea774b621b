pub mod activity;
pub mod credentials;
pub mod token;
