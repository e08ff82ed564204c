pub mod health;
pub mod images;
pub mod session;
pub mod ui;
