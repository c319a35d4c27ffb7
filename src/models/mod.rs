pub mod audit;
pub mod booking;
pub mod driver;
pub mod event;
