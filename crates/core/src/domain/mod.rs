pub mod conversation;
pub mod customer;
pub mod deal;
pub mod user;
