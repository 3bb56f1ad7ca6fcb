//! Controller actions, one module per controller

pub mod home;
pub mod pages;
pub mod users;
