pub mod cycle;
pub mod notify;
pub mod run;
pub mod user;
