pub mod event;
pub mod remove_lock;
