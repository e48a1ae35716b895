pub mod agent;
pub mod command;
pub mod console;
pub mod device;
pub mod event;
pub mod principal;
pub mod profile;
pub mod timestamp;
