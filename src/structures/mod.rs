pub mod access;
pub mod auth;
pub mod chart;
pub mod entry;
pub mod errors;
pub mod form;
pub mod memory;
pub mod model;
pub mod notify;
pub mod session;
pub mod sites;
pub mod store;
