pub mod backend_client;
pub mod drivers;
pub mod effect_runner;
pub mod session_service;
pub mod session_store;
