pub mod auth_service;
pub mod path_store;
pub mod translate_service;
