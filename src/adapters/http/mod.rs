pub mod app_error_impl;
pub mod app_state;
pub mod current_user;
pub mod routes;
