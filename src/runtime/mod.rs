/// The [`AppRuntime`](app_runtime::AppRuntime) facade.
pub mod app_runtime;
/// Per-app config persistence.
pub mod config_store;
