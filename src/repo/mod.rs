/// Where apps come from: HTTP or directory catalogs.
pub mod catalog;
/// Staged installs, updates and removals.
pub mod client;
/// On-disk layout of the apps directory.
pub mod layout;
/// The ordered list of installed apps.
pub mod registry;
