pub mod activity;
pub mod format;
pub mod graph;
pub mod inactivity;
pub mod permissions;
pub mod setup_wizard;
pub mod stats;
pub mod time;
pub mod validation;
