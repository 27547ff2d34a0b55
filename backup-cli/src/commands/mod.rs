mod auth;
mod backup;
mod schedule;
mod serve;

// Auth commands
pub use auth::{run_auth_callback, run_auth_revoke, run_auth_status, run_auth_url};

// Backup commands
pub use backup::{run_backup, run_disable, run_enable, run_history};

// Schedule commands
pub use schedule::{
    run_schedule_create, run_schedule_delete, run_schedule_edit, run_schedule_list,
};

// Serve command
pub use serve::run_serve;
