pub mod bot_files;
pub mod bot_logs;
pub mod bots;
