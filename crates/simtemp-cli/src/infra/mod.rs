pub mod event_log;
