//! Startup reporting

pub mod logger;

pub use logger::StartupLogger;
