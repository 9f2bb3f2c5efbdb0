pub mod artifact;
pub mod config;
pub mod core_room;
pub mod engine;
pub mod identity;
pub mod logging;
pub mod metrics;
pub mod store;

pub use config::Config;
pub use engine::{EngineError, RoomEngine};
pub use logging::{init_logging, LogLevel};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        // Ensure the main exports are accessible
        let _ = LogLevel::Info;
        let _ = core_room::Role::Admin;
    }
}
