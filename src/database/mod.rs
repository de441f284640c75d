pub mod bootstrap;
pub mod script;

pub use bootstrap::{
    ensure_initialized, initialize_server, try_ensure_initialized, BootstrapError, BootstrapOutcome,
    Bootstrapper, MySqlTarget, Phase, SchemaTarget,
};
