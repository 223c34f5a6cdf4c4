//! SQLite engine implementation

mod connection;
mod factory;

pub use connection::SqliteConnection;
pub use factory::SqliteConnectionFactory;
