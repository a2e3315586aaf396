use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {0}")]
    Database(String),

    #[error("migration {0} is already recorded")]
    DuplicateMigration(String),

    #[error("migration {id} failed: {cause}")]
    MigrationFailed { id: String, cause: String },

    #[error("data migration {id} failed: {cause}")]
    DataMigrationFailed { id: String, cause: String },

    #[error("no rollback script found for migration {0}")]
    RollbackScriptNotFound(String),

    #[error("migration {0} has not been applied")]
    NotApplied(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}
