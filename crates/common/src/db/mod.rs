//! Database layer for RoboDigest
//!
//! Provides:
//! - SeaORM entity models
//! - `SeaStore`, the relational `Store` backend
//! - Connection pool management and schema bootstrap

pub mod models;
mod repository;

pub use repository::SeaStore;

use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use models::{ChannelEntity, JobEntity, NewsEntity, PaperColumn, PaperEntity, VideoColumn, VideoEntity};
use sea_orm::sea_query::{Index, IndexCreateStatement, IndexOrder, TableCreateStatement};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, EntityTrait, Schema};
use std::time::Duration;
use tracing::info;

/// Database connection pool wrapper
#[derive(Clone)]
pub struct DbPool {
    /// Primary connection (for writes)
    pub primary: DatabaseConnection,

    /// Read replica connection (optional)
    pub replica: Option<DatabaseConnection>,
}

impl DbPool {
    /// Create a new database pool from configuration
    pub async fn new(config: &DatabaseConfig) -> Result<Self> {
        info!("Connecting to primary database...");

        let primary = Self::connect(config, &config.url)
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Failed to connect to primary: {}", e),
            })?;

        let replica = match config.read_url {
            Some(ref read_url) => {
                info!("Connecting to read replica...");
                let conn = Self::connect(config, read_url)
                    .await
                    .map_err(|e| AppError::DatabaseConnection {
                        message: format!("Failed to connect to replica: {}", e),
                    })?;
                Some(conn)
            }
            None => None,
        };

        info!("Database connections established");

        Ok(Self { primary, replica })
    }

    async fn connect(config: &DatabaseConfig, url: &str) -> std::result::Result<DatabaseConnection, sea_orm::DbErr> {
        let mut opts = ConnectOptions::new(url);
        opts.max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .idle_timeout(Duration::from_secs(config.idle_timeout_secs))
            .sqlx_logging(config.sqlx_logging);
        Database::connect(opts).await
    }

    /// Wrap an already open connection
    pub fn from_connection(primary: DatabaseConnection) -> Self {
        Self {
            primary,
            replica: None,
        }
    }

    /// Get the connection for reads (replica if available, otherwise primary)
    pub fn read(&self) -> &DatabaseConnection {
        self.replica.as_ref().unwrap_or(&self.primary)
    }

    /// Get the connection for writes (always primary)
    pub fn write(&self) -> &DatabaseConnection {
        &self.primary
    }

    /// Ping the database to check connectivity
    pub async fn ping(&self) -> Result<()> {
        self.primary
            .execute_unprepared("SELECT 1")
            .await
            .map_err(|e| AppError::DatabaseConnection {
                message: format!("Primary ping failed: {}", e),
            })?;

        if let Some(ref replica) = self.replica {
            replica
                .execute_unprepared("SELECT 1")
                .await
                .map_err(|e| AppError::DatabaseConnection {
                    message: format!("Replica ping failed: {}", e),
                })?;
        }

        Ok(())
    }

    /// Create tables and secondary indexes when missing
    pub async fn bootstrap(&self) -> Result<()> {
        let conn = self.write();
        let backend = conn.get_database_backend();
        let schema = Schema::new(backend);

        let tables: [TableCreateStatement; 5] = [
            table(&schema, PaperEntity),
            table(&schema, NewsEntity),
            table(&schema, JobEntity),
            table(&schema, ChannelEntity),
            table(&schema, VideoEntity),
        ];
        for stmt in &tables {
            conn.execute(backend.build(stmt)).await?;
        }

        let indexes: [IndexCreateStatement; 2] = [
            Index::create()
                .if_not_exists()
                .name("idx_papers_category_publish_date")
                .table(PaperEntity)
                .col(PaperColumn::Category)
                .col((PaperColumn::PublishDate, IndexOrder::Desc))
                .to_owned(),
            Index::create()
                .if_not_exists()
                .name("idx_videos_uid_pubdate")
                .table(VideoEntity)
                .col(VideoColumn::Uid)
                .col((VideoColumn::Pubdate, IndexOrder::Desc))
                .to_owned(),
        ];
        for stmt in &indexes {
            conn.execute(backend.build(stmt)).await?;
        }

        info!("Database schema ready");
        Ok(())
    }
}

fn table<E: EntityTrait>(schema: &Schema, entity: E) -> TableCreateStatement {
    schema.create_table_from_entity(entity).if_not_exists().to_owned()
}
