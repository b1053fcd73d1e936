//! Shared configuration for perfgate.

pub mod config;

pub use config::{
  AuditConfig, BenchmarkConfig, Config, ConfigError, PublishConfig, ReportFormat, StorageConfig,
};
