use crate::*;
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum ValidationError {
    #[error("wal_file_path must not be empty")]
    MissingWalPath,

    #[error("queue_url must not be empty")]
    MissingQueueUrl,

    #[error("consumer_group must not be empty")]
    MissingConsumerGroup,

    #[error("snapshot_interval_seconds must be positive")]
    InvalidSnapshotInterval,

    #[error("snapshot_depth must be positive")]
    InvalidSnapshotDepth,

    #[error("database_url is set but empty; omit the field instead of setting it to \"\"")]
    EmptyDatabaseUrl,
}

#[derive(Debug, Clone)]
pub struct ValidationWarning {
    pub field: String,
    pub message: String,
}

#[derive(Debug, Clone)]
pub struct DefaultApplied {
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Default)]
pub struct ValidationReport {
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    pub defaults_applied: Vec<DefaultApplied>,
}

impl ValidationReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn add_error(&mut self, error: ValidationError) {
        self.errors.push(error);
    }

    pub fn add_warning(&mut self, field: &str, message: &str) {
        self.warnings.push(ValidationWarning {
            field: field.to_string(),
            message: message.to_string(),
        });
    }
}

pub fn validate_config(config: &MasterConfig) -> ValidationReport {
    let mut report = ValidationReport::new();

    if config.wal_file_path.trim().is_empty() {
        report.add_error(ValidationError::MissingWalPath);
    }
    if config.queue_url.trim().is_empty() {
        report.add_error(ValidationError::MissingQueueUrl);
    }
    if config.consumer_group.trim().is_empty() {
        report.add_error(ValidationError::MissingConsumerGroup);
    }
    if config.snapshot_interval_seconds == 0 {
        report.add_error(ValidationError::InvalidSnapshotInterval);
    }
    if config.snapshot_depth == 0 {
        report.add_error(ValidationError::InvalidSnapshotDepth);
    }
    if let Some(db) = &config.database_url {
        if db.trim().is_empty() {
            report.add_error(ValidationError::EmptyDatabaseUrl);
        }
    } else {
        report.add_warning(
            "database_url",
            "no relational store configured; query-side reads will be unavailable",
        );
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = MasterConfig::default();
        let report = validate_config(&config);
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn empty_wal_path_is_rejected() {
        let mut config = MasterConfig::default();
        config.wal_file_path = "".to_string();
        let report = validate_config(&config);
        assert!(!report.is_valid());
    }

    #[test]
    fn zero_snapshot_interval_is_rejected() {
        let mut config = MasterConfig::default();
        config.snapshot_interval_seconds = 0;
        let report = validate_config(&config);
        assert!(!report.is_valid());
    }
}
