//! Pre-load validation: file checks and the machine-readable violation log.

pub mod report;
pub mod validator;

pub use report::{
    MISSING_PLACEHOLDER, VALIDATION_DELIMITER, ValidationReporter, ViolationReason,
};
pub use validator::{FileValidator, ValidateError};
