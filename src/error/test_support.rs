use super::{ConfigFileError, ConfigurationError, MetricsError, ValidationError};

impl From<&'static str> for ValidationError {
    fn from(message: &'static str) -> Self {
        ValidationError::TestExpectation { message }
    }
}

impl From<String> for ValidationError {
    fn from(value: String) -> Self {
        ValidationError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for ConfigFileError {
    fn from(message: &'static str) -> Self {
        ConfigFileError::TestExpectation { message }
    }
}

impl From<String> for ConfigFileError {
    fn from(value: String) -> Self {
        ConfigFileError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for MetricsError {
    fn from(message: &'static str) -> Self {
        MetricsError::TestExpectation { message }
    }
}

impl From<String> for MetricsError {
    fn from(value: String) -> Self {
        MetricsError::TestExpectationValue {
            message: "Test expectation failed",
            value,
        }
    }
}

impl From<&'static str> for ConfigurationError {
    fn from(message: &'static str) -> Self {
        ConfigurationError::TestExpectation { message }
    }
}
