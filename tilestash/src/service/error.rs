//! Service error types.

use crate::convert::ConvertError;
use crate::store::StoreError;
use std::fmt;
use std::io;
use std::net::SocketAddr;

/// Errors that can occur while wiring or running the service.
#[derive(Debug)]
pub enum ServiceError {
    /// Invalid configuration
    ConfigError(String),
    /// Record store could not be opened
    StoreError(StoreError),
    /// Configured converter could not be built
    ConverterError(ConvertError),
    /// Listener could not be bound
    BindError { addr: SocketAddr, source: io::Error },
    /// I/O error (directories, serving)
    IoError(io::Error),
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
            Self::StoreError(e) => write!(f, "Record store error: {}", e),
            Self::ConverterError(e) => write!(f, "Converter error: {}", e),
            Self::BindError { addr, source } => {
                write!(f, "Failed to listen on {}: {}", addr, source)
            }
            Self::IoError(e) => write!(f, "I/O error: {}", e),
        }
    }
}

impl std::error::Error for ServiceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::StoreError(e) => Some(e),
            Self::ConverterError(e) => Some(e),
            Self::BindError { source, .. } => Some(source),
            Self::IoError(e) => Some(e),
            Self::ConfigError(_) => None,
        }
    }
}

impl From<StoreError> for ServiceError {
    fn from(e: StoreError) -> Self {
        Self::StoreError(e)
    }
}

impl From<ConvertError> for ServiceError {
    fn from(e: ConvertError) -> Self {
        Self::ConverterError(e)
    }
}

impl From<io::Error> for ServiceError {
    fn from(e: io::Error) -> Self {
        Self::IoError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    #[test]
    fn test_display() {
        let err = ServiceError::ConfigError("bad bind".to_string());
        assert_eq!(err.to_string(), "Configuration error: bad bind");

        let err = ServiceError::BindError {
            addr: "127.0.0.1:3000".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        assert_eq!(err.to_string(), "Failed to listen on 127.0.0.1:3000: in use");
        assert!(err.source().is_some());
    }

    #[test]
    fn test_from_convert_error() {
        let err: ServiceError = ConvertError::permanent("no {dest}").into();
        assert!(matches!(err, ServiceError::ConverterError(_)));
    }
}
