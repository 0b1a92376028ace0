use crate::error::{AppError, ErrorKind};
use std::sync::Arc;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToastLevel {
    Info,
    Warning,
    Error,
}

/// User-facing notification sink.
pub trait Notifier: Send + Sync {
    fn show_toast(&self, level: ToastLevel, message: &str);
}

/// Writes notifications to the log. The default for the command line.
#[derive(Debug, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn show_toast(&self, level: ToastLevel, message: &str) {
        match level {
            ToastLevel::Info => info!("{}", message),
            ToastLevel::Warning => warn!("{}", message),
            ToastLevel::Error => error!("{}", message),
        }
    }
}

/// Funnel for terminal failures: logs them and tells the user what to do.
#[derive(Clone)]
pub struct ErrorReporter {
    notifier: Arc<dyn Notifier>,
}

impl ErrorReporter {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub fn report(&self, context: &str, err: &AppError) -> ErrorKind {
        let kind = err.kind();
        error!(context, kind = ?kind, error = %err, "Request failed");
        self.notifier
            .show_toast(ToastLevel::Error, &user_message(kind, err));
        kind
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new(Arc::new(LogNotifier))
    }
}

/// Message shown for a failure of the given kind.
pub fn user_message(kind: ErrorKind, err: &AppError) -> String {
    match kind {
        ErrorKind::Auth => "Your Google session has expired. Please sign in again.".to_string(),
        ErrorKind::RateLimit => {
            "Google is limiting requests right now. Please wait a moment and try again."
                .to_string()
        }
        ErrorKind::Server => "Google Sheets is having trouble. Please try again shortly.".to_string(),
        ErrorKind::Network => "You appear to be offline. Check your connection and retry.".to_string(),
        ErrorKind::Timeout => "The request took too long. Please try again.".to_string(),
        ErrorKind::Validation | ErrorKind::NotFound | ErrorKind::Conflict | ErrorKind::Unknown => {
            err.to_string()
        }
    }
}
