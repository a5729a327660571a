// Logging macros that pass the formatted message through the default redactor
#[macro_export]
macro_rules! redacted_info {
    ($($arg:tt)+) => {
        $crate::__tracing::info!("{}", $crate::redact(&format!($($arg)+)))
    };
}

#[macro_export]
macro_rules! redacted_warn {
    ($($arg:tt)+) => {
        $crate::__tracing::warn!("{}", $crate::redact(&format!($($arg)+)))
    };
}

#[macro_export]
macro_rules! redacted_error {
    ($($arg:tt)+) => {
        $crate::__tracing::error!("{}", $crate::redact(&format!($($arg)+)))
    };
}
