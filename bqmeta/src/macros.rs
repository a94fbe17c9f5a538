//! Macros for building and returning [`crate::error::MetadataError`] values.

/// Creates a [`crate::error::MetadataError`] from a kind, a static description and optional
/// detail or source.
///
/// Use `detail = value` to move an owned [`String`] in; a bare third argument is formatted with
/// `to_string()`.
#[macro_export]
macro_rules! metadata_error {
    ($kind:expr, $desc:expr) => {
        $crate::error::MetadataError::from(($kind, $desc))
    };
    ($kind:expr, $desc:expr, source: $source:expr) => {
        $crate::error::MetadataError::from(($kind, $desc)).with_source($source)
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        $crate::error::MetadataError::from(($kind, $desc, $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        $crate::error::MetadataError::from(($kind, $desc, $detail.to_string()))
    };
    ($kind:expr, $desc:expr, $detail:expr, source: $source:expr) => {
        $crate::error::MetadataError::from(($kind, $desc, $detail.to_string()))
            .with_source($source)
    };
}

/// Returns early with a [`crate::error::MetadataError`].
#[macro_export]
macro_rules! bail {
    ($kind:expr, $desc:expr) => {
        return ::core::result::Result::Err($crate::metadata_error!($kind, $desc))
    };
    ($kind:expr, $desc:expr, detail = $detail:expr) => {
        return ::core::result::Result::Err($crate::metadata_error!($kind, $desc, detail = $detail))
    };
    ($kind:expr, $desc:expr, $detail:expr) => {
        return ::core::result::Result::Err($crate::metadata_error!($kind, $desc, $detail))
    };
}
