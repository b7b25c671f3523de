use thiserror::Error;

/// Clock display formatting failures.
///
/// A bad display string is worse than a missing one, so offsets the military
/// letter table cannot represent are surfaced as errors instead of being
/// rendered as a blank.
#[derive(Debug, Error)]
pub enum FormatError {
    /// The state tree named a timezone the IANA database does not know.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    /// The zone's UTC offset has no military letter (not a whole hour,
    /// or outside -12..+12).
    #[error("no military timezone letter for a {minutes}-minute UTC offset")]
    UnmappedOffset { minutes: i32 },
}

/// Push-frame decode failures. These drop the frame; they never tear down
/// the connection.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed payload: {0}")]
    Base64(#[from] base64::DecodeError),
}
