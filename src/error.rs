use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline step that raised a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    ReadHeader,
    Decode,
    Analyze,
    SelectTemplate,
    SplitTemplate,
    ComputeWindow,
    PatchHeader,
    Splice,
    Verify,
    Write,
    Export,
    Validate,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::ReadHeader => "read_header",
            Step::Decode => "decode",
            Step::Analyze => "analyze",
            Step::SelectTemplate => "select_template",
            Step::SplitTemplate => "split_template",
            Step::ComputeWindow => "compute_window",
            Step::PatchHeader => "patch_header",
            Step::Splice => "splice",
            Step::Verify => "verify",
            Step::Write => "write",
            Step::Export => "export",
            Step::Validate => "validate",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Header truncated: expected {expected} bytes, found {found}")]
    TruncatedHeader { expected: usize, found: usize },

    #[error("Invalid number of channels: {0} (allowed 1..=512)")]
    InvalidChannelCount(i64),

    #[error("Channel field block '{field}' truncated: expected {expected} bytes, found {found}")]
    TruncatedChannelFields {
        field: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Channel {channel} ('{label}') has an empty {kind} range")]
    InvalidSignalRange {
        channel: usize,
        label: String,
        kind: &'static str,
    },

    #[error("No template found in {0}")]
    TemplateNotFound(PathBuf),

    #[error("Cannot read template {path}: {source}")]
    TemplateRead {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Template too small: {len} bytes, need at least {minimum}")]
    TemplateTooSmall { len: usize, minimum: usize },

    #[error("Template payload of {payload_len} bytes is not a multiple of the {frame_size}-byte frame")]
    MisalignedPayload { payload_len: usize, frame_size: usize },

    #[error("Expected {expected} channels, got {found}")]
    ChannelCountMismatch { expected: usize, found: usize },

    #[error("Size mismatch: expected {expected} bytes, got {found}")]
    SizeMismatch { expected: usize, found: usize },

    #[error("Cannot write {path}: {source}")]
    OutputWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Invalid sidecar: {0}")]
    InvalidSidecar(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Signal toolkit failure: {0}")]
    Toolkit(String),
}

impl ConvertError {
    /// The step a structural failure belongs to, when it is tied to one.
    pub fn step(&self) -> Option<Step> {
        match self {
            ConvertError::TruncatedHeader { .. }
            | ConvertError::InvalidChannelCount(_)
            | ConvertError::TruncatedChannelFields { .. } => Some(Step::ReadHeader),
            ConvertError::InvalidSignalRange { .. } | ConvertError::Toolkit(_) => Some(Step::Decode),
            ConvertError::ChannelCountMismatch { .. } => Some(Step::Analyze),
            ConvertError::TemplateNotFound(_) | ConvertError::TemplateRead { .. } => {
                Some(Step::SelectTemplate)
            }
            ConvertError::TemplateTooSmall { .. } | ConvertError::MisalignedPayload { .. } => {
                Some(Step::SplitTemplate)
            }
            ConvertError::SizeMismatch { .. } => Some(Step::Verify),
            ConvertError::OutputWrite { .. } => Some(Step::Write),
            ConvertError::InvalidSidecar(_) => Some(Step::Validate),
            ConvertError::FileNotFound(_)
            | ConvertError::Io(_)
            | ConvertError::Config(_)
            | ConvertError::Json(_) => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ConvertError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_structural_errors_name_their_step() {
        let err = ConvertError::SizeMismatch { expected: 10, found: 11 };
        assert_eq!(err.step(), Some(Step::Verify));
        assert_eq!(err.to_string(), "Size mismatch: expected 10 bytes, got 11");

        let err = ConvertError::MisalignedPayload { payload_len: 39, frame_size: 38 };
        assert_eq!(err.step(), Some(Step::SplitTemplate));

        assert_eq!(ConvertError::InvalidChannelCount(0).step(), Some(Step::ReadHeader));
        assert_eq!(ConvertError::Config("x".into()).step(), None);
    }
}
