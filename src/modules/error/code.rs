use poem::http::StatusCode;
use poem_openapi::Enum;

#[derive(Copy, Clone, Debug, Enum, Eq, PartialEq)]
#[repr(u32)]
pub enum ErrorCode {
    // Client-side errors (10000–10999)
    InvalidParameter = 10000,
    ExceedsLimitation = 10010,
    MethodNotAllowed = 10020,

    // Authentication and authorization errors (20000–20999)
    PermissionDenied = 20000,
    AccountDisabled = 20010,

    // Resource errors (30000–30999)
    ResourceNotFound = 30000,
    AlreadyExists = 30010,

    // Network connection errors (40000–40999)
    NetworkError = 40000,
    ConnectionTimeout = 40010,

    // Mail service errors (50000–50999)
    ImapCommandFailed = 50000,
    ImapAuthenticationFailed = 50010,
    ImapUnexpectedResult = 50020,
    FolderNotCached = 50030,
    RemoteFolderMissing = 50040,
    MessageParseError = 50050,

    // Internal system errors (70000–70999)
    InternalError = 70000,
    UnhandledPoemError = 70010,
}

impl ErrorCode {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidParameter | ErrorCode::ExceedsLimitation => StatusCode::BAD_REQUEST,
            ErrorCode::PermissionDenied | ErrorCode::AccountDisabled => StatusCode::FORBIDDEN,
            ErrorCode::ResourceNotFound | ErrorCode::FolderNotCached => StatusCode::NOT_FOUND,
            ErrorCode::AlreadyExists => StatusCode::CONFLICT,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::NetworkError
            | ErrorCode::ConnectionTimeout
            | ErrorCode::ImapCommandFailed
            | ErrorCode::ImapAuthenticationFailed
            | ErrorCode::ImapUnexpectedResult
            | ErrorCode::RemoteFolderMissing
            | ErrorCode::MessageParseError
            | ErrorCode::InternalError
            | ErrorCode::UnhandledPoemError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
