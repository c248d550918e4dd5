use serde::Serialize;

/// Base value for the stable numeric error codes shared with the validator.
pub const ERROR_CODES_BASE: u32 = 6_777_000;

/// How a caller should treat an error.
///
/// - `Info`: not worth reporting to the user (e.g. a cancelled purchase).
/// - `Warning`: important, suitable for a toast-style notification.
/// - `Error`: critical, should be surfaced prominently.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
}

/// Stable numeric error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    /// Failed to initialize the native purchase library.
    Setup,
    /// Failed to load product metadata from the store.
    Load,
    /// Failed to make a purchase.
    Purchase,
    /// Failed to load a purchase receipt.
    LoadReceipts,
    /// Client is not allowed to issue the request.
    ClientInvalid,
    /// Purchase flow cancelled by the user.
    PaymentCancelled,
    /// Something is suspicious about a purchase.
    PaymentInvalid,
    /// The user is not allowed to make a payment.
    PaymentNotAllowed,
    Unknown,
    /// The product identifier is invalid.
    InvalidProductId,
    /// Cannot finalize a transaction or acknowledge a purchase.
    Finish,
    /// Failed to communicate with the server.
    Communication,
    /// Subscriptions are not available.
    SubscriptionsNotAvailable,
    /// Purchase information is missing a token.
    MissingToken,
    /// Verification of store data failed.
    VerificationFailed,
    /// Bad response from the server.
    BadResponse,
    /// The requested product is not available in the store.
    ProductNotAvailable,
    /// Legacy validator code meaning the subscription expired; treated as a
    /// successful validation with an empty collection.
    ValidatorSubscriptionExpired,
}

impl ErrorCode {
    pub fn value(self) -> u32 {
        match self {
            Self::Setup => ERROR_CODES_BASE + 1,
            Self::Load => ERROR_CODES_BASE + 2,
            Self::Purchase => ERROR_CODES_BASE + 3,
            Self::LoadReceipts => ERROR_CODES_BASE + 4,
            Self::ClientInvalid => ERROR_CODES_BASE + 5,
            Self::PaymentCancelled => ERROR_CODES_BASE + 6,
            Self::PaymentInvalid => ERROR_CODES_BASE + 7,
            Self::PaymentNotAllowed => ERROR_CODES_BASE + 8,
            Self::Unknown => ERROR_CODES_BASE + 10,
            Self::InvalidProductId => ERROR_CODES_BASE + 12,
            Self::Finish => ERROR_CODES_BASE + 13,
            Self::Communication => ERROR_CODES_BASE + 14,
            Self::SubscriptionsNotAvailable => ERROR_CODES_BASE + 15,
            Self::MissingToken => ERROR_CODES_BASE + 16,
            Self::VerificationFailed => ERROR_CODES_BASE + 17,
            Self::BadResponse => ERROR_CODES_BASE + 18,
            Self::ProductNotAvailable => ERROR_CODES_BASE + 23,
            Self::ValidatorSubscriptionExpired => 6_778_003,
        }
    }

    /// Map a validator-reported numeric code back to the taxonomy.
    pub fn from_value(value: u32) -> Self {
        match value {
            v if v == ERROR_CODES_BASE + 1 => Self::Setup,
            v if v == ERROR_CODES_BASE + 2 => Self::Load,
            v if v == ERROR_CODES_BASE + 3 => Self::Purchase,
            v if v == ERROR_CODES_BASE + 4 => Self::LoadReceipts,
            v if v == ERROR_CODES_BASE + 5 => Self::ClientInvalid,
            v if v == ERROR_CODES_BASE + 6 => Self::PaymentCancelled,
            v if v == ERROR_CODES_BASE + 7 => Self::PaymentInvalid,
            v if v == ERROR_CODES_BASE + 8 => Self::PaymentNotAllowed,
            v if v == ERROR_CODES_BASE + 12 => Self::InvalidProductId,
            v if v == ERROR_CODES_BASE + 13 => Self::Finish,
            v if v == ERROR_CODES_BASE + 14 => Self::Communication,
            v if v == ERROR_CODES_BASE + 15 => Self::SubscriptionsNotAvailable,
            v if v == ERROR_CODES_BASE + 16 => Self::MissingToken,
            v if v == ERROR_CODES_BASE + 17 => Self::VerificationFailed,
            v if v == ERROR_CODES_BASE + 18 => Self::BadResponse,
            v if v == ERROR_CODES_BASE + 23 => Self::ProductNotAvailable,
            6_778_003 => Self::ValidatorSubscriptionExpired,
            _ => Self::Unknown,
        }
    }

    fn default_title(self) -> &'static str {
        match self {
            Self::Setup => "Setup error",
            Self::Load | Self::LoadReceipts | Self::ProductNotAvailable => "Store error",
            Self::Purchase
            | Self::PaymentCancelled
            | Self::PaymentInvalid
            | Self::PaymentNotAllowed => "Purchase error",
            Self::Communication | Self::BadResponse => "Connection error",
            Self::VerificationFailed | Self::ValidatorSubscriptionExpired => "Validation error",
            _ => "Error",
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            Self::Setup => "Failed to initialize the in-app purchase library.",
            Self::Load => "Failed to load in-app products metadata.",
            Self::Purchase => "Failed to make a purchase.",
            Self::LoadReceipts => "Failed to load the purchase receipt.",
            Self::ClientInvalid => "This client is not allowed to issue the request.",
            Self::PaymentCancelled => "The purchase has been cancelled.",
            Self::PaymentInvalid => "Something is suspicious about this purchase.",
            Self::PaymentNotAllowed => "You are not allowed to make a payment.",
            Self::InvalidProductId => "The product identifier is invalid.",
            Self::Finish => "Failed to finalize the transaction.",
            Self::Communication => "Failed to communicate with the server.",
            Self::SubscriptionsNotAvailable => "Subscriptions are not available.",
            Self::MissingToken => "Purchase information is missing a token.",
            Self::VerificationFailed => "Verification of store data failed.",
            Self::BadResponse => "Bad response from the server.",
            Self::ProductNotAvailable => "The requested product is not available.",
            Self::ValidatorSubscriptionExpired => "The subscription has expired.",
            Self::Unknown => "An unknown error occurred.",
        }
    }
}

/// Error surfaced by the purchase lifecycle manager.
///
/// Every error carries a severity, a stable numeric code, a title/message
/// pair suitable for display (English fallback strings built in), and a raw
/// debug message for logs.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{title}: {message}")]
pub struct StoreError {
    pub severity: Severity,
    pub code: ErrorCode,
    /// Short, user-displayable title.
    pub title: String,
    /// User-displayable description.
    pub message: String,
    /// Raw technical detail, for logs only.
    pub debug_message: Option<String>,
    /// HTTP status, when the error originated from the validator.
    pub status: Option<u16>,
}

impl StoreError {
    pub fn new(severity: Severity, code: ErrorCode, debug_message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            title: code.default_title().to_string(),
            message: code.default_message().to_string(),
            debug_message: Some(debug_message.into()),
            status: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// True for errors the caller is expected to silently ignore.
    pub fn is_informational(&self) -> bool {
        self.severity == Severity::Info
    }
}

pub type Result<T> = std::result::Result<T, StoreError>;
