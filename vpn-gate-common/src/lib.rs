//! vpn-gate Common Types
//!
//! Shared types used by both the pre-authentication hook and the backend.

pub mod access_log;
pub mod enrollment;
pub mod hook;
pub mod status;

pub use access_log::{AccessLogView, AccessLogsResponse};
pub use enrollment::{
    setup_url, ConnectionLogRequest, ConnectionLogResponse, EnableRequest, EnableResponse,
    SetupRequest, SetupResponse, VerifyRequest, VerifyResponse,
};
pub use hook::{
    ClientConnectEvent, ConnectionEvent, ConnectionHandlerResponse, HookResponse, PostureStatus,
    SCHEMA_VERSION,
};
pub use status::{ApiErrorBody, StatusCheckQuery, StatusCheckResponse, StatusErrorCode, AUTOMATED_SOURCE};
