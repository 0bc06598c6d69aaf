//! HTTP transport for the modelup upload API.
//!
//! Implements [`modelup_transfer::UploadTransport`] over `reqwest` against
//! the server's REST endpoints. The transfer engine stays transport-agnostic;
//! everything HTTP-shaped (URLs, multipart encoding, status-code handling)
//! lives here.

pub mod http;

pub use http::HttpTransport;
