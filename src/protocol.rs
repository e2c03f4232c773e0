//! Processing protocol frames
//!
//! The gateway speaks a bidirectional streaming protocol with five logical
//! frame kinds; the wire codec is owned by the transport and these types
//! only model the semantic content. Bodies are carried as text because the
//! payloads this director handles are JSON request bodies and SSE streams.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Dynamic metadata attached to the stream by the gateway
pub type Metadata = HashMap<String, serde_json::Value>;

/// A single header or trailer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    /// Header name
    pub key: String,
    /// Header value
    pub value: String,
}

impl Header {
    /// Create a header
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Find a header value by case-insensitive name
pub fn find_header<'a>(headers: &'a [Header], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|h| h.key.eq_ignore_ascii_case(name))
        .map(|h| h.value.as_str())
}

/// A frame received from the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessingRequest {
    /// Client request headers
    RequestHeaders {
        /// Inbound request headers
        headers: Vec<Header>,
        /// Dynamic metadata, including load-balancer subset hints
        #[serde(default)]
        metadata: Metadata,
        /// Whether the request has no body
        #[serde(default)]
        end_of_stream: bool,
    },
    /// A chunk of the client request body
    RequestBody {
        /// Body chunk content
        body: String,
        /// Whether this is the final chunk
        end_of_stream: bool,
    },
    /// Backend response headers
    ResponseHeaders {
        /// Response headers from the backend
        headers: Vec<Header>,
        /// Whether the response has no body
        #[serde(default)]
        end_of_stream: bool,
    },
    /// A chunk of the backend response body
    ResponseBody {
        /// Body chunk content
        body: String,
        /// Whether this is the final chunk
        end_of_stream: bool,
    },
    /// Backend response trailers
    ResponseTrailers {
        /// Trailers from the backend
        trailers: Vec<Header>,
    },
}

/// Header changes applied by the gateway
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HeaderMutation {
    /// Headers to set or overwrite
    #[serde(default)]
    pub set_headers: Vec<Header>,
    /// Header names to remove
    #[serde(default)]
    pub remove_headers: Vec<String>,
}

/// A streamed body replacement chunk
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyMutation {
    /// Replacement chunk content
    pub body: String,
    /// Whether this is the final chunk of the rebuilt body
    pub end_of_stream: bool,
}

/// Mutations answering one inbound frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CommonResponse {
    /// Header changes, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_mutation: Option<HeaderMutation>,
    /// Body replacement chunk, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_mutation: Option<BodyMutation>,
}

/// A frame sent back to the gateway. Every inbound frame is answered; body
/// frames may be answered with several chunks to respect the per-chunk byte
/// limit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProcessingResponse {
    /// Answer to request headers
    RequestHeaders {
        /// Mutations to apply
        response: CommonResponse,
    },
    /// Answer to a request body chunk
    RequestBody {
        /// Mutations to apply
        response: CommonResponse,
    },
    /// Answer to response headers
    ResponseHeaders {
        /// Mutations to apply
        response: CommonResponse,
    },
    /// Answer to a response body chunk
    ResponseBody {
        /// Mutations to apply
        response: CommonResponse,
    },
    /// Answer to response trailers
    ResponseTrailers {
        /// Full trailer set to emit
        trailers: Vec<Header>,
    },
    /// Terminate the stream with an error status
    ImmediateResponse {
        /// HTTP status code
        status: u16,
        /// Response body
        body: String,
    },
}

impl ProcessingResponse {
    /// Empty acknowledgement of request headers
    pub fn request_headers_ack() -> Self {
        Self::RequestHeaders {
            response: CommonResponse::default(),
        }
    }

    /// Empty acknowledgement of a request body chunk
    pub fn request_body_ack() -> Self {
        Self::RequestBody {
            response: CommonResponse::default(),
        }
    }
}
