//! Task implementations for the gantry engine.
//!
//! Currently one task type: HTTP. The runner here is what the orchestrator
//! fans out; the transport and validator seams keep the network stack and
//! the schema engine swappable.

mod http;
mod runner;
mod validator;

pub use http::{HttpMethod, HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use runner::HttpTaskRunner;
pub use validator::{AcceptAllValidator, BasicValidator, SchemaValidator};
